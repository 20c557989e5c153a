use crate::error::ScoutError;
use crate::models::{Offer, PriceAttribute, Source, PRICE_PER_AREA_LABEL};
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::Publi24Search;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const LISTING_SELECTOR: &str = "li[data-articleid]";
const LINK_SELECTOR: &str = "a[href]";
const TITLE_SELECTOR: &str = "h3 a";
const THUMBNAIL_SELECTOR: &str = "a.listing-image";
const PRICE_SELECTOR: &str = r#"strong[class*="price"]"#;
const DETAILS_SELECTOR: &str = r#"label[class*="article-details"]"#;
const GALLERY_SCRIPT_SELECTOR: &str = "#content > div > div > div:nth-of-type(1) > script";
const DESCRIPTION_SELECTOR: &str =
    "#content > div > div > div:nth-of-type(1) > div:nth-of-type(6) > p:nth-of-type(1) > span";

const STYLE_URL_PATTERN: &str = r#"url\(['"]?([^'")]+)['"]?\)"#;
const JPG_URL_PATTERN: &str = r"https?://[\w\-._~:/?#\[\]@!$&'()*+,;=]*\.jpg";

/// Fields read from one entry of the listing page
#[derive(Debug, Clone, PartialEq)]
struct ListingCard {
    id: String,
    url: String,
    title: String,
    thumbnail: String,
    price: String,
    price_per_area: String,
}

/// Fields read from the listing's own page
#[derive(Debug, Clone, PartialEq)]
struct ListingDetail {
    photos: Vec<String>,
    description: String,
}

impl ListingCard {
    fn into_offer(self, detail: ListingDetail) -> Offer {
        let photo_urls = if detail.photos.is_empty() {
            vec![self.thumbnail]
        } else {
            detail.photos
        };

        Offer {
            source: Source::Publi24,
            price_per_area: leading_number(&self.price_per_area),
            price_attributes: vec![
                PriceAttribute::new("Price", self.price),
                PriceAttribute::new(PRICE_PER_AREA_LABEL, self.price_per_area),
            ],
            id: self.id,
            title: self.title,
            description: detail.description,
            url: self.url,
            posted_at: None,
            photo_urls,
        }
    }
}

/// Compiled selectors and patterns for Publi24 pages
struct Publi24Markup {
    listing: Selector,
    link: Selector,
    title: Selector,
    thumbnail: Selector,
    price: Selector,
    details: Selector,
    gallery_script: Selector,
    description: Selector,
    style_url: Regex,
    jpg_url: Regex,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {}: {:?}", css, e))
}

impl Publi24Markup {
    fn new() -> Result<Self> {
        Ok(Self {
            listing: selector(LISTING_SELECTOR)?,
            link: selector(LINK_SELECTOR)?,
            title: selector(TITLE_SELECTOR)?,
            thumbnail: selector(THUMBNAIL_SELECTOR)?,
            price: selector(PRICE_SELECTOR)?,
            details: selector(DETAILS_SELECTOR)?,
            gallery_script: selector(GALLERY_SCRIPT_SELECTOR)?,
            description: selector(DESCRIPTION_SELECTOR)?,
            style_url: Regex::new(STYLE_URL_PATTERN)?,
            jpg_url: Regex::new(JPG_URL_PATTERN)?,
        })
    }

    /// Every listing on the page that has all expected fields.
    fn parse_listing_page(&self, html: &str, page_url: &Url) -> Vec<ListingCard> {
        let document = Html::parse_document(html);

        let cards: Vec<_> = document.select(&self.listing).collect();
        debug!("Found {} listing nodes", cards.len());

        cards
            .into_iter()
            .filter_map(|element| match self.parse_card(element, page_url) {
                Ok(card) => Some(card),
                Err(e) => {
                    let id = element.value().attr("data-articleid").unwrap_or("?");
                    warn!(source = "publi24", offer_id = id, stage = "listing", "Skipping listing: {}", e);
                    None
                }
            })
            .collect()
    }

    fn parse_card(&self, element: ElementRef<'_>, page_url: &Url) -> Result<ListingCard, ScoutError> {
        let id = element
            .value()
            .attr("data-articleid")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScoutError::parse("empty listing id"))?
            .to_string();

        let href = element
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| ScoutError::parse("missing listing link"))?;
        let url = page_url
            .join(href.trim())
            .map_err(|e| ScoutError::parse(format!("bad listing link {}: {}", href, e)))?
            .to_string();

        let title = element
            .select(&self.title)
            .next()
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScoutError::parse("missing title"))?;

        let style = element
            .select(&self.thumbnail)
            .next()
            .and_then(|a| a.value().attr("style"))
            .ok_or_else(|| ScoutError::parse("missing listing image"))?;
        let thumbnail = self
            .style_url
            .captures(style)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ScoutError::parse("no image url in listing style"))?
            .as_str();
        let thumbnail = page_url
            .join(thumbnail.trim())
            .map_err(|e| ScoutError::parse(format!("bad listing image {}: {}", thumbnail, e)))?
            .to_string();

        let price = element
            .select(&self.price)
            .next()
            .and_then(|p| text_node(p, 0))
            .ok_or_else(|| ScoutError::parse("missing price"))?;

        // The price per area is the label's second text node
        let price_per_area = element
            .select(&self.details)
            .next()
            .and_then(|label| text_node(label, 1))
            .ok_or_else(|| ScoutError::parse("missing price per area"))?;

        Ok(ListingCard {
            id,
            url,
            title,
            thumbnail,
            price,
            price_per_area,
        })
    }

    fn parse_detail_page(&self, html: &str) -> Result<ListingDetail, ScoutError> {
        let document = Html::parse_document(html);

        let script = document
            .select(&self.gallery_script)
            .next()
            .ok_or_else(|| ScoutError::parse("missing gallery script"))?
            .text()
            .collect::<String>();

        let mut photos: Vec<String> = Vec::new();
        for found in self.jpg_url.find_iter(&script) {
            let photo = found.as_str().to_string();
            if !photos.contains(&photo) {
                photos.push(photo);
            }
        }

        let description = document
            .select(&self.description)
            .next()
            .ok_or_else(|| ScoutError::parse("missing description"))?
            .text()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ListingDetail {
            photos,
            description,
        })
    }
}

/// Direct text child `index` of an element, trimmed; `None` when absent or blank
fn text_node(element: ElementRef<'_>, index: usize) -> Option<String> {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .nth(index)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// "1.250 EUR/mp" -> 1250
fn leading_number(text: &str) -> Option<i64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ' ')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Offers a fetch would build from these pages, every card sharing `detail_html`
#[cfg(test)]
pub(crate) fn offers_from_pages(listing_html: &str, page_url: &Url, detail_html: &str) -> Vec<Offer> {
    let markup = Publi24Markup::new().unwrap();
    markup
        .parse_listing_page(listing_html, page_url)
        .into_iter()
        .filter_map(|card| {
            let detail = markup.parse_detail_page(detail_html).ok()?;
            Some(card.into_offer(detail))
        })
        .collect()
}

/// Publi24 HTML scraper
pub struct Publi24Scraper {
    client: Client,
    search: Publi24Search,
    markup: Publi24Markup,
}

impl Publi24Scraper {
    pub fn new(search: Publi24Search, timeout: Duration) -> Result<Self> {
        let client = super::http_client(timeout)?;
        let markup = Publi24Markup::new()?;
        Ok(Self {
            client,
            search,
            markup,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, ScoutError> {
        debug!("Fetching URL: {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_detail(&self, url: &str) -> Result<ListingDetail, ScoutError> {
        let html = self.get_text(url).await?;
        self.markup.parse_detail_page(&html)
    }
}

#[async_trait]
impl ScraperTrait for Publi24Scraper {
    async fn fetch_candidates(&self) -> Result<Vec<Offer>> {
        let url = self.search.to_url()?;
        let page_url = Url::parse(&url).context("Invalid Publi24 listing URL")?;

        let html = self
            .get_text(&url)
            .await
            .context("Failed to fetch Publi24 listing page")?;

        // Parsed before any further request: the document is not Send
        let cards = self.markup.parse_listing_page(&html, &page_url);

        let mut offers = Vec::with_capacity(cards.len());
        for card in cards {
            match self.fetch_detail(&card.url).await {
                Ok(detail) => offers.push(card.into_offer(detail)),
                Err(e) => warn!(
                    source = "publi24",
                    offer_id = %card.id,
                    stage = "detail",
                    "Skipping listing: {}",
                    e
                ),
            }
        }

        info!("Fetched {} Publi24 offers", offers.len());
        Ok(offers)
    }

    fn source(&self) -> Source {
        Source::Publi24
    }
}
