use crate::error::ScoutError;
use crate::models::{Offer, PriceAttribute, Source, PRICE_PER_AREA_LABEL};
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::OlxSearch;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const OFFER_BASE_URL: &str = "https://www.olx.ro";

/// Attribute that only adds noise to the notification
const IGNORED_PARAM_KEY: &str = "constructie";
const AREA_PARAM_KEY: &str = "m";
const PRICE_PARAM_KEY: &str = "price";

#[derive(Debug, Deserialize)]
struct OlxResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OlxListing {
    id: Value,
    #[serde(default)]
    url: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    params: Vec<OlxParam>,
    #[serde(default)]
    photos: Vec<OlxPhoto>,
}

#[derive(Debug, Deserialize)]
struct OlxParam {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<OlxParamValue>,
}

#[derive(Debug, Deserialize)]
struct OlxParamValue {
    #[serde(default)]
    key: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OlxPhoto {
    link: String,
    width: u32,
    height: u32,
}

/// OLX structured API scraper
pub struct OlxScraper {
    client: Client,
    search: OlxSearch,
}

impl OlxScraper {
    pub fn new(search: OlxSearch, timeout: Duration) -> Result<Self> {
        let client = super::http_client(timeout)?;
        Ok(Self { client, search })
    }
}

#[async_trait]
impl ScraperTrait for OlxScraper {
    async fn fetch_candidates(&self) -> Result<Vec<Offer>> {
        let url = self.search.to_url()?;
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch OLX offers")?;

        if !response.status().is_success() {
            warn!("OLX returned status: {}", response.status());
            anyhow::bail!("Failed to fetch OLX offers: {}", response.status());
        }

        let body = response.text().await.context("Failed to read response body")?;
        let offers = parse_offers(&body, currency_suffix(&self.search.currency))?;

        info!("Fetched {} OLX offers", offers.len());
        Ok(offers)
    }

    fn source(&self) -> Source {
        Source::Olx
    }
}

/// Display suffix for prices in the searched currency
fn currency_suffix(currency: &str) -> &str {
    match currency {
        "EUR" => "€",
        "RON" => "lei",
        other => other,
    }
}

/// Decode an offers API payload.
///
/// A payload that is not the expected envelope fails the whole source;
/// a single malformed listing is logged and skipped.
pub(crate) fn parse_offers(body: &str, currency: &str) -> Result<Vec<Offer>> {
    let response: OlxResponse =
        serde_json::from_str(body).context("OLX payload is not a valid offers envelope")?;

    let mut offers = Vec::with_capacity(response.data.len());
    for raw in response.data {
        match parse_listing(raw, currency) {
            Ok(offer) => offers.push(offer),
            Err(e) => warn!(source = "olx", stage = "parse", "Skipping listing: {}", e),
        }
    }
    Ok(offers)
}

fn parse_listing(raw: Value, currency: &str) -> Result<Offer, ScoutError> {
    let listing: OlxListing = serde_json::from_value(raw)
        .map_err(|e| ScoutError::parse(format!("malformed listing: {}", e)))?;

    let id = match &listing.id {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        other => return Err(ScoutError::parse(format!("invalid listing id: {}", other))),
    };

    let title = listing.title.trim().to_string();
    if title.is_empty() {
        return Err(ScoutError::parse(format!("listing {} has no title", id)));
    }

    let url = listing
        .url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| format!("{}/{}", OFFER_BASE_URL, id));

    let (price_attributes, price_per_area) = price_attributes(&listing.params, currency);

    let posted_at = listing.created_time.as_deref().and_then(|raw| {
        let parsed = parse_created_time(raw);
        if parsed.is_none() {
            debug!(offer_id = %id, "Unrecognized created_time: {}", raw);
        }
        parsed
    });

    let photo_urls = listing
        .photos
        .iter()
        .map(|p| resolve_photo_url(&p.link, p.width, p.height))
        .collect();

    Ok(Offer {
        source: Source::Olx,
        id,
        title,
        description: listing.description,
        url,
        price_attributes,
        price_per_area,
        posted_at,
        photo_urls,
    })
}

/// Display attributes in payload order, plus the derived price per area.
fn price_attributes(params: &[OlxParam], currency: &str) -> (Vec<PriceAttribute>, Option<i64>) {
    let mut attributes = Vec::new();
    let mut area: Option<i64> = None;
    let mut price: Option<f64> = None;

    for param in params.iter().filter(|p| p.key != IGNORED_PARAM_KEY) {
        let Some(value) = &param.value else {
            continue;
        };

        match param.key.as_str() {
            AREA_PARAM_KEY => area = value.key.as_ref().and_then(as_integer),
            PRICE_PARAM_KEY => price = value.value.as_ref().and_then(Value::as_f64),
            _ => {}
        }

        if let Some(label) = value.label.as_deref().filter(|l| !l.trim().is_empty()) {
            let name = param.name.as_deref().unwrap_or(&param.key);
            attributes.push(PriceAttribute::new(name, label.trim()));
        }
    }

    let price_per_area = match (price, area) {
        (Some(price), Some(area)) if area != 0 => Some((price / area as f64).trunc() as i64),
        _ => None,
    };

    if let Some(ppa) = price_per_area {
        attributes.push(PriceAttribute::new(
            PRICE_PER_AREA_LABEL,
            format!("{} {}", ppa, currency),
        ));
    }

    (attributes, price_per_area)
}

/// Area values arrive as strings ("50") or numbers
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_created_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Fill the size placeholders of a photo link and drop the explicit `:443`.
///
/// Already-resolved links come back unchanged.
pub fn resolve_photo_url(link: &str, width: u32, height: u32) -> String {
    link.replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
        .replace(":443", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(listings: Value) -> String {
        json!({ "data": listings }).to_string()
    }

    #[test]
    fn synthesizes_price_per_area() {
        let body = payload(json!([{
            "id": 123,
            "title": "Apartament 2 camere",
            "description": "Decomandat<br />\nEtaj 2",
            "created_time": "2024-03-14T12:00:00+02:00",
            "params": [
                { "key": "m", "value": { "key": "50" } },
                { "key": "price", "value": { "value": 100000, "label": "100000" } }
            ],
            "photos": []
        }]));

        let offers = parse_offers(&body, "€").unwrap();
        assert_eq!(offers.len(), 1);

        let offer = &offers[0];
        assert_eq!(offer.id, "123");
        assert_eq!(offer.url, "https://www.olx.ro/123");
        assert_eq!(offer.price_per_area, Some(2000));
        assert_eq!(
            offer.price_attributes.last(),
            Some(&PriceAttribute::new(PRICE_PER_AREA_LABEL, "2000 €"))
        );
        // "m" has no label, so only price and the synthesized line are shown
        assert_eq!(offer.price_attributes.len(), 2);
        assert!(offer.posted_at.is_some());
    }

    #[test]
    fn no_price_per_area_without_both_inputs() {
        let missing_area = payload(json!([{
            "id": 1, "title": "A",
            "params": [{ "key": "price", "name": "Pret", "value": { "value": 90000, "label": "90 000 €" } }]
        }]));
        let zero_area = payload(json!([{
            "id": 2, "title": "B",
            "params": [
                { "key": "m", "name": "Suprafata", "value": { "key": "0", "label": "0 m²" } },
                { "key": "price", "name": "Pret", "value": { "value": 90000, "label": "90 000 €" } }
            ]
        }]));

        for body in [missing_area, zero_area] {
            let offers = parse_offers(&body, "€").unwrap();
            assert_eq!(offers[0].price_per_area, None);
            assert!(offers[0]
                .price_attributes
                .iter()
                .all(|a| a.label != PRICE_PER_AREA_LABEL));
        }
    }

    #[test]
    fn filters_ignored_and_unlabelled_params() {
        let body = payload(json!([{
            "id": 7,
            "title": "Garsoniera",
            "params": [
                { "key": "constructie", "name": "An constructie", "value": { "key": "1980", "label": "1980" } },
                { "key": "floor", "name": "Etaj", "value": { "key": "floor_2", "label": "Etaj 2" } },
                { "key": "rooms", "name": "Camere", "value": { "key": "2" } },
                { "key": "m", "name": "Suprafata utila", "value": { "key": "40", "label": "40 m²" } }
            ]
        }]));

        let offers = parse_offers(&body, "€").unwrap();
        assert_eq!(
            offers[0].price_attributes,
            vec![
                PriceAttribute::new("Etaj", "Etaj 2"),
                PriceAttribute::new("Suprafata utila", "40 m²"),
            ]
        );
    }

    #[test]
    fn malformed_listing_is_skipped_not_fatal() {
        let body = payload(json!([
            { "title": "no id" },
            { "id": 5, "title": "   " },
            { "id": "abc", "title": "Casa", "url": "https://www.olx.ro/d/oferta/casa-abc.html" }
        ]));

        let offers = parse_offers(&body, "€").unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].id, "abc");
        assert_eq!(offers[0].url, "https://www.olx.ro/d/oferta/casa-abc.html");
    }

    #[test]
    fn invalid_envelope_fails_the_source() {
        assert!(parse_offers("<html>blocked</html>", "€").is_err());
    }

    #[test]
    fn resolves_photo_templates() {
        let body = payload(json!([{
            "id": 9,
            "title": "Apartament",
            "photos": [
                { "link": "https://frankfurt.apollo.olxcdn.com:443/v1/files/abc/image;s={width}x{height}", "width": 1000, "height": 750 },
                { "link": "https://frankfurt.apollo.olxcdn.com:443/v1/files/def/image;s={width}x{height}", "width": 800, "height": 600 }
            ]
        }]));

        let offers = parse_offers(&body, "€").unwrap();
        assert_eq!(
            offers[0].photo_urls,
            vec![
                "https://frankfurt.apollo.olxcdn.com/v1/files/abc/image;s=1000x750",
                "https://frankfurt.apollo.olxcdn.com/v1/files/def/image;s=800x600",
            ]
        );
    }

    #[test]
    fn photo_resolution_is_idempotent() {
        let template = "https://cdn.example.com:443/image;s={width}x{height}";
        let once = resolve_photo_url(template, 640, 480);
        assert_eq!(once, "https://cdn.example.com/image;s=640x480");
        assert_eq!(resolve_photo_url(&once, 640, 480), once);
    }

    #[test]
    fn naive_created_time_is_accepted() {
        assert!(parse_created_time("2024-03-14T12:00:00").is_some());
        assert!(parse_created_time("yesterday").is_none());
    }

    #[test]
    fn currency_codes_map_to_display_suffix() {
        assert_eq!(currency_suffix("EUR"), "€");
        assert_eq!(currency_suffix("USD"), "USD");
    }
}
