use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters for the OLX offers API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OlxSearch {
    /// Offers endpoint, without query string
    pub api_base: String,
    /// Listing category (apartments for sale)
    pub category_id: u32,
    pub region_id: u32,
    pub city_id: u32,
    /// "private" excludes agencies
    pub owner_type: String,
    pub currency: String,
    pub sort_by: String,
    /// Number of most recent offers to request
    pub limit: u32,
}

impl Default for OlxSearch {
    fn default() -> Self {
        Self {
            api_base: "https://www.olx.ro/api/v1/offers/".to_string(),
            category_id: 907,
            region_id: 8,
            city_id: 81351,
            owner_type: "private".to_string(),
            currency: "EUR".to_string(),
            sort_by: "created_at:desc".to_string(),
            limit: 1,
        }
    }
}

impl OlxSearch {
    pub fn to_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.api_base)
            .with_context(|| format!("Invalid OLX endpoint: {}", self.api_base))?;
        url.query_pairs_mut()
            .append_pair("offset", "0")
            .append_pair("limit", &self.limit.to_string())
            .append_pair("category_id", &self.category_id.to_string())
            .append_pair("region_id", &self.region_id.to_string())
            .append_pair("city_id", &self.city_id.to_string())
            .append_pair("owner_type", &self.owner_type)
            .append_pair("currency", &self.currency)
            .append_pair("sort_by", &self.sort_by)
            .append_pair("filter_refiners", "spell_checker");
        Ok(url.into())
    }
}

/// Pagination parameters for the Publi24 listing page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publi24Search {
    pub listing_url: String,
    pub page: u32,
    /// Listings per page
    pub limit: u32,
}

impl Default for Publi24Search {
    fn default() -> Self {
        Self {
            listing_url: "https://www.publi24.ro/anunturi/imobiliare/de-vanzare/apartamente/dolj/craiova/"
                .to_string(),
            page: 1,
            limit: 1,
        }
    }
}

impl Publi24Search {
    pub fn to_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.listing_url)
            .with_context(|| format!("Invalid Publi24 listing URL: {}", self.listing_url))?;
        url.query_pairs_mut()
            .append_pair("commercial", "false")
            .append_pair("pag", &self.page.to_string())
            .append_pair("pagesize", &self.limit.to_string());
        Ok(url.into())
    }
}
