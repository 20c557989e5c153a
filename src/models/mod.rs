use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Label of the attribute synthesized from price and floor area
pub const PRICE_PER_AREA_LABEL: &str = "Price per area";

/// Source of the offer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    Olx,
    Publi24,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Olx, Source::Publi24];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Olx => "olx",
            Source::Publi24 => "publi24",
        }
    }

    /// Table holding the ids already notified for this source
    pub fn seen_table(&self) -> &'static str {
        match self {
            Source::Olx => "olx_offers",
            Source::Publi24 => "publi24_offers",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled line of the attribute block, kept in display order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceAttribute {
    pub label: String,
    pub value: String,
}

impl PriceAttribute {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Canonical offer record produced by the scrapers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub source: Source,
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub price_attributes: Vec<PriceAttribute>,
    pub price_per_area: Option<i64>,
    pub posted_at: Option<DateTime<FixedOffset>>,
    pub photo_urls: Vec<String>,
}

impl Offer {
    /// Whole days between the posting date and `today`.
    pub fn days_since_posted(&self, today: NaiveDate) -> Option<i64> {
        self.posted_at
            .map(|posted| (today - posted.date_naive()).num_days())
    }
}
