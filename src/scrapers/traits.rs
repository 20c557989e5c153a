use crate::models::{Offer, Source};
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for all listing sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScraperTrait: Send + Sync {
    /// Fetch the current offers of the source.
    ///
    /// Listings that fail to parse are skipped and logged; an `Err` means the
    /// whole source could not be fetched for this run.
    async fn fetch_candidates(&self) -> Result<Vec<Offer>>;

    /// Which source the offers come from
    fn source(&self) -> Source;
}
