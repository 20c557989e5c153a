//! Fetch, dedup, notify, record.
//!
//! Sources run one after another. A source that cannot be fetched, or whose
//! dedup state cannot be read, is skipped for this run without stopping the
//! others.

pub mod message;

pub use message::compose_message;

use crate::error::ScoutError;
use crate::models::{Offer, Source};
use crate::notifier::Notifier;
use crate::scrapers::ScraperTrait;
use crate::store::SeenStore;
use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

/// Counters for one source in one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSummary {
    pub fetched: usize,
    pub skipped_seen: usize,
    pub notified: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Completed(SourceSummary),
    /// Nothing could be fetched; retried next run
    FetchFailed(String),
    /// Dedup state unavailable; processing of the source stopped
    StoreFailed(String),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(Source, SourceOutcome)>,
}

impl RunSummary {
    pub fn notified(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                SourceOutcome::Completed(summary) => summary.notified,
                _ => 0,
            })
            .sum()
    }
}

pub struct Pipeline {
    store: SeenStore,
    notifier: Notifier,
    scrapers: Vec<Box<dyn ScraperTrait>>,
}

impl Pipeline {
    pub fn new(store: SeenStore, notifier: Notifier, scrapers: Vec<Box<dyn ScraperTrait>>) -> Self {
        Self {
            store,
            notifier,
            scrapers,
        }
    }

    /// Release the store once the run is over
    pub async fn close(self) {
        self.store.close().await;
    }

    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for scraper in &self.scrapers {
            let source = scraper.source();
            info!(source = %source, "Checking for new offers");

            let outcome = self.process_source(scraper.as_ref()).await;
            if let SourceOutcome::Completed(counts) = &outcome {
                info!(
                    source = %source,
                    fetched = counts.fetched,
                    notified = counts.notified,
                    failed = counts.failed,
                    "Source done"
                );
            }
            summary.outcomes.push((source, outcome));
        }

        summary
    }

    async fn process_source(&self, scraper: &dyn ScraperTrait) -> SourceOutcome {
        let source = scraper.source();

        let candidates = match scraper.fetch_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(source = %source, stage = "fetch", "Source skipped for this run: {:#}", e);
                return SourceOutcome::FetchFailed(format!("{:#}", e));
            }
        };

        let today = Local::now().date_naive();
        match self.notify_new(candidates, today).await {
            Ok(counts) => SourceOutcome::Completed(counts),
            Err(e) => {
                error!(source = %source, stage = "store", "Aborting source: {}", e);
                SourceOutcome::StoreFailed(e.to_string())
            }
        }
    }

    /// Notify every candidate not seen before, in the order given.
    ///
    /// Only store errors end the loop early.
    async fn notify_new(&self, candidates: Vec<Offer>, today: NaiveDate) -> Result<SourceSummary, ScoutError> {
        let mut counts = SourceSummary {
            fetched: candidates.len(),
            ..Default::default()
        };

        for offer in candidates {
            if self.store.exists(offer.source, &offer.id).await? {
                debug!(source = %offer.source, offer_id = %offer.id, "Already notified");
                counts.skipped_seen += 1;
                continue;
            }

            info!(source = %offer.source, offer_id = %offer.id, "New offer found: {}", offer.url);

            if self.deliver(&offer, today).await {
                self.store.record(offer.source, &offer.id).await?;
                counts.notified += 1;
            } else {
                counts.failed += 1;
            }
        }

        Ok(counts)
    }

    /// Photos first, then the text. The offer counts as delivered once the
    /// text is through; a failed album alone does not hold it back.
    async fn deliver(&self, offer: &Offer, today: NaiveDate) -> bool {
        let chat = self.notifier.chat_id();

        if !self.notifier.send_photo_group(&offer.photo_urls, chat).await {
            warn!(source = %offer.source, offer_id = %offer.id, stage = "photos", "Photos not delivered");
        }

        let text = compose_message(offer, today);
        let sent = self.notifier.send_text(&text, chat).await;
        if !sent {
            warn!(
                source = %offer.source,
                offer_id = %offer.id,
                stage = "text",
                "Message not delivered, offer will be retried next run"
            );
        }
        sent
    }
}
