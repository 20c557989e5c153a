mod config;
mod error;
mod models;
mod notifier;
mod pipeline;
mod scrapers;
mod store;

use anyhow::Context;
use config::Config;
use notifier::{Notifier, ReqwestTransport};
use pipeline::{Pipeline, SourceOutcome};
use scrapers::{OlxScraper, Publi24Scraper, ScraperTrait};
use std::sync::Arc;
use store::SeenStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; HTTP and database internals only when they complain
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏠 Housing Alerts - OLX & Publi24");

    let config = Config::from_env().context("Failed to load configuration")?;

    let store = SeenStore::open(&config.database_path)
        .await
        .context("Failed to open seen-offer store")?;

    let transport = ReqwestTransport::new(config.http_timeout)?;
    let notifier = Notifier::new(
        config.telegram.clone(),
        config.retry.clone(),
        Arc::new(transport),
    );

    let scrapers: Vec<Box<dyn ScraperTrait>> = vec![
        Box::new(OlxScraper::new(config.olx.clone(), config.http_timeout)?),
        Box::new(Publi24Scraper::new(config.publi24.clone(), config.http_timeout)?),
    ];

    let pipeline = Pipeline::new(store, notifier, scrapers);
    let summary = pipeline.run().await;

    for (source, outcome) in &summary.outcomes {
        match outcome {
            SourceOutcome::Completed(counts) => info!(
                "{}: {} fetched, {} already seen, {} notified, {} failed",
                source, counts.fetched, counts.skipped_seen, counts.notified, counts.failed
            ),
            SourceOutcome::FetchFailed(e) => warn!("{}: not fetched: {}", source, e),
            SourceOutcome::StoreFailed(e) => warn!("{}: aborted, store unavailable: {}", source, e),
        }
    }

    pipeline.close().await;
    info!("✅ Run finished, {} new offers sent", summary.notified());

    Ok(())
}
