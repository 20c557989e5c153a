use crate::scrapers::types::{OlxSearch, Publi24Search};
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Messaging endpoint and destination chat
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Full URL of a bot API method, e.g. `sendMessage`
    pub fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.token,
            method
        )
    }
}

/// Retry budget shared by every notifier dispatch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per dispatch, whatever the failure cause
    pub max_retries: u32,
    /// First network-error backoff, doubled after each network error
    pub initial_backoff: Duration,
    /// Wait used when a 429 reply carries no retry hint
    pub rate_limit_default: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            rate_limit_default: Duration::from_secs(30),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub olx: OlxSearch,
    pub publi24: Publi24Search,
    pub retry: RetryPolicy,
    pub database_path: PathBuf,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        let _ = dotenv();

        let olx_defaults = OlxSearch::default();
        let publi24_defaults = Publi24Search::default();
        let retry_defaults = RetryPolicy::default();

        Ok(Self {
            telegram: TelegramConfig {
                api_base: env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
                token: env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN must be set")?,
                chat_id: env::var("TELEGRAM_CHAT_ID").context("TELEGRAM_CHAT_ID must be set")?,
            },
            olx: OlxSearch {
                api_base: env::var("OLX_API_ENDPOINT").unwrap_or(olx_defaults.api_base.clone()),
                limit: parse_var("OLX_OFFERS_LIMIT", olx_defaults.limit)?,
                ..olx_defaults
            },
            publi24: Publi24Search {
                listing_url: env::var("PUBLI24_LISTING_URL")
                    .unwrap_or(publi24_defaults.listing_url.clone()),
                limit: parse_var("PUBLI24_OFFERS_LIMIT", publi24_defaults.limit)?,
                ..publi24_defaults
            },
            retry: RetryPolicy {
                max_retries: parse_var("MAX_RETRIES", retry_defaults.max_retries)?,
                initial_backoff: Duration::from_secs(parse_var(
                    "INITIAL_BACKOFF_SECS",
                    retry_defaults.initial_backoff.as_secs(),
                )?),
                rate_limit_default: Duration::from_secs(parse_var(
                    "RATE_LIMIT_DEFAULT_SECS",
                    retry_defaults.rate_limit_default.as_secs(),
                )?),
            },
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "offers.db".to_string())
                .into(),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 69)?),
        })
    }
}

/// Read an optional numeric variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
