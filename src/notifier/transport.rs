use crate::error::ScoutError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Status and raw body of a messaging API reply
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One HTTP round-trip to the messaging API, without any retrying
#[async_trait]
pub trait Transport: Send + Sync {
    /// `Err(Network)` for transport-level failures, `Err(Unexpected)` for anything else
    async fn post_json(&self, url: &str, payload: &Value) -> Result<HttpReply, ScoutError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<HttpReply, ScoutError> {
        // The URL carries the bot token, keep it out of error text
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ScoutError::from(e.without_url()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ScoutError::from(e.without_url()))?;
        Ok(HttpReply { status, body })
    }
}
