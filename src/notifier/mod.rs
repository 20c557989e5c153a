//! Telegram notifier.
//!
//! Every request goes through [`Notifier::dispatch`], which retries rate
//! limits and network errors within the configured budget. Callers only see
//! whether the delivery succeeded.

pub mod transport;

pub use transport::{ReqwestTransport, Transport};

use crate::config::{RetryPolicy, TelegramConfig};
use crate::error::ScoutError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Most photos the messaging API accepts in one media group
const MEDIA_GROUP_LIMIT: usize = 10;

pub struct Notifier {
    transport: Arc<dyn Transport>,
    telegram: TelegramConfig,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(telegram: TelegramConfig, retry: RetryPolicy, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            telegram,
            retry,
        }
    }

    /// Chat the pipeline delivers to
    pub fn chat_id(&self) -> &str {
        &self.telegram.chat_id
    }

    pub async fn send_text(&self, message: &str, chat_target: &str) -> bool {
        let payload = json!({
            "chat_id": chat_target,
            "text": strip_line_breaks(message),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        self.dispatch("sendMessage", &payload).await.is_some()
    }

    /// Send photos as albums of at most ten. An empty list succeeds without a request.
    pub async fn send_photo_group(&self, photo_urls: &[String], chat_target: &str) -> bool {
        let mut delivered = true;

        for chunk in photo_urls.chunks(MEDIA_GROUP_LIMIT) {
            let sent = match chunk {
                // Media groups need at least two items
                [single] => {
                    let payload = json!({ "chat_id": chat_target, "photo": single });
                    self.dispatch("sendPhoto", &payload).await
                }
                photos => {
                    let media: Vec<Value> = photos
                        .iter()
                        .map(|url| json!({ "type": "photo", "media": url }))
                        .collect();
                    let payload = json!({ "chat_id": chat_target, "media": media });
                    self.dispatch("sendMediaGroup", &payload).await
                }
            };
            delivered &= sent.is_some();
        }

        delivered
    }

    /// Deliver `payload` to a bot API method, retrying transient failures.
    ///
    /// Returns the decoded reply on HTTP 200, `None` once the request failed
    /// for good.
    pub async fn dispatch(&self, method: &str, payload: &Value) -> Option<Value> {
        let url = self.telegram.method_url(method);
        let mut backoff = self.retry.initial_backoff;

        for attempt in 1..=self.retry.max_retries {
            match self.attempt(&url, payload).await {
                Ok(body) => {
                    info!(method, attempt, "Message sent successfully");
                    return Some(body);
                }
                Err(ScoutError::RateLimited { retry_after }) => {
                    warn!(method, attempt, "Too Many Requests: retry after {} seconds", retry_after);
                    // Waiting is pointless once the budget is spent
                    if attempt < self.retry.max_retries {
                        sleep(Duration::from_secs(retry_after)).await;
                    }
                }
                Err(ScoutError::Network(e)) => {
                    warn!(method, attempt, "Network error, retrying in {:?}: {}", backoff, e);
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    error!(method, attempt, "Failed to send request: {}", e);
                    return None;
                }
            }
        }

        error!(method, "Giving up after {} attempts", self.retry.max_retries);
        None
    }

    async fn attempt(&self, url: &str, payload: &Value) -> Result<Value, ScoutError> {
        let reply = self.transport.post_json(url, payload).await?;
        debug!(status = reply.status, "Messaging API replied");

        match reply.status {
            200 => serde_json::from_str(&reply.body)
                .map_err(|e| ScoutError::Unexpected(format!("unreadable success body: {}", e))),
            429 => Err(ScoutError::RateLimited {
                retry_after: retry_after_hint(&reply.body)
                    .unwrap_or(self.retry.rate_limit_default.as_secs()),
            }),
            status => Err(ScoutError::HardDelivery {
                status,
                body: reply.body,
            }),
        }
    }
}

/// `parameters.retry_after` of a 429 reply, if the body carries one
fn retry_after_hint(body: &str) -> Option<u64> {
    let body: Value = serde_json::from_str(body).ok()?;
    body.get("parameters")?.get("retry_after")?.as_u64()
}

/// The messaging API renders a restricted HTML subset without `<br>`.
pub fn strip_line_breaks(text: &str) -> String {
    text.replace("<br />", "")
        .replace("<br/>", "")
        .replace("<br>", "")
}

#[cfg(test)]
mod tests {
    use super::transport::testing::ScriptedTransport;
    use super::transport::HttpReply;
    use super::*;
    use tokio::time::Instant;

    fn notifier(transport: Arc<ScriptedTransport>) -> Notifier {
        let telegram = TelegramConfig {
            api_base: "https://api.telegram.org".to_string(),
            token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        };
        Notifier::new(telegram, RetryPolicy::default(), transport)
    }

    /// Timer ticks round up to the millisecond, so allow a little slack
    fn assert_elapsed(started: Instant, secs: u64) {
        let elapsed = started.elapsed();
        let expected = Duration::from_secs(secs);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "expected ~{:?}, slept {:?}",
            expected,
            elapsed
        );
    }

    fn network_error() -> Result<HttpReply, ScoutError> {
        Err(ScoutError::Network("connection reset".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_wait_for_the_hinted_delay() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(429, r#"{"ok":false,"parameters":{"retry_after":2}}"#),
            ScriptedTransport::status(429, r#"{"ok":false,"parameters":{"retry_after":1}}"#),
            ScriptedTransport::status(200, r#"{"ok":true,"result":{"message_id":7}}"#),
        ]));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        let body = notifier.dispatch("sendMessage", &json!({})).await;

        assert_elapsed(started, 3);
        assert_eq!(body.unwrap()["result"]["message_id"], 7);
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_back_off_exponentially_then_give_up() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..6).map(|_| network_error()).collect(),
        ));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        let body = notifier.dispatch("sendMessage", &json!({})).await;

        assert!(body.is_none());
        assert_eq!(transport.calls().len(), 5);
        // 1 + 2 + 4 + 8 + 16
        assert_elapsed(started, 31);
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_then_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            network_error(),
            ScriptedTransport::ok(),
        ]));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_some());
        assert_elapsed(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_body_uses_default_delay() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(429, "Too Many Requests"),
            ScriptedTransport::ok(),
        ]));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_some());
        assert_elapsed(started, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_consume_attempts() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..6)
                .map(|_| ScriptedTransport::status(429, r#"{"parameters":{"retry_after":1}}"#))
                .collect(),
        ));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_none());
        assert_eq!(transport.calls().len(), 5);
        // No wait after the last rejected attempt
        assert_elapsed(started, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_failures_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::status(
            400,
            r#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        )]));
        let notifier = notifier(transport.clone());

        let started = Instant::now();
        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_none());
        assert_eq!(transport.calls().len(), 1);
        assert_elapsed(started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_errors_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ScoutError::Unexpected("builder error".to_string())),
            ScriptedTransport::status(200, "not json"),
        ]));
        let notifier = notifier(transport.clone());

        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_none());
        assert!(notifier.dispatch("sendMessage", &json!({})).await.is_none());
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn send_text_strips_breaks_and_disables_previews() {
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = notifier(transport.clone());

        assert!(notifier.send_text("<b>Title</b><br />\nline<br>two", "42").await);

        let calls = transport.calls();
        assert_eq!(calls[0].0, "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(calls[0].1["text"], "<b>Title</b>\nlinetwo");
        assert_eq!(calls[0].1["parse_mode"], "HTML");
        assert_eq!(calls[0].1["disable_web_page_preview"], true);
        assert_eq!(calls[0].1["chat_id"], "42");
    }

    #[tokio::test]
    async fn empty_photo_group_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = notifier(transport.clone());

        assert!(notifier.send_photo_group(&[], "42").await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn photos_are_split_into_albums_of_ten() {
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = notifier(transport.clone());
        let photos: Vec<String> = (0..11)
            .map(|i| format!("https://cdn.example.com/{}.jpg", i))
            .collect();

        assert!(notifier.send_photo_group(&photos, "42").await);

        assert_eq!(transport.methods(), vec!["sendMediaGroup", "sendPhoto"]);
        let calls = transport.calls();
        assert_eq!(calls[0].1["media"].as_array().unwrap().len(), 10);
        assert_eq!(calls[0].1["media"][0]["type"], "photo");
        assert_eq!(calls[1].1["photo"], "https://cdn.example.com/10.jpg");
    }

    #[tokio::test]
    async fn failed_album_fails_the_group() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(400, "{}"),
            ScriptedTransport::ok(),
        ]));
        let notifier = notifier(transport.clone());
        let photos: Vec<String> = (0..12)
            .map(|i| format!("https://cdn.example.com/{}.jpg", i))
            .collect();

        assert!(!notifier.send_photo_group(&photos, "42").await);
        // The second album is still attempted
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn retry_hint_is_read_from_parameters() {
        assert_eq!(retry_after_hint(r#"{"parameters":{"retry_after":12}}"#), Some(12));
        assert_eq!(retry_after_hint(r#"{"ok":false}"#), None);
        assert_eq!(retry_after_hint("<html>"), None);
    }
}
