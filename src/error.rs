use thiserror::Error;

/// Failure causes the pipeline branches on.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Delivery failed with status {status}: {body}")]
    HardDelivery { status: u16, body: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ScoutError {
    pub fn parse(msg: impl Into<String>) -> Self {
        ScoutError::Parse(msg.into())
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ScoutError::Unexpected(err.to_string())
        } else {
            ScoutError::Network(err.to_string())
        }
    }
}
