use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("catalog request failed: {0}")]
    Request(String),

    #[error("catalog responded with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("product {0} not found")]
    ProductNotFound(String),

    #[error("malformed catalog payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for CommerceError {
    fn from(err: reqwest::Error) -> Self {
        CommerceError::Request(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
