use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Extractor returned status {status} for {key}")]
    UpstreamStatus { key: String, status: u16 },

    #[error("Invalid target key: {0}")]
    InvalidKey(String),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Extraction timed out for {0}")]
    Timeout(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
