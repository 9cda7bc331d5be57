use crate::model::JobState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Invalid target key: {0:?}")]
    InvalidKey(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("No job for target: {0}")]
    UnknownJob(String),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("Illegal job transition for {key}: {from} -> {to}")]
    IllegalTransition {
        key: String,
        from: JobState,
        to: JobState,
    },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] vgetit_scanner::ExtractError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
