use reqwest::StatusCode;
use std::time::Duration;

/// Errors produced inside the EarthGuard core.
///
/// Backend and location failures are absorbed at the component that produced
/// them; only input validation and admission control reach callers of
/// `ConversationStore::submit`.
#[derive(Debug, thiserror::Error)]
pub enum EarthGuardError {
    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),

    #[error("a request is already in flight")]
    RequestPending,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend error: {status}: {body}")]
    Backend { status: StatusCode, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("location error: {0}")]
    Location(String),
}

pub type Result<T> = std::result::Result<T, EarthGuardError>;
