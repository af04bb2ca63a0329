use thiserror::Error;

/// Failures surfaced by the automation engine's CRUD and trigger paths.
///
/// The web layer renders these into `{ "success": false, "error": ... }`
/// bodies instead of raising transport errors.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} belongs to another owner")]
    Forbidden(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid schedule: {0}")]
    Schedule(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type AutomationResult<T> = Result<T, AutomationError>;
