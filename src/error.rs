use thiserror::Error;

/// Errors surfaced by the lifecycle engine. CLI commands wrap these in
/// anyhow; callers that need to branch (conflict retry, missing-link
/// reporting) match on the variant.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Concurrent write on the same card. Retried internally a bounded
    /// number of times before reaching the caller.
    #[error("write conflict on card, retry")]
    ConflictRetryable,

    #[error(transparent)]
    Storage(rusqlite::Error),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        if is_busy(&e) {
            CoreError::ConflictRetryable
        } else {
            CoreError::Storage(e)
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

pub type CoreResult<T> = Result<T, CoreError>;
