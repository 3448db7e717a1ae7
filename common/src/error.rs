use thiserror::Error;

/// The four error kinds the reservation core surfaces to its callers (see
/// SPEC_FULL.md §7). Every action-layer function returns `AppResult<T>`;
/// library crates (store/coordination/events) return `anyhow::Result` at
/// their internal seams and get converted here at the boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// True for errors a retrying client should treat as transient rather
    /// than a rejection of the request itself.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
