//! Persistence errors.

use liff_sdk::LiffError;

/// Errors raised by a [`crate::store::UserRepository`].
///
/// These never reach the controller's control flow; the controller reports
/// them through [`crate::store::PersistOutcome`] and the event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The record failed validation before reaching the backend.
    #[error("invalid user record: {0}")]
    Invalid(String),
    /// The storage backend failed (SQL error, poisoned state).
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The remote store could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote store answered with a failure.
    #[error("rejected by store ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<LiffError> for StoreError {
    fn from(err: LiffError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
