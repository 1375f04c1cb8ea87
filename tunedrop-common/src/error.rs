//! Common error types for Tunedrop

use thiserror::Error;

/// Common result type for Tunedrop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the track-resolution and acquisition pipeline.
///
/// Every variant resolves to a state transition and a user-visible message;
/// none of them is fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    /// No artist, no track candidates, or no locatable source
    #[error("Not found: {0}")]
    NotFound(String),

    /// The source provider's automated-traffic defenses triggered
    #[error("Source blocked or rate-limited")]
    SourceBlocked,

    /// Fetched artifact exceeds the configured size ceiling
    #[error("Artifact is {size_bytes} bytes, limit is {limit_bytes}")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    /// An outbound call exceeded its time bound
    #[error("Operation timed out")]
    Timeout,

    /// Transient network failure
    #[error("Network error: {0}")]
    Network(String),

    /// Numeric selection outside the presented playlist
    #[error("Selection {given} is outside 1..={max}")]
    InvalidSelection { given: i64, max: usize },

    /// Non-transient provider or protocol fault
    #[error("Provider error: {0}")]
    Provider(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this failure is expected to resolve on retry.
    ///
    /// This is the single retryable-error predicate used by [`crate::RetryPolicy`]
    /// callers; structural failures (not found, oversized, blocked, bad
    /// selection) are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(Error::Network("reset".into()).is_transient());
        assert!(Error::Timeout.is_transient());
    }

    #[test]
    fn structural_kinds_are_not_transient() {
        assert!(!Error::NotFound("x".into()).is_transient());
        assert!(!Error::SourceBlocked.is_transient());
        assert!(!Error::TooLarge { size_bytes: 1, limit_bytes: 0 }.is_transient());
        assert!(!Error::InvalidSelection { given: 11, max: 10 }.is_transient());
        assert!(!Error::Provider("bad query".into()).is_transient());
    }
}
