//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Subscription failed.
    #[error("subscription failed: {reason}")]
    SubscriptionFailed { reason: String },

    /// Channel closed.
    #[error("event channel closed")]
    ChannelClosed,

    /// The subscriber fell behind and missed events.
    #[error("subscriber lagged, {skipped} events skipped")]
    Lagged { skipped: u64 },
}

impl Error {
    /// Create a subscription failed error.
    pub fn subscription_failed(reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::subscription_failed("capacity must be positive");
        assert!(err.to_string().contains("capacity must be positive"));
        assert_eq!(Error::ChannelClosed.to_string(), "event channel closed");
        assert!(Error::Lagged { skipped: 3 }.to_string().contains('3'));
    }
}
