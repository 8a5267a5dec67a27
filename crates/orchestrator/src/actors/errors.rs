//! Actor-specific error types.
//!
//! These are returned from spawn helpers, RPC queries and message delivery.
//! A handler that hits one of them logs and carries on; only
//! `SchedulingHalted` ends an agent.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the agent runtime.
#[derive(Debug, Clone, Error)]
pub enum ActorError {
    /// No mailbox is registered under the address.
    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    /// The recipient's mailbox is closed.
    #[error("Delivery to {to} failed: {reason}")]
    DeliveryFailed { to: String, reason: String },

    /// A message body could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// RPC call timed out.
    #[error("RPC timeout after {0:?}")]
    RpcTimeout(Duration),

    /// The actor is not available (stopped or not started).
    #[error("Actor not available")]
    ActorUnavailable,

    /// Failed to spawn an actor.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// The scheduler received a failure and stopped.
    #[error("Scheduling halted: {0}")]
    SchedulingHalted(String),

    /// Internal actor error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActorError {
    /// Create an unknown address error.
    pub fn unknown_address(address: impl Into<String>) -> Self {
        Self::UnknownAddress(address.into())
    }

    /// Create a delivery failure error.
    pub fn delivery_failed(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Create an RPC timeout error.
    pub fn rpc_timeout(duration: Duration) -> Self {
        Self::RpcTimeout(duration)
    }

    /// Create an actor unavailable error.
    pub fn actor_unavailable() -> Self {
        Self::ActorUnavailable
    }

    /// Create a spawn failure error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a scheduling halted error.
    pub fn scheduling_halted(reason: impl Into<String>) -> Self {
        Self::SchedulingHalted(reason.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<crate::Error> for ActorError {
    fn from(e: crate::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_unknown_address_error() {
        let err = ActorError::unknown_address("gom-9");
        assert!(matches!(err, ActorError::UnknownAddress(_)));
        assert!(err.to_string().contains("gom-9"));
    }

    #[test]
    fn should_describe_delivery_failure() {
        let err = ActorError::delivery_failed("tr-2", "mailbox closed");
        assert!(err.to_string().contains("tr-2"));
        assert!(err.to_string().contains("mailbox closed"));
    }

    #[test]
    fn should_convert_core_error_to_codec_error() {
        let core = crate::Error::json_parse_failed("eof");
        let err: ActorError = core.into();
        assert!(matches!(err, ActorError::Codec(_)));
    }

    #[test]
    fn should_create_rpc_timeout_error() {
        let err = ActorError::rpc_timeout(Duration::from_secs(5));
        assert!(matches!(err, ActorError::RpcTimeout(_)));
        assert!(err.to_string().contains("5s"));
    }
}
