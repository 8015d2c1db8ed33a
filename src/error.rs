//! Error taxonomy for the messaging core.
//!
//! Construction-time errors are synchronous; dispatch-time errors are
//! contained inside the dispatch loop and surface only as diagnostics;
//! request-correlation errors surface exactly once, through the pending
//! request they belong to.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Bad constructor input. Fatal to that construction call, never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Received data fails the minimal envelope contract. Dropped with a
    /// diagnostic, never thrown into caller code.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A registered callback failed. Isolated per listener; dispatch
    /// continues.
    #[error("Listener failed for '{message_type}': {reason}")]
    ListenerFailure {
        message_type: String,
        reason: String,
    },

    /// No response arrived within the configured window. Rejects the one
    /// pending request it belongs to.
    #[error("Request {request_id} timed out after {timeout:?}")]
    RequestTimeout {
        request_id: String,
        timeout: Duration,
    },

    /// The far end explicitly reported failure for a request.
    #[error("Remote error from {agent_id}: [{name}] {message}")]
    Remote {
        agent_id: String,
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// The owning channel closed while the operation was pending.
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = ChannelError::Remote {
            agent_id: "worker:w1".into(),
            name: "TypeError".into(),
            message: "bad payload".into(),
            stack: None,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("worker:w1"));
        assert!(rendered.contains("TypeError"));
        assert!(rendered.contains("bad payload"));
    }
}
