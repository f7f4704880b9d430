//! Error types for the chat relay bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Remote login failed: unreachable, slot rejected or handshake timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// A session already exists for the thread
    #[error("Session already exists for thread {0}")]
    DuplicateSession(String),

    /// Relay-time send failed because the remote connection is not established
    #[error("Send error: {0}")]
    Send(String),

    /// Best-effort cleanup of a remote connection failed
    #[error("Disconnect error: {0}")]
    Disconnect(String),

    /// Connect request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The chat platform could not create the session thread
    #[error("Thread creation failed: {0}")]
    ThreadCreation(String),

    /// Chat platform call failed
    #[error("Platform error: {0}")]
    Platform(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = BridgeError::Connection("InvalidSlot".into());
        assert_eq!(err.to_string(), "Connection error: InvalidSlot");
    }

    #[test]
    fn test_json_error_converts() {
        let err: BridgeError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
