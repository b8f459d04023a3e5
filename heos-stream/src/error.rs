//! Error types for the heos-stream crate.

use std::time::Duration;

use crate::transport::Endpoint;

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket failed while connecting, reading or writing
    #[error("I/O error on {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connect did not complete in time
    #[error("Connecting to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    /// A write was attempted while no connection is open
    #[error("Not connected to {0}")]
    NotConnected(Endpoint),
}

/// Errors from a command cycle on the [`CommandChannel`](crate::CommandChannel).
///
/// Device-reported failures are not errors here; they come back as a failed
/// `HeosResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The connection failed or was lost before a response arrived
    #[error("Channel I/O failure: {0}")]
    Io(#[from] TransportError),

    /// No line arrived within the response timeout
    #[error("No response to {command} within {waited:?}")]
    ReadTimeout { command: String, waited: Duration },
}

impl ChannelError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::ReadTimeout { .. })
    }
}

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Neither the command nor the event connection could be opened
    #[error("Could not connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: Endpoint, reason: String },

    /// The session was used outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Convenience type alias for Results using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("192.168.1.20", 1255)
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::NotConnected(endpoint());
        assert_eq!(error.to_string(), "Not connected to 192.168.1.20:1255");

        let error = TransportError::ConnectTimeout {
            endpoint: endpoint(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            error.to_string(),
            "Connecting to 192.168.1.20:1255 timed out after 5s"
        );
    }

    #[test]
    fn test_channel_error_display() {
        let error = ChannelError::ReadTimeout {
            command: "system/heart_beat".to_string(),
            waited: Duration::from_secs(1),
        };
        assert_eq!(error.to_string(), "No response to system/heart_beat within 1s");
        assert!(error.is_timeout());

        let error: ChannelError = TransportError::NotConnected(endpoint()).into();
        assert!(!error.is_timeout());
        assert!(error.to_string().contains("Not connected"));
    }

    #[test]
    fn test_session_error_conversion() {
        let error: SessionError = ChannelError::ReadTimeout {
            command: "player/get_players".to_string(),
            waited: Duration::from_millis(500),
        }
        .into();
        assert!(matches!(error, SessionError::Channel(_)));

        let error = SessionError::InvalidConfig("port must not be 0".to_string());
        assert_eq!(error.to_string(), "Configuration error: port must not be 0");
    }
}
