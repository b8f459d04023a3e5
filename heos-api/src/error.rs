use thiserror::Error;

/// High-level API errors for HEOS protocol handling
///
/// These errors never describe socket problems; transport and timeout failures
/// live in `heos-stream`. What remains here is everything that can go wrong
/// once a complete line has been received, or before a command is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Protocol error
    ///
    /// The device sent a line that is not a valid HEOS envelope, or a payload
    /// that does not have the shape the command promised.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed failure response from the device
    ///
    /// Carries the vendor error id (`eid`) and text exactly as reported.
    #[error("Command {command} failed: eid {eid}: {text}")]
    CommandFailed {
        command: String,
        eid: i32,
        text: String,
    },

    /// Invalid parameter value
    ///
    /// Returned when a command is built with a value the device would reject,
    /// such as a volume above 100 or an empty player list.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ApiError {
    /// True when the device itself rejected the command
    pub fn is_command_failure(&self) -> bool {
        matches!(self, ApiError::CommandFailed { .. })
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::Protocol("missing heos envelope".to_string());
        assert_eq!(err.to_string(), "Protocol error: missing heos envelope");

        let err = ApiError::CommandFailed {
            command: "player/get_volume".to_string(),
            eid: 2,
            text: "ID Not Valid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command player/get_volume failed: eid 2: ID Not Valid"
        );
        assert!(err.is_command_failure());

        let err = ApiError::InvalidParameter("level 101 out of range".to_string());
        assert_eq!(err.to_string(), "Invalid parameter: level 101 out of range");
        assert!(!err.is_command_failure());
    }
}
