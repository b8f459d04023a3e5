use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    /// Invalid argument, malformed response or a command the device rejected
    #[error("API error: {0}")]
    Api(#[from] heos_api::ApiError),

    /// The command connection failed or the device did not answer in time
    #[error("Channel error: {0}")]
    Channel(#[from] heos_stream::ChannelError),

    #[error("Session error: {0}")]
    Session(#[from] heos_stream::SessionError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),
}

impl SdkError {
    /// True for errors that mean the device could not be talked to
    ///
    /// These are worth retrying or reporting as offline; anything else is a
    /// problem with the request itself.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SdkError::Channel(_) | SdkError::Session(heos_stream::SessionError::ConnectionFailed { .. })
        )
    }
}
