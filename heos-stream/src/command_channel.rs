//! Request/response channel over the command connection
//!
//! The protocol has no correlation ids, so at most one command may be in
//! flight: every send holds the inbox lock for its whole cycle. Lines from
//! the read loop land in the inbox; a send drains whatever a timed-out
//! predecessor left behind, writes its line, then waits for the answer.

use std::sync::Arc;
use std::time::Duration;

use heos_api::command::COMMAND_PREFIX;
use heos_api::parser::parse_message;
use heos_api::{HeosCommand, HeosResponse};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ChannelError, TransportError};
use crate::transport::{Endpoint, Transport};

type Inbox = mpsc::UnboundedReceiver<String>;

/// Serialized command/response exchange with a device
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    response_timeout: Duration,
    inbox: Mutex<Option<Inbox>>,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn Transport>, response_timeout: Duration) -> Self {
        Self {
            transport,
            response_timeout,
            inbox: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Connect the transport and start routing its lines into a fresh inbox
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut inbox = self.inbox.lock().await;
        self.transport.connect().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.transport
            .start_read_loop(Arc::new(move |line| {
                // The receiver is gone once the channel disconnects.
                let _ = tx.send(line);
            }))
            .await?;

        *inbox = Some(rx);
        Ok(())
    }

    /// Disconnect the transport
    ///
    /// A send that is waiting for its answer fails with an I/O error as soon
    /// as the read loop is gone.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
        self.inbox.lock().await.take();
    }

    /// Send a command and return its response, discarding any payload
    pub async fn send(&self, command: &HeosCommand) -> Result<HeosResponse<()>, ChannelError> {
        self.send_typed::<serde::de::IgnoredAny>(command)
            .await
            .map(HeosResponse::without_payload)
    }

    /// Send a command and deserialize its payload as `T`
    pub async fn send_typed<T>(&self, command: &HeosCommand) -> Result<HeosResponse<T>, ChannelError>
    where
        T: DeserializeOwned,
    {
        self.round_trip(&command.to_line(), &command.path()).await
    }

    /// Send a preformatted `heos://` line
    pub async fn send_raw(&self, line: &str) -> Result<HeosResponse<()>, ChannelError> {
        let line = line.trim();
        let path = line
            .strip_prefix(COMMAND_PREFIX)
            .unwrap_or(line)
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
        self.round_trip::<serde::de::IgnoredAny>(line, &path)
            .await
            .map(HeosResponse::without_payload)
    }

    async fn round_trip<T>(&self, line: &str, path: &str) -> Result<HeosResponse<T>, ChannelError>
    where
        T: DeserializeOwned,
    {
        let mut guard = self.inbox.lock().await;
        let inbox = guard
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(self.endpoint().clone()))?;

        while let Ok(stale) = inbox.try_recv() {
            tracing::debug!("Discarding stale line before {}: {}", path, stale);
        }

        self.transport.write_line(line).await?;

        // Skipped lines do not extend the wait; only an interim answer does.
        let mut deadline = tokio::time::Instant::now() + self.response_timeout;
        loop {
            let received = match tokio::time::timeout_at(deadline, inbox.recv()).await {
                Ok(Some(received)) => received,
                Ok(None) => {
                    return Err(ChannelError::Io(TransportError::Io {
                        endpoint: self.endpoint().clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed while waiting for a response",
                        ),
                    }));
                }
                Err(_) => {
                    return Err(ChannelError::ReadTimeout {
                        command: path.to_string(),
                        waited: self.response_timeout,
                    });
                }
            };

            if received.trim() == line {
                tracing::trace!("Skipping echo of {}", path);
                continue;
            }

            let message = match parse_message(&received) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Unparseable response to {}: {}", path, e);
                    return Ok(HeosResponse::protocol_failure(path, e.to_string()));
                }
            };

            if message.is_event() {
                tracing::debug!("Ignoring {} on the command connection", message.command);
                continue;
            }
            if message.command != path {
                tracing::debug!(
                    "Discarding late response to {} while waiting for {}",
                    message.command,
                    path
                );
                continue;
            }
            if message.is_under_process() {
                tracing::debug!("{} is under process, waiting for the final response", path);
                deadline = tokio::time::Instant::now() + self.response_timeout;
                continue;
            }

            let response = message.into_response::<T>();
            if let Some(error) = &response.error {
                tracing::debug!("{} failed: eid={} text={}", path, error.eid, error.text);
            }
            return Ok(response);
        }
    }
}
