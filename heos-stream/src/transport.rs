//! Line-oriented TCP transport to a single device endpoint
//!
//! A transport owns one socket. Lines written to it get the protocol's
//! `\r\n` terminator appended; lines read from it are handed, one by one and
//! in arrival order, to the callback given to
//! [`Transport::start_read_loop`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::TransportError;

/// Callback invoked by the read loop for every received line
pub type LineHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Identity of a transport: the device address and CLI port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A bidirectional, line-delimited connection to a device
///
/// The session drives two independent transports, one for commands and one
/// for pushed events. Tests substitute their own implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Open the connection, replacing any previous one
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection and stop the read loop. Never fails.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Check that something accepts connections at the endpoint
    ///
    /// Independent of this transport's own connection state.
    async fn is_host_reachable(&self) -> bool;

    /// Start delivering received lines to `on_line`
    ///
    /// The loop ends silently on EOF or a socket error and marks the
    /// transport disconnected; owners notice through later failures.
    async fn start_read_loop(&self, on_line: LineHandler) -> Result<(), TransportError>;

    /// Write one line. No retry.
    async fn write_line(&self, line: &str) -> Result<(), TransportError>;
}

/// [`Transport`] over a tokio `TcpStream`
pub struct TcpTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    probe_timeout: Duration,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    /// Bumped on every connect so a finishing read loop of an older
    /// connection cannot mark the current one as disconnected
    generation: Arc<AtomicU64>,
}

impl TcpTransport {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            probe_timeout,
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            read_task: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> TransportError {
        TransportError::Io {
            endpoint: self.endpoint.clone(),
            source,
        }
    }

    fn stop_read_loop(&self) {
        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            self.disconnect().await;
        }

        let addr = (self.endpoint.host.as_str(), self.endpoint.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                endpoint: self.endpoint.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|e| self.io_error(e))?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY on {}: {}", self.endpoint, e);
        }

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock() = Some(read_half);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("Connected to {}", self.endpoint);
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop_read_loop();
        self.reader.lock().take();
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::trace!("Ignoring shutdown error on {}: {}", self.endpoint, e);
            }
            tracing::debug!("Disconnected from {}", self.endpoint);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_host_reachable(&self) -> bool {
        let addr = (self.endpoint.host.as_str(), self.endpoint.port);
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_probe)) => true,
            Ok(Err(e)) => {
                tracing::trace!("{} not reachable: {}", self.endpoint, e);
                false
            }
            Err(_) => {
                tracing::trace!("{} probe timed out", self.endpoint);
                false
            }
        }
    }

    async fn start_read_loop(&self, on_line: LineHandler) -> Result<(), TransportError> {
        let read_half = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| TransportError::NotConnected(self.endpoint.clone()))?;

        let endpoint = self.endpoint.clone();
        let connected = Arc::clone(&self.connected);
        let generation = Arc::clone(&self.generation);
        let own_generation = generation.load(Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        on_line(line);
                    }
                    Ok(None) => {
                        tracing::debug!("Connection to {} closed by peer", endpoint);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("Read loop for {} ended: {}", endpoint, e);
                        break;
                    }
                }
            }
            if generation.load(Ordering::SeqCst) == own_generation {
                connected.store(false, Ordering::SeqCst);
            }
        });

        self.stop_read_loop();
        *self.read_task.lock() = Some(task);
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(self.endpoint.clone()))?;

        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str("\r\n");

        let result = match writer.write_all(framed.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.connected.store(false, Ordering::SeqCst);
            return Err(self.io_error(e));
        }

        tracing::trace!("-> {}: {}", self.endpoint, line);
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_read_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn transport_for(port: u16) -> TcpTransport {
        TcpTransport::new(
            Endpoint::new("127.0.0.1", port),
            Duration::from_secs(1),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_write_appends_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = transport_for(port);

        transport.connect().await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        assert!(transport.is_connected());

        transport.write_line("heos://system/heart_beat").await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"heos://system/heart_beat\r\n");
    }

    #[tokio::test]
    async fn test_read_loop_splits_lines_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = transport_for(port);
        transport.connect().await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        transport
            .start_read_loop(Arc::new(move |line| {
                let _ = tx.send(line);
            }))
            .await
            .unwrap();

        server.write_all(b"first\r\n\r\nsecond\nthi").await.unwrap();
        server.write_all(b"rd\r\n").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(rx.recv().await.unwrap(), "second");
        assert_eq!(rx.recv().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn test_peer_close_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = transport_for(port);
        transport.connect().await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        transport.start_read_loop(Arc::new(|_| {})).await.unwrap();
        drop(server);

        for _ in 0..50 {
            if !transport.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_write_without_connection_fails() {
        let transport = transport_for(1);
        let result = transport.write_line("heos://system/heart_beat").await;
        assert!(matches!(result, Err(TransportError::NotConnected(_))));
        // Disconnecting twice is harmless.
        transport.disconnect().await;
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_reachability_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = transport_for(port);
        assert!(transport.is_host_reachable().await);
        assert!(!transport.is_connected());

        drop(listener);
        assert!(!transport.is_host_reachable().await);
    }
}
