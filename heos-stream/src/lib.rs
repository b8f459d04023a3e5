//! # heos-stream
//!
//! Keeps a persistent, self-healing connection to a HEOS device.
//!
//! A [`HeosSession`] opens two TCP connections to the device: one for
//! request/response commands, serialized through the [`CommandChannel`],
//! and one that only receives pushed change events, decoded and fanned out to
//! [`HeosListener`]s by the [`EventDispatcher`]. A heartbeat watches both;
//! when it fails the session tears down, waits for the device to come back
//! and then recovers according to its [`RecoveryPolicy`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heos_api::{commands, HeosEvent};
//! use heos_stream::{HeosListener, HeosSession, SessionConfig};
//!
//! struct Printer;
//!
//! impl HeosListener for Printer {
//!     fn on_event(&self, event: &HeosEvent) {
//!         println!("{:?}", event.kind);
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = HeosSession::new(SessionConfig::new("192.168.1.20"))?;
//! let printer = Arc::new(Printer);
//! session.add_listener(&printer);
//! session.establish_connection().await?;
//!
//! let response = session
//!     .command_channel()
//!     .send(&commands::player::get_volume(1))
//!     .await?;
//! println!("{:?}", response.attribute("level"));
//! # Ok(())
//! # }
//! ```

mod command_channel;
mod config;
mod dispatcher;
mod error;
mod listener;
pub mod scheduler;
mod session;
mod transport;

pub use command_channel::CommandChannel;
pub use config::{RecoveryPolicy, SessionConfig};
pub use dispatcher::{EventDispatcher, Notification};
pub use error::{ChannelError, Result, SessionError, TransportError};
pub use listener::{HeosListener, ListenerId, ListenerRegistry};
pub use session::{EventClock, HeosSession, SessionState};
pub use transport::{Endpoint, LineHandler, TcpTransport, Transport};
