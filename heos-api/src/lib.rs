//! HEOS CLI protocol model
//!
//! This crate knows what goes over the wire and nothing about sockets. It
//! provides:
//!
//! - [`HeosCommand`] and the per-group constructors in [`commands`]
//! - the pure response parser in [`parser`]
//! - [`HeosResponse`] / [`HeosEvent`], the parsed forms of one protocol line
//! - typed payloads in [`types`]
//!
//! ```rust
//! use heos_api::{commands, parser};
//!
//! let cmd = commands::player::get_volume(1);
//! assert_eq!(cmd.to_line(), "heos://player/get_volume?pid=1");
//!
//! let line = r#"{"heos": {"command": "player/get_volume", "result": "success", "message": "pid=1&level=20"}}"#;
//! let response = parser::parse_untyped_response(line);
//! assert_eq!(response.parsed_attribute::<u8>("level").unwrap(), 20);
//! ```
//!
//! Connection management lives in `heos-stream`; the blocking facade in
//! `heos-sdk`.

pub mod command;
pub mod commands;
pub mod error;
pub mod event;
pub mod parser;
pub mod response;
pub mod types;

pub use command::{CommandGroup, HeosCommand};
pub use error::{ApiError, Result};
pub use event::{EventCategory, EventKind, HeosEvent};
pub use response::{CommandError, HeosMessage, HeosResponse, HeosResult};
pub use types::{
    BrowseItem, Group, GroupId, GroupMember, GroupRole, Media, MusicSource, OnOff, PlayMode,
    PlayState, Player, PlayerId, QueueItem, RepeatMode, SourceId,
};

/// Default TCP port of the HEOS CLI
pub const DEFAULT_PORT: u16 = 1255;
