//! # HEOS SDK - blocking API for HEOS players
//!
//! Connects to one HEOS device and controls every player on its network
//! through it:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heos_sdk::{HeosEvent, HeosListener, HeosSystem};
//!
//! struct Printer;
//!
//! impl HeosListener for Printer {
//!     fn on_event(&self, event: &HeosEvent) {
//!         println!("{} {:?}", event.command, event.attributes);
//!     }
//!
//!     fn on_connection_lost(&self) {
//!         println!("device went away");
//!     }
//! }
//!
//! fn main() -> Result<(), heos_sdk::SdkError> {
//!     let system = HeosSystem::connect("192.168.1.20")?;
//!     let printer = Arc::new(Printer);
//!     system.add_listener(&printer);
//!
//!     let player = system
//!         .get_player_by_name("Living Room")?
//!         .ok_or_else(|| heos_sdk::SdkError::PlayerNotFound("Living Room".to_string()))?;
//!     println!("volume: {}", player.volume()?);
//!     player.play()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Sync API**: no async runtime needed in the application
//! - **Self-healing session**: a heartbeat detects dead connections and the
//!   session reconnects once the device is reachable again
//! - **Push events**: change events are decoded and delivered to listeners
//!   on a dedicated thread, which may call back into the system
//!
//! ## Architecture
//!
//! ```text
//! heos-sdk (HeosSystem, Player, Group)
//!     ↓
//! heos-stream (session, heartbeat, recovery, event dispatch)
//!     ↓
//! heos-api (commands, response parsing, payload types)
//! ```

pub mod logging;

mod error;
mod group;
mod player;
mod system;

pub use error::SdkError;
pub use group::Group;
pub use player::Player;
pub use system::{default_config_path, HeosSystem};

pub use heos_api::types::{Group as GroupInfo, Player as PlayerInfo};
pub use heos_api::{
    BrowseItem, EventKind, GroupId, GroupMember, GroupRole, HeosCommand, HeosEvent, HeosResponse,
    HeosResult, Media, MusicSource, OnOff, PlayMode, PlayState, PlayerId, QueueItem, RepeatMode,
    SourceId,
};
pub use heos_stream::{HeosListener, ListenerId, RecoveryPolicy, SessionConfig, SessionState};
