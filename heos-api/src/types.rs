//! Typed payloads and attribute values
//!
//! Payload structs mirror the JSON documents returned in the `payload` field
//! of a response. Unknown fields are ignored so that newer firmware does not
//! break deserialization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Player identifier (`pid`)
pub type PlayerId = i64;

/// Group identifier (`gid`), equal to the pid of the group leader
pub type GroupId = i64;

/// Music source identifier (`sid`)
pub type SourceId = i64;

/// A HEOS player as reported by `player/get_players`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub pid: PlayerId,
    #[serde(default)]
    pub gid: Option<GroupId>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub lineout: Option<i32>,
    #[serde(default)]
    pub serial: Option<String>,
}

/// Role of a player inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Leader,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,
    pub pid: PlayerId,
    pub role: GroupRole,
}

/// A player group as reported by `group/get_groups`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub gid: GroupId,
    #[serde(default)]
    pub players: Vec<GroupMember>,
}

impl Group {
    /// The member with the leader role, if the device reported one
    pub fn leader(&self) -> Option<&GroupMember> {
        self.players.iter().find(|m| m.role == GroupRole::Leader)
    }
}

/// Now-playing media for a player
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub qid: Option<i64>,
    #[serde(default)]
    pub sid: Option<SourceId>,
    #[serde(default)]
    pub station: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image_url: String,
    pub qid: i64,
    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub album_id: String,
}

/// A music source from `browse/get_music_sources`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicSource {
    pub name: String,
    pub sid: SourceId,
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub available: Option<String>,
    #[serde(default)]
    pub service_username: Option<String>,
}

impl MusicSource {
    pub fn is_available(&self) -> bool {
        self.available.as_deref() != Some("false")
    }
}

/// One entry returned by `browse/browse`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub playable: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub image_url: String,
}

impl BrowseItem {
    pub fn is_container(&self) -> bool {
        self.container.as_deref() == Some("yes")
    }

    pub fn is_playable(&self) -> bool {
        self.playable.as_deref() == Some("yes")
    }
}

/// Declares a closed set of attribute values with their wire spelling.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ApiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ApiError::Protocol(format!(
                        concat!("unknown ", stringify!($name), " value '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// Transport state of a player
    PlayState {
        Play => "play",
        Pause => "pause",
        Stop => "stop",
    }
);

wire_enum!(
    RepeatMode {
        All => "on_all",
        One => "on_one",
        Off => "off",
    }
);

wire_enum!(
    /// `on`/`off` switch used by mute, shuffle and push registration
    OnOff {
        On => "on",
        Off => "off",
    }
);

impl From<bool> for OnOff {
    fn from(value: bool) -> Self {
        if value {
            OnOff::On
        } else {
            OnOff::Off
        }
    }
}

impl OnOff {
    pub fn is_on(&self) -> bool {
        matches!(self, OnOff::On)
    }
}

/// Repeat and shuffle settings of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayMode {
    pub repeat: RepeatMode,
    pub shuffle: OnOff,
}
