//! Unsolicited change events pushed on the event connection

use std::collections::HashMap;

use crate::types::{GroupId, Media, PlayerId};

/// The change events a HEOS device pushes after
/// `system/register_for_change_events?enable=on`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    SourcesChanged,
    PlayersChanged,
    GroupsChanged,
    PlayerStateChanged,
    PlayerNowPlayingChanged,
    PlayerNowPlayingProgress,
    PlayerPlaybackError,
    PlayerQueueChanged,
    PlayerVolumeChanged,
    RepeatModeChanged,
    ShuffleModeChanged,
    GroupVolumeChanged,
    UserChanged,
    /// Any `event/...` the client does not model yet
    Unknown(String),
}

impl EventKind {
    /// Resolve the name after the `event/` prefix
    pub fn from_name(name: &str) -> Self {
        match name {
            "sources_changed" => EventKind::SourcesChanged,
            "players_changed" => EventKind::PlayersChanged,
            "groups_changed" => EventKind::GroupsChanged,
            "player_state_changed" => EventKind::PlayerStateChanged,
            "player_now_playing_changed" => EventKind::PlayerNowPlayingChanged,
            "player_now_playing_progress" => EventKind::PlayerNowPlayingProgress,
            "player_playback_error" => EventKind::PlayerPlaybackError,
            "player_queue_changed" => EventKind::PlayerQueueChanged,
            "player_volume_changed" => EventKind::PlayerVolumeChanged,
            "repeat_mode_changed" => EventKind::RepeatModeChanged,
            "shuffle_mode_changed" => EventKind::ShuffleModeChanged,
            "group_volume_changed" => EventKind::GroupVolumeChanged,
            "user_changed" => EventKind::UserChanged,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::PlayerStateChanged
            | EventKind::PlayerNowPlayingProgress
            | EventKind::PlayerPlaybackError
            | EventKind::PlayerQueueChanged
            | EventKind::PlayerVolumeChanged
            | EventKind::RepeatModeChanged
            | EventKind::ShuffleModeChanged
            | EventKind::GroupVolumeChanged => EventCategory::PlayerState,
            EventKind::PlayerNowPlayingChanged => EventCategory::NowPlaying,
            EventKind::PlayersChanged | EventKind::GroupsChanged => EventCategory::Topology,
            EventKind::UserChanged => EventCategory::Session,
            EventKind::SourcesChanged => EventCategory::Browse,
            EventKind::Unknown(_) => EventCategory::System,
        }
    }
}

/// Coarse routing category of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Playback, volume, mode and queue changes on a player or group
    PlayerState,
    /// The track or station on a player changed
    NowPlaying,
    /// Players or groups were added, removed or regrouped
    Topology,
    /// The signed-in account changed
    Session,
    /// Browse results or music source availability changed
    Browse,
    /// Anything else the device pushes
    System,
}

/// A decoded change event (the EventObject of the protocol)
#[derive(Debug, Clone, PartialEq)]
pub struct HeosEvent {
    pub kind: EventKind,
    /// Full `event/...` path as received
    pub command: String,
    pub attributes: HashMap<String, String>,
    /// Filled in by the dispatcher for now-playing changes
    pub now_playing: Option<Media>,
}

impl HeosEvent {
    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.attribute("pid").and_then(|v| v.parse().ok())
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.attribute("gid").and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_categories() {
        assert_eq!(
            EventKind::from_name("player_state_changed").category(),
            EventCategory::PlayerState
        );
        assert_eq!(
            EventKind::from_name("player_now_playing_changed").category(),
            EventCategory::NowPlaying
        );
        assert_eq!(
            EventKind::from_name("groups_changed").category(),
            EventCategory::Topology
        );
        assert_eq!(
            EventKind::from_name("user_changed").category(),
            EventCategory::Session
        );
        assert_eq!(
            EventKind::from_name("firmware_ready"),
            EventKind::Unknown("firmware_ready".to_string())
        );
    }
}
