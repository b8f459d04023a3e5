//! Player handle with typed accessors
//!
//! Wraps the raw command results of [`HeosSystem`] into typed values for a
//! single player.

use std::ops::Range;

use heos_api::types::Player as PlayerInfo;
use heos_api::{GroupId, Media, OnOff, PlayMode, PlayState, PlayerId, QueueItem, RepeatMode};

use crate::{HeosSystem, SdkError};

/// Player handle
///
/// Cheap to clone; every method is a blocking round trip to the device and
/// a device-reported failure is returned as [`SdkError::Api`].
///
/// # Example
///
/// ```rust,ignore
/// let player = system.get_player_by_name("Kitchen")?.unwrap();
/// player.set_volume(30)?;
/// if player.play_state()? != PlayState::Play {
///     player.play()?;
/// }
/// ```
#[derive(Clone)]
pub struct Player {
    /// Player identifier
    pub pid: PlayerId,
    /// Friendly name of the player
    pub name: String,
    /// Model name (e.g. "HEOS 1")
    pub model: String,
    /// Group the player belonged to when the handle was created
    pub gid: Option<GroupId>,
    /// IP address as reported by the device
    pub ip: Option<String>,

    system: HeosSystem,
}

impl Player {
    pub(crate) fn from_info(info: PlayerInfo, system: HeosSystem) -> Self {
        Self {
            pid: info.pid,
            name: info.name,
            model: info.model,
            gid: info.gid,
            ip: info.ip,
            system,
        }
    }

    /// Fresh player information
    pub fn info(&self) -> Result<PlayerInfo, SdkError> {
        Ok(self.system.get_player_info(self.pid)?.into_payload()?)
    }

    // ========================================================================
    // Volume
    // ========================================================================

    /// Volume level (0-100)
    pub fn volume(&self) -> Result<u8, SdkError> {
        let response = self.system.get_volume(self.pid)?.into_result()?;
        Ok(response.parsed_attribute("level")?)
    }

    pub fn set_volume(&self, level: u8) -> Result<(), SdkError> {
        self.system.set_volume(self.pid, level)?.into_result()?;
        Ok(())
    }

    pub fn volume_up(&self, step: u8) -> Result<(), SdkError> {
        self.system.volume_up(self.pid, step)?.into_result()?;
        Ok(())
    }

    pub fn volume_down(&self, step: u8) -> Result<(), SdkError> {
        self.system.volume_down(self.pid, step)?.into_result()?;
        Ok(())
    }

    pub fn is_muted(&self) -> Result<bool, SdkError> {
        let response = self.system.get_mute(self.pid)?.into_result()?;
        Ok(response.parsed_attribute::<OnOff>("state")?.is_on())
    }

    pub fn set_mute(&self, mute: bool) -> Result<(), SdkError> {
        self.system.set_mute(self.pid, mute)?.into_result()?;
        Ok(())
    }

    pub fn toggle_mute(&self) -> Result<(), SdkError> {
        self.system.toggle_mute(self.pid)?.into_result()?;
        Ok(())
    }

    // ========================================================================
    // Playback
    // ========================================================================

    pub fn play_state(&self) -> Result<PlayState, SdkError> {
        let response = self.system.get_play_state(self.pid)?.into_result()?;
        Ok(response.parsed_attribute("state")?)
    }

    pub fn set_play_state(&self, state: PlayState) -> Result<(), SdkError> {
        self.system.set_play_state(self.pid, state)?.into_result()?;
        Ok(())
    }

    pub fn play(&self) -> Result<(), SdkError> {
        self.set_play_state(PlayState::Play)
    }

    pub fn pause(&self) -> Result<(), SdkError> {
        self.set_play_state(PlayState::Pause)
    }

    pub fn stop(&self) -> Result<(), SdkError> {
        self.set_play_state(PlayState::Stop)
    }

    pub fn next(&self) -> Result<(), SdkError> {
        self.system.play_next(self.pid)?.into_result()?;
        Ok(())
    }

    pub fn previous(&self) -> Result<(), SdkError> {
        self.system.play_previous(self.pid)?.into_result()?;
        Ok(())
    }

    pub fn now_playing(&self) -> Result<Media, SdkError> {
        Ok(self.system.get_now_playing_media(self.pid)?.into_payload()?)
    }

    pub fn play_mode(&self) -> Result<PlayMode, SdkError> {
        let response = self.system.get_play_mode(self.pid)?.into_result()?;
        Ok(PlayMode {
            repeat: response.parsed_attribute("repeat")?,
            shuffle: response.parsed_attribute("shuffle")?,
        })
    }

    pub fn set_play_mode(&self, repeat: RepeatMode, shuffle: bool) -> Result<(), SdkError> {
        self.system
            .set_play_mode(self.pid, repeat, shuffle)?
            .into_result()?;
        Ok(())
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Queue entries in `range` (zero based, end exclusive)
    pub fn queue(&self, range: Range<u32>) -> Result<Vec<QueueItem>, SdkError> {
        let response = self.system.get_queue(self.pid, range)?.into_result()?;
        // An empty queue comes back without a payload.
        Ok(response.payload.unwrap_or_default())
    }

    pub fn play_queue_item(&self, qid: i64) -> Result<(), SdkError> {
        self.system.play_queue_item(self.pid, qid)?.into_result()?;
        Ok(())
    }

    pub fn clear_queue(&self) -> Result<(), SdkError> {
        self.system.clear_queue(self.pid)?.into_result()?;
        Ok(())
    }

    pub fn play_input(&self, input: &str) -> Result<(), SdkError> {
        self.system.play_input(self.pid, input)?.into_result()?;
        Ok(())
    }

    pub fn play_preset(&self, preset: u32) -> Result<(), SdkError> {
        self.system.play_preset(self.pid, preset)?.into_result()?;
        Ok(())
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("gid", &self.gid)
            .finish()
    }
}
