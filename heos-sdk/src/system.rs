//! HeosSystem - Main entry point for the SDK
//!
//! Provides a sync-first API over one HEOS device session. Every operation
//! blocks on the session's command channel; listener callbacks run on the
//! session's dispatcher thread and may call back into the system.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use heos_api::commands::{browse, group, player, system};
use heos_api::types::{Group as GroupInfo, Player as PlayerInfo};
use heos_api::{
    BrowseItem, GroupId, HeosCommand, HeosResponse, Media, MusicSource, PlayState, PlayerId,
    QueueItem, RepeatMode, SourceId,
};
use heos_stream::{
    HeosListener, HeosSession, ListenerId, SessionConfig, SessionState, Transport,
};
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;

use crate::{Group, Player, SdkError};

pub(crate) struct SystemInner {
    // Dropped before the runtime it runs on.
    session: HeosSession,
    runtime: Runtime,
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        // block_on is not allowed from inside another runtime.
        if tokio::runtime::Handle::try_current().is_err() {
            self.runtime.block_on(self.session.shutdown());
        } else {
            tracing::warn!("HeosSystem dropped inside an async context, skipping graceful shutdown");
        }
    }
}

/// Main system entry point
///
/// HeosSystem is fully synchronous - no async/await required. It must not be
/// used from inside an async context.
///
/// # Example
///
/// ```rust,no_run
/// use heos_sdk::HeosSystem;
///
/// fn main() -> Result<(), heos_sdk::SdkError> {
///     let system = HeosSystem::connect("192.168.1.20")?;
///
///     for player in system.players()? {
///         println!("{} is at volume {}", player.name, player.volume()?);
///     }
///
///     let kitchen = system
///         .get_player_by_name("Kitchen")?
///         .ok_or_else(|| heos_sdk::SdkError::PlayerNotFound("Kitchen".to_string()))?;
///     kitchen.set_volume(25)?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HeosSystem {
    inner: Arc<SystemInner>,
}

impl HeosSystem {
    /// Connect to the device at `host` with default settings
    pub fn connect(host: &str) -> Result<Self, SdkError> {
        Self::with_config(SessionConfig::new(host))
    }

    /// Connect using the given session configuration
    pub fn with_config(config: SessionConfig) -> Result<Self, SdkError> {
        let system = Self::unconnected(config)?;
        system.reconnect()?;
        Ok(system)
    }

    /// Load the configuration from a TOML file and connect
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, SdkError> {
        tracing::debug!("Loading configuration from {}", path.as_ref().display());
        let config = SessionConfig::from_file(path)?;
        Self::with_config(config)
    }

    /// Load `<config dir>/heos/config.toml` and connect
    pub fn from_default_config() -> Result<Self, SdkError> {
        let path = default_config_path()
            .ok_or_else(|| SdkError::Config("no configuration directory on this platform".to_string()))?;
        Self::from_config_file(path)
    }

    /// Create the system without connecting
    ///
    /// Call [`HeosSystem::reconnect`] to establish the session.
    pub fn unconnected(config: SessionConfig) -> Result<Self, SdkError> {
        let runtime = build_runtime()?;
        let session = {
            let _guard = runtime.enter();
            HeosSession::new(config)?
        };
        Ok(Self::from_parts(session, runtime))
    }

    /// Create the system over custom transports, without connecting
    pub fn with_transports(
        config: SessionConfig,
        command_transport: Arc<dyn Transport>,
        event_transport: Arc<dyn Transport>,
    ) -> Result<Self, SdkError> {
        let runtime = build_runtime()?;
        let session = {
            let _guard = runtime.enter();
            HeosSession::with_transports(config, command_transport, event_transport)?
        };
        Ok(Self::from_parts(session, runtime))
    }

    fn from_parts(session: HeosSession, runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(SystemInner { session, runtime }),
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// (Re-)establish the session
    ///
    /// Needed after a connection-restored notification when the session is
    /// configured with [`heos_stream::RecoveryPolicy::NotifyOnly`].
    pub fn reconnect(&self) -> Result<(), SdkError> {
        tracing::debug!("Connecting to {}", self.inner.session.endpoint());
        self.inner
            .runtime
            .block_on(self.inner.session.establish_connection())?;
        Ok(())
    }

    /// Stop heartbeat and recovery and close both connections
    pub fn shutdown(&self) {
        self.inner.runtime.block_on(self.inner.session.shutdown());
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    pub fn config(&self) -> &SessionConfig {
        self.inner.session.config()
    }

    pub fn session(&self) -> &HeosSession {
        &self.inner.session
    }

    /// Register a listener for events and connectivity changes
    ///
    /// The system only keeps a weak reference; keep the `Arc` alive for as
    /// long as notifications are wanted.
    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerId
    where
        L: HeosListener + 'static,
    {
        self.inner.session.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.session.remove_listener(id)
    }

    /// Send a command and deserialize its payload as `T`
    ///
    /// Device-reported failures come back as a failed response; only
    /// connection failures and timeouts are errors.
    pub fn send<T>(&self, command: &HeosCommand) -> Result<HeosResponse<T>, SdkError>
    where
        T: DeserializeOwned,
    {
        let channel = self.inner.session.command_channel();
        Ok(self.inner.runtime.block_on(channel.send_typed::<T>(command))?)
    }

    /// Send a command whose payload is not needed
    pub fn execute(&self, command: &HeosCommand) -> Result<HeosResponse<()>, SdkError> {
        let channel = self.inner.session.command_channel();
        Ok(self.inner.runtime.block_on(channel.send(command))?)
    }

    /// Send a preformatted `heos://` command line
    pub fn send_raw(&self, line: &str) -> Result<HeosResponse<()>, SdkError> {
        let channel = self.inner.session.command_channel();
        Ok(self.inner.runtime.block_on(channel.send_raw(line))?)
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// All players on the network
    pub fn players(&self) -> Result<Vec<Player>, SdkError> {
        let players = self.get_players()?.into_payload()?;
        Ok(players
            .into_iter()
            .map(|info| Player::from_info(info, self.clone()))
            .collect())
    }

    /// Find a player by its friendly name
    pub fn get_player_by_name(&self, name: &str) -> Result<Option<Player>, SdkError> {
        Ok(self.players()?.into_iter().find(|p| p.name == name))
    }

    pub fn get_player_by_id(&self, pid: PlayerId) -> Result<Player, SdkError> {
        let info = self.get_player_info(pid)?.into_payload()?;
        Ok(Player::from_info(info, self.clone()))
    }

    /// All groups on the network
    pub fn groups(&self) -> Result<Vec<Group>, SdkError> {
        let groups = self.get_groups()?.into_payload()?;
        Ok(groups
            .into_iter()
            .map(|info| Group::from_info(info, self.clone()))
            .collect())
    }

    /// The group `pid` belongs to, if any
    pub fn group_of(&self, pid: PlayerId) -> Result<Option<Group>, SdkError> {
        Ok(self
            .groups()?
            .into_iter()
            .find(|g| g.members.iter().any(|m| m.pid == pid)))
    }

    // ========================================================================
    // System commands
    // ========================================================================

    pub fn heart_beat(&self) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::heart_beat())
    }

    /// Change push registration on the command connection
    ///
    /// The session manages registration on its event connection itself.
    pub fn register_for_change_events(&self, enable: bool) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::register_for_change_events(enable))
    }

    pub fn check_account(&self) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::check_account())
    }

    pub fn sign_in(&self, username: &str, password: &str) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::sign_in(username, password))
    }

    pub fn sign_out(&self) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::sign_out())
    }

    /// Reboot the device. The heartbeat will notice and recover.
    pub fn reboot(&self) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::reboot())
    }

    pub fn prettify_json_response(&self, enable: bool) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&system::prettify_json_response(enable))
    }

    // ========================================================================
    // Player commands
    // ========================================================================

    pub fn get_players(&self) -> Result<HeosResponse<Vec<PlayerInfo>>, SdkError> {
        self.send(&player::get_players())
    }

    pub fn get_player_info(&self, pid: PlayerId) -> Result<HeosResponse<PlayerInfo>, SdkError> {
        self.send(&player::get_player_info(pid))
    }

    pub fn get_play_state(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::get_play_state(pid))
    }

    pub fn set_play_state(&self, pid: PlayerId, state: PlayState) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::set_play_state(pid, state))
    }

    pub fn get_now_playing_media(&self, pid: PlayerId) -> Result<HeosResponse<Media>, SdkError> {
        self.send(&player::get_now_playing_media(pid))
    }

    pub fn get_volume(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::get_volume(pid))
    }

    pub fn set_volume(&self, pid: PlayerId, level: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::set_volume(pid, level)?)
    }

    pub fn volume_up(&self, pid: PlayerId, step: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::volume_up(pid, step)?)
    }

    pub fn volume_down(&self, pid: PlayerId, step: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::volume_down(pid, step)?)
    }

    pub fn get_mute(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::get_mute(pid))
    }

    pub fn set_mute(&self, pid: PlayerId, mute: bool) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::set_mute(pid, mute))
    }

    pub fn toggle_mute(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::toggle_mute(pid))
    }

    pub fn get_play_mode(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::get_play_mode(pid))
    }

    pub fn set_play_mode(
        &self,
        pid: PlayerId,
        repeat: RepeatMode,
        shuffle: bool,
    ) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::set_play_mode(pid, repeat, shuffle))
    }

    pub fn get_queue(
        &self,
        pid: PlayerId,
        range: Range<u32>,
    ) -> Result<HeosResponse<Vec<QueueItem>>, SdkError> {
        self.send(&player::get_queue(pid, range)?)
    }

    pub fn play_queue_item(&self, pid: PlayerId, qid: i64) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::play_queue_item(pid, qid))
    }

    pub fn clear_queue(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::clear_queue(pid))
    }

    pub fn play_next(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::play_next(pid))
    }

    pub fn play_previous(&self, pid: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&player::play_previous(pid))
    }

    // ========================================================================
    // Group commands
    // ========================================================================

    pub fn get_groups(&self) -> Result<HeosResponse<Vec<GroupInfo>>, SdkError> {
        self.send(&group::get_groups())
    }

    pub fn get_group_info(&self, gid: GroupId) -> Result<HeosResponse<GroupInfo>, SdkError> {
        self.send(&group::get_group_info(gid))
    }

    /// Group the players, the first one becoming leader
    pub fn set_group(&self, pids: &[PlayerId]) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::set_group(pids)?)
    }

    /// Dissolve the group led by `leader`
    pub fn ungroup(&self, leader: PlayerId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::ungroup(leader))
    }

    pub fn get_group_volume(&self, gid: GroupId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::get_volume(gid))
    }

    pub fn set_group_volume(&self, gid: GroupId, level: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::set_volume(gid, level)?)
    }

    pub fn group_volume_up(&self, gid: GroupId, step: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::volume_up(gid, step)?)
    }

    pub fn group_volume_down(&self, gid: GroupId, step: u8) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::volume_down(gid, step)?)
    }

    pub fn get_group_mute(&self, gid: GroupId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::get_mute(gid))
    }

    pub fn set_group_mute(&self, gid: GroupId, mute: bool) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::set_mute(gid, mute))
    }

    pub fn toggle_group_mute(&self, gid: GroupId) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&group::toggle_mute(gid))
    }

    // ========================================================================
    // Browse commands
    // ========================================================================

    pub fn get_music_sources(&self) -> Result<HeosResponse<Vec<MusicSource>>, SdkError> {
        self.send(&browse::get_music_sources())
    }

    /// Browse a source, or a container within it
    pub fn browse(
        &self,
        sid: SourceId,
        cid: Option<&str>,
    ) -> Result<HeosResponse<Vec<BrowseItem>>, SdkError> {
        self.send(&browse::browse(sid, cid))
    }

    pub fn play_preset(&self, pid: PlayerId, preset: u32) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&browse::play_preset(pid, preset)?)
    }

    pub fn play_input(&self, pid: PlayerId, input: &str) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&browse::play_input(pid, input))
    }

    pub fn play_stream(
        &self,
        pid: PlayerId,
        sid: SourceId,
        cid: &str,
        mid: &str,
    ) -> Result<HeosResponse<()>, SdkError> {
        self.execute(&browse::play_stream(pid, sid, cid, mid))
    }
}

/// Location of the default configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("heos").join("config.toml"))
}

fn build_runtime() -> Result<Runtime, SdkError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("heos-runtime")
        .enable_all()
        .build()
        .map_err(|e| SdkError::Runtime(e.to_string()))
}
