//! Session manager: connection lifecycle, heartbeat and recovery
//!
//! A [`HeosSession`] owns two transports to the same device. The command
//! connection carries request/response traffic through a
//! [`CommandChannel`]; the event connection only carries pushed change
//! events, which go to the [`EventDispatcher`].
//!
//! ```text
//!                 establish_connection()
//! Disconnected ───────────────────────────▶ Connecting ──▶ Connected
//!      ▲                                                       │
//!      │ shutdown()                        heartbeat failure   │
//!      │                                                       ▼
//!      └──────────── (NotifyOnly) ◀── settle ◀── probe ◀── RecoveryPending
//!                                        │
//!                     (Reestablish) ─────┴──▶ Connected
//! ```
//!
//! Only the heartbeat triggers recovery, either on a failed round trip or
//! on finding that an opened connection was closed by the peer. Failures
//! of ordinary commands are returned to their caller and never tear the
//! session down.
//!
//! Every `establish_connection()` and `shutdown()` starts a new lifecycle
//! epoch. Background steps carry the epoch they were started in and stop
//! as soon as it is no longer current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use heos_api::commands::system;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;

use crate::command_channel::CommandChannel;
use crate::config::{RecoveryPolicy, SessionConfig};
use crate::dispatcher::{EventDispatcher, Notification};
use crate::error::{ChannelError, Result, SessionError};
use crate::listener::{HeosListener, ListenerId, ListenerRegistry};
use crate::scheduler::{FixedDelayTask, TaskControl};
use crate::transport::{Endpoint, TcpTransport, Transport};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// The connection was lost and the session waits for the device
    RecoveryPending,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::RecoveryPending => "recovery pending",
        };
        f.write_str(name)
    }
}

/// Monotonic time of the last line seen on the event connection
///
/// Written only by the event read loop.
#[derive(Debug, Default)]
pub struct EventClock {
    last_event: Mutex<Option<Instant>>,
}

impl EventClock {
    pub fn stamp(&self) {
        *self.last_event.lock() = Some(Instant::now());
    }

    pub fn last_event(&self) -> Option<Instant> {
        *self.last_event.lock()
    }
}

#[derive(Default)]
struct Tasks {
    heartbeat: Option<FixedDelayTask>,
    probe: Option<FixedDelayTask>,
    settle: Option<FixedDelayTask>,
}

impl Tasks {
    fn cancel_all(&mut self) {
        for task in [self.heartbeat.take(), self.probe.take(), self.settle.take()]
            .into_iter()
            .flatten()
        {
            task.cancel();
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    runtime: Handle,
    command_channel: Arc<CommandChannel>,
    event_transport: Arc<dyn Transport>,
    listeners: Arc<ListenerRegistry>,
    dispatcher: EventDispatcher,
    clock: Arc<EventClock>,
    state: RwLock<SessionState>,
    /// Set for the whole of one recovery cycle
    recovering: AtomicBool,
    /// Set by shutdown, cleared by establish
    closed: AtomicBool,
    /// Bumped under the state lock by establish and shutdown
    epoch: AtomicU64,
    command_opened: AtomicBool,
    event_opened: AtomicBool,
    /// Start of the current connection; staleness is measured from here
    /// until the first event arrives
    connected_at: Mutex<Option<Instant>>,
    tasks: Mutex<Tasks>,
}

/// A persistent, self-healing session with one device
///
/// Must be created inside a tokio runtime. Dropping the session cancels its
/// background tasks and stops the dispatcher thread.
pub struct HeosSession {
    inner: Arc<SessionInner>,
}

impl HeosSession {
    /// Create a session using TCP transports
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint();
        let command = Arc::new(TcpTransport::new(
            endpoint.clone(),
            config.connect_timeout,
            config.probe_timeout,
        ));
        let event = Arc::new(TcpTransport::new(
            endpoint,
            config.connect_timeout,
            config.probe_timeout,
        ));
        Self::with_transports(config, command, event)
    }

    /// Create a session over the given transports
    pub fn with_transports(
        config: SessionConfig,
        command_transport: Arc<dyn Transport>,
        event_transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| SessionError::NoRuntime(e.to_string()))?;

        let command_channel = Arc::new(CommandChannel::new(
            command_transport,
            config.response_timeout,
        ));
        let listeners = Arc::new(ListenerRegistry::new());
        let dispatcher = EventDispatcher::spawn(
            Arc::clone(&listeners),
            Arc::clone(&command_channel),
            runtime.clone(),
        )
        .map_err(|e| SessionError::NoRuntime(format!("cannot start dispatcher thread: {e}")))?;

        tracing::debug!("Created session for {}", config.endpoint());

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                runtime,
                command_channel,
                event_transport,
                listeners,
                dispatcher,
                clock: Arc::new(EventClock::default()),
                state: RwLock::new(SessionState::Disconnected),
                recovering: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                command_opened: AtomicBool::new(false),
                event_opened: AtomicBool::new(false),
                connected_at: Mutex::new(None),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }

    /// Connect both channels, reset push registration and start the heartbeat
    ///
    /// Succeeds if at least one channel could be opened.
    pub async fn establish_connection(&self) -> Result<()> {
        self.inner.establish().await
    }

    /// Enable push notifications and start routing event lines to listeners
    pub async fn start_event_listener(&self) -> Result<()> {
        self.inner.start_event_listener().await
    }

    /// Stop all background work and close both connections
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Connected, and no opened connection has been closed by the peer
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected && self.inner.channels_alive()
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.inner.command_channel.endpoint()
    }

    /// When the last line arrived on the event connection
    pub fn last_event(&self) -> Option<Instant> {
        self.inner.clock.last_event()
    }

    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerId
    where
        L: HeosListener + 'static,
    {
        self.inner.listeners.register(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.inner.listeners
    }

    pub fn command_channel(&self) -> &Arc<CommandChannel> {
        &self.inner.command_channel
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Handle of the runtime the session was created on
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }
}

impl Drop for HeosSession {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.tasks.lock().cancel_all();
        self.inner.dispatcher.shutdown();
    }
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        self.log_transition(*current, state);
        *current = state;
    }

    /// Set `state` only if `epoch` is still the live lifecycle
    ///
    /// Shutdown and establish advance the epoch under the same lock, so a
    /// background step that loses this check must stop.
    fn transition(&self, epoch: u64, state: SessionState) -> bool {
        let mut current = self.state.write();
        if !self.is_current(epoch) {
            return false;
        }
        self.log_transition(*current, state);
        *current = state;
        true
    }

    fn log_transition(&self, previous: SessionState, next: SessionState) {
        if previous != next {
            tracing::debug!(
                "Session {} state {} -> {}",
                self.config.endpoint(),
                previous,
                next
            );
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Every channel that was opened is still connected
    fn channels_alive(&self) -> bool {
        let command_ok = !self.command_opened.load(Ordering::SeqCst)
            || self.command_channel.is_connected();
        let event_ok =
            !self.event_opened.load(Ordering::SeqCst) || self.event_transport.is_connected();
        command_ok && event_ok
    }

    async fn establish(self: &Arc<Self>) -> Result<()> {
        let epoch = {
            let mut state = self.state.write();
            self.closed.store(false, Ordering::SeqCst);
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            self.log_transition(*state, SessionState::Connecting);
            *state = SessionState::Connecting;
            epoch
        };
        // Supersedes any heartbeat or recovery cycle still running.
        self.tasks.lock().cancel_all();
        let was_recovering = self.recovering.swap(false, Ordering::SeqCst);

        if let Err(e) = self.open_channels().await {
            self.transition(epoch, SessionState::Disconnected);
            return Err(e);
        }
        if !self.transition(epoch, SessionState::Connected) {
            if self.closed.load(Ordering::SeqCst) {
                self.tear_down().await;
            }
            return Err(SessionError::ConnectionFailed {
                endpoint: self.config.endpoint(),
                reason: "superseded by a concurrent shutdown or reconnect".to_string(),
            });
        }

        self.start_heartbeat(epoch);
        tracing::info!("Session established with {}", self.config.endpoint());
        if was_recovering {
            self.dispatcher.notify_connection_restored();
        }
        Ok(())
    }

    async fn open_channels(self: &Arc<Self>) -> Result<()> {
        let command = self.command_channel.connect().await;
        let event = self.event_transport.connect().await;

        match (&command, &event) {
            (Err(command_error), Err(event_error)) => {
                return Err(SessionError::ConnectionFailed {
                    endpoint: self.config.endpoint(),
                    reason: format!("command: {command_error}; event: {event_error}"),
                });
            }
            (Err(e), Ok(())) => {
                tracing::warn!("Command connection to {} failed: {}", self.config.endpoint(), e)
            }
            (Ok(()), Err(e)) => {
                tracing::warn!("Event connection to {} failed: {}", self.config.endpoint(), e)
            }
            (Ok(()), Ok(())) => {}
        }

        *self.connected_at.lock() = Some(Instant::now());
        let disable = system::register_for_change_events(false);

        if command.is_ok() {
            self.command_opened.store(true, Ordering::SeqCst);
            match self.command_channel.send(&disable).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => tracing::debug!(
                    "Disabling push on command connection failed: {:?}",
                    response.error
                ),
                Err(e) => tracing::debug!("Disabling push on command connection failed: {}", e),
            }
        }

        if event.is_ok() {
            if let Err(e) = self.event_transport.write_line(&disable.to_line()).await {
                tracing::debug!("Disabling push on event connection failed: {}", e);
            }
            match self.start_event_listener().await {
                Ok(()) => self.event_opened.store(true, Ordering::SeqCst),
                Err(e) => tracing::warn!("Could not start event listener: {}", e),
            }
        }

        Ok(())
    }

    async fn start_event_listener(&self) -> Result<()> {
        let clock = Arc::clone(&self.clock);
        let queue = self.dispatcher.sender();
        self.event_transport
            .start_read_loop(Arc::new(move |line| {
                clock.stamp();
                let _ = queue.send(Notification::Line(line));
            }))
            .await
            .map_err(ChannelError::from)?;

        let enable = system::register_for_change_events(true);
        self.event_transport
            .write_line(&enable.to_line())
            .await
            .map_err(ChannelError::from)?;

        tracing::debug!("Listening for events from {}", self.config.endpoint());
        Ok(())
    }

    fn start_heartbeat(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let task = FixedDelayTask::spawn(
            "heartbeat",
            self.config.heartbeat_initial_delay,
            self.config.heartbeat_interval,
            move || {
                let weak = Weak::clone(&weak);
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return TaskControl::Stop;
                    };
                    if !inner.is_current(epoch) {
                        return TaskControl::Stop;
                    }
                    match inner.check_health().await {
                        Ok(()) => TaskControl::Continue,
                        Err(reason) => {
                            tracing::warn!(
                                "Heartbeat for {} failed: {}",
                                inner.config.endpoint(),
                                reason
                            );
                            inner.begin_recovery(epoch).await;
                            TaskControl::Stop
                        }
                    }
                }
            },
        );
        self.tasks.lock().heartbeat = Some(task);
    }

    /// One heartbeat: reachability, event connection, staleness, then a
    /// round trip
    async fn check_health(&self) -> std::result::Result<(), String> {
        if !self.command_channel.transport().is_host_reachable().await {
            return Err("host unreachable".to_string());
        }

        if self.event_opened.load(Ordering::SeqCst) && !self.event_transport.is_connected() {
            return Err("event connection closed".to_string());
        }

        let since = match (self.clock.last_event(), *self.connected_at.lock()) {
            (Some(event), Some(connected)) => Some(event.max(connected)),
            (event, connected) => event.or(connected),
        };
        if let Some(since) = since {
            let silent_for = since.elapsed();
            if silent_for > self.config.stale_event_threshold {
                return Err(format!("no event received for {silent_for:?}"));
            }
        }

        let heart_beat = system::heart_beat();
        let mut retried = false;
        loop {
            match self.command_channel.send(&heart_beat).await {
                Ok(response) if response.is_success() => {
                    tracing::trace!("Heartbeat ok for {}", self.config.endpoint());
                    return Ok(());
                }
                Ok(response) => {
                    let text = response
                        .error
                        .map(|e| format!("eid={} text={}", e.eid, e.text))
                        .unwrap_or_default();
                    return Err(format!("heart_beat rejected: {text}"));
                }
                Err(e) if e.is_timeout() && !retried => {
                    tracing::debug!("Heartbeat timed out, retrying once");
                    retried = true;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// Enter recovery unless a cycle is already running or the heartbeat
    /// that failed belongs to a finished lifecycle
    async fn begin_recovery(self: &Arc<Self>, epoch: u64) {
        if !self.is_current(epoch) {
            tracing::debug!("Ignoring heartbeat failure from a finished session");
            return;
        }
        if self
            .recovering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Recovery already in progress");
            return;
        }
        if !self.transition(epoch, SessionState::RecoveryPending) {
            self.recovering.store(false, Ordering::SeqCst);
            return;
        }

        if let Some(heartbeat) = self.tasks.lock().heartbeat.take() {
            heartbeat.cancel();
        }
        self.tear_down().await;
        if !self.is_current(epoch) {
            return;
        }
        self.dispatcher.notify_connection_lost();
        self.start_probe(epoch);
    }

    async fn tear_down(&self) {
        self.event_transport.disconnect().await;
        self.command_channel.disconnect().await;
        self.command_opened.store(false, Ordering::SeqCst);
        self.event_opened.store(false, Ordering::SeqCst);
        *self.connected_at.lock() = None;
    }

    fn start_probe(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let task = FixedDelayTask::spawn(
            "reconnect-probe",
            self.config.probe_interval,
            self.config.probe_interval,
            move || {
                let weak = Weak::clone(&weak);
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return TaskControl::Stop;
                    };
                    if !inner.is_current(epoch) {
                        return TaskControl::Stop;
                    }
                    if !inner.command_channel.transport().is_host_reachable().await {
                        tracing::trace!("{} still unreachable", inner.config.endpoint());
                        return TaskControl::Continue;
                    }
                    if !inner.is_current(epoch) {
                        return TaskControl::Stop;
                    }
                    tracing::info!(
                        "{} is reachable again, settling for {:?}",
                        inner.config.endpoint(),
                        inner.config.settle_delay
                    );
                    inner.start_settle(epoch);
                    TaskControl::Stop
                }
            },
        );
        self.tasks.lock().probe = Some(task);
    }

    fn start_settle(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let task = FixedDelayTask::once("settle", self.config.settle_delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.finish_recovery(epoch).await;
            }
        });
        self.tasks.lock().settle = Some(task);
    }

    async fn finish_recovery(self: &Arc<Self>, epoch: u64) {
        match self.config.recovery_policy {
            RecoveryPolicy::NotifyOnly => {
                if !self.transition(epoch, SessionState::Disconnected) {
                    return;
                }
                self.recovering.store(false, Ordering::SeqCst);
                self.dispatcher.notify_connection_restored();
            }
            RecoveryPolicy::Reestablish => {
                if !self.transition(epoch, SessionState::Connecting) {
                    return;
                }
                let opened = self.open_channels().await;
                match opened {
                    Ok(()) => {
                        if !self.transition(epoch, SessionState::Connected) {
                            // Shut down while reconnecting.
                            if self.closed.load(Ordering::SeqCst) {
                                self.tear_down().await;
                            }
                            return;
                        }
                        self.recovering.store(false, Ordering::SeqCst);
                        self.start_heartbeat(epoch);
                        tracing::info!("Session with {} re-established", self.config.endpoint());
                        self.dispatcher.notify_connection_restored();
                    }
                    Err(e) => {
                        if !self.transition(epoch, SessionState::RecoveryPending) {
                            return;
                        }
                        tracing::warn!("Re-establishing session failed, probing again: {}", e);
                        self.tear_down().await;
                        self.start_probe(epoch);
                    }
                }
            }
        }
    }

    async fn shutdown(&self) {
        {
            let _state = self.state.write();
            self.closed.store(true, Ordering::SeqCst);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.tasks.lock().cancel_all();
        self.recovering.store(false, Ordering::SeqCst);

        if self.event_transport.is_connected() {
            let disable = system::register_for_change_events(false);
            if let Err(e) = self.event_transport.write_line(&disable.to_line()).await {
                tracing::debug!("Disabling push during shutdown failed: {}", e);
            }
        }

        self.tear_down().await;
        self.set_state(SessionState::Disconnected);
        tracing::info!("Session with {} shut down", self.config.endpoint());
    }
}
