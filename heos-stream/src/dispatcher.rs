//! Event dispatcher thread
//!
//! Lines from the event connection and connectivity transitions are queued
//! to a single dedicated thread that decodes them and invokes listeners one
//! at a time, in order. Listener callbacks therefore never run on the read
//! loop or inside the tokio runtime, and may block on the command channel.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use heos_api::commands::player;
use heos_api::parser::parse_event;
use heos_api::{EventKind, HeosEvent, Media};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::command_channel::CommandChannel;
use crate::listener::{HeosListener, ListenerRegistry};

const THREAD_NAME: &str = "heos-event-dispatcher";

/// Work items processed by the dispatcher thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A raw line from the event connection
    Line(String),
    ConnectionLost,
    ConnectionRestored,
    Shutdown,
}

/// Owns the dispatcher thread and its queue
pub struct EventDispatcher {
    sender: mpsc::Sender<Notification>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Spawn the dispatcher thread
    ///
    /// `runtime` is used to run the secondary now-playing query on
    /// `commands`.
    pub fn spawn(
        listeners: Arc<ListenerRegistry>,
        commands: Arc<CommandChannel>,
        runtime: Handle,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let context = DispatchContext {
                    listeners,
                    commands,
                    runtime,
                };
                run_dispatch_loop(receiver, context);
            })?;

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// A queue handle for producers such as the event read loop
    pub fn sender(&self) -> mpsc::Sender<Notification> {
        self.sender.clone()
    }

    pub fn enqueue_line(&self, line: String) {
        self.enqueue(Notification::Line(line));
    }

    pub fn notify_connection_lost(&self) {
        self.enqueue(Notification::ConnectionLost);
    }

    pub fn notify_connection_restored(&self) {
        self.enqueue(Notification::ConnectionRestored);
    }

    fn enqueue(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Dispatcher is gone, dropping notification");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread after the queued work has been processed
    ///
    /// Safe to call from a listener callback; the thread is then detached
    /// instead of joined.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Notification::Shutdown);
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::warn!("Event dispatcher thread panicked");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct DispatchContext {
    listeners: Arc<ListenerRegistry>,
    commands: Arc<CommandChannel>,
    runtime: Handle,
}

fn run_dispatch_loop(receiver: mpsc::Receiver<Notification>, context: DispatchContext) {
    tracing::debug!("Event dispatcher started");

    while let Ok(notification) = receiver.recv() {
        match notification {
            Notification::Line(line) => dispatch_line(&context, &line),
            Notification::ConnectionLost => {
                tracing::info!("Connection to {} lost", context.commands.endpoint());
                notify_all(&context, |l| l.on_connection_lost());
            }
            Notification::ConnectionRestored => {
                tracing::info!("Connection to {} restored", context.commands.endpoint());
                notify_all(&context, |l| l.on_connection_restored());
            }
            Notification::Shutdown => break,
        }
    }

    tracing::debug!("Event dispatcher stopped");
}

fn dispatch_line(context: &DispatchContext, line: &str) {
    let Some(mut event) = parse_event(line) else {
        tracing::debug!("Dropping non-event line on event connection: {}", line);
        return;
    };

    if event.kind == EventKind::PlayerNowPlayingChanged && event.now_playing.is_none() {
        event.now_playing = fetch_now_playing(context, &event);
    }

    tracing::trace!("Dispatching {}", event.command);
    notify_all(context, |l| l.on_event(&event));
}

fn fetch_now_playing(context: &DispatchContext, event: &HeosEvent) -> Option<Media> {
    let pid = event.player_id()?;
    let command = player::get_now_playing_media(pid);
    match context
        .runtime
        .block_on(context.commands.send_typed::<Media>(&command))
    {
        Ok(response) => match response.into_payload() {
            Ok(media) => Some(media),
            Err(e) => {
                tracing::debug!("No now-playing media for player {}: {}", pid, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to fetch now-playing media for player {}: {}", pid, e);
            None
        }
    }
}

/// Invoke `f` on a snapshot of the listeners
///
/// A panicking listener is logged and does not take the thread down.
fn notify_all<F>(context: &DispatchContext, f: F)
where
    F: Fn(&dyn HeosListener),
{
    for listener in context.listeners.snapshot() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(listener.as_ref())));
        if outcome.is_err() {
            tracing::error!("Listener panicked while handling a notification");
        }
    }
}
