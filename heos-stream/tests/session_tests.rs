//! Integration tests for the session manager.
//!
//! These tests verify:
//! - Connection setup, partial failure and push registration reset
//! - Heartbeat retry and staleness detection
//! - Recovery notifications under both recovery policies
//! - Recovery after the event connection alone is closed
//! - Shutdown and reconnect racing an ongoing heartbeat or recovery
//! - Listener registration from inside a callback
//! - Shutdown and cleanup


use heos_api::{EventKind, HeosEvent};
use heos_stream::{
    HeosListener, HeosSession, RecoveryPolicy, SessionConfig, SessionError, SessionState,
    Transport,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use test_helpers::{
    event_line, fast_config, init_test_logging, wait_until, MockHeosServer, MockTransport,
    Recorder,
};
use tokio_test::{assert_err, assert_ok};

const DISABLE_PUSH: &str = "heos://system/register_for_change_events?enable=off";
const ENABLE_PUSH: &str = "heos://system/register_for_change_events?enable=on";

fn session_with(
    config: SessionConfig,
) -> (HeosSession, Arc<MockTransport>, Arc<MockTransport>) {
    init_test_logging();
    let command = MockTransport::new();
    let event = MockTransport::new();
    let session =
        HeosSession::with_transports(config, command.as_transport(), event.as_transport())
            .unwrap();
    (session, command, event)
}

/// Config whose heartbeat never fires during a test
fn quiet_config() -> SessionConfig {
    fast_config().with_heartbeat(Duration::from_secs(60), Duration::from_secs(60))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_establish_resets_push_registration() {
    let (session, command, event) = session_with(quiet_config());
    assert_eq!(session.state(), SessionState::Disconnected);

    assert_ok!(session.establish_connection().await);

    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.is_connected());
    assert_eq!(command.written(), vec![DISABLE_PUSH.to_string()]);
    assert_eq!(
        event.written(),
        vec![DISABLE_PUSH.to_string(), ENABLE_PUSH.to_string()]
    );
    assert!(event.has_read_loop());
    // The acknowledgement of the enable line counts as event traffic.
    assert!(session.last_event().is_some());

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_connect_is_tolerated() {
    let (session, command, event) = session_with(quiet_config());
    event.set_refuse_connect(true);

    session.establish_connection().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(command.is_connected());
    assert!(!event.is_connected());

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_both_channels_failing_is_an_error() {
    let (session, command, event) = session_with(quiet_config());
    command.set_refuse_connect(true);
    event.set_refuse_connect(true);

    let err = assert_err!(session.establish_connection().await);
    assert!(matches!(err, SessionError::ConnectionFailed { .. }));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeats_keep_session_connected() {
    let (session, command, _event) = session_with(fast_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);

    session.establish_connection().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || command
            .written_count("system/heart_beat")
            >= 3)
        .await
    );
    assert_eq!(recorder.lost(), 0);
    assert_eq!(session.state(), SessionState::Connected);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeat_timeout_is_retried_once() {
    let (session, command, _event) = session_with(
        fast_config().with_heartbeat(Duration::from_millis(50), Duration::from_secs(60)),
    );
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    command.swallow_next(1);
    assert!(
        wait_until(Duration::from_secs(2), || command
            .written_count("system/heart_beat")
            == 2)
        .await
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(recorder.lost(), 0);
    assert_eq!(session.state(), SessionState::Connected);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_event_connection_triggers_recovery() {
    let config = fast_config()
        .with_stale_event_threshold(Duration::from_millis(150))
        .with_recovery_policy(RecoveryPolicy::NotifyOnly);
    let (session, command, _event) = session_with(config);
    let recorder = Recorder::new();
    session.add_listener(&recorder);

    session.establish_connection().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);
    // The host never stopped answering.
    assert!(command.probe_count() > 0);

    assert!(wait_until(Duration::from_secs(2), || recorder.restored() == 1).await);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(recorder.lost(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_stops_and_restored_fires_once() {
    let config = fast_config().with_recovery_policy(RecoveryPolicy::NotifyOnly);
    let (session, command, event) = session_with(config);
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    command.drop_connection();
    event.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);
    assert_eq!(session.state(), SessionState::RecoveryPending);
    assert!(session.is_recovering());

    // Several probe ticks while the device is away.
    let probes_while_down = command.probe_count();
    assert!(
        wait_until(Duration::from_secs(2), || command.probe_count() >= probes_while_down + 3)
            .await
    );
    assert_eq!(recorder.restored(), 0);

    command.restore();
    event.restore();
    assert!(wait_until(Duration::from_secs(2), || recorder.restored() == 1).await);
    assert!(!session.is_recovering());

    let probes_after = command.probe_count();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(command.probe_count(), probes_after);
    assert_eq!(recorder.restored(), 1);
    assert_eq!(recorder.lost(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reestablish_policy_reconnects() {
    let (session, command, event) = session_with(fast_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();
    assert_eq!(command.connect_count(), 1);

    command.drop_connection();
    event.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);

    command.restore();
    event.restore();
    assert!(wait_until(Duration::from_secs(2), || recorder.restored() == 1).await);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(command.connect_count(), 2);
    assert!(event.has_read_loop());

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_event_connection_triggers_recovery() {
    let (session, command, event) = session_with(fast_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();
    assert!(session.is_connected());

    // Commands still work; only the event connection is gone.
    event.close_by_peer();
    assert!(!session.is_connected());

    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);
    assert!(wait_until(Duration::from_secs(2), || recorder.restored() == 1).await);
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.is_connected());
    assert_eq!(event.connect_count(), 2);
    assert_eq!(command.connect_count(), 2);
    assert!(event.has_read_loop());

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_during_heartbeat_stays_down() {
    let (session, command, _event) = session_with(
        fast_config().with_heartbeat(Duration::from_millis(50), Duration::from_secs(60)),
    );
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    // The heartbeat waits on its swallowed round trip while shutdown runs.
    command.swallow_next(2);
    assert!(
        wait_until(Duration::from_secs(2), || command
            .written_count("system/heart_beat")
            == 1)
        .await
    );
    session.shutdown().await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.is_recovering());
    assert!(!command.is_connected());
    assert_eq!(command.connect_count(), 1);
    assert_eq!(recorder.lost(), 0);
    assert_eq!(recorder.restored(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_during_recovery_stays_down() {
    let (session, command, event) = session_with(fast_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    command.drop_connection();
    event.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);
    assert_eq!(session.state(), SessionState::RecoveryPending);

    session.shutdown().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.is_recovering());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reachability_checks = command.probe_count();
    command.restore();
    event.restore();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(command.probe_count(), reachability_checks);
    assert_eq!(command.connect_count(), 1);
    assert_eq!(recorder.restored(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_during_recovery_restores_once() {
    let (session, command, event) = session_with(fast_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    command.drop_connection();
    event.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || recorder.lost() == 1).await);

    command.restore();
    event.restore();
    assert_ok!(session.establish_connection().await);
    assert_eq!(session.state(), SessionState::Connected);
    assert!(!session.is_recovering());
    assert!(wait_until(Duration::from_secs(1), || recorder.restored() == 1).await);

    // Past the reachability check and settle of the abandoned cycle.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(recorder.restored(), 1);
    assert_eq!(recorder.lost(), 1);
    assert_eq!(command.connect_count(), 2);
    assert_eq!(session.state(), SessionState::Connected);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_failure_does_not_trigger_recovery() {
    let (session, command, _event) = session_with(quiet_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    command.swallow_next(1);
    let result = session
        .command_channel()
        .send(&heos_api::commands::player::get_players())
        .await;
    assert!(result.unwrap_err().is_timeout());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(recorder.lost(), 0);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_reach_listeners() {
    let (session, _command, event) = session_with(quiet_config());
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    event.push_line(event_line("player_volume_changed", "pid=1&level=30&mute=off"));
    event.push_line(event_line("groups_changed", ""));
    assert!(wait_until(Duration::from_secs(1), || recorder.event_count() == 2).await);

    let events = recorder.events.lock();
    assert_eq!(events[0].kind, EventKind::PlayerVolumeChanged);
    assert_eq!(events[0].attribute("level"), Some("30"));
    assert_eq!(events[1].kind, EventKind::GroupsChanged);
    drop(events);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_now_playing_is_fetched_for_listeners() {
    let (session, command, event) = session_with(quiet_config());
    command.respond_with(
        "player/get_now_playing_media",
        vec![r#"{"heos": {"command": "player/get_now_playing_media", "result": "success", "message": "pid=5"}, "payload": {"type": "station", "song": "Song", "album": "Album", "artist": "Artist", "image_url": "", "mid": "m1", "qid": 1, "sid": 3, "station": "Radio"}}"#.to_string()],
    );
    let recorder = Recorder::new();
    session.add_listener(&recorder);
    session.establish_connection().await.unwrap();

    event.push_line(event_line("player_now_playing_changed", "pid=5"));
    assert!(wait_until(Duration::from_secs(1), || recorder.event_count() == 1).await);

    let events = recorder.events.lock();
    let media = events[0].now_playing.as_ref().expect("media fetched");
    assert_eq!(media.song, "Song");
    assert_eq!(command.written_count("get_now_playing_media?pid=5"), 1);
    drop(events);

    session.shutdown().await;
}

/// Registers `late` the first time it sees an event
struct Registering {
    session: Mutex<Weak<HeosSession>>,
    late: Arc<Recorder>,
    seen: AtomicUsize,
}

impl HeosListener for Registering {
    fn on_event(&self, _event: &HeosEvent) {
        if self.seen.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(session) = self.session.lock().upgrade() {
                session.add_listener(&self.late);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_registered_during_dispatch_misses_current_event() {
    let (session, _command, event) = session_with(quiet_config());
    let session = Arc::new(session);
    let late = Recorder::new();
    let registering = Arc::new(Registering {
        session: Mutex::new(Arc::downgrade(&session)),
        late: Arc::clone(&late),
        seen: AtomicUsize::new(0),
    });
    session.add_listener(&registering);
    session.establish_connection().await.unwrap();

    event.push_line(event_line("players_changed", ""));
    assert!(wait_until(Duration::from_secs(1), || registering.seen.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(late.event_count(), 0);

    event.push_line(event_line("sources_changed", ""));
    assert!(wait_until(Duration::from_secs(1), || late.event_count() == 1).await);
    assert_eq!(session.listeners().len(), 2);

    session.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_disables_push_and_disconnects() {
    let (session, command, event) = session_with(fast_config());
    session.establish_connection().await.unwrap();

    session.shutdown().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!command.is_connected());
    assert!(!event.is_connected());
    assert_eq!(event.written().last().map(String::as_str), Some(DISABLE_PUSH));

    let heartbeats = command.written_count("system/heart_beat");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(command.written_count("system/heart_beat"), heartbeats);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_listener_is_not_notified() {
    let (session, _command, event) = session_with(quiet_config());
    let kept = Recorder::new();
    let removed = Recorder::new();
    session.add_listener(&kept);
    let id = session.add_listener(&removed);
    assert!(session.remove_listener(id));
    session.establish_connection().await.unwrap();

    event.push_line(event_line("user_changed", "signed_in&un=me%40example.com"));
    assert!(wait_until(Duration::from_secs(1), || kept.event_count() == 1).await);
    assert_eq!(removed.event_count(), 0);

    session.shutdown().await;
}

#[test]
fn test_session_requires_runtime() {
    let command = MockTransport::new();
    let event = MockTransport::new();
    let result = HeosSession::with_transports(
        SessionConfig::new("mock"),
        command.as_transport(),
        event.as_transport(),
    );
    assert!(matches!(result, Err(SessionError::NoRuntime(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_over_tcp() {
    init_test_logging();
    let server = MockHeosServer::start().await.unwrap();
    let port = server.port();
    let config = SessionConfig::new("127.0.0.1")
        .with_port(port)
        .with_response_timeout(Duration::from_millis(200))
        .with_probe_timeout(Duration::from_millis(200))
        .with_heartbeat(Duration::from_millis(50), Duration::from_millis(50))
        .with_recovery_timing(Duration::from_millis(50), Duration::from_millis(100));
    let session = HeosSession::new(config).unwrap();
    let recorder = Recorder::new();
    session.add_listener(&recorder);

    session.establish_connection().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.heartbeat_count() >= 2).await);
    assert!(server
        .received()
        .contains(&ENABLE_PUSH.to_string()));

    server.stop();
    drop(server);
    assert!(wait_until(Duration::from_secs(3), || recorder.lost() == 1).await);
    assert_eq!(recorder.restored(), 0);

    let server = MockHeosServer::start_on(port).await.unwrap();
    assert!(wait_until(Duration::from_secs(3), || recorder.restored() == 1).await);
    assert_eq!(session.state(), SessionState::Connected);
    assert!(wait_until(Duration::from_secs(2), || server.heartbeat_count() >= 1).await);
    assert_eq!(recorder.lost(), 1);

    let response = session
        .command_channel()
        .send(&heos_api::commands::player::get_volume(7))
        .await
        .unwrap();
    assert_eq!(response.attribute("level"), Some("7"));

    session.shutdown().await;
}
