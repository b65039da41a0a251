//! Integration tests for the enforcement engine.
//!
//! These tests drive the public API end to end: timer commands, the
//! foreground poller, the blocking surface and recovery across a restart
//! backed by an on-disk SQLite store.

use std::sync::Arc;
use std::time::Duration;

use focuslock_core::storage::MonitorConfig;
use focuslock_core::testing::{RecordingCanceller, RecordingRenderer, RecordingStatusSink, ScriptedOracle};
use focuslock_core::{
    Collaborators, Config, Event, FocusEngine, InstalledApp, ManualClock, NotificationEvent, SqliteStore,
    StateStore, SuppressOutcome, TimerPhase, TimerRecovery,
};

struct Harness {
    engine: FocusEngine,
    clock: ManualClock,
    oracle: Arc<ScriptedOracle>,
    renderer: Arc<RecordingRenderer>,
    canceller: Arc<RecordingCanceller>,
}

fn config() -> Config {
    Config {
        monitor: MonitorConfig {
            poll_interval_ms: 10,
            ..MonitorConfig::default()
        },
        ..Config::default()
    }
}

fn harness(store: Arc<StateStore>, clock: ManualClock) -> Harness {
    let oracle = Arc::new(ScriptedOracle::new());
    let renderer = Arc::new(RecordingRenderer::granted());
    let canceller = Arc::new(RecordingCanceller::new());
    let parts = Collaborators::new(
        oracle.clone(),
        renderer.clone(),
        canceller.clone(),
        Arc::new(RecordingStatusSink::new()),
    )
    .with_clock(Arc::new(clock.clone()));
    Harness {
        engine: FocusEngine::new(store, config(), parts),
        clock,
        oracle,
        renderer,
        canceller,
    }
}

fn sqlite_store(path: &std::path::Path) -> Arc<StateStore> {
    Arc::new(StateStore::new(Arc::new(SqliteStore::open_at(path).unwrap())))
}

#[tokio::test]
async fn test_start_then_stop_before_deadline() {
    let h = harness(Arc::new(StateStore::in_memory()), ManualClock::new(0));
    h.oracle.push_package("com.game");

    h.engine.start_timer(Some(30)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.clock.set(29 * 60_000);
    assert_eq!(h.engine.timer().remaining_ms(), 60_000);
    assert!(h.engine.decision().is_blocking);
    assert_eq!(h.renderer.live(), 1);

    h.engine.stop_timer().unwrap();
    assert!(!h.engine.store().timer_state().unwrap().active);
    assert_eq!(h.renderer.live(), 0);
    assert!(!h.engine.decision().is_blocking);
}

#[test]
fn test_restart_past_deadline_recovers_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focuslock.db");

    {
        let h = harness(sqlite_store(&path), ManualClock::new(0));
        h.engine.start_timer(Some(30)).unwrap();
    }

    let h = harness(sqlite_store(&path), ManualClock::new(31 * 60_000));
    let mut rx = h.engine.subscribe();
    let report = h.engine.recover().unwrap();

    assert_eq!(report.timer, TimerRecovery::ExpiredWhileDown);
    assert_eq!(h.engine.timer().phase().unwrap(), TimerPhase::Idle);
    assert!(!h.engine.decision().is_blocking);
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, Event::TimerCompleted { .. }));
    }

    // Redundant boot event.
    assert_eq!(h.engine.recover().unwrap().timer, TimerRecovery::Idle);
}

#[tokio::test]
async fn test_restart_mid_session_keeps_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focuslock.db");

    {
        let h = harness(sqlite_store(&path), ManualClock::new(0));
        h.engine.start_timer(Some(30)).unwrap();
        h.engine.shutdown();
    }

    let h = harness(sqlite_store(&path), ManualClock::new(12 * 60_000));
    let report = h.engine.recover().unwrap();
    assert_eq!(
        report.timer,
        TimerRecovery::Resumed {
            remaining_ms: 18 * 60_000
        }
    );
    assert!(h.engine.monitor().is_running());
    assert!(h.engine.timer().is_ticking());
    h.engine.shutdown();
}

#[tokio::test]
async fn test_switch_to_locked_app_shows_surface_once() {
    let h = harness(Arc::new(StateStore::in_memory()), ManualClock::new(0));
    h.engine.set_app_locked("com.a", true).unwrap();
    h.engine.set_app_locked("com.b", false).unwrap();

    let monitor = h.engine.monitor();
    h.engine.store().set_study_mode(true).unwrap();
    h.oracle.push_package("com.b");
    h.oracle.push_package("com.a");

    monitor.poll_once().await;
    assert_eq!(h.renderer.created(), 0);
    monitor.poll_once().await;
    assert_eq!(h.renderer.created(), 1);
    for _ in 0..5 {
        monitor.poll_once().await;
    }
    assert_eq!(h.renderer.created(), 1);
    assert_eq!(h.renderer.contents()[0].package_id.as_deref(), Some("com.a"));
}

#[test]
fn test_extend_adds_to_remaining() {
    let h = harness(Arc::new(StateStore::in_memory()), ManualClock::new(0));
    h.engine.start_timer(Some(30)).unwrap();
    h.clock.set(30 * 60_000 - 100_000);
    h.engine.extend_timer(Some(15)).unwrap();
    assert_eq!(h.engine.timer().remaining_ms(), 100_000 + 15 * 60_000);
}

#[test]
fn test_notifications_follow_the_same_policy() {
    let h = harness(Arc::new(StateStore::in_memory()), ManualClock::new(0));
    h.engine
        .ensure_apps(&[
            InstalledApp::new("com.chat", "Chat", false),
            InstalledApp::new("com.google.android.gm", "Gmail", false),
            InstalledApp::new("com.android.systemui", "System UI", true),
        ])
        .unwrap();

    let chat = NotificationEvent::new("0|com.chat|1", "com.chat");
    assert_eq!(h.engine.on_notification_posted(&chat), SuppressOutcome::Allowed);

    h.engine.set_study_mode(true).unwrap();
    assert!(matches!(
        h.engine.on_notification_posted(&chat),
        SuppressOutcome::Cancelled(_)
    ));
    let mail = NotificationEvent::new("0|gm|2", "com.google.android.gm");
    assert_eq!(h.engine.on_notification_posted(&mail), SuppressOutcome::Allowed);
    assert_eq!(h.canceller.cancelled(), vec!["0|com.chat|1".to_string()]);
}

#[test]
fn test_app_map_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focuslock.db");
    let installed = [
        InstalledApp::new("com.game", "Game", false),
        InstalledApp::new("com.android.camera", "Camera", false),
    ];

    {
        let h = harness(sqlite_store(&path), ManualClock::new(0));
        h.engine.ensure_apps(&installed).unwrap();
        assert!(!h.engine.toggle_app("com.game").unwrap());
    }

    let h = harness(sqlite_store(&path), ManualClock::new(0));
    let map = h
        .engine
        .ensure_apps(&[installed[0].clone(), installed[1].clone(), InstalledApp::new("com.new", "New", false)])
        .unwrap();
    // The user's toggle is kept; the new app defaults to locked.
    assert_eq!(map.get("com.game"), Some(false));
    assert_eq!(map.get("com.android.camera"), Some(false));
    assert_eq!(map.get("com.new"), Some(true));
}

#[tokio::test]
async fn test_long_running_engine_picks_up_commands_from_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focuslock.db");

    let daemon = harness(sqlite_store(&path), ManualClock::new(0));
    daemon.oracle.push_package("com.game");
    daemon.engine.recover().unwrap();
    assert!(!daemon.engine.monitor().is_running());

    // A one-shot command opens its own connection and writes the store.
    let one_shot = harness(sqlite_store(&path), ManualClock::new(0));
    one_shot.engine.start_timer(Some(30)).unwrap();
    one_shot.engine.shutdown();

    let report = daemon.engine.resync().unwrap();
    assert!(report.is_blocking());
    assert!(daemon.engine.timer().is_ticking());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(daemon.renderer.live(), 1);

    // Stopped elsewhere: the daemon's poller sees it without a resync.
    let one_shot = harness(sqlite_store(&path), ManualClock::new(0));
    one_shot.engine.stop_timer().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(daemon.renderer.live(), 0);
    daemon.engine.resync().unwrap();
    assert!(!daemon.engine.monitor().is_running());
    daemon.engine.shutdown();
}
