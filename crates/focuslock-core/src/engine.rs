//! Focus enforcement engine.
//!
//! Owns one of each component and applies user commands to them. The
//! timer ticker and the foreground poller run on their own; this type
//! listens to the event bus for what they report and keeps the surface,
//! the monitor and the status line in step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::apps::{AppLockMap, InstalledApp};
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, SurfaceError, TimerError};
use crate::events::{event_bus, publish, Event, EventReceiver, EventSender};
use crate::monitor::{ForegroundMonitor, ForegroundOracle};
use crate::notifications::{NotificationCanceller, NotificationEvent, NotificationSuppressor, SuppressOutcome};
use crate::policy::{read_decision, should_block_app, BlockingDecision};
use crate::recovery::{RecoveryCoordinator, RecoveryReport, TimerRecovery};
use crate::status::{StatusLine, StatusSink};
use crate::storage::{Config, StateStore};
use crate::surface::{NavigationGesture, SurfaceChange, SurfaceController, SurfaceRenderer};
use crate::timer::FocusTimer;

const STORAGE_NOTICE: &str = "Focus state could not be read. Blocking is paused until storage recovers.";

/// Platform capabilities the engine drives.
pub struct Collaborators {
    pub oracle: Arc<dyn ForegroundOracle>,
    pub renderer: Arc<dyn SurfaceRenderer>,
    pub canceller: Arc<dyn NotificationCanceller>,
    pub status: Arc<dyn StatusSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Collaborators on the system clock.
    pub fn new(
        oracle: Arc<dyn ForegroundOracle>,
        renderer: Arc<dyn SurfaceRenderer>,
        canceller: Arc<dyn NotificationCanceller>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            oracle,
            renderer,
            canceller,
            status,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct FocusEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<StateStore>,
    config: Config,
    clock: Arc<dyn Clock>,
    events: EventSender,
    timer: FocusTimer,
    monitor: ForegroundMonitor,
    surface: Arc<SurfaceController>,
    suppressor: NotificationSuppressor,
    status: Arc<dyn StatusSink>,
    storage_notice_sent: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl FocusEngine {
    pub fn new(store: Arc<StateStore>, config: Config, parts: Collaborators) -> Self {
        let (events, _) = event_bus(config.events.channel_capacity);
        let clock = parts.clock;
        let timer = FocusTimer::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            events.clone(),
            config.timer.tick_interval(),
        );
        let surface = Arc::new(SurfaceController::new(parts.renderer).with_events(events.clone()));
        let monitor = ForegroundMonitor::new(
            parts.oracle,
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&surface),
            config.monitor.clone(),
            config.surface.show_quotes,
        );
        let suppressor =
            NotificationSuppressor::new(Arc::clone(&store), Arc::clone(&clock), parts.canceller);

        Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                clock,
                events,
                timer,
                monitor,
                surface,
                suppressor,
                status: parts.status,
                storage_notice_sent: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn timer(&self) -> &FocusTimer {
        &self.inner.timer
    }

    pub fn monitor(&self) -> &ForegroundMonitor {
        &self.inner.monitor
    }

    pub fn surface(&self) -> &SurfaceController {
        &self.inner.surface
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current decision. Unreadable state means not blocking.
    pub fn decision(&self) -> BlockingDecision {
        match read_decision(&self.inner.store, self.inner.clock.now_ms()) {
            Ok(decision) => decision,
            Err(e) => {
                self.report_storage_error(&e);
                BlockingDecision::ALLOW
            }
        }
    }

    /// Whether `package_id` would be blocked right now.
    pub fn should_block(&self, package_id: &str) -> bool {
        let decision = self.decision();
        if !decision.is_blocking {
            return false;
        }
        match self.inner.store.app_lock_map_or_default() {
            Ok(locks) => should_block_app(&decision, &locks, package_id),
            Err(e) => {
                self.report_storage_error(&e);
                false
            }
        }
    }

    pub fn status_line(&self) -> StatusLine {
        let decision = self.decision();
        let locked_apps = self
            .inner
            .store
            .app_lock_map_or_default()
            .map(|m| m.locked_count())
            .unwrap_or(0);
        StatusLine::new(&decision, self.inner.timer.remaining_ms(), locked_apps)
    }

    // ── Timer commands ───────────────────────────────────────────────

    /// Start a session; `None` uses the configured default length.
    pub fn start_timer(&self, minutes: Option<u32>) -> Result<Event, TimerError> {
        let minutes = minutes.unwrap_or(self.inner.config.timer.default_duration_minutes);
        let event = self.inner.timer.start(minutes)?;
        self.inner.monitor.start();
        self.push_status();
        Ok(event)
    }

    /// Stop the session and tear the surface down.
    pub fn stop_timer(&self) -> Result<Option<Event>, TimerError> {
        let event = self.inner.timer.stop()?;
        self.on_timer_ended();
        Ok(event)
    }

    /// Extend the session; `None` uses the configured step.
    pub fn extend_timer(&self, minutes: Option<u32>) -> Result<Event, TimerError> {
        let minutes = minutes.unwrap_or(self.inner.config.timer.extend_minutes);
        let event = self.inner.timer.extend(minutes)?;
        self.push_status();
        Ok(event)
    }

    // ── Study mode ───────────────────────────────────────────────────

    pub fn set_study_mode(&self, enabled: bool) -> Result<Event, StoreError> {
        self.inner.store.set_study_mode(enabled)?;
        tracing::info!(enabled, "study mode changed");
        let event = Event::StudyModeChanged {
            enabled,
            at: Utc::now(),
        };
        publish(&self.inner.events, event.clone());
        if enabled {
            self.inner.monitor.start();
        } else {
            self.stop_monitor_if_idle();
        }
        self.push_status();
        Ok(event)
    }

    pub fn toggle_study_mode(&self) -> Result<Event, StoreError> {
        let enabled = self.inner.store.study_mode()?;
        self.set_study_mode(!enabled)
    }

    // ── App locks ────────────────────────────────────────────────────

    /// Classify installed apps on first call, then merge new ones.
    pub fn ensure_apps(&self, installed: &[InstalledApp]) -> Result<AppLockMap, StoreError> {
        self.inner
            .store
            .ensure_app_lock_map(installed, &self.inner.config.apps.default_allow)
    }

    pub fn set_app_locked(&self, package_id: &str, locked: bool) -> Result<(), StoreError> {
        self.inner
            .store
            .update_app_lock_map(|m| m.set_locked(package_id, locked))?;
        tracing::info!(package = package_id, locked, "app lock changed");
        self.push_status();
        Ok(())
    }

    /// Replace the whole map, e.g. from a backup made with `apps list --json`.
    pub fn replace_app_locks(&self, map: &AppLockMap) -> Result<(), StoreError> {
        self.inner.store.write_app_lock_map(map)?;
        tracing::info!(apps = map.len(), locked = map.locked_count(), "app lock map replaced");
        self.push_status();
        Ok(())
    }

    /// Flip one app's lock. Returns the new value.
    pub fn toggle_app(&self, package_id: &str) -> Result<bool, StoreError> {
        let locked = self.inner.store.update_app_lock_map(|m| m.toggle(package_id))?;
        tracing::info!(package = package_id, locked, "app lock toggled");
        self.push_status();
        Ok(locked)
    }

    // ── Surface and notifications ────────────────────────────────────

    /// In-surface close control. The next sighting of a blocked app
    /// brings the surface back.
    pub fn dismiss_surface(&self) -> SurfaceChange {
        let change = self.inner.surface.teardown();
        self.inner.monitor.reset_observation();
        change
    }

    pub fn on_navigation(&self, gesture: NavigationGesture) -> bool {
        self.inner.surface.on_navigation(gesture)
    }

    /// Re-check the overlay permission, e.g. when the app regains focus.
    pub fn check_permission(&self) -> Result<(), SurfaceError> {
        let result = self.inner.surface.check_permission();
        if result.is_err() {
            self.inner.monitor.reset_observation();
        }
        result
    }

    pub fn on_notification_posted(&self, event: &NotificationEvent) -> SuppressOutcome {
        self.inner.suppressor.on_notification_posted(event)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Boot/process-start entry point. Reconciles persisted state and
    /// starts listening for ticker events.
    pub fn recover(&self) -> Result<RecoveryReport, StoreError> {
        self.spawn_listener();
        let inner = &self.inner;
        let report = RecoveryCoordinator::new(&inner.store, &inner.timer, &inner.monitor)
            .run()
            .inspect_err(|e| self.report_storage_error(e))?;
        self.push_status();
        Ok(report)
    }

    /// Pick up state written by another process (a one-shot CLI command
    /// sharing the same store). Safe to call on any interval: it arms the
    /// ticker and the monitor only when they are not already running.
    pub fn resync(&self) -> Result<RecoveryReport, StoreError> {
        let inner = &self.inner;
        let report = RecoveryCoordinator::new(&inner.store, &inner.timer, &inner.monitor)
            .run()
            .inspect_err(|e| self.report_storage_error(e))?;
        match report.timer {
            // This process was up, so the session ended under its watch.
            TimerRecovery::ExpiredWhileDown => self.on_timer_ended(),
            _ if !report.is_blocking() => self.stop_monitor_if_idle(),
            _ => {}
        }
        if report.monitor_started {
            tracing::info!("blocking enabled elsewhere, enforcement resumed");
            self.push_status();
        }
        Ok(report)
    }

    /// Subscribe to the bus and react to ticker-originated events.
    /// Returns `false` if already listening or outside a runtime.
    pub fn spawn_listener(&self) -> bool {
        let Ok(mut slot) = self.inner.listener.lock() else {
            return false;
        };
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!("no async runtime, engine listener not started");
            return false;
        };
        let rx = self.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(runtime.spawn(listen(weak, rx)));
        true
    }

    /// Cancel background work and remove the surface. Persisted state is
    /// kept so the next start can recover it.
    pub fn shutdown(&self) {
        self.inner.timer.cancel_ticker();
        self.inner.monitor.stop();
        self.inner.surface.teardown();
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        tracing::info!("focus engine shut down");
    }

    /// React to an event from the bus.
    pub fn handle_event(&self, event: &Event) {
        match event {
            Event::RemainingTimeChanged { .. } => self.push_status(),
            Event::TimerCompleted { .. } => self.on_timer_ended(),
            _ => {}
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn on_timer_ended(&self) {
        self.inner.surface.teardown();
        self.inner.monitor.reset_observation();
        self.stop_monitor_if_idle();
        self.push_status();
    }

    /// With nothing left to enforce, drop the surface and stop polling.
    fn stop_monitor_if_idle(&self) {
        if !self.decision().is_blocking {
            self.inner.surface.teardown();
            self.inner.monitor.stop();
        }
    }

    fn push_status(&self) {
        self.inner.status.update(&self.status_line());
    }

    fn report_storage_error(&self, err: &StoreError) {
        tracing::error!(error = %err, "focus state unreadable");
        if !self.inner.storage_notice_sent.swap(true, Ordering::SeqCst) {
            self.inner.status.notice(STORAGE_NOTICE);
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn listen(engine: Weak<EngineInner>, mut rx: EventReceiver) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "engine listener lagged behind the event bus");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = engine.upgrade() else {
            break;
        };
        FocusEngine { inner }.handle_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MonitorConfig;
    use crate::testing::{RecordingCanceller, RecordingRenderer, RecordingStatusSink, ScriptedOracle};
    use crate::timer::TimerPhase;
    use std::time::Duration;

    struct Rig {
        engine: FocusEngine,
        clock: ManualClock,
        oracle: Arc<ScriptedOracle>,
        renderer: Arc<RecordingRenderer>,
        status: Arc<RecordingStatusSink>,
    }

    fn rig() -> Rig {
        let clock = ManualClock::new(0);
        let oracle = Arc::new(ScriptedOracle::new());
        let renderer = Arc::new(RecordingRenderer::granted());
        let status = Arc::new(RecordingStatusSink::new());
        let config = Config {
            monitor: MonitorConfig {
                poll_interval_ms: 10,
                ..MonitorConfig::default()
            },
            ..Config::default()
        };
        let parts = Collaborators::new(
            oracle.clone(),
            renderer.clone(),
            Arc::new(RecordingCanceller::new()),
            status.clone(),
        )
        .with_clock(Arc::new(clock.clone()));
        let engine = FocusEngine::new(Arc::new(StateStore::in_memory()), config, parts);
        Rig {
            engine,
            clock,
            oracle,
            renderer,
            status,
        }
    }

    #[test]
    fn start_uses_configured_default() {
        let r = rig();
        match r.engine.start_timer(None).unwrap() {
            Event::TimerStarted {
                duration_minutes, ..
            } => assert_eq!(duration_minutes, 30),
            other => panic!("unexpected {other:?}"),
        }
        let line = r.status.last().unwrap();
        assert_eq!(line.label, "Timer Active");
        assert_eq!(line.remaining.as_deref(), Some("30:00"));
    }

    #[test]
    fn extend_uses_configured_step() {
        let r = rig();
        r.engine.start_timer(Some(30)).unwrap();
        r.clock.set(30 * 60_000 - 100_000);
        r.engine.extend_timer(None).unwrap();
        assert_eq!(r.engine.timer().remaining_ms(), 100_000 + 15 * 60_000);
    }

    #[tokio::test]
    async fn stop_tears_surface_down_and_unblocks() {
        let r = rig();
        r.oracle.push_package("com.game");
        r.engine.start_timer(Some(30)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.live(), 1);

        r.clock.set(29 * 60_000);
        assert!(r.engine.decision().is_blocking);
        r.engine.stop_timer().unwrap();
        assert_eq!(r.renderer.live(), 0);
        assert!(!r.engine.decision().is_blocking);
        assert_eq!(r.engine.timer().phase().unwrap(), TimerPhase::Idle);
        assert!(!r.engine.monitor().is_running());
        assert_eq!(r.status.last().unwrap().label, "Inactive");
    }

    #[tokio::test]
    async fn study_mode_outlives_stopped_timer() {
        let r = rig();
        r.oracle.push_package("com.game");
        r.engine.set_study_mode(true).unwrap();
        r.engine.start_timer(Some(30)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.created(), 1);

        r.engine.stop_timer().unwrap();
        let d = r.engine.decision();
        assert!(d.is_blocking);
        assert_eq!(d.reason.label(), "Study Mode Active");
        assert!(r.engine.monitor().is_running());
        // Observation was reset, so the monitor re-shows under study mode.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.live(), 1);
        assert_eq!(r.renderer.created(), 2);
        r.engine.shutdown();
        assert_eq!(r.renderer.live(), 0);
    }

    #[tokio::test]
    async fn dismiss_retriggers_on_next_sighting() {
        let r = rig();
        r.oracle.push_package("com.game");
        r.engine.set_study_mode(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.created(), 1);

        assert_eq!(r.engine.dismiss_surface(), SurfaceChange::Hidden);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.created(), 2);
        r.engine.shutdown();
    }

    #[tokio::test]
    async fn listener_tears_down_on_completion() {
        let r = rig();
        assert!(r.engine.spawn_listener());
        assert!(!r.engine.spawn_listener());
        r.oracle.push_package("com.game");
        r.engine.start_timer(Some(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.live(), 1);

        r.clock.set(60_000);
        // The timer ticks every second.
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(r.renderer.live(), 0);
        assert_eq!(r.engine.timer().phase().unwrap(), TimerPhase::Idle);
        assert!(!r.engine.monitor().is_running());
        r.engine.shutdown();
    }

    #[tokio::test]
    async fn resync_enforces_state_written_elsewhere() {
        let r = rig();
        r.oracle.push_package("com.game");
        r.engine.recover().unwrap();
        assert!(!r.engine.monitor().is_running());

        // Another process turns study mode on through the shared store.
        r.engine.store().set_study_mode(true).unwrap();
        let report = r.engine.resync().unwrap();
        assert!(report.monitor_started);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.renderer.live(), 1);
        assert_eq!(r.status.last().unwrap().label, "Study Mode Active");

        // Nothing new: a second resync is a no-op.
        assert!(!r.engine.resync().unwrap().monitor_started);
        assert_eq!(r.renderer.created(), 1);

        r.engine.store().set_study_mode(false).unwrap();
        r.engine.resync().unwrap();
        assert!(!r.engine.monitor().is_running());
        assert_eq!(r.renderer.live(), 0);
        r.engine.shutdown();
    }

    #[tokio::test]
    async fn resync_arms_ticker_for_external_start() {
        let r = rig();
        r.engine.recover().unwrap();
        r.engine
            .store()
            .write_timer_state(&crate::timer::TimerState::started(1, 0))
            .unwrap();

        let report = r.engine.resync().unwrap();
        assert!(matches!(report.timer, TimerRecovery::Resumed { .. }));
        assert!(r.engine.timer().is_ticking());
        assert!(r.engine.monitor().is_running());

        let mut events = r.engine.subscribe();
        r.clock.set(60_000);
        let completed = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match events.recv().await {
                    Ok(Event::TimerCompleted { .. }) => break true,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(completed);
        r.engine.shutdown();
    }

    #[test]
    fn app_toggle_updates_lock_map() {
        let r = rig();
        r.engine
            .ensure_apps(&[
                InstalledApp::new("com.game", "Game", false),
                InstalledApp::new("com.android.camera", "Camera", false),
            ])
            .unwrap();
        r.engine.set_study_mode(true).unwrap();
        assert!(r.engine.should_block("com.game"));
        assert!(!r.engine.should_block("com.android.camera"));

        assert!(!r.engine.toggle_app("com.game").unwrap());
        assert!(!r.engine.should_block("com.game"));
        r.engine.set_app_locked("com.game", true).unwrap();
        assert!(r.engine.should_block("com.game"));
    }

    #[test]
    fn replaced_lock_map_drives_decisions() {
        let r = rig();
        r.engine.set_study_mode(true).unwrap();
        let map: AppLockMap = serde_json::from_str(r#"{"com.game":false,"com.chat":true}"#).unwrap();
        r.engine.replace_app_locks(&map).unwrap();
        assert!(!r.engine.should_block("com.game"));
        assert!(r.engine.should_block("com.chat"));
        assert_eq!(r.status.last().unwrap().locked_apps, 1);
    }

    #[test]
    fn navigation_swallowed_only_with_surface() {
        let r = rig();
        assert!(!r.engine.on_navigation(NavigationGesture::Back));
    }
}
