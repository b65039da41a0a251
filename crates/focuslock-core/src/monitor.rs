//! Foreground app monitor.
//!
//! Polls the foreground-app oracle on a short interval and reconciles the
//! blocking surface with the current decision. Show requests are debounced
//! on a change of foreground package; hide requests are issued whenever
//! blocking is no longer in force.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{OracleError, SurfaceError};
use crate::policy::{read_decision, should_block_app, BlockingDecision};
use crate::storage::{MonitorConfig, StateStore};
use crate::surface::{SurfaceChange, SurfaceContent, SurfaceController};
use crate::ticker::{TaskSlot, TickFlow};

/// Platform capability reporting the app in the foreground.
pub trait ForegroundOracle: Send + Sync + 'static {
    /// Most recent foreground package in `[window_start_ms, window_end_ms]`,
    /// or `None` when nothing was reported.
    fn query(&self, window_start_ms: i64, window_end_ms: i64) -> Result<Option<String>, OracleError>;
}

/// Last non-empty answer from the oracle while blocking was in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundObservation {
    pub package_id: String,
    pub observed_at_ms: i64,
}

/// What one poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Oracle failed or timed out. Nothing changed.
    Skipped(OracleError),
    Polled {
        package_id: Option<String>,
        changed: bool,
        decision: BlockingDecision,
        surface: Result<SurfaceChange, SurfaceError>,
    },
}

/// Cheaply cloneable handle to the monitor.
#[derive(Clone)]
pub struct ForegroundMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    oracle: Arc<dyn ForegroundOracle>,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    surface: Arc<SurfaceController>,
    config: MonitorConfig,
    show_quotes: bool,
    last: Mutex<Option<ForegroundObservation>>,
    poller: TaskSlot,
}

impl ForegroundMonitor {
    pub fn new(
        oracle: Arc<dyn ForegroundOracle>,
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        surface: Arc<SurfaceController>,
        config: MonitorConfig,
        show_quotes: bool,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                oracle,
                store,
                clock,
                surface,
                config,
                show_quotes,
                last: Mutex::new(None),
                poller: TaskSlot::new("foreground-poll"),
            }),
        }
    }

    pub fn last_observation(&self) -> Option<ForegroundObservation> {
        self.inner.last.lock().ok().and_then(|l| l.clone())
    }

    pub fn last_package(&self) -> Option<String> {
        self.last_observation().map(|o| o.package_id)
    }

    /// Forget the last foreground package so the next sighting re-triggers.
    pub fn reset_observation(&self) {
        if let Ok(mut last) = self.inner.last.lock() {
            *last = None;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.poller.is_armed()
    }

    /// Start polling. Returns `false` if already running or no runtime.
    pub fn start(&self) -> bool {
        if self.is_running() {
            return false;
        }
        self.reset_observation();
        let weak = Arc::downgrade(&self.inner);
        let started = self.inner.poller.arm(self.inner.config.poll_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return TickFlow::Stop;
                };
                let monitor = ForegroundMonitor { inner };
                monitor.poll_once().await;
                if monitor.should_keep_running() {
                    TickFlow::Continue
                } else {
                    tracing::info!("nothing left to enforce, foreground monitor stopping");
                    TickFlow::Stop
                }
            }
        });
        if started {
            tracing::info!(
                interval_ms = self.inner.config.poll_interval_ms,
                "foreground monitor started"
            );
        }
        started
    }

    /// Stop polling. Safe to call when not running.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.poller.cancel();
        if stopped {
            tracing::info!("foreground monitor stopped");
        }
        self.reset_observation();
        stopped
    }

    /// Run one poll: query, debounce, reconcile the surface.
    pub async fn poll_once(&self) -> PollOutcome {
        let package_id = match self.query().await {
            Ok(package_id) => package_id,
            Err(e) => {
                tracing::debug!(error = %e, "foreground query failed, skipping poll");
                return PollOutcome::Skipped(e);
            }
        };
        self.reconcile(package_id)
    }

    fn reconcile(&self, package_id: Option<String>) -> PollOutcome {
        let inner = &self.inner;
        let now = inner.clock.now_ms();
        let decision = match read_decision(&inner.store, now) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "state unreadable, treating as not blocking");
                BlockingDecision::ALLOW
            }
        };

        let changed = match &package_id {
            Some(pkg) => self.last_package().as_deref() != Some(pkg.as_str()),
            None => false,
        };

        let mut surface = Ok(SurfaceChange::Unchanged);
        if let Some(pkg) = package_id.as_deref().filter(|_| changed) {
            let locks = match inner.store.app_lock_map_or_default() {
                Ok(locks) => locks,
                Err(e) => {
                    tracing::warn!(error = %e, "app lock map unreadable, using fail-safe default");
                    Default::default()
                }
            };
            if should_block_app(&decision, &locks, pkg) {
                tracing::debug!(package = %pkg, reason = decision.reason.label(), "blocked app in foreground");
                surface = inner.surface.ensure(true, || self.content_for(pkg, &decision, now));
            }
        }

        if !decision.is_blocking {
            surface = Ok(inner.surface.teardown());
        }

        if let Err(e) = &surface {
            tracing::warn!(error = %e, "blocking surface unavailable");
        }

        if !decision.is_blocking {
            // Whatever is in front when blocking resumes counts as a change.
            self.reset_observation();
        } else if let Some(pkg) = &package_id {
            if let Ok(mut last) = inner.last.lock() {
                *last = Some(ForegroundObservation {
                    package_id: pkg.clone(),
                    observed_at_ms: now,
                });
            }
        }

        PollOutcome::Polled {
            package_id,
            changed,
            decision,
            surface,
        }
    }

    async fn query(&self) -> Result<Option<String>, OracleError> {
        let inner = &self.inner;
        let now = inner.clock.now_ms();
        let window_start = now - inner.config.lookback_ms;
        let window_end = now + inner.config.lookahead_ms;
        let oracle = Arc::clone(&inner.oracle);
        let timeout = inner.config.oracle_timeout();

        let query = tokio::task::spawn_blocking(move || oracle.query(window_start, window_end));
        match tokio::time::timeout(timeout, query).await {
            Ok(Ok(answer)) => Ok(answer?.filter(|pkg| !pkg.trim().is_empty())),
            Ok(Err(join)) => Err(OracleError::Unavailable(join.to_string())),
            Err(_) => Err(OracleError::Timeout {
                timeout_ms: inner.config.oracle_timeout_ms,
            }),
        }
    }

    fn content_for(&self, package_id: &str, decision: &BlockingDecision, now: i64) -> SurfaceContent {
        let remaining_ms = self
            .inner
            .store
            .timer_state()
            .map(|t| t.remaining_ms(now))
            .unwrap_or(0);
        SurfaceContent::for_block(
            Some(package_id.to_string()),
            decision,
            remaining_ms,
            self.inner.show_quotes,
        )
    }

    /// Keep polling while blocking is in force or a surface still needs
    /// cleaning up. An unreadable store keeps the poller alive so the next
    /// interval retries.
    fn should_keep_running(&self) -> bool {
        match read_decision(&self.inner.store, self.inner.clock.now_ms()) {
            Ok(decision) => decision.is_blocking || self.inner.surface.is_shown(),
            Err(e) => {
                tracing::warn!(error = %e, "state unreadable, keeping foreground monitor alive");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{RecordingRenderer, ScriptedOracle};
    use crate::timer::TimerState;
    use std::time::Duration;

    struct Rig {
        monitor: ForegroundMonitor,
        oracle: Arc<ScriptedOracle>,
        renderer: Arc<RecordingRenderer>,
        store: Arc<StateStore>,
        clock: ManualClock,
    }

    fn rig() -> Rig {
        let oracle = Arc::new(ScriptedOracle::new());
        let renderer = Arc::new(RecordingRenderer::granted());
        let store = Arc::new(StateStore::in_memory());
        let clock = ManualClock::new(0);
        let surface = Arc::new(SurfaceController::new(renderer.clone()));
        let config = MonitorConfig {
            poll_interval_ms: 10,
            ..MonitorConfig::default()
        };
        let monitor = ForegroundMonitor::new(
            oracle.clone(),
            Arc::clone(&store),
            Arc::new(clock.clone()),
            surface,
            config,
            false,
        );
        Rig {
            monitor,
            oracle,
            renderer,
            store,
            clock,
        }
    }

    fn lock(store: &StateStore, pkg: &str, locked: bool) {
        store
            .update_app_lock_map(|m| m.set_locked(pkg, locked))
            .unwrap();
    }

    #[tokio::test]
    async fn shows_once_on_change_to_locked_app() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        lock(&r.store, "com.a", true);
        lock(&r.store, "com.b", false);

        for pkg in ["com.b", "com.a", "com.a", "com.a"] {
            r.oracle.push_package(pkg);
        }
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.created(), 0);
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.created(), 1);
        r.monitor.poll_once().await;
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.created(), 1);
        assert_eq!(r.renderer.live(), 1);
    }

    #[tokio::test]
    async fn empty_answer_keeps_last_observation() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        lock(&r.store, "com.a", false);
        r.oracle.push_package("com.a");
        r.oracle.push(Ok(None));
        r.oracle.push(Ok(Some("   ".into())));
        r.monitor.poll_once().await;
        r.monitor.poll_once().await;
        r.monitor.poll_once().await;
        assert_eq!(r.monitor.last_package().as_deref(), Some("com.a"));
    }

    #[tokio::test]
    async fn oracle_failure_skips_poll() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        r.oracle.push_package("com.x");
        r.oracle.push(Err(OracleError::Unavailable("no usage access".into())));
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.live(), 1);

        let outcome = r.monitor.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Skipped(OracleError::Unavailable(_))));
        assert_eq!(r.renderer.live(), 1);
        assert_eq!(r.monitor.last_package().as_deref(), Some("com.x"));
    }

    #[tokio::test]
    async fn hides_when_timer_runs_out_between_polls() {
        let r = rig();
        r.store.write_timer_state(&TimerState::started(1, 0)).unwrap();
        r.oracle.push_package("com.game");
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.live(), 1);

        r.clock.set(60_000);
        let outcome = r.monitor.poll_once().await;
        match outcome {
            PollOutcome::Polled {
                changed,
                decision,
                surface,
                ..
            } => {
                assert!(!changed);
                assert!(!decision.is_blocking);
                assert_eq!(surface, Ok(SurfaceChange::Hidden));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.renderer.live(), 0);
    }

    #[tokio::test]
    async fn unlocked_app_is_not_blocked() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        lock(&r.store, "com.android.settings", false);
        r.oracle.push_package("com.android.settings");
        r.monitor.poll_once().await;
        assert_eq!(r.renderer.created(), 0);
    }

    #[tokio::test]
    async fn missing_permission_is_reported_not_fatal() {
        let r = rig();
        r.renderer.set_permission(false);
        r.store.set_study_mode(true).unwrap();
        r.oracle.push_package("com.a");
        match r.monitor.poll_once().await {
            PollOutcome::Polled { surface, .. } => {
                assert_eq!(surface, Err(SurfaceError::PermissionMissing))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.renderer.created(), 0);
    }

    struct SlowOracle;

    impl ForegroundOracle for SlowOracle {
        fn query(&self, _: i64, _: i64) -> Result<Option<String>, OracleError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Some("com.late".into()))
        }
    }

    #[tokio::test]
    async fn slow_oracle_times_out() {
        let store = Arc::new(StateStore::in_memory());
        let config = MonitorConfig {
            oracle_timeout_ms: 20,
            ..MonitorConfig::default()
        };
        let monitor = ForegroundMonitor::new(
            Arc::new(SlowOracle),
            store,
            Arc::new(ManualClock::new(0)),
            Arc::new(SurfaceController::new(Arc::new(RecordingRenderer::granted()))),
            config,
            false,
        );
        assert_eq!(
            monitor.poll_once().await,
            PollOutcome::Skipped(OracleError::Timeout { timeout_ms: 20 })
        );
        assert!(monitor.last_package().is_none());
    }

    #[tokio::test]
    async fn poller_stops_itself_when_nothing_blocks() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        r.oracle.push_package("com.a");
        assert!(r.monitor.start());
        assert!(!r.monitor.start());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(r.monitor.is_running());
        assert_eq!(r.renderer.live(), 1);

        r.store.set_study_mode(false).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!r.monitor.is_running());
        assert_eq!(r.renderer.live(), 0);
        assert!(r.oracle.queries() >= 2);
    }

    /// Memory store whose reads can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: crate::storage::MemoryStore,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), crate::error::StoreError> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                Err(crate::error::StoreError::Unavailable("database is locked".into()))
            } else {
                Ok(())
            }
        }
    }

    impl crate::storage::KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::error::StoreError> {
            self.check()?;
            self.inner.get(key)
        }
        fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, crate::error::StoreError> {
            self.check()?;
            self.inner.get_many(keys)
        }
        fn set_many(&self, entries: &[(&str, String)]) -> Result<(), crate::error::StoreError> {
            self.inner.set_many(entries)
        }
        fn remove(&self, key: &str) -> Result<(), crate::error::StoreError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn transient_read_failure_keeps_polling_and_reshows() {
        let kv = Arc::new(FlakyStore::default());
        let store = Arc::new(StateStore::new(kv.clone()));
        store.set_study_mode(true).unwrap();
        let oracle = Arc::new(ScriptedOracle::with_packages(["com.game"]));
        let renderer = Arc::new(RecordingRenderer::granted());
        let monitor = ForegroundMonitor::new(
            oracle,
            store,
            Arc::new(ManualClock::new(0)),
            Arc::new(SurfaceController::new(renderer.clone())),
            MonitorConfig {
                poll_interval_ms: 10,
                ..MonitorConfig::default()
            },
            false,
        );

        assert!(monitor.start());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(renderer.live(), 1);

        kv.set_failing(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(renderer.live(), 0, "unreadable state fails open");
        assert!(monitor.is_running());

        kv.set_failing(false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(monitor.is_running());
        assert_eq!(renderer.live(), 1);
        assert_eq!(renderer.created(), 2);
        monitor.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let r = rig();
        r.store.set_study_mode(true).unwrap();
        r.monitor.start();
        assert!(r.monitor.stop());
        assert!(!r.monitor.stop());
        assert!(r.monitor.last_observation().is_none());
    }
}
