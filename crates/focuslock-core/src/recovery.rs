//! Recovery after a process or device restart.
//!
//! Runs once at start-up: clears a session whose deadline passed while the
//! process was down (no completion event), re-arms a session that is still
//! running, and restarts the monitor whenever anything still blocks.
//! Running it twice changes nothing the second time.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::monitor::ForegroundMonitor;
use crate::storage::StateStore;
use crate::timer::{FocusTimer, TimerPhase};

/// What happened to the persisted timer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TimerRecovery {
    /// No session was active.
    Idle,
    /// The deadline passed while nobody was watching; cleared silently.
    ExpiredWhileDown,
    /// The session is still running and its ticker was re-armed.
    Resumed { remaining_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub timer: TimerRecovery,
    pub study_mode: bool,
    /// Whether this run started the monitor (false if it was already up
    /// or nothing needs enforcing).
    pub monitor_started: bool,
}

impl RecoveryReport {
    pub fn is_blocking(&self) -> bool {
        self.study_mode || matches!(self.timer, TimerRecovery::Resumed { .. })
    }
}

pub struct RecoveryCoordinator<'a> {
    store: &'a StateStore,
    timer: &'a FocusTimer,
    monitor: &'a ForegroundMonitor,
}

impl<'a> RecoveryCoordinator<'a> {
    pub fn new(store: &'a StateStore, timer: &'a FocusTimer, monitor: &'a ForegroundMonitor) -> Self {
        Self {
            store,
            timer,
            monitor,
        }
    }

    pub fn run(&self) -> Result<RecoveryReport, StoreError> {
        let timer = self.recover_timer()?;
        let study_mode = self.store.study_mode()?;

        let mut report = RecoveryReport {
            timer,
            study_mode,
            monitor_started: false,
        };
        if report.is_blocking() {
            report.monitor_started = self.monitor.start();
        }
        if report.monitor_started || report.timer == TimerRecovery::ExpiredWhileDown {
            tracing::info!(
                timer = ?report.timer,
                study_mode,
                monitor_started = report.monitor_started,
                "recovery finished"
            );
        } else {
            tracing::debug!(timer = ?report.timer, study_mode, "recovery found nothing to do");
        }
        Ok(report)
    }

    fn recover_timer(&self) -> Result<TimerRecovery, StoreError> {
        let status = self.timer.status()?;
        match status.phase {
            TimerPhase::Idle => Ok(TimerRecovery::Idle),
            TimerPhase::Expired => match self.timer.expire_silently() {
                Ok(true) => Ok(TimerRecovery::ExpiredWhileDown),
                // Raced with another clear.
                Ok(false) => Ok(TimerRecovery::Idle),
                Err(e) => Err(into_store_error(e)),
            },
            TimerPhase::Running => {
                self.timer.resume_ticking().map_err(into_store_error)?;
                Ok(TimerRecovery::Resumed {
                    remaining_ms: status.remaining_ms,
                })
            }
        }
    }
}

fn into_store_error(err: crate::error::TimerError) -> StoreError {
    match err {
        crate::error::TimerError::Persistence(e) => e,
        other => StoreError::QueryFailed(other.to_string()),
    }
}
