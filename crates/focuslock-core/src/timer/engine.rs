//! Focus timer state machine.
//!
//! The timer's truth is the persisted [`TimerState`]; this type only
//! applies commands to it and drives the one-second ticker.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Expired -> Idle
//!           |  ^
//!           |  +-- start (re-arm), extend
//!           +----> stop -> Idle
//! ```
//!
//! Remaining time is always recomputed from the stored start timestamp, so
//! a missed tick or a process restart never drifts the deadline.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::state::{TimerPhase, TimerState};
use crate::clock::Clock;
use crate::error::{StoreError, TimerError};
use crate::events::{publish, Event, EventSender};
use crate::status::format_mm_ss;
use crate::storage::StateStore;
use crate::ticker::{TaskSlot, TickFlow};

/// Point-in-time view of the timer for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStatus {
    pub phase: TimerPhase,
    pub duration_minutes: u32,
    pub remaining_ms: u64,
    pub remaining_display: String,
    pub blocking: bool,
}

/// Cheaply cloneable handle to the timer.
#[derive(Clone)]
pub struct FocusTimer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    ticker: TaskSlot,
    tick_interval: Duration,
}

impl FocusTimer {
    pub fn new(
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        events: EventSender,
        tick_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                store,
                clock,
                events,
                ticker: TaskSlot::new("timer-tick"),
                tick_interval,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn snapshot(&self) -> Result<TimerState, StoreError> {
        self.inner.store.timer_state()
    }

    pub fn phase(&self) -> Result<TimerPhase, StoreError> {
        Ok(self.snapshot()?.phase(self.now_ms()))
    }

    /// Remaining time, or 0 if the store cannot be read.
    pub fn remaining_ms(&self) -> u64 {
        match self.snapshot() {
            Ok(state) => state.remaining_ms(self.now_ms()),
            Err(e) => {
                tracing::warn!(error = %e, "timer state unreadable, reporting no time left");
                0
            }
        }
    }

    pub fn status(&self) -> Result<TimerStatus, StoreError> {
        let state = self.snapshot()?;
        let now = self.now_ms();
        let remaining_ms = state.remaining_ms(now);
        Ok(TimerStatus {
            phase: state.phase(now),
            duration_minutes: state.duration_minutes,
            remaining_ms,
            remaining_display: format_mm_ss(remaining_ms),
            blocking: state.is_blocking(now),
        })
    }

    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.is_armed()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or restart) a session of `duration_minutes`.
    ///
    /// If the snapshot cannot be persisted nothing is armed and the timer
    /// stays idle.
    pub fn start(&self, duration_minutes: u32) -> Result<Event, TimerError> {
        if duration_minutes == 0 {
            return Err(TimerError::InvalidDuration);
        }
        let state = TimerState::started(duration_minutes, self.now_ms());
        if let Err(e) = self.inner.store.write_timer_state(&state) {
            tracing::error!(error = %e, "could not persist timer start; staying idle");
            return Err(TimerError::Persistence(e));
        }
        tracing::info!(duration_minutes, "focus timer started");

        let event = Event::TimerStarted {
            duration_minutes,
            at: Utc::now(),
        };
        publish(&self.inner.events, event.clone());
        self.arm_ticker();
        Ok(event)
    }

    /// Stop the session. Returns `None` when already idle.
    pub fn stop(&self) -> Result<Option<Event>, TimerError> {
        self.inner.ticker.cancel();
        let (_, written) = self.inner.store.update_timer_state(|state| {
            (state.active || state.blocking_enabled).then(|| state.cleared())
        })?;
        if written.is_none() {
            tracing::debug!("stop ignored, timer already idle");
            return Ok(None);
        }
        tracing::info!("focus timer stopped");
        let event = Event::TimerStopped { at: Utc::now() };
        publish(&self.inner.events, event.clone());
        Ok(Some(event))
    }

    /// Add `minutes` to the running session without moving its start.
    pub fn extend(&self, minutes: u32) -> Result<Event, TimerError> {
        if minutes == 0 {
            return Err(TimerError::InvalidDuration);
        }
        let now = self.now_ms();
        let (before, written) = self
            .inner
            .store
            .update_timer_state(|state| state.active.then(|| state.extended(minutes)))?;
        let Some(after) = written else {
            tracing::warn!(minutes, "extend rejected, no active timer");
            return Err(TimerError::InvalidTransition {
                command: "extend",
                phase: before.phase(now),
            });
        };

        let remaining_ms = after.remaining_ms(now);
        tracing::info!(
            minutes,
            duration_minutes = after.duration_minutes,
            remaining_ms,
            "focus timer extended"
        );
        let event = Event::TimerExtended {
            added_minutes: minutes,
            duration_minutes: after.duration_minutes,
            remaining_ms,
            at: Utc::now(),
        };
        publish(&self.inner.events, event.clone());
        Ok(event)
    }

    /// Advance the countdown. Called every second by the ticker.
    ///
    /// Returns `TimerCompleted` on the tick that observes expiry,
    /// `RemainingTimeChanged` while running and `None` when idle.
    pub fn tick(&self) -> Result<Option<Event>, TimerError> {
        let now = self.now_ms();
        let state = self.snapshot()?;
        if !state.active {
            self.inner.ticker.cancel();
            return Ok(None);
        }

        let remaining_ms = state.remaining_ms(now);
        if remaining_ms > 0 {
            let event = Event::RemainingTimeChanged {
                remaining_ms,
                at: Utc::now(),
            };
            publish(&self.inner.events, event.clone());
            return Ok(Some(event));
        }

        if !self.clear_if_expired(now)? {
            // A concurrent stop or start got there first.
            return Ok(None);
        }
        self.inner.ticker.cancel();
        tracing::info!("focus timer completed");
        let event = Event::TimerCompleted { at: Utc::now() };
        publish(&self.inner.events, event.clone());
        Ok(Some(event))
    }

    /// Clear a session whose deadline passed while nobody was watching.
    /// No event is emitted. Returns whether anything was cleared.
    pub fn expire_silently(&self) -> Result<bool, TimerError> {
        let cleared = self.clear_if_expired(self.now_ms())?;
        if cleared {
            self.inner.ticker.cancel();
            tracing::info!("focus timer expired while unobserved");
        }
        Ok(cleared)
    }

    /// Re-arm the ticker for a session that is still running. Keeps the
    /// stored start and duration so the deadline is unchanged.
    pub fn resume_ticking(&self) -> Result<bool, TimerError> {
        let state = self.snapshot()?;
        if state.phase(self.now_ms()) != TimerPhase::Running {
            return Ok(false);
        }
        self.arm_ticker();
        Ok(true)
    }

    pub fn cancel_ticker(&self) {
        self.inner.ticker.cancel();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn clear_if_expired(&self, now: i64) -> Result<bool, StoreError> {
        let (_, written) = self.inner.store.update_timer_state(|state| {
            (state.active && state.remaining_ms(now) == 0).then(|| state.cleared())
        })?;
        Ok(written.is_some())
    }

    fn arm_ticker(&self) {
        let weak: Weak<TimerInner> = Arc::downgrade(&self.inner);
        self.inner.ticker.arm(self.inner.tick_interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => FocusTimer { inner }.tick_flow(),
                    None => TickFlow::Stop,
                }
            }
        });
    }

    fn tick_flow(&self) -> TickFlow {
        match self.tick() {
            Ok(Some(Event::RemainingTimeChanged { .. })) => TickFlow::Continue,
            Ok(_) => TickFlow::Stop,
            Err(e) => {
                tracing::warn!(error = %e, "timer tick failed, retrying next interval");
                TickFlow::Continue
            }
        }
    }
}
