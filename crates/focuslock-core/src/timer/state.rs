//! Persisted timer snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MS_PER_MINUTE: i64 = 60_000;

/// Where the countdown is, derived from a snapshot and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    /// Deadline passed but the expiry has not been processed yet.
    Expired,
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// The timer as stored. Remaining time is never stored, only derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub duration_minutes: u32,
    pub start_timestamp_ms: i64,
    pub active: bool,
    pub blocking_enabled: bool,
}

impl TimerState {
    /// Fresh running snapshot.
    pub fn started(duration_minutes: u32, now_ms: i64) -> Self {
        Self {
            duration_minutes,
            start_timestamp_ms: now_ms,
            active: true,
            blocking_enabled: true,
        }
    }

    /// Same session, no longer active or blocking.
    pub fn cleared(self) -> Self {
        Self {
            active: false,
            blocking_enabled: false,
            ..self
        }
    }

    /// Same start time, longer duration.
    pub fn extended(self, minutes: u32) -> Self {
        Self {
            duration_minutes: self.duration_minutes.saturating_add(minutes),
            ..self
        }
    }

    pub fn total_ms(&self) -> i64 {
        i64::from(self.duration_minutes) * MS_PER_MINUTE
    }

    /// `max(0, duration - elapsed)`, and 0 whenever the timer is inactive.
    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        if !self.active {
            return 0;
        }
        let elapsed = now_ms.saturating_sub(self.start_timestamp_ms).max(0);
        self.total_ms().saturating_sub(elapsed).max(0) as u64
    }

    pub fn phase(&self, now_ms: i64) -> TimerPhase {
        if !self.active {
            TimerPhase::Idle
        } else if self.remaining_ms(now_ms) > 0 {
            TimerPhase::Running
        } else {
            TimerPhase::Expired
        }
    }

    /// Whether the timer is currently a reason to block.
    pub fn is_blocking(&self, now_ms: i64) -> bool {
        self.blocking_enabled && self.active && self.remaining_ms(now_ms) > 0
    }
}
