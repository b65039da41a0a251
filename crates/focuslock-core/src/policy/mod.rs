//! Blocking policy.
//!
//! Two independent reasons can put the device into blocking: Study Mode
//! (no expiry) and a running focus timer. [`evaluate`] merges them into one
//! decision and [`should_block_app`] applies it to a single package. Both
//! the surface controller and the notification suppressor go through
//! `should_block_app`; nothing else re-derives the rule.

use serde::{Deserialize, Serialize};

use crate::apps::AppLockMap;
use crate::error::StoreError;
use crate::storage::StateStore;
use crate::timer::TimerState;

/// Why blocking is in force. Timer wins the label when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Timer,
    StudyMode,
    None,
}

impl BlockReason {
    /// User-facing label for the status surface.
    pub fn label(self) -> &'static str {
        match self {
            BlockReason::Timer => "Timer Active",
            BlockReason::StudyMode => "Study Mode Active",
            BlockReason::None => "Inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingDecision {
    pub is_blocking: bool,
    pub reason: BlockReason,
}

impl BlockingDecision {
    pub const ALLOW: BlockingDecision = BlockingDecision {
        is_blocking: false,
        reason: BlockReason::None,
    };
}

/// Merge Study Mode and the timer snapshot into one decision.
pub fn evaluate(study_mode: bool, timer: &TimerState, now_ms: i64) -> BlockingDecision {
    let timer_blocking = timer.is_blocking(now_ms);
    let reason = if timer_blocking {
        BlockReason::Timer
    } else if study_mode {
        BlockReason::StudyMode
    } else {
        BlockReason::None
    };
    BlockingDecision {
        is_blocking: study_mode || timer_blocking,
        reason,
    }
}

/// Block `package_id` iff blocking is in force and the package is locked.
/// Packages absent from the map are treated as locked.
pub fn should_block_app(decision: &BlockingDecision, locks: &AppLockMap, package_id: &str) -> bool {
    decision.is_blocking && locks.is_locked(package_id)
}

/// Evaluate against the persisted flags.
pub fn read_decision(store: &StateStore, now_ms: i64) -> Result<BlockingDecision, StoreError> {
    let study_mode = store.study_mode()?;
    let timer = store.timer_state()?;
    Ok(evaluate(study_mode, &timer, now_ms))
}
