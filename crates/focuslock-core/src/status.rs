//! Persistent status surface (the ongoing notification in the tray).

use serde::{Deserialize, Serialize};

use crate::policy::{BlockReason, BlockingDecision};

/// `MM:SS`, minutes not wrapped at 60.
pub fn format_mm_ss(remaining_ms: u64) -> String {
    let total_secs = remaining_ms / 1_000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub reason: BlockReason,
    /// `Timer Active` / `Study Mode Active` / `Inactive`
    pub label: String,
    /// Only present while the timer is the active reason.
    pub remaining: Option<String>,
    pub locked_apps: usize,
}

impl StatusLine {
    pub fn new(decision: &BlockingDecision, remaining_ms: u64, locked_apps: usize) -> Self {
        let remaining = (decision.reason == BlockReason::Timer).then(|| format_mm_ss(remaining_ms));
        Self {
            reason: decision.reason,
            label: decision.reason.label().to_string(),
            remaining,
            locked_apps,
        }
    }
}

/// Where status updates are rendered.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: &StatusLine);

    /// One-off, non-blocking message (e.g. state could not be read).
    fn notice(&self, message: &str) {
        tracing::warn!(notice = message, "status notice");
    }
}

/// Discards status updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn update(&self, _status: &StatusLine) {}
}
