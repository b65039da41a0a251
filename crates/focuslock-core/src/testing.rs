//! In-process fakes for the engine's external collaborators.
//!
//! Compiled for this crate's tests and behind the `testing` feature for
//! anyone embedding the engine who needs a deterministic oracle or renderer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{OracleError, SurfaceError};
use crate::monitor::ForegroundOracle;
use crate::notifications::NotificationCanceller;
use crate::status::{StatusLine, StatusSink};
use crate::surface::{SurfaceContent, SurfaceHandle, SurfaceRenderer};

pub use crate::clock::ManualClock;

/// Renderer that records what it was asked to paint.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    permission: AtomicBool,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    contents: Mutex<Vec<SurfaceContent>>,
}

impl RecordingRenderer {
    pub fn granted() -> Self {
        let renderer = Self::default();
        renderer.permission.store(true, Ordering::SeqCst);
        renderer
    }

    pub fn denied() -> Self {
        Self::default()
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Surfaces currently alive.
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.destroyed())
    }

    pub fn contents(&self) -> Vec<SurfaceContent> {
        self.contents.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl SurfaceRenderer for RecordingRenderer {
    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn create(&self, content: &SurfaceContent) -> Result<SurfaceHandle, SurfaceError> {
        if !self.has_permission() {
            return Err(SurfaceError::PermissionMissing);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut contents) = self.contents.lock() {
            contents.push(content.clone());
        }
        Ok(SurfaceHandle::new())
    }

    fn destroy(&self, _handle: SurfaceHandle) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Oracle that replays a script, then repeats its last answer.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Option<String>, OracleError>>>,
    last: Mutex<Option<Result<Option<String>, OracleError>>>,
    queries: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a sequence of foreground packages.
    pub fn with_packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = Self::new();
        for package in packages {
            oracle.push(Ok(Some(package.into())));
        }
        oracle
    }

    pub fn push(&self, answer: Result<Option<String>, OracleError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(answer);
        }
    }

    pub fn push_package(&self, package_id: &str) {
        self.push(Ok(Some(package_id.to_string())));
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ForegroundOracle for ScriptedOracle {
    fn query(&self, _window_start_ms: i64, _window_end_ms: i64) -> Result<Option<String>, OracleError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| OracleError::Unavailable("script lock poisoned".into()))?;
        match next {
            Some(answer) => {
                *last = Some(answer.clone());
                answer
            }
            None => last.clone().unwrap_or(Ok(None)),
        }
    }
}

/// Records cancelled notification keys.
#[derive(Debug, Default)]
pub struct RecordingCanceller {
    cancelled: Mutex<Vec<String>>,
}

impl RecordingCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl NotificationCanceller for RecordingCanceller {
    fn cancel(&self, key: &str) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            cancelled.push(key.to_string());
        }
    }
}

/// Records every status update and notice.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    lines: Mutex<Vec<StatusLine>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<StatusLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<StatusLine> {
        self.lines.lock().ok().and_then(|l| l.last().cloned())
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl StatusSink for RecordingStatusSink {
    fn update(&self, status: &StatusLine) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(status.clone());
        }
    }

    fn notice(&self, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(message.to_string());
        }
    }
}
