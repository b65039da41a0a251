//! Platform capabilities for running on a desktop host.

use std::process::Command;

use focuslock_core::{
    ForegroundOracle, NotificationCanceller, OracleError, StatusLine, StatusSink, SurfaceContent,
    SurfaceError, SurfaceHandle, SurfaceRenderer,
};

/// Oracle that never sees a foreground app.
pub struct IdleOracle;

impl ForegroundOracle for IdleOracle {
    fn query(&self, _window_start_ms: i64, _window_end_ms: i64) -> Result<Option<String>, OracleError> {
        Ok(None)
    }
}

/// Oracle backed by a shell command.
///
/// The command receives the query window in `FOCUSLOCK_WINDOW_START` and
/// `FOCUSLOCK_WINDOW_END` (epoch ms) and prints the foreground package on
/// its last non-empty stdout line.
pub struct CommandOracle {
    command: String,
}

impl CommandOracle {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ForegroundOracle for CommandOracle {
    fn query(&self, window_start_ms: i64, window_end_ms: i64) -> Result<Option<String>, OracleError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("FOCUSLOCK_WINDOW_START", window_start_ms.to_string())
            .env("FOCUSLOCK_WINDOW_END", window_end_ms.to_string())
            .output()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(OracleError::Unavailable(format!(
                "oracle command exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(last_package(&stdout))
    }
}

fn last_package(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Renderer that only logs what it would paint.
pub struct LoggingRenderer;

impl SurfaceRenderer for LoggingRenderer {
    fn has_permission(&self) -> bool {
        true
    }

    fn create(&self, content: &SurfaceContent) -> Result<SurfaceHandle, SurfaceError> {
        let handle = SurfaceHandle::new();
        tracing::info!(
            surface = %handle.id(),
            title = %content.title,
            package = content.package_id.as_deref().unwrap_or(""),
            remaining = content.remaining.as_deref().unwrap_or(""),
            quote = content.quote.as_deref().unwrap_or(""),
            "render blocking surface"
        );
        Ok(handle)
    }

    fn destroy(&self, handle: SurfaceHandle) {
        tracing::info!(surface = %handle.id(), "destroy blocking surface");
    }
}

pub struct LoggingCanceller;

impl NotificationCanceller for LoggingCanceller {
    fn cancel(&self, key: &str) {
        tracing::info!(key, "cancel notification");
    }
}

/// Status line written to the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn update(&self, status: &StatusLine) {
        tracing::debug!(
            label = %status.label,
            remaining = status.remaining.as_deref().unwrap_or(""),
            locked_apps = status.locked_apps,
            "status"
        );
    }

    fn notice(&self, message: &str) {
        eprintln!("{message}");
    }
}
