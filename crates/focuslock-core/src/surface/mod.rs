//! Enforcement surface controller.
//!
//! Owns the single live [`SurfaceHandle`]. Every call site (monitor, timer
//! stop, permission loss, the in-surface close control) goes through
//! [`SurfaceController::ensure`] or [`SurfaceController::teardown`], which
//! serialize on one mutex, so a second surface can never be created.
//!
//! Without the overlay permission the controller refuses to render and
//! reports [`SurfaceError::PermissionMissing`].

pub mod quotes;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SurfaceError;
use crate::events::{publish, Event, EventSender};
use crate::policy::{BlockReason, BlockingDecision};
use crate::status::format_mm_ss;

/// Navigation gestures the surface may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationGesture {
    Back,
    Home,
    Other,
}

/// Gestures the surface swallows so it cannot be navigated away from.
pub const INTERCEPTED_GESTURES: [NavigationGesture; 2] =
    [NavigationGesture::Back, NavigationGesture::Home];

/// What the renderer should paint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceContent {
    pub package_id: Option<String>,
    pub reason: BlockReason,
    pub title: String,
    pub remaining: Option<String>,
    pub quote: Option<String>,
    pub intercepts: Vec<NavigationGesture>,
}

impl SurfaceContent {
    pub fn new(package_id: Option<String>, reason: BlockReason) -> Self {
        Self {
            package_id,
            reason,
            title: reason.label().to_string(),
            remaining: None,
            quote: None,
            intercepts: INTERCEPTED_GESTURES.to_vec(),
        }
    }

    /// Content for blocking `package_id` under `decision`.
    pub fn for_block(
        package_id: Option<String>,
        decision: &BlockingDecision,
        remaining_ms: u64,
        show_quote: bool,
    ) -> Self {
        let remaining = (decision.reason == BlockReason::Timer).then(|| format_mm_ss(remaining_ms));
        let quote = show_quote.then(|| quotes::random_quote().to_string());
        Self::new(package_id, decision.reason)
            .with_remaining(remaining)
            .with_quote(quote)
    }

    pub fn with_remaining(mut self, remaining: Option<String>) -> Self {
        self.remaining = remaining;
        self
    }

    pub fn with_quote(mut self, quote: Option<String>) -> Self {
        self.quote = quote;
        self
    }
}

/// Exclusive token for one rendered surface. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct SurfaceHandle {
    id: Uuid,
}

impl SurfaceHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for SurfaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform capability that paints the full-screen blocking layer.
pub trait SurfaceRenderer: Send + Sync {
    /// Whether drawing over other apps is currently allowed.
    fn has_permission(&self) -> bool;

    fn create(&self, content: &SurfaceContent) -> Result<SurfaceHandle, SurfaceError>;

    fn destroy(&self, handle: SurfaceHandle);
}

/// Result of an `ensure`/`teardown` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceChange {
    Shown,
    Hidden,
    Unchanged,
}

pub struct SurfaceController {
    renderer: Arc<dyn SurfaceRenderer>,
    handle: Mutex<Option<SurfaceHandle>>,
    events: Option<EventSender>,
}

impl SurfaceController {
    pub fn new(renderer: Arc<dyn SurfaceRenderer>) -> Self {
        Self {
            renderer,
            handle: Mutex::new(None),
            events: None,
        }
    }

    /// Publish `SurfaceShown`/`SurfaceHidden` on `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_shown(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    pub fn has_permission(&self) -> bool {
        self.renderer.has_permission()
    }

    /// Bring the surface to the requested visibility.
    ///
    /// `content` is only built when a new surface is actually created.
    /// Asking to show without permission hides any live surface and returns
    /// `PermissionMissing`.
    pub fn ensure<F>(&self, should_show: bool, content: F) -> Result<SurfaceChange, SurfaceError>
    where
        F: FnOnce() -> SurfaceContent,
    {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| SurfaceError::Render("surface lock poisoned".into()))?;

        if !should_show {
            return Ok(self.destroy_locked(&mut slot));
        }

        if !self.renderer.has_permission() {
            self.destroy_locked(&mut slot);
            tracing::warn!("overlay permission missing, blocking surface not shown");
            return Err(SurfaceError::PermissionMissing);
        }

        if slot.is_some() {
            return Ok(SurfaceChange::Unchanged);
        }

        let content = content();
        let handle = self.renderer.create(&content).inspect_err(|e| {
            tracing::error!(error = %e, "unable to create blocking surface");
        })?;
        tracing::info!(
            surface = %handle.id(),
            package = content.package_id.as_deref().unwrap_or(""),
            reason = content.reason.label(),
            "blocking surface shown"
        );
        *slot = Some(handle);
        if let Some(tx) = &self.events {
            publish(
                tx,
                Event::SurfaceShown {
                    package_id: content.package_id,
                    reason: content.reason,
                    at: chrono::Utc::now(),
                },
            );
        }
        Ok(SurfaceChange::Shown)
    }

    /// Destroy any live surface. Safe to call repeatedly.
    pub fn teardown(&self) -> SurfaceChange {
        match self.handle.lock() {
            Ok(mut slot) => self.destroy_locked(&mut slot),
            Err(poisoned) => {
                let mut slot = poisoned.into_inner();
                self.destroy_locked(&mut slot)
            }
        }
    }

    /// Re-check the overlay permission; tear down if it was revoked.
    pub fn check_permission(&self) -> Result<(), SurfaceError> {
        if self.renderer.has_permission() {
            return Ok(());
        }
        if self.teardown() == SurfaceChange::Hidden {
            tracing::warn!("overlay permission revoked, blocking surface removed");
        }
        Err(SurfaceError::PermissionMissing)
    }

    /// Whether a navigation gesture is swallowed by the live surface.
    pub fn on_navigation(&self, gesture: NavigationGesture) -> bool {
        self.is_shown() && INTERCEPTED_GESTURES.contains(&gesture)
    }

    fn destroy_locked(&self, slot: &mut Option<SurfaceHandle>) -> SurfaceChange {
        match slot.take() {
            Some(handle) => {
                let id = handle.id();
                self.renderer.destroy(handle);
                tracing::info!(surface = %id, "blocking surface removed");
                if let Some(tx) = &self.events {
                    publish(tx, Event::SurfaceHidden { at: chrono::Utc::now() });
                }
                SurfaceChange::Hidden
            }
            None => SurfaceChange::Unchanged,
        }
    }
}
