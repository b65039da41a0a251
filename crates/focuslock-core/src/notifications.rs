//! Notification suppressor.
//!
//! Cancels notifications posted by locked apps while blocking is in force.
//! Suppression is a convenience, so any storage failure lets the
//! notification through.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::policy::{read_decision, should_block_app, BlockReason};
use crate::storage::StateStore;

/// Platform capability that removes a posted notification.
pub trait NotificationCanceller: Send + Sync {
    fn cancel(&self, key: &str);
}

/// An inbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub key: String,
    pub package_id: String,
}

impl NotificationEvent {
    pub fn new(key: impl Into<String>, package_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            package_id: package_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressOutcome {
    Cancelled(BlockReason),
    Allowed,
    /// State could not be read; the notification was let through.
    AllowedOnError,
}

pub struct NotificationSuppressor {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    canceller: Arc<dyn NotificationCanceller>,
}

impl NotificationSuppressor {
    pub fn new(
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        canceller: Arc<dyn NotificationCanceller>,
    ) -> Self {
        Self {
            store,
            clock,
            canceller,
        }
    }

    pub fn on_notification_posted(&self, event: &NotificationEvent) -> SuppressOutcome {
        let decision = match read_decision(&self.store, self.clock.now_ms()) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, package = %event.package_id, "state unreadable, notification allowed");
                return SuppressOutcome::AllowedOnError;
            }
        };
        if !decision.is_blocking {
            return SuppressOutcome::Allowed;
        }
        let locks = match self.store.app_lock_map_or_default() {
            Ok(locks) => locks,
            Err(e) => {
                tracing::warn!(error = %e, package = %event.package_id, "app lock map unreadable, notification allowed");
                return SuppressOutcome::AllowedOnError;
            }
        };

        if should_block_app(&decision, &locks, &event.package_id) {
            self.canceller.cancel(&event.key);
            tracing::debug!(package = %event.package_id, key = %event.key, "notification cancelled");
            SuppressOutcome::Cancelled(decision.reason)
        } else {
            SuppressOutcome::Allowed
        }
    }
}
