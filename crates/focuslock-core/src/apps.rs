//! Per-application lock flags.
//!
//! The map decides which applications are lockable at all; the policy
//! decides whether locking is currently in force. A package missing from the
//! map counts as locked.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An application as reported by the installed-app catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub package_id: String,
    pub label: String,
    #[serde(default)]
    pub is_system: bool,
}

impl InstalledApp {
    pub fn new(package_id: impl Into<String>, label: impl Into<String>, is_system: bool) -> Self {
        Self {
            package_id: package_id.into(),
            label: label.into(),
            is_system,
        }
    }
}

/// Application identifier -> locked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppLockMap(HashMap<String, bool>);

impl AppLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-time classification of the installed apps.
    ///
    /// System apps and apps whose label is on the default-allow list start
    /// unlocked; everything else starts locked.
    pub fn classify(installed: &[InstalledApp], default_allow: &[String]) -> Self {
        let map = installed
            .iter()
            .map(|app| {
                let open = app.is_system || default_allow.iter().any(|l| l == &app.label);
                (app.package_id.clone(), !open)
            })
            .collect();
        Self(map)
    }

    /// Add packages not seen before as locked. Returns how many were added.
    pub fn merge_installed(&mut self, installed: &[InstalledApp]) -> usize {
        let mut added = 0;
        for app in installed {
            if !self.0.contains_key(&app.package_id) {
                self.0.insert(app.package_id.clone(), true);
                added += 1;
            }
        }
        added
    }

    /// Locked unless explicitly unlocked.
    pub fn is_locked(&self, package_id: &str) -> bool {
        self.0.get(package_id).copied().unwrap_or(true)
    }

    pub fn get(&self, package_id: &str) -> Option<bool> {
        self.0.get(package_id).copied()
    }

    pub fn set_locked(&mut self, package_id: impl Into<String>, locked: bool) {
        self.0.insert(package_id.into(), locked);
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&mut self, package_id: &str) -> bool {
        let locked = !self.is_locked(package_id);
        self.0.insert(package_id.to_string(), locked);
        locked
    }

    pub fn locked_count(&self) -> usize {
        self.0.values().filter(|locked| **locked).count()
    }

    pub fn unlocked_count(&self) -> usize {
        self.0.len() - self.locked_count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, bool)> for AppLockMap {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
