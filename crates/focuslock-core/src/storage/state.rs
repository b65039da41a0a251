//! Typed access to the persisted engine state.
//!
//! Layout (one kv row each):
//! - `is_study_mode`: bool
//! - `timer_duration`: minutes
//! - `timer_start_time`: epoch ms
//! - `is_timer_active`, `is_timer_blocking_enabled`: bool
//! - `app_list`: JSON object of package -> locked
//!
//! The timer snapshot is always written as one batch. Read-modify-write
//! operations (extend, lock toggles) run under a process-wide mutex so two
//! writers never lose each other's update.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use super::database::{KeyValueStore, MemoryStore};
use crate::apps::{AppLockMap, InstalledApp};
use crate::error::StoreError;
use crate::timer::TimerState;

pub const KEY_STUDY_MODE: &str = "is_study_mode";
pub const KEY_TIMER_DURATION: &str = "timer_duration";
pub const KEY_TIMER_START: &str = "timer_start_time";
pub const KEY_TIMER_ACTIVE: &str = "is_timer_active";
pub const KEY_TIMER_BLOCKING: &str = "is_timer_blocking_enabled";
pub const KEY_APP_LIST: &str = "app_list";

/// Injectable state store shared by every engine component.
pub struct StateStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // ── Primitive accessors ──────────────────────────────────────────

    pub fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self.kv.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32, StoreError> {
        self.parse(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        self.parse(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        self.parse(key, default)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv.set(key, value.to_string())
    }

    pub fn set_int(&self, key: &str, value: i32) -> Result<(), StoreError> {
        self.kv.set(key, value.to_string())
    }

    pub fn set_long(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.kv.set(key, value.to_string())
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.kv.set(key, value.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, StoreError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        parse_value(key, self.kv.get(key)?, default)
    }

    // ── Timer ────────────────────────────────────────────────────────

    /// The four timer keys, read as one snapshot.
    pub fn timer_state(&self) -> Result<TimerState, StoreError> {
        let keys = [
            KEY_TIMER_DURATION,
            KEY_TIMER_START,
            KEY_TIMER_ACTIVE,
            KEY_TIMER_BLOCKING,
        ];
        let [duration, start, active, blocking]: [Option<String>; 4] = self
            .kv
            .get_many(&keys)?
            .try_into()
            .map_err(|values: Vec<_>| StoreError::Corrupt {
                key: KEY_TIMER_DURATION.to_string(),
                message: format!("expected 4 timer values, got {}", values.len()),
            })?;
        Ok(TimerState {
            duration_minutes: parse_value::<i32>(KEY_TIMER_DURATION, duration, 0)?.max(0) as u32,
            start_timestamp_ms: parse_value(KEY_TIMER_START, start, 0)?,
            active: parse_value(KEY_TIMER_ACTIVE, active, false)?,
            blocking_enabled: parse_value(KEY_TIMER_BLOCKING, blocking, false)?,
        })
    }

    /// Overwrite the whole timer snapshot.
    pub fn write_timer_state(&self, state: &TimerState) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock()?;
        self.put_timer_state(state)
    }

    /// Read the snapshot, let `f` decide the replacement, write it back.
    ///
    /// Returns the snapshot that was read and the one written, if any.
    pub fn update_timer_state<F>(
        &self,
        f: F,
    ) -> Result<(TimerState, Option<TimerState>), StoreError>
    where
        F: FnOnce(TimerState) -> Option<TimerState>,
    {
        let _guard = self.write_lock.lock()?;
        let before = self.timer_state()?;
        let after = f(before);
        if let Some(next) = after.as_ref() {
            self.put_timer_state(next)?;
        }
        Ok((before, after))
    }

    fn put_timer_state(&self, state: &TimerState) -> Result<(), StoreError> {
        let duration = i32::try_from(state.duration_minutes).unwrap_or(i32::MAX);
        self.kv.set_many(&[
            (KEY_TIMER_DURATION, duration.to_string()),
            (KEY_TIMER_START, state.start_timestamp_ms.to_string()),
            (KEY_TIMER_ACTIVE, state.active.to_string()),
            (KEY_TIMER_BLOCKING, state.blocking_enabled.to_string()),
        ])
    }

    // ── Study mode ───────────────────────────────────────────────────

    pub fn study_mode(&self) -> Result<bool, StoreError> {
        self.get_bool(KEY_STUDY_MODE, false)
    }

    pub fn set_study_mode(&self, enabled: bool) -> Result<(), StoreError> {
        self.set_bool(KEY_STUDY_MODE, enabled)
    }

    // ── App lock map ─────────────────────────────────────────────────

    /// `None` until the map has been populated for the first time.
    pub fn app_lock_map(&self) -> Result<Option<AppLockMap>, StoreError> {
        match self.kv.get(KEY_APP_LIST)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: KEY_APP_LIST.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// The map, or an empty one (every package locked) if never populated.
    pub fn app_lock_map_or_default(&self) -> Result<AppLockMap, StoreError> {
        Ok(self.app_lock_map()?.unwrap_or_default())
    }

    pub fn write_app_lock_map(&self, map: &AppLockMap) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock()?;
        self.put_app_lock_map(map)
    }

    /// Mutate the map under the write lock and persist it.
    pub fn update_app_lock_map<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut AppLockMap) -> R,
    {
        let _guard = self.write_lock.lock()?;
        let mut map = self.app_lock_map()?.unwrap_or_default();
        let result = f(&mut map);
        self.put_app_lock_map(&map)?;
        Ok(result)
    }

    /// Populate the map on first access, then merge newly installed apps.
    pub fn ensure_app_lock_map(
        &self,
        installed: &[InstalledApp],
        default_allow: &[String],
    ) -> Result<AppLockMap, StoreError> {
        let _guard = self.write_lock.lock()?;
        let mut map = match self.app_lock_map()? {
            Some(map) => map,
            None => {
                let map = AppLockMap::classify(installed, default_allow);
                tracing::info!(
                    apps = map.len(),
                    locked = map.locked_count(),
                    "classified installed apps"
                );
                map
            }
        };
        let added = map.merge_installed(installed);
        if added > 0 {
            tracing::info!(added, "new apps default to locked");
        }
        self.put_app_lock_map(&map)?;
        Ok(map)
    }

    fn put_app_lock_map(&self, map: &AppLockMap) -> Result<(), StoreError> {
        let json = serde_json::to_string(map).map_err(|e| StoreError::Corrupt {
            key: KEY_APP_LIST.to_string(),
            message: e.to_string(),
        })?;
        self.kv.set(KEY_APP_LIST, json)
    }
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    #[test]
    fn typed_defaults_when_absent() {
        let store = StateStore::in_memory();
        assert_eq!(store.get_int("missing", 7).unwrap(), 7);
        assert_eq!(store.get_long("missing", -1).unwrap(), -1);
        assert!(store.get_bool("missing", true).unwrap());
        assert_eq!(store.get_string("missing", "x").unwrap(), "x");
        assert!(!store.study_mode().unwrap());
        assert_eq!(store.timer_state().unwrap(), TimerState::default());
    }

    #[test]
    fn typed_roundtrip() {
        let store = StateStore::in_memory();
        store.set_int("i", 42).unwrap();
        store.set_long("l", 1_700_000_000_000).unwrap();
        store.set_bool("b", true).unwrap();
        store.set_string("s", "hi").unwrap();
        assert_eq!(store.get_int("i", 0).unwrap(), 42);
        assert_eq!(store.get_long("l", 0).unwrap(), 1_700_000_000_000);
        assert!(store.get_bool("b", false).unwrap());
        assert_eq!(store.get_string("s", "").unwrap(), "hi");
    }

    #[test]
    fn corrupt_value_is_reported() {
        let store = StateStore::in_memory();
        store.set_string(KEY_TIMER_ACTIVE, "maybe").unwrap();
        assert!(matches!(
            store.timer_state(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn timer_state_roundtrip_on_sqlite() {
        let store = StateStore::new(Arc::new(SqliteStore::open_memory().unwrap()));
        let state = TimerState::started(45, 1_700_000_000_000);
        store.write_timer_state(&state).unwrap();
        assert_eq!(store.timer_state().unwrap(), state);
    }

    /// Commits a fresh session the moment a reader touches the start key
    /// on its own, the way a concurrent writer could.
    struct InterleavingStore {
        inner: MemoryStore,
        fired: std::sync::atomic::AtomicBool,
    }

    impl InterleavingStore {
        fn commit_restart(&self) {
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.inner
                    .set_many(&[
                        (KEY_TIMER_DURATION, "30".into()),
                        (KEY_TIMER_START, "2400000".into()),
                        (KEY_TIMER_ACTIVE, "true".into()),
                        (KEY_TIMER_BLOCKING, "true".into()),
                    ])
                    .unwrap();
            }
        }
    }

    impl KeyValueStore for InterleavingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let value = self.inner.get(key)?;
            if key == KEY_TIMER_START {
                self.commit_restart();
            }
            Ok(value)
        }
        fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
            let values = self.inner.get_many(keys)?;
            if keys.contains(&KEY_TIMER_START) {
                self.commit_restart();
            }
            Ok(values)
        }
        fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
            self.inner.set_many(entries)
        }
        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn timer_state_is_never_half_old_half_new() {
        let kv = Arc::new(InterleavingStore {
            inner: MemoryStore::new(),
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        let store = StateStore::new(kv);
        // An earlier session that has since expired and been cleared.
        store
            .write_timer_state(&TimerState::started(30, 0).cleared())
            .unwrap();

        let seen = store.timer_state().unwrap();
        assert!(!seen.active, "reader saw the new active flag with a stale start: {seen:?}");
        assert_eq!(
            store.timer_state().unwrap(),
            TimerState::started(30, 2_400_000)
        );
    }

    #[test]
    fn concurrent_writer_never_tears_sqlite_snapshot() {
        let store = Arc::new(StateStore::new(Arc::new(SqliteStore::open_memory().unwrap())));
        let a = TimerState::started(30, 0);
        let b = TimerState::started(45, 2_400_000);
        store.write_timer_state(&a).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let next = if i % 2 == 0 { b } else { a };
                    store.write_timer_state(&next).unwrap();
                }
            })
        };
        for _ in 0..500 {
            let seen = store.timer_state().unwrap();
            assert!(seen == a || seen == b, "torn snapshot {seen:?}");
        }
        writer.join().unwrap();
    }

    #[test]
    fn update_timer_state_skips_write_on_none() {
        let store = StateStore::in_memory();
        let (before, after) = store.update_timer_state(|_| None).unwrap();
        assert_eq!(before, TimerState::default());
        assert!(after.is_none());
        assert_eq!(store.get_string(KEY_TIMER_ACTIVE, "unset").unwrap(), "unset");
    }

    #[test]
    fn ensure_app_lock_map_classifies_once_then_merges() {
        let store = StateStore::in_memory();
        let allow = vec!["Phone".to_string()];
        let first = store
            .ensure_app_lock_map(
                &[
                    InstalledApp::new("com.phone", "Phone", false),
                    InstalledApp::new("com.game", "Game", false),
                ],
                &allow,
            )
            .unwrap();
        assert_eq!(first.get("com.phone"), Some(false));
        assert_eq!(first.get("com.game"), Some(true));

        store
            .update_app_lock_map(|m| m.set_locked("com.game", false))
            .unwrap();

        let second = store
            .ensure_app_lock_map(
                &[
                    InstalledApp::new("com.game", "Game", false),
                    InstalledApp::new("com.new", "New", true),
                ],
                &allow,
            )
            .unwrap();
        // User toggle survives; new system app still defaults to locked.
        assert_eq!(second.get("com.game"), Some(false));
        assert_eq!(second.get("com.new"), Some(true));
        assert_eq!(store.app_lock_map().unwrap(), Some(second));
    }
}
