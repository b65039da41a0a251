mod config;
pub mod database;
pub mod state;

pub use config::{AppsConfig, Config, EventsConfig, MonitorConfig, SurfaceConfig, TimerConfig};
pub use database::{KeyValueStore, MemoryStore, SqliteStore};
pub use state::StateStore;

use std::path::PathBuf;

/// Returns `~/.config/focuslock[-dev]/` based on FOCUSLOCK_ENV.
///
/// Set FOCUSLOCK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSLOCK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focuslock-dev")
    } else {
        base_dir.join("focuslock")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
