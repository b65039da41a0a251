use std::path::PathBuf;

use clap::Subcommand;
use focuslock_core::{AppLockMap, InstalledApp};
use serde_json::json;

use crate::common::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum AppsAction {
    /// List apps and their lock flags
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lock an app (blocked while focus is on)
    Lock {
        /// Package identifier
        package: String,
    },
    /// Unlock an app (always allowed)
    Unlock {
        /// Package identifier
        package: String,
    },
    /// Flip an app's lock flag
    Toggle {
        /// Package identifier
        package: String,
    },
    /// Import the installed-app list from a JSON file
    ///
    /// The first import classifies every app; later imports only add new
    /// apps, locked.
    Import {
        /// JSON array of {"package_id", "label", "is_system"}
        file: PathBuf,
    },
    /// Replace every lock flag with a map saved by `apps list --json`
    Restore {
        /// JSON object of package -> locked
        file: PathBuf,
    },
}

pub fn run(action: AppsAction) -> CliResult {
    let engine = open_engine()?;

    match action {
        AppsAction::List { json } => {
            let map = engine.store().app_lock_map_or_default()?;
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            if json {
                print_json(&map)?;
            } else if entries.is_empty() {
                println!("No apps recorded. Import the installed-app list first.");
            } else {
                for (package, locked) in entries {
                    let flag = if locked { "locked" } else { "open" };
                    println!("{flag:<7} {package}");
                }
                println!(
                    "{} locked, {} open",
                    map.locked_count(),
                    map.unlocked_count()
                );
            }
        }
        AppsAction::Lock { package } => {
            engine.set_app_locked(&package, true)?;
            print_json(&json!({ "package_id": package, "locked": true }))?;
        }
        AppsAction::Unlock { package } => {
            engine.set_app_locked(&package, false)?;
            print_json(&json!({ "package_id": package, "locked": false }))?;
        }
        AppsAction::Toggle { package } => {
            let locked = engine.toggle_app(&package)?;
            print_json(&json!({ "package_id": package, "locked": locked }))?;
        }
        AppsAction::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let installed: Vec<InstalledApp> = serde_json::from_str(&content)?;
            let map = engine.ensure_apps(&installed)?;
            print_json(&json!({
                "imported": installed.len(),
                "total": map.len(),
                "locked": map.locked_count(),
                "open": map.unlocked_count(),
            }))?;
        }
        AppsAction::Restore { file } => {
            let content = std::fs::read_to_string(&file)?;
            let map: AppLockMap = serde_json::from_str(&content)?;
            engine.replace_app_locks(&map)?;
            print_json(&json!({
                "total": map.len(),
                "locked": map.locked_count(),
                "open": map.unlocked_count(),
            }))?;
        }
    }
    Ok(())
}
