use serde_json::json;

use crate::common::{open_engine, print_json, CliResult};

pub fn run(package: &str) -> CliResult {
    let engine = open_engine()?;
    let locks = engine.store().app_lock_map_or_default()?;
    print_json(&json!({
        "package_id": package,
        "locked": locks.is_locked(package),
        "known": locks.get(package).is_some(),
        "decision": engine.decision(),
        "blocked": engine.should_block(package),
    }))
}
