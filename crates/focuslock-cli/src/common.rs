//! Shared plumbing for one-shot commands.

use std::error::Error;
use std::sync::Arc;

use focuslock_core::{Collaborators, Config, FocusEngine, SqliteStore, StateStore};
use serde::Serialize;

use crate::platform::{IdleOracle, LogStatusSink, LoggingCanceller, LoggingRenderer};

pub type CliResult = Result<(), Box<dyn Error>>;

/// Open the on-disk state store.
pub fn open_store() -> Result<Arc<StateStore>, Box<dyn Error>> {
    let kv = SqliteStore::open()?;
    Ok(Arc::new(StateStore::new(Arc::new(kv))))
}

/// Engine over the on-disk state with inert platform capabilities.
///
/// One-shot commands only touch persisted state; the poller and ticker are
/// not armed outside a runtime.
pub fn open_engine() -> Result<FocusEngine, Box<dyn Error>> {
    let config = Config::load_or_default();
    let parts = Collaborators::new(
        Arc::new(IdleOracle),
        Arc::new(LoggingRenderer),
        Arc::new(LoggingCanceller),
        Arc::new(LogStatusSink),
    );
    Ok(FocusEngine::new(open_store()?, config, parts))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
