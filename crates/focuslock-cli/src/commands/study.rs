use clap::Subcommand;
use serde_json::json;

use crate::common::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum StudyAction {
    /// Turn study mode on (blocks locked apps until turned off)
    On,
    /// Turn study mode off
    Off,
    /// Print study mode and the current blocking decision
    Status,
}

pub fn run(action: StudyAction) -> CliResult {
    let engine = open_engine()?;

    match action {
        StudyAction::On => print_json(&engine.set_study_mode(true)?)?,
        StudyAction::Off => print_json(&engine.set_study_mode(false)?)?,
        StudyAction::Status => {
            let enabled = engine.store().study_mode()?;
            print_json(&json!({
                "study_mode": enabled,
                "decision": engine.decision(),
                "status": engine.status_line(),
            }))?;
        }
    }
    Ok(())
}
