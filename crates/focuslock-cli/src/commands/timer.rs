use clap::Subcommand;
use serde_json::json;

use crate::common::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a focus session (re-arms a running one)
    Start {
        /// Session length in minutes (defaults to timer.default_duration_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Stop the running session
    Stop,
    /// Add time to the running session
    Extend {
        /// Minutes to add (defaults to timer.extend_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Print current timer state as JSON
    Status,
    /// List the configured session lengths
    Presets,
}

pub fn run(action: TimerAction) -> CliResult {
    let engine = open_engine()?;

    match action {
        TimerAction::Start { minutes } => {
            let event = engine.start_timer(minutes)?;
            print_json(&event)?;
        }
        TimerAction::Stop => match engine.stop_timer()? {
            Some(event) => print_json(&event)?,
            None => print_json(&json!({ "type": "TimerIdle" }))?,
        },
        TimerAction::Extend { minutes } => {
            let event = engine.extend_timer(minutes)?;
            print_json(&event)?;
        }
        TimerAction::Status => {
            // Tick so an elapsed session is completed before reporting.
            let event = engine.timer().tick()?;
            print_json(&engine.timer().status()?)?;
            if let Some(event) = event.filter(|e| e.ends_timer()) {
                print_json(&event)?;
            }
        }
        TimerAction::Presets => {
            let timer = &engine.config().timer;
            print_json(&json!({
                "presets": timer.duration_presets,
                "default": timer.default_duration_minutes,
                "extend": timer.extend_minutes,
            }))?;
        }
    }
    Ok(())
}
