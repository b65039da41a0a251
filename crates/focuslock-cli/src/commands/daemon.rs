//! Long-running enforcement.
//!
//! Runs the full engine: recovers persisted state, polls the foreground
//! oracle, and prints every engine event to stdout as one JSON line.
//! State written by one-shot commands from other processes is picked up
//! every `monitor.resync_interval_ms`.
//! Commands are read from stdin, one per line:
//!
//! ```text
//! start [minutes] | stop | extend [minutes] | study on|off
//! notify <key> <package> | dismiss | status
//! ```

use std::sync::Arc;

use clap::Args;
use focuslock_core::{Collaborators, Config, FocusEngine, ForegroundOracle, NotificationEvent};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use crate::common::{open_store, CliResult};
use crate::platform::{CommandOracle, IdleOracle, LogStatusSink, LoggingCanceller, LoggingRenderer};

#[derive(Args)]
pub struct DaemonArgs {
    /// Shell command printing the foreground package id
    #[arg(long)]
    pub oracle_cmd: Option<String>,
    /// Override monitor.poll_interval_ms
    #[arg(long)]
    pub poll_ms: Option<u64>,
    /// Override monitor.resync_interval_ms
    #[arg(long)]
    pub resync_ms: Option<u64>,
}

pub fn run(args: DaemonArgs) -> CliResult {
    let mut config = Config::load_or_default();
    if let Some(poll_ms) = args.poll_ms {
        config.monitor.poll_interval_ms = poll_ms;
    }
    if let Some(resync_ms) = args.resync_ms {
        config.monitor.resync_interval_ms = resync_ms;
    }
    let oracle: Arc<dyn ForegroundOracle> = match args.oracle_cmd {
        Some(cmd) => Arc::new(CommandOracle::new(cmd)),
        None => {
            tracing::warn!("no --oracle-cmd given, foreground app is never known");
            Arc::new(IdleOracle)
        }
    };
    let parts = Collaborators::new(
        oracle,
        Arc::new(LoggingRenderer),
        Arc::new(LoggingCanceller),
        Arc::new(LogStatusSink),
    );
    let engine = FocusEngine::new(open_store()?, config, parts);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(engine))
}

async fn serve(engine: FocusEngine) -> CliResult {
    let mut events = engine.subscribe();
    match engine.recover() {
        Ok(report) => emit(&report),
        Err(e) => tracing::error!(error = %e, "recovery failed, starting unblocked"),
    }

    let mut resync = tokio::time::interval(engine.config().monitor.resync_interval());
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires at once; recovery has just run.
    resync.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupt received");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => emit(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = resync.tick() => match engine.resync() {
                Ok(report) if report.monitor_started => emit(&report),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "state unreadable, retrying at next resync"),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&engine, line.trim()),
                Ok(None) => {
                    tracing::debug!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin unreadable");
                    stdin_open = false;
                }
            },
        }
    }

    engine.shutdown();
    Ok(())
}

fn handle_line(engine: &FocusEngine, line: &str) {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return;
    };
    let arg = words.next();
    let minutes = || arg.and_then(|m| m.parse::<u32>().ok());

    let result: CliResult = match (command, arg) {
        ("start", _) => engine.start_timer(minutes()).map(|_| ()).map_err(Into::into),
        ("stop", _) => engine.stop_timer().map(|_| ()).map_err(Into::into),
        ("extend", _) => engine.extend_timer(minutes()).map(|_| ()).map_err(Into::into),
        ("study", Some("on")) => engine.set_study_mode(true).map(|_| ()).map_err(Into::into),
        ("study", Some("off")) => engine.set_study_mode(false).map(|_| ()).map_err(Into::into),
        ("notify", Some(key)) => match words.next() {
            Some(package) => {
                let outcome = engine.on_notification_posted(&NotificationEvent::new(key, package));
                emit(&outcome);
                Ok(())
            }
            None => Err("usage: notify <key> <package>".into()),
        },
        ("dismiss", _) => {
            engine.dismiss_surface();
            Ok(())
        }
        ("status", _) => {
            emit(&engine.status_line());
            Ok(())
        }
        _ => Err(format!("unknown command: {line}").into()),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "unable to serialize output"),
    }
}
