use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;
mod platform;

#[derive(Parser)]
#[command(name = "focuslock-cli", version, about = "Focuslock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Study mode control
    Study {
        #[command(subcommand)]
        action: commands::study::StudyAction,
    },
    /// Per-app lock management
    Apps {
        #[command(subcommand)]
        action: commands::apps::AppsAction,
    },
    /// Print whether a package would be blocked right now
    Check {
        /// Package identifier (e.g. "com.example.game")
        package: String,
    },
    /// Reconcile persisted state after a restart
    Recover,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the enforcement engine in the foreground
    Daemon(commands::daemon::DaemonArgs),
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_env("FOCUSLOCK_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Daemon(_) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Study { action } => commands::study::run(action),
        Commands::Apps { action } => commands::apps::run(action),
        Commands::Check { package } => commands::check::run(&package),
        Commands::Recover => commands::recover::run(),
        Commands::Config { action } => commands::config::run(action),
        Commands::Daemon(args) => commands::daemon::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
