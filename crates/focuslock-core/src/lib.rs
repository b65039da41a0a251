//! # Focuslock Core Library
//!
//! This library provides the focus enforcement engine behind Focuslock.
//! Everything is available through a standalone CLI binary; any desktop or
//! mobile shell is a thin layer over the same core library that supplies
//! the platform capabilities (foreground-app oracle, surface renderer,
//! notification cancel, status display).
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock-based state machine persisted on every
//!   transition; a one-second ticker drives `tick()` while running
//! - **Policy**: A pure function merging Study Mode and the timer into one
//!   blocking decision, applied per app through the lock map
//! - **Monitor**: A ~100 ms poller that debounces on foreground-app changes
//!   and reconciles the blocking surface
//! - **Storage**: SQLite-based key/value state and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`FocusEngine`]: Wires every component together and applies user commands
//! - [`FocusTimer`]: Timer state machine
//! - [`StateStore`]: Typed persisted state
//! - [`Config`]: Application configuration management
//! - [`ForegroundOracle`] / [`SurfaceRenderer`] / [`NotificationCanceller`]:
//!   Platform capabilities the engine consumes

pub mod apps;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod monitor;
pub mod notifications;
pub mod policy;
pub mod recovery;
pub mod status;
pub mod storage;
pub mod surface;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod ticker;
pub mod timer;

pub use apps::{AppLockMap, InstalledApp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Collaborators, FocusEngine};
pub use error::{ConfigError, CoreError, OracleError, StoreError, SurfaceError, TimerError};
pub use events::{Event, EventReceiver, EventSender};
pub use monitor::{ForegroundMonitor, ForegroundObservation, ForegroundOracle, PollOutcome};
pub use notifications::{NotificationCanceller, NotificationEvent, NotificationSuppressor, SuppressOutcome};
pub use policy::{evaluate, should_block_app, BlockReason, BlockingDecision};
pub use recovery::{RecoveryCoordinator, RecoveryReport, TimerRecovery};
pub use status::{format_mm_ss, NoopStatusSink, StatusLine, StatusSink};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore, StateStore};
pub use surface::{
    NavigationGesture, SurfaceChange, SurfaceContent, SurfaceController, SurfaceHandle, SurfaceRenderer,
};
pub use timer::{FocusTimer, TimerPhase, TimerState, TimerStatus};
