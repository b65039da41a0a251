mod engine;
mod state;

pub use engine::{FocusTimer, TimerStatus};
pub use state::{TimerPhase, TimerState, MS_PER_MINUTE};
