//! Repeating background tasks.
//!
//! The engine needs exactly two periodic jobs: the one-second timer tick and
//! the ~100 ms foreground poller. Both live in a [`TaskSlot`], which holds at
//! most one running task and makes arming and cancelling idempotent.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What a periodic callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Slot owning at most one repeating task.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            task: Mutex::new(None),
        }
    }

    /// True while a task is armed and has not finished.
    pub fn is_armed(&self) -> bool {
        match self.task.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|t| !t.is_finished()),
            Err(_) => false,
        }
    }

    /// Arm a task that runs `callback` every `period`, first run immediately.
    ///
    /// Returns `false` when a task is already armed or when called outside a
    /// tokio runtime (one-shot CLI commands); the persisted state is still
    /// authoritative in that case and the next `tick` will catch up.
    pub fn arm<F, Fut>(&self, period: Duration, mut callback: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        let Ok(mut guard) = self.task.lock() else {
            return false;
        };
        if guard.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(task = self.name, "no async runtime, repeating task not armed");
            return false;
        };

        let name = self.name;
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if callback().await == TickFlow::Stop {
                    tracing::debug!(task = name, "repeating task finished");
                    break;
                }
            }
        });
        *guard = Some(handle);
        tracing::debug!(task = self.name, period_ms = period.as_millis() as u64, "repeating task armed");
        true
    }

    /// Cancel the task if one is armed. Safe to call repeatedly.
    pub fn cancel(&self) -> bool {
        let Ok(mut guard) = self.task.lock() else {
            return false;
        };
        match guard.take() {
            Some(task) => {
                let was_running = !task.is_finished();
                task.abort();
                if was_running {
                    tracing::debug!(task = self.name, "repeating task cancelled");
                }
                was_running
            }
            None => false,
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
