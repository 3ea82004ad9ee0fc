use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::SessionMsg;

/// Single-shot deadline timer scoped to one session.
///
/// Arming bumps a generation counter and the fire message carries the
/// generation it was armed with; the session ignores firings whose
/// generation is stale, so a canceled timer can never take effect even if
/// its task raced past the abort.
pub struct Watchdog {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            generation: 0,
            task: None,
        }
    }

    /// Schedule a firing after `duration`. Equivalent to an atomic
    /// cancel-then-arm: any previously scheduled firing is invalidated.
    pub fn arm<F>(&mut self, duration: Duration, tx: mpsc::UnboundedSender<SessionMsg>, make_msg: F)
    where
        F: FnOnce(u64) -> SessionMsg + Send + 'static,
    {
        self.cancel();

        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(make_msg(generation));
        }));
    }

    /// Cancel any pending firing. Idempotent; safe on a never-armed or
    /// already-fired timer.
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a firing with this generation is still the armed one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.task.is_some()
    }

    /// Whether a firing is still scheduled.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
