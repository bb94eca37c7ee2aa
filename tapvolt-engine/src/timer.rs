//! Cancellable timer handles
//!
//! Every engine timer is a spawned task wrapped in a handle. Cancelling
//! aborts the task and is idempotent; dropping a handle cancels it, so a
//! timer can never outlive its owner.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a running timer task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Fires `on_fire` once after `delay`.
    pub fn once<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self { task }
    }

    /// Fires `on_tick` every `period` until cancelled.
    pub fn every<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                on_tick();
            }
        });
        Self { task }
    }

    /// Stops the timer. Idempotent; cancelling an already-fired single-shot
    /// timer is a no-op.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
