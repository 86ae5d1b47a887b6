//! Lifetime-extending tasks for a single handled event.
//!
//! Cache writes and background revalidations are detached from the response
//! they belong to. They are spawned here instead of onto the bare runtime so
//! the host can wait for them before treating the event as finished.
//! Dropping a `LifetimeTasks` without draining it aborts whatever is still
//! pending.

use std::future::Future;

use tokio::task::JoinSet;

#[derive(Debug, Default)]
pub struct LifetimeTasks {
    set: JoinSet<()>,
}

impl LifetimeTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detached side effect. Must be called within a tokio runtime.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.set.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for every registered task. Returns how many completed normally.
    pub async fn drain(mut self) -> usize {
        let mut completed = 0;
        while let Some(result) = self.set.join_next().await {
            match result {
                Ok(()) => completed += 1,
                Err(e) => tracing::warn!("lifetime task did not complete: {}", e),
            }
        }
        completed
    }
}
