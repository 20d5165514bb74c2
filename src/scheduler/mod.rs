use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;

/// A unit of periodic background work.
///
/// Implementations run until the scheduler shuts down. A failed tick is
/// logged and the task keeps ticking; shutdown is observed between ticks,
/// never mid-tick.
#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Task name for log lines.
    fn name(&self) -> &'static str;

    /// Tick interval.
    fn interval(&self) -> Duration;

    /// One tick of work.
    async fn tick(&self) -> Result<()>;
}

/// Runs background tasks on fixed intervals and joins them on shutdown.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            handles: Vec::new(),
            shutdown,
        }
    }

    /// Spawns the timer loop for `task`. The first tick fires one full
    /// interval after registration.
    pub fn register<T: BackgroundTask + 'static>(&mut self, task: Arc<T>) {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(task.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // swallow the interval's immediate tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = task.tick().await {
                            tracing::error!(task = task.name(), error = %e, "background task tick failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(task = task.name(), "background task stopped");
                        break;
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Signals every task and waits for each to finish its current tick.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        for handle in self.handles.drain(..) {
            handle.await?;
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
