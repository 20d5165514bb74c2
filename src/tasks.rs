use std::sync::Arc;
use std::time::Duration;

use crate::compaction;
use crate::error::Result;
use crate::scheduler::BackgroundTask;
use crate::store::Shared;

/// Periodically fsyncs the translog when the store runs without strict
/// sync.
pub(crate) struct TranslogSyncTask {
    shared: Arc<Shared>,
}

impl TranslogSyncTask {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for TranslogSyncTask {
    fn name(&self) -> &'static str {
        "translog-sync"
    }

    fn interval(&self) -> Duration {
        self.shared.config.translog_sync_interval
    }

    async fn tick(&self) -> Result<()> {
        let result = {
            let mut translog = self.shared.translog.lock()?;
            match translog.as_mut() {
                Some(log) => log.sync(),
                None => return Ok(()),
            }
        };
        match result {
            Ok(()) => Ok(()),
            // the store closed under us and took the file with it
            Err(_) if self.shared.is_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Periodically merges two segments when the directory has accumulated
/// more than the configured threshold, then deletes the retired inputs
/// after the grace period.
pub(crate) struct CompactionTask {
    shared: Arc<Shared>,
}

impl CompactionTask {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for CompactionTask {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn interval(&self) -> Duration {
        self.shared.config.compaction_interval
    }

    async fn tick(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        let Some(merge) = compaction::run(&self.shared.dir, &self.shared.config)? else {
            return Ok(());
        };

        // let in-flight readers drain before the inputs disappear
        tokio::time::sleep(self.shared.config.grace_period).await;

        for id in merge.retired {
            if let Err(e) = compaction::remove_retired(&self.shared.dir, id) {
                tracing::warn!(segment = id, error = %e, "failed to delete retired segment");
            }
        }
        Ok(())
    }
}
