//! Debounced and connectivity-triggered syncs.

use crate::remote::RemoteStore;
use crate::state::SyncEngine;
use partsync_protocol::SyncReason;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Stops the connectivity watcher when dropped.
#[derive(Debug)]
pub struct ConnectivityWatch {
    task: JoinHandle<()>,
}

impl ConnectivityWatch {
    /// Stops watching now.
    pub fn stop(self) {}
}

impl Drop for ConnectivityWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<R: RemoteStore + 'static> SyncEngine<R> {
    /// Schedules a sync after the configured debounce period.
    ///
    /// Calls made within the period collapse: only the last one runs. The
    /// returned handle resolves to `None` when the call was superseded and
    /// to the session outcome otherwise.
    pub fn schedule_sync(&self, reason: SyncReason) -> JoinHandle<Option<bool>> {
        let generation = self.inner.schedule_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.config.debounce;
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if engine.inner.schedule_generation.load(Ordering::SeqCst) != generation {
                debug!(reason = %reason, "scheduled sync superseded");
                return None;
            }
            Some(engine.sync_all(reason).await)
        })
    }

    /// Schedules an automatic sync every time the remote reconnects.
    pub fn watch_connectivity(&self) -> ConnectivityWatch {
        let mut changes = self.inner.remote.connection_changes();
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let mut was_connected = *changes.borrow_and_update();
            while changes.changed().await.is_ok() {
                let connected = *changes.borrow_and_update();
                if connected && !was_connected {
                    info!("remote reconnected, scheduling sync");
                    engine.schedule_sync(SyncReason::Auto);
                }
                was_connected = connected;
            }
        });
        ConnectivityWatch { task }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::memory_remote::MemoryRemoteStore;
    use crate::state::SyncEngine;
    use partsync_protocol::{CollectionKey, SyncReason};
    use partsync_storage::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(remote: Arc<MemoryRemoteStore>) -> SyncEngine<MemoryRemoteStore> {
        let config = SyncConfig::new("device_sched")
            .with_collections(vec![CollectionKey::new("users").unwrap()])
            .with_debounce(Duration::from_secs(2));
        SyncEngine::new(config, remote, Arc::new(InMemoryStore::new())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_sync() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = engine(Arc::clone(&remote));

        let first = engine.schedule_sync(SyncReason::Auto);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = engine.schedule_sync(SyncReason::Auto);
        let third = engine.schedule_sync(SyncReason::Manual);

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second.await.unwrap(), None);
        assert_eq!(third.await.unwrap(), Some(true));
        assert_eq!(engine.stats().cycles_completed, 1);
        assert_eq!(engine.stats().last_reason, Some(SyncReason::Manual));
        assert_eq!(remote.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_triggers_sync() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = engine(Arc::clone(&remote));
        let watch = engine.watch_connectivity();

        remote.set_connected(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        remote.set_connected(true);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(engine.stats().cycles_completed, 1);
        assert_eq!(engine.stats().last_reason, Some(SyncReason::Auto));

        watch.stop();
        remote.set_connected(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        remote.set_connected(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(engine.stats().cycles_completed, 1);
    }
}
