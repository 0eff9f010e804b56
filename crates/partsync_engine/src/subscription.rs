//! Live listeners, at most one per collection.

use crate::error::SyncResult;
use crate::remote::{RemoteStore, Subscription, ValueCallback};
use async_trait::async_trait;
use parking_lot::Mutex;
use partsync_protocol::CollectionKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Reacts to a pushed remote value for one collection.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Handles the new value at the collection's remote path.
    async fn on_change(&self, key: &CollectionKey, value: Option<Value>) -> SyncResult<()>;
}

#[async_trait]
impl<F> ChangeHandler for F
where
    F: Fn(&CollectionKey, Option<Value>) -> SyncResult<()> + Send + Sync,
{
    async fn on_change(&self, key: &CollectionKey, value: Option<Value>) -> SyncResult<()> {
        self(key, value)
    }
}

struct ActiveSubscription<R: RemoteStore + 'static> {
    handle: Subscription<R>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl<R: RemoteStore + 'static> Drop for ActiveSubscription<R> {
    fn drop(&mut self) {
        // the worker drains what is already queued, then exits
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Keeps at most one live listener per collection key.
///
/// Pushes for a key are queued and handled one at a time, in arrival
/// order, on a dedicated worker task. A handler error or panic is logged
/// and the worker moves on to the next push; other keys are unaffected.
pub struct SubscriptionManager<R: RemoteStore + 'static> {
    remote: Arc<R>,
    remote_root: String,
    active: Mutex<HashMap<CollectionKey, ActiveSubscription<R>>>,
}

impl<R: RemoteStore + 'static> SubscriptionManager<R> {
    /// Creates a manager listening under `remote_root`.
    pub fn new(remote: Arc<R>, remote_root: impl Into<String>) -> Self {
        Self {
            remote,
            remote_root: remote_root.into(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Installs `handler` as the only listener for `key`.
    ///
    /// Any existing listener for `key` is disposed first.
    pub fn subscribe(
        &self,
        key: &CollectionKey,
        handler: Arc<dyn ChangeHandler>,
    ) -> SyncResult<()> {
        let mut active = self.active.lock();
        if active.remove(key).is_some() {
            debug!(key = %key, "replacing listener");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let callback: ValueCallback = Arc::new(move |value: Option<Value>| {
            // closed once the worker is gone
            let _ = tx.send(value);
        });
        let handle = Subscription::attach(
            Arc::clone(&self.remote),
            key.remote_path(&self.remote_root),
            callback,
        )?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_worker(key.clone(), handler, rx, shutdown_rx));

        active.insert(
            key.clone(),
            ActiveSubscription {
                handle,
                shutdown: Some(shutdown_tx),
            },
        );
        debug!(key = %key, "subscribed");
        Ok(())
    }

    /// Installs `handler` for every key in `keys`.
    ///
    /// Every key is attempted; the first failure is returned.
    pub fn subscribe_all(
        &self,
        keys: &[CollectionKey],
        handler: Arc<dyn ChangeHandler>,
    ) -> SyncResult<()> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.subscribe(key, Arc::clone(&handler)) {
                warn!(key = %key, error = %e, "subscribe failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Removes the listener for `key`. Does nothing if there is none.
    pub fn unsubscribe(&self, key: &CollectionKey) {
        if self.active.lock().remove(key).is_some() {
            debug!(key = %key, "unsubscribed");
        }
    }

    /// Removes every listener.
    pub fn unsubscribe_all(&self) {
        let drained: Vec<_> = self.active.lock().drain().collect();
        debug!(count = drained.len(), "unsubscribed all");
    }

    /// Returns true if `key` has a live listener.
    pub fn is_subscribed(&self, key: &CollectionKey) -> bool {
        self.active.lock().contains_key(key)
    }

    /// Returns the number of live listeners.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Returns true if no listener is live.
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Returns the subscribed keys.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys: Vec<_> = self.active.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the remote path of the live listener for `key`.
    pub fn path(&self, key: &CollectionKey) -> Option<String> {
        self.active
            .lock()
            .get(key)
            .map(|sub| sub.handle.path().to_string())
    }
}

async fn run_worker(
    key: CollectionKey,
    handler: Arc<dyn ChangeHandler>,
    mut rx: mpsc::UnboundedReceiver<Option<Value>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            value = rx.recv() => match value {
                Some(value) => dispatch(&key, &handler, value).await,
                None => break,
            },
            _ = &mut shutdown => {
                while let Ok(value) = rx.try_recv() {
                    dispatch(&key, &handler, value).await;
                }
                break;
            }
        }
    }
    debug!(key = %key, "listener worker stopped");
}

async fn dispatch(key: &CollectionKey, handler: &Arc<dyn ChangeHandler>, value: Option<Value>) {
    let handler = Arc::clone(handler);
    let task_key = key.clone();
    let outcome = tokio::spawn(async move { handler.on_change(&task_key, value).await }).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(key = %key, error = %e, "change handler failed"),
        Err(e) => error!(key = %key, error = %e, "change handler panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::memory_remote::MemoryRemoteStore;
    use serde_json::json;
    use std::time::Duration;

    fn key(name: &str) -> CollectionKey {
        CollectionKey::new(name).unwrap()
    }

    /// Forwards every non-empty push to a channel tagged with `tag`.
    fn forwarder(
        tag: &'static str,
        tx: mpsc::UnboundedSender<(&'static str, Option<Value>)>,
    ) -> Arc<dyn ChangeHandler> {
        Arc::new(move |_key: &CollectionKey, value: Option<Value>| -> SyncResult<()> {
            if value.is_some() {
                let _ = tx.send((tag, value));
            }
            Ok(())
        })
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn resubscribe_keeps_single_listener() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.subscribe(&key("users"), forwarder("cb1", tx.clone())).unwrap();
        manager.subscribe(&key("users"), forwarder("cb2", tx)).unwrap();

        assert_eq!(remote.listener_count("data/users"), 1);
        assert_eq!(manager.len(), 1);

        remote.put("data/users", json!([{"id": "1"}]));
        let (tag, value) = next(&mut rx).await;
        assert_eq!(tag, "cb2");
        assert_eq!(value, Some(json!([{"id": "1"}])));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pushes_arrive_in_order() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.subscribe(&key("parts"), forwarder("p", tx)).unwrap();

        for i in 0..20 {
            remote.put("data/parts", json!(i));
        }
        for i in 0..20 {
            assert_eq!(next(&mut rx).await.1, Some(json!(i)));
        }
    }

    #[tokio::test]
    async fn current_value_is_delivered_on_subscribe() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.put("data/users", json!([{"id": "u1"}]));
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.subscribe(&key("users"), forwarder("u", tx)).unwrap();
        assert_eq!(next(&mut rx).await, ("u", Some(json!([{"id": "u1"}]))));

        remote.put("data/users", json!([]));
        assert_eq!(next(&mut rx).await, ("u", Some(json!([]))));
    }

    #[tokio::test]
    async fn failing_handler_keeps_listening() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler: Arc<dyn ChangeHandler> =
            Arc::new(move |_key: &CollectionKey, value: Option<Value>| {
                match value {
                    Some(Value::String(s)) if s == "boom" => panic!("handler blew up"),
                    Some(Value::String(s)) if s == "err" => {
                        Err(SyncError::subscription("users", "rejected"))
                    }
                    None => Ok(()),
                    other => {
                        let _ = tx.send(other);
                        Ok(())
                    }
                }
            });
        manager.subscribe(&key("users"), handler).unwrap();

        remote.put("data/users", json!("boom"));
        remote.put("data/users", json!("err"));
        remote.put("data/users", json!("ok"));

        assert_eq!(next(&mut rx).await, Some(json!("ok")));

        remote.put("data/users", json!("again"));
        assert_eq!(next(&mut rx).await, Some(json!("again")));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.unsubscribe(&key("users"));
        manager.subscribe(&key("users"), forwarder("a", tx)).unwrap();
        manager.unsubscribe(&key("users"));
        manager.unsubscribe(&key("users"));

        assert!(manager.is_empty());
        assert_eq!(remote.total_listeners(), 0);
        assert_eq!(remote.dispose_count(), 1);
    }

    #[tokio::test]
    async fn subscribe_all_and_teardown() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let manager = SubscriptionManager::new(Arc::clone(&remote), "data/");
        let (tx, _rx) = mpsc::unbounded_channel();
        let keys = vec![key("users"), key("export.files")];

        manager.subscribe_all(&keys, forwarder("x", tx.clone())).unwrap();
        manager.subscribe_all(&keys, forwarder("y", tx)).unwrap();
        assert_eq!(remote.total_listeners(), 2);
        assert_eq!(manager.path(&key("export.files")).as_deref(), Some("data/export_files"));
        assert!(manager.is_subscribed(&key("users")));
        assert_eq!(manager.keys(), vec![key("export.files"), key("users")]);

        manager.unsubscribe_all();
        assert_eq!(remote.total_listeners(), 0);
    }

    #[tokio::test]
    async fn dropping_manager_disposes_listeners() {
        let remote = Arc::new(MemoryRemoteStore::new());
        {
            let manager = SubscriptionManager::new(Arc::clone(&remote), "data");
            let (tx, _rx) = mpsc::unbounded_channel();
            manager.subscribe(&key("users"), forwarder("a", tx)).unwrap();
        }
        assert_eq!(remote.total_listeners(), 0);
    }
}
