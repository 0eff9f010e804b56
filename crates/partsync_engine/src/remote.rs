//! Remote store abstraction.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Identifies a live listener installed with [`RemoteStore::on_value_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked with the full value at a path whenever it changes.
///
/// Callbacks run on the remote's notification path and must not block;
/// forward the value and return.
pub type ValueCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// A cloud realtime database as seen by the sync layer.
///
/// This trait abstracts the vendor SDK, allowing for different
/// implementations (a real realtime database client, an in-memory double
/// for testing, etc.).
///
/// Ready means authenticated AND connected.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns true if the store is authenticated and connected.
    fn is_ready(&self) -> bool;

    /// Returns true if the store has a live connection.
    fn is_connected(&self) -> bool;

    /// Waits until the store is ready, giving up after `timeout`.
    ///
    /// Returns whether the store became ready.
    async fn wait_for_cloud_ready(&self, timeout: Duration) -> bool;

    /// Reads the value at `path`. `None` means nothing is stored there.
    async fn read(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Replaces the value at `path`.
    async fn write(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Installs a live listener on `path`.
    ///
    /// The callback fires once with the current value (`None` if nothing
    /// is stored) as the listener attaches, then on every change.
    fn on_value_change(&self, path: &str, callback: ValueCallback) -> SyncResult<ListenerId>;

    /// Removes a listener. Unknown ids are ignored.
    fn dispose(&self, id: ListenerId);

    /// Returns a channel tracking the connection state.
    fn connection_changes(&self) -> watch::Receiver<bool>;
}

/// Owning handle for a live listener.
///
/// Dropping the handle, or calling [`Subscription::dispose`], removes the
/// listener from the remote store exactly once.
pub struct Subscription<R: RemoteStore + ?Sized> {
    remote: Arc<R>,
    path: String,
    id: Option<ListenerId>,
}

impl<R: RemoteStore + ?Sized> Subscription<R> {
    /// Installs a listener on `path` and wraps it.
    pub fn attach(
        remote: Arc<R>,
        path: impl Into<String>,
        callback: ValueCallback,
    ) -> SyncResult<Self> {
        let path = path.into();
        let id = remote.on_value_change(&path, callback)?;
        Ok(Self {
            remote,
            path,
            id: Some(id),
        })
    }

    /// Returns the listened path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the listener id while the listener is installed.
    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Removes the listener now.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.remote.dispose(id);
        }
    }
}

impl<R: RemoteStore + ?Sized> Drop for Subscription<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: RemoteStore + ?Sized> fmt::Debug for Subscription<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_remote::MemoryRemoteStore;

    fn noop() -> ValueCallback {
        Arc::new(|_: Option<Value>| {})
    }

    #[test]
    fn drop_disposes_listener() {
        let remote = Arc::new(MemoryRemoteStore::new());
        {
            let sub = Subscription::attach(Arc::clone(&remote), "data/users", noop()).unwrap();
            assert_eq!(sub.path(), "data/users");
            assert!(sub.id().is_some());
            assert_eq!(remote.listener_count("data/users"), 1);
        }
        assert_eq!(remote.listener_count("data/users"), 0);
    }

    #[test]
    fn explicit_dispose_releases_once() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sub = Subscription::attach(Arc::clone(&remote), "data/parts", noop()).unwrap();
        sub.dispose();
        assert_eq!(remote.listener_count("data/parts"), 0);
        assert_eq!(remote.dispose_count(), 1);
    }
}
