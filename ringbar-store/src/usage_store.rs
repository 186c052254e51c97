//! Cached usage snapshot store.
//!
//! Holds the single current [`UsageSnapshot`], persists it to the cache file
//! so a restart starts from the last known state, and notifies observers
//! through a watch channel. The acquisition chain is the only writer; every
//! other consumer reads or subscribes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use ringbar_core::UsageSnapshot;
use ringbar_fetch::SnapshotStore;

use crate::persistence::{load_json, save_json};

/// Observable store for the current usage snapshot.
pub struct UsageStore {
    inner: Arc<RwLock<Option<UsageSnapshot>>>,
    cache_path: Option<PathBuf>,
    notify: watch::Sender<u64>,
    version: Arc<RwLock<u64>>,
}

impl Default for UsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStore {
    /// Creates an in-memory store with no persistence.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(None)),
            cache_path: None,
            notify,
            version: Arc::new(RwLock::new(0)),
        }
    }

    /// Opens a store backed by a cache file, seeding from the last
    /// persisted snapshot when one exists.
    pub async fn open(cache_path: PathBuf) -> Self {
        let cached: Option<UsageSnapshot> = match load_json(&cache_path).await {
            Ok(snapshot) => {
                debug!(path = %cache_path.display(), "Seeded usage from cache");
                Some(snapshot)
            }
            Err(e) => {
                debug!(path = %cache_path.display(), error = %e, "No usable usage cache");
                None
            }
        };

        let store = Self::new();
        Self {
            inner: Arc::new(RwLock::new(cached)),
            cache_path: Some(cache_path),
            ..store
        }
    }

    /// Returns the current snapshot, if any.
    pub async fn snapshot(&self) -> Option<UsageSnapshot> {
        self.inner.read().await.clone()
    }

    /// Replaces the snapshot wholesale.
    ///
    /// `fetched_at` never goes backwards: a write carrying an older
    /// timestamp than the stored record is bumped to the stored one, so
    /// observers can treat the timestamp as monotonic.
    pub async fn replace(&self, mut snapshot: UsageSnapshot) {
        {
            let mut inner = self.inner.write().await;
            if let Some(ref current) = *inner {
                if snapshot.fetched_at < current.fetched_at {
                    warn!("Snapshot timestamp regressed, clamping to stored value");
                    snapshot.fetched_at = current.fetched_at;
                }
            }
            *inner = Some(snapshot.clone());
        }

        if let Some(ref path) = self.cache_path {
            if let Err(e) = save_json(path, &snapshot).await {
                warn!(path = %path.display(), error = %e, "Failed to persist usage cache");
            }
        }

        self.notify_change().await;
        debug!(
            session = snapshot.session_percent,
            weekly = snapshot.weekly_percent,
            "Snapshot replaced"
        );
    }

    /// Subscribes to store changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    async fn notify_change(&self) {
        let mut version = self.version.write().await;
        *version += 1;
        let _ = self.notify.send(*version);
    }
}

#[async_trait]
impl SnapshotStore for UsageStore {
    async fn current(&self) -> Option<UsageSnapshot> {
        self.snapshot().await
    }

    async fn replace(&self, snapshot: UsageSnapshot) {
        UsageStore::replace(self, snapshot).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_empty_store() {
        let store = UsageStore::new();
        assert!(store.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_replace_and_read() {
        let store = UsageStore::new();
        let mut snapshot = UsageSnapshot::new();
        snapshot.session_percent = 42.0;

        store.replace(snapshot).await;
        assert_eq!(store.snapshot().await.unwrap().session_percent, 42.0);
    }

    #[tokio::test]
    async fn test_fetched_at_never_regresses() {
        let store = UsageStore::new();

        let mut fresh = UsageSnapshot::new();
        fresh.fetched_at = Utc::now();
        store.replace(fresh.clone()).await;

        let mut backdated = UsageSnapshot::new();
        backdated.fetched_at = Utc::now() - Duration::hours(2);
        store.replace(backdated).await;

        let stored = store.snapshot().await.unwrap();
        assert!(stored.fetched_at >= fresh.fetched_at);
    }

    #[tokio::test]
    async fn test_subscribers_notified_on_replace() {
        let store = UsageStore::new();
        let mut rx = store.subscribe();

        store.replace(UsageSnapshot::new()).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn test_persists_and_reloads_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("usage_cache.json");

        {
            let store = UsageStore::open(path.clone()).await;
            let mut snapshot = UsageSnapshot::new();
            snapshot.weekly_percent = 77.0;
            store.replace(snapshot).await;
        }

        let reopened = UsageStore::open(path).await;
        assert_eq!(reopened.snapshot().await.unwrap().weekly_percent, 77.0);
    }
}
