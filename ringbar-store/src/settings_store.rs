//! User preferences store.
//!
//! Wraps the [`Settings`] record with persistence, merge-update semantics,
//! and change notification. Also serves as the persisted organization
//! identity: the acquisition chain reads and writes the org id through the
//! [`IdentityKeeper`] port backed by this store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use ringbar_core::{Settings, SettingsPatch};
use ringbar_fetch::IdentityKeeper;

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json_or_default, save_json};

/// Persistent user preferences with change notification.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
    version: Arc<RwLock<u64>>,
}

impl SettingsStore {
    /// Loads settings from a path, falling back to defaults when the file
    /// is missing, unreadable, or fails validation.
    pub async fn load(path: PathBuf) -> Self {
        let mut settings: Settings = load_json_or_default(&path).await;

        if let Err(e) = settings.validate() {
            warn!(path = %path.display(), error = %e, "Stored settings invalid, resetting to defaults");
            settings = Settings::default();
        }

        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
            version: Arc::new(RwLock::new(0)),
        }
    }

    /// Loads settings from the default platform path.
    pub async fn load_default() -> Self {
        Self::load(default_settings_path()).await
    }

    /// Returns a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Overlays a patch, validates, persists, and notifies.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Core` when the merged record fails validation
    /// (the stored settings are left untouched) or an IO error from
    /// persisting.
    pub async fn update(&self, patch: SettingsPatch) -> Result<Settings, StoreError> {
        let merged = {
            let mut settings = self.settings.write().await;
            let mut candidate = settings.clone();
            candidate.merge(patch);
            candidate.validate()?;
            *settings = candidate.clone();
            candidate
        };

        save_json(&self.path, &merged).await?;
        self.notify_change().await;
        info!("Settings updated");
        Ok(merged)
    }

    /// The stored organization id, if any.
    pub async fn org_id(&self) -> Option<String> {
        self.settings.read().await.org_id.clone()
    }

    /// Clears the stored organization id.
    pub async fn clear_org_id(&self) -> Result<Settings, StoreError> {
        self.update(SettingsPatch::org_id("")).await
    }

    /// Subscribes to settings changes.
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
impl IdentityKeeper for SettingsStore {
    async fn org_id(&self) -> Option<String> {
        SettingsStore::org_id(self).await
    }

    async fn set_org_id(&self, id: &str) {
        if let Err(e) = self.update(SettingsPatch::org_id(id)).await {
            warn!(error = %e, "Failed to persist discovered organization id");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ringbar_core::ColorBand;

    fn temp_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("settings.json")
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(temp_path(&dir)).await;

        let settings = store.get().await;
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_update_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);

        {
            let store = SettingsStore::load(path.clone()).await;
            store
                .update(SettingsPatch {
                    refresh_interval_minutes: Some(10),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let reloaded = SettingsStore::load(path).await;
        assert_eq!(reloaded.get().await.refresh_interval_minutes, 10);
    }

    #[tokio::test]
    async fn test_invalid_patch_rejected_and_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(temp_path(&dir)).await;

        let bad_bands = vec![ColorBand::new(40, ringbar_core::BandColor::Green)];
        let result = store
            .update(SettingsPatch {
                color_bands: Some(bad_bands),
                ..Default::default()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn test_corrupt_bands_on_disk_reset_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);

        // Bands that deserialize fine but fail validation.
        let json = r#"{
            "org_id": null,
            "refresh_interval_minutes": 5,
            "min_fetch_interval_ms": 30000,
            "warn_threshold": 90,
            "color_bands": [{"upper_bound": 40, "color": "green"}]
        }"#;
        tokio::fs::write(&path, json).await.unwrap();

        let store = SettingsStore::load(path).await;
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn test_identity_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(temp_path(&dir)).await;

        assert!(IdentityKeeper::org_id(&store).await.is_none());

        IdentityKeeper::set_org_id(&store, "org-77").await;
        assert_eq!(
            IdentityKeeper::org_id(&store).await.as_deref(),
            Some("org-77")
        );

        store.clear_org_id().await.unwrap();
        assert!(IdentityKeeper::org_id(&store).await.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_notified_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(temp_path(&dir)).await;
        let mut rx = store.subscribe();

        store
            .update(SettingsPatch {
                warn_threshold: Some(85),
                ..Default::default()
            })
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
