// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `RingBar` Store
//!
//! State management and persistence:
//!
//! - **`UsageStore`**: the single cached usage snapshot, observable through
//!   a watch channel and persisted to the platform cache directory
//! - **`SettingsStore`**: user preferences with merge-update semantics,
//!   doubling as the persisted organization identity
//! - **Persistence**: atomic JSON file helpers with restrictive permissions
//!
//! Both stores implement the acquisition-side ports from `ringbar_fetch`,
//! so the chain reads and writes through them without knowing about files.

pub mod error;
pub mod persistence;
pub mod settings_store;
pub mod usage_store;

pub use error::StoreError;
pub use persistence::{
    default_cache_dir, default_cache_path, default_config_dir, default_settings_path, load_json,
    load_json_or_default, save_json,
};
pub use settings_store::SettingsStore;
pub use usage_store::UsageStore;
