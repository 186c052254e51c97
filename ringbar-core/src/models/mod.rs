//! Domain models for `RingBar`.
//!
//! - [`usage`] - The canonical usage snapshot and its provenance tags
//! - [`settings`] - User preferences, color bands, and merge-update patches

pub mod settings;
pub mod usage;

pub use settings::{
    BandColor, ColorBand, Settings, SettingsPatch, band_color_for, default_color_bands,
    validate_bands,
};
pub use usage::{ModelWeekly, SnapshotError, SnapshotSource, UsageSnapshot, clamp_percent};
