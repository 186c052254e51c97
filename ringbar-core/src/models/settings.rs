//! User preferences and color bands.
//!
//! Settings are created with defaults on first run and merge-updated
//! thereafter: a [`SettingsPatch`] overlays the fields it carries and leaves
//! the rest untouched. Nothing ever replaces the settings record wholesale.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

// ============================================================================
// Color Bands
// ============================================================================

/// Color identifier for a usage band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandColor {
    /// Comfortable headroom.
    Green,
    /// Getting close.
    Yellow,
    /// Nearly exhausted.
    Orange,
    /// At or over the warning threshold.
    Red,
}

/// One band of the percentage-to-color mapping.
///
/// A percentage `p` falls in the first band with `p < upper_bound`; the
/// final band (whose bound must be exactly 100) also includes 100 itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    /// Exclusive upper bound of this band (inclusive for the last band).
    pub upper_bound: u8,
    /// Color to render for percentages in this band.
    pub color: BandColor,
}

impl ColorBand {
    /// Creates a new band.
    pub fn new(upper_bound: u8, color: BandColor) -> Self {
        Self { upper_bound, color }
    }
}

/// Validates a band list: bounds strictly increasing, last bound exactly 100.
pub fn validate_bands(bands: &[ColorBand]) -> Result<(), CoreError> {
    if bands.is_empty() {
        return Err(CoreError::InvalidConfig("color_bands is empty".to_string()));
    }
    let mut previous = 0u8;
    for band in bands {
        if band.upper_bound <= previous {
            return Err(CoreError::InvalidConfig(format!(
                "color band bound {} does not increase past {previous}",
                band.upper_bound
            )));
        }
        previous = band.upper_bound;
    }
    if previous != 100 {
        return Err(CoreError::InvalidConfig(format!(
            "last color band bound must be 100, got {previous}"
        )));
    }
    Ok(())
}

/// Looks up the color for a percentage against an ordered band list.
///
/// Assumes `bands` passed [`validate_bands`]. The final band absorbs 100
/// (and any clamped-over value).
pub fn band_color_for(bands: &[ColorBand], percent: f64) -> BandColor {
    for band in bands {
        if percent < f64::from(band.upper_bound) {
            return band.color;
        }
    }
    bands.last().map_or(BandColor::Red, |b| b.color)
}

// ============================================================================
// Settings
// ============================================================================

/// User preferences, persisted as a single JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Opaque organization identifier, discovered automatically or
    /// user-supplied. Once set, reused until explicitly cleared.
    pub org_id: Option<String>,

    /// Periodic refresh cadence in minutes.
    pub refresh_interval_minutes: u64,

    /// Minimum interval between network attempts, in milliseconds.
    /// Triggers inside this window return the cached snapshot.
    pub min_fetch_interval_ms: u64,

    /// Single authoritative warning threshold; the indicator enters the
    /// warning animation when any quota reaches this percentage.
    pub warn_threshold: u8,

    /// Ordered percentage-to-color bands for ring rendering.
    pub color_bands: Vec<ColorBand>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            org_id: None,
            refresh_interval_minutes: 5,
            min_fetch_interval_ms: 30_000,
            warn_threshold: 90,
            color_bands: default_color_bands(),
        }
    }
}

/// The authoritative default band set (50/75/90 revision).
pub fn default_color_bands() -> Vec<ColorBand> {
    vec![
        ColorBand::new(50, BandColor::Green),
        ColorBand::new(75, BandColor::Yellow),
        ColorBand::new(90, BandColor::Orange),
        ColorBand::new(100, BandColor::Red),
    ]
}

impl Settings {
    /// Validates the settings record.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidConfig` if the color bands are malformed
    /// or intervals are zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_bands(&self.color_bands)?;
        if self.refresh_interval_minutes == 0 {
            return Err(CoreError::InvalidConfig(
                "refresh_interval_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlays the fields a patch carries; omitted fields are retained.
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(org_id) = patch.org_id {
            // An explicit empty string clears the identity.
            self.org_id = if org_id.is_empty() { None } else { Some(org_id) };
        }
        if let Some(minutes) = patch.refresh_interval_minutes {
            self.refresh_interval_minutes = minutes;
        }
        if let Some(ms) = patch.min_fetch_interval_ms {
            self.min_fetch_interval_ms = ms;
        }
        if let Some(threshold) = patch.warn_threshold {
            self.warn_threshold = threshold;
        }
        if let Some(bands) = patch.color_bands {
            self.color_bands = bands;
        }
    }

    /// Refresh cadence as a `Duration`.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes * 60)
    }

    /// Throttle window as a `Duration`.
    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_fetch_interval_ms)
    }

    /// Color lookup against this record's bands.
    pub fn color_for(&self, percent: f64) -> BandColor {
        band_color_for(&self.color_bands, percent)
    }
}

// ============================================================================
// Settings Patch
// ============================================================================

/// Partial settings update. Present fields overlay, absent fields retain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    /// New organization id; an empty string clears it.
    pub org_id: Option<String>,
    /// New refresh cadence in minutes.
    pub refresh_interval_minutes: Option<u64>,
    /// New throttle window in milliseconds.
    pub min_fetch_interval_ms: Option<u64>,
    /// New warning threshold.
    pub warn_threshold: Option<u8>,
    /// New color band list.
    pub color_bands: Option<Vec<ColorBand>>,
}

impl SettingsPatch {
    /// Patch that only sets the organization id.
    pub fn org_id(id: impl Into<String>) -> Self {
        Self {
            org_id: Some(id.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.refresh_interval_minutes, 5);
        assert_eq!(settings.min_fetch_interval_ms, 30_000);
        assert_eq!(settings.warn_threshold, 90);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_band_validation_rejects_non_increasing() {
        let bands = vec![
            ColorBand::new(50, BandColor::Green),
            ColorBand::new(50, BandColor::Yellow),
            ColorBand::new(100, BandColor::Red),
        ];
        assert!(validate_bands(&bands).is_err());
    }

    #[test]
    fn test_band_validation_rejects_short_final_bound() {
        let bands = vec![
            ColorBand::new(50, BandColor::Green),
            ColorBand::new(90, BandColor::Red),
        ];
        assert!(validate_bands(&bands).is_err());
    }

    #[test]
    fn test_band_lookup_bounds() {
        let bands = default_color_bands();
        assert_eq!(band_color_for(&bands, 0.0), BandColor::Green);
        assert_eq!(band_color_for(&bands, 49.9), BandColor::Green);
        assert_eq!(band_color_for(&bands, 50.0), BandColor::Yellow);
        assert_eq!(band_color_for(&bands, 75.0), BandColor::Orange);
        assert_eq!(band_color_for(&bands, 90.0), BandColor::Red);
        assert_eq!(band_color_for(&bands, 100.0), BandColor::Red);
    }

    #[test]
    fn test_band_lookup_partitions_without_gaps() {
        // Monotonic over a fine sweep of [0,100]: the band index never
        // decreases and every value maps to exactly one band.
        let bands = default_color_bands();
        let index_of = |c: BandColor| bands.iter().position(|b| b.color == c).unwrap();

        let mut last_index = 0usize;
        let mut p = 0.0f64;
        while p <= 100.0 {
            let idx = index_of(band_color_for(&bands, p));
            assert!(idx >= last_index, "band regressed at {p}");
            last_index = idx;
            p += 0.25;
        }
    }

    #[test]
    fn test_merge_overlays_and_retains() {
        let mut settings = Settings::default();
        settings.merge(SettingsPatch {
            warn_threshold: Some(80),
            ..Default::default()
        });

        assert_eq!(settings.warn_threshold, 80);
        // Untouched fields keep their values.
        assert_eq!(settings.refresh_interval_minutes, 5);
        assert_eq!(settings.color_bands, default_color_bands());
    }

    #[test]
    fn test_merge_org_id_empty_clears() {
        let mut settings = Settings::default();
        settings.merge(SettingsPatch::org_id("org-123"));
        assert_eq!(settings.org_id.as_deref(), Some("org-123"));

        settings.merge(SettingsPatch::org_id(""));
        assert!(settings.org_id.is_none());
    }
}
