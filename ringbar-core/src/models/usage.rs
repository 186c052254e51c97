//! The canonical usage record.
//!
//! Every acquisition strategy, whatever its wire format, normalizes into a
//! [`UsageSnapshot`]:
//! - session quota (5-hour rolling window)
//! - weekly quota across all models (7-day rolling window)
//! - optional per-model weekly quota
//!
//! Snapshots are replaced wholesale on every successful fetch; they are
//! never patched field-by-field by a concurrent writer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Provenance & Error Tags
// ============================================================================

/// How a snapshot's data was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Per-organization quota API.
    Api,
    /// Best-effort HTML extraction. Low confidence, never correctness-bearing.
    Scrape,
    /// No successful acquisition backs this record.
    #[default]
    None,
}

/// Terminal error tag carried on a snapshot.
///
/// Mutually exclusive with a successful [`SnapshotSource`]: a snapshot with
/// an error tag always has `source == SnapshotSource::None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotError {
    /// No error; the snapshot reflects a successful acquisition.
    #[default]
    None,
    /// The remote rejected the ambient session credentials (401/403).
    NotAuthenticated,
    /// No organization identity could be resolved; manual entry required.
    NeedsSetup,
}

impl SnapshotError {
    /// Returns true if this is an actual error tag.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// ============================================================================
// Model-Specific Weekly Quota
// ============================================================================

/// Weekly quota for a single model tier, when the API reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeekly {
    /// Display name of the model (e.g., "Opus").
    pub model_name: String,
    /// Percentage of the model-specific weekly quota used (0-100).
    pub percent: f64,
    /// When this window resets.
    pub resets_at: Option<DateTime<Utc>>,
}

impl ModelWeekly {
    /// Creates a new model-specific weekly quota entry.
    pub fn new(model_name: impl Into<String>, percent: f64) -> Self {
        Self {
            model_name: model_name.into(),
            percent,
            resets_at: None,
        }
    }
}

// ============================================================================
// Usage Snapshot
// ============================================================================

/// The canonical usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Session (5-hour) quota used, 0-100.
    pub session_percent: f64,
    /// When the session window resets.
    pub session_resets_at: Option<DateTime<Utc>>,
    /// Weekly (7-day, all models) quota used, 0-100.
    pub weekly_percent: f64,
    /// When the weekly window resets.
    pub weekly_resets_at: Option<DateTime<Utc>>,
    /// Model-specific weekly quota, if the API reports one.
    pub model_weekly: Option<ModelWeekly>,
    /// When this snapshot was fetched. Monotonically non-decreasing across
    /// successful writes (the store enforces this).
    pub fetched_at: DateTime<Utc>,
    /// How the data was obtained.
    #[serde(default)]
    pub source: SnapshotSource,
    /// Terminal error tag, if any.
    #[serde(default)]
    pub error: SnapshotError,
}

impl UsageSnapshot {
    /// Creates an empty snapshot with no backing acquisition.
    pub fn new() -> Self {
        Self {
            session_percent: 0.0,
            session_resets_at: None,
            weekly_percent: 0.0,
            weekly_resets_at: None,
            model_weekly: None,
            fetched_at: Utc::now(),
            source: SnapshotSource::None,
            error: SnapshotError::None,
        }
    }

    /// Derives an errored snapshot from a previous record.
    ///
    /// Percentages and reset times are carried unchanged (stale-but-visible)
    /// rather than zeroed; only the tag, source, and timestamp change.
    pub fn with_error(previous: &UsageSnapshot, error: SnapshotError) -> Self {
        Self {
            fetched_at: Utc::now(),
            source: SnapshotSource::None,
            error,
            ..previous.clone()
        }
    }

    /// Returns the highest usage percentage across all quotas.
    pub fn max_percent(&self) -> f64 {
        let mut max = self.session_percent.max(self.weekly_percent);
        if let Some(ref model) = self.model_weekly {
            max = max.max(model.percent);
        }
        max
    }

    /// Returns the age of this snapshot.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.fetched_at)
    }

    /// Returns true if this snapshot is older than the threshold.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }

    /// Clamps all percentages into [0, 100] and zeroes non-finite values.
    ///
    /// Called on every snapshot before storage so malformed or malicious
    /// payloads never leak out-of-range values into the renderer.
    pub fn sanitize(&mut self) {
        self.session_percent = clamp_percent(self.session_percent);
        self.weekly_percent = clamp_percent(self.weekly_percent);
        if let Some(ref mut model) = self.model_weekly {
            model.percent = clamp_percent(model.percent);
        }
    }
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamps a raw utilization value into [0, 100], mapping NaN/Infinity to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(-10.0), 0.0);
        assert_eq!(clamp_percent(42.0), 42.0);
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_sanitize_clamps_all_quotas() {
        let mut snapshot = UsageSnapshot::new();
        snapshot.session_percent = 150.0;
        snapshot.weekly_percent = -20.0;
        snapshot.model_weekly = Some(ModelWeekly::new("Opus", f64::NAN));

        snapshot.sanitize();

        assert_eq!(snapshot.session_percent, 100.0);
        assert_eq!(snapshot.weekly_percent, 0.0);
        assert_eq!(snapshot.model_weekly.unwrap().percent, 0.0);
    }

    #[test]
    fn test_with_error_carries_percentages() {
        let mut previous = UsageSnapshot::new();
        previous.session_percent = 42.0;
        previous.weekly_percent = 17.0;
        previous.source = SnapshotSource::Api;

        let errored = UsageSnapshot::with_error(&previous, SnapshotError::NotAuthenticated);

        assert_eq!(errored.session_percent, 42.0);
        assert_eq!(errored.weekly_percent, 17.0);
        assert_eq!(errored.source, SnapshotSource::None);
        assert_eq!(errored.error, SnapshotError::NotAuthenticated);
        assert!(errored.fetched_at >= previous.fetched_at);
    }

    #[test]
    fn test_max_percent() {
        let mut snapshot = UsageSnapshot::new();
        snapshot.session_percent = 50.0;
        snapshot.weekly_percent = 85.0;
        snapshot.model_weekly = Some(ModelWeekly::new("Opus", 30.0));

        assert_eq!(snapshot.max_percent(), 85.0);
    }

    #[test]
    fn test_error_tag_exclusive_with_source() {
        let errored =
            UsageSnapshot::with_error(&UsageSnapshot::new(), SnapshotError::NeedsSetup);
        assert!(errored.error.is_error());
        assert_eq!(errored.source, SnapshotSource::None);
    }

    #[test]
    fn test_staleness() {
        let mut snapshot = UsageSnapshot::new();
        assert!(!snapshot.is_stale(Duration::minutes(10)));

        snapshot.fetched_at = Utc::now() - Duration::minutes(30);
        assert!(snapshot.is_stale(Duration::minutes(10)));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut snapshot = UsageSnapshot::new();
        snapshot.session_percent = 42.0;
        snapshot.source = SnapshotSource::Scrape;

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"scrape\""));

        let back: UsageSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
