//! Quota API client and payload normalization.
//!
//! # API Endpoint
//!
//! ```text
//! GET {base}/api/organizations/{org_id}/usage
//! Cookie: <ambient session cookie>
//! ```
//!
//! # Response Format
//!
//! ```json
//! {
//!   "five_hour": {"utilization": 25.0, "resets_at": "2026-01-01T12:00:00Z"},
//!   "seven_day": {"utilization": 45.0, "resets_at": "2026-01-05T00:00:00Z"},
//!   "seven_day_opus": {"utilization": 30.0, "resets_at": "2026-01-05T00:00:00Z"}
//! }
//! ```
//!
//! Zero or more `seven_day_<model>` fields may be present. Normalization
//! picks one by tier priority (flagship first) and clamps every utilization
//! into [0, 100].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use ringbar_core::{clamp_percent, ModelWeekly, SnapshotError, SnapshotSource, UsageSnapshot};

use crate::error::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Path template for the per-organization usage endpoint.
pub const USAGE_ENDPOINT: &str = "/api/organizations/{org}/usage";

/// Prefix shared by all per-model weekly quota fields.
const MODEL_FIELD_PREFIX: &str = "seven_day_";

/// Model-field suffixes in selection priority order: flagship, mid, low.
const MODEL_PRIORITY: &[&str] = &["opus", "sonnet", "haiku"];

// ============================================================================
// API Payload
// ============================================================================

/// One quota window as reported by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaWindow {
    /// Raw utilization, used as a percentage after clamping.
    pub utilization: f64,
    /// When this window resets (ISO 8601).
    pub resets_at: Option<String>,
}

impl QuotaWindow {
    /// Parses the reset timestamp; `None` on parse failure.
    pub fn parsed_resets_at(&self) -> Option<DateTime<Utc>> {
        self.resets_at.as_ref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}

/// Response body of the usage endpoint.
///
/// Per-model weekly windows arrive as `seven_day_<model>` sibling fields,
/// captured through the flattened map and matched by prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUsagePayload {
    /// 5-hour session window.
    pub five_hour: Option<QuotaWindow>,
    /// 7-day window across all models.
    pub seven_day: Option<QuotaWindow>,
    /// Remaining fields, including any `seven_day_<model>` windows.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ApiUsagePayload {
    /// Returns the per-model weekly windows in field-name order.
    fn model_windows(&self) -> Vec<(String, QuotaWindow)> {
        self.extra
            .iter()
            .filter_map(|(key, value)| {
                let suffix = key.strip_prefix(MODEL_FIELD_PREFIX)?;
                let window: QuotaWindow = serde_json::from_value(value.clone()).ok()?;
                Some((suffix.to_string(), window))
            })
            .collect()
    }

    /// Selects the model-specific weekly window by tier priority.
    ///
    /// Flagship first, then mid-tier, then low-tier, then the first
    /// remaining `seven_day_*` field in name order.
    fn select_model_window(&self) -> Option<(String, QuotaWindow)> {
        let windows = self.model_windows();
        for tier in MODEL_PRIORITY {
            if let Some((suffix, window)) = windows.iter().find(|(s, _)| s == tier) {
                return Some((suffix.clone(), window.clone()));
            }
        }
        windows.into_iter().next()
    }

    /// Normalizes into the canonical snapshot.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Parse` when the payload carries neither quota
    /// window: a recognized success response with an unexpected shape fails
    /// closed instead of defaulting to zero.
    pub fn normalize(&self) -> Result<UsageSnapshot, FetchError> {
        if self.five_hour.is_none() && self.seven_day.is_none() {
            return Err(FetchError::Parse(
                "payload has neither five_hour nor seven_day".to_string(),
            ));
        }

        let mut snapshot = UsageSnapshot::new();
        snapshot.source = SnapshotSource::Api;
        snapshot.error = SnapshotError::None;

        if let Some(ref window) = self.five_hour {
            snapshot.session_percent = clamp_percent(window.utilization);
            snapshot.session_resets_at = window.parsed_resets_at();
        }
        if let Some(ref window) = self.seven_day {
            snapshot.weekly_percent = clamp_percent(window.utilization);
            snapshot.weekly_resets_at = window.parsed_resets_at();
        }
        if let Some((suffix, window)) = self.select_model_window() {
            snapshot.model_weekly = Some(ModelWeekly {
                model_name: capitalize(&suffix),
                percent: clamp_percent(window.utilization),
                resets_at: window.parsed_resets_at(),
            });
        }

        Ok(snapshot)
    }
}

/// Capitalizes the first character of a model-field suffix.
fn capitalize(suffix: &str) -> String {
    let mut chars = suffix.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// API Client
// ============================================================================

/// Client for the per-organization quota endpoint.
#[derive(Debug, Clone)]
pub struct QuotaApiClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl QuotaApiClient {
    /// Creates a new client.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session_cookie: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session_cookie,
        }
    }

    /// Fetches the raw usage payload for an organization.
    ///
    /// # Errors
    ///
    /// - `FetchError::AuthRequired` on 401/403
    /// - `FetchError::InvalidResponse` on other non-2xx statuses
    /// - `FetchError::Parse` on an unparseable body
    #[instrument(skip(self))]
    pub async fn fetch_usage(&self, org_id: &str) -> Result<ApiUsagePayload, FetchError> {
        let url = format!(
            "{}{}",
            self.base_url,
            USAGE_ENDPOINT.replace("{org}", org_id)
        );

        debug!(url = %url, "Fetching usage from quota API");

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json");
        if let Some(ref cookie) = self.session_cookie {
            request = request.header("Cookie", cookie.clone());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::AuthRequired(format!(
                "quota API returned {status}"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Quota API request failed");
            return Err(FetchError::InvalidResponse(format!(
                "quota API returned status {status}"
            )));
        }

        let body = response.text().await?;
        debug!(len = body.len(), "Received quota API response");

        serde_json::from_str(&body)
            .map_err(|e| FetchError::Parse(format!("quota API body: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
