//! Best-effort extraction from scraped markup.
//!
//! The passive-scrape path asks an external content-rendering collaborator
//! to re-render the usage page and report back. The markup it returns is
//! uncontrolled third-party layout, so extraction is a three-tier heuristic
//! with strict precedence and the result is always tagged
//! `source = scrape`, marking it as degraded-mode data.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ringbar_core::{clamp_percent, ModelWeekly, SnapshotSource, UsageSnapshot};

use crate::error::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// A percentage token repeated more than this often is decorative noise.
const NOISE_REPEAT_LIMIT: usize = 3;

/// Maximum values consumed from a tier: session, weekly-all, weekly-model.
const MAX_VALUES: usize = 3;

// ============================================================================
// Scraped Usage
// ============================================================================

/// Which extraction tier produced the values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// Explicit "N% used / of limit" phrasing (any language variant).
    #[default]
    Phrase,
    /// Inline progress-bar width declarations.
    BarWidth,
    /// Bare percentage-shaped tokens, noise-filtered.
    Token,
}

/// Percentages lifted from scraped markup, assigned positionally in
/// document order: session, weekly-all, weekly-model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedUsage {
    /// Extracted values in document order (at most three are used).
    pub values: Vec<f64>,
    /// The tier that produced them.
    pub tier: ExtractionTier,
}

impl ScrapedUsage {
    /// Normalizes into the canonical snapshot, tagged low-confidence.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Parse` when no values were extracted.
    pub fn normalize(&self) -> Result<UsageSnapshot, FetchError> {
        if self.values.is_empty() {
            return Err(FetchError::Parse("scrape produced no values".to_string()));
        }

        let mut snapshot = UsageSnapshot::new();
        snapshot.source = SnapshotSource::Scrape;
        snapshot.session_percent = clamp_percent(self.values[0]);
        if let Some(&weekly) = self.values.get(1) {
            snapshot.weekly_percent = clamp_percent(weekly);
        }
        if let Some(&model) = self.values.get(2) {
            // The markup does not name the model tier.
            snapshot.model_weekly = Some(ModelWeekly::new("Model", clamp_percent(model)));
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Scrape Delegate
// ============================================================================

/// Capability interface to the external content-rendering collaborator.
///
/// The collaborator re-renders the target page out of band; the returned
/// future resolves when its reply arrives. Callers bound the wait with a
/// deadline; a silent collaborator must not block the chain forever.
#[async_trait]
pub trait ScrapeDelegate: Send + Sync {
    /// Dispatches a refresh request and awaits the scraped reply.
    async fn request_refresh(&self) -> Result<ScrapedUsage, FetchError>;
}

// ============================================================================
// Extractor
// ============================================================================

/// Three-tier percentage extractor for uncontrolled markup.
pub struct BestEffortExtractor {
    phrase: Regex,
    bar_width: Regex,
    token: Regex,
}

impl BestEffortExtractor {
    /// Compiles the tier patterns.
    pub fn new() -> Self {
        // Tier 1 phrasing variants: English, French, German, Spanish,
        // Portuguese, Italian.
        let phrase = Regex::new(
            r"(?i)(\d+(?:[.,]\d+)?)\s*%\s*(?:used|of\s+limit|utilis[ée]s?|verwendet|usad[oa]s?|utilizzato)",
        )
        .expect("phrase pattern is valid");
        let bar_width = Regex::new(r"(?i)width\s*:\s*(\d+(?:\.\d+)?)\s*%")
            .expect("bar width pattern is valid");
        let token =
            Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("token pattern is valid");

        Self {
            phrase,
            bar_width,
            token,
        }
    }

    /// Extracts usage percentages, first non-empty tier wins.
    pub fn extract(&self, html: &str) -> Option<ScrapedUsage> {
        if let Some(values) = self.capture_tier(&self.phrase, html) {
            debug!(count = values.len(), "Tier 1 phrase extraction matched");
            return Some(ScrapedUsage {
                values,
                tier: ExtractionTier::Phrase,
            });
        }

        if let Some(values) = self.capture_tier(&self.bar_width, html) {
            debug!(count = values.len(), "Tier 2 bar-width extraction matched");
            return Some(ScrapedUsage {
                values,
                tier: ExtractionTier::BarWidth,
            });
        }

        let values = self.scan_tokens(html);
        if !values.is_empty() {
            debug!(count = values.len(), "Tier 3 token scan matched");
            return Some(ScrapedUsage {
                values,
                tier: ExtractionTier::Token,
            });
        }

        None
    }

    /// Captures up to three values for a tier pattern, in document order.
    fn capture_tier(&self, pattern: &Regex, html: &str) -> Option<Vec<f64>> {
        let values: Vec<f64> = pattern
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .filter_map(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
            .take(MAX_VALUES)
            .collect();

        if values.is_empty() { None } else { Some(values) }
    }

    /// Tier 3: scans every percentage-shaped token and discards decorative
    /// noise, meaning values that are common layout round numbers *and*
    /// repeat more than [`NOISE_REPEAT_LIMIT`] times.
    fn scan_tokens(&self, html: &str) -> Vec<f64> {
        let tokens: Vec<f64> = self
            .token
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect();

        let count_of = |value: f64| {
            tokens
                .iter()
                .filter(|&&t| (t - value).abs() < f64::EPSILON)
                .count()
        };

        let mut values = Vec::new();
        for token in &tokens {
            if is_layout_round(*token) && count_of(*token) > NOISE_REPEAT_LIMIT {
                continue;
            }
            values.push(*token);
            if values.len() == MAX_VALUES {
                break;
            }
        }
        values
    }
}

impl Default for BestEffortExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Common layout percentages: whole multiples of five (grid widths,
/// spinner sweeps, decorative rings).
fn is_layout_round(value: f64) -> bool {
    value.fract() == 0.0 && (value as u64) % 5 == 0
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier1_language_variants_in_document_order() {
        let html = format!(
            "<div>39% utilisés</div><div>22% of limit</div>{}",
            "<span>5%</span>".repeat(8)
        );

        let scraped = BestEffortExtractor::new().extract(&html).unwrap();
        assert_eq!(scraped.tier, ExtractionTier::Phrase);
        assert_eq!(scraped.values, vec![39.0, 22.0]);
    }

    #[test]
    fn test_tier1_english_used() {
        let html = "<p>You have 73% used this session</p>";
        let scraped = BestEffortExtractor::new().extract(html).unwrap();
        assert_eq!(scraped.tier, ExtractionTier::Phrase);
        assert_eq!(scraped.values, vec![73.0]);
    }

    #[test]
    fn test_tier2_bar_widths() {
        let html = r#"<div style="width: 61%"></div><div style="width:18.5%"></div>"#;
        let scraped = BestEffortExtractor::new().extract(html).unwrap();
        assert_eq!(scraped.tier, ExtractionTier::BarWidth);
        assert_eq!(scraped.values, vec![61.0, 18.5]);
    }

    #[test]
    fn test_tier1_precedes_tier2() {
        let html = r#"<div style="width: 90%"></div><p>12% used</p>"#;
        let scraped = BestEffortExtractor::new().extract(html).unwrap();
        assert_eq!(scraped.tier, ExtractionTier::Phrase);
        assert_eq!(scraped.values, vec![12.0]);
    }

    #[test]
    fn test_tier3_discards_repeated_round_noise() {
        let html = format!("<b>37%</b><b>14%</b>{}", "<i>50%</i>".repeat(6));
        let scraped = BestEffortExtractor::new().extract(&html).unwrap();
        assert_eq!(scraped.tier, ExtractionTier::Token);
        assert_eq!(scraped.values, vec![37.0, 14.0]);
    }

    #[test]
    fn test_tier3_keeps_infrequent_round_values() {
        // 50% appears only twice, under the noise limit.
        let html = "<b>50%</b><b>50%</b>";
        let scraped = BestEffortExtractor::new().extract(html).unwrap();
        assert_eq!(scraped.values, vec![50.0, 50.0]);
    }

    #[test]
    fn test_no_match_is_none() {
        assert!(BestEffortExtractor::new().extract("<p>hello</p>").is_none());
    }

    #[test]
    fn test_normalize_positional_assignment() {
        let scraped = ScrapedUsage {
            values: vec![39.0, 22.0, 8.0],
            tier: ExtractionTier::Phrase,
        };

        let snapshot = scraped.normalize().unwrap();
        assert_eq!(snapshot.session_percent, 39.0);
        assert_eq!(snapshot.weekly_percent, 22.0);
        assert_eq!(snapshot.model_weekly.unwrap().percent, 8.0);
        assert_eq!(snapshot.source, SnapshotSource::Scrape);
    }

    #[test]
    fn test_normalize_empty_is_parse_failure() {
        let scraped = ScrapedUsage::default();
        assert!(matches!(
            scraped.normalize(),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_normalize_clamps() {
        let scraped = ScrapedUsage {
            values: vec![250.0],
            tier: ExtractionTier::Token,
        };
        assert_eq!(scraped.normalize().unwrap().session_percent, 100.0);
    }
}
