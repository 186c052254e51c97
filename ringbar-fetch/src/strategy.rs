//! Acquisition strategy trait and outcome types.
//!
//! A strategy represents one method of obtaining raw usage data. Strategies
//! are tried in a fixed order by the chain; each attempt resolves to exactly
//! one [`StrategyOutcome`].

use async_trait::async_trait;

use crate::api::ApiUsagePayload;
use crate::context::FetchContext;
use crate::scrape::ScrapedUsage;

// ============================================================================
// Raw Usage
// ============================================================================

/// A raw payload produced by a successful strategy, prior to normalization.
#[derive(Debug, Clone)]
pub enum RawUsage {
    /// JSON body from the per-organization quota API.
    Api(ApiUsagePayload),
    /// Percentages extracted from scraped markup. Low confidence.
    Scraped(ScrapedUsage),
}

// ============================================================================
// Strategy Outcome
// ============================================================================

/// The resolution of a single strategy attempt.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// The strategy obtained a raw payload; the chain stops and normalizes.
    Success(RawUsage),
    /// The remote rejected credentials; the chain stops and tags the
    /// snapshot `not_authenticated`.
    AuthRequired,
    /// The strategy cannot run in the current state (e.g., no organization
    /// id, no delegate wired up); the chain advances.
    Unavailable(String),
    /// The strategy ran and failed (network, non-auth HTTP status,
    /// malformed body, deadline); the chain advances.
    TransientError(String),
}

impl StrategyOutcome {
    /// Returns true if this outcome lets the chain advance to the next
    /// strategy.
    pub fn advances(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::TransientError(_))
    }
}

// ============================================================================
// Strategy Trait
// ============================================================================

/// One method of acquiring usage data, tried in chain order.
#[async_trait]
pub trait QuotaStrategy: Send + Sync {
    /// Unique identifier for this strategy (e.g., "api.direct").
    fn id(&self) -> &str;

    /// Attempts acquisition. Never panics; all failures map to an outcome.
    async fn attempt(&self, ctx: &FetchContext) -> StrategyOutcome;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_advances() {
        assert!(StrategyOutcome::Unavailable("no org".into()).advances());
        assert!(StrategyOutcome::TransientError("timeout".into()).advances());
        assert!(!StrategyOutcome::AuthRequired.advances());
        assert!(
            !StrategyOutcome::Success(RawUsage::Scraped(ScrapedUsage::default())).advances()
        );
    }
}
