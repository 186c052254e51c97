//! The acquisition chain: ordered strategies, throttling, and write-back.
//!
//! One chain instance owns the whole acquisition path. `acquire` is the
//! only entry point; it consults the store for throttling, serializes
//! concurrent triggers behind an in-flight lock, runs the strategies in
//! order, normalizes the first raw payload, and writes the result back as
//! a single wholesale replacement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use ringbar_core::{SnapshotError, UsageSnapshot};

use crate::api::QuotaApiClient;
use crate::context::{FetchContext, SnapshotStore};
use crate::discovery::DiscoveryClient;
use crate::error::FetchError;
use crate::strategy::{QuotaStrategy, RawUsage, StrategyOutcome};

// ============================================================================
// Chain Outcome
// ============================================================================

/// The resolution of one `acquire` call.
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// A strategy succeeded and the store was updated.
    Fetched(UsageSnapshot),
    /// The cached snapshot is fresh enough; no network attempt ran.
    Throttled(UsageSnapshot),
    /// Every strategy resolved without data. The snapshot carries an error
    /// tag or the stale prior record.
    Exhausted(UsageSnapshot),
}

impl ChainOutcome {
    /// The snapshot this outcome resolves to, whatever its provenance.
    pub fn snapshot(&self) -> &UsageSnapshot {
        match self {
            Self::Fetched(s) | Self::Throttled(s) | Self::Exhausted(s) => s,
        }
    }

    /// Consumes the outcome, yielding its snapshot.
    pub fn into_snapshot(self) -> UsageSnapshot {
        match self {
            Self::Fetched(s) | Self::Throttled(s) | Self::Exhausted(s) => s,
        }
    }
}

// ============================================================================
// Usage Chain
// ============================================================================

/// Ordered fallback chain producing canonical snapshots.
pub struct UsageChain {
    ctx: FetchContext,
    strategies: Vec<Box<dyn QuotaStrategy>>,
    store: Arc<dyn SnapshotStore>,
    // The lock serializes attempts and holds the last attempt's outcome so
    // a joiner can reuse it even when the attempt wrote nothing.
    in_flight: Mutex<Option<ChainOutcome>>,
    attempt_seq: AtomicU64,
    min_fetch_interval: Duration,
}

impl UsageChain {
    /// Creates the standard chain: direct API, identity discovery, passive
    /// scrape delegation.
    pub fn standard(
        ctx: FetchContext,
        store: Arc<dyn SnapshotStore>,
        min_fetch_interval: Duration,
    ) -> Self {
        Self::with_strategies(
            ctx,
            store,
            min_fetch_interval,
            vec![
                Box::new(DirectApiStrategy),
                Box::new(DiscoveryStrategy),
                Box::new(ScrapeDelegationStrategy),
            ],
        )
    }

    /// Creates a chain with a custom strategy list.
    pub fn with_strategies(
        ctx: FetchContext,
        store: Arc<dyn SnapshotStore>,
        min_fetch_interval: Duration,
        strategies: Vec<Box<dyn QuotaStrategy>>,
    ) -> Self {
        Self {
            ctx,
            strategies,
            store,
            in_flight: Mutex::new(None),
            attempt_seq: AtomicU64::new(0),
            min_fetch_interval,
        }
    }

    /// The snapshot store this chain writes through.
    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Acquires a usage snapshot.
    ///
    /// Throttled when the cached snapshot is younger than the minimum fetch
    /// interval. Concurrent callers are serialized: a caller that blocks on
    /// the in-flight lock receives the ongoing attempt's outcome instead of
    /// launching a duplicate. This holds for failed attempts too; an attempt
    /// that wrote nothing still hands its outcome to every joiner.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> ChainOutcome {
        if let Some(current) = self.fresh_snapshot().await {
            debug!(age_ms = current.age().num_milliseconds(), "Throttled, cache is fresh");
            return ChainOutcome::Throttled(current);
        }

        let seq_before = self.attempt_seq.load(Ordering::SeqCst);
        let mut last_outcome = self.in_flight.lock().await;

        // A concurrent caller may have finished while we waited on the lock.
        if let Some(current) = self.fresh_snapshot().await {
            debug!("Joined an in-flight attempt, reusing its result");
            return ChainOutcome::Throttled(current);
        }
        if self.attempt_seq.load(Ordering::SeqCst) != seq_before {
            if let Some(outcome) = last_outcome.clone() {
                debug!("Joined an in-flight attempt that resolved without fresh data");
                return outcome;
            }
        }

        let outcome = self.run_strategies().await;
        *last_outcome = Some(outcome.clone());
        self.attempt_seq.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Returns the cached snapshot if it is younger than the throttle window.
    async fn fresh_snapshot(&self) -> Option<UsageSnapshot> {
        let interval = chrono::Duration::from_std(self.min_fetch_interval)
            .unwrap_or(chrono::Duration::MAX);
        self.store
            .current()
            .await
            .filter(|snapshot| !snapshot.is_stale(interval))
    }

    /// Runs the strategies in order and writes the result back.
    async fn run_strategies(&self) -> ChainOutcome {
        for strategy in &self.strategies {
            debug!(strategy = strategy.id(), "Attempting strategy");

            match strategy.attempt(&self.ctx).await {
                StrategyOutcome::Success(raw) => match normalize(raw) {
                    Ok(mut snapshot) => {
                        snapshot.sanitize();
                        info!(
                            strategy = strategy.id(),
                            session = snapshot.session_percent,
                            weekly = snapshot.weekly_percent,
                            "Usage acquired"
                        );
                        self.store.replace(snapshot.clone()).await;
                        return ChainOutcome::Fetched(snapshot);
                    }
                    // A payload we fetched but cannot read is no better than
                    // a failed fetch; the next strategy may still succeed.
                    Err(e) => {
                        warn!(strategy = strategy.id(), error = %e, "Normalization failed");
                    }
                },
                StrategyOutcome::AuthRequired => {
                    warn!(strategy = strategy.id(), "Credentials rejected, stopping chain");
                    let previous = self.store.current().await.unwrap_or_default();
                    let errored =
                        UsageSnapshot::with_error(&previous, SnapshotError::NotAuthenticated);
                    self.store.replace(errored.clone()).await;
                    return ChainOutcome::Exhausted(errored);
                }
                StrategyOutcome::Unavailable(reason) => {
                    debug!(strategy = strategy.id(), reason = %reason, "Strategy unavailable");
                }
                StrategyOutcome::TransientError(reason) => {
                    warn!(strategy = strategy.id(), reason = %reason, "Strategy failed");
                }
            }
        }

        self.exhausted().await
    }

    /// Every strategy resolved without data.
    ///
    /// Without an organization id the situation is terminal until the user
    /// intervenes, so a `needs_setup` tag is written. With an id the failure
    /// is presumed transient: the stale prior record stays untouched and the
    /// next scheduled attempt retries.
    async fn exhausted(&self) -> ChainOutcome {
        let previous = self.store.current().await;

        if self.ctx.identity.org_id().await.is_none() {
            warn!("Chain exhausted with no organization identity");
            let errored = UsageSnapshot::with_error(
                &previous.unwrap_or_default(),
                SnapshotError::NeedsSetup,
            );
            self.store.replace(errored.clone()).await;
            return ChainOutcome::Exhausted(errored);
        }

        warn!("Chain exhausted, keeping stale snapshot");
        ChainOutcome::Exhausted(previous.unwrap_or_default())
    }
}

/// Normalizes a raw payload into the canonical snapshot.
fn normalize(raw: RawUsage) -> Result<UsageSnapshot, FetchError> {
    match raw {
        RawUsage::Api(payload) => payload.normalize(),
        RawUsage::Scraped(scraped) => scraped.normalize(),
    }
}

// ============================================================================
// Standard Strategies
// ============================================================================

/// Strategy 1: direct call to the per-organization quota API.
pub struct DirectApiStrategy;

#[async_trait]
impl QuotaStrategy for DirectApiStrategy {
    fn id(&self) -> &str {
        "api.direct"
    }

    async fn attempt(&self, ctx: &FetchContext) -> StrategyOutcome {
        let Some(org_id) = ctx.identity.org_id().await else {
            return StrategyOutcome::Unavailable("no organization id".to_string());
        };

        let client = QuotaApiClient::new(
            ctx.http.clone(),
            ctx.base_url.clone(),
            ctx.session_cookie.clone(),
        );
        match client.fetch_usage(&org_id).await {
            Ok(payload) => StrategyOutcome::Success(RawUsage::Api(payload)),
            Err(FetchError::AuthRequired(_)) => StrategyOutcome::AuthRequired,
            Err(e) => StrategyOutcome::TransientError(e.to_string()),
        }
    }
}

/// Strategy 2: discover the organization id, persist it, then retry the
/// direct API once within the same attempt.
pub struct DiscoveryStrategy;

#[async_trait]
impl QuotaStrategy for DiscoveryStrategy {
    fn id(&self) -> &str {
        "api.discover"
    }

    async fn attempt(&self, ctx: &FetchContext) -> StrategyOutcome {
        if ctx.identity.org_id().await.is_some() {
            // The direct strategy already ran with this id and failed;
            // rediscovering it would not change the outcome.
            return StrategyOutcome::Unavailable("organization id already known".to_string());
        }

        let discovery = DiscoveryClient::new(
            ctx.http.clone(),
            ctx.base_url.clone(),
            ctx.session_cookie.clone(),
        );
        let org_id = match discovery.discover_org_id().await {
            Ok(id) => id,
            Err(FetchError::AuthRequired(_)) => return StrategyOutcome::AuthRequired,
            Err(e) => return StrategyOutcome::TransientError(e.to_string()),
        };

        info!(org_id = %org_id, "Organization identity discovered, persisting");
        ctx.identity.set_org_id(&org_id).await;

        let client = QuotaApiClient::new(
            ctx.http.clone(),
            ctx.base_url.clone(),
            ctx.session_cookie.clone(),
        );
        match client.fetch_usage(&org_id).await {
            Ok(payload) => StrategyOutcome::Success(RawUsage::Api(payload)),
            Err(FetchError::AuthRequired(_)) => StrategyOutcome::AuthRequired,
            Err(e) => StrategyOutcome::TransientError(e.to_string()),
        }
    }
}

/// Strategy 3: delegate to the passive-scrape collaborator, bounded by the
/// configured deadline.
pub struct ScrapeDelegationStrategy;

#[async_trait]
impl QuotaStrategy for ScrapeDelegationStrategy {
    fn id(&self) -> &str {
        "scrape.delegate"
    }

    async fn attempt(&self, ctx: &FetchContext) -> StrategyOutcome {
        let Some(ref delegate) = ctx.scrape else {
            return StrategyOutcome::Unavailable("no scrape delegate wired up".to_string());
        };

        match tokio::time::timeout(ctx.scrape_deadline, delegate.request_refresh()).await {
            Ok(Ok(scraped)) => StrategyOutcome::Success(RawUsage::Scraped(scraped)),
            Ok(Err(FetchError::AuthRequired(_))) => StrategyOutcome::AuthRequired,
            Ok(Err(e)) => StrategyOutcome::TransientError(e.to_string()),
            Err(_) => StrategyOutcome::TransientError(format!(
                "scrape deadline of {}s elapsed",
                ctx.scrape_deadline.as_secs()
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MemoryIdentity, MemorySnapshotStore};
    use crate::scrape::{ExtractionTier, ScrapedUsage};
    use ringbar_core::SnapshotSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Plan {
        Scraped(Vec<f64>),
        Auth,
        Unavailable,
        Transient,
    }

    struct MockStrategy {
        plan: Plan,
        delay: Option<Duration>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockStrategy {
        fn new(plan: Plan) -> (Box<Self>, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    plan,
                    delay: None,
                    attempts: Arc::clone(&attempts),
                }),
                attempts,
            )
        }

        fn slow(plan: Plan, delay: Duration) -> (Box<Self>, Arc<AtomicUsize>) {
            let (mut strategy, attempts) = Self::new(plan);
            strategy.delay = Some(delay);
            (strategy, attempts)
        }
    }

    #[async_trait]
    impl QuotaStrategy for MockStrategy {
        fn id(&self) -> &str {
            "mock"
        }

        async fn attempt(&self, _ctx: &FetchContext) -> StrategyOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.plan {
                Plan::Scraped(values) => {
                    StrategyOutcome::Success(RawUsage::Scraped(ScrapedUsage {
                        values: values.clone(),
                        tier: ExtractionTier::Phrase,
                    }))
                }
                Plan::Auth => StrategyOutcome::AuthRequired,
                Plan::Unavailable => StrategyOutcome::Unavailable("mock".to_string()),
                Plan::Transient => StrategyOutcome::TransientError("mock".to_string()),
            }
        }
    }

    fn test_ctx() -> FetchContext {
        FetchContext::builder(Arc::new(MemoryIdentity::new())).build()
    }

    fn seeded_ctx() -> FetchContext {
        FetchContext::builder(Arc::new(MemoryIdentity::with_org_id("org-1"))).build()
    }

    fn chain_with(
        ctx: FetchContext,
        store: Arc<MemorySnapshotStore>,
        interval: Duration,
        strategies: Vec<Box<dyn QuotaStrategy>>,
    ) -> UsageChain {
        UsageChain::with_strategies(ctx, store, interval, strategies)
    }

    #[tokio::test]
    async fn test_success_writes_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (strategy, attempts) = MockStrategy::new(Plan::Scraped(vec![39.0, 22.0]));
        let chain = chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Fetched(_)));
        assert_eq!(outcome.snapshot().session_percent, 39.0);
        assert_eq!(outcome.snapshot().source, SnapshotSource::Scrape);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_second_call_within_interval_is_throttled() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (strategy, attempts) = MockStrategy::new(Plan::Scraped(vec![10.0]));
        let chain = chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        );

        assert!(matches!(chain.acquire().await, ChainOutcome::Fetched(_)));
        assert!(matches!(chain.acquire().await, ChainOutcome::Throttled(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_attempt() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (strategy, attempts) =
            MockStrategy::slow(Plan::Scraped(vec![55.0]), Duration::from_millis(50));
        let chain = Arc::new(chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        ));

        let (a, b) = tokio::join!(chain.acquire(), chain.acquire());

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(a.snapshot().session_percent, 55.0);
        assert_eq!(b.snapshot().session_percent, 55.0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_failed_attempt() {
        // A transient exhaustion writes nothing, so the joiner cannot rely
        // on the cache; it must still reuse the in-flight outcome.
        let store = Arc::new(MemorySnapshotStore::new());
        let (strategy, attempts) =
            MockStrategy::slow(Plan::Transient, Duration::from_millis(50));
        let chain = Arc::new(chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        ));

        let (a, b) = tokio::join!(chain.acquire(), chain.acquire());

        assert_eq!(attempts.load(Ordering::SeqCst), 1, "one network attempt");
        assert_eq!(store.write_count(), 0, "no storage write");
        assert!(matches!(a, ChainOutcome::Exhausted(_)));
        assert!(matches!(b, ChainOutcome::Exhausted(_)));
    }

    #[tokio::test]
    async fn test_chain_advances_past_unavailable_and_transient() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (first, first_attempts) = MockStrategy::new(Plan::Unavailable);
        let (second, second_attempts) = MockStrategy::new(Plan::Transient);
        let (third, third_attempts) = MockStrategy::new(Plan::Scraped(vec![70.0]));
        let chain = chain_with(
            seeded_ctx(),
            store,
            Duration::from_secs(30),
            vec![first, second, third],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Fetched(_)));
        assert_eq!(first_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(second_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(third_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_required_stops_chain_and_tags_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (first, _) = MockStrategy::new(Plan::Auth);
        let (second, second_attempts) = MockStrategy::new(Plan::Scraped(vec![70.0]));
        let chain = chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![first, second],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Exhausted(_)));
        assert_eq!(outcome.snapshot().error, SnapshotError::NotAuthenticated);
        assert_eq!(second_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_carries_stale_percentages() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut prior = UsageSnapshot::new();
        prior.session_percent = 42.0;
        prior.fetched_at = chrono::Utc::now() - chrono::Duration::hours(1);
        store.replace(prior).await;

        let (strategy, _) = MockStrategy::new(Plan::Auth);
        let chain = chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        );

        let outcome = chain.acquire().await;
        assert_eq!(outcome.snapshot().session_percent, 42.0);
        assert_eq!(outcome.snapshot().error, SnapshotError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_exhaustion_without_identity_needs_setup() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (strategy, _) = MockStrategy::new(Plan::Transient);
        let chain = chain_with(
            test_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Exhausted(_)));
        assert_eq!(outcome.snapshot().error, SnapshotError::NeedsSetup);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_with_identity_keeps_stale_record() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut prior = UsageSnapshot::new();
        prior.session_percent = 33.0;
        prior.fetched_at = chrono::Utc::now() - chrono::Duration::hours(1);
        store.replace(prior).await;

        let (strategy, _) = MockStrategy::new(Plan::Transient);
        let chain = chain_with(
            seeded_ctx(),
            Arc::clone(&store),
            Duration::from_secs(30),
            vec![strategy],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Exhausted(_)));
        assert_eq!(outcome.snapshot().session_percent, 33.0);
        assert_eq!(outcome.snapshot().error, SnapshotError::None);
        // The stale record was not rewritten.
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_payload_advances_to_next_strategy() {
        let store = Arc::new(MemorySnapshotStore::new());
        // Empty scrape values fail normalization.
        let (first, _) = MockStrategy::new(Plan::Scraped(vec![]));
        let (second, second_attempts) = MockStrategy::new(Plan::Scraped(vec![61.0]));
        let chain = chain_with(
            seeded_ctx(),
            store,
            Duration::from_secs(30),
            vec![first, second],
        );

        let outcome = chain.acquire().await;
        assert!(matches!(outcome, ChainOutcome::Fetched(_)));
        assert_eq!(outcome.snapshot().session_percent, 61.0);
        assert_eq!(second_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scrape_delegation_respects_deadline() {
        struct SlowDelegate;

        #[async_trait]
        impl crate::scrape::ScrapeDelegate for SlowDelegate {
            async fn request_refresh(&self) -> Result<ScrapedUsage, FetchError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ScrapedUsage::default())
            }
        }

        let ctx = FetchContext::builder(Arc::new(MemoryIdentity::new()))
            .scrape_delegate(Arc::new(SlowDelegate))
            .scrape_deadline(Duration::from_millis(20))
            .build();

        let outcome = ScrapeDelegationStrategy.attempt(&ctx).await;
        assert!(matches!(outcome, StrategyOutcome::TransientError(_)));
    }

    #[tokio::test]
    async fn test_scrape_delegation_unavailable_without_delegate() {
        let outcome = ScrapeDelegationStrategy.attempt(&test_ctx()).await;
        assert!(matches!(outcome, StrategyOutcome::Unavailable(_)));
    }
}
