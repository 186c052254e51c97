//! Background refresh scheduling.
//!
//! Fires once shortly after startup, then on the configured cadence. Every
//! attempt is wrapped in Loading/settle notifications to the animation
//! controller; the chain's own throttle and in-flight lock make overlapping
//! triggers (timer tick plus manual refresh) collapse into one attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use ringbar_core::UsageSnapshot;
use ringbar_fetch::UsageChain;
use ringbar_store::SettingsStore;

use crate::animation::AnimationController;

/// Delay before the first fetch after startup.
const STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Periodic refresh driver.
pub struct RefreshScheduler {
    chain: Arc<UsageChain>,
    settings: Arc<SettingsStore>,
    animation: Arc<AnimationController>,
}

impl RefreshScheduler {
    /// Creates a scheduler.
    pub fn new(
        chain: Arc<UsageChain>,
        settings: Arc<SettingsStore>,
        animation: Arc<AnimationController>,
    ) -> Self {
        Self {
            chain,
            settings,
            animation,
        }
    }

    /// Spawns the periodic refresh task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!("Starting background refresh task");
        tokio::spawn(async move {
            tokio::time::sleep(STARTUP_DELAY).await;
            loop {
                self.refresh_once().await;

                let cadence = self.settings.get().await.refresh_interval();
                debug!(seconds = cadence.as_secs(), "Sleeping until next refresh");
                tokio::time::sleep(cadence).await;
            }
        })
    }

    /// The animation controller this scheduler notifies.
    pub fn animation(&self) -> &AnimationController {
        &self.animation
    }

    /// Runs one acquisition attempt wrapped in animation notifications.
    ///
    /// Returns the snapshot the attempt resolved to, fresh or cached.
    pub async fn refresh_once(&self) -> UsageSnapshot {
        self.animation.fetch_started();

        let outcome = self.chain.acquire().await;
        let snapshot = outcome.into_snapshot();

        let threshold = self.settings.get().await.warn_threshold;
        self.animation.settled(snapshot.clone(), threshold);
        snapshot
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{IconSink, IndicatorState};
    use crate::icon::{IconRenderer, RenderedIcon};
    use async_trait::async_trait;
    use ringbar_core::default_color_bands;
    use ringbar_fetch::{
        FetchContext, MemoryIdentity, MemorySnapshotStore, QuotaStrategy, RawUsage,
        ScrapedUsage, StrategyOutcome,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullSink;

    impl IconSink for NullSink {
        fn push(&self, _icon: RenderedIcon) {}
    }

    struct SlowScrapeStrategy {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QuotaStrategy for SlowScrapeStrategy {
        fn id(&self) -> &str {
            "mock.slow"
        }

        async fn attempt(&self, _ctx: &FetchContext) -> StrategyOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            StrategyOutcome::Success(RawUsage::Scraped(ScrapedUsage {
                values: vec![25.0, 12.0],
                tier: ringbar_fetch::ExtractionTier::Phrase,
            }))
        }
    }

    async fn fixture(
        dir: &tempfile::TempDir,
    ) -> (Arc<RefreshScheduler>, Arc<MemorySnapshotStore>, Arc<AtomicUsize>) {
        let store = Arc::new(MemorySnapshotStore::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let ctx = FetchContext::builder(Arc::new(MemoryIdentity::with_org_id("org-1"))).build();
        let chain = Arc::new(UsageChain::with_strategies(
            ctx,
            Arc::clone(&store) as Arc<dyn ringbar_fetch::SnapshotStore>,
            Duration::from_secs(30),
            vec![Box::new(SlowScrapeStrategy {
                attempts: Arc::clone(&attempts),
            })],
        ));
        let settings = Arc::new(SettingsStore::load(dir.path().join("settings.json")).await);
        let animation = Arc::new(AnimationController::new(
            IconRenderer::new(default_color_bands()),
            Arc::new(NullSink),
        ));
        (
            Arc::new(RefreshScheduler::new(chain, settings, animation)),
            store,
            attempts,
        )
    }

    #[tokio::test]
    async fn test_refresh_once_settles_idle_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store, attempts) = fixture(&dir).await;

        let snapshot = scheduler.refresh_once().await;
        assert_eq!(snapshot.session_percent, 25.0);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(scheduler.animation().state(), IndicatorState::Idle);
    }

    #[tokio::test]
    async fn test_manual_refresh_during_timer_fetch_shares_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store, attempts) = fixture(&dir).await;

        let (a, b) = tokio::join!(scheduler.refresh_once(), scheduler.refresh_once());

        assert_eq!(attempts.load(Ordering::SeqCst), 1, "one network attempt");
        assert_eq!(store.write_count(), 1, "one storage write");
        assert_eq!(a.session_percent, 25.0);
        assert_eq!(b.session_percent, 25.0);
    }
}
