//! Event service: the application's external command loop.
//!
//! Platform glue talks to the core through one mpsc channel of
//! [`AppEvent`]s. The loop replies over oneshot channels, routes inbound
//! scraped markup to the pending scrape waiter, and applies identity
//! commands to settings. Outbound data-updated notifications come from the
//! usage store's watch channel, not from here.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ringbar_core::{SettingsPatch, UsageSnapshot};
use ringbar_fetch::{BestEffortExtractor, FetchError, ScrapeDelegate, ScrapedUsage};
use ringbar_store::{SettingsStore, UsageStore};

use crate::scheduler::RefreshScheduler;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Events
// ============================================================================

/// Commands accepted from platform glue.
#[derive(Debug)]
pub enum AppEvent {
    /// Reply with the current snapshot, if any.
    GetUsageData {
        /// Reply channel.
        reply: oneshot::Sender<Option<UsageSnapshot>>,
    },
    /// Run an acquisition attempt and reply with its resolved snapshot.
    RequestRefresh {
        /// Reply channel.
        reply: oneshot::Sender<UsageSnapshot>,
    },
    /// Scraped markup arrived from the platform renderer.
    UsageScraped {
        /// The rendered page markup.
        html: String,
    },
    /// Set the organization id.
    SetOrgId {
        /// The new id.
        org_id: String,
    },
    /// Clear the organization id.
    ClearOrgId,
}

// ============================================================================
// Channel Scrape Delegate
// ============================================================================

/// Scrape delegate bridging the chain to an out-of-process renderer.
///
/// `request_refresh` signals the platform side and parks a waiter;
/// [`ChannelScrapeDelegate::fulfill`] resolves it when markup comes back.
/// The chain bounds the wait with its scrape deadline, so an absent
/// renderer degrades into a transient failure.
pub struct ChannelScrapeDelegate {
    request_tx: mpsc::Sender<()>,
    pending: tokio::sync::Mutex<Option<oneshot::Sender<Result<ScrapedUsage, FetchError>>>>,
    extractor: BestEffortExtractor,
}

impl ChannelScrapeDelegate {
    /// Creates a delegate and the receiver the platform side listens on.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (request_tx, request_rx) = mpsc::channel(4);
        (
            Arc::new(Self {
                request_tx,
                pending: tokio::sync::Mutex::new(None),
                extractor: BestEffortExtractor::new(),
            }),
            request_rx,
        )
    }

    /// Resolves the pending waiter with extracted percentages.
    ///
    /// Markup arriving with no waiter (late reply after the deadline) is
    /// dropped with a log line.
    pub async fn fulfill(&self, html: &str) {
        let Some(waiter) = self.pending.lock().await.take() else {
            debug!("Scraped markup arrived with no pending waiter, dropping");
            return;
        };

        let result = self
            .extractor
            .extract(html)
            .ok_or_else(|| FetchError::Parse("no usage values in scraped markup".to_string()))
            .map(|scraped| {
                debug!(tier = ?scraped.tier, count = scraped.values.len(), "Scrape extracted");
                scraped
            });

        let _ = waiter.send(result);
    }
}

#[async_trait]
impl ScrapeDelegate for ChannelScrapeDelegate {
    async fn request_refresh(&self) -> Result<ScrapedUsage, FetchError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // A superseded waiter gets dropped; its receiver errors out.
            *pending = Some(tx);
        }

        if self.request_tx.try_send(()).is_err() {
            self.pending.lock().await.take();
            return Err(FetchError::ScrapeUnavailable);
        }

        rx.await.map_err(|_| FetchError::ScrapeUnavailable)?
    }
}

// ============================================================================
// Event Service
// ============================================================================

/// The mpsc command loop.
pub struct EventService {
    rx: mpsc::Receiver<AppEvent>,
    scheduler: Arc<RefreshScheduler>,
    usage: Arc<UsageStore>,
    settings: Arc<SettingsStore>,
    scrape: Arc<ChannelScrapeDelegate>,
}

impl EventService {
    /// Creates the service and its command sender.
    pub fn new(
        scheduler: Arc<RefreshScheduler>,
        usage: Arc<UsageStore>,
        settings: Arc<SettingsStore>,
        scrape: Arc<ChannelScrapeDelegate>,
    ) -> (mpsc::Sender<AppEvent>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                rx,
                scheduler,
                usage,
                settings,
                scrape,
            },
        )
    }

    /// Runs the loop until every sender is dropped.
    pub async fn run(mut self) {
        info!("Event service started");
        while let Some(event) = self.rx.recv().await {
            self.handle(event).await;
        }
        info!("Event service stopped");
    }

    async fn handle(&self, event: AppEvent) {
        match event {
            AppEvent::GetUsageData { reply } => {
                let _ = reply.send(self.usage.snapshot().await);
            }
            AppEvent::RequestRefresh { reply } => {
                // Run off-loop so a slow chain never blocks scrape routing;
                // the chain's lock still collapses overlapping attempts.
                let scheduler = Arc::clone(&self.scheduler);
                tokio::spawn(async move {
                    let _ = reply.send(scheduler.refresh_once().await);
                });
            }
            AppEvent::UsageScraped { html } => {
                self.scrape.fulfill(&html).await;
            }
            AppEvent::SetOrgId { org_id } => {
                if let Err(e) = self.settings.update(SettingsPatch::org_id(org_id)).await {
                    warn!(error = %e, "Failed to set organization id");
                }
            }
            AppEvent::ClearOrgId => {
                if let Err(e) = self.settings.clear_org_id().await {
                    warn!(error = %e, "Failed to clear organization id");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
