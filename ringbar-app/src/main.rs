//! RingBar application binary.
//!
//! Wires the stores, the acquisition chain, the animation controller, the
//! refresh scheduler, and the event service together, then runs until
//! interrupted. Rendered frames land as a PNG in the cache directory for
//! the platform tray to pick up.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ringbar_app::{
    AnimationController, ChannelScrapeDelegate, EventService, IconRenderer, IconSink,
    RefreshScheduler, RenderedIcon,
};
use ringbar_fetch::{FetchContext, UsageChain};
use ringbar_store::{SettingsStore, UsageStore, default_cache_dir, default_cache_path};

/// Environment variable carrying the ambient session cookie.
const SESSION_COOKIE_ENV: &str = "RINGBAR_SESSION_COOKIE";

/// Writes each rendered frame to a PNG file for the tray to consume.
struct TrayFileSink {
    path: PathBuf,
}

impl IconSink for TrayFileSink {
    fn push(&self, icon: RenderedIcon) {
        if let Err(e) = std::fs::write(&self.path, icon.to_png()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write tray icon");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("RingBar starting");

    let settings = Arc::new(SettingsStore::load_default().await);
    let usage = Arc::new(UsageStore::open(default_cache_path()).await);
    let (scrape, mut scrape_requests) = ChannelScrapeDelegate::new();

    let mut ctx_builder = FetchContext::builder(Arc::clone(&settings) as _)
        .scrape_delegate(Arc::clone(&scrape) as _);
    if let Ok(cookie) = std::env::var(SESSION_COOKIE_ENV) {
        ctx_builder = ctx_builder.session_cookie(cookie);
    }

    let current = settings.get().await;
    let chain = Arc::new(UsageChain::standard(
        ctx_builder.build(),
        Arc::clone(&usage) as _,
        current.min_fetch_interval(),
    ));

    let sink = Arc::new(TrayFileSink {
        path: default_cache_dir().join("icon.png"),
    });
    let animation = Arc::new(AnimationController::new(
        IconRenderer::new(current.color_bands.clone()),
        sink,
    ));

    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&chain),
        Arc::clone(&settings),
        Arc::clone(&animation),
    ));
    let refresh_task = Arc::clone(&scheduler).spawn();

    let (event_tx, service) = EventService::new(
        scheduler,
        Arc::clone(&usage),
        Arc::clone(&settings),
        scrape,
    );
    let service_task = tokio::spawn(service.run());
    // Keep the command channel alive for the platform side.
    let _event_tx = event_tx;

    // No platform renderer is attached in the headless binary; scrape
    // requests are surfaced in the log and time out at the chain deadline.
    tokio::spawn(async move {
        while scrape_requests.recv().await.is_some() {
            debug!("Scrape refresh requested, no renderer attached");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("RingBar shutting down");

    refresh_task.abort();
    service_task.abort();
    animation.stop();
    Ok(())
}
