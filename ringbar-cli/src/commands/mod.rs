//! CLI command implementations.

pub mod config;
pub mod org;
pub mod usage;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use ringbar_fetch::{FetchContext, UsageChain};
use ringbar_store::{SettingsStore, UsageStore, default_cache_path};

/// Environment variable carrying the ambient session cookie.
pub const SESSION_COOKIE_ENV: &str = "RINGBAR_SESSION_COOKIE";

/// Shared command wiring: the settings store and the acquisition chain.
pub struct CliContext {
    pub settings: Arc<SettingsStore>,
    pub chain: Arc<UsageChain>,
}

impl CliContext {
    /// Builds the standard wiring from the default platform paths.
    ///
    /// `min_fetch_interval` overrides the configured throttle window;
    /// commands that force a fresh attempt pass zero.
    pub async fn open(min_fetch_interval: Option<Duration>) -> Self {
        let settings = Arc::new(SettingsStore::load_default().await);
        let usage = Arc::new(UsageStore::open(default_cache_path()).await);

        let mut builder = FetchContext::builder(Arc::clone(&settings) as _);
        if let Ok(cookie) = std::env::var(SESSION_COOKIE_ENV) {
            builder = builder.session_cookie(cookie);
        }

        let interval = match min_fetch_interval {
            Some(interval) => interval,
            None => settings.get().await.min_fetch_interval(),
        };
        let chain = Arc::new(UsageChain::standard(builder.build(), usage as _, interval));

        Self { settings, chain }
    }
}
