//! Watch command - periodic terminal usage view.

use anyhow::Result;
use clap::Args;
use std::io::{Write, stdout};
use tokio::time::{Duration, interval};
use tracing::info;

use crate::Cli;
use crate::output::format_snapshot;

use super::CliContext;

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Refresh interval in seconds.
    #[arg(long, short, default_value = "60")]
    pub interval: u64,
}

/// Floor on the watch cadence; the chain throttle is authoritative anyway.
const MIN_WATCH_INTERVAL_SECS: u64 = 10;

/// Runs the watch command.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<()> {
    let refresh_interval = args.interval.max(MIN_WATCH_INTERVAL_SECS);
    info!(interval = refresh_interval, "Starting watch mode");

    let ctx = CliContext::open(None).await;
    let mut ticker = interval(Duration::from_secs(refresh_interval));

    loop {
        ticker.tick().await;

        let snapshot = ctx.chain.acquire().await.into_snapshot();
        let bands = ctx.settings.get().await.color_bands;

        // Clear screen
        print!("\x1b[2J\x1b[H");
        stdout().flush()?;

        let now = chrono::Local::now();
        println!(
            "RingBar Watch - {} (refresh: {refresh_interval}s)",
            now.format("%H:%M:%S")
        );
        println!("{}", "─".repeat(50));
        println!();
        println!("{}", format_snapshot(&snapshot, &bands, cli.no_color));
        println!();
        println!("Press Ctrl+C to exit");
    }
}
