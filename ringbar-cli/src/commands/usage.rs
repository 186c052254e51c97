//! Usage command - fetch and display the current quota snapshot.

use anyhow::Result;
use clap::Args;
use ringbar_core::SnapshotError;
use std::time::Duration;
use tracing::info;

use crate::output::{format_json, format_snapshot};
use crate::{Cli, ExitCode, OutputFormat};

use super::CliContext;

/// Arguments for the usage command.
#[derive(Args, Default)]
pub struct UsageArgs {
    /// Bypass the throttle window and force a fresh attempt.
    #[arg(long)]
    pub force: bool,
}

/// Runs the usage command.
pub async fn run(args: &UsageArgs, cli: &Cli) -> Result<()> {
    let throttle = args.force.then_some(Duration::ZERO);
    let ctx = CliContext::open(throttle).await;

    info!(force = args.force, "Fetching usage");
    let snapshot = ctx.chain.acquire().await.into_snapshot();

    match cli.format {
        OutputFormat::Text => {
            let bands = ctx.settings.get().await.color_bands;
            println!("{}", format_snapshot(&snapshot, &bands, cli.no_color));
        }
        OutputFormat::Json => println!("{}", format_json(&snapshot, cli.pretty)?),
    }

    match snapshot.error {
        SnapshotError::NotAuthenticated => {
            std::process::exit(ExitCode::NotAuthenticated as i32)
        }
        SnapshotError::NeedsSetup => std::process::exit(ExitCode::NeedsSetup as i32),
        SnapshotError::None => Ok(()),
    }
}
