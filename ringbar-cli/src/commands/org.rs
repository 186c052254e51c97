//! Org command - manage the stored organization identity.

use anyhow::Result;
use clap::{Args, Subcommand};
use ringbar_core::SettingsPatch;
use ringbar_store::SettingsStore;
use tracing::info;

use crate::Cli;

/// Arguments for the org command.
#[derive(Args)]
pub struct OrgArgs {
    #[command(subcommand)]
    pub action: OrgAction,
}

/// Org subcommands.
#[derive(Subcommand)]
pub enum OrgAction {
    /// Show the stored organization id.
    Show,

    /// Set the organization id manually.
    Set {
        /// The organization id.
        org_id: String,
    },

    /// Clear the stored organization id (re-discovered on next fetch).
    Clear,
}

/// Runs the org command.
pub async fn run(args: &OrgArgs, _cli: &Cli) -> Result<()> {
    let store = SettingsStore::load_default().await;

    match &args.action {
        OrgAction::Show => {
            match store.org_id().await {
                Some(id) => println!("{id}"),
                None => println!("(not set)"),
            }
        }
        OrgAction::Set { org_id } => {
            store.update(SettingsPatch::org_id(org_id.clone())).await?;
            info!(org_id = %org_id, "Organization id set");
            println!("Organization id set");
        }
        OrgAction::Clear => {
            store.clear_org_id().await?;
            info!("Organization id cleared");
            println!("Organization id cleared");
        }
    }

    Ok(())
}
