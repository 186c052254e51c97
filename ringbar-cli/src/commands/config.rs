//! Config command - manage configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use ringbar_core::{Settings, SettingsPatch};
use ringbar_store::{SettingsStore, default_config_dir, default_settings_path};
use tracing::info;

use crate::output::format_json;
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,

    /// Set a configuration value.
    Set {
        /// Key: refresh-interval-minutes, min-fetch-interval-ms, warn-threshold.
        key: String,
        /// New value.
        value: String,
    },

    /// Reset to defaults.
    Reset,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli),
        ConfigAction::Set { key, value } => set_value(key, value, cli).await,
        ConfigAction::Reset => reset_config(cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<()> {
    let store = SettingsStore::load_default().await;
    let settings = store.get().await;

    match cli.format {
        OutputFormat::Text => {
            println!("RingBar Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!(
                "Organization id:      {}",
                settings.org_id.as_deref().unwrap_or("(not set)")
            );
            println!("Refresh interval:     {}m", settings.refresh_interval_minutes);
            println!("Min fetch interval:   {}ms", settings.min_fetch_interval_ms);
            println!("Warn threshold:       {}%", settings.warn_threshold);
            println!("Color bands:");
            for band in &settings.color_bands {
                println!("  up to {:>3}% -> {:?}", band.upper_bound, band.color);
            }
        }
        OutputFormat::Json => {
            println!("{}", format_json(&settings, cli.pretty)?);
        }
    }

    Ok(())
}

fn show_paths(cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let settings_path = default_settings_path();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", settings_path.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": settings_path.display().to_string(),
            });
            println!("{}", format_json(&paths, cli.pretty)?);
        }
    }

    Ok(())
}

async fn set_value(key: &str, value: &str, _cli: &Cli) -> Result<()> {
    let patch = match key {
        "refresh-interval-minutes" => SettingsPatch {
            refresh_interval_minutes: Some(value.parse()?),
            ..Default::default()
        },
        "min-fetch-interval-ms" => SettingsPatch {
            min_fetch_interval_ms: Some(value.parse()?),
            ..Default::default()
        },
        "warn-threshold" => SettingsPatch {
            warn_threshold: Some(value.parse()?),
            ..Default::default()
        },
        other => anyhow::bail!(
            "Unknown key: {other} (expected refresh-interval-minutes, \
             min-fetch-interval-ms, or warn-threshold)"
        ),
    };

    let store = SettingsStore::load_default().await;
    store.update(patch).await?;

    info!(key = key, value = value, "Setting updated");
    println!("Set {key} = {value}");
    Ok(())
}

async fn reset_config(_cli: &Cli) -> Result<()> {
    let store = SettingsStore::load_default().await;
    let defaults = Settings::default();

    store
        .update(SettingsPatch {
            org_id: Some(String::new()),
            refresh_interval_minutes: Some(defaults.refresh_interval_minutes),
            min_fetch_interval_ms: Some(defaults.min_fetch_interval_ms),
            warn_threshold: Some(defaults.warn_threshold),
            color_bands: Some(defaults.color_bands),
        })
        .await?;

    info!("Configuration reset to defaults");
    println!("Configuration reset to defaults");
    Ok(())
}
