//! Terminal output formatting.

use ringbar_core::{
    BandColor, ColorBand, SnapshotError, SnapshotSource, UsageSnapshot, band_color_for,
};

/// Width of the usage bars in characters.
const BAR_WIDTH: usize = 24;

/// ANSI escape for a band color.
fn ansi_code(color: BandColor) -> &'static str {
    match color {
        BandColor::Green => "\x1b[32m",
        BandColor::Yellow => "\x1b[33m",
        BandColor::Orange => "\x1b[38;5;208m",
        BandColor::Red => "\x1b[31m",
    }
}

/// Renders one usage bar: `[████░░░░] 42.0%`.
///
/// The bar color follows the same configured band lookup the icon uses.
fn render_bar(percent: f64, bands: &[ColorBand], no_color: bool) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let bar = format!(
        "[{}{}]",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled)
    );

    if no_color {
        format!("{bar} {percent:5.1}%")
    } else {
        let color = ansi_code(band_color_for(bands, percent));
        format!("{color}{bar}\x1b[0m {percent:5.1}%")
    }
}

fn format_reset(resets_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match resets_at {
        Some(at) => {
            let remaining = at.signed_duration_since(chrono::Utc::now());
            if remaining.num_seconds() <= 0 {
                "resets now".to_string()
            } else if remaining.num_hours() >= 24 {
                format!("resets in {}d {}h", remaining.num_days(), remaining.num_hours() % 24)
            } else {
                format!(
                    "resets in {}h {:02}m",
                    remaining.num_hours(),
                    remaining.num_minutes() % 60
                )
            }
        }
        None => String::new(),
    }
}

/// Formats a snapshot as human-readable text.
pub fn format_snapshot(snapshot: &UsageSnapshot, bands: &[ColorBand], no_color: bool) -> String {
    let mut lines = Vec::new();

    match snapshot.error {
        SnapshotError::NotAuthenticated => {
            lines.push("⚠ Not authenticated - sign in and retry".to_string());
        }
        SnapshotError::NeedsSetup => {
            lines.push("⚠ Setup required - set an organization id (ringbar-cli org set <id>)".to_string());
        }
        SnapshotError::None => {}
    }

    lines.push(format!(
        "Session  {} {}",
        render_bar(snapshot.session_percent, bands, no_color),
        format_reset(snapshot.session_resets_at)
    ));
    lines.push(format!(
        "Weekly   {} {}",
        render_bar(snapshot.weekly_percent, bands, no_color),
        format_reset(snapshot.weekly_resets_at)
    ));
    if let Some(ref model) = snapshot.model_weekly {
        lines.push(format!(
            "{:<8} {} {}",
            model.model_name,
            render_bar(model.percent, bands, no_color),
            format_reset(model.resets_at)
        ));
    }

    let age = snapshot.age();
    let source = match snapshot.source {
        SnapshotSource::Api => "api",
        SnapshotSource::Scrape => "scrape (best effort)",
        SnapshotSource::None => "none",
    };
    lines.push(format!(
        "Fetched {}s ago via {source}",
        age.num_seconds().max(0)
    ));

    lines.join("\n")
}

/// Formats any serializable value as JSON.
pub fn format_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ringbar_core::default_color_bands;

    #[test]
    fn test_bar_bounds() {
        let bands = default_color_bands();
        let empty = render_bar(0.0, &bands, true);
        assert!(empty.contains(&"░".repeat(BAR_WIDTH)));

        let full = render_bar(100.0, &bands, true);
        assert!(full.contains(&"█".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_bar_color_follows_configured_bands() {
        // Default bands put 50% in the yellow band; a custom band set that
        // goes red at 10% must recolor the same percentage.
        let default = render_bar(50.0, &default_color_bands(), false);
        assert!(default.contains("\x1b[33m"));

        let strict = vec![
            ColorBand::new(10, BandColor::Green),
            ColorBand::new(100, BandColor::Red),
        ];
        let recolored = render_bar(50.0, &strict, false);
        assert!(recolored.contains("\x1b[31m"));
    }

    #[test]
    fn test_format_includes_all_quotas() {
        let mut snapshot = UsageSnapshot::new();
        snapshot.session_percent = 42.0;
        snapshot.weekly_percent = 17.0;
        snapshot.model_weekly = Some(ringbar_core::ModelWeekly::new("Opus", 30.0));

        let text = format_snapshot(&snapshot, &default_color_bands(), true);
        assert!(text.contains("Session"));
        assert!(text.contains("Weekly"));
        assert!(text.contains("Opus"));
        assert!(text.contains("42.0%"));
    }

    #[test]
    fn test_error_tags_surface() {
        let mut snapshot = UsageSnapshot::new();
        snapshot.error = SnapshotError::NeedsSetup;

        let text = format_snapshot(&snapshot, &default_color_bands(), true);
        assert!(text.contains("Setup required"));
    }
}
