//! `imint loiter`: vessels loitering in the position feed.

use anyhow::Result;

use crate::cli::open_fetcher;
use crate::cli::output::{self, Styled};
use crate::config::Config;
use crate::loitering::{detect, LoiterThresholds};

pub async fn run(config: &Config, thresholds: LoiterThresholds) -> Result<()> {
    let fetcher = open_fetcher(config)?;
    let events = detect(fetcher.warehouse(), &thresholds)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "thresholds": thresholds,
            "total": events.len(),
            "events": events,
        }));
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    let s = Styled::new();
    if events.is_empty() {
        eprintln!(
            "  No loitering within {} s and {} m.",
            thresholds.max_gap_secs, thresholds.max_distance_m
        );
        return Ok(());
    }
    eprintln!(
        "  {} {} loitering pair(s) within {} s and {} m:",
        s.warn_sym(),
        events.len(),
        thresholds.max_gap_secs,
        thresholds.max_distance_m
    );
    eprintln!();
    for e in &events {
        eprintln!(
            "    {:<16} {} -> {}  {:>5.0} s  {:>6.1} m  ({:.4}, {:.4})",
            e.vessel_id,
            e.first_seen,
            e.last_seen.format("%H:%M:%S"),
            e.gap_secs,
            e.distance_m,
            e.latitude,
            e.longitude
        );
    }
    Ok(())
}
