use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::db::Database;
use crate::escalation::{authorize_sweep, run_sweep};

pub fn run(db: &Database, cardflow_dir: &Path, secret: Option<&str>) -> Result<()> {
    let config = Config::load(cardflow_dir)?;
    authorize_sweep(secret, config.sweep_secret.as_deref())?;

    let started = Instant::now();
    let report = run_sweep(db, &config.policy(), "scheduler", Utc::now())?;
    let elapsed = started.elapsed();

    println!(
        "Scanned {} open cards in {}ms",
        report.scanned,
        elapsed.as_millis()
    );

    if report.changes.is_empty() {
        println!("No escalations needed.");
    } else {
        println!("Escalated {} card(s):", report.changes.len());
        for change in &report.changes {
            println!(
                "  #{} (meeting #{}): {} -> {}",
                change.card_id, change.meeting_id, change.from, change.to
            );
        }
    }

    if !report.failures.is_empty() {
        println!("{} card(s) failed:", report.failures.len());
        for failure in &report.failures {
            println!("  #{}: {}", failure.card_id, failure.error);
        }
    }

    Ok(())
}
