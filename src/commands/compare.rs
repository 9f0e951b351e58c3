use anyhow::Result;

use crate::db::Database;
use crate::series::{compare, LineageMatcher};

pub fn run(db: &Database, meeting_id: i64, json: bool) -> Result<()> {
    let report = match compare(db, meeting_id, &LineageMatcher)? {
        Some(r) => r,
        None => {
            // Not an error: a meeting without a predecessor simply has
            // nothing to compare against.
            if json {
                println!("{}", serde_json::json!({ "hasComparison": false }));
            } else {
                println!("Meeting #{} has no linked previous meeting; no comparison available.", meeting_id);
            }
            return Ok(());
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "hasComparison": true,
                "comparison": report,
            }))?
        );
        return Ok(());
    }

    println!(
        "Comparing meeting #{} against #{}",
        report.current_meeting_id, report.previous_meeting_id
    );

    if !report.matched.is_empty() {
        println!("\nCarried / matching cards:");
        for pair in &report.matched {
            let delta = if pair.status_changed {
                format!("{} -> {}", pair.previous.status, pair.current.status)
            } else {
                format!("still {}", pair.current.status)
            };
            println!("  #{} -> #{}: {} ({})", pair.previous.id, pair.current.id, pair.current.summary, delta);
        }
    }

    if !report.only_in_previous.is_empty() {
        println!("\nOnly in previous meeting:");
        for card in &report.only_in_previous {
            println!("  #{} [{}] {}", card.id, card.status, card.summary);
        }
    }

    if !report.only_in_current.is_empty() {
        println!("\nNew this meeting:");
        for card in &report.only_in_current {
            println!("  #{} [{}] {}", card.id, card.status, card.summary);
        }
    }

    Ok(())
}
