use anyhow::{bail, Result};

use crate::db::Database;
use crate::ledger;
use crate::models::Status;

pub fn run(db: &Database, id: i64) -> Result<()> {
    let card = match db.get_card(id)? {
        Some(c) => c,
        None => bail!("Card #{} not found", id),
    };

    println!("Card #{}: {}", card.id, card.summary);
    println!("Meeting: #{}", card.meeting_id);
    println!("Type: {}", card.card_type);
    println!("Status: {} (since {})", card.status.label(), card.current_status_since.format("%Y-%m-%d %H:%M"));
    println!("Priority: {}{}", card.priority, if card.priority_auto_updated { " (auto)" } else { "" });

    if let Some(owner) = &card.owner {
        println!("Owner: {}", owner);
    }
    if let Some(due) = card.due_date {
        let raw = card.due_date_raw.as_deref().unwrap_or("");
        println!("Due: {} ({})", due.format("%Y-%m-%d %H:%M"), raw);
    }
    if let Some(estimate) = card.time_estimate_hours {
        println!("Estimate: {}h", estimate);
    }
    if let Some(carried_from) = card.carried_from {
        println!("Carried over from card #{}", carried_from);
    }

    println!(
        "Time in status: todo {} / in progress {} / blocked {}",
        ledger::format_hours(card.time_in_todo),
        ledger::format_hours(card.time_in_progress),
        ledger::format_hours(card.time_in_blocked)
    );

    if card.status == Status::Blocked {
        if let Some(since) = card.blocked_since {
            println!("Blocked since: {}", since.format("%Y-%m-%d %H:%M"));
        }
        if let Some(reason) = &card.blocked_reason {
            println!("Blocked reason: {}", reason);
        }
        if let Some(by) = &card.blocked_by {
            println!("Blocked by: {}", by);
        }
    }
    if let Some(completed) = card.completed_at {
        println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(summary) = &card.ai_summary {
        println!("\nSummary: {}", summary);
    }

    let history = db.get_status_history(id)?;
    if !history.is_empty() {
        println!("\nStatus history:");
        for entry in history {
            println!(
                "  [{}] {} -> {} after {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.from_status.label(),
                entry.to_status.label(),
                ledger::format_hours(entry.hours_in_from)
            );
        }
    }

    let activities = db.get_activities(id)?;
    if !activities.is_empty() {
        println!("\nActivity:");
        for activity in activities {
            println!(
                "  [{}] {} ({}): {}",
                activity.created_at.format("%Y-%m-%d %H:%M"),
                activity.actor,
                activity.activity_type,
                activity.content
            );
        }
    }

    Ok(())
}
