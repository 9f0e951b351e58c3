use anyhow::{anyhow, Result};

use crate::db::Database;
use crate::models::{Priority, Status};

pub fn run(
    db: &Database,
    meeting: Option<i64>,
    status: Option<&str>,
    priority: Option<&str>,
) -> Result<()> {
    let status_filter = status
        .map(|s| s.parse::<Status>())
        .transpose()
        .map_err(|e| anyhow!("Invalid status: {}", e))?;
    let priority_filter = priority
        .map(|p| p.parse::<Priority>())
        .transpose()
        .map_err(|e| anyhow!("Invalid priority: {}", e))?;

    let cards = db.list_cards(meeting, status_filter, priority_filter)?;

    if cards.is_empty() {
        println!("No cards found.");
        return Ok(());
    }

    for card in cards {
        let status_display = format!("[{}]", card.status);
        let owner = card.owner.as_deref().unwrap_or("-");
        println!(
            "#{:<4} {:13} {:<40} {:8} {:12} m#{}",
            card.id,
            status_display,
            truncate(&card.summary, 40),
            card.priority.to_string(),
            truncate(owner, 12),
            card.meeting_id
        );
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
