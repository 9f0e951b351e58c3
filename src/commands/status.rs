use anyhow::{anyhow, Result};
use chrono::Utc;

use crate::db::Database;
use crate::models::Status;
use crate::transition::{transition, BlockDetails};

pub fn run(
    db: &Database,
    id: i64,
    new_status: &str,
    actor: &str,
    reason: Option<&str>,
    blocked_by: Option<&str>,
) -> Result<()> {
    let new_status: Status = new_status
        .parse()
        .map_err(|e: String| anyhow!("Invalid status: {}. Use todo, in_progress, blocked, or done.", e))?;

    let block = match new_status {
        Status::Blocked => Some(BlockDetails {
            reason: reason.map(str::to_string),
            blocked_by: blocked_by.map(str::to_string),
        }),
        _ => None,
    };

    let card = transition(db, id, new_status, actor, block.as_ref(), Utc::now())?;

    println!("Card #{} is now {}", card.id, card.status.label());
    if let Some(completed) = card.completed_at {
        println!("Completed at {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
