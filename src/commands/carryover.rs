use anyhow::Result;
use chrono::Utc;

use crate::db::Database;
use crate::series::carryover;

pub fn run(db: &Database, meeting_id: i64, actor: &str) -> Result<()> {
    let created = carryover(db, meeting_id, actor, Utc::now())?;

    if created.is_empty() {
        println!("Nothing to carry over into meeting #{}.", meeting_id);
        return Ok(());
    }

    println!(
        "Carried {} card(s) into meeting #{}:",
        created.len(),
        meeting_id
    );
    for card in created {
        println!(
            "  #{} [{}] {} (from card #{})",
            card.id,
            card.priority,
            card.summary,
            card.carried_from.unwrap_or(0)
        );
    }
    Ok(())
}
