use anyhow::{bail, Result};
use chrono::Utc;

use crate::db::Database;

/// Create a meeting, optionally inside a named series (created on first
/// use) and optionally linked to the previous meeting in that series.
pub fn new(db: &Database, title: &str, series: Option<&str>, previous: Option<i64>) -> Result<()> {
    let now = Utc::now();

    let (series_id, sequence) = match series {
        Some(name) => {
            let series_id = match db.get_series_by_name(name)? {
                Some(s) => s.id,
                None => db.create_series(name, now)?,
            };
            let sequence = db
                .list_meetings()?
                .iter()
                .filter(|m| m.series_id == Some(series_id))
                .filter_map(|m| m.sequence)
                .max()
                .unwrap_or(0)
                + 1;
            (Some(series_id), Some(sequence))
        }
        None => (None, None),
    };

    if let Some(prev_id) = previous {
        if db.get_meeting(prev_id)?.is_none() {
            bail!("Previous meeting #{} not found", prev_id);
        }
    }

    let id = db.create_meeting(title, series_id, sequence, now)?;
    if let Some(prev_id) = previous {
        db.link_meetings(prev_id, id)?;
    }

    match sequence {
        Some(seq) => println!("Created meeting #{} ({} #{})", id, series.unwrap_or(""), seq),
        None => println!("Created meeting #{}", id),
    }
    Ok(())
}

pub fn link(db: &Database, previous: i64, next: i64) -> Result<()> {
    if previous == next {
        bail!("A meeting cannot be its own predecessor");
    }
    db.link_meetings(previous, next)?;
    println!("Linked meeting #{} -> #{}", previous, next);
    Ok(())
}

pub fn list(db: &Database) -> Result<()> {
    let meetings = db.list_meetings()?;
    if meetings.is_empty() {
        println!("No meetings found.");
        return Ok(());
    }

    for meeting in meetings {
        let link = match meeting.previous_meeting_id {
            Some(prev) => format!("prev #{}", prev),
            None => "-".to_string(),
        };
        println!(
            "#{:<4} {:<40} {:10} {}",
            meeting.id,
            meeting.title,
            link,
            meeting.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub fn show(db: &Database, id: i64) -> Result<()> {
    let meeting = match db.get_meeting(id)? {
        Some(m) => m,
        None => bail!("Meeting #{} not found", id),
    };

    println!("Meeting #{}: {}", meeting.id, meeting.title);
    if let Some(series_id) = meeting.series_id {
        println!("Series: #{} (sequence {})", series_id, meeting.sequence.unwrap_or(0));
    }
    if let Some(prev) = meeting.previous_meeting_id {
        println!("Previous: #{}", prev);
    }
    if let Some(next) = meeting.next_meeting_id {
        println!("Next: #{}", next);
    }
    println!("Created: {}", meeting.created_at.format("%Y-%m-%d %H:%M:%S"));

    let cards = db.list_cards(Some(id), None, None)?;
    if !cards.is_empty() {
        println!("\nCards:");
        for card in cards {
            println!(
                "  #{:<4} [{}] {:8} {}",
                card.id,
                card.status,
                card.priority.to_string(),
                card.summary
            );
        }
    }
    Ok(())
}
