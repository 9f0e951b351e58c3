use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::db::{Database, NewCard};
use crate::models::{CardType, Priority};

/// Accepts a full RFC 3339 timestamp or a plain date (taken as end of
/// that day, UTC).
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let dt = date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| anyhow!("invalid date '{}'", raw))?;
        return Ok(dt.and_utc());
    }
    bail!("Could not parse due date '{}'. Use YYYY-MM-DD or RFC 3339.", raw)
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    db: &Database,
    meeting_id: i64,
    summary: &str,
    card_type: &str,
    owner: Option<&str>,
    due: Option<&str>,
    priority: &str,
    estimate: Option<f64>,
) -> Result<()> {
    let card_type: CardType = card_type
        .parse()
        .map_err(|e: String| anyhow!("Invalid card type: {}", e))?;
    let priority: Priority = priority
        .parse()
        .map_err(|e: String| anyhow!("Invalid priority: {}", e))?;

    if db.get_meeting(meeting_id)?.is_none() {
        bail!("Meeting #{} not found", meeting_id);
    }

    let due_date = due.map(parse_due_date).transpose()?;

    let new = NewCard {
        card_type,
        summary: summary.to_string(),
        owner: owner.map(str::to_string),
        due_date_raw: due.map(str::to_string),
        due_date,
        time_estimate_hours: estimate,
        priority,
    };

    let id = db.create_card(meeting_id, &new, Utc::now())?;
    println!("Created card #{} in meeting #{}", id, meeting_id);
    Ok(())
}
