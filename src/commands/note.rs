use anyhow::{bail, Result};
use chrono::Utc;

use crate::db::Database;
use crate::models::ActivityType;

pub fn run(db: &Database, id: i64, text: &str, actor: &str) -> Result<()> {
    if db.get_card(id)?.is_none() {
        bail!("Card #{} not found", id);
    }

    db.add_activity(id, actor, ActivityType::Note, text, None, Utc::now())?;
    println!("Added note to card #{}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewCard;
    use tempfile::tempdir;

    #[test]
    fn test_note_appends_activity() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let now = Utc::now();
        let meeting_id = db.create_meeting("Standup", None, None, now).unwrap();
        let card_id = db
            .create_card(meeting_id, &NewCard { summary: "x".into(), ..Default::default() }, now)
            .unwrap();

        run(&db, card_id, "checked with the vendor", "dana").unwrap();
        run(&db, card_id, "still waiting", "dana").unwrap();

        let activities = db.get_activities(card_id).unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].activity_type, ActivityType::Note);
        assert_eq!(activities[0].content, "checked with the vendor");
    }

    #[test]
    fn test_note_missing_card_fails() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        assert!(run(&db, 1, "note", "dana").is_err());
    }
}
