//! Status transition engine.
//!
//! One call moves a card between lifecycle states and settles the time
//! ledger for the interval it is leaving: the elapsed whole hours are
//! added to the outgoing status accumulator, a status-history record is
//! inserted, and a status-change activity is appended. All writes land in
//! a single database transaction; a concurrent writer on the same card
//! trips the optimistic guard and the engine re-reads and retries.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::db::{Database, TransitionWrite};
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::models::{Card, Status};

/// Context supplied when a card enters `Blocked`.
#[derive(Debug, Clone, Default)]
pub struct BlockDetails {
    pub reason: Option<String>,
    pub blocked_by: Option<String>,
}

const MAX_CONFLICT_RETRIES: u32 = 3;

/// Move `card_id` to `new_status`, settling time accounting for the
/// outgoing status. Writing the card's current status back is a no-op
/// that returns the card unchanged: redundant writes must not inflate
/// the history or activity logs.
pub fn transition(
    db: &Database,
    card_id: i64,
    new_status: Status,
    actor: &str,
    block: Option<&BlockDetails>,
    now: DateTime<Utc>,
) -> CoreResult<Card> {
    let mut attempt = 0;
    loop {
        match try_transition(db, card_id, new_status, actor, block, now) {
            Err(CoreError::ConflictRetryable) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                debug!(card_id, attempt, "transition conflict, retrying");
            }
            other => return other,
        }
    }
}

fn try_transition(
    db: &Database,
    card_id: i64,
    new_status: Status,
    actor: &str,
    block: Option<&BlockDetails>,
    now: DateTime<Utc>,
) -> CoreResult<Card> {
    let card = db
        .get_card(card_id)?
        .ok_or_else(|| CoreError::NotFound(format!("card #{}", card_id)))?;

    if card.status == new_status {
        return Ok(card);
    }

    let hours = ledger::elapsed_hours(card.current_status_since, now);

    // blocked_since survives a redundant blocked write (handled above as a
    // no-op); on a genuine entry the clock starts now.
    let blocked_since = match new_status {
        Status::Blocked => Some(card.blocked_since.unwrap_or(now)),
        _ => None,
    };
    let (blocked_reason, blocked_by) = match (new_status, block) {
        (Status::Blocked, Some(details)) => (details.reason.clone(), details.blocked_by.clone()),
        _ => (None, None),
    };
    let completed_at = match new_status {
        Status::Done => Some(now),
        _ => None,
    };

    let content = format!(
        "Status changed from {} to {} after {}",
        card.status.label(),
        new_status.label(),
        ledger::format_hours(hours)
    );

    db.apply_transition(&TransitionWrite {
        card_id,
        expected_status: card.status,
        expected_since: card.current_status_since,
        new_status,
        hours_in_from: hours,
        completed_at,
        blocked_since,
        blocked_reason,
        blocked_by,
        actor: actor.to_string(),
        activity_content: content,
        activity_metadata: json!({
            "from": card.status,
            "to": new_status,
            "hours": hours,
        }),
        now,
    })?;

    db.get_card(card_id)?
        .ok_or_else(|| CoreError::NotFound(format!("card #{}", card_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewCard;
    use crate::models::ActivityType;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn setup() -> (Database, tempfile::TempDir, i64, DateTime<Utc>) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let meeting_id = db.create_meeting("Standup", None, None, t0).unwrap();
        (db, dir, meeting_id, t0)
    }

    fn new_card(db: &Database, meeting_id: i64, t0: DateTime<Utc>) -> i64 {
        let new = NewCard {
            summary: "Ship the migration".to_string(),
            ..Default::default()
        };
        db.create_card(meeting_id, &new, t0).unwrap()
    }

    #[test]
    fn test_transition_updates_since_and_accumulator() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let at = t0 + Duration::hours(26);
        let card = transition(&db, id, Status::InProgress, "dana", None, at).unwrap();

        assert_eq!(card.status, Status::InProgress);
        assert_eq!(card.current_status_since, at);
        assert_eq!(card.time_in_todo, 26);
        assert_eq!(card.time_in_progress, 0);
    }

    #[test]
    fn test_same_status_is_noop() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let at = t0 + Duration::hours(10);
        let card = transition(&db, id, Status::Todo, "dana", None, at).unwrap();

        // Nothing changed, nothing logged
        assert_eq!(card.current_status_since, t0);
        assert_eq!(card.time_in_todo, 0);
        assert!(db.get_status_history(id).unwrap().is_empty());
        assert!(db.get_activities(id).unwrap().is_empty());
    }

    #[test]
    fn test_missing_card_not_found() {
        let (db, _dir, _meeting_id, t0) = setup();
        let err = transition(&db, 404, Status::Done, "dana", None, t0).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_entering_blocked_sets_block_fields() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let at = t0 + Duration::hours(2);
        let details = BlockDetails {
            reason: Some("waiting on legal".to_string()),
            blocked_by: Some("legal-team".to_string()),
        };
        let card = transition(&db, id, Status::Blocked, "dana", Some(&details), at).unwrap();

        assert_eq!(card.blocked_since, Some(at));
        assert_eq!(card.blocked_reason.as_deref(), Some("waiting on legal"));
        assert_eq!(card.blocked_by.as_deref(), Some("legal-team"));
    }

    #[test]
    fn test_redundant_blocked_write_preserves_blocked_since() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let first = t0 + Duration::hours(2);
        transition(&db, id, Status::Blocked, "dana", None, first).unwrap();
        let card = transition(&db, id, Status::Blocked, "dana", None, first + Duration::hours(6))
            .unwrap();

        assert_eq!(card.blocked_since, Some(first));
        assert_eq!(db.get_status_history(id).unwrap().len(), 1);
    }

    #[test]
    fn test_leaving_blocked_clears_block_fields() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let details = BlockDetails {
            reason: Some("vendor outage".to_string()),
            blocked_by: None,
        };
        transition(&db, id, Status::Blocked, "dana", Some(&details), t0 + Duration::hours(1))
            .unwrap();
        let card =
            transition(&db, id, Status::InProgress, "dana", None, t0 + Duration::hours(3)).unwrap();

        assert_eq!(card.blocked_since, None);
        assert_eq!(card.blocked_reason, None);
        assert_eq!(card.blocked_by, None);
        assert_eq!(card.time_in_blocked, 2);
    }

    #[test]
    fn test_done_sets_and_reopen_clears_completed_at() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let done_at = t0 + Duration::hours(4);
        let card = transition(&db, id, Status::Done, "dana", None, done_at).unwrap();
        assert_eq!(card.completed_at, Some(done_at));

        let reopened =
            transition(&db, id, Status::Todo, "dana", None, done_at + Duration::hours(1)).unwrap();
        assert_eq!(reopened.completed_at, None);
        assert_eq!(reopened.status, Status::Todo);
    }

    #[test]
    fn test_done_time_is_not_accumulated() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        transition(&db, id, Status::Done, "dana", None, t0 + Duration::hours(1)).unwrap();
        // Sits in done for 50 hours, then reopens; no bucket grows
        let card = transition(&db, id, Status::InProgress, "dana", None, t0 + Duration::hours(51))
            .unwrap();

        assert_eq!(card.time_in_todo, 1);
        assert_eq!(card.time_in_progress, 0);
        assert_eq!(card.time_in_blocked, 0);
    }

    #[test]
    fn test_transition_appends_history_and_activity() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        let at = t0 + Duration::hours(26);
        transition(&db, id, Status::InProgress, "dana", None, at).unwrap();

        let history = db.get_status_history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, Status::Todo);
        assert_eq!(history[0].to_status, Status::InProgress);
        assert_eq!(history[0].hours_in_from, 26);
        assert_eq!(history[0].created_at, at);

        let activities = db.get_activities(id).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::StatusChange);
        assert_eq!(activities[0].actor, "dana");
        assert!(activities[0].content.contains("To Do"));
        assert!(activities[0].content.contains("In Progress"));
        assert!(activities[0].content.contains("1d 2h"));
        let meta = activities[0].metadata.as_ref().unwrap();
        assert_eq!(meta["hours"], 26);
    }

    #[test]
    fn test_clock_skew_clamps_to_zero_hours() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        // "now" earlier than the interval start
        let card =
            transition(&db, id, Status::InProgress, "dana", None, t0 - Duration::hours(3)).unwrap();
        assert_eq!(card.time_in_todo, 0);
    }

    #[test]
    fn test_full_lifecycle_accounting() {
        // Worked example: todo 26h -> in_progress 5h -> blocked 80h -> done
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        transition(&db, id, Status::InProgress, "dana", None, t0 + Duration::hours(26)).unwrap();
        transition(&db, id, Status::Blocked, "dana", None, t0 + Duration::hours(31)).unwrap();
        let card = transition(&db, id, Status::Done, "dana", None, t0 + Duration::hours(111))
            .unwrap();

        assert_eq!(card.time_in_todo, 26);
        assert_eq!(card.time_in_progress, 5);
        assert_eq!(card.time_in_blocked, 80);
        assert_eq!(card.completed_at, Some(t0 + Duration::hours(111)));
        assert_eq!(card.status, Status::Done);

        let history = db.get_status_history(id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(
            (history[0].from_status, history[0].to_status, history[0].hours_in_from),
            (Status::Todo, Status::InProgress, 26)
        );
        assert_eq!(
            (history[1].from_status, history[1].to_status, history[1].hours_in_from),
            (Status::InProgress, Status::Blocked, 5)
        );
        assert_eq!(
            (history[2].from_status, history[2].to_status, history[2].hours_in_from),
            (Status::Blocked, Status::Done, 80)
        );
    }

    #[test]
    fn test_accumulators_sum_to_card_age() {
        let (db, _dir, meeting_id, t0) = setup();
        let id = new_card(&db, meeting_id, t0);

        transition(&db, id, Status::InProgress, "dana", None, t0 + Duration::hours(7)).unwrap();
        transition(&db, id, Status::Blocked, "dana", None, t0 + Duration::hours(19)).unwrap();
        let last = t0 + Duration::hours(40);
        let card = transition(&db, id, Status::Todo, "dana", None, last).unwrap();

        // As of the last transition: buckets account for the full age
        let total = card.time_in_todo + card.time_in_progress + card.time_in_blocked;
        assert_eq!(total, 40);
        assert_eq!(card.current_status_since, last);
    }
}
