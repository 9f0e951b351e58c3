//! Series reconciliation: carrying incomplete cards forward between two
//! meetings of a recurring series, and computing a read-only diff of
//! their card sets.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{Card, Priority, Status};

/// Decides whether a card in the current meeting corresponds to a card in
/// the previous one. Pluggable so the matching policy can evolve without
/// touching the diff mechanics.
pub trait CardMatcher {
    fn is_match(&self, current: &Card, previous: &Card) -> bool;
}

/// Default matcher: the carryover lineage pointer is the strongest
/// signal; when absent, fall back to summary + owner equality
/// (case-insensitive).
#[derive(Debug, Default)]
pub struct LineageMatcher;

impl CardMatcher for LineageMatcher {
    fn is_match(&self, current: &Card, previous: &Card) -> bool {
        if current.carried_from == Some(previous.id) {
            return true;
        }
        current.summary.eq_ignore_ascii_case(&previous.summary)
            && match (&current.owner, &previous.owner) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Copy every incomplete card from the linked previous meeting into
/// `current_meeting_id`. Classification fields travel; lifecycle fields
/// reset to a fresh To Do. Source cards are never touched, and sources
/// already carried into this meeting are skipped, so re-running is safe.
pub fn carryover(
    db: &Database,
    current_meeting_id: i64,
    actor: &str,
    now: DateTime<Utc>,
) -> CoreResult<Vec<Card>> {
    let current = db
        .get_meeting(current_meeting_id)?
        .ok_or_else(|| CoreError::NotFound(format!("meeting #{}", current_meeting_id)))?;
    let previous_id = current.previous_meeting_id.ok_or_else(|| {
        CoreError::InvalidState(format!(
            "meeting #{} has no linked previous meeting",
            current_meeting_id
        ))
    })?;

    let already_carried: HashSet<i64> = db
        .carried_source_ids(current_meeting_id)?
        .into_iter()
        .collect();

    let mut created = Vec::new();
    for source in db.list_cards(Some(previous_id), None, None)? {
        if source.status == Status::Done || already_carried.contains(&source.id) {
            continue;
        }

        let new_id = db.insert_carried_card(current_meeting_id, &source, now)?;
        db.add_activity(
            new_id,
            actor,
            crate::models::ActivityType::Carryover,
            &format!(
                "Carried over from meeting #{} (card #{}, was {})",
                previous_id,
                source.id,
                source.status.label()
            ),
            Some(&json!({
                "source_card_id": source.id,
                "source_meeting_id": previous_id,
                "source_status": source.status,
            })),
            now,
        )?;

        let card = db
            .get_card(new_id)?
            .ok_or_else(|| CoreError::NotFound(format!("card #{}", new_id)))?;
        created.push(card);
    }

    info!(
        meeting_id = current_meeting_id,
        from = previous_id,
        carried = created.len(),
        "carryover complete"
    );
    Ok(created)
}

#[derive(Debug, Clone, Serialize)]
pub struct CardDigest {
    pub id: i64,
    pub summary: String,
    pub owner: Option<String>,
    pub status: Status,
    pub priority: Priority,
}

impl From<&Card> for CardDigest {
    fn from(card: &Card) -> Self {
        CardDigest {
            id: card.id,
            summary: card.summary.clone(),
            owner: card.owner.clone(),
            status: card.status,
            priority: card.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPair {
    pub previous: CardDigest,
    pub current: CardDigest,
    pub status_changed: bool,
}

/// Structured diff between two meetings' card sets.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub previous_meeting_id: i64,
    pub current_meeting_id: i64,
    /// In the previous meeting only: carryover or abandonment candidates.
    pub only_in_previous: Vec<CardDigest>,
    /// Newly created this meeting.
    pub only_in_current: Vec<CardDigest>,
    pub matched: Vec<MatchedPair>,
}

/// Compare the current meeting's cards against its linked previous
/// meeting. Read-only. Returns `None` when no previous meeting is linked;
/// callers report that as "no comparison available" rather than an error.
pub fn compare(
    db: &Database,
    current_meeting_id: i64,
    matcher: &dyn CardMatcher,
) -> CoreResult<Option<ComparisonReport>> {
    let current = db
        .get_meeting(current_meeting_id)?
        .ok_or_else(|| CoreError::NotFound(format!("meeting #{}", current_meeting_id)))?;
    let Some(previous_id) = current.previous_meeting_id else {
        return Ok(None);
    };

    let current_cards = db.list_cards(Some(current_meeting_id), None, None)?;
    let previous_cards = db.list_cards(Some(previous_id), None, None)?;

    let mut matched = Vec::new();
    let mut only_in_current = Vec::new();
    let mut claimed: HashSet<i64> = HashSet::new();

    for card in &current_cards {
        let hit = previous_cards
            .iter()
            .find(|prev| !claimed.contains(&prev.id) && matcher.is_match(card, prev));
        match hit {
            Some(prev) => {
                claimed.insert(prev.id);
                matched.push(MatchedPair {
                    previous: prev.into(),
                    current: card.into(),
                    status_changed: prev.status != card.status,
                });
            }
            None => only_in_current.push(card.into()),
        }
    }

    let only_in_previous = previous_cards
        .iter()
        .filter(|prev| !claimed.contains(&prev.id))
        .map(CardDigest::from)
        .collect();

    Ok(Some(ComparisonReport {
        previous_meeting_id: previous_id,
        current_meeting_id,
        only_in_previous,
        only_in_current,
        matched,
    }))
}
