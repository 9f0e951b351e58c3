use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a card. The transition graph is complete: any
/// status may move to any other, including out of `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Todo,
        Status::InProgress,
        Status::Blocked,
        Status::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Done => "done",
        }
    }

    /// Human label used in activity log content.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Todo => "To Do",
            Status::InProgress => "In Progress",
            Status::Blocked => "Blocked",
            Status::Done => "Done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Status::Todo),
            "in_progress" | "in-progress" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "done" => Ok(Status::Done),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Priority tier. The derived ordering (low < medium < high < urgent) is
/// what makes escalation monotonicity checkable with plain comparisons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// One tier up, saturating at `Urgent`.
    pub fn next_tier(&self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Urgent => Priority::Urgent,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    #[default]
    Action,
    Decision,
    FollowUp,
    Update,
    Blocker,
    Idea,
    Risk,
    Question,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Action => "action",
            CardType::Decision => "decision",
            CardType::FollowUp => "follow_up",
            CardType::Update => "update",
            CardType::Blocker => "blocker",
            CardType::Idea => "idea",
            CardType::Risk => "risk",
            CardType::Question => "question",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action" => Ok(CardType::Action),
            "decision" => Ok(CardType::Decision),
            "follow_up" | "follow-up" | "followup" => Ok(CardType::FollowUp),
            "update" => Ok(CardType::Update),
            "blocker" => Ok(CardType::Blocker),
            "idea" => Ok(CardType::Idea),
            "risk" => Ok(CardType::Risk),
            "question" => Ok(CardType::Question),
            other => Err(format!("unknown card type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Note,
    StatusChange,
    Assignment,
    Attachment,
    Edit,
    Escalation,
    Carryover,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Note => "note",
            ActivityType::StatusChange => "status_change",
            ActivityType::Assignment => "assignment",
            ActivityType::Attachment => "attachment",
            ActivityType::Edit => "edit",
            ActivityType::Escalation => "escalation",
            ActivityType::Carryover => "carryover",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(ActivityType::Note),
            "status_change" => Ok(ActivityType::StatusChange),
            "assignment" => Ok(ActivityType::Assignment),
            "attachment" => Ok(ActivityType::Attachment),
            "edit" => Ok(ActivityType::Edit),
            "escalation" => Ok(ActivityType::Escalation),
            "carryover" => Ok(ActivityType::Carryover),
            other => Err(format!("unknown activity type '{}'", other)),
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

sql_text_enum!(Status);
sql_text_enum!(Priority);
sql_text_enum!(CardType);
sql_text_enum!(ActivityType);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub meeting_id: i64,
    pub card_type: CardType,
    pub summary: String,
    pub owner: Option<String>,
    pub due_date_raw: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub time_estimate_hours: Option<f64>,
    pub status: Status,
    pub current_status_since: DateTime<Utc>,
    pub time_in_todo: i64,
    pub time_in_progress: i64,
    pub time_in_blocked: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub blocked_since: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub blocked_by: Option<String>,
    pub priority: Priority,
    pub priority_auto_updated: bool,
    pub last_priority_update: Option<DateTime<Utc>>,
    pub carried_from: Option<i64>,
    pub ai_summary: Option<String>,
    pub ai_summary_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Accumulated hours booked against `status`; `Done` has no bucket.
    pub fn time_in(&self, status: Status) -> i64 {
        match status {
            Status::Todo => self.time_in_todo,
            Status::InProgress => self.time_in_progress,
            Status::Blocked => self.time_in_blocked,
            Status::Done => 0,
        }
    }
}

/// Immutable record of one status transition. Insert-only: the engine
/// creates exactly one per transition and nothing ever updates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub card_id: i64,
    pub from_status: Status,
    pub to_status: Status,
    pub hours_in_from: i64,
    pub created_at: DateTime<Utc>,
}

/// Append-only activity log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub card_id: i64,
    pub actor: String,
    pub activity_type: ActivityType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: i64,
    pub title: String,
    pub series_id: Option<i64>,
    pub sequence: Option<i64>,
    pub previous_meeting_id: Option<i64>,
    pub next_meeting_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn test_priority_next_tier_saturates() {
        assert_eq!(Priority::Low.next_tier(), Priority::Medium);
        assert_eq!(Priority::High.next_tier(), Priority::Urgent);
        assert_eq!(Priority::Urgent.next_tier(), Priority::Urgent);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn test_card_type_aliases() {
        assert_eq!("follow-up".parse::<CardType>().unwrap(), CardType::FollowUp);
        assert_eq!("followup".parse::<CardType>().unwrap(), CardType::FollowUp);
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("open".parse::<Status>().is_err());
    }
}
