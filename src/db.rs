use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Activity, ActivityType, Card, CardType, Meeting, Priority, Series, Status, StatusHistoryEntry,
};

const SCHEMA_VERSION: i32 = 1;

const CARD_COLUMNS: &str = "id, meeting_id, card_type, summary, owner, due_date_raw, due_date, \
     time_estimate_hours, status, current_status_since, time_in_todo, time_in_progress, \
     time_in_blocked, completed_at, blocked_since, blocked_reason, blocked_by, priority, \
     priority_auto_updated, last_priority_update, carried_from, ai_summary, ai_summary_at, \
     created_at, updated_at";

/// Classification fields for a new card; lifecycle fields are set by the
/// engine on insert.
#[derive(Debug, Clone, Default)]
pub struct NewCard {
    pub card_type: CardType,
    pub summary: String,
    pub owner: Option<String>,
    pub due_date_raw: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub time_estimate_hours: Option<f64>,
    pub priority: Priority,
}

/// Everything the transition engine needs written atomically: the card
/// row update (with an optimistic guard on the state it read), the
/// history insert, and the activity insert.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub card_id: i64,
    pub expected_status: Status,
    pub expected_since: DateTime<Utc>,
    pub new_status: Status,
    pub hours_in_from: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub blocked_since: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub blocked_by: Option<String>,
    pub actor: String,
    pub activity_content: String,
    pub activity_metadata: serde_json::Value,
    pub now: DateTime<Utc>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> CoreResult<()> {
        let version: i32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM pragma_user_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS series (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meetings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    series_id INTEGER REFERENCES series(id),
                    sequence INTEGER,
                    previous_meeting_id INTEGER REFERENCES meetings(id),
                    next_meeting_id INTEGER REFERENCES meetings(id),
                    created_at TEXT NOT NULL
                );

                -- Core cards table
                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meeting_id INTEGER NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
                    card_type TEXT NOT NULL DEFAULT 'action',
                    summary TEXT NOT NULL,
                    owner TEXT,
                    due_date_raw TEXT,
                    due_date TEXT,
                    time_estimate_hours REAL,
                    status TEXT NOT NULL DEFAULT 'todo',
                    current_status_since TEXT NOT NULL,
                    time_in_todo INTEGER NOT NULL DEFAULT 0,
                    time_in_progress INTEGER NOT NULL DEFAULT 0,
                    time_in_blocked INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT,
                    blocked_since TEXT,
                    blocked_reason TEXT,
                    blocked_by TEXT,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    priority_auto_updated INTEGER NOT NULL DEFAULT 0,
                    last_priority_update TEXT,
                    carried_from INTEGER REFERENCES cards(id),
                    ai_summary TEXT,
                    ai_summary_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                -- Immutable transition records (insert-only)
                CREATE TABLE IF NOT EXISTS status_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                    from_status TEXT NOT NULL,
                    to_status TEXT NOT NULL,
                    hours_in_from INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                -- Append-only activity log
                CREATE TABLE IF NOT EXISTS activities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                    actor TEXT NOT NULL,
                    activity_type TEXT NOT NULL,
                    content TEXT NOT NULL,
                    metadata TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_cards_meeting ON cards(meeting_id);
                CREATE INDEX IF NOT EXISTS idx_cards_status ON cards(status);
                CREATE INDEX IF NOT EXISTS idx_cards_priority ON cards(priority);
                CREATE INDEX IF NOT EXISTS idx_history_card ON status_history(card_id);
                CREATE INDEX IF NOT EXISTS idx_activities_card ON activities(card_id);
                CREATE INDEX IF NOT EXISTS idx_meetings_series ON meetings(series_id);

                -- One carried copy per (source card, target meeting) makes
                -- carryover re-runs no-ops.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_cards_lineage
                    ON cards(carried_from, meeting_id) WHERE carried_from IS NOT NULL;
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        // Enable foreign keys
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Series

    pub fn create_series(&self, name: &str, now: DateTime<Utc>) -> CoreResult<i64> {
        self.conn.execute(
            "INSERT INTO series (name, created_at) VALUES (?1, ?2)",
            params![name, now.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_series_by_name(&self, name: &str) -> CoreResult<Option<Series>> {
        let series = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM series WHERE name = ?1",
                [name],
                |row| {
                    Ok(Series {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(row.get::<_, String>(2)?),
                    })
                },
            )
            .ok();
        Ok(series)
    }

    // Meetings

    pub fn create_meeting(
        &self,
        title: &str,
        series_id: Option<i64>,
        sequence: Option<i64>,
        now: DateTime<Utc>,
    ) -> CoreResult<i64> {
        self.conn.execute(
            "INSERT INTO meetings (title, series_id, sequence, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![title, series_id, sequence, now.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_meeting(&self, id: i64) -> CoreResult<Option<Meeting>> {
        let meeting = self
            .conn
            .query_row(
                "SELECT id, title, series_id, sequence, previous_meeting_id, next_meeting_id, created_at FROM meetings WHERE id = ?1",
                [id],
                |row| {
                    Ok(Meeting {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        series_id: row.get(2)?,
                        sequence: row.get(3)?,
                        previous_meeting_id: row.get(4)?,
                        next_meeting_id: row.get(5)?,
                        created_at: parse_datetime(row.get::<_, String>(6)?),
                    })
                },
            )
            .ok();
        Ok(meeting)
    }

    /// Link two meetings in a series: `previous` <-> `next`.
    pub fn link_meetings(&self, previous_id: i64, next_id: i64) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            "UPDATE meetings SET previous_meeting_id = ?1 WHERE id = ?2",
            params![previous_id, next_id],
        )?;
        if rows == 0 {
            return Err(CoreError::NotFound(format!("meeting #{}", next_id)));
        }
        let rows = tx.execute(
            "UPDATE meetings SET next_meeting_id = ?1 WHERE id = ?2",
            params![next_id, previous_id],
        )?;
        if rows == 0 {
            return Err(CoreError::NotFound(format!("meeting #{}", previous_id)));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_meetings(&self) -> CoreResult<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, series_id, sequence, previous_meeting_id, next_meeting_id, created_at FROM meetings ORDER BY id",
        )?;
        let meetings = stmt
            .query_map([], |row| {
                Ok(Meeting {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    series_id: row.get(2)?,
                    sequence: row.get(3)?,
                    previous_meeting_id: row.get(4)?,
                    next_meeting_id: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(meetings)
    }

    // Cards

    pub fn create_card(&self, meeting_id: i64, new: &NewCard, now: DateTime<Utc>) -> CoreResult<i64> {
        let now_str = now.to_rfc3339();
        self.conn.execute(
            "INSERT INTO cards (meeting_id, card_type, summary, owner, due_date_raw, due_date, \
             time_estimate_hours, priority, status, current_status_since, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'todo', ?9, ?9, ?9)",
            params![
                meeting_id,
                new.card_type,
                new.summary,
                new.owner,
                new.due_date_raw,
                new.due_date.map(|d| d.to_rfc3339()),
                new.time_estimate_hours,
                new.priority,
                now_str,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_card(&self, id: i64) -> CoreResult<Option<Card>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS))?;
        let card = stmt.query_row([id], card_from_row).ok();
        Ok(card)
    }

    pub fn list_cards(
        &self,
        meeting_filter: Option<i64>,
        status_filter: Option<Status>,
        priority_filter: Option<Priority>,
    ) -> CoreResult<Vec<Card>> {
        let mut sql = format!("SELECT {} FROM cards", CARD_COLUMNS);
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(meeting_id) = meeting_filter {
            conditions.push(format!("meeting_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(meeting_id));
        }

        if let Some(status) = status_filter {
            conditions.push(format!("status = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(status));
        }

        if let Some(priority) = priority_filter {
            conditions.push(format!("priority = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(priority));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let cards = stmt
            .query_map(params_refs.as_slice(), card_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// All cards not yet done, across every meeting. The escalation sweep's
    /// working set.
    pub fn list_open_cards(&self) -> CoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cards WHERE status != 'done' ORDER BY id",
            CARD_COLUMNS
        ))?;
        let cards = stmt
            .query_map([], card_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// Apply one status transition as a single atomic unit: card update,
    /// history insert, activity insert. The UPDATE carries an optimistic
    /// guard on the status and interval start the engine read; if another
    /// writer got there first the guard misses and the whole write is
    /// abandoned with `ConflictRetryable`.
    pub fn apply_transition(&self, w: &TransitionWrite) -> CoreResult<()> {
        let (todo_delta, progress_delta, blocked_delta) = match w.expected_status {
            Status::Todo => (w.hours_in_from, 0, 0),
            Status::InProgress => (0, w.hours_in_from, 0),
            Status::Blocked => (0, 0, w.hours_in_from),
            Status::Done => (0, 0, 0),
        };

        let tx = self.conn.unchecked_transaction()?;

        let rows = tx.execute(
            "UPDATE cards SET status = ?1, current_status_since = ?2, \
             time_in_todo = time_in_todo + ?3, time_in_progress = time_in_progress + ?4, \
             time_in_blocked = time_in_blocked + ?5, completed_at = ?6, blocked_since = ?7, \
             blocked_reason = ?8, blocked_by = ?9, updated_at = ?2 \
             WHERE id = ?10 AND status = ?11 AND current_status_since = ?12",
            params![
                w.new_status,
                w.now.to_rfc3339(),
                todo_delta,
                progress_delta,
                blocked_delta,
                w.completed_at.map(|d| d.to_rfc3339()),
                w.blocked_since.map(|d| d.to_rfc3339()),
                w.blocked_reason,
                w.blocked_by,
                w.card_id,
                w.expected_status,
                w.expected_since.to_rfc3339(),
            ],
        )?;

        if rows == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM cards WHERE id = ?1)",
                [w.card_id],
                |row| row.get(0),
            )?;
            return if exists {
                Err(CoreError::ConflictRetryable)
            } else {
                Err(CoreError::NotFound(format!("card #{}", w.card_id)))
            };
        }

        tx.execute(
            "INSERT INTO status_history (card_id, from_status, to_status, hours_in_from, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                w.card_id,
                w.expected_status,
                w.new_status,
                w.hours_in_from,
                w.now.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "INSERT INTO activities (card_id, actor, activity_type, content, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                w.card_id,
                w.actor,
                ActivityType::StatusChange,
                w.activity_content,
                w.activity_metadata.to_string(),
                w.now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Persist one escalation decision atomically (priority fields plus the
    /// activity entry). Guarded on the priority the sweep read so a racing
    /// human edit wins.
    pub fn apply_escalation(
        &self,
        card_id: i64,
        expected_priority: Priority,
        new_priority: Priority,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let rows = tx.execute(
            "UPDATE cards SET priority = ?1, priority_auto_updated = 1, \
             last_priority_update = ?2, updated_at = ?2 \
             WHERE id = ?3 AND priority = ?4 AND status != 'done'",
            params![new_priority, now.to_rfc3339(), card_id, expected_priority],
        )?;

        if rows == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM cards WHERE id = ?1)",
                [card_id],
                |row| row.get(0),
            )?;
            return if exists {
                Err(CoreError::ConflictRetryable)
            } else {
                Err(CoreError::NotFound(format!("card #{}", card_id)))
            };
        }

        tx.execute(
            "INSERT INTO activities (card_id, actor, activity_type, content, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                card_id,
                actor,
                ActivityType::Escalation,
                format!(
                    "Priority auto-escalated from {} to {}",
                    expected_priority, new_priority
                ),
                serde_json::json!({
                    "from": expected_priority,
                    "to": new_priority,
                })
                .to_string(),
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Insert a carried-forward copy of `source` into `meeting_id` with
    /// lifecycle fields reset. Classification travels, bookkeeping does not.
    pub fn insert_carried_card(
        &self,
        meeting_id: i64,
        source: &Card,
        now: DateTime<Utc>,
    ) -> CoreResult<i64> {
        let now_str = now.to_rfc3339();
        self.conn.execute(
            "INSERT INTO cards (meeting_id, card_type, summary, owner, due_date_raw, due_date, \
             time_estimate_hours, priority, status, current_status_since, carried_from, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'todo', ?9, ?10, ?9, ?9)",
            params![
                meeting_id,
                source.card_type,
                source.summary,
                source.owner,
                source.due_date_raw,
                source.due_date.map(|d| d.to_rfc3339()),
                source.time_estimate_hours,
                source.priority,
                now_str,
                source.id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Source card ids already carried into `meeting_id`.
    pub fn carried_source_ids(&self, meeting_id: i64) -> CoreResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT carried_from FROM cards WHERE meeting_id = ?1 AND carried_from IS NOT NULL",
        )?;
        let ids = stmt
            .query_map([meeting_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // Activity log

    pub fn add_activity(
        &self,
        card_id: i64,
        actor: &str,
        activity_type: ActivityType,
        content: &str,
        metadata: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> CoreResult<i64> {
        self.conn.execute(
            "INSERT INTO activities (card_id, actor, activity_type, content, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                card_id,
                actor,
                activity_type,
                content,
                metadata.map(|m| m.to_string()),
                now.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_activities(&self, card_id: i64) -> CoreResult<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, actor, activity_type, content, metadata, created_at \
             FROM activities WHERE card_id = ?1 ORDER BY id",
        )?;
        let activities = stmt
            .query_map([card_id], |row| {
                let metadata: Option<String> = row.get(5)?;
                Ok(Activity {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    actor: row.get(2)?,
                    activity_type: row.get(3)?,
                    content: row.get(4)?,
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(activities)
    }

    pub fn get_status_history(&self, card_id: i64) -> CoreResult<Vec<StatusHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, from_status, to_status, hours_in_from, created_at \
             FROM status_history WHERE card_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map([card_id], |row| {
                Ok(StatusHistoryEntry {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    from_status: row.get(2)?,
                    to_status: row.get(3)?,
                    hours_in_from: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        card_type: row.get(2)?,
        summary: row.get(3)?,
        owner: row.get(4)?,
        due_date_raw: row.get(5)?,
        due_date: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        time_estimate_hours: row.get(7)?,
        status: row.get(8)?,
        current_status_since: parse_datetime(row.get::<_, String>(9)?),
        time_in_todo: row.get(10)?,
        time_in_progress: row.get(11)?,
        time_in_blocked: row.get(12)?,
        completed_at: row.get::<_, Option<String>>(13)?.map(parse_datetime),
        blocked_since: row.get::<_, Option<String>>(14)?.map(parse_datetime),
        blocked_reason: row.get(15)?,
        blocked_by: row.get(16)?,
        priority: row.get(17)?,
        priority_auto_updated: row.get(18)?,
        last_priority_update: row.get::<_, Option<String>>(19)?.map(parse_datetime),
        carried_from: row.get(20)?,
        ai_summary: row.get(21)?,
        ai_summary_at: row.get::<_, Option<String>>(22)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(23)?),
        updated_at: parse_datetime(row.get::<_, String>(24)?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
