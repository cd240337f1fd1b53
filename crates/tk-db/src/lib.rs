//! Storage layer for ticket timers.
//!
//! Persists [`TimerSession`]s using `rusqlite` and implements
//! [`SessionRepository`] so the engine can use it as its durability boundary.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved into the thread or task that owns the engine, but
//! sharing it requires external synchronization (e.g. a `Mutex` around the engine).
//!
//! # Schema
//!
//! One row per ticket in `timer_sessions`, and one row per segment in
//! `segments`, ordered by `seq`. A save replaces the ticket's segment rows in
//! a single transaction, so a reader never sees a half-written history.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). This keeps lexicographic order equal to
//! chronological order and the values human-readable.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::debug;

use tk_core::{Segment, SessionRepository, TicketId, TimerSession, TimerStatus};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for ticket {ticket}: {timestamp}")]
    TimestampParse {
        ticket: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned back into a session.
    #[error("invalid session record for {ticket}: {message}")]
    InvalidRecord { ticket: String, message: String },
    /// A snapshot document could not be read or written.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Per-ticket summary row, for listings that do not need segment history.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub ticket_number: String,
    pub ticket_name: String,
    pub status: String,
    pub total_elapsed_ms: u64,
    pub segment_count: usize,
    pub updated_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS timer_sessions (
                ticket_number TEXT PRIMARY KEY,
                ticket_name TEXT NOT NULL,
                story_points REAL,
                status TEXT NOT NULL,
                total_elapsed_ms INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Segments: one contiguous span of activity per row
            -- seq: position in the ticket's history, starting at 0
            -- end_time: NULL while the segment is open
            CREATE TABLE IF NOT EXISTS segments (
                ticket_number TEXT NOT NULL,
                seq INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                PRIMARY KEY (ticket_number, seq),
                FOREIGN KEY (ticket_number) REFERENCES timer_sessions(ticket_number) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_timer_sessions_status ON timer_sessions(status);
            ",
        )?;
        Ok(())
    }

    /// Stores a session, replacing any previous record for its ticket.
    pub fn save_session(&mut self, session: &TimerSession) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO timer_sessions
            (ticket_number, ticket_name, story_points, status, total_elapsed_ms, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket_number) DO UPDATE SET
                ticket_name = excluded.ticket_name,
                story_points = excluded.story_points,
                status = excluded.status,
                total_elapsed_ms = excluded.total_elapsed_ms,
                updated_at = excluded.updated_at
            ",
            params![
                session.ticket_number.as_str(),
                session.ticket_name,
                session.story_points,
                session.status.as_str(),
                to_sql_ms(session.total_elapsed),
                format_timestamp(Utc::now()),
            ],
        )?;
        tx.execute(
            "DELETE FROM segments WHERE ticket_number = ?",
            [session.ticket_number.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO segments
                (ticket_number, seq, start_time, end_time, duration_ms, status)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for (seq, segment) in (0_i64..).zip(&session.sessions) {
                stmt.execute(params![
                    session.ticket_number.as_str(),
                    seq,
                    format_timestamp(segment.start_time),
                    segment.end_time.map(format_timestamp),
                    to_sql_ms(segment.duration),
                    segment.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Loads every session with its segments in chronological order.
    pub fn load_sessions(&self) -> Result<HashMap<TicketId, TimerSession>, DbError> {
        let mut segments = self.load_segments()?;

        let mut stmt = self.conn.prepare(
            "
            SELECT ticket_number, ticket_name, story_points, status, total_elapsed_ms
            FROM timer_sessions
            ORDER BY ticket_number ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut sessions = HashMap::new();
        for row in rows {
            let (ticket, ticket_name, story_points, status, total) = row?;
            let ticket_number = parse_ticket(&ticket)?;
            let session = TimerSession {
                status: parse_status(&status, &ticket)?,
                ticket_name,
                story_points,
                total_elapsed: from_sql_ms(total),
                sessions: segments.remove(&ticket).unwrap_or_default(),
                ticket_number: ticket_number.clone(),
            };
            sessions.insert(ticket_number, session);
        }
        debug!(count = sessions.len(), "loaded sessions from database");
        Ok(sessions)
    }

    fn load_segments(&self) -> Result<HashMap<String, Vec<Segment>>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT ticket_number, start_time, end_time, duration_ms, status
            FROM segments
            ORDER BY ticket_number ASC, seq ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut segments: HashMap<String, Vec<Segment>> = HashMap::new();
        for row in rows {
            let (ticket, start_time, end_time, duration, status) = row?;
            let segment = Segment {
                start_time: parse_timestamp(&start_time, &ticket)?,
                end_time: end_time
                    .map(|end| parse_timestamp(&end, &ticket))
                    .transpose()?,
                duration: from_sql_ms(duration),
                status: parse_status(&status, &ticket)?,
            };
            segments.entry(ticket).or_default().push(segment);
        }
        Ok(segments)
    }

    /// Lists one summary row per ticket, most recently updated first.
    pub fn list_summaries(&self) -> Result<Vec<SessionSummary>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT s.ticket_number, s.ticket_name, s.status, s.total_elapsed_ms, s.updated_at,
                   (SELECT COUNT(*) FROM segments g WHERE g.ticket_number = s.ticket_number)
            FROM timer_sessions s
            ORDER BY s.updated_at DESC, s.ticket_number ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                ticket_number: row.get(0)?,
                ticket_name: row.get(1)?,
                status: row.get(2)?,
                total_elapsed_ms: from_sql_ms(row.get(3)?),
                updated_at: row.get(4)?,
                segment_count: usize::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
            })
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Deletes one ticket's session. Its segments go with it.
    pub fn delete_session(&mut self, ticket: &TicketId) -> Result<bool, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM timer_sessions WHERE ticket_number = ?",
            [ticket.as_str()],
        )?;
        Ok(deleted > 0)
    }

    /// Deletes every session.
    pub fn clear_sessions(&mut self) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM segments", [])?;
        let deleted = tx.execute("DELETE FROM timer_sessions", [])?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Renders every session as one JSON document keyed by ticket number.
    pub fn export_snapshot(&self) -> Result<String, DbError> {
        let sessions: BTreeMap<String, TimerSession> = self
            .load_sessions()?
            .into_iter()
            .map(|(ticket, session)| (ticket.into(), session))
            .collect();
        Ok(serde_json::to_string_pretty(&sessions)?)
    }

    /// Saves every session in a snapshot document, last writer wins.
    ///
    /// Sessions are repaired before saving so imported totals always match
    /// their segments. Returns the number of sessions imported.
    pub fn import_snapshot(&mut self, json: &str) -> Result<usize, DbError> {
        let sessions: HashMap<String, TimerSession> = serde_json::from_str(json)?;
        let mut imported = 0;
        for (key, mut session) in sessions {
            if key != session.ticket_number.as_str() {
                return Err(DbError::InvalidRecord {
                    ticket: key,
                    message: format!(
                        "snapshot key does not match ticket number {}",
                        session.ticket_number
                    ),
                });
            }
            session.repair();
            self.save_session(&session)?;
            imported += 1;
        }
        Ok(imported)
    }
}

impl SessionRepository for Database {
    type Error = DbError;

    fn load(&self) -> Result<HashMap<TicketId, TimerSession>, Self::Error> {
        self.load_sessions()
    }

    fn save(&mut self, session: &TimerSession) -> Result<(), Self::Error> {
        self.save_session(session)
    }

    fn delete(&mut self, ticket: &TicketId) -> Result<(), Self::Error> {
        self.delete_session(ticket).map(|_| ())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.clear_sessions().map(|_| ())
    }
}

fn parse_ticket(ticket: &str) -> Result<TicketId, DbError> {
    TicketId::new(ticket).map_err(|err| DbError::InvalidRecord {
        ticket: ticket.to_string(),
        message: err.to_string(),
    })
}

fn parse_status(status: &str, ticket: &str) -> Result<TimerStatus, DbError> {
    status.parse().map_err(|err: tk_core::ValidationError| DbError::InvalidRecord {
        ticket: ticket.to_string(),
        message: err.to_string(),
    })
}

fn parse_timestamp(timestamp: &str, ticket: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            ticket: ticket.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_sql_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn from_sql_ms(ms: i64) -> u64 {
    u64::try_from(ms).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tk_core::{EngineOptions, TicketMeta, TimerAction, TimerEngine};

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + seconds, 0).unwrap()
    }

    fn ticket(id: &str) -> TicketId {
        TicketId::new(id).unwrap()
    }

    fn paused_session(id: &str) -> TimerSession {
        let mut session = TimerSession::new(
            ticket(id),
            &TicketMeta::new(Some("Invoice PDF".to_string()), Some(3.0)),
            TimerStatus::Paused,
        );
        session.sessions.push(Segment {
            start_time: at(0),
            end_time: Some(at(5)),
            duration: 5000,
            status: TimerStatus::Paused,
        });
        session.total_elapsed = 5000;
        session
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "timer_sessions"),
            vec![
                "ticket_number",
                "ticket_name",
                "story_points",
                "status",
                "total_elapsed_ms",
                "updated_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "segments"),
            vec![
                "ticket_number",
                "seq",
                "start_time",
                "end_time",
                "duration_ms",
                "status",
            ]
        );
    }

    #[test]
    fn save_and_load_roundtrip_preserves_history() {
        let mut db = Database::open_in_memory().unwrap();
        let mut session = paused_session("PROJ-1");
        session.status = TimerStatus::Running;
        session.sessions.push(Segment {
            duration: 2000,
            ..Segment::open(at(10), TimerStatus::Running)
        });
        session.total_elapsed = 7000;

        db.save_session(&session).unwrap();
        let loaded = db.load_sessions().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&session.ticket_number], session);
    }

    #[test]
    fn save_replaces_previous_segments() {
        let mut db = Database::open_in_memory().unwrap();
        let mut session = paused_session("PROJ-2");
        db.save_session(&session).unwrap();

        session.sessions.truncate(0);
        session.total_elapsed = 0;
        session.status = TimerStatus::Queue;
        db.save_session(&session).unwrap();

        let loaded = db.load_sessions().unwrap();
        assert!(loaded[&session.ticket_number].sessions.is_empty());
        assert_eq!(loaded[&session.ticket_number].status, TimerStatus::Queue);
    }

    #[test]
    fn delete_cascades_to_segments() {
        let mut db = Database::open_in_memory().unwrap();
        let session = paused_session("PROJ-3");
        db.save_session(&session).unwrap();

        assert!(db.delete_session(&session.ticket_number).unwrap());
        assert!(!db.delete_session(&session.ticket_number).unwrap());

        let segment_rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM segments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(segment_rows, 0);
    }

    #[test]
    fn clear_removes_all_sessions() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_session(&paused_session("PROJ-4")).unwrap();
        db.save_session(&paused_session("PROJ-5")).unwrap();

        assert_eq!(db.clear_sessions().unwrap(), 2);
        assert!(db.load_sessions().unwrap().is_empty());
    }

    #[test]
    fn invalid_status_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO timer_sessions (ticket_number, ticket_name, status, updated_at)
                 VALUES ('PROJ-6', 'x', 'asleep', '2025-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();

        let err = db.load_sessions().unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord { ref ticket, .. } if ticket == "PROJ-6"));
    }

    #[test]
    fn snapshot_export_import_roundtrip() {
        let mut source = Database::open_in_memory().unwrap();
        source.save_session(&paused_session("PROJ-7")).unwrap();
        source.save_session(&paused_session("PROJ-8")).unwrap();
        let snapshot = source.export_snapshot().unwrap();

        let document: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(document["PROJ-7"]["ticketName"], "Invoice PDF");
        assert_eq!(document["PROJ-7"]["totalElapsed"], 5000);
        assert_eq!(document["PROJ-7"]["sessions"][0]["duration"], 5000);

        let mut target = Database::open_in_memory().unwrap();
        assert_eq!(target.import_snapshot(&snapshot).unwrap(), 2);
        assert_eq!(target.load_sessions().unwrap(), source.load_sessions().unwrap());
    }

    #[test]
    fn import_rejects_mismatched_keys() {
        let mut db = Database::open_in_memory().unwrap();
        let json = r#"{"PROJ-1": {"ticketNumber": "PROJ-2", "ticketName": "x",
            "status": "paused", "totalElapsed": 0, "sessions": []}}"#;
        let err = db.import_snapshot(json).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn engine_survives_restart_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tk.db");
        let t = ticket("PROJ-9");

        {
            let db = Database::open(&path).unwrap();
            let mut engine = TimerEngine::open(db, EngineOptions::default()).unwrap();
            engine.dispatch(t.clone(), TimerAction::Start(TicketMeta::default()), at(0));
            for _ in 0..3 {
                engine.tick(1000);
            }
        }

        let db = Database::open(&path).unwrap();
        let mut engine = TimerEngine::open(db, EngineOptions::default()).unwrap();
        assert_eq!(engine.active_count(), 1);
        engine.tick(1000);
        engine.dispatch(t.clone(), TimerAction::Pause, at(4));

        let stored = engine.repository().load_sessions().unwrap();
        let session = &stored[&t];
        assert_eq!(session.total_elapsed, 4000);
        assert_eq!(session.status, TimerStatus::Paused);
        assert_eq!(session.sessions[0].end_time, Some(at(4)));
    }

    #[test]
    fn summaries_count_segments() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_session(&paused_session("PROJ-10")).unwrap();

        let summaries = db.list_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].ticket_number, "PROJ-10");
        assert_eq!(summaries[0].status, "paused");
        assert_eq!(summaries[0].segment_count, 1);
        assert_eq!(summaries[0].total_elapsed_ms, 5000);
    }
}
