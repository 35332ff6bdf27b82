//! Transcript persistence.
//!
//! The transcript is append-only: one row per resolved turn plus one
//! metadata row per session.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::TalkTableError;
use crate::session::TurnRecord;

/// Session metadata stored alongside the turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub topic: String,
    pub debater_a_name: String,
    pub debater_a_model: String,
    pub debater_b_name: String,
    pub debater_b_model: String,
}

/// One entry of a replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub speaker_name: String,
    pub model_id: String,
    pub response: String,
}

/// Durable append-only log of turns and session metadata.
pub trait TranscriptStore: Send + Sync {
    /// Insert or replace the metadata row for a session.
    fn append_session(&self, meta: &SessionMeta) -> Result<(), TalkTableError>;

    /// Append one turn. Either the whole record is written or none of it.
    fn append_turn(&self, turn: &TurnRecord) -> Result<(), TalkTableError>;

    /// Responses of a session in turn order.
    fn fetch_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, TalkTableError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    turn_number INTEGER NOT NULL,
    speaker_name TEXT NOT NULL,
    model_used TEXT NOT NULL,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    is_moderator INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversation_log_conversation
    ON conversation_log (conversation_id, turn_number);
CREATE TABLE IF NOT EXISTS conversation_meta (
    conversation_id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    participant_a_name TEXT NOT NULL,
    participant_a_model TEXT NOT NULL,
    participant_b_name TEXT NOT NULL,
    participant_b_model TEXT NOT NULL,
    start_time TEXT NOT NULL
);
";

/// SQLite-backed transcript store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`, including its
    /// parent directory, and make sure the tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TalkTableError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TalkTableError::Persistence(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, TalkTableError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, TalkTableError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TalkTableError> {
        self.conn
            .lock()
            .map_err(|_| TalkTableError::Persistence("connection lock poisoned".to_string()))
    }

    /// Full turn records of a session in turn order.
    pub fn fetch_turns(&self, session_id: &str) -> Result<Vec<TurnRecord>, TalkTableError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, turn_number, speaker_name, model_used, prompt, response,
                    is_moderator, timestamp
             FROM conversation_log
             WHERE conversation_id = ?1
             ORDER BY turn_number ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let timestamp: String = row.get(7)?;
            Ok(TurnRecord {
                session_id: row.get(0)?,
                turn_number: row.get(1)?,
                speaker_name: row.get(2)?,
                model_id: row.get(3)?,
                prompt: row.get(4)?,
                response: row.get(5)?,
                is_moderator: row.get(6)?,
                timestamp: parse_timestamp(&timestamp),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Stored sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionMeta>, TalkTableError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, topic, participant_a_name, participant_a_model,
                    participant_b_name, participant_b_model
             FROM conversation_meta
             ORDER BY start_time DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionMeta {
                session_id: row.get(0)?,
                topic: row.get(1)?,
                debater_a_name: row.get(2)?,
                debater_a_model: row.get(3)?,
                debater_b_name: row.get(4)?,
                debater_b_model: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

impl TranscriptStore for SqliteStore {
    fn append_session(&self, meta: &SessionMeta) -> Result<(), TalkTableError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO conversation_meta
             (conversation_id, topic, participant_a_name, participant_a_model,
              participant_b_name, participant_b_model, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meta.session_id,
                meta.topic,
                meta.debater_a_name,
                meta.debater_a_model,
                meta.debater_b_name,
                meta.debater_b_model,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn append_turn(&self, turn: &TurnRecord) -> Result<(), TalkTableError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversation_log
             (conversation_id, turn_number, speaker_name, model_used, prompt, response,
              is_moderator, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                turn.session_id,
                turn.turn_number,
                turn.speaker_name,
                turn.model_id,
                turn.prompt,
                turn.response,
                turn.is_moderator,
                turn.timestamp.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn fetch_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, TalkTableError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT speaker_name, model_used, response
             FROM conversation_log
             WHERE conversation_id = ?1
             ORDER BY turn_number ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(HistoryEntry {
                speaker_name: row.get(0)?,
                model_id: row.get(1)?,
                response: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(session: &str, number: u32, speaker: &str, response: &str, moderator: bool) -> TurnRecord {
        TurnRecord {
            session_id: session.to_string(),
            turn_number: number,
            speaker_name: speaker.to_string(),
            model_id: format!("{}-model", speaker),
            prompt: "prompt".to_string(),
            response: response.to_string(),
            is_moderator: moderator,
            timestamp: Utc::now(),
        }
    }

    fn meta(session: &str, topic: &str) -> SessionMeta {
        SessionMeta {
            session_id: session.to_string(),
            topic: topic.to_string(),
            debater_a_name: "Alice".to_string(),
            debater_a_model: "m1".to_string(),
            debater_b_name: "Bob".to_string(),
            debater_b_model: "m2".to_string(),
        }
    }

    #[test]
    fn test_turn_round_trip_keeps_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = turn("s1", 1, "Alice", "Test response", false);
        store.append_turn(&record).unwrap();

        let turns = store.fetch_turns("s1").unwrap();
        assert_eq!(turns.len(), 1);
        let stored = &turns[0];
        assert_eq!(stored.session_id, "s1");
        assert_eq!(stored.turn_number, 1);
        assert_eq!(stored.speaker_name, "Alice");
        assert_eq!(stored.model_id, "Alice-model");
        assert_eq!(stored.prompt, "prompt");
        assert_eq!(stored.response, "Test response");
        assert!(!stored.is_moderator);
        assert_eq!(stored.timestamp.timestamp(), record.timestamp.timestamp());
    }

    #[test]
    fn test_history_is_ordered_by_turn_number_then_insertion() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_turn(&turn("s1", 0, "MC", "intro", true)).unwrap();
        store.append_turn(&turn("s1", 0, "MC", "open", true)).unwrap();
        store.append_turn(&turn("s1", 2, "Bob", "second", false)).unwrap();
        store.append_turn(&turn("s1", 1, "Alice", "first", false)).unwrap();
        store.append_turn(&turn("other", 1, "Zed", "elsewhere", false)).unwrap();

        let history = store.fetch_history("s1").unwrap();
        let responses: Vec<&str> = history.iter().map(|h| h.response.as_str()).collect();
        assert_eq!(responses, vec!["intro", "open", "first", "second"]);
        assert_eq!(history[2].speaker_name, "Alice");
        assert_eq!(history[2].model_id, "Alice-model");
    }

    #[test]
    fn test_append_session_is_idempotent_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_session(&meta("s1", "first topic")).unwrap();
        store.append_session(&meta("s1", "second topic")).unwrap();
        store.append_session(&meta("s2", "other")).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
        assert_eq!(s1.topic, "second topic");
        assert_eq!(s1.debater_b_name, "Bob");
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("conversation.db");
        let store = SqliteStore::open(&path).unwrap();
        store.append_turn(&turn("s1", 1, "Alice", "hi", false)).unwrap();
        assert!(path.exists());

        drop(store);
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.fetch_history("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_session_has_empty_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.fetch_history("nope").unwrap().is_empty());
    }
}
