//! `conversations` — per-session turn log with dense, monotonic turn numbers.
//!
//! ## Schema (v1)
//! - `conversations` — one row per session (`session_id` unique).
//! - `conversation_turns` — one row per user↔assistant exchange;
//!   `UNIQUE(conversation_id, turn_number)`, numbers form a dense `0..n-1`
//!   prefix.
//!
//! `save_turn` runs inside an IMMEDIATE transaction: combined with the
//! busy-timeout pragma, concurrent writers to the same session serialize and
//! each observes the committed maximum before choosing the next number.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY,
            session_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS conversation_turns (
            id INTEGER PRIMARY KEY,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            turn_number INTEGER NOT NULL,
            user_query TEXT NOT NULL,
            agent_response TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            guardrail_score INTEGER,
            retrieval_attempts INTEGER NOT NULL DEFAULT 0,
            rewritten_query TEXT,
            sources TEXT NOT NULL DEFAULT '[]',
            reasoning_steps TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            UNIQUE(conversation_id, turn_number)
        );

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| AppError::Store(format!("conversations: initialize schema: {e}")))
}

fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("conversations: open {}: {e}", db_path.display())))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Store(format!("conversations: set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Store(format!("conversations: set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Store(format!("conversations: set busy_timeout: {e}")))?;
    Ok(conn)
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Public types ──────────────────────────────────────────────────────────────

/// One cited source attached to a turn (and to `sources` stream events).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceRecord {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    /// Fused relevance score in `[0, 1]`.
    pub relevance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_graded_relevant: Option<bool>,
}

/// Input to [`ConversationStore::save_turn`].
#[derive(Debug, Clone)]
pub struct TurnData {
    pub user_query: String,
    pub agent_response: String,
    pub provider: String,
    pub model: String,
    pub guardrail_score: Option<u8>,
    pub retrieval_attempts: u32,
    pub rewritten_query: Option<String>,
    pub sources: Vec<SourceRecord>,
    pub reasoning_steps: Vec<String>,
}

/// A session row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationRecord {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted turn, as returned to API callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationTurnRecord {
    pub turn_number: u32,
    pub user_query: String,
    pub agent_response: String,
    pub provider: String,
    pub model: String,
    pub guardrail_score: Option<u8>,
    pub retrieval_attempts: u32,
    pub rewritten_query: Option<String>,
    pub sources: Vec<SourceRecord>,
    pub reasoning_steps: Vec<String>,
    pub created_at: String,
}

/// Session listing item: identity, activity stamps, and a preview of the
/// latest query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub last_query: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ── ConversationStore ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConversationStore {
    db_path: PathBuf,
}

impl ConversationStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("conversations: cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = Self { db_path: db_path.to_path_buf() };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = open_conn(&self.db_path)?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("conversations: read schema version: {e}")))?;
        if version == 0 {
            init_schema(&conn)?;
            return Ok(());
        }
        if version != SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "conversations: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    /// Get the session row, creating it when absent. Idempotent.
    pub fn get_or_create(&self, session_id: &str) -> Result<ConversationRecord, AppError> {
        let mut conn = open_conn(&self.db_path)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Store(format!("conversations: begin tx: {e}")))?;
        let record = Self::get_or_create_tx(&tx, session_id)?;
        tx.commit()
            .map_err(|e| AppError::Store(format!("conversations: commit get_or_create: {e}")))?;
        Ok(record)
    }

    fn get_or_create_tx(
        tx: &rusqlite::Transaction<'_>,
        session_id: &str,
    ) -> Result<ConversationRecord, AppError> {
        let now = now_iso8601();
        tx.execute(
            "INSERT OR IGNORE INTO conversations (session_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![session_id, now],
        )
        .map_err(|e| AppError::Store(format!("conversations: insert {session_id}: {e}")))?;
        tx.query_row(
            "SELECT session_id, created_at, updated_at FROM conversations WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(ConversationRecord {
                    session_id: row.get(0)?,
                    created_at: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .map_err(|e| AppError::Store(format!("conversations: load {session_id}: {e}")))
    }

    /// Most recent `limit` turns in chronological order (oldest → newest).
    /// Unknown sessions return an empty list, not an error.
    pub fn get_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurnRecord>, AppError> {
        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT t.turn_number, t.user_query, t.agent_response, t.provider, t.model,
                        t.guardrail_score, t.retrieval_attempts, t.rewritten_query,
                        t.sources, t.reasoning_steps, t.created_at
                 FROM conversation_turns t
                 JOIN conversations c ON c.id = t.conversation_id
                 WHERE c.session_id = ?1
                 ORDER BY t.turn_number DESC
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Store(format!("conversations: prepare history: {e}")))?;

        let rows = stmt
            .query_map(params![session_id, limit as i64], row_to_turn)
            .map_err(|e| AppError::Store(format!("conversations: query history: {e}")))?;

        let mut turns: Vec<ConversationTurnRecord> = rows
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Store(format!("conversations: history row: {e}")))?;
        turns.reverse();
        debug!(session_id, turns = turns.len(), "history loaded");
        Ok(turns)
    }

    /// Persist one turn.
    ///
    /// The next `turn_number` is `max(existing) + 1` or 0, chosen inside the
    /// same IMMEDIATE transaction that inserts the row, so concurrent calls
    /// for one session produce distinct, strictly increasing numbers with no
    /// gaps. Also bumps `conversations.updated_at`.
    pub fn save_turn(
        &self,
        session_id: &str,
        turn: &TurnData,
    ) -> Result<ConversationTurnRecord, AppError> {
        if turn.user_query.trim().is_empty() {
            return Err(AppError::Store("conversations: user_query must not be empty".into()));
        }
        if turn.agent_response.trim().is_empty() {
            return Err(AppError::Store("conversations: agent_response must not be empty".into()));
        }

        let sources = serde_json::to_string(&turn.sources)
            .map_err(|e| AppError::Store(format!("conversations: serialize sources: {e}")))?;
        let reasoning = serde_json::to_string(&turn.reasoning_steps)
            .map_err(|e| AppError::Store(format!("conversations: serialize reasoning: {e}")))?;

        let mut conn = open_conn(&self.db_path)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Store(format!("conversations: begin save tx: {e}")))?;

        Self::get_or_create_tx(&tx, session_id)?;

        let conversation_id: i64 = tx
            .query_row(
                "SELECT id FROM conversations WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Store(format!("conversations: resolve {session_id}: {e}")))?;

        let max_turn: Option<i64> = tx
            .query_row(
                "SELECT MAX(turn_number) FROM conversation_turns WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Store(format!("conversations: max turn: {e}")))?;
        let turn_number = max_turn.map(|n| n + 1).unwrap_or(0);
        let now = now_iso8601();

        tx.execute(
            "INSERT INTO conversation_turns (conversation_id, turn_number, user_query,
                    agent_response, provider, model, guardrail_score, retrieval_attempts,
                    rewritten_query, sources, reasoning_steps, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                conversation_id,
                turn_number,
                turn.user_query,
                turn.agent_response,
                turn.provider,
                turn.model,
                turn.guardrail_score,
                turn.retrieval_attempts,
                turn.rewritten_query,
                sources,
                reasoning,
                now,
            ],
        )
        .map_err(|e| AppError::Store(format!("conversations: insert turn: {e}")))?;

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now, conversation_id],
        )
        .map_err(|e| AppError::Store(format!("conversations: touch updated_at: {e}")))?;

        tx.commit()
            .map_err(|e| AppError::Store(format!("conversations: commit save: {e}")))?;

        debug!(session_id, turn_number, "turn saved");

        Ok(ConversationTurnRecord {
            turn_number: turn_number as u32,
            user_query: turn.user_query.clone(),
            agent_response: turn.agent_response.clone(),
            provider: turn.provider.clone(),
            model: turn.model.clone(),
            guardrail_score: turn.guardrail_score,
            retrieval_attempts: turn.retrieval_attempts,
            rewritten_query: turn.rewritten_query.clone(),
            sources: turn.sources.clone(),
            reasoning_steps: turn.reasoning_steps.clone(),
            created_at: now,
        })
    }

    /// Full detail for one session: the row plus every turn in order.
    /// `None` when the session does not exist.
    pub fn get_conversation(
        &self,
        session_id: &str,
    ) -> Result<Option<(ConversationRecord, Vec<ConversationTurnRecord>)>, AppError> {
        let conn = open_conn(&self.db_path)?;
        let record = conn
            .query_row(
                "SELECT session_id, created_at, updated_at FROM conversations WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(ConversationRecord {
                        session_id: row.get(0)?,
                        created_at: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(AppError::Store(format!("conversations: load {session_id}: {other}"))),
            })?;

        let Some(record) = record else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT t.turn_number, t.user_query, t.agent_response, t.provider, t.model,
                        t.guardrail_score, t.retrieval_attempts, t.rewritten_query,
                        t.sources, t.reasoning_steps, t.created_at
                 FROM conversation_turns t
                 JOIN conversations c ON c.id = t.conversation_id
                 WHERE c.session_id = ?1
                 ORDER BY t.turn_number",
            )
            .map_err(|e| AppError::Store(format!("conversations: prepare detail: {e}")))?;
        let rows = stmt
            .query_map(params![session_id], row_to_turn)
            .map_err(|e| AppError::Store(format!("conversations: query detail: {e}")))?;
        let turns = rows
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Store(format!("conversations: detail row: {e}")))?;
        Ok(Some((record, turns)))
    }

    /// Paginated session listing, most recently updated first.
    pub fn list_sessions(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<SessionSummary>, usize), AppError> {
        let conn = open_conn(&self.db_path)?;

        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("conversations: count sessions: {e}")))?;

        let mut stmt = conn
            .prepare(
                "SELECT c.session_id, c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM conversation_turns t WHERE t.conversation_id = c.id),
                        (SELECT t.user_query FROM conversation_turns t
                          WHERE t.conversation_id = c.id
                          ORDER BY t.turn_number DESC LIMIT 1)
                 FROM conversations c
                 ORDER BY c.updated_at DESC, c.id DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| AppError::Store(format!("conversations: prepare list: {e}")))?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(SessionSummary {
                    session_id: row.get(0)?,
                    created_at: row.get(1)?,
                    updated_at: row.get(2)?,
                    turn_count: row.get::<_, i64>(3)? as usize,
                    last_query: row.get(4)?,
                })
            })
            .map_err(|e| AppError::Store(format!("conversations: query list: {e}")))?;

        let sessions = rows
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Store(format!("conversations: list row: {e}")))?;
        Ok((sessions, total as usize))
    }

    /// Delete a session and its turns. Returns the number of deleted turns,
    /// or `None` when the session does not exist.
    pub fn delete(&self, session_id: &str) -> Result<Option<usize>, AppError> {
        let mut conn = open_conn(&self.db_path)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Store(format!("conversations: begin delete tx: {e}")))?;

        let conversation_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM conversations WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(AppError::Store(format!("conversations: lookup {session_id}: {other}"))),
            })?;

        let Some(conversation_id) = conversation_id else {
            return Ok(None);
        };

        let deleted = tx
            .execute(
                "DELETE FROM conversation_turns WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .map_err(|e| AppError::Store(format!("conversations: delete turns: {e}")))?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", params![conversation_id])
            .map_err(|e| AppError::Store(format!("conversations: delete session: {e}")))?;
        tx.commit()
            .map_err(|e| AppError::Store(format!("conversations: commit delete: {e}")))?;

        Ok(Some(deleted))
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurnRecord> {
    let sources_json: String = row.get(8)?;
    let reasoning_json: String = row.get(9)?;
    Ok(ConversationTurnRecord {
        turn_number: row.get::<_, i64>(0)? as u32,
        user_query: row.get(1)?,
        agent_response: row.get(2)?,
        provider: row.get(3)?,
        model: row.get(4)?,
        guardrail_score: row.get::<_, Option<i64>>(5)?.map(|v| v as u8),
        retrieval_attempts: row.get::<_, i64>(6)? as u32,
        rewritten_query: row.get(7)?,
        sources: serde_json::from_str(&sources_json).unwrap_or_default(),
        reasoning_steps: serde_json::from_str(&reasoning_json).unwrap_or_default(),
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, ConversationStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = ConversationStore::open(&temp.path().join("conversations.db")).expect("open");
        (temp, store)
    }

    fn turn(query: &str, response: &str) -> TurnData {
        TurnData {
            user_query: query.to_string(),
            agent_response: response.to_string(),
            provider: "dummy".to_string(),
            model: "dummy".to_string(),
            guardrail_score: Some(90),
            retrieval_attempts: 1,
            rewritten_query: None,
            sources: Vec::new(),
            reasoning_steps: vec!["step".to_string()],
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (_tmp, store) = make_store();
        let a = store.get_or_create("s1").expect("create");
        let b = store.get_or_create("s1").expect("reuse");
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.created_at, b.created_at);
    }

    #[test]
    fn turn_numbers_are_dense_from_zero() {
        let (_tmp, store) = make_store();
        for i in 0..4 {
            let saved = store.save_turn("s1", &turn(&format!("q{i}"), "a")).expect("save");
            assert_eq!(saved.turn_number, i);
        }
        let history = store.get_history("s1", 10).expect("history");
        let numbers: Vec<u32> = history.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn history_is_chronological_and_windowed() {
        let (_tmp, store) = make_store();
        for i in 0..5 {
            store.save_turn("s1", &turn(&format!("q{i}"), "a")).expect("save");
        }
        let history = store.get_history("s1", 2).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_query, "q3");
        assert_eq!(history[1].user_query, "q4");
    }

    #[test]
    fn unknown_session_history_is_empty() {
        let (_tmp, store) = make_store();
        assert!(store.get_history("nope", 5).expect("history").is_empty());
    }

    #[test]
    fn empty_query_or_response_rejected() {
        let (_tmp, store) = make_store();
        assert!(store.save_turn("s1", &turn("", "a")).is_err());
        assert!(store.save_turn("s1", &turn("q", "  ")).is_err());
    }

    #[test]
    fn sources_round_trip() {
        let (_tmp, store) = make_store();
        let mut t = turn("q", "a");
        t.sources = vec![SourceRecord {
            arxiv_id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            authors: vec!["Vaswani".to_string()],
            pdf_url: Some("https://arxiv.org/pdf/1706.03762.pdf".to_string()),
            relevance_score: 1.0,
            published_date: Some("2017-06-12".to_string()),
            was_graded_relevant: Some(true),
        }];
        store.save_turn("s1", &t).expect("save");
        let history = store.get_history("s1", 1).expect("history");
        assert_eq!(history[0].sources.len(), 1);
        assert_eq!(history[0].sources[0].arxiv_id, "1706.03762");
        assert_eq!(history[0].sources[0].was_graded_relevant, Some(true));
    }

    #[test]
    fn list_sessions_carries_counts_and_last_query() {
        let (_tmp, store) = make_store();
        store.save_turn("s1", &turn("first", "a")).expect("save");
        store.save_turn("s1", &turn("second", "a")).expect("save");
        store.save_turn("s2", &turn("other", "a")).expect("save");

        let (sessions, total) = store.list_sessions(0, 10).expect("list");
        assert_eq!(total, 2);
        let s1 = sessions.iter().find(|s| s.session_id == "s1").expect("s1 present");
        assert_eq!(s1.turn_count, 2);
        assert_eq!(s1.last_query.as_deref(), Some("second"));
    }

    #[test]
    fn delete_cascades_turns() {
        let (_tmp, store) = make_store();
        store.save_turn("s1", &turn("q1", "a")).expect("save");
        store.save_turn("s1", &turn("q2", "a")).expect("save");

        let deleted = store.delete("s1").expect("delete");
        assert_eq!(deleted, Some(2));
        assert!(store.get_history("s1", 10).expect("history").is_empty());
        assert!(store.delete("s1").expect("second delete").is_none());
    }

    #[test]
    fn concurrent_saves_produce_dense_numbers() {
        let (_tmp, store) = make_store();
        store.get_or_create("s1").expect("create");

        let mut handles = Vec::new();
        for w in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..5 {
                    store
                        .save_turn("s1", &turn(&format!("w{w}-q{i}"), "a"))
                        .expect("concurrent save");
                }
            }));
        }
        for h in handles {
            h.join().expect("join");
        }

        let history = store.get_history("s1", 100).expect("history");
        let numbers: Vec<u32> = history.iter().map(|t| t.turn_number).collect();
        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(numbers, expected);
    }
}
