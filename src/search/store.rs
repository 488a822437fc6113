//! `store` — SQLite-backed paper and chunk store.
//!
//! ## Schema (v1)
//! - `papers` — one row per paper; list-valued fields (`authors`,
//!   `categories`, `sections`) are stored as JSON text.
//! - `chunks` — retrievable fragments; `embedding` is a little-endian f32
//!   array of the dimension the store was opened with;
//!   `UNIQUE(paper_id, chunk_index)`.
//! - `chunk_fts` — FTS5 virtual table over `chunk_text`, kept in sync on
//!   insert/delete; provides the BM25 lexical branch of hybrid search.
//!
//! Ingestion proper (PDF fetch, parsing, chunking, embedding) lives outside
//! this crate; [`upsert_paper`](PaperStore::upsert_paper) and
//! [`insert_chunks`](PaperStore::insert_chunks) are the seam it writes
//! through. Re-upserting a paper drops its chunks (reprocess semantics).

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::warn;

use crate::error::AppError;

/// Schema version stored in `PRAGMA user_version`.
/// Increment when the DDL changes; add a migration path in `init_db`.
const SCHEMA_VERSION: i64 = 1;

/// Execute the v1 schema DDL on a freshly-opened SQLite connection.
fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS papers (
            id INTEGER PRIMARY KEY,
            arxiv_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            authors TEXT NOT NULL,
            abstract_text TEXT NOT NULL DEFAULT '',
            categories TEXT NOT NULL DEFAULT '[]',
            published_date TEXT,
            pdf_url TEXT,
            raw_text TEXT NOT NULL DEFAULT '',
            sections TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY,
            paper_id INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
            arxiv_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            section_name TEXT,
            page_number INTEGER,
            word_count INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(paper_id, chunk_index)
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
            chunk_id UNINDEXED,
            chunk_text
        );

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| AppError::Store(format!("papers: initialize schema: {e}")))
}

/// Open a SQLite connection to `db_path` and apply recommended pragmas.
///
/// - `journal_mode = WAL` — concurrent readers alongside a writer.
/// - `foreign_keys = ON` — cascade chunk deletion with papers.
/// - `busy_timeout = 5000` — wait up to 5 s before returning `SQLITE_BUSY`.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("papers: open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Store(format!("papers: set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Store(format!("papers: set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Store(format!("papers: set busy_timeout: {e}")))?;

    Ok(conn)
}

/// Return the current UTC time as an RFC 3339 string with second precision.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Escape a user-supplied string for use in an FTS5 `MATCH` query.
///
/// FTS5 parses the argument to `MATCH` with its own mini-language, so
/// characters like `?`, `"`, `(`, etc. are significant. Parameter binding
/// only protects against SQL injection, not FTS syntax errors. Tokens
/// containing a non-alphanumeric character are wrapped in double-quotes with
/// internal quotes doubled.
pub(crate) fn escape_fts5_query(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for token in query.split_whitespace() {
        if !escaped.is_empty() {
            escaped.push(' ');
        }
        if token.chars().all(char::is_alphanumeric) {
            escaped.push_str(token);
            continue;
        }
        escaped.push('"');
        for c in token.chars() {
            if c == '"' {
                escaped.push('"');
            }
            escaped.push(c);
        }
        escaped.push('"');
    }
    escaped
}

/// Serialize an embedding as little-endian f32 bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Deserialize a little-endian f32 blob back into a vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ── Public types ──────────────────────────────────────────────────────────────

/// A named section of a paper.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Section {
    pub name: String,
    pub page: Option<u32>,
    pub text: String,
}

/// A paper as written by ingestion and read back by tools.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PaperRecord {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_date: Option<String>,
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// Lightweight paper descriptor returned by [`PaperStore::list_papers`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaperSummary {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_date: Option<String>,
    pub pdf_url: Option<String>,
    pub chunk_count: usize,
}

/// A chunk to index, produced by ingestion.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: u32,
    pub chunk_text: String,
    pub section_name: Option<String>,
    pub page_number: Option<u32>,
    pub embedding: Vec<f32>,
}

/// Filters shared by hybrid search and paper listing.
#[derive(Debug, Clone, Default)]
pub struct PaperFilters {
    /// Keep papers carrying at least one of these category tags.
    pub categories: Option<Vec<String>>,
    /// Inclusive lower bound on `published_date`.
    pub published_from: Option<String>,
    /// Inclusive upper bound on `published_date`.
    pub published_to: Option<String>,
    /// Restrict to these arxiv ids.
    pub arxiv_ids: Option<Vec<String>>,
}

impl PaperFilters {
    pub fn is_empty(&self) -> bool {
        self.categories.is_none()
            && self.published_from.is_none()
            && self.published_to.is_none()
            && self.arxiv_ids.is_none()
    }

    fn matches(&self, categories: &[String], published_date: Option<&str>, arxiv_id: &str) -> bool {
        if let Some(wanted) = &self.categories {
            if !wanted.iter().any(|w| categories.iter().any(|c| c == w)) {
                return false;
            }
        }
        if let Some(from) = &self.published_from {
            match published_date {
                Some(d) if d >= from.as_str() => {}
                _ => return false,
            }
        }
        if let Some(to) = &self.published_to {
            match published_date {
                Some(d) if d <= to.as_str() => {}
                _ => return false,
            }
        }
        if let Some(ids) = &self.arxiv_ids {
            if !ids.iter().any(|i| i == arxiv_id) {
                return false;
            }
        }
        true
    }
}

/// One hybrid-search hit: chunk text plus the paper metadata the caller
/// needs to build source records.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub arxiv_id: String,
    pub chunk_index: u32,
    pub title: String,
    pub authors: Vec<String>,
    pub chunk_text: String,
    pub section_name: Option<String>,
    pub page_number: Option<u32>,
    /// Fused relevance score in `[0, 1]`.
    pub score: f64,
    pub published_date: Option<String>,
    pub pdf_url: Option<String>,
}

/// A candidate for the vector branch: chunk id, owning paper id, embedding.
#[derive(Debug)]
pub(crate) struct ChunkCandidate {
    pub chunk_id: i64,
    pub arxiv_id: String,
    pub embedding: Vec<f32>,
}

// ── PaperStore ────────────────────────────────────────────────────────────────

/// SQLite-backed store for papers and their retrievable chunks.
///
/// Connections are opened per operation (WAL keeps readers cheap); write
/// operations run inside a transaction.
#[derive(Debug, Clone)]
pub struct PaperStore {
    db_path: PathBuf,
    /// Expected embedding dimension; inserts with a different length fail.
    dimension: usize,
}

impl PaperStore {
    /// Open (or create) the store at `db_path`.
    ///
    /// `dimension` must match the embedding service's advertised dimension;
    /// it is enforced on every chunk insert.
    pub fn open(db_path: &Path, dimension: usize) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("papers: cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = Self { db_path: db_path.to_path_buf(), dimension };
        store.init_db()?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Initialise or validate the SQLite schema.
    fn init_db(&self) -> Result<(), AppError> {
        let conn = open_conn(&self.db_path)?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("papers: read schema version: {e}")))?;

        if version == 0 {
            init_schema(&conn)?;
            return Ok(());
        }
        if version != SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "papers: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    // ── Paper management ──────────────────────────────────────────────────

    /// Insert a paper, or replace it when the `arxiv_id` already exists.
    ///
    /// Replacing drops the existing chunks (forced-reprocess semantics) and
    /// keeps the original `created_at`. Returns the paper's row id.
    pub fn upsert_paper(&self, paper: &PaperRecord) -> Result<i64, AppError> {
        let authors = serde_json::to_string(&paper.authors)
            .map_err(|e| AppError::Store(format!("papers: serialize authors: {e}")))?;
        let categories = serde_json::to_string(&paper.categories)
            .map_err(|e| AppError::Store(format!("papers: serialize categories: {e}")))?;
        let sections = serde_json::to_string(&paper.sections)
            .map_err(|e| AppError::Store(format!("papers: serialize sections: {e}")))?;
        let now = now_iso8601();

        let mut conn = open_conn(&self.db_path)?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("papers: begin upsert tx: {e}")))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM papers WHERE arxiv_id = ?1",
                params![paper.arxiv_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(AppError::Store(format!("papers: lookup {}: {other}", paper.arxiv_id))),
            })?;

        let paper_id = if let Some(id) = existing {
            tx.execute(
                "UPDATE papers SET title = ?1, authors = ?2, abstract_text = ?3, categories = ?4,
                        published_date = ?5, pdf_url = ?6, raw_text = ?7, sections = ?8, updated_at = ?9
                 WHERE id = ?10",
                params![
                    paper.title,
                    authors,
                    paper.abstract_text,
                    categories,
                    paper.published_date,
                    paper.pdf_url,
                    paper.raw_text,
                    sections,
                    now,
                    id,
                ],
            )
            .map_err(|e| AppError::Store(format!("papers: update {}: {e}", paper.arxiv_id)))?;
            // Reprocess: stale chunks must not survive the new text.
            self.delete_chunks_tx(&tx, id)?;
            id
        } else {
            tx.execute(
                "INSERT INTO papers (arxiv_id, title, authors, abstract_text, categories,
                        published_date, pdf_url, raw_text, sections, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    paper.arxiv_id,
                    paper.title,
                    authors,
                    paper.abstract_text,
                    categories,
                    paper.published_date,
                    paper.pdf_url,
                    paper.raw_text,
                    sections,
                    now,
                    now,
                ],
            )
            .map_err(|e| AppError::Store(format!("papers: insert {}: {e}", paper.arxiv_id)))?;
            tx.last_insert_rowid()
        };

        tx.commit()
            .map_err(|e| AppError::Store(format!("papers: commit upsert: {e}")))?;
        Ok(paper_id)
    }

    fn delete_chunks_tx(&self, tx: &rusqlite::Transaction<'_>, paper_id: i64) -> Result<(), AppError> {
        tx.execute(
            "DELETE FROM chunk_fts WHERE chunk_id IN (SELECT id FROM chunks WHERE paper_id = ?1)",
            params![paper_id],
        )
        .map_err(|e| AppError::Store(format!("papers: clear fts for paper {paper_id}: {e}")))?;
        tx.execute("DELETE FROM chunks WHERE paper_id = ?1", params![paper_id])
            .map_err(|e| AppError::Store(format!("papers: clear chunks for paper {paper_id}: {e}")))?;
        Ok(())
    }

    /// Index chunks for a paper, replacing any previously indexed set.
    ///
    /// Rejects embeddings whose length differs from the store's dimension.
    pub fn insert_chunks(&self, arxiv_id: &str, chunks: &[NewChunk]) -> Result<(), AppError> {
        for c in chunks {
            if c.embedding.len() != self.dimension {
                return Err(AppError::Store(format!(
                    "papers: chunk {} of {arxiv_id} has embedding dimension {}, expected {}",
                    c.chunk_index,
                    c.embedding.len(),
                    self.dimension
                )));
            }
        }

        let mut conn = open_conn(&self.db_path)?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("papers: begin index tx: {e}")))?;

        let paper_id: i64 = tx
            .query_row(
                "SELECT id FROM papers WHERE arxiv_id = ?1",
                params![arxiv_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Store(format!("papers: unknown paper {arxiv_id}: {e}")))?;

        self.delete_chunks_tx(&tx, paper_id)?;

        for c in chunks {
            let word_count = c.chunk_text.split_whitespace().count() as i64;
            tx.execute(
                "INSERT INTO chunks (paper_id, arxiv_id, chunk_index, chunk_text, section_name,
                        page_number, word_count, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    paper_id,
                    arxiv_id,
                    c.chunk_index,
                    c.chunk_text,
                    c.section_name,
                    c.page_number,
                    word_count,
                    embedding_to_blob(&c.embedding),
                ],
            )
            .map_err(|e| AppError::Store(format!("papers: insert chunk: {e}")))?;
            let chunk_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chunk_fts (chunk_id, chunk_text) VALUES (?1, ?2)",
                params![chunk_id, c.chunk_text],
            )
            .map_err(|e| AppError::Store(format!("papers: insert fts row: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Store(format!("papers: commit index: {e}")))?;
        Ok(())
    }

    /// Load one paper in full by its `arxiv_id`. `None` when unknown.
    pub fn get_paper(&self, arxiv_id: &str) -> Result<Option<PaperRecord>, AppError> {
        let conn = open_conn(&self.db_path)?;
        conn.query_row(
            "SELECT arxiv_id, title, authors, abstract_text, categories, published_date,
                    pdf_url, raw_text, sections
             FROM papers WHERE arxiv_id = ?1",
            params![arxiv_id],
            |row| {
                let authors: String = row.get(2)?;
                let categories: String = row.get(4)?;
                let sections: String = row.get(8)?;
                Ok(PaperRecord {
                    arxiv_id: row.get(0)?,
                    title: row.get(1)?,
                    authors: serde_json::from_str(&authors).unwrap_or_default(),
                    abstract_text: row.get(3)?,
                    categories: serde_json::from_str(&categories).unwrap_or_default(),
                    published_date: row.get(5)?,
                    pdf_url: row.get(6)?,
                    raw_text: row.get(7)?,
                    sections: serde_json::from_str(&sections).unwrap_or_default(),
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::Store(format!("papers: get {arxiv_id}: {other}"))),
        })
    }

    /// List papers matching `filters`, newest first, with the unfiltered-match
    /// total for pagination.
    pub fn list_papers(
        &self,
        filters: &PaperFilters,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PaperSummary>, usize), AppError> {
        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT p.arxiv_id, p.title, p.authors, p.categories, p.published_date, p.pdf_url,
                        (SELECT COUNT(*) FROM chunks c WHERE c.paper_id = p.id)
                 FROM papers p
                 ORDER BY p.published_date DESC, p.arxiv_id DESC",
            )
            .map_err(|e| AppError::Store(format!("papers: prepare list: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let authors: String = row.get(2)?;
                let categories: String = row.get(3)?;
                Ok(PaperSummary {
                    arxiv_id: row.get(0)?,
                    title: row.get(1)?,
                    authors: serde_json::from_str(&authors).unwrap_or_default(),
                    categories: serde_json::from_str(&categories).unwrap_or_default(),
                    published_date: row.get(4)?,
                    pdf_url: row.get(5)?,
                    chunk_count: row.get::<_, i64>(6)? as usize,
                })
            })
            .map_err(|e| AppError::Store(format!("papers: query list: {e}")))?;

        let all: Vec<PaperSummary> = rows
            .filter_map(|r| r.ok())
            .filter(|p| filters.matches(&p.categories, p.published_date.as_deref(), &p.arxiv_id))
            .collect();

        let total = all.len();
        let page = all.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    // ── Search branches ───────────────────────────────────────────────────

    /// All chunks passing `filters`, with embeddings, for the vector branch.
    pub(crate) fn chunk_candidates(
        &self,
        filters: &PaperFilters,
    ) -> Result<Vec<ChunkCandidate>, AppError> {
        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.arxiv_id, c.embedding, p.categories, p.published_date
                 FROM chunks c
                 JOIN papers p ON p.id = c.paper_id
                 ORDER BY c.id",
            )
            .map_err(|e| AppError::Store(format!("papers: prepare candidates: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(2)?;
                let categories: String = row.get(3)?;
                let published: Option<String> = row.get(4)?;
                Ok((
                    ChunkCandidate {
                        chunk_id: row.get(0)?,
                        arxiv_id: row.get(1)?,
                        embedding: blob_to_embedding(&blob),
                    },
                    serde_json::from_str::<Vec<String>>(&categories).unwrap_or_default(),
                    published,
                ))
            })
            .map_err(|e| AppError::Store(format!("papers: query candidates: {e}")))?;

        let mut candidates = Vec::new();
        for row in rows {
            let (candidate, categories, published) =
                row.map_err(|e| AppError::Store(format!("papers: candidate row: {e}")))?;
            if filters.matches(&categories, published.as_deref(), &candidate.arxiv_id) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    /// BM25 lexical search over the FTS index, filtered, best first.
    ///
    /// Returns `(chunk_id, bm25_score)` pairs. FTS5 syntax errors from
    /// unusual queries yield an empty list rather than an error.
    pub(crate) fn lexical_search(
        &self,
        query: &str,
        filters: &PaperFilters,
        limit: usize,
    ) -> Result<Vec<(i64, f64)>, AppError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT chunk_fts.chunk_id, bm25(chunk_fts) AS rank,
                        p.categories, p.published_date, c.arxiv_id
                 FROM chunk_fts
                 JOIN chunks c ON c.id = chunk_fts.chunk_id
                 JOIN papers p ON p.id = c.paper_id
                 WHERE chunk_fts MATCH ?1
                 ORDER BY rank, chunk_fts.chunk_id",
            )
            .map_err(|e| AppError::Store(format!("papers: prepare lexical search: {e}")))?;

        let safe_query = escape_fts5_query(query);
        let rows_result = stmt.query_map(params![safe_query], |row| {
            let score = {
                let s: f64 = row.get(1)?;
                -s // bm25() returns negated relevance; flip so higher is better
            };
            let categories: String = row.get(2)?;
            let published: Option<String> = row.get(3)?;
            let arxiv_id: String = row.get(4)?;
            Ok((
                row.get::<_, i64>(0)?,
                score,
                serde_json::from_str::<Vec<String>>(&categories).unwrap_or_default(),
                published,
                arxiv_id,
            ))
        });

        let rows = match rows_result {
            Ok(r) => r,
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("fts5: syntax error") {
                    warn!(error = %msg, "papers: FTS5 syntax error, returning empty results");
                    return Ok(Vec::new());
                }
                return Err(AppError::Store(format!("papers: execute lexical search: {e}")));
            }
        };

        let mut hits = Vec::new();
        for row in rows {
            // FTS5 may also raise syntax errors lazily, on the first step.
            let (chunk_id, score, categories, published, arxiv_id) = match row {
                Ok(r) => r,
                Err(e) if e.to_string().contains("fts5: syntax error") => {
                    warn!(error = %e, "papers: FTS5 syntax error, returning empty results");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(AppError::Store(format!("papers: lexical row: {e}"))),
            };
            if filters.matches(&categories, published.as_deref(), &arxiv_id) {
                hits.push((chunk_id, score));
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    /// Fetch full hit records for `chunk_ids`, preserving the caller's order.
    pub(crate) fn fetch_hits(&self, chunk_ids: &[i64]) -> Result<Vec<SearchHit>, AppError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = open_conn(&self.db_path)?;
        let placeholders = chunk_ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT c.id, c.arxiv_id, c.chunk_index, c.chunk_text, c.section_name, c.page_number,
                    p.title, p.authors, p.published_date, p.pdf_url
             FROM chunks c
             JOIN papers p ON p.id = c.paper_id
             WHERE c.id IN ({placeholders})"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("papers: prepare fetch hits: {e}")))?;

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            chunk_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

        let rows = stmt
            .query_map(params_ref.as_slice(), |row| {
                let authors: String = row.get(7)?;
                Ok(SearchHit {
                    chunk_id: row.get(0)?,
                    arxiv_id: row.get(1)?,
                    chunk_index: row.get::<_, i64>(2)? as u32,
                    chunk_text: row.get(3)?,
                    section_name: row.get(4)?,
                    page_number: row.get::<_, Option<i64>>(5)?.map(|n| n as u32),
                    title: row.get(6)?,
                    authors: serde_json::from_str(&authors).unwrap_or_default(),
                    score: 0.0,
                    published_date: row.get(8)?,
                    pdf_url: row.get(9)?,
                })
            })
            .map_err(|e| AppError::Store(format!("papers: query fetch hits: {e}")))?;

        let mut by_id: std::collections::HashMap<i64, SearchHit> = rows
            .filter_map(|r| r.ok())
            .map(|h| (h.chunk_id, h))
            .collect();

        Ok(chunk_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
