//! Story history persistence.
//!
//! Every finished request appends one story record and one run record.
//! The orchestrator treats writes as best effort; the query side (history,
//! stats, deletion) is used by the command-line front end.

use crate::agent::{GenerationPath, ToolInvocation};
use crate::persona::StoryConstraints;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One finished story, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    pub constraints: StoryConstraints,
    pub story: String,
    pub path: GenerationPath,
    pub model: String,
    /// Judge score; `None` for fallback stories and unjudged attempts.
    pub score: Option<f32>,
    pub meets_threshold: bool,
    pub iterations: u32,
    /// Judge feedback in the order it was given.
    pub feedback: Vec<String>,
    pub invocations: Vec<ToolInvocation>,
    pub grounding: Vec<String>,
    pub tools_enabled: bool,
    pub quality_threshold: f32,
    pub max_iterations: u32,
}

/// One request, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    pub success: bool,
    pub path: Option<GenerationPath>,
    pub model: Option<String>,
    pub error: Option<String>,
    pub elapsed_secs: f64,
    pub tools_enabled: bool,
}

/// A story record with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStory {
    pub id: i64,
    pub record: StoryRecord,
}

/// Aggregate numbers over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_stories: u64,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub average_score: Option<f64>,
    pub stories_by_model: Vec<(String, u64)>,
    pub tools_enabled_count: u64,
    pub fallback_count: u64,
}

/// Append-only sink the orchestrator writes to.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Store a story and return its id.
    async fn append_story(&self, record: &StoryRecord) -> Result<i64, PersistError>;

    async fn append_run(&self, record: &RunRecord) -> Result<(), PersistError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS stories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        prompt TEXT NOT NULL,
        constraints TEXT NOT NULL,
        story TEXT NOT NULL,
        path TEXT NOT NULL,
        model TEXT NOT NULL,
        score REAL,
        meets_threshold INTEGER NOT NULL,
        iterations INTEGER NOT NULL,
        feedback TEXT NOT NULL DEFAULT '[]',
        invocations TEXT NOT NULL DEFAULT '[]',
        grounding TEXT NOT NULL DEFAULT '[]',
        tools_enabled INTEGER NOT NULL,
        quality_threshold REAL NOT NULL,
        max_iterations INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        prompt TEXT NOT NULL,
        success INTEGER NOT NULL,
        path TEXT,
        model TEXT,
        error TEXT,
        elapsed_secs REAL NOT NULL,
        tools_enabled INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_stories_created ON stories(created_at);
    CREATE INDEX IF NOT EXISTS idx_stories_model ON stories(model);
    CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);
";

const STORY_COLUMNS: &str = "id, request_id, created_at, prompt, constraints, story, path, model, \
     score, meets_threshold, iterations, feedback, invocations, grounding, tools_enabled, \
     quality_threshold, max_iterations";

/// SQLite-backed story store.
///
/// All access runs on tokio's blocking pool so SQLite I/O never ties up
/// async worker threads.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, PersistError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, PersistError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<F, R>(&self, f: F) -> Result<R, PersistError>
    where
        F: FnOnce(&Connection) -> Result<R, PersistError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| PersistError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }

    /// Most recent stories first, optionally only those scoring at least `min_score`.
    pub async fn recent(
        &self,
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<StoredStory>, PersistError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let min_score = min_score.map(f64::from);
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STORY_COLUMNS} FROM stories
                 WHERE (?1 IS NULL OR score >= ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![min_score, limit], RawStory::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawStory::into_stored).collect()
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredStory>, PersistError> {
        self.call(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1"),
                    params![id],
                    RawStory::from_row,
                )
                .optional()?;
            raw.map(RawStory::into_stored).transpose()
        })
        .await
    }

    /// Delete one story. Returns whether it existed.
    pub async fn delete(&self, id: i64) -> Result<bool, PersistError> {
        self.call(move |conn| Ok(conn.execute("DELETE FROM stories WHERE id = ?1", params![id])? > 0))
            .await
    }

    /// Delete every story and run. Returns the number of stories removed.
    pub async fn clear(&self) -> Result<usize, PersistError> {
        self.call(|conn| {
            let removed = conn.execute("DELETE FROM stories", [])?;
            conn.execute("DELETE FROM runs", [])?;
            Ok(removed)
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats, PersistError> {
        self.call(|conn| {
            let count = |sql: &str| -> Result<u64, PersistError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n.max(0) as u64)
            };

            let total_stories = count("SELECT COUNT(*) FROM stories")?;
            let total_runs = count("SELECT COUNT(*) FROM runs")?;
            let successful_runs = count("SELECT COUNT(*) FROM runs WHERE success = 1")?;
            let tools_enabled_count = count("SELECT COUNT(*) FROM stories WHERE tools_enabled = 1")?;
            let fallback_count = count("SELECT COUNT(*) FROM stories WHERE path = 'fallback'")?;
            let average_score: Option<f64> =
                conn.query_row("SELECT AVG(score) FROM stories", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(
                "SELECT model, COUNT(*) FROM stories GROUP BY model ORDER BY COUNT(*) DESC, model",
            )?;
            let stories_by_model = stmt
                .query_map([], |row| {
                    let n: i64 = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, n.max(0) as u64))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(StoreStats {
                total_stories,
                total_runs,
                successful_runs,
                failed_runs: total_runs.saturating_sub(successful_runs),
                average_score,
                stories_by_model,
                tools_enabled_count,
                fallback_count,
            })
        })
        .await
    }
}

#[async_trait]
impl StoryStore for SqliteStore {
    async fn append_story(&self, record: &StoryRecord) -> Result<i64, PersistError> {
        let record = record.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO stories (
                    request_id, created_at, prompt, constraints, story, path, model, score,
                    meets_threshold, iterations, feedback, invocations, grounding,
                    tools_enabled, quality_threshold, max_iterations
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    record.request_id.to_string(),
                    timestamp(&record.created_at),
                    record.prompt,
                    serde_json::to_string(&record.constraints)?,
                    record.story,
                    record.path.as_str(),
                    record.model,
                    record.score.map(f64::from),
                    record.meets_threshold,
                    record.iterations,
                    serde_json::to_string(&record.feedback)?,
                    serde_json::to_string(&record.invocations)?,
                    serde_json::to_string(&record.grounding)?,
                    record.tools_enabled,
                    f64::from(record.quality_threshold),
                    record.max_iterations,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn append_run(&self, record: &RunRecord) -> Result<(), PersistError> {
        let record = record.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO runs (
                    request_id, created_at, prompt, success, path, model, error,
                    elapsed_secs, tools_enabled
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.request_id.to_string(),
                    timestamp(&record.created_at),
                    record.prompt,
                    record.success,
                    record.path.map(|p| p.as_str()),
                    record.model,
                    record.error,
                    record.elapsed_secs,
                    record.tools_enabled,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A `stories` row before JSON and timestamp columns are decoded.
struct RawStory {
    id: i64,
    request_id: String,
    created_at: String,
    prompt: String,
    constraints: String,
    story: String,
    path: String,
    model: String,
    score: Option<f64>,
    meets_threshold: bool,
    iterations: u32,
    feedback: String,
    invocations: String,
    grounding: String,
    tools_enabled: bool,
    quality_threshold: f64,
    max_iterations: u32,
}

impl RawStory {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_id: row.get(1)?,
            created_at: row.get(2)?,
            prompt: row.get(3)?,
            constraints: row.get(4)?,
            story: row.get(5)?,
            path: row.get(6)?,
            model: row.get(7)?,
            score: row.get(8)?,
            meets_threshold: row.get(9)?,
            iterations: row.get(10)?,
            feedback: row.get(11)?,
            invocations: row.get(12)?,
            grounding: row.get(13)?,
            tools_enabled: row.get(14)?,
            quality_threshold: row.get(15)?,
            max_iterations: row.get(16)?,
        })
    }

    fn into_stored(self) -> Result<StoredStory, PersistError> {
        let request_id = Uuid::parse_str(&self.request_id)
            .map_err(|e| PersistError::InvalidData(format!("request_id: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| PersistError::InvalidData(format!("created_at: {e}")))?
            .with_timezone(&Utc);
        let path = self
            .path
            .parse::<GenerationPath>()
            .map_err(PersistError::InvalidData)?;

        Ok(StoredStory {
            id: self.id,
            record: StoryRecord {
                request_id,
                created_at,
                prompt: self.prompt,
                constraints: serde_json::from_str(&self.constraints)?,
                story: self.story,
                path,
                model: self.model,
                score: self.score.map(|s| s as f32),
                meets_threshold: self.meets_threshold,
                iterations: self.iterations,
                feedback: serde_json::from_str(&self.feedback)?,
                invocations: serde_json::from_str(&self.invocations)?,
                grounding: serde_json::from_str(&self.grounding)?,
                tools_enabled: self.tools_enabled,
                quality_threshold: self.quality_threshold as f32,
                max_iterations: self.max_iterations,
            },
        })
    }
}
