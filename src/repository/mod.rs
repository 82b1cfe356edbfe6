//! Repository layer for database persistence.
//!
//! Each store is a trait so the pipeline can be driven by the default
//! SQLite implementations or by the in-memory set in [`memory`].

#![allow(dead_code)]

mod audit;
mod candidate;
mod determination;
mod events;
mod fetch_log;
mod hub;
pub mod memory;

pub use audit::SqliteAuditLog;
pub use candidate::SqliteCandidateStore;
pub use determination::SqliteDeterminationLog;
pub use events::SqliteEventStore;
pub use fetch_log::SqliteFetchLog;
pub use hub::SqliteHubStore;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::models::{
    AuditEntry, Candidate, CandidateStatus, DomainDetermination, FetchRecord, FetchTags, Hub,
    HubChange, TaskEvent, ValidationStatus,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Convert a rusqlite Result<T> to Result<Option<T>>, treating QueryReturnedNoRows as None.
pub fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create a database connection with optimized settings for concurrency.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    // WAL mode persists, so this is effectively a one-time setting per database
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
        PRAGMA cache_size = -64000;
        PRAGMA temp_store = MEMORY;
    "#,
    )?;

    Ok(conn)
}

/// Aggregate fetch-history counters for one domain.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub total: u64,
    pub ok: u64,
    pub not_found: u64,
    pub errors: u64,
}

/// Status mutation for a candidate row.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub domain: String,
    pub url: String,
    pub status: CandidateStatus,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

/// Validation mutation for a candidate row.
#[derive(Debug, Clone)]
pub struct ValidationUpdate {
    pub domain: String,
    pub url: String,
    pub status: CandidateStatus,
    pub validation_status: ValidationStatus,
    pub confidence: Option<f64>,
    /// Validator metrics merged into the candidate's signals payload.
    pub metrics: serde_json::Value,
    pub reason: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

/// Outcome of a hub upsert.
#[derive(Debug, Clone)]
pub enum HubUpsert {
    Inserted,
    Updated(Vec<HubChange>),
    Unchanged,
}

/// Append-only fetch history with latest-per-URL lookups.
pub trait FetchLog: Send + Sync {
    fn record(&self, record: &FetchRecord, tags: &FetchTags) -> Result<()>;
    /// Most recent row for a URL, by `fetched_at`.
    fn latest_fetch(&self, url: &str) -> Result<Option<FetchRecord>>;
    fn count_for_domain(&self, domain: &str) -> Result<u64>;
    fn stats_for_domain(&self, domain: &str) -> Result<FetchStats>;
}

/// Predicted-URL persistence keyed by `(domain, canonical_url)`.
pub trait CandidateStore: Send + Sync {
    /// Insert or refresh; refresh replaces signals and advances `last_seen_at`.
    fn save_candidate(&self, candidate: &Candidate) -> Result<()>;
    fn mark_status(&self, update: &StatusUpdate) -> Result<()>;
    fn update_validation(&self, update: &ValidationUpdate) -> Result<()>;
    fn get(&self, domain: &str, canonical_url: &str) -> Result<Option<Candidate>>;
    fn count_for_domain(&self, domain: &str) -> Result<u64>;
}

/// Validated hub upserts keyed by `(domain, url)`.
pub trait HubStore: Send + Sync {
    fn upsert(&self, hub: &Hub) -> Result<HubUpsert>;
    fn get(&self, domain: &str, url: &str) -> Result<Option<Hub>>;
    fn count_for_domain(&self, domain: &str) -> Result<u64>;
    fn list_for_domain(&self, domain: &str) -> Result<Vec<Hub>>;
}

/// Append-only validation audit trail.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
    fn list_for_run(&self, run_id: &str) -> Result<Vec<AuditEntry>>;
}

/// Append-only domain verdicts.
pub trait DeterminationLog: Send + Sync {
    fn append(&self, determination: &DomainDetermination) -> Result<()>;
    /// Latest verdict per domain, by `created_at`.
    fn latest(&self, domain: &str) -> Result<Option<DomainDetermination>>;
}

/// Append-only task event time series.
pub trait EventStore: Send + Sync {
    fn append(&self, event: &TaskEvent) -> Result<()>;
    fn append_batch(&self, events: &[TaskEvent]) -> Result<()>;
    fn recent(&self, task_id: &str, limit: u32) -> Result<Vec<TaskEvent>>;
}

/// Row counts per table, for status output.
pub fn table_counts(db_path: &Path) -> Result<Vec<(String, u64)>> {
    let conn = connect(db_path)?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
                row.get(0)
            })?;
        counts.push((table, count as u64));
    }
    Ok(counts)
}

/// Create every table up front (used by `init` and the server on boot).
pub fn init_all(db_path: &Path) -> Result<Vec<String>> {
    let _ = SqliteFetchLog::new(db_path)?;
    let _ = SqliteCandidateStore::new(db_path)?;
    let _ = SqliteHubStore::new(db_path)?;
    let _ = SqliteAuditLog::new(db_path)?;
    let _ = SqliteDeterminationLog::new(db_path)?;
    let _ = SqliteEventStore::new(db_path)?;

    let conn = connect(db_path)?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(tables)
}
