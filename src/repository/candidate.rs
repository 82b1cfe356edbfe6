//! Candidate repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::{parse_datetime, CandidateStore, Result, StatusUpdate, ValidationUpdate};
use crate::models::{Candidate, CandidateStatus, PlaceKind, ValidationStatus};

/// SQLite-backed candidate store keyed by `(domain, canonical_url)`.
pub struct SqliteCandidateStore {
    db_path: PathBuf,
}

impl SqliteCandidateStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                canonical_url TEXT NOT NULL,

                -- Prediction target
                place_kind TEXT,
                place_name TEXT,
                place_code TEXT,
                topic_slug TEXT,

                -- Prediction provenance
                analyzer TEXT NOT NULL,
                strategy TEXT NOT NULL,
                score REAL,
                confidence REAL,
                pattern TEXT,
                signals TEXT NOT NULL DEFAULT '{}',

                -- Processing state
                status TEXT NOT NULL DEFAULT 'pending',
                validation_status TEXT,
                http_status INTEGER,
                error_message TEXT,
                attempt_id TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,

                UNIQUE(domain, canonical_url)
            );

            CREATE INDEX IF NOT EXISTS idx_candidates_domain_status
                ON candidates(domain, status);
            CREATE INDEX IF NOT EXISTS idx_candidates_attempt
                ON candidates(attempt_id);
        "#,
        )?;
        Ok(())
    }

    fn row_to_candidate(row: &rusqlite::Row) -> rusqlite::Result<Candidate> {
        let signals_str: String = row.get("signals")?;
        Ok(Candidate {
            domain: row.get("domain")?,
            canonical_url: row.get("canonical_url")?,
            place_kind: row
                .get::<_, Option<String>>("place_kind")?
                .as_deref()
                .and_then(PlaceKind::from_str),
            place_name: row.get("place_name")?,
            place_code: row.get("place_code")?,
            topic_slug: row.get("topic_slug")?,
            analyzer: row.get("analyzer")?,
            strategy: row.get("strategy")?,
            score: row.get("score")?,
            confidence: row.get("confidence")?,
            pattern: row.get("pattern")?,
            signals: serde_json::from_str(&signals_str).unwrap_or_default(),
            status: CandidateStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(CandidateStatus::Pending),
            validation_status: row
                .get::<_, Option<String>>("validation_status")?
                .as_deref()
                .and_then(ValidationStatus::from_str),
            http_status: row
                .get::<_, Option<i64>>("http_status")?
                .map(|v| v as u16),
            error_message: row.get("error_message")?,
            attempt_id: row.get("attempt_id")?,
            last_seen_at: parse_datetime(&row.get::<_, String>("last_seen_at")?),
        })
    }
}

impl CandidateStore for SqliteCandidateStore {
    fn save_candidate(&self, candidate: &Candidate) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO candidates (
                domain, canonical_url, place_kind, place_name, place_code,
                topic_slug, analyzer, strategy, score, confidence, pattern,
                signals, status, validation_status, http_status, error_message,
                attempt_id, last_seen_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(domain, canonical_url) DO UPDATE SET
                place_kind = excluded.place_kind,
                place_name = excluded.place_name,
                place_code = excluded.place_code,
                topic_slug = excluded.topic_slug,
                analyzer = excluded.analyzer,
                strategy = excluded.strategy,
                score = excluded.score,
                confidence = excluded.confidence,
                pattern = excluded.pattern,
                signals = excluded.signals,
                status = excluded.status,
                attempt_id = excluded.attempt_id,
                last_seen_at = excluded.last_seen_at
            "#,
            params![
                candidate.domain,
                candidate.canonical_url,
                candidate.place_kind.map(|k| k.as_str()),
                candidate.place_name,
                candidate.place_code,
                candidate.topic_slug,
                candidate.analyzer,
                candidate.strategy,
                candidate.score,
                candidate.confidence,
                candidate.pattern,
                serde_json::to_string(&candidate.signals)?,
                candidate.status.as_str(),
                candidate.validation_status.map(|v| v.as_str()),
                candidate.http_status.map(|v| v as i64),
                candidate.error_message,
                candidate.attempt_id,
                candidate.last_seen_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn mark_status(&self, update: &StatusUpdate) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE candidates SET
                status = ?1,
                http_status = COALESCE(?2, http_status),
                error_message = ?3,
                last_seen_at = ?4
            WHERE domain = ?5 AND canonical_url = ?6
            "#,
            params![
                update.status.as_str(),
                update.http_status.map(|v| v as i64),
                update.error_message,
                update.last_seen_at.to_rfc3339(),
                update.domain,
                update.url,
            ],
        )?;
        Ok(())
    }

    fn update_validation(&self, update: &ValidationUpdate) -> Result<()> {
        let conn = self.connect()?;

        // Merge validator metrics into the stored signals payload
        let existing: Option<String> = super::to_option(conn.query_row(
            "SELECT signals FROM candidates WHERE domain = ? AND canonical_url = ?",
            params![update.domain, update.url],
            |row| row.get(0),
        ))?;
        let mut signals: serde_json::Value = existing
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        signals["validation"] = update.metrics.clone();

        conn.execute(
            r#"
            UPDATE candidates SET
                status = ?1,
                validation_status = ?2,
                confidence = COALESCE(?3, confidence),
                signals = ?4,
                error_message = ?5,
                last_seen_at = ?6
            WHERE domain = ?7 AND canonical_url = ?8
            "#,
            params![
                update.status.as_str(),
                update.validation_status.as_str(),
                update.confidence,
                serde_json::to_string(&signals)?,
                update.reason,
                update.last_seen_at.to_rfc3339(),
                update.domain,
                update.url,
            ],
        )?;
        Ok(())
    }

    fn get(&self, domain: &str, canonical_url: &str) -> Result<Option<Candidate>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM candidates WHERE domain = ? AND canonical_url = ?")?;
        super::to_option(stmt.query_row(params![domain, canonical_url], Self::row_to_candidate))
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM candidates WHERE domain = ?",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
