//! Domain determination repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::{parse_datetime, DeterminationLog, Result};
use crate::models::{Determination, DomainDetermination};

/// SQLite-backed, append-only domain verdict log.
pub struct SqliteDeterminationLog {
    db_path: PathBuf,
}

impl SqliteDeterminationLog {
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
            CREATE TABLE IF NOT EXISTS domain_determinations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                determination TEXT NOT NULL,
                reason TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_determinations_domain
                ON domain_determinations(domain, created_at);
        "#,
        )?;
        Ok(())
    }

    fn row_to_determination(row: &rusqlite::Row) -> rusqlite::Result<DomainDetermination> {
        let details_str: String = row.get("details")?;
        Ok(DomainDetermination {
            domain: row.get("domain")?,
            determination: Determination::from_str(&row.get::<_, String>("determination")?)
                .unwrap_or(Determination::Error),
            reason: row.get("reason")?,
            details: serde_json::from_str(&details_str).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        })
    }
}

impl DeterminationLog for SqliteDeterminationLog {
    fn append(&self, determination: &DomainDetermination) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO domain_determinations (domain, determination, reason, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                determination.domain,
                determination.determination.as_str(),
                determination.reason,
                serde_json::to_string(&determination.details)?,
                determination.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn latest(&self, domain: &str) -> Result<Option<DomainDetermination>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM domain_determinations
            WHERE domain = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )?;
        super::to_option(stmt.query_row(params![domain], Self::row_to_determination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_latest_returns_most_recent() {
        let dir = tempdir().unwrap();
        let log = SqliteDeterminationLog::new(&dir.path().join("test.db")).unwrap();

        let mut first = DomainDetermination::new(
            "a.test",
            Determination::InsufficientData,
            "no signal",
            serde_json::json!({}),
        );
        first.created_at = first.created_at - chrono::Duration::hours(1);
        log.append(&first).unwrap();
        log.append(&DomainDetermination::new(
            "a.test",
            Determination::Processed,
            "completed",
            serde_json::json!({}),
        ))
        .unwrap();

        let latest = log.latest("a.test").unwrap().unwrap();
        assert_eq!(latest.determination, Determination::Processed);
        assert!(log.latest("b.test").unwrap().is_none());
    }
}
