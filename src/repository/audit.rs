//! Validation audit repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::{parse_datetime, AuditLog, Result};
use crate::models::{AuditEntry, Decision, PlaceKind};

/// SQLite-backed, append-only audit trail ordered by `created_at`.
pub struct SqliteAuditLog {
    db_path: PathBuf,
}

impl SqliteAuditLog {
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
            CREATE TABLE IF NOT EXISTS hub_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                attempt_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                url TEXT NOT NULL,
                place_kind TEXT,
                place_name TEXT,
                decision TEXT NOT NULL,
                validation_metrics TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_hub_audit_run
                ON hub_audit(run_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_hub_audit_domain
                ON hub_audit(domain);
        "#,
        )?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
        let metrics_str: String = row.get("validation_metrics")?;
        Ok(AuditEntry {
            run_id: row.get("run_id")?,
            attempt_id: row.get("attempt_id")?,
            domain: row.get("domain")?,
            url: row.get("url")?,
            place_kind: row
                .get::<_, Option<String>>("place_kind")?
                .as_deref()
                .and_then(PlaceKind::from_str),
            place_name: row.get("place_name")?,
            decision: Decision::from_str(&row.get::<_, String>("decision")?)
                .unwrap_or(Decision::Rejected),
            validation_metrics: serde_json::from_str(&metrics_str).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        })
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO hub_audit (
                run_id, attempt_id, domain, url, place_kind, place_name,
                decision, validation_metrics, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.run_id,
                entry.attempt_id,
                entry.domain,
                entry.url,
                entry.place_kind.map(|k| k.as_str()),
                entry.place_name,
                entry.decision.as_str(),
                serde_json::to_string(&entry.validation_metrics)?,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_for_run(&self, run_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM hub_audit WHERE run_id = ? ORDER BY created_at ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_list_in_order() {
        let dir = tempdir().unwrap();
        let log = SqliteAuditLog::new(&dir.path().join("test.db")).unwrap();

        for (i, decision) in [Decision::Accepted, Decision::Rejected].iter().enumerate() {
            log.append(&AuditEntry {
                run_id: "run-1".to_string(),
                attempt_id: "attempt-1".to_string(),
                domain: "a.test".to_string(),
                url: format!("https://a.test/{}", i),
                place_kind: Some(PlaceKind::Country),
                place_name: Some("France".to_string()),
                decision: *decision,
                validation_metrics: serde_json::json!({"i": i}),
                created_at: Utc::now() + chrono::Duration::seconds(i as i64),
            })
            .unwrap();
        }

        let entries = log.list_for_run("run-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].decision, Decision::Accepted);
        assert_eq!(entries[1].decision, Decision::Rejected);
    }
}
