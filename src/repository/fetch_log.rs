//! Fetch history repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{parse_datetime, FetchLog, FetchStats, Result};
use crate::models::{FetchRecord, FetchTags};

/// SQLite-backed fetch history.
///
/// Rows land in the normalized `fetch_log` table first, then in the legacy
/// `fetches` mirror kept for older tooling. Mirror failures are logged and
/// swallowed.
pub struct SqliteFetchLog {
    db_path: PathBuf,
}

impl SqliteFetchLog {
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
            CREATE TABLE IF NOT EXISTS fetch_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                domain TEXT NOT NULL,
                http_status INTEGER NOT NULL,
                http_success INTEGER NOT NULL,
                title TEXT,
                request_method TEXT NOT NULL DEFAULT 'GET',
                request_started_at TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                bytes_downloaded INTEGER NOT NULL DEFAULT 0,
                content_type TEXT,
                content_length INTEGER,
                total_ms INTEGER NOT NULL DEFAULT 0,
                download_ms INTEGER NOT NULL DEFAULT 0,
                redirect_count INTEGER NOT NULL DEFAULT 0,

                -- Recording context
                stage TEXT NOT NULL DEFAULT 'GET',
                attempt_id TEXT NOT NULL DEFAULT '',
                cache_hit INTEGER NOT NULL DEFAULT 0
            );

            -- Legacy mirror consumed by older tooling
            CREATE TABLE IF NOT EXISTS fetches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                http_status INTEGER,
                fetched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_fetch_log_url_fetched
                ON fetch_log(url, fetched_at);
            CREATE INDEX IF NOT EXISTS idx_fetch_log_domain
                ON fetch_log(domain);
            CREATE INDEX IF NOT EXISTS idx_fetch_log_attempt
                ON fetch_log(attempt_id);
        "#,
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FetchRecord> {
        Ok(FetchRecord {
            url: row.get("url")?,
            domain: row.get("domain")?,
            http_status: row.get::<_, i64>("http_status")? as u16,
            http_success: row.get::<_, i64>("http_success")? != 0,
            title: row.get("title")?,
            request_method: row.get("request_method")?,
            request_started_at: parse_datetime(&row.get::<_, String>("request_started_at")?),
            fetched_at: parse_datetime(&row.get::<_, String>("fetched_at")?),
            bytes_downloaded: row.get::<_, i64>("bytes_downloaded")? as u64,
            content_type: row.get("content_type")?,
            content_length: row
                .get::<_, Option<i64>>("content_length")?
                .map(|v| v as u64),
            total_ms: row.get::<_, i64>("total_ms")? as u64,
            download_ms: row.get::<_, i64>("download_ms")? as u64,
            redirect_count: row.get::<_, i64>("redirect_count")? as u32,
        })
    }
}

impl FetchLog for SqliteFetchLog {
    fn record(&self, record: &FetchRecord, tags: &FetchTags) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            r#"
            INSERT INTO fetch_log (
                url, domain, http_status, http_success, title,
                request_method, request_started_at, fetched_at,
                bytes_downloaded, content_type, content_length,
                total_ms, download_ms, redirect_count,
                stage, attempt_id, cache_hit
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                record.url,
                record.domain,
                record.http_status as i64,
                record.http_success as i64,
                record.title,
                record.request_method,
                record.request_started_at.to_rfc3339(),
                record.fetched_at.to_rfc3339(),
                record.bytes_downloaded as i64,
                record.content_type,
                record.content_length.map(|v| v as i64),
                record.total_ms as i64,
                record.download_ms as i64,
                record.redirect_count as i64,
                tags.stage.as_str(),
                tags.attempt_id,
                tags.cache_hit as i64,
            ],
        )?;

        // Mirror failures must never fail the recording path
        if let Err(e) = conn.execute(
            "INSERT INTO fetches (url, http_status, fetched_at) VALUES (?1, ?2, ?3)",
            params![
                record.url,
                record.http_status as i64,
                record.fetched_at.to_rfc3339()
            ],
        ) {
            warn!("legacy fetch mirror write failed for {}: {}", record.url, e);
        }

        Ok(())
    }

    fn latest_fetch(&self, url: &str) -> Result<Option<FetchRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM fetch_log
            WHERE url = ?
            ORDER BY fetched_at DESC, id DESC
            LIMIT 1
        "#,
        )?;

        super::to_option(stmt.query_row(params![url], Self::row_to_record))
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM fetch_log WHERE domain = ?",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn stats_for_domain(&self, domain: &str) -> Result<FetchStats> {
        let conn = self.connect()?;
        let stats = conn.query_row(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN http_status BETWEEN 200 AND 299 THEN 1 ELSE 0 END) as ok,
                SUM(CASE WHEN http_status = 404 THEN 1 ELSE 0 END) as not_found,
                SUM(CASE WHEN http_status >= 400 AND http_status != 404 THEN 1 ELSE 0 END) as errors
            FROM fetch_log
            WHERE domain = ?
            "#,
            params![domain],
            |row| {
                Ok(FetchStats {
                    total: row.get::<_, i64>(0)? as u64,
                    ok: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                    not_found: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                    errors: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::models::FetchStage;

    fn sample(url: &str, status: u16, fetched_at: chrono::DateTime<Utc>) -> FetchRecord {
        FetchRecord {
            url: url.to_string(),
            domain: "a.test".to_string(),
            http_status: status,
            http_success: (200..300).contains(&status),
            title: None,
            request_method: "GET".to_string(),
            request_started_at: fetched_at,
            fetched_at,
            bytes_downloaded: 512,
            content_type: Some("text/html".to_string()),
            content_length: Some(512),
            total_ms: 42,
            download_ms: 30,
            redirect_count: 0,
        }
    }

    fn tags() -> FetchTags {
        FetchTags {
            stage: FetchStage::Get,
            attempt_id: "attempt-1".to_string(),
            cache_hit: false,
        }
    }

    #[test]
    fn test_latest_fetch_uses_max_fetched_at() {
        let dir = tempdir().unwrap();
        let log = SqliteFetchLog::new(&dir.path().join("test.db")).unwrap();

        let now = Utc::now();
        log.record(
            &sample("https://a.test/x", 404, now - chrono::Duration::days(2)),
            &tags(),
        )
        .unwrap();
        log.record(&sample("https://a.test/x", 200, now), &tags())
            .unwrap();

        let latest = log.latest_fetch("https://a.test/x").unwrap().unwrap();
        assert_eq!(latest.http_status, 200);
    }

    #[test]
    fn test_latest_fetch_missing_url() {
        let dir = tempdir().unwrap();
        let log = SqliteFetchLog::new(&dir.path().join("test.db")).unwrap();
        assert!(log.latest_fetch("https://a.test/none").unwrap().is_none());
    }

    #[test]
    fn test_stats_for_domain() {
        let dir = tempdir().unwrap();
        let log = SqliteFetchLog::new(&dir.path().join("test.db")).unwrap();

        let now = Utc::now();
        log.record(&sample("https://a.test/1", 200, now), &tags())
            .unwrap();
        log.record(&sample("https://a.test/2", 404, now), &tags())
            .unwrap();
        log.record(&sample("https://a.test/3", 500, now), &tags())
            .unwrap();

        let stats = log.stats_for_domain("a.test").unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.ok, 1);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.errors, 1);
    }
}
