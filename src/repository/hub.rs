//! Hub repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::{parse_datetime, HubStore, HubUpsert, Result};
use crate::models::{collect_hub_changes, Hub, PlaceKind};

/// SQLite-backed hub store keyed by `(domain, url)`.
///
/// Updates are diffed against the stored row and skipped when no tracked
/// field changed, so re-running a pipeline over an unchanged corpus is a
/// no-op.
pub struct SqliteHubStore {
    db_path: PathBuf,
}

impl SqliteHubStore {
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
            CREATE TABLE IF NOT EXISTS hubs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                url TEXT NOT NULL,
                place_slug TEXT,
                place_kind TEXT,
                topic_slug TEXT,
                topic_label TEXT,
                title TEXT,
                nav_links_count INTEGER NOT NULL DEFAULT 0,
                article_links_count INTEGER NOT NULL DEFAULT 0,
                evidence TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                UNIQUE(domain, url)
            );

            CREATE INDEX IF NOT EXISTS idx_hubs_domain
                ON hubs(domain);
            CREATE INDEX IF NOT EXISTS idx_hubs_place
                ON hubs(domain, place_kind, place_slug);
        "#,
        )?;
        Ok(())
    }

    fn row_to_hub(row: &rusqlite::Row) -> rusqlite::Result<Hub> {
        let evidence_str: String = row.get("evidence")?;
        Ok(Hub {
            domain: row.get("domain")?,
            url: row.get("url")?,
            place_slug: row.get("place_slug")?,
            place_kind: row
                .get::<_, Option<String>>("place_kind")?
                .as_deref()
                .and_then(PlaceKind::from_str),
            topic_slug: row.get("topic_slug")?,
            topic_label: row.get("topic_label")?,
            title: row.get("title")?,
            nav_links_count: row.get::<_, i64>("nav_links_count")? as u32,
            article_links_count: row.get::<_, i64>("article_links_count")? as u32,
            evidence: serde_json::from_str(&evidence_str).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        })
    }
}

impl HubStore for SqliteHubStore {
    fn upsert(&self, hub: &Hub) -> Result<HubUpsert> {
        let existing = self.get(&hub.domain, &hub.url)?;

        match existing {
            None => {
                let conn = self.connect()?;
                conn.execute(
                    r#"
                    INSERT INTO hubs (
                        domain, url, place_slug, place_kind, topic_slug,
                        topic_label, title, nav_links_count, article_links_count,
                        evidence, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        hub.domain,
                        hub.url,
                        hub.place_slug,
                        hub.place_kind.map(|k| k.as_str()),
                        hub.topic_slug,
                        hub.topic_label,
                        hub.title,
                        hub.nav_links_count as i64,
                        hub.article_links_count as i64,
                        serde_json::to_string(&hub.evidence)?,
                        hub.created_at.to_rfc3339(),
                        hub.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(HubUpsert::Inserted)
            }
            Some(stored) => {
                let changes = collect_hub_changes(&stored, hub);
                if changes.is_empty() {
                    return Ok(HubUpsert::Unchanged);
                }

                let conn = self.connect()?;
                conn.execute(
                    r#"
                    UPDATE hubs SET
                        place_slug = ?1,
                        place_kind = ?2,
                        topic_slug = ?3,
                        topic_label = ?4,
                        title = ?5,
                        nav_links_count = ?6,
                        article_links_count = ?7,
                        evidence = ?8,
                        updated_at = ?9
                    WHERE domain = ?10 AND url = ?11
                    "#,
                    params![
                        hub.place_slug,
                        hub.place_kind.map(|k| k.as_str()),
                        hub.topic_slug,
                        hub.topic_label,
                        hub.title,
                        hub.nav_links_count as i64,
                        hub.article_links_count as i64,
                        serde_json::to_string(&hub.evidence)?,
                        hub.updated_at.to_rfc3339(),
                        hub.domain,
                        hub.url,
                    ],
                )?;
                Ok(HubUpsert::Updated(changes))
            }
        }
    }

    fn get(&self, domain: &str, url: &str) -> Result<Option<Hub>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM hubs WHERE domain = ? AND url = ?")?;
        super::to_option(stmt.query_row(params![domain, url], Self::row_to_hub))
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM hubs WHERE domain = ?",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_for_domain(&self, domain: &str) -> Result<Vec<Hub>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM hubs WHERE domain = ? ORDER BY url ASC")?;
        let hubs = stmt
            .query_map(params![domain], Self::row_to_hub)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hubs)
    }
}
