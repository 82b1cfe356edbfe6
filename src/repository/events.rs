//! Task event repository.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::{parse_datetime, EventStore, Result};
use crate::models::{EventCategory, Severity, TaskEvent};

/// SQLite-backed task event time series.
///
/// Row id preserves per-task emission order even when events share a
/// timestamp.
pub struct SqliteEventStore {
    db_path: PathBuf,
}

impl SqliteEventStore {
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
            CREATE TABLE IF NOT EXISTS task_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_type TEXT NOT NULL,
                task_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_task_events_task
                ON task_events(task_id, id);
        "#,
        )?;
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<TaskEvent> {
        let data_str: String = row.get("data")?;
        Ok(TaskEvent {
            task_type: row.get("task_type")?,
            task_id: row.get("task_id")?,
            event_type: row.get("event_type")?,
            category: EventCategory::from_str(&row.get::<_, String>("category")?)
                .unwrap_or(EventCategory::Telemetry),
            severity: Severity::from_str(&row.get::<_, String>("severity")?)
                .unwrap_or(Severity::Info),
            data: serde_json::from_str(&data_str).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        })
    }

    fn insert(conn: &Connection, event: &TaskEvent) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO task_events (
                task_type, task_id, event_type, category, severity, data, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                event.task_type,
                event.task_id,
                event.event_type,
                event.category.as_str(),
                event.severity.as_str(),
                serde_json::to_string(&event.data)?,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, event: &TaskEvent) -> Result<()> {
        let conn = self.connect()?;
        Self::insert(&conn, event)
    }

    fn append_batch(&self, events: &[TaskEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for event in events {
            Self::insert(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn recent(&self, task_id: &str, limit: u32) -> Result<Vec<TaskEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM (
                SELECT * FROM task_events WHERE task_id = ? ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )?;
        let events = stmt
            .query_map(params![task_id, limit], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_batch_append_preserves_order() {
        let dir = tempdir().unwrap();
        let store = SqliteEventStore::new(&dir.path().join("test.db")).unwrap();

        let events: Vec<TaskEvent> = (0..5)
            .map(|i| {
                TaskEvent::progress(
                    "operation",
                    "task-1",
                    "candidate",
                    serde_json::json!({"seq": i}),
                )
            })
            .collect();
        store.append_batch(&events).unwrap();

        let stored = store.recent("task-1", 10).unwrap();
        assert_eq!(stored.len(), 5);
        for (i, event) in stored.iter().enumerate() {
            assert_eq!(event.data["seq"], i);
        }
    }

    #[test]
    fn test_recent_limit_keeps_tail() {
        let dir = tempdir().unwrap();
        let store = SqliteEventStore::new(&dir.path().join("test.db")).unwrap();

        for i in 0..10 {
            store
                .append(&TaskEvent::progress(
                    "operation",
                    "task-1",
                    "candidate",
                    serde_json::json!({"seq": i}),
                ))
                .unwrap();
        }

        let stored = store.recent("task-1", 3).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].data["seq"], 7);
        assert_eq!(stored[2].data["seq"], 9);
    }
}
