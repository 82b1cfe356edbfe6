//! In-memory store implementations.
//!
//! Used by tests and anywhere a throwaway pipeline run should not touch
//! disk. Behavior mirrors the SQLite stores, including upsert and
//! latest-by-timestamp semantics.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    AuditLog, CandidateStore, DeterminationLog, EventStore, FetchLog, FetchStats, HubStore,
    HubUpsert, Result, StatusUpdate, ValidationUpdate,
};
use crate::models::{
    collect_hub_changes, AuditEntry, Candidate, DomainDetermination, FetchRecord, FetchTags, Hub,
    TaskEvent,
};

/// In-memory fetch history.
#[derive(Default)]
pub struct MemoryFetchLog {
    rows: Mutex<Vec<(FetchRecord, FetchTags)>>,
}

impl MemoryFetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded rows, in insertion order.
    pub fn records(&self) -> Vec<FetchRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// Seed a row directly, bypassing tags.
    pub fn seed(&self, record: FetchRecord) {
        self.rows.lock().unwrap().push((
            record,
            FetchTags {
                stage: crate::models::FetchStage::Get,
                attempt_id: String::new(),
                cache_hit: false,
            },
        ));
    }
}

impl FetchLog for MemoryFetchLog {
    fn record(&self, record: &FetchRecord, tags: &FetchTags) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .push((record.clone(), tags.clone()));
        Ok(())
    }

    fn latest_fetch(&self, url: &str) -> Result<Option<FetchRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.url == url)
            .max_by_key(|(r, _)| r.fetched_at)
            .map(|(r, _)| r.clone()))
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.domain == domain)
            .count() as u64)
    }

    fn stats_for_domain(&self, domain: &str) -> Result<FetchStats> {
        let rows = self.rows.lock().unwrap();
        let mut stats = FetchStats::default();
        for (r, _) in rows.iter().filter(|(r, _)| r.domain == domain) {
            stats.total += 1;
            match r.http_status {
                200..=299 => stats.ok += 1,
                404 => stats.not_found += 1,
                400.. => stats.errors += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

/// In-memory candidate store.
#[derive(Default)]
pub struct MemoryCandidateStore {
    rows: Mutex<HashMap<(String, String), Candidate>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Candidate> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

impl CandidateStore for MemoryCandidateStore {
    fn save_candidate(&self, candidate: &Candidate) -> Result<()> {
        self.rows.lock().unwrap().insert(
            (candidate.domain.clone(), candidate.canonical_url.clone()),
            candidate.clone(),
        );
        Ok(())
    }

    fn mark_status(&self, update: &StatusUpdate) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(c) = rows.get_mut(&(update.domain.clone(), update.url.clone())) {
            c.status = update.status;
            if update.http_status.is_some() {
                c.http_status = update.http_status;
            }
            c.error_message = update.error_message.clone();
            c.last_seen_at = update.last_seen_at;
        }
        Ok(())
    }

    fn update_validation(&self, update: &ValidationUpdate) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(c) = rows.get_mut(&(update.domain.clone(), update.url.clone())) {
            c.status = update.status;
            c.validation_status = Some(update.validation_status);
            if update.confidence.is_some() {
                c.confidence = update.confidence;
            }
            c.signals["validation"] = update.metrics.clone();
            c.error_message = update.reason.clone();
            c.last_seen_at = update.last_seen_at;
        }
        Ok(())
    }

    fn get(&self, domain: &str, canonical_url: &str) -> Result<Option<Candidate>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(domain.to_string(), canonical_url.to_string()))
            .cloned())
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, _)| d == domain)
            .count() as u64)
    }
}

/// In-memory hub store.
#[derive(Default)]
pub struct MemoryHubStore {
    rows: Mutex<HashMap<(String, String), Hub>>,
}

impl MemoryHubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Hub> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn seed(&self, hub: Hub) {
        self.rows
            .lock()
            .unwrap()
            .insert((hub.domain.clone(), hub.url.clone()), hub);
    }
}

impl HubStore for MemoryHubStore {
    fn upsert(&self, hub: &Hub) -> Result<HubUpsert> {
        let mut rows = self.rows.lock().unwrap();
        let key = (hub.domain.clone(), hub.url.clone());
        match rows.get(&key) {
            None => {
                rows.insert(key, hub.clone());
                Ok(HubUpsert::Inserted)
            }
            Some(stored) => {
                let changes = collect_hub_changes(stored, hub);
                if changes.is_empty() {
                    Ok(HubUpsert::Unchanged)
                } else {
                    let mut updated = hub.clone();
                    updated.created_at = stored.created_at;
                    rows.insert(key, updated);
                    Ok(HubUpsert::Updated(changes))
                }
            }
        }
    }

    fn get(&self, domain: &str, url: &str) -> Result<Option<Hub>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(domain.to_string(), url.to_string()))
            .cloned())
    }

    fn count_for_domain(&self, domain: &str) -> Result<u64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, _)| d == domain)
            .count() as u64)
    }

    fn list_for_domain(&self, domain: &str) -> Result<Vec<Hub>> {
        let mut hubs: Vec<Hub> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.domain == domain)
            .cloned()
            .collect();
        hubs.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(hubs)
    }
}

/// In-memory audit trail.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    fn list_for_run(&self, run_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect())
    }
}

/// In-memory determination log.
#[derive(Default)]
pub struct MemoryDeterminationLog {
    entries: Mutex<Vec<DomainDetermination>>,
}

impl MemoryDeterminationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<DomainDetermination> {
        self.entries.lock().unwrap().clone()
    }
}

impl DeterminationLog for MemoryDeterminationLog {
    fn append(&self, determination: &DomainDetermination) -> Result<()> {
        self.entries.lock().unwrap().push(determination.clone());
        Ok(())
    }

    fn latest(&self, domain: &str) -> Result<Option<DomainDetermination>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.domain == domain)
            .max_by_key(|d| d.created_at)
            .cloned())
    }
}

/// In-memory event store.
#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<TaskEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &TaskEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn append_batch(&self, events: &[TaskEvent]) -> Result<()> {
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    fn recent(&self, task_id: &str, limit: u32) -> Result<Vec<TaskEvent>> {
        let events = self.events.lock().unwrap();
        let matching: Vec<TaskEvent> = events
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_memory_latest_fetch_matches_sqlite_semantics() {
        let log = MemoryFetchLog::new();
        let now = Utc::now();

        let mut old = sample_record("https://a.test/x", 404);
        old.fetched_at = now - chrono::Duration::days(1);
        log.seed(old);
        let mut fresh = sample_record("https://a.test/x", 200);
        fresh.fetched_at = now;
        log.seed(fresh);

        assert_eq!(
            log.latest_fetch("https://a.test/x").unwrap().unwrap().http_status,
            200
        );
    }

    fn sample_record(url: &str, status: u16) -> FetchRecord {
        FetchRecord {
            url: url.to_string(),
            domain: "a.test".to_string(),
            http_status: status,
            http_success: (200..300).contains(&status),
            title: None,
            request_method: "GET".to_string(),
            request_started_at: Utc::now(),
            fetched_at: Utc::now(),
            bytes_downloaded: 0,
            content_type: None,
            content_length: None,
            total_ms: 0,
            download_ms: 0,
            redirect_count: 0,
        }
    }
}
