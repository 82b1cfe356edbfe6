//! Structured task events for the telemetry bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Lifecycle,
    Progress,
    Telemetry,
    Milestone,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Progress => "progress",
            Self::Telemetry => "telemetry",
            Self::Milestone => "milestone",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lifecycle" => Some(Self::Lifecycle),
            "progress" => Some(Self::Progress),
            "telemetry" => Some(Self::Telemetry),
            "milestone" => Some(Self::Milestone),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One entry in the append-only task event time series.
///
/// Ordering is preserved per `task_id`; no ordering guarantee holds across
/// tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Kind of task emitting the event ("operation", "sequence").
    pub task_type: String,
    pub task_id: String,
    /// Event name within the category ("started", "step", "candidate").
    pub event_type: String,
    pub category: EventCategory,
    pub severity: Severity,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(
        task_type: &str,
        task_id: &str,
        event_type: &str,
        category: EventCategory,
        severity: Severity,
        data: serde_json::Value,
    ) -> Self {
        Self {
            task_type: task_type.to_string(),
            task_id: task_id.to_string(),
            event_type: event_type.to_string(),
            category,
            severity,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn lifecycle(task_type: &str, task_id: &str, event_type: &str, data: serde_json::Value) -> Self {
        Self::new(
            task_type,
            task_id,
            event_type,
            EventCategory::Lifecycle,
            Severity::Info,
            data,
        )
    }

    pub fn progress(task_type: &str, task_id: &str, event_type: &str, data: serde_json::Value) -> Self {
        Self::new(
            task_type,
            task_id,
            event_type,
            EventCategory::Progress,
            Severity::Info,
            data,
        )
    }

    pub fn milestone(task_type: &str, task_id: &str, event_type: &str, data: serde_json::Value) -> Self {
        Self::new(
            task_type,
            task_id,
            event_type,
            EventCategory::Milestone,
            Severity::Info,
            data,
        )
    }

    pub fn error(task_type: &str, task_id: &str, event_type: &str, data: serde_json::Value) -> Self {
        Self::new(
            task_type,
            task_id,
            event_type,
            EventCategory::Error,
            Severity::Error,
            data,
        )
    }
}
