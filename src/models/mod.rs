//! Core data model for crawl state, hub discovery, and job tracking.

#![allow(dead_code)]

mod audit;
mod candidate;
mod determination;
mod domain;
mod event;
mod fetch;
mod hub;
mod job;

pub use audit::{AuditEntry, Decision};
pub use candidate::{Candidate, CandidateStatus, ValidationStatus};
pub use determination::{Determination, DomainDetermination};
pub use domain::{slugify, Domain, DomainError, Place, PlaceKind, Prediction, Topic};
pub use event::{EventCategory, Severity, TaskEvent};
pub use fetch::{FetchRecord, FetchStage, FetchTags};
pub use hub::{collect_hub_changes, Hub, HubChange};
pub use job::{Job, JobStatus};
