//! Hub discovery: pattern library, predictor analyzers, readiness
//! assessment, and hub validation.

#![allow(dead_code)]

mod analyzers;
mod dspl;
mod gazetteer;
mod readiness;
mod validator;

pub use analyzers::{ConventionAnalyzer, DsplAnalyzer, HubAnalyzer};
pub use dspl::{Dspl, DsplEntry, DsplSummary, PatternTemplate};
pub use gazetteer::{PlaceProvider, StaticGazetteer};
pub use readiness::{assess_readiness, DomainSignals, Readiness, ReadinessStatus};
pub use validator::{HubValidator, ValidationOutcome};
