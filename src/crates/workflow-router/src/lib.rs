//! # workflow-router
//!
//! Rule-based message routing: specificity-ranked matching, temperature
//! scaled confidence calibration, a fallback cascade, and decision
//! explanations. Routing fires `beforeRouting`/`afterRouting`/
//! `afterRoutingDecision` hooks through the same [`workflow_core::HookManager`]
//! the pipeline and graph executors use.

pub mod accuracy;
pub mod calibration;
pub mod error;
pub mod router;
pub mod rule;
pub mod version;

pub use accuracy::AccuracyTracker;
pub use calibration::Calibrator;
pub use error::{Result, RoutingError};
pub use router::{Alternative, Explanation, MessageRouter, RouteMatchType, RoutingDecision};
pub use rule::{MatchType, Matcher, RoutingRule};
