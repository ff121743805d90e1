//! Alerting System
//!
//! Turns per-frame road scene results into alerts and rate-limits them per kind.

mod manager;

pub use manager::{AlertConfig, AlertKind, AlertManager, AlertState, RoadAlert};
