//! Persistence layer — the append-only decision log.

pub mod decision_log;

pub use decision_log::{DecisionLog, DecisionRecord};
