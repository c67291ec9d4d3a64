//! Error taxonomy.
//!
//! Configuration problems are fatal at startup. At runtime only state
//! inconsistencies are errors; sizing failures, stale events and rounding
//! underflow are logged and skipped by the engine.

use crate::domain::ActionId;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config TOML: {0}")]
    Parse(String),

    #[error("trailing_step must be > 0 when trailing is enabled (got {0})")]
    TrailingStep(f64),

    #[error("invalid volume limits: step={step}, min={min}, max={max}")]
    VolumeLimits { step: f64, min: f64, max: f64 },

    #[error("risk-fraction sizing needs fixed_stop_distance or atr_stop_multiplier")]
    MissingStopDistance,

    #[error("malformed grid sequence '{input}': {reason}")]
    MalformedSequence { input: String, reason: String },

    #[error("{field} must be {constraint} (got {value})")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
        value: f64,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// A fill that does not match what the engine expects. The engine halts.
    #[error("inconsistent fill for {action_id}: {reason}")]
    InconsistentFill { action_id: ActionId, reason: String },

    /// Any call after an inconsistency; requires external reconciliation.
    #[error("engine halted: {0}")]
    Halted(String),
}
