//! StopLab Core — position and risk management for one instrument.
//!
//! This crate contains the decision engine that sits between a signal source
//! and an order gateway:
//! - Domain types (bars, quotes, signals, positions, actions, fills, trades)
//! - Position sizing: fixed, risk fraction, martingale and stake sequences
//! - Protective levels with breakeven, ratcheted trailing and partial takes
//! - Exit arbitration with a fixed priority order
//! - Hedge lock coordination (paired legs, net-profit liquidation)
//! - The per-instrument engine, a paper gateway and a replay driver

pub mod arbiter;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hedge;
pub mod protective;
pub mod sizing;

pub use config::{EngineConfig, TradingMode};
pub use engine::Engine;
pub use error::{ConfigError, EngineError};
