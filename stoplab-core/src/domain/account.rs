//! Account snapshot — read-only account aggregates supplied each cycle.

use serde::{Deserialize, Serialize};

/// Account-level aggregates supplied by the caller on every cycle.
///
/// The engine never mutates these; `balance` is realized cash and `equity`
/// is balance plus floating profit of the open book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub balance: f64,
}

impl AccountSnapshot {
    pub fn new(equity: f64, balance: f64) -> Self {
        Self { equity, balance }
    }

    /// Snapshot of an account with no open exposure.
    pub fn flat(balance: f64) -> Self {
        Self {
            equity: balance,
            balance,
        }
    }

    /// Floating loss of the open book (positive when equity is below balance).
    pub fn floating_loss(&self) -> f64 {
        self.balance - self.equity
    }
}
