//! Pyramiding — add units to a winning position at ATR-scaled intervals.

use crate::domain::PositionSide;
use serde::{Deserialize, Serialize};

/// Pyramid bookkeeping for one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidState {
    units: u32,
    last_add_price: f64,
    unit_volume: f64,
}

impl PyramidState {
    /// State right after the first unit filled.
    pub fn new(entry_price: f64, unit_volume: f64) -> Self {
        Self {
            units: 1,
            last_add_price: entry_price,
            unit_volume,
        }
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    pub fn unit_volume(&self) -> f64 {
        self.unit_volume
    }

    pub fn last_add_price(&self) -> f64 {
        self.last_add_price
    }

    /// True when price moved favourably by at least `interval × atr` since the
    /// last unit and the unit cap has room.
    pub fn should_add(
        &self,
        side: PositionSide,
        price: f64,
        atr: f64,
        interval: f64,
        max_units: u32,
    ) -> bool {
        if self.units >= max_units || side.is_flat() || atr <= 0.0 {
            return false;
        }
        let moved = (price - self.last_add_price) * side.sign();
        moved >= interval * atr
    }

    pub fn record_add(&mut self, fill_price: f64) {
        self.units += 1;
        self.last_add_price = fill_price;
    }
}
