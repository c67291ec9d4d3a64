//! Bar and Quote — the market data units the engine reacts to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completed OHLCV bar for one instrument.
///
/// Bars are delivered only once complete; the engine never sees a bar that is
/// still forming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }
}

/// Top-of-book quote used by tick-driven trailing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub time: DateTime<Utc>,
    pub best_bid: f64,
    pub best_ask: f64,
}

impl Quote {
    pub fn new(time: DateTime<Utc>, best_bid: f64, best_ask: f64) -> Self {
        Self {
            time,
            best_bid,
            best_ask,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Bid must be positive and not above the ask.
    pub fn is_sane(&self) -> bool {
        self.best_bid.is_finite()
            && self.best_ask.is_finite()
            && self.best_bid > 0.0
            && self.best_ask >= self.best_bid
    }
}
