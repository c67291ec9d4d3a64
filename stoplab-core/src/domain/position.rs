//! Position — net exposure on one instrument, mutated only by confirmed fills.

use super::EPSILON;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a position or hedge leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
            PositionSide::Flat => 0.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
            PositionSide::Flat => PositionSide::Flat,
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionSide::Flat
    }
}

/// Side of an order as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that increases exposure on `side`.
    pub fn to_open(side: PositionSide) -> Self {
        match side {
            PositionSide::Short => OrderSide::Sell,
            _ => OrderSide::Buy,
        }
    }

    /// Order side that decreases exposure on `side`.
    pub fn to_close(side: PositionSide) -> Self {
        match side {
            PositionSide::Short => OrderSide::Buy,
            _ => OrderSide::Sell,
        }
    }

    /// The position side a fill of this order side would open from flat.
    pub fn opens(self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

/// Portion of a position closed by a single fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPortion {
    pub side: PositionSide,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl ClosedPortion {
    /// Price-unit profit times volume (not yet scaled by point value).
    pub fn gross_points(&self) -> f64 {
        (self.exit_price - self.entry_price) * self.side.sign() * self.volume
    }
}

/// What a fill did to the position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillOutcome {
    /// Set when the fill reduced existing exposure.
    pub closed: Option<ClosedPortion>,
    /// The position went from non-flat to flat (possibly re-opening after).
    pub flattened: bool,
    /// The position went from flat to non-flat.
    pub opened: bool,
    /// Volume that increased exposure.
    pub opened_volume: f64,
}

/// Net exposure on one instrument.
///
/// Invariant: `side == Flat` if and only if `volume == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub volume: f64,
    pub average_entry_price: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            volume: 0.0,
            average_entry_price: 0.0,
            opened_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    /// Positive for long, negative for short.
    pub fn signed_volume(&self) -> f64 {
        self.volume * self.side.sign()
    }

    /// Unrealized profit in price units times volume.
    pub fn unrealized_points(&self, price: f64) -> f64 {
        (price - self.average_entry_price) * self.signed_volume()
    }

    /// Apply a confirmed fill.
    ///
    /// Same-direction fills update the volume-weighted average entry price.
    /// Opposite-direction fills reduce the position first; any remainder
    /// opens a new position on the other side at the fill price.
    pub fn apply_fill(
        &mut self,
        order_side: OrderSide,
        price: f64,
        volume: f64,
        time: DateTime<Utc>,
    ) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        let fill_side = order_side.opens();

        if self.is_flat() {
            self.open(fill_side, price, volume, time);
            outcome.opened = true;
            outcome.opened_volume = volume;
            return outcome;
        }

        if self.side == fill_side {
            let total = self.volume + volume;
            self.average_entry_price =
                (self.average_entry_price * self.volume + price * volume) / total;
            self.volume = total;
            outcome.opened_volume = volume;
            return outcome;
        }

        let closing = volume.min(self.volume);
        outcome.closed = Some(ClosedPortion {
            side: self.side,
            volume: closing,
            entry_price: self.average_entry_price,
            exit_price: price,
            opened_at: self.opened_at,
        });
        self.volume -= closing;

        if self.volume <= EPSILON {
            *self = Self::flat();
            outcome.flattened = true;
        }

        let remainder = volume - closing;
        if remainder > EPSILON {
            self.open(fill_side, price, remainder, time);
            outcome.opened = true;
            outcome.opened_volume = remainder;
        }

        outcome
    }

    fn open(&mut self, side: PositionSide, price: f64, volume: f64, time: DateTime<Utc>) {
        self.side = side;
        self.volume = volume;
        self.average_entry_price = price;
        self.opened_at = Some(time);
    }
}
