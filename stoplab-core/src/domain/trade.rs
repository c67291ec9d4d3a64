//! TradeRecord — a closed round trip, used for win/loss bookkeeping.

use super::action::ActionReason;
use super::position::{ClosedPortion, PositionSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed (or partially completed) round trip: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,

    // ── Entry ──
    pub entry_time: Option<DateTime<Utc>>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ActionReason,

    // ── Size & result ──
    pub volume: f64,
    /// Profit in account currency (price move × volume × point value).
    pub pnl: f64,
    pub bars_held: u32,
}

impl TradeRecord {
    pub fn from_closed(
        closed: &ClosedPortion,
        exit_time: DateTime<Utc>,
        exit_reason: ActionReason,
        point_value: f64,
        bars_held: u32,
    ) -> Self {
        Self {
            side: closed.side,
            entry_time: closed.opened_at,
            entry_price: closed.entry_price,
            exit_time,
            exit_price: closed.exit_price,
            exit_reason,
            volume: closed.volume,
            pnl: closed.gross_points() * point_value,
            bars_held,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }
}
