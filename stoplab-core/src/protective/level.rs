//! Protective level state attached to one open position or hedge leg.

use super::ratchet::Ratchet;
use crate::domain::{ActionReason, PositionSide};
use serde::{Deserialize, Serialize};

/// What last placed the stop where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    #[default]
    Initial,
    Breakeven,
    Trailing,
}

impl StopKind {
    pub fn exit_reason(self) -> ActionReason {
        match self {
            StopKind::Initial => ActionReason::StopLoss,
            StopKind::Breakeven => ActionReason::BreakevenStop,
            StopKind::Trailing => ActionReason::TrailingStop,
        }
    }
}

/// Stop/take state for one position.
///
/// `None` prices mean "no limit configured", never zero. Distances are kept
/// in price units so levels can be rebased when add-on fills move the
/// average entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtectiveLevel {
    pub stop_price: Option<f64>,
    pub take_price: Option<f64>,
    /// First target; reduces the position once.
    pub partial_take_price: Option<f64>,
    /// Best favourable reference price since trailing activation.
    pub trailing_anchor: Option<f64>,
    pub trailing_active: bool,
    pub breakeven_applied: bool,
    pub partial_taken: bool,
    pub stop_kind: StopKind,

    pub stop_distance: Option<f64>,
    pub take_distance: Option<f64>,
    pub partial_take_distance: Option<f64>,
}

impl ProtectiveLevel {
    /// Initial state for a position opened at `entry`.
    pub fn initial(
        side: PositionSide,
        entry: f64,
        stop_distance: Option<f64>,
        take_distance: Option<f64>,
        partial_take_distance: Option<f64>,
    ) -> Self {
        let sign = side.sign();
        Self {
            stop_price: stop_distance.map(|d| entry - sign * d),
            take_price: take_distance.map(|d| entry + sign * d),
            partial_take_price: partial_take_distance.map(|d| entry + sign * d),
            stop_distance,
            take_distance,
            partial_take_distance,
            ..Self::default()
        }
    }

    /// True when the stop sits at or beyond `entry` in the favourable direction.
    pub fn stop_locks_entry(&self, side: PositionSide, entry: f64) -> bool {
        match self.stop_price {
            Some(stop) => (stop - entry) * side.sign() >= -crate::domain::EPSILON,
            None => false,
        }
    }

    /// Move every level that still tracks the entry to a new average entry.
    ///
    /// The stop follows only while it is still the initial stop. Once
    /// breakeven has applied, the stop is raised (lowered for shorts) to the
    /// new entry plus `breakeven_offset` if it sits below it; a trailed stop
    /// already beyond that stays put.
    pub fn rebase(&mut self, side: PositionSide, entry: f64, breakeven_offset: f64) {
        let sign = side.sign();
        if !self.trailing_active && !self.breakeven_applied {
            if let Some(d) = self.stop_distance {
                self.stop_price = Some(entry - sign * d);
            }
        }
        if self.breakeven_applied {
            let floor = entry + sign * breakeven_offset;
            if let Some(stop) = Ratchet::tighten_only(side).apply(self.stop_price, floor) {
                self.stop_price = Some(stop);
                self.stop_kind = StopKind::Breakeven;
            }
        }
        if let Some(d) = self.take_distance {
            self.take_price = Some(entry + sign * d);
        }
        if !self.partial_taken {
            if let Some(d) = self.partial_take_distance {
                self.partial_take_price = Some(entry + sign * d);
            }
        }
    }
}
