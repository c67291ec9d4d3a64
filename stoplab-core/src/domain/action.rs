//! Actions — the single net decision the engine emits per cycle.
//!
//! An action is an intent handed to the order gateway, never a fill. The
//! position only changes once the gateway reports fills for the action.

use super::ids::ActionId;
use super::position::{OrderSide, PositionSide};
use serde::{Deserialize, Serialize};

/// What the engine wants the gateway to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    None,
    /// Open a new position from flat.
    Open,
    /// Add one pyramid unit to the open position.
    AddUnit,
    /// Close the full position.
    Close,
    /// Close part of the position.
    Reduce,
    /// Close `close_volume` of the current side, then open `volume` on `side`.
    Reverse { close_volume: f64 },
    /// Open equal long and short legs of `volume` each.
    OpenLock,
    /// Open a single hedge leg on `side`.
    OpenLeg,
    /// Close the hedge leg on `side`.
    CloseLeg,
    /// Close every hedge leg.
    LiquidateAll { long_volume: f64, short_volume: f64 },
}

/// Why the action was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    None,
    StopLoss,
    BreakevenStop,
    TrailingStop,
    TakeProfit,
    PartialTake,
    TimeExit,
    SignalExit,
    SignalReversal,
    SignalEntry,
    Pyramid,
    HedgeLiquidation,
    LockOpen,
    LockReopen,
    LegStop,
    LegTarget,
}

/// One expected execution of an action, from the gateway's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedFill {
    /// Book (position or hedge leg) the execution applies to.
    pub book: PositionSide,
    /// True when the execution increases exposure on `book`.
    pub opening: bool,
    pub order_side: OrderSide,
    pub volume: f64,
}

/// A single engine decision.
///
/// `side` is the side being opened for `Open`, `AddUnit`, `Reverse`,
/// `OpenLeg` and the side being closed for `Close`, `Reduce`, `CloseLeg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Option<ActionId>,
    pub kind: ActionKind,
    pub side: PositionSide,
    pub volume: f64,
    pub reason: ActionReason,
    /// Level price for protective exits; `None` means "at market".
    pub price_hint: Option<f64>,
}

impl Action {
    pub fn none() -> Self {
        Self {
            id: None,
            kind: ActionKind::None,
            side: PositionSide::Flat,
            volume: 0.0,
            reason: ActionReason::None,
            price_hint: None,
        }
    }

    pub fn new(kind: ActionKind, side: PositionSide, volume: f64, reason: ActionReason) -> Self {
        Self {
            id: None,
            kind,
            side,
            volume,
            reason,
            price_hint: None,
        }
    }

    pub fn open(side: PositionSide, volume: f64) -> Self {
        Self::new(ActionKind::Open, side, volume, ActionReason::SignalEntry)
    }

    pub fn close(side: PositionSide, volume: f64, reason: ActionReason) -> Self {
        Self::new(ActionKind::Close, side, volume, reason)
    }

    pub fn with_price_hint(mut self, price: f64) -> Self {
        self.price_hint = Some(price);
        self
    }

    pub fn is_none(&self) -> bool {
        self.kind == ActionKind::None
    }

    /// Executions the gateway is expected to report for this action.
    pub fn fill_plan(&self) -> Vec<PlannedFill> {
        let open = |book: PositionSide, volume: f64| PlannedFill {
            book,
            opening: true,
            order_side: OrderSide::to_open(book),
            volume,
        };
        let close = |book: PositionSide, volume: f64| PlannedFill {
            book,
            opening: false,
            order_side: OrderSide::to_close(book),
            volume,
        };

        let plan = match self.kind {
            ActionKind::None => vec![],
            ActionKind::Open | ActionKind::AddUnit | ActionKind::OpenLeg => {
                vec![open(self.side, self.volume)]
            }
            ActionKind::Close | ActionKind::Reduce | ActionKind::CloseLeg => {
                vec![close(self.side, self.volume)]
            }
            ActionKind::Reverse { close_volume } => vec![
                close(self.side.opposite(), close_volume),
                open(self.side, self.volume),
            ],
            ActionKind::OpenLock => vec![
                open(PositionSide::Long, self.volume),
                open(PositionSide::Short, self.volume),
            ],
            ActionKind::LiquidateAll {
                long_volume,
                short_volume,
            } => vec![
                close(PositionSide::Long, long_volume),
                close(PositionSide::Short, short_volume),
            ],
        };

        plan.into_iter().filter(|p| p.volume > 0.0).collect()
    }
}
