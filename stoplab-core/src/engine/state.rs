//! Engine mutable state, counters and the pending-action record.

use crate::domain::{Action, ActionId, IdGen, OrderSide, PlannedFill, Position, TradeRecord, EPSILON};
use crate::hedge::HedgeLock;
use crate::protective::ProtectiveLevel;
use crate::sizing::{PyramidState, SizingState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters surfaced for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub bars: u64,
    pub quotes: u64,
    pub actions: u64,
    pub fills: u64,
    pub rejects: u64,
    /// Stale or insane events dropped without processing.
    pub dropped_events: u64,
    /// Entry signals that produced no volume.
    pub sizing_skips: u64,
}

/// A submitted action whose fills have not all arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub action: Action,
    /// Planned executions still outstanding, in plan order.
    pub remaining: Vec<PlannedFill>,
}

impl Pending {
    pub fn new(action: Action) -> Self {
        let remaining = action.fill_plan();
        Self { action, remaining }
    }

    pub fn id(&self) -> Option<ActionId> {
        self.action.id
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.iter().all(|p| p.volume <= EPSILON)
    }

    pub fn outstanding(&self, side: OrderSide) -> f64 {
        self.remaining
            .iter()
            .filter(|p| p.order_side == side)
            .map(|p| p.volume)
            .sum()
    }

    /// Split a fill across outstanding plan entries of the same order side.
    ///
    /// Returns the slices in plan order without mutating; the caller commits
    /// them with [`Pending::consume`] once they are validated.
    pub fn allocate(&self, side: OrderSide, volume: f64) -> Vec<(usize, PlannedFill)> {
        let mut left = volume;
        let mut slices = Vec::new();
        for (index, planned) in self.remaining.iter().enumerate() {
            if left <= EPSILON {
                break;
            }
            if planned.order_side != side || planned.volume <= EPSILON {
                continue;
            }
            let take = left.min(planned.volume);
            slices.push((
                index,
                PlannedFill {
                    volume: take,
                    ..*planned
                },
            ));
            left -= take;
        }
        slices
    }

    pub fn consume(&mut self, index: usize, volume: f64) {
        if let Some(planned) = self.remaining.get_mut(index) {
            planned.volume = (planned.volume - volume).max(0.0);
        }
    }
}

/// Mutable state that evolves event by event. Owned by exactly one engine.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub position: Position,
    pub level: Option<ProtectiveLevel>,
    pub pyramid: Option<PyramidState>,
    pub lock: Option<HedgeLock>,
    pub sizing: SizingState,
    pub pending: Option<Pending>,
    pub ids: IdGen,

    // ── Clocks ──
    pub last_bar_time: Option<DateTime<Utc>>,
    pub last_quote_time: Option<DateTime<Utc>>,

    // ── Position lifetime ──
    /// Bar counter value when the current net position opened.
    pub entry_bar: u64,
    /// ATR hint of the signal that opened the position.
    pub entry_atr: Option<f64>,
    /// Realized pnl accumulated over the current position lifetime.
    pub lifetime_pnl: f64,

    pub trades: Vec<TradeRecord>,
    pub stats: EngineStats,
    pub halted: Option<String>,
}

impl EngineState {
    pub fn new(sizing: SizingState, lock: Option<HedgeLock>) -> Self {
        Self {
            sizing,
            lock,
            ..Self::default()
        }
    }

    pub fn bars_held(&self) -> u32 {
        if self.position.is_flat() {
            0
        } else {
            self.stats.bars.saturating_sub(self.entry_bar) as u32
        }
    }
}
