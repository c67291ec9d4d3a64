//! Order gateway seam and a simulated (paper) gateway.
//!
//! The engine never executes anything itself. It hands an [`Action`] to an
//! [`OrderGateway`] and waits for [`Fill`]s. The paper gateway fills protective
//! exits immediately at their price hint and queues market actions for the
//! next bar's open, keeping a [`PaperAccount`] in step with every execution.

use crate::domain::{AccountSnapshot, Action, Fill, PlannedFill, Position, PositionSide};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Executes engine actions.
pub trait OrderGateway {
    /// Accept an action. Fills known right away are returned; the rest are
    /// reported later through whatever channel the implementation uses.
    fn submit(&mut self, action: &Action) -> Vec<Fill>;
}

/// Simulated account with one book per side, so hedge legs and net positions
/// are both representable.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperAccount {
    balance: f64,
    long: Position,
    short: Position,
    point_value: f64,
}

impl PaperAccount {
    pub fn new(initial_balance: f64, point_value: f64) -> Self {
        Self {
            balance: initial_balance,
            long: Position::flat(),
            short: Position::flat(),
            point_value,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn book(&self, side: PositionSide) -> Option<&Position> {
        match side {
            PositionSide::Long => Some(&self.long),
            PositionSide::Short => Some(&self.short),
            PositionSide::Flat => None,
        }
    }

    /// Book one planned execution. Realized profit moves into the balance.
    pub fn apply(&mut self, planned: &PlannedFill, price: f64, time: DateTime<Utc>) {
        let book = match planned.book {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
            PositionSide::Flat => return,
        };
        let outcome = book.apply_fill(planned.order_side, price, planned.volume, time);
        if let Some(closed) = outcome.closed {
            self.balance += closed.gross_points() * self.point_value;
        }
    }

    /// Equity marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        let floating = self.long.unrealized_points(price) + self.short.unrealized_points(price);
        self.balance + floating * self.point_value
    }

    pub fn snapshot(&self, price: f64) -> AccountSnapshot {
        AccountSnapshot::new(self.equity(price), self.balance)
    }
}

/// Paper gateway: market actions fill at the next price it is given,
/// protective exits fill at their price hint right away.
#[derive(Debug, Clone)]
pub struct PaperGateway {
    account: PaperAccount,
    queued: Vec<Action>,
    clock: Option<DateTime<Utc>>,
}

impl PaperGateway {
    pub fn new(account: PaperAccount) -> Self {
        Self {
            account,
            queued: Vec::new(),
            clock: None,
        }
    }

    pub fn account(&self) -> &PaperAccount {
        &self.account
    }

    pub fn set_clock(&mut self, time: DateTime<Utc>) {
        self.clock = Some(time);
    }

    pub fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Fill every queued action at `price`.
    pub fn fill_queued(&mut self, price: f64, time: DateTime<Utc>) -> Vec<Fill> {
        let queued = std::mem::take(&mut self.queued);
        queued
            .iter()
            .flat_map(|action| self.execute(action, price, time))
            .collect()
    }

    fn execute(&mut self, action: &Action, price: f64, time: DateTime<Utc>) -> Vec<Fill> {
        let Some(action_id) = action.id else {
            return Vec::new();
        };
        action
            .fill_plan()
            .into_iter()
            .map(|planned| {
                self.account.apply(&planned, price, time);
                debug!(%action_id, side = ?planned.order_side, price, volume = planned.volume, "paper fill");
                Fill {
                    action_id,
                    time,
                    side: planned.order_side,
                    price,
                    volume: planned.volume,
                }
            })
            .collect()
    }
}

impl OrderGateway for PaperGateway {
    fn submit(&mut self, action: &Action) -> Vec<Fill> {
        if action.is_none() {
            return Vec::new();
        }
        match (action.price_hint, self.clock) {
            (Some(price), Some(time)) => self.execute(action, price, time),
            _ => {
                self.queued.push(action.clone());
                Vec::new()
            }
        }
    }
}
