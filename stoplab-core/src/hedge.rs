//! Hedge lock — paired long and short legs managed as one book.
//!
//! The lock opens both legs at once. Each leg carries its own protective
//! level and is closed on its own when that level fires; a missing side is
//! reopened at a volume that grows with every generation. The whole book is
//! liquidated only when realized gains cover the floating loss by a margin.

use crate::domain::{AccountSnapshot, ClosedPortion, PositionSide, EPSILON};
use crate::protective::{LevelHit, ProtectiveLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One side of the lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub is_long: bool,
    pub volume: f64,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    /// Engine bar counter at the first fill.
    pub opened_bar: u64,
    pub level: ProtectiveLevel,
    /// A level hit not yet serviced. Kept until the leg is closed, whatever
    /// price does in the meantime.
    #[serde(default)]
    pub pending_exit: Option<LevelHit>,
}

impl Leg {
    pub fn side(&self) -> PositionSide {
        if self.is_long {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    /// Floating profit in price units times volume.
    pub fn floating_points(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side().sign() * self.volume
    }
}

/// Liquidation thresholds in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgeThresholds {
    pub max_excess: f64,
    pub min_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeDecision {
    Continue,
    LiquidateAll,
}

/// The leg book plus the reference balance for liquidation checks.
///
/// At most one leg per side; further fills on a side average into its leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeLock {
    legs: Vec<Leg>,
    balance_at_last_flat: f64,
    generation: u32,
}

impl HedgeLock {
    pub fn new(balance_at_last_flat: f64) -> Self {
        Self {
            legs: Vec::new(),
            balance_at_last_flat,
            generation: 0,
        }
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn legs_mut(&mut self) -> &mut [Leg] {
        &mut self.legs
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn leg(&self, side: PositionSide) -> Option<&Leg> {
        self.legs.iter().find(|l| l.side() == side)
    }

    pub fn leg_mut(&mut self, side: PositionSide) -> Option<&mut Leg> {
        self.legs.iter_mut().find(|l| l.side() == side)
    }

    pub fn volume(&self, side: PositionSide) -> f64 {
        self.leg(side).map_or(0.0, |l| l.volume)
    }

    /// First side with no open leg, long before short.
    pub fn missing_side(&self) -> Option<PositionSide> {
        [PositionSide::Long, PositionSide::Short]
            .into_iter()
            .find(|&s| self.leg(s).is_none())
    }

    /// First leg with an unserviced level hit, long before short.
    pub fn pending_exit(&self) -> Option<(PositionSide, LevelHit)> {
        [PositionSide::Long, PositionSide::Short]
            .into_iter()
            .find_map(|side| self.leg(side)?.pending_exit.map(|hit| (side, hit)))
    }

    pub fn balance_at_last_flat(&self) -> f64 {
        self.balance_at_last_flat
    }

    pub fn set_balance_at_last_flat(&mut self, balance: f64) {
        self.balance_at_last_flat = balance;
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation = self.generation.saturating_add(1);
    }

    /// Add volume to a side, creating the leg if needed.
    ///
    /// Returns true when a new leg was created.
    pub fn open(
        &mut self,
        side: PositionSide,
        price: f64,
        volume: f64,
        time: DateTime<Utc>,
        bar: u64,
        level: impl FnOnce() -> ProtectiveLevel,
    ) -> bool {
        match self.leg_mut(side) {
            Some(leg) => {
                let total = leg.volume + volume;
                leg.entry_price = (leg.entry_price * leg.volume + price * volume) / total;
                leg.volume = total;
                false
            }
            None => {
                self.legs.push(Leg {
                    is_long: side == PositionSide::Long,
                    volume,
                    entry_price: price,
                    opened_at: time,
                    opened_bar: bar,
                    level: level(),
                    pending_exit: None,
                });
                true
            }
        }
    }

    /// Reduce a side; the leg is removed once its volume is exhausted.
    ///
    /// Returns the closed portion and the bar the leg opened on, or `None`
    /// when the side has no leg.
    pub fn close(
        &mut self,
        side: PositionSide,
        price: f64,
        volume: f64,
    ) -> Option<(ClosedPortion, u64)> {
        let index = self.legs.iter().position(|l| l.side() == side)?;
        let leg = &mut self.legs[index];
        let closing = volume.min(leg.volume);
        let closed = ClosedPortion {
            side,
            volume: closing,
            entry_price: leg.entry_price,
            exit_price: price,
            opened_at: Some(leg.opened_at),
        };
        let opened_bar = leg.opened_bar;
        leg.volume -= closing;
        if leg.volume <= EPSILON {
            self.legs.remove(index);
        }
        Some((closed, opened_bar))
    }
}

/// Stateless liquidation rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeLockCoordinator {
    thresholds: HedgeThresholds,
}

impl HedgeLockCoordinator {
    pub fn new(thresholds: HedgeThresholds) -> Self {
        Self { thresholds }
    }

    /// Liquidate only when the floating loss exceeds `max_excess` **and**
    /// equity still sits above the last flat balance by `min_profit`.
    pub fn evaluate(
        &self,
        legs: &[Leg],
        account: &AccountSnapshot,
        balance_at_last_flat: f64,
    ) -> HedgeDecision {
        if legs.is_empty() {
            return HedgeDecision::Continue;
        }
        let excess = account.floating_loss();
        let profitable = account.equity > balance_at_last_flat + self.thresholds.min_profit;
        if excess > self.thresholds.max_excess && profitable {
            info!(
                excess,
                equity = account.equity,
                balance_at_last_flat,
                max_excess = self.thresholds.max_excess,
                min_profit = self.thresholds.min_profit,
                "hedge lock liquidation triggered"
            );
            HedgeDecision::LiquidateAll
        } else {
            HedgeDecision::Continue
        }
    }

    /// Convenience over [`HedgeLockCoordinator::evaluate`] for a whole lock.
    pub fn evaluate_lock(&self, lock: &HedgeLock, account: &AccountSnapshot) -> HedgeDecision {
        self.evaluate(lock.legs(), account, lock.balance_at_last_flat())
    }

    /// Reset bookkeeping once a liquidation has been decided.
    pub fn on_liquidated(&self, lock: &mut HedgeLock, equity: f64) {
        lock.balance_at_last_flat = equity;
        lock.generation = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn locked(balance: f64) -> HedgeLock {
        let mut lock = HedgeLock::new(balance);
        lock.open(PositionSide::Long, 100.0, 1.0, t(), 0, ProtectiveLevel::default);
        lock.open(PositionSide::Short, 100.0, 1.0, t(), 0, ProtectiveLevel::default);
        lock
    }

    fn coordinator(max_excess: f64, min_profit: f64) -> HedgeLockCoordinator {
        HedgeLockCoordinator::new(HedgeThresholds {
            max_excess,
            min_profit,
        })
    }

    // ── Legs ──

    #[test]
    fn one_leg_per_side_with_weighted_entry() {
        let mut lock = locked(1_000.0);
        assert!(!lock.open(PositionSide::Long, 103.0, 2.0, t(), 1, ProtectiveLevel::default));
        assert_eq!(lock.legs().len(), 2);
        let long = lock.leg(PositionSide::Long).unwrap();
        assert!((long.entry_price - 102.0).abs() < 1e-12);
        assert_eq!(long.volume, 3.0);
    }

    #[test]
    fn closing_a_leg_removes_it() {
        let mut lock = locked(1_000.0);
        let (closed, bar) = lock.close(PositionSide::Short, 95.0, 1.0).unwrap();
        assert_eq!(closed.gross_points(), 5.0);
        assert_eq!(bar, 0);
        assert!(lock.leg(PositionSide::Short).is_none());
        assert_eq!(lock.missing_side(), Some(PositionSide::Short));
        assert!(lock.close(PositionSide::Short, 95.0, 1.0).is_none());
    }

    #[test]
    fn pending_exit_prefers_the_long_leg() {
        use crate::protective::HitKind;
        let hit = |price| LevelHit {
            kind: HitKind::Take,
            level_price: price,
            exit_price: price,
            gapped: false,
        };
        let mut lock = locked(1_000.0);
        assert_eq!(lock.pending_exit(), None);
        lock.leg_mut(PositionSide::Short).unwrap().pending_exit = Some(hit(97.0));
        lock.leg_mut(PositionSide::Long).unwrap().pending_exit = Some(hit(103.0));
        assert_eq!(lock.pending_exit(), Some((PositionSide::Long, hit(103.0))));

        lock.close(PositionSide::Long, 103.0, 1.0);
        assert_eq!(lock.pending_exit(), Some((PositionSide::Short, hit(97.0))));
    }

    #[test]
    fn floating_points_by_side() {
        let lock = locked(1_000.0);
        assert_eq!(lock.leg(PositionSide::Long).unwrap().floating_points(98.0), -2.0);
        assert_eq!(lock.leg(PositionSide::Short).unwrap().floating_points(98.0), 2.0);
    }

    // ── Liquidation rule ──

    #[test]
    fn liquidates_when_gains_cover_the_excess() {
        let lock = locked(1_000.0);
        // balance grew to 1,200 from closed legs, floating loss 150
        let acct = AccountSnapshot::new(1_050.0, 1_200.0);
        assert_eq!(coordinator(100.0, 20.0).evaluate_lock(&lock, &acct), HedgeDecision::LiquidateAll);
    }

    #[test]
    fn never_liquidates_at_a_net_loss() {
        let lock = locked(1_000.0);
        // large floating loss, equity below the last flat balance
        let acct = AccountSnapshot::new(900.0, 1_100.0);
        assert_eq!(coordinator(100.0, 0.0).evaluate_lock(&lock, &acct), HedgeDecision::Continue);
    }

    #[test]
    fn small_excess_continues() {
        let lock = locked(1_000.0);
        let acct = AccountSnapshot::new(1_150.0, 1_200.0);
        assert_eq!(coordinator(100.0, 0.0).evaluate_lock(&lock, &acct), HedgeDecision::Continue);
    }

    #[test]
    fn empty_lock_continues() {
        let acct = AccountSnapshot::new(2_000.0, 5_000.0);
        assert_eq!(
            coordinator(0.0, 0.0).evaluate(&[], &acct, 0.0),
            HedgeDecision::Continue
        );
    }

    #[test]
    fn on_liquidated_resets_reference_and_generation() {
        let mut lock = locked(1_000.0);
        lock.bump_generation();
        lock.bump_generation();
        coordinator(0.0, 0.0).on_liquidated(&mut lock, 1_234.0);
        assert_eq!(lock.generation(), 0);
        assert_eq!(lock.balance_at_last_flat(), 1_234.0);
    }
}
