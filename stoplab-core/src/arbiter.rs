//! Exit arbitration — reduce every competing condition to one action.
//!
//! Net mode priority, highest first:
//! 1. protective breach → `Close`
//! 2. hedge liquidation trigger → `Close`
//! 3. opposite signal → `Reverse` (or `Close` when the new side cannot trade)
//! 4. time exit / flat signal exit → `Close`
//! 5. partial target → `Reduce`
//! 6. entry signal while flat → `Open`
//! 7. pyramid condition → `AddUnit`
//! 8. nothing → `None`
//!
//! A bar that breaches the stop never reverses through it: the close is
//! decided first and the signal is re-evaluated once the position is flat.

use crate::config::{EngineConfig, TradingMode};
use crate::domain::{
    AccountSnapshot, Action, ActionKind, ActionReason, Position, PositionSide, Signal, EPSILON,
};
use crate::hedge::{HedgeDecision, HedgeLock};
use crate::protective::{HitKind, LevelHit};
use crate::sizing::{PositionSizer, PyramidState, SizingState};
use tracing::debug;

/// Everything a net-mode decision reads. Nothing here is mutated.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub signal: &'a Signal,
    pub position: &'a Position,
    pub stop_event: Option<LevelHit>,
    pub hedge_event: HedgeDecision,
    pub account: &'a AccountSnapshot,
    pub sizing: &'a SizingState,
    pub pyramid: Option<&'a PyramidState>,
    /// Bars since the position opened.
    pub bars_held: u32,
    /// Reference price for pyramiding and projected reversal pnl.
    pub price: f64,
}

/// Everything a hedge-mode decision reads.
#[derive(Debug, Clone, Copy)]
pub struct HedgeContext<'a> {
    pub signal: &'a Signal,
    pub lock: &'a HedgeLock,
    /// First leg whose own level fired this cycle.
    pub leg_event: Option<(PositionSide, LevelHit)>,
    pub hedge_event: HedgeDecision,
}

#[derive(Debug, Clone)]
pub struct ExitArbiter {
    sizer: PositionSizer,
    trading_mode: TradingMode,
    max_holding_bars: Option<u32>,
    close_on_flat_signal: bool,
    partial_take_fraction: f64,
    max_pyramid_units: u32,
    pyramid_add_interval: f64,
    point_value: f64,
}

impl ExitArbiter {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            sizer: PositionSizer::from_config(config),
            trading_mode: config.trading_mode,
            max_holding_bars: config.max_holding_bars,
            close_on_flat_signal: config.close_on_flat_signal,
            partial_take_fraction: config.partial_take_fraction,
            max_pyramid_units: config.max_pyramid_units,
            pyramid_add_interval: config.pyramid_add_interval,
            point_value: config.point_value,
        }
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    /// Net-mode decision.
    pub fn decide(&self, ctx: &DecisionContext<'_>) -> Action {
        let position = ctx.position;

        if position.is_flat() {
            return self.entry(ctx);
        }
        let side = position.side;

        // 1. Protective breach
        if let Some(hit) = ctx.stop_event.filter(LevelHit::is_full_exit) {
            if let Some(action) = self.protective_exit(position, &hit) {
                return action;
            }
        }

        // 2. Liquidation trigger
        if ctx.hedge_event == HedgeDecision::LiquidateAll {
            return Action::close(side, position.volume, ActionReason::HedgeLiquidation);
        }

        // 3. Opposite signal
        if ctx.signal.direction.side() == Some(side.opposite()) {
            return self.reversal(ctx, side);
        }

        // 4. Time exit / flat-signal exit
        if let Some(limit) = self.max_holding_bars {
            if ctx.bars_held >= limit {
                return Action::close(side, position.volume, ActionReason::TimeExit);
            }
        }
        if self.close_on_flat_signal && ctx.signal.direction.side().is_none() {
            return Action::close(side, position.volume, ActionReason::SignalExit);
        }

        // 5. Partial target
        if let Some(hit) = ctx.stop_event.filter(|h| h.kind == HitKind::PartialTake) {
            if let Some(action) = self.protective_exit(position, &hit) {
                return action;
            }
        }

        // 7. Pyramid (entry, 6, returned early while flat)
        if let Some(action) = self.pyramid(ctx) {
            return action;
        }

        Action::none()
    }

    /// Action for a protective hit on its own, without signal or time rules.
    ///
    /// Used for tick-driven exits, where only levels may act.
    pub fn protective_exit(&self, position: &Position, hit: &LevelHit) -> Option<Action> {
        if position.is_flat() {
            return None;
        }
        if hit.is_full_exit() {
            Some(
                Action::close(position.side, position.volume, hit.reason())
                    .with_price_hint(hit.exit_price),
            )
        } else {
            self.partial(position, hit)
        }
    }

    /// Close a hedge leg whose own level fired.
    pub fn close_leg(&self, lock: &HedgeLock, side: PositionSide, hit: &LevelHit) -> Option<Action> {
        let volume = lock.volume(side);
        if volume <= 0.0 {
            return None;
        }
        let reason = match hit.kind {
            HitKind::Stop(_) => ActionReason::LegStop,
            HitKind::Take | HitKind::PartialTake => ActionReason::LegTarget,
        };
        Some(Action::new(ActionKind::CloseLeg, side, volume, reason).with_price_hint(hit.exit_price))
    }

    fn entry(&self, ctx: &DecisionContext<'_>) -> Action {
        let Some(side) = ctx.signal.direction.side() else {
            return Action::none();
        };
        if !self.trading_mode.allows(side) {
            debug!(?side, mode = ?self.trading_mode, "entry side not allowed");
            return Action::none();
        }
        let volume = self.sizer.compute(ctx.signal, ctx.account, ctx.sizing).volume();
        if volume <= 0.0 {
            return Action::none();
        }
        Action::open(side, volume)
    }

    fn reversal(&self, ctx: &DecisionContext<'_>, side: PositionSide) -> Action {
        let position = ctx.position;
        let new_side = side.opposite();
        let exit = Action::close(side, position.volume, ActionReason::SignalExit);
        if !self.trading_mode.allows(new_side) {
            return exit;
        }

        // Size the new leg as if the close had already been booked.
        let mut projected = ctx.sizing.clone();
        projected.record_close(position.unrealized_points(ctx.price) * self.point_value);
        let volume = self.sizer.compute(ctx.signal, ctx.account, &projected).volume();
        if volume <= 0.0 {
            return exit;
        }
        Action::new(
            ActionKind::Reverse {
                close_volume: position.volume,
            },
            new_side,
            volume,
            ActionReason::SignalReversal,
        )
    }

    fn partial(&self, position: &Position, hit: &LevelHit) -> Option<Action> {
        let reduce = self.sizer.normalize(position.volume * self.partial_take_fraction);
        if reduce <= 0.0 {
            debug!(volume = position.volume, "partial target rounds to zero, skipped");
            return None;
        }
        let remainder = position.volume - reduce;
        let action = if remainder + EPSILON < self.sizer.volume_spec().min {
            Action::close(position.side, position.volume, ActionReason::PartialTake)
        } else {
            Action::new(ActionKind::Reduce, position.side, reduce, ActionReason::PartialTake)
        };
        Some(action.with_price_hint(hit.exit_price))
    }

    fn pyramid(&self, ctx: &DecisionContext<'_>) -> Option<Action> {
        let pyramid = ctx.pyramid?;
        let atr = ctx.signal.usable_atr()?;
        let side = ctx.position.side;
        if !pyramid.should_add(
            side,
            ctx.price,
            atr,
            self.pyramid_add_interval,
            self.max_pyramid_units,
        ) {
            return None;
        }
        let room = self.sizer.volume_spec().max - ctx.position.volume;
        let volume = self.sizer.normalize(pyramid.unit_volume().min(room));
        if volume <= 0.0 {
            return None;
        }
        Some(Action::new(ActionKind::AddUnit, side, volume, ActionReason::Pyramid))
    }

    /// Hedge-mode decision.
    ///
    /// 1. a leg's own level fired → `CloseLeg`
    /// 2. liquidation trigger → `LiquidateAll`
    /// 3. no legs and an entry signal → `OpenLock`
    /// 4. one side missing → `OpenLeg` at the next generation's volume
    pub fn decide_hedge(&self, ctx: &HedgeContext<'_>) -> Action {
        let lock = ctx.lock;

        if let Some((side, hit)) = ctx.leg_event {
            if let Some(action) = self.close_leg(lock, side, &hit) {
                return action;
            }
        }

        if ctx.hedge_event == HedgeDecision::LiquidateAll && !lock.is_empty() {
            let long_volume = lock.volume(PositionSide::Long);
            let short_volume = lock.volume(PositionSide::Short);
            return Action::new(
                ActionKind::LiquidateAll {
                    long_volume,
                    short_volume,
                },
                PositionSide::Flat,
                long_volume + short_volume,
                ActionReason::HedgeLiquidation,
            );
        }

        if lock.is_empty() {
            if ctx.signal.direction.side().is_none() {
                return Action::none();
            }
            let volume = self.sizer.scaled_base(0);
            if volume <= 0.0 {
                return Action::none();
            }
            return Action::new(
                ActionKind::OpenLock,
                PositionSide::Flat,
                volume,
                ActionReason::LockOpen,
            );
        }

        if let Some(side) = lock.missing_side() {
            let volume = self.sizer.scaled_base(lock.generation() + 1);
            if volume > 0.0 {
                return Action::new(ActionKind::OpenLeg, side, volume, ActionReason::LockReopen);
            }
        }

        Action::none()
    }
}
