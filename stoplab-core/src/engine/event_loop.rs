//! Per-instrument engine — the reactive state machine.
//!
//! Driven by explicit calls in timestamp order:
//! - [`Engine::on_bar`]: completed bar + signal + account snapshot → one action
//! - [`Engine::on_quote`]: tick-level protective updates
//! - [`Engine::on_fill`] / [`Engine::on_reject`]: gateway reports
//!
//! The position changes only through confirmed fills. While an action is
//! pending no new decision is made. Any fill that does not match the pending
//! action halts the engine; every later call returns [`EngineError::Halted`].

use crate::arbiter::{DecisionContext, ExitArbiter, HedgeContext};
use crate::config::EngineConfig;
use crate::domain::{
    AccountSnapshot, Action, ActionId, ActionKind, Bar, ClosedPortion, Fill, PlannedFill,
    Position, PositionSide, Quote, Signal, TradeRecord, EPSILON,
};
use crate::engine::state::{EngineState, EngineStats, Pending};
use crate::error::{ConfigError, EngineError};
use crate::fingerprint::ConfigFingerprint;
use crate::hedge::{HedgeDecision, HedgeLock, HedgeLockCoordinator, HedgeThresholds, Leg};
use crate::protective::{LevelHit, LevelUpdate, ProtectiveLevel, ProtectiveStopEngine};
use crate::sizing::{PyramidState, SequenceState, SizingState};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

pub struct Engine {
    config: EngineConfig,
    fingerprint: ConfigFingerprint,
    protective: ProtectiveStopEngine,
    arbiter: ExitArbiter,
    coordinator: HedgeLockCoordinator,
    state: EngineState,
}

impl Engine {
    /// Validate the configuration and build an engine in its initial state.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let fingerprint = config.fingerprint()?;
        let state = Self::initial_state(&config)?;
        info!(
            fingerprint = %fingerprint.short(),
            sizing_mode = ?config.sizing_mode,
            hedge_mode = config.hedge_mode,
            "engine configured"
        );
        Ok(Self {
            protective: ProtectiveStopEngine::from_config(&config),
            arbiter: ExitArbiter::from_config(&config),
            coordinator: HedgeLockCoordinator::new(HedgeThresholds {
                max_excess: config.hedge_max_excess,
                min_profit: config.hedge_min_profit,
            }),
            fingerprint,
            config,
            state,
        })
    }

    fn initial_state(config: &EngineConfig) -> Result<EngineState, ConfigError> {
        let sizing = SizingState::new(config.sequence_state()?);
        let lock = config.hedge_mode.then(|| HedgeLock::new(0.0));
        Ok(EngineState::new(sizing, lock))
    }

    /// Lifecycle hook: drop all position, level, sequence and counter state.
    ///
    /// Also clears a halt; call it only after external reconciliation.
    pub fn reset(&mut self) {
        let sizing = SizingState::new(
            self.state
                .sizing
                .sequence
                .as_ref()
                .map(|s| SequenceState::new(s.initial().to_vec(), self.config.recycle_sequence)),
        );
        let lock = self.config.hedge_mode.then(|| HedgeLock::new(0.0));
        self.state = EngineState::new(sizing, lock);
        info!(fingerprint = %self.fingerprint.short(), "engine reset");
    }

    // ── Accessors ──

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    pub fn position(&self) -> &Position {
        &self.state.position
    }

    pub fn level(&self) -> Option<&ProtectiveLevel> {
        self.state.level.as_ref()
    }

    pub fn legs(&self) -> &[Leg] {
        self.state.lock.as_ref().map_or(&[], |l| l.legs())
    }

    pub fn lock(&self) -> Option<&HedgeLock> {
        self.state.lock.as_ref()
    }

    pub fn sequence(&self) -> Option<&SequenceState> {
        self.state.sizing.sequence.as_ref()
    }

    pub fn sizing_state(&self) -> &SizingState {
        &self.state.sizing
    }

    pub fn pyramid(&self) -> Option<&PyramidState> {
        self.state.pyramid.as_ref()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.state.trades
    }

    pub fn stats(&self) -> &EngineStats {
        &self.state.stats
    }

    pub fn pending_action(&self) -> Option<&Action> {
        self.state.pending.as_ref().map(|p| &p.action)
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.is_some()
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted.is_some()
    }

    pub fn bars_held(&self) -> u32 {
        self.state.bars_held()
    }

    // ── Market events ──

    /// Process one completed bar and return at most one action.
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        signal: &Signal,
        account: &AccountSnapshot,
    ) -> Result<Action, EngineError> {
        self.ensure_running()?;

        if !bar.is_sane() {
            warn!(time = %bar.open_time, open = bar.open, high = bar.high, low = bar.low, close = bar.close, "malformed bar dropped");
            self.state.stats.dropped_events += 1;
            return Ok(Action::none());
        }
        if !accept_time(&mut self.state.last_bar_time, bar.open_time) {
            warn!(time = %bar.open_time, last = ?self.state.last_bar_time, "stale bar dropped");
            self.state.stats.dropped_events += 1;
            return Ok(Action::none());
        }
        self.state.stats.bars += 1;

        if let Some(pending) = &self.state.pending {
            debug!(id = ?pending.id(), "action pending, no decision this bar");
            return Ok(Action::none());
        }

        let action = if self.config.hedge_mode {
            self.hedge_cycle(bar, signal, account)
        } else {
            self.net_cycle(bar, signal, account)
        };

        if action.is_none()
            && signal.direction.side().is_some()
            && self.state.position.is_flat()
            && self.legs().is_empty()
        {
            self.state.stats.sizing_skips += 1;
        }

        if matches!(
            action.kind,
            ActionKind::Open | ActionKind::Reverse { .. } | ActionKind::OpenLock | ActionKind::OpenLeg
        ) {
            self.state.entry_atr = signal.usable_atr();
        }

        Ok(self.emit(action))
    }

    fn net_cycle(&mut self, bar: &Bar, signal: &Signal, account: &AccountSnapshot) -> Action {
        let mut stop_event = None;
        if !self.state.position.is_flat() {
            if let Some(level) = &self.state.level {
                let update = self.protective.update(&self.state.position, level, bar);
                stop_event = update.triggered;
                self.state.level = Some(update.level);
            }
        }

        let ctx = DecisionContext {
            signal,
            position: &self.state.position,
            stop_event,
            hedge_event: HedgeDecision::Continue,
            account,
            sizing: &self.state.sizing,
            pyramid: self.state.pyramid.as_ref(),
            bars_held: self.state.bars_held(),
            price: bar.close,
        };
        self.arbiter.decide(&ctx)
    }

    fn hedge_cycle(&mut self, bar: &Bar, signal: &Signal, account: &AccountSnapshot) -> Action {
        let protective = &self.protective;
        let lock = self
            .state
            .lock
            .get_or_insert_with(|| HedgeLock::new(account.equity));

        if lock.is_empty() {
            lock.set_balance_at_last_flat(account.equity);
        }

        let leg_event = mark_leg_hits(lock, |leg| {
            protective.update_side(leg.side(), leg.entry_price, &leg.level, bar)
        });

        let hedge_event = self.coordinator.evaluate_lock(lock, account);
        let action = self.arbiter.decide_hedge(&HedgeContext {
            signal,
            lock,
            leg_event,
            hedge_event,
        });

        if matches!(action.kind, ActionKind::LiquidateAll { .. }) {
            self.coordinator.on_liquidated(lock, account.equity);
        }
        action
    }

    /// Tick-driven protective update. Only protective exits (and, in hedge
    /// mode, the liquidation trigger) act on quotes.
    pub fn on_quote(
        &mut self,
        quote: &Quote,
        account: &AccountSnapshot,
    ) -> Result<Action, EngineError> {
        self.ensure_running()?;

        if !quote.is_sane() {
            warn!(time = %quote.time, bid = quote.best_bid, ask = quote.best_ask, "malformed quote dropped");
            self.state.stats.dropped_events += 1;
            return Ok(Action::none());
        }
        if !accept_time(&mut self.state.last_quote_time, quote.time) {
            warn!(time = %quote.time, last = ?self.state.last_quote_time, "stale quote dropped");
            self.state.stats.dropped_events += 1;
            return Ok(Action::none());
        }
        self.state.stats.quotes += 1;

        if self.state.pending.is_some() {
            return Ok(Action::none());
        }

        let action = if self.config.hedge_mode {
            self.hedge_quote(quote, account)
        } else {
            self.net_quote(quote)
        };
        Ok(self.emit(action))
    }

    fn net_quote(&mut self, quote: &Quote) -> Action {
        let position = &self.state.position;
        let Some(level) = self.state.level.as_ref().filter(|_| !position.is_flat()) else {
            return Action::none();
        };
        let update =
            self.protective
                .update_on_quote(position.side, position.average_entry_price, level, quote);
        let action = update
            .triggered
            .and_then(|hit| self.arbiter.protective_exit(position, &hit))
            .unwrap_or_else(Action::none);
        self.state.level = Some(update.level);
        action
    }

    fn hedge_quote(&mut self, quote: &Quote, account: &AccountSnapshot) -> Action {
        let protective = &self.protective;
        let Some(lock) = self.state.lock.as_mut() else {
            return Action::none();
        };

        let leg_event = mark_leg_hits(lock, |leg| {
            protective.update_on_quote(leg.side(), leg.entry_price, &leg.level, quote)
        });

        if let Some(action) = leg_event.and_then(|(side, hit)| self.arbiter.close_leg(lock, side, &hit)) {
            return action;
        }
        if self.coordinator.evaluate_lock(lock, account) == HedgeDecision::LiquidateAll {
            let action = self.arbiter.decide_hedge(&HedgeContext {
                signal: &Signal::flat(),
                lock,
                leg_event: None,
                hedge_event: HedgeDecision::LiquidateAll,
            });
            self.coordinator.on_liquidated(lock, account.equity);
            return action;
        }
        Action::none()
    }

    /// Assign an id, mark the action pending and log it.
    fn emit(&mut self, mut action: Action) -> Action {
        if action.is_none() {
            return action;
        }
        let id = self.state.ids.next_action_id();
        action.id = Some(id);
        self.state.stats.actions += 1;
        info!(
            %id,
            kind = ?action.kind,
            side = ?action.side,
            volume = action.volume,
            reason = ?action.reason,
            price_hint = ?action.price_hint,
            "action"
        );
        let pending = Pending::new(action.clone());
        if !pending.is_complete() {
            self.state.pending = Some(pending);
        }
        action
    }

    // ── Gateway reports ──

    /// Apply a confirmed fill.
    pub fn on_fill(&mut self, fill: &Fill) -> Result<(), EngineError> {
        self.ensure_running()?;

        let Some(mut pending) = self.state.pending.clone() else {
            return Err(self.halt(fill.action_id, "fill without a pending action".into()));
        };
        if pending.id() != Some(fill.action_id) {
            let expected = pending.id().map(|id| id.to_string()).unwrap_or_default();
            return Err(self.halt(
                fill.action_id,
                format!("fill does not belong to the pending action {expected}"),
            ));
        }
        if !(fill.price.is_finite() && fill.price > 0.0 && fill.volume.is_finite() && fill.volume > 0.0) {
            return Err(self.halt(
                fill.action_id,
                format!("invalid fill price {} or volume {}", fill.price, fill.volume),
            ));
        }

        let slices = pending.allocate(fill.side, fill.volume);
        let allocated: f64 = slices.iter().map(|(_, s)| s.volume).sum();
        if allocated + EPSILON < fill.volume {
            let reason = if slices.is_empty() {
                format!("unexpected {:?} fill", fill.side)
            } else {
                format!(
                    "fill volume {} exceeds outstanding {}",
                    fill.volume,
                    pending.outstanding(fill.side)
                )
            };
            return Err(self.halt(fill.action_id, reason));
        }
        for (_, slice) in slices.iter().filter(|(_, s)| !s.opening) {
            let available = self.book_volume(slice.book);
            if available + EPSILON < slice.volume {
                return Err(self.halt(
                    fill.action_id,
                    format!(
                        "close of {} {:?} against a book holding {}",
                        slice.volume, slice.book, available
                    ),
                ));
            }
        }

        self.state.stats.fills += 1;
        info!(
            id = %fill.action_id,
            side = ?fill.side,
            price = fill.price,
            volume = fill.volume,
            "fill"
        );

        for (index, slice) in &slices {
            pending.consume(*index, slice.volume);
            if self.config.hedge_mode {
                self.apply_to_lock(slice, fill, &pending.action);
            } else {
                self.apply_to_position(slice, fill, &pending.action);
            }
        }

        if pending.is_complete() {
            self.complete(&pending.action, fill.price);
            self.state.pending = None;
        } else {
            self.state.pending = Some(pending);
        }
        Ok(())
    }

    /// The gateway refused (or cancelled the rest of) an action.
    pub fn on_reject(&mut self, action_id: ActionId) -> Result<(), EngineError> {
        self.ensure_running()?;
        match self.state.pending.take() {
            Some(pending) if pending.id() == Some(action_id) => {
                self.state.stats.rejects += 1;
                let outstanding: f64 = pending.remaining.iter().map(|p| p.volume).sum();
                // Fills already applied stay applied; only the remainder is dropped.
                warn!(%action_id, outstanding, "action rejected, pending cleared");
            }
            other => {
                warn!(%action_id, "reject for an action that is not pending, ignored");
                self.state.pending = other;
            }
        }
        Ok(())
    }

    fn book_volume(&self, book: PositionSide) -> f64 {
        if self.config.hedge_mode {
            self.state.lock.as_ref().map_or(0.0, |l| l.volume(book))
        } else if self.state.position.side == book {
            self.state.position.volume
        } else {
            0.0
        }
    }

    fn apply_to_position(&mut self, slice: &PlannedFill, fill: &Fill, action: &Action) {
        let bars_held = self.state.bars_held();
        let outcome =
            self.state
                .position
                .apply_fill(slice.order_side, fill.price, slice.volume, fill.time);

        if let Some(closed) = outcome.closed {
            let trade = self.record_trade(&closed, fill.time, action, bars_held);
            self.state.lifetime_pnl += trade;
        }
        if outcome.flattened {
            let pnl = std::mem::take(&mut self.state.lifetime_pnl);
            self.state.sizing.record_close(pnl);
            self.state.level = None;
            self.state.pyramid = None;
            info!(
                pnl,
                consecutive_losses = self.state.sizing.consecutive_losses,
                stakes = ?self.state.sizing.sequence.as_ref().map(|s| s.stakes()),
                "position flat"
            );
        }

        let position = &self.state.position;
        if outcome.opened {
            self.state.level = Some(self.protective.open_level(
                position.side,
                position.average_entry_price,
                self.state.entry_atr,
            ));
            self.state.pyramid = Some(PyramidState::new(position.average_entry_price, action.volume));
            self.state.entry_bar = self.state.stats.bars;
            self.state.lifetime_pnl = 0.0;
        } else if outcome.opened_volume > 0.0 {
            if let Some(level) = self.state.level.as_mut() {
                self.protective
                    .rebase(position.side, position.average_entry_price, level);
                debug!(entry = position.average_entry_price, stop = ?level.stop_price, take = ?level.take_price, "levels rebased");
            }
        }
    }

    fn apply_to_lock(&mut self, slice: &PlannedFill, fill: &Fill, action: &Action) {
        let bar = self.state.stats.bars;
        let protective = &self.protective;
        let atr = self.state.entry_atr;
        let Some(lock) = self.state.lock.as_mut() else {
            return;
        };

        if slice.opening {
            let created = lock.open(slice.book, fill.price, slice.volume, fill.time, bar, || {
                protective.open_level(slice.book, fill.price, atr)
            });
            if !created {
                if let Some(leg) = lock.leg_mut(slice.book) {
                    protective.rebase(slice.book, leg.entry_price, &mut leg.level);
                }
            }
        } else if let Some((closed, opened_bar)) = lock.close(slice.book, fill.price, slice.volume) {
            let held = bar.saturating_sub(opened_bar) as u32;
            self.record_trade(&closed, fill.time, action, held);
        }
    }

    /// Record a closed round trip; returns its pnl.
    fn record_trade(
        &mut self,
        closed: &ClosedPortion,
        time: DateTime<Utc>,
        action: &Action,
        bars_held: u32,
    ) -> f64 {
        let trade =
            TradeRecord::from_closed(closed, time, action.reason, self.config.point_value, bars_held);
        info!(
            side = ?trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            volume = trade.volume,
            pnl = trade.pnl,
            reason = ?trade.exit_reason,
            "trade closed"
        );
        let pnl = trade.pnl;
        self.state.trades.push(trade);
        pnl
    }

    fn complete(&mut self, action: &Action, last_price: f64) {
        match action.kind {
            ActionKind::AddUnit => {
                if let Some(pyramid) = self.state.pyramid.as_mut() {
                    pyramid.record_add(last_price);
                    debug!(units = pyramid.units(), "pyramid unit added");
                }
            }
            ActionKind::OpenLeg => {
                if let Some(lock) = self.state.lock.as_mut() {
                    lock.bump_generation();
                }
            }
            _ => {}
        }
        debug!(id = ?action.id, kind = ?action.kind, "action complete");
    }

    // ── Halting ──

    fn ensure_running(&self) -> Result<(), EngineError> {
        match &self.state.halted {
            Some(reason) => Err(EngineError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn halt(&mut self, action_id: ActionId, reason: String) -> EngineError {
        error!(
            %action_id,
            %reason,
            position_side = ?self.state.position.side,
            position_volume = self.state.position.volume,
            "inconsistent fill, engine halted"
        );
        self.state.halted = Some(format!("{action_id}: {reason}"));
        EngineError::InconsistentFill { action_id, reason }
    }
}

/// Update every leg without an outstanding hit and record new hits on the
/// leg. Returns the hit to service this cycle; any other stays marked until
/// its leg is closed.
fn mark_leg_hits(
    lock: &mut HedgeLock,
    mut update: impl FnMut(&Leg) -> LevelUpdate,
) -> Option<(PositionSide, LevelHit)> {
    for leg in lock.legs_mut() {
        if leg.pending_exit.is_some() {
            continue;
        }
        let result = update(&*leg);
        leg.level = result.level;
        if let Some(hit) = result.triggered {
            debug!(side = ?leg.side(), kind = ?hit.kind, exit = hit.exit_price, "leg level hit");
            leg.pending_exit = Some(hit);
        }
    }
    lock.pending_exit()
}

/// Monotonic clock check; equal timestamps are accepted.
fn accept_time(last: &mut Option<DateTime<Utc>>, time: DateTime<Utc>) -> bool {
    match *last {
        Some(previous) if time < previous => false,
        _ => {
            *last = Some(time);
            true
        }
    }
}
