//! Protective stops — stop-loss, take-profit, trailing and breakeven.
//!
//! [`ProtectiveStopEngine`] is pure: it holds only configuration and maps
//! `(side, entry, level, bar)` to a trigger decision plus the next level.
//!
//! Per bar the order is fixed:
//! 1. trigger check against the levels set by earlier events
//! 2. breakeven shift
//! 3. trailing recomputation (applies from the next event on)
//!
//! A bar never both moves a stop and gets stopped out by the moved stop.

pub mod level;
pub mod path_policy;
pub mod ratchet;

pub use level::{ProtectiveLevel, StopKind};
pub use path_policy::{FirstTouch, GapPolicy, IntrabarPolicy};
pub use ratchet::Ratchet;

use crate::config::EngineConfig;
use crate::domain::{ActionReason, Bar, Position, PositionSide, Quote};
use path_policy::{favorable_extreme, stop_gapped, stop_touched, target_gapped, target_touched};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Price the trailing stop and breakeven trigger measure excursion from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailReference {
    /// Bar close.
    #[default]
    Close,
    /// Bar high for longs, bar low for shorts.
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Stop(StopKind),
    Take,
    PartialTake,
}

/// A level that fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelHit {
    pub kind: HitKind,
    pub level_price: f64,
    /// Expected execution price after gap handling.
    pub exit_price: f64,
    pub gapped: bool,
}

impl LevelHit {
    pub fn reason(&self) -> ActionReason {
        match self.kind {
            HitKind::Stop(kind) => kind.exit_reason(),
            HitKind::Take => ActionReason::TakeProfit,
            HitKind::PartialTake => ActionReason::PartialTake,
        }
    }

    /// True for hits that close the whole position.
    pub fn is_full_exit(&self) -> bool {
        !matches!(self.kind, HitKind::PartialTake)
    }
}

/// Result of one protective update.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpdate {
    pub triggered: Option<LevelHit>,
    pub level: ProtectiveLevel,
}

impl LevelUpdate {
    pub fn is_triggered(&self) -> bool {
        self.triggered.is_some()
    }

    /// The full-exit hit, if any; partial targets are not breaches.
    pub fn breach(&self) -> Option<LevelHit> {
        self.triggered.filter(LevelHit::is_full_exit)
    }
}

/// Configuration-only protective level calculator. All distances are in
/// price units.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveStopEngine {
    fixed_stop: Option<f64>,
    fixed_take: Option<f64>,
    atr_stop_multiplier: Option<f64>,
    atr_take_multiplier: Option<f64>,
    partial_take: Option<f64>,
    trailing_distance: Option<f64>,
    trailing_start: f64,
    trailing_step: f64,
    trail_reference: TrailReference,
    breakeven_trigger: Option<f64>,
    breakeven_offset: f64,
    intrabar: IntrabarPolicy,
    gap: GapPolicy,
}

impl ProtectiveStopEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        let price = |points: f64| config.price_distance(points);
        Self {
            fixed_stop: config.fixed_stop_distance.map(price),
            fixed_take: config.fixed_take_distance.map(price),
            atr_stop_multiplier: config.atr_stop_multiplier,
            atr_take_multiplier: config.atr_take_multiplier,
            partial_take: config.partial_take_distance.map(price),
            trailing_distance: config.trailing_distance.map(price),
            trailing_start: price(config.trailing_start_distance),
            trailing_step: price(config.trailing_step),
            trail_reference: config.trail_reference,
            breakeven_trigger: config.breakeven_trigger.map(price),
            breakeven_offset: price(config.breakeven_offset),
            intrabar: config.intrabar_policy,
            gap: config.gap_policy,
        }
    }

    /// Fresh Initial level for a position opened at `entry`.
    pub fn open_level(&self, side: PositionSide, entry: f64, atr: Option<f64>) -> ProtectiveLevel {
        let scaled = |multiplier: Option<f64>, fixed: Option<f64>| match (multiplier, atr) {
            (Some(m), Some(a)) if a > 0.0 => Some(m * a),
            _ => fixed,
        };
        let level = ProtectiveLevel::initial(
            side,
            entry,
            scaled(self.atr_stop_multiplier, self.fixed_stop),
            scaled(self.atr_take_multiplier, self.fixed_take),
            self.partial_take,
        );
        debug!(
            ?side,
            entry,
            stop = ?level.stop_price,
            take = ?level.take_price,
            "protective level opened"
        );
        level
    }

    /// Trigger check of a completed bar against the current levels.
    pub fn check_bar(
        &self,
        side: PositionSide,
        level: &ProtectiveLevel,
        bar: &Bar,
    ) -> Option<LevelHit> {
        let stop_hit = level.stop_price.filter(|&s| stop_touched(side, s, bar)).map(|s| {
            let gapped = stop_gapped(side, s, bar);
            LevelHit {
                kind: HitKind::Stop(level.stop_kind),
                level_price: s,
                exit_price: self.gap.exit_price(s, gapped, bar),
                gapped,
            }
        });

        let target = |kind: HitKind, t: f64| {
            let gapped = target_gapped(side, t, bar);
            LevelHit {
                kind,
                level_price: t,
                exit_price: self.gap.exit_price(t, gapped, bar),
                gapped,
            }
        };
        let take_hit = level
            .take_price
            .filter(|&t| target_touched(side, t, bar))
            .map(|t| target(HitKind::Take, t));
        let partial_hit = level
            .partial_take_price
            .filter(|&t| !level.partial_taken && target_touched(side, t, bar))
            .map(|t| target(HitKind::PartialTake, t));

        match (stop_hit, take_hit.or(partial_hit)) {
            (None, target) => target,
            (stop, None) => stop,
            (Some(stop), Some(target)) => {
                match self
                    .intrabar
                    .resolve(side, stop.level_price, target.level_price, bar)
                {
                    FirstTouch::Stop => Some(stop),
                    FirstTouch::Target => Some(target),
                }
            }
        }
    }

    /// Trigger check of a quote: bid for longs, ask for shorts.
    pub fn check_quote(
        &self,
        side: PositionSide,
        level: &ProtectiveLevel,
        quote: &Quote,
    ) -> Option<LevelHit> {
        let price = quote_price(side, quote)?;
        let sign = side.sign();
        let exit = |level_price: f64| match self.gap {
            GapPolicy::FillAtOpen => price,
            GapPolicy::FillAtLevel => level_price,
        };
        let hit = |kind: HitKind, level_price: f64| LevelHit {
            kind,
            level_price,
            exit_price: exit(level_price),
            gapped: (price - level_price).abs() > crate::domain::EPSILON,
        };

        if let Some(stop) = level.stop_price.filter(|&s| (price - s) * sign <= 0.0) {
            return Some(hit(HitKind::Stop(level.stop_kind), stop));
        }
        if let Some(take) = level.take_price.filter(|&t| (price - t) * sign >= 0.0) {
            return Some(hit(HitKind::Take, take));
        }
        level
            .partial_take_price
            .filter(|&t| !level.partial_taken && (price - t) * sign >= 0.0)
            .map(|t| hit(HitKind::PartialTake, t))
    }

    /// Breakeven and trailing adjustment from a reference price.
    ///
    /// Returns true when the stop moved.
    pub fn adjust(
        &self,
        side: PositionSide,
        entry: f64,
        level: &mut ProtectiveLevel,
        reference: f64,
    ) -> bool {
        if side.is_flat() || !reference.is_finite() {
            return false;
        }
        let sign = side.sign();
        let excursion = (reference - entry) * sign;
        let before = level.stop_price;

        if let Some(trigger) = self.breakeven_trigger {
            if !level.breakeven_applied && excursion >= trigger {
                let target = entry + sign * self.breakeven_offset;
                if let Some(stop) = Ratchet::tighten_only(side).apply(level.stop_price, target) {
                    level.stop_price = Some(stop);
                    level.stop_kind = StopKind::Breakeven;
                    debug!(?side, entry, stop, excursion, "stop moved to breakeven");
                }
                level.breakeven_applied = true;
            }
        }

        if let Some(distance) = self.trailing_distance {
            if !level.trailing_active && excursion >= self.trailing_start {
                level.trailing_active = true;
                level.trailing_anchor = Some(reference);
                debug!(?side, entry, anchor = reference, excursion, "trailing activated");
            }
            if level.trailing_active {
                let anchor = match level.trailing_anchor {
                    Some(a) if (reference - a) * sign <= 0.0 => a,
                    _ => reference,
                };
                level.trailing_anchor = Some(anchor);
                let candidate = anchor - sign * distance;
                let ratchet = Ratchet::new(side, self.trailing_step);
                if let Some(stop) = ratchet.apply(level.stop_price, candidate) {
                    debug!(
                        ?side,
                        anchor,
                        from = ?level.stop_price,
                        to = stop,
                        step = self.trailing_step,
                        "trailing stop moved"
                    );
                    level.stop_price = Some(stop);
                    level.stop_kind = StopKind::Trailing;
                }
            }
        }

        if !level.breakeven_applied && level.stop_locks_entry(side, entry) {
            level.breakeven_applied = true;
        }

        level.stop_price != before
    }

    /// Re-anchor a level after an add-on fill moved the average entry.
    pub fn rebase(&self, side: PositionSide, entry: f64, level: &mut ProtectiveLevel) {
        level.rebase(side, entry, self.breakeven_offset);
    }

    /// Bar update for a net position.
    pub fn update(&self, position: &Position, level: &ProtectiveLevel, bar: &Bar) -> LevelUpdate {
        self.update_side(position.side, position.average_entry_price, level, bar)
    }

    /// Bar update for any book described by side and entry (net position or
    /// hedge leg).
    pub fn update_side(
        &self,
        side: PositionSide,
        entry: f64,
        level: &ProtectiveLevel,
        bar: &Bar,
    ) -> LevelUpdate {
        let mut next = level.clone();
        let triggered = self.check_bar(side, level, bar);
        match triggered {
            Some(hit) if hit.is_full_exit() => {
                return LevelUpdate {
                    triggered,
                    level: next,
                }
            }
            Some(_) => next.partial_taken = true,
            None => {}
        }

        let reference = match self.trail_reference {
            TrailReference::Close => bar.close,
            TrailReference::Extreme => favorable_extreme(side, bar),
        };
        self.adjust(side, entry, &mut next, reference);
        LevelUpdate {
            triggered,
            level: next,
        }
    }

    /// Tick-driven update: bid for longs, ask for shorts.
    pub fn update_on_quote(
        &self,
        side: PositionSide,
        entry: f64,
        level: &ProtectiveLevel,
        quote: &Quote,
    ) -> LevelUpdate {
        let mut next = level.clone();
        let triggered = self.check_quote(side, level, quote);
        match triggered {
            Some(hit) if hit.is_full_exit() => {
                return LevelUpdate {
                    triggered,
                    level: next,
                }
            }
            Some(_) => next.partial_taken = true,
            None => {}
        }
        if let Some(price) = quote_price(side, quote) {
            self.adjust(side, entry, &mut next, price);
        }
        LevelUpdate {
            triggered,
            level: next,
        }
    }
}

fn quote_price(side: PositionSide, quote: &Quote) -> Option<f64> {
    match side {
        PositionSide::Long => Some(quote.best_bid),
        PositionSide::Short => Some(quote.best_ask),
        PositionSide::Flat => None,
    }
}
