//! Path policies: resolve intrabar ambiguity
//!
//! OHLC alone does not say whether the low or the high came first. When one
//! bar touches both the stop and a profit target, the [`IntrabarPolicy`]
//! decides which fired. The [`GapPolicy`] decides the exit price when the bar
//! opened already beyond the level.

use crate::domain::{Bar, PositionSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Adversarial: the stop fires first.
    #[default]
    StopFirst,
    /// Optimistic: the target fires first.
    TakeFirst,
    /// Whichever level is closer to the bar open fires first (ties: stop).
    OpenProximity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// A level gapped through fills at the open (worse for stops).
    #[default]
    FillAtOpen,
    /// Always fill at the level price.
    FillAtLevel,
}

/// Which of two touched levels fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTouch {
    Stop,
    Target,
}

/// Price that target checks compare against within a bar.
pub fn favorable_extreme(side: PositionSide, bar: &Bar) -> f64 {
    match side {
        PositionSide::Short => bar.low,
        _ => bar.high,
    }
}

/// Long: `low ≤ stop`. Short: `high ≥ stop`.
pub fn stop_touched(side: PositionSide, stop: f64, bar: &Bar) -> bool {
    match side {
        PositionSide::Long => bar.low <= stop,
        PositionSide::Short => bar.high >= stop,
        PositionSide::Flat => false,
    }
}

/// Long: `high ≥ target`. Short: `low ≤ target`.
pub fn target_touched(side: PositionSide, target: f64, bar: &Bar) -> bool {
    match side {
        PositionSide::Long => bar.high >= target,
        PositionSide::Short => bar.low <= target,
        PositionSide::Flat => false,
    }
}

/// True when the bar opened at or beyond a stop.
pub fn stop_gapped(side: PositionSide, stop: f64, bar: &Bar) -> bool {
    match side {
        PositionSide::Long => bar.open <= stop,
        PositionSide::Short => bar.open >= stop,
        PositionSide::Flat => false,
    }
}

/// True when the bar opened at or beyond a target.
pub fn target_gapped(side: PositionSide, target: f64, bar: &Bar) -> bool {
    match side {
        PositionSide::Long => bar.open >= target,
        PositionSide::Short => bar.open <= target,
        PositionSide::Flat => false,
    }
}

impl IntrabarPolicy {
    /// Decide which level fired when a bar touched both.
    ///
    /// A level the bar opened beyond fired at the open, before anything else,
    /// whatever the policy says.
    pub fn resolve(self, side: PositionSide, stop: f64, target: f64, bar: &Bar) -> FirstTouch {
        if stop_gapped(side, stop, bar) {
            return FirstTouch::Stop;
        }
        if target_gapped(side, target, bar) {
            return FirstTouch::Target;
        }
        match self {
            IntrabarPolicy::StopFirst => FirstTouch::Stop,
            IntrabarPolicy::TakeFirst => FirstTouch::Target,
            IntrabarPolicy::OpenProximity => {
                if (bar.open - stop).abs() <= (target - bar.open).abs() {
                    FirstTouch::Stop
                } else {
                    FirstTouch::Target
                }
            }
        }
    }
}

impl GapPolicy {
    /// Exit price for a level that fired on `bar`.
    pub fn exit_price(self, level: f64, gapped: bool, bar: &Bar) -> f64 {
        match self {
            GapPolicy::FillAtOpen if gapped => bar.open,
            _ => level,
        }
    }
}
