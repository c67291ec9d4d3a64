//! Signals — the tri-state directional input plus optional sizing hints.
//!
//! Entry logic (crossovers, divergences, pattern matches) lives outside the
//! engine. Whatever produces the signal is injected through [`SignalSource`].

use super::bar::Bar;
use super::position::PositionSide;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Discrete direction produced by a signal source for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    EnterLong,
    EnterShort,
    Flat,
}

impl SignalDirection {
    /// Position side this signal asks for, if any.
    pub fn side(self) -> Option<PositionSide> {
        match self {
            SignalDirection::EnterLong => Some(PositionSide::Long),
            SignalDirection::EnterShort => Some(PositionSide::Short),
            SignalDirection::Flat => None,
        }
    }
}

impl FromStr for SignalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" | "enter_long" | "1" => Ok(SignalDirection::EnterLong),
            "short" | "sell" | "enter_short" | "-1" => Ok(SignalDirection::EnterShort),
            "flat" | "none" | "0" | "" => Ok(SignalDirection::Flat),
            other => Err(format!("unknown signal '{other}'")),
        }
    }
}

/// Per-bar signal with optional continuous hints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: SignalDirection,
    pub atr: Option<f64>,
    pub volatility: Option<f64>,
}

impl Signal {
    pub fn new(direction: SignalDirection) -> Self {
        Self {
            direction,
            atr: None,
            volatility: None,
        }
    }

    pub fn flat() -> Self {
        Self::new(SignalDirection::Flat)
    }

    pub fn long() -> Self {
        Self::new(SignalDirection::EnterLong)
    }

    pub fn short() -> Self {
        Self::new(SignalDirection::EnterShort)
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr = Some(atr);
        self
    }

    /// ATR hint if it is finite and positive.
    pub fn usable_atr(&self) -> Option<f64> {
        self.atr.filter(|a| a.is_finite() && *a > 0.0)
    }
}

/// Source of per-bar signals.
///
/// Implementations may keep their own bar history; the engine only sees the
/// resulting [`Signal`].
pub trait SignalSource {
    fn evaluate(&mut self, bar: &Bar) -> Signal;
}

impl<F> SignalSource for F
where
    F: FnMut(&Bar) -> Signal,
{
    fn evaluate(&mut self, bar: &Bar) -> Signal {
        self(bar)
    }
}

/// Replays a precomputed list of signals in order, then stays flat.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignals {
    signals: Vec<Signal>,
    cursor: usize,
}

impl ScriptedSignals {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals, cursor: 0 }
    }
}

impl SignalSource for ScriptedSignals {
    fn evaluate(&mut self, _bar: &Bar) -> Signal {
        let signal = self
            .signals
            .get(self.cursor)
            .copied()
            .unwrap_or_else(Signal::flat);
        self.cursor += 1;
        signal
    }
}
