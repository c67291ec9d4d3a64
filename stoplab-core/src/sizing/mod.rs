//! Position sizing — converts a directional signal into an order volume.
//!
//! Every path ends in [`VolumeSpec::normalize`]: volume is rounded down to the
//! instrument step and clipped to the limits, and anything below the minimum
//! becomes "no trade". Failures never surface as errors; they come back as
//! [`SizingOutcome::Skipped`] so the engine can log why nothing traded.

pub mod pyramid;
pub mod risk;
pub mod sequence;

pub use pyramid::PyramidState;
pub use risk::{RiskFractionSizer, StopDistanceSource};
pub use sequence::SequenceState;

use crate::config::EngineConfig;
use crate::domain::{AccountSnapshot, Signal, VolumeSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Upper bound on the martingale exponent; the volume cap clips long before.
const MAX_MARTINGALE_STEPS: u32 = 32;

/// How the base volume of a new position is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// Constant `base_volume`.
    #[default]
    Fixed,
    /// `equity × risk_fraction / (stop_distance × point_value)`.
    RiskFraction,
    /// `base_volume × grid_lot_multiplier ^ consecutive_losses`.
    Martingale,
    /// Labouchère stake (first + last) × `base_volume`.
    Sequence,
}

/// Why the sizer declined to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FlatSignal,
    NonPositiveEquity,
    NonPositiveStopDistance,
    MissingAtr,
    SequenceExhausted,
    BelowMinVolume,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingOutcome {
    Volume(f64),
    Skipped(SkipReason),
}

impl SizingOutcome {
    /// Tradable volume; zero on every skip path.
    pub fn volume(&self) -> f64 {
        match self {
            SizingOutcome::Volume(v) => *v,
            SizingOutcome::Skipped(_) => 0.0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SizingOutcome::Skipped(_))
    }
}

/// Mutable sizing state, changed only when a position returns to flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizingState {
    pub consecutive_losses: u32,
    pub sequence: Option<SequenceState>,
}

impl SizingState {
    pub fn new(sequence: Option<SequenceState>) -> Self {
        Self {
            consecutive_losses: 0,
            sequence,
        }
    }

    /// Book the result of a finished position. Zero pnl leaves everything as is.
    pub fn record_close(&mut self, pnl: f64) {
        if pnl > 0.0 {
            self.consecutive_losses = 0;
            if let Some(seq) = self.sequence.as_mut() {
                let recycled = seq.record_win();
                debug!(stakes = ?seq.stakes(), recycled, "sequence win");
            }
        } else if pnl < 0.0 {
            self.consecutive_losses = self.consecutive_losses.saturating_add(1);
            if let Some(seq) = self.sequence.as_mut() {
                seq.record_loss();
                debug!(stakes = ?seq.stakes(), "sequence loss");
            }
        }
    }

    /// Lifecycle reset: clear the loss streak and restore the initial stakes.
    pub fn reset(&mut self) {
        self.consecutive_losses = 0;
        if let Some(seq) = self.sequence.as_mut() {
            seq.reset();
        }
    }
}

/// Stateless sizer; the state it reads lives in [`SizingState`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    mode: SizingMode,
    base_volume: f64,
    lot_multiplier: f64,
    risk_fraction: f64,
    point_value: f64,
    /// Fixed stop distance in price units.
    fixed_stop: Option<f64>,
    atr_stop_multiplier: Option<f64>,
    volume: VolumeSpec,
}

impl PositionSizer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mode: config.sizing_mode,
            base_volume: config.base_volume,
            lot_multiplier: config.grid_lot_multiplier,
            risk_fraction: config.risk_fraction,
            point_value: config.point_value,
            fixed_stop: config.fixed_stop_distance.map(|d| config.price_distance(d)),
            atr_stop_multiplier: config.atr_stop_multiplier,
            volume: config.volume_spec(),
        }
    }

    pub fn mode(&self) -> SizingMode {
        self.mode
    }

    pub fn volume_spec(&self) -> VolumeSpec {
        self.volume
    }

    /// Round and clip an arbitrary volume to the instrument limits.
    pub fn normalize(&self, volume: f64) -> f64 {
        self.volume.normalize(volume)
    }

    /// ATR-based distance when both the multiplier and a usable ATR exist,
    /// the fixed distance otherwise.
    pub fn stop_source(&self, atr: Option<f64>) -> StopDistanceSource {
        match (self.atr_stop_multiplier, atr, self.fixed_stop) {
            (Some(multiplier), Some(_), _) => StopDistanceSource::Atr { multiplier },
            (_, _, Some(distance)) => StopDistanceSource::Fixed(distance),
            (Some(multiplier), None, None) => StopDistanceSource::Atr { multiplier },
            (None, _, None) => StopDistanceSource::Fixed(0.0),
        }
    }

    /// Volume of `base_volume × multiplier^generation`, normalized.
    pub fn scaled_base(&self, generation: u32) -> f64 {
        let exponent = generation.min(MAX_MARTINGALE_STEPS) as i32;
        self.normalize(self.base_volume * self.lot_multiplier.powi(exponent))
    }

    /// Volume for a new position in the signal's direction.
    pub fn compute(
        &self,
        signal: &Signal,
        account: &AccountSnapshot,
        state: &SizingState,
    ) -> SizingOutcome {
        if signal.direction.side().is_none() {
            return SizingOutcome::Skipped(SkipReason::FlatSignal);
        }

        let raw = match self.raw_volume(signal, account, state) {
            Ok(v) => v,
            Err(reason) => {
                warn!(
                    ?reason,
                    mode = ?self.mode,
                    equity = account.equity,
                    atr = ?signal.atr,
                    stakes = ?state.sequence.as_ref().map(|s| s.stakes()),
                    "sizing failed, no trade"
                );
                return SizingOutcome::Skipped(reason);
            }
        };

        let volume = self.normalize(raw);
        if volume <= 0.0 {
            debug!(raw, min = self.volume.min, "sized volume below minimum, no trade");
            return SizingOutcome::Skipped(SkipReason::BelowMinVolume);
        }
        SizingOutcome::Volume(volume)
    }

    fn raw_volume(
        &self,
        signal: &Signal,
        account: &AccountSnapshot,
        state: &SizingState,
    ) -> Result<f64, SkipReason> {
        match self.mode {
            SizingMode::Fixed => Ok(self.base_volume),
            SizingMode::Martingale => {
                let exponent = state.consecutive_losses.min(MAX_MARTINGALE_STEPS) as i32;
                Ok(self.base_volume * self.lot_multiplier.powi(exponent))
            }
            SizingMode::Sequence => state
                .sequence
                .as_ref()
                .and_then(SequenceState::next_stake)
                .map(|stake| stake * self.base_volume)
                .ok_or(SkipReason::SequenceExhausted),
            SizingMode::RiskFraction => {
                let atr = signal.usable_atr();
                let sizer = RiskFractionSizer::new(
                    self.risk_fraction,
                    self.point_value,
                    self.stop_source(atr),
                );
                sizer.raw_volume(account.equity, atr)
            }
        }
    }
}
