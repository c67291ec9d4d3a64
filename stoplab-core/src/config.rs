//! Engine configuration — static options loaded from TOML and validated once.
//!
//! Distances are expressed in points; `point_size` converts them to price
//! units. A configuration that fails [`EngineConfig::validate`] never produces
//! a running engine.

use crate::domain::VolumeSpec;
use crate::error::ConfigError;
use crate::protective::{GapPolicy, IntrabarPolicy, TrailReference};
use crate::sizing::{SequenceState, SizingMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which entry directions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    ShortOnly,
    LongShort,
}

impl TradingMode {
    pub fn allows(self, side: crate::domain::PositionSide) -> bool {
        use crate::domain::PositionSide;
        match (self, side) {
            (_, PositionSide::Flat) => false,
            (TradingMode::LongShort, _) => true,
            (TradingMode::LongOnly, PositionSide::Long) => true,
            (TradingMode::ShortOnly, PositionSide::Short) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    // ── Mode ──
    pub sizing_mode: SizingMode,
    pub trading_mode: TradingMode,
    /// Run the locked long+short leg cycle instead of a single net position.
    pub hedge_mode: bool,

    // ── Sizing ──
    pub base_volume: f64,
    pub risk_fraction: f64,
    /// Price units per point.
    pub point_size: f64,
    /// Account currency per price unit per unit of volume.
    pub point_value: f64,
    pub grid_lot_multiplier: f64,
    pub grid_initial_sequence: Option<String>,
    pub recycle_sequence: bool,
    pub max_pyramid_units: u32,
    /// Favourable move between pyramid units, in ATR multiples.
    pub pyramid_add_interval: f64,

    // ── Protective levels (points) ──
    pub fixed_stop_distance: Option<f64>,
    pub fixed_take_distance: Option<f64>,
    pub atr_stop_multiplier: Option<f64>,
    pub atr_take_multiplier: Option<f64>,
    pub trailing_distance: Option<f64>,
    pub trailing_start_distance: f64,
    pub trailing_step: f64,
    pub trail_reference: TrailReference,
    pub breakeven_trigger: Option<f64>,
    pub breakeven_offset: f64,
    pub partial_take_distance: Option<f64>,
    pub partial_take_fraction: f64,
    pub intrabar_policy: IntrabarPolicy,
    pub gap_policy: GapPolicy,

    // ── Exits ──
    pub max_holding_bars: Option<u32>,
    pub close_on_flat_signal: bool,

    // ── Hedge lock ──
    pub hedge_max_excess: f64,
    pub hedge_min_profit: f64,

    // ── Instrument volume limits ──
    pub volume_step: f64,
    pub min_volume: f64,
    pub max_volume: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sizing_mode: SizingMode::Fixed,
            trading_mode: TradingMode::LongShort,
            hedge_mode: false,
            base_volume: 1.0,
            risk_fraction: 0.01,
            point_size: 1.0,
            point_value: 1.0,
            grid_lot_multiplier: 2.0,
            grid_initial_sequence: None,
            recycle_sequence: true,
            max_pyramid_units: 1,
            pyramid_add_interval: 1.0,
            fixed_stop_distance: None,
            fixed_take_distance: None,
            atr_stop_multiplier: None,
            atr_take_multiplier: None,
            trailing_distance: None,
            trailing_start_distance: 0.0,
            trailing_step: 1.0,
            trail_reference: TrailReference::Close,
            breakeven_trigger: None,
            breakeven_offset: 0.0,
            partial_take_distance: None,
            partial_take_fraction: 0.5,
            intrabar_policy: IntrabarPolicy::StopFirst,
            gap_policy: GapPolicy::FillAtOpen,
            max_holding_bars: None,
            close_on_flat_signal: false,
            hedge_max_excess: 0.0,
            hedge_min_profit: 0.0,
            volume_step: 0.01,
            min_volume: 0.01,
            max_volume: 100.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn trailing_enabled(&self) -> bool {
        self.trailing_distance.is_some()
    }

    /// Convert a distance in points to price units.
    pub fn price_distance(&self, points: f64) -> f64 {
        points * self.point_size
    }

    pub fn volume_spec(&self) -> VolumeSpec {
        VolumeSpec::new(self.volume_step, self.min_volume, self.max_volume)
    }

    /// Parsed grid sequence, if one is configured.
    pub fn sequence_state(&self) -> Result<Option<SequenceState>, ConfigError> {
        self.grid_initial_sequence
            .as_deref()
            .map(|s| SequenceState::from_config(s, self.recycle_sequence))
            .transpose()
    }

    /// Fail fast on any option combination the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("base_volume", self.base_volume)?;
        positive("point_size", self.point_size)?;
        positive("point_value", self.point_value)?;

        if !(self.volume_step > 0.0 && self.min_volume > 0.0 && self.min_volume <= self.max_volume)
        {
            return Err(ConfigError::VolumeLimits {
                step: self.volume_step,
                min: self.min_volume,
                max: self.max_volume,
            });
        }

        for (field, value) in [
            ("fixed_stop_distance", self.fixed_stop_distance),
            ("fixed_take_distance", self.fixed_take_distance),
            ("atr_stop_multiplier", self.atr_stop_multiplier),
            ("atr_take_multiplier", self.atr_take_multiplier),
            ("trailing_distance", self.trailing_distance),
            ("breakeven_trigger", self.breakeven_trigger),
            ("partial_take_distance", self.partial_take_distance),
        ] {
            if let Some(v) = value {
                positive(field, v)?;
            }
        }

        if self.trailing_enabled() {
            if !(self.trailing_step > 0.0) {
                return Err(ConfigError::TrailingStep(self.trailing_step));
            }
            if !(self.trailing_start_distance >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "trailing_start_distance",
                    constraint: ">= 0",
                    value: self.trailing_start_distance,
                });
            }
        }

        if !(self.breakeven_offset >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "breakeven_offset",
                constraint: ">= 0",
                value: self.breakeven_offset,
            });
        }

        if self.partial_take_distance.is_some()
            && !(self.partial_take_fraction > 0.0 && self.partial_take_fraction < 1.0)
        {
            return Err(ConfigError::OutOfRange {
                field: "partial_take_fraction",
                constraint: "in (0, 1)",
                value: self.partial_take_fraction,
            });
        }

        if self.max_pyramid_units > 1 {
            positive("pyramid_add_interval", self.pyramid_add_interval)?;
        }

        match self.sizing_mode {
            SizingMode::RiskFraction => {
                if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
                    return Err(ConfigError::OutOfRange {
                        field: "risk_fraction",
                        constraint: "in (0, 1]",
                        value: self.risk_fraction,
                    });
                }
                if self.fixed_stop_distance.is_none() && self.atr_stop_multiplier.is_none() {
                    return Err(ConfigError::MissingStopDistance);
                }
            }
            SizingMode::Sequence => {
                if self.grid_initial_sequence.is_none() {
                    return Err(ConfigError::MalformedSequence {
                        input: String::new(),
                        reason: "sequence sizing requires grid_initial_sequence".into(),
                    });
                }
            }
            SizingMode::Martingale | SizingMode::Fixed => {}
        }

        if (self.sizing_mode == SizingMode::Martingale || self.hedge_mode)
            && !(self.grid_lot_multiplier >= 1.0)
        {
            return Err(ConfigError::OutOfRange {
                field: "grid_lot_multiplier",
                constraint: ">= 1",
                value: self.grid_lot_multiplier,
            });
        }

        // A configured sequence must parse even when another mode is active.
        self.sequence_state()?;

        if self.hedge_mode {
            for (field, value) in [
                ("hedge_max_excess", self.hedge_max_excess),
                ("hedge_min_profit", self.hedge_min_profit),
            ] {
                if !(value >= 0.0) {
                    return Err(ConfigError::OutOfRange {
                        field,
                        constraint: ">= 0",
                        value,
                    });
                }
            }
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            constraint: "> 0",
            value,
        })
    }
}
