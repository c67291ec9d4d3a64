//! Risk-fraction sizer.
//!
//! Classic risk management: risk a fraction of equity per trade, with the
//! stop either a fixed distance or a multiple of ATR away from entry.

use super::SkipReason;

/// Where the stop distance used for sizing comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopDistanceSource {
    /// Fixed distance in price units.
    Fixed(f64),
    /// `multiplier × ATR`, ATR taken from the signal hints.
    Atr { multiplier: f64 },
}

/// Risk-fraction sizer.
///
/// # Formula
/// ```text
/// risk_money    = equity * risk_fraction
/// stop_distance = fixed distance | atr_multiplier * ATR
/// volume        = risk_money / (stop_distance * point_value)
/// ```
///
/// # Example
/// - Equity: 100,000
/// - Risk per trade: 1% (1,000)
/// - ATR: 2.00, multiplier 2 → stop distance 4.00
/// - Volume: 1,000 / 4.00 = 250
#[derive(Debug, Clone, PartialEq)]
pub struct RiskFractionSizer {
    pub risk_fraction: f64,
    pub point_value: f64,
    pub source: StopDistanceSource,
}

impl RiskFractionSizer {
    pub fn new(risk_fraction: f64, point_value: f64, source: StopDistanceSource) -> Self {
        Self {
            risk_fraction,
            point_value,
            source,
        }
    }

    /// Stop distance in price units for the given ATR hint.
    pub fn stop_distance(&self, atr: Option<f64>) -> Result<f64, SkipReason> {
        let distance = match self.source {
            StopDistanceSource::Fixed(distance) => distance,
            StopDistanceSource::Atr { multiplier } => match atr {
                Some(a) if a.is_finite() && a > 0.0 => multiplier * a,
                _ => return Err(SkipReason::MissingAtr),
            },
        };
        if !distance.is_finite() || distance <= 0.0 {
            return Err(SkipReason::NonPositiveStopDistance);
        }
        Ok(distance)
    }

    /// Unrounded volume; fails closed on non-positive equity or stop distance.
    pub fn raw_volume(&self, equity: f64, atr: Option<f64>) -> Result<f64, SkipReason> {
        if !equity.is_finite() || equity <= 0.0 {
            return Err(SkipReason::NonPositiveEquity);
        }
        let stop_distance = self.stop_distance(atr)?;
        Ok(equity * self.risk_fraction / (stop_distance * self.point_value))
    }
}
