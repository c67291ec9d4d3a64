use serde::{Deserialize, Serialize};

/// Volume constraints of the traded instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VolumeSpec {
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

impl VolumeSpec {
    pub fn new(step: f64, min: f64, max: f64) -> Self {
        Self { step, min, max }
    }

    /// Round down to a whole number of volume steps.
    pub fn round_down(&self, volume: f64) -> f64 {
        // Nudge before flooring so 0.3 / 0.1 does not land on 2.999...
        let steps = (volume / self.step + 1e-9).floor();
        snap(steps * self.step, self.step)
    }

    /// Round down to the step and clip to `max`.
    ///
    /// Returns 0 when the rounded volume falls below `min`; a partial volume
    /// under the minimum is never produced.
    pub fn normalize(&self, volume: f64) -> f64 {
        if !volume.is_finite() || volume <= 0.0 {
            return 0.0;
        }
        let rounded = self.round_down(volume.min(self.max));
        if rounded + 1e-12 < self.min || rounded <= 0.0 {
            0.0
        } else {
            rounded
        }
    }
}

/// Remove binary noise by rounding to the number of decimals in `step`.
fn snap(value: f64, step: f64) -> f64 {
    let mut decimals = 0;
    let mut scaled = step;
    while decimals < 10 && (scaled - scaled.round()).abs() > 1e-9 {
        scaled *= 10.0;
        decimals += 1;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_down_to_step() {
        let spec = VolumeSpec::new(0.01, 0.01, 100.0);
        assert_eq!(spec.round_down(1.239), 1.23);
        assert_eq!(spec.round_down(0.3), 0.3);
    }

    #[test]
    fn clips_to_max() {
        let spec = VolumeSpec::new(0.1, 0.1, 5.0);
        assert_eq!(spec.normalize(12.34), 5.0);
    }

    #[test]
    fn below_min_is_zero_not_partial() {
        let spec = VolumeSpec::new(0.01, 0.1, 10.0);
        assert_eq!(spec.normalize(0.099), 0.0);
        assert_eq!(spec.normalize(0.1), 0.1);
    }

    #[test]
    fn non_finite_or_negative_is_zero() {
        let spec = VolumeSpec::new(1.0, 1.0, 10.0);
        assert_eq!(spec.normalize(f64::NAN), 0.0);
        assert_eq!(spec.normalize(-3.0), 0.0);
        assert_eq!(spec.normalize(f64::INFINITY), 0.0);
    }

    #[test]
    fn whole_lot_instrument() {
        let spec = VolumeSpec::new(1.0, 1.0, 1_000.0);
        assert_eq!(spec.normalize(249.9), 249.0);
    }
}
