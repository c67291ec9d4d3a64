/// Stop ratchet with step hysteresis
///
/// **Core Rule:** Stops may tighten, never loosen.
///
/// A proposed stop replaces the current one only when it is strictly more
/// favourable **and** the improvement is at least `step`. Small moves on noise
/// leave the stop where it is.
use crate::domain::PositionSide;

/// Ratchet rule for one position side.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratchet {
    side: PositionSide,

    /// Minimum improvement for a move to be accepted (price units).
    step: f64,
}

impl Ratchet {
    pub fn new(side: PositionSide, step: f64) -> Self {
        Self { side, step }
    }

    /// Ratchet without hysteresis: any strict tightening is accepted.
    pub fn tighten_only(side: PositionSide) -> Self {
        Self { side, step: 0.0 }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Signed improvement of `proposed` over `current` (positive = tighter).
    pub fn improvement(&self, current: f64, proposed: f64) -> f64 {
        (proposed - current) * self.side.sign()
    }

    /// Apply the ratchet to a proposed stop level.
    ///
    /// Returns `Some(level)` when the stop moves, `None` when it stays.
    ///
    /// # Rules
    /// - No current level: the proposal is accepted as is
    /// - Otherwise the move must be strictly tighter and at least `step`
    ///
    /// # Example
    /// ```
    /// use stoplab_core::domain::PositionSide;
    /// use stoplab_core::protective::Ratchet;
    ///
    /// let ratchet = Ratchet::new(PositionSide::Long, 0.5);
    ///
    /// // Tightening by 3.7: accepted
    /// assert_eq!(ratchet.apply(Some(98.0), 101.7), Some(101.7));
    ///
    /// // Tightening by 0.2: below the step, blocked
    /// assert_eq!(ratchet.apply(Some(101.7), 101.9), None);
    ///
    /// // Loosening: blocked
    /// assert_eq!(ratchet.apply(Some(101.7), 99.0), None);
    /// ```
    pub fn apply(&self, current: Option<f64>, proposed: f64) -> Option<f64> {
        if self.side.is_flat() || !proposed.is_finite() {
            return None;
        }
        match current {
            None => Some(proposed),
            Some(current) => {
                let improvement = self.improvement(current, proposed);
                if improvement > 0.0 && improvement + 1e-12 >= self.step {
                    Some(proposed)
                } else {
                    None
                }
            }
        }
    }
}
