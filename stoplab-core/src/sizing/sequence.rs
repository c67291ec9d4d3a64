//! Labouchère stake sequence.
//!
//! Next stake = first + last. A win removes both ends, a loss appends the
//! stake just lost. Once one element or fewer remain the sequence is either
//! recycled to its initial configuration or new entries are suppressed.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceState {
    initial: Vec<f64>,
    stakes: Vec<f64>,
    recycle: bool,
}

impl SequenceState {
    /// Parse a stake list such as `"1,2,1,2"` or `"1 2 1 2"`.
    pub fn parse(input: &str) -> Result<Vec<f64>, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedSequence {
            input: input.to_string(),
            reason,
        };

        let mut stakes = Vec::new();
        for token in input
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let stake: f64 = token
                .parse()
                .map_err(|_| malformed(format!("'{token}' is not a number")))?;
            if !stake.is_finite() || stake <= 0.0 {
                return Err(malformed(format!("stake {token} must be positive")));
            }
            stakes.push(stake);
        }

        if stakes.len() < 2 {
            return Err(malformed("at least two stakes are required".into()));
        }
        Ok(stakes)
    }

    pub fn new(initial: Vec<f64>, recycle: bool) -> Self {
        Self {
            stakes: initial.clone(),
            initial,
            recycle,
        }
    }

    pub fn from_config(input: &str, recycle: bool) -> Result<Self, ConfigError> {
        Ok(Self::new(Self::parse(input)?, recycle))
    }

    /// Rebuild from an externalized stake list.
    pub fn from_stakes(initial: Vec<f64>, stakes: Vec<f64>, recycle: bool) -> Self {
        Self {
            initial,
            stakes,
            recycle,
        }
    }

    /// Current stakes as a flat ordered list.
    pub fn stakes(&self) -> &[f64] {
        &self.stakes
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    /// Stake for the next trade, or `None` once the sequence is exhausted.
    pub fn next_stake(&self) -> Option<f64> {
        match (self.stakes.first(), self.stakes.last()) {
            (Some(first), Some(last)) if self.stakes.len() >= 2 => Some(first + last),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stakes.len() < 2
    }

    /// Remove both ends; recycle if the sequence collapsed.
    ///
    /// Returns true when the sequence was reset to its initial configuration.
    pub fn record_win(&mut self) -> bool {
        if self.stakes.len() >= 2 {
            self.stakes.remove(0);
            self.stakes.pop();
        }
        if self.stakes.len() < 2 && self.recycle {
            self.reset();
            return true;
        }
        false
    }

    /// Append the stake just lost.
    pub fn record_loss(&mut self) {
        if let Some(stake) = self.next_stake() {
            self.stakes.push(stake);
        }
    }

    pub fn reset(&mut self) {
        self.stakes = self.initial.clone();
    }
}
