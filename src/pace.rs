//! Pace targets, damped pace adjustment and race-time extrapolation
//!
//! Paces are seconds per kilometre. A performance delta is the signed fraction
//! by which an observed pace differed from the predicted one (negative means
//! faster than predicted).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::PerAbility;
use crate::error::{CoachError, Result};
use crate::models::AbilityLevel;

/// Training paces for one phase, seconds per km
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceTargets {
    pub easy: Decimal,
    pub long_run: Decimal,
    /// Goal race pace
    pub race: Decimal,
    pub tempo: Decimal,
    pub interval: Decimal,
}

impl PaceTargets {
    /// Derive paces from goal-race pace and ability level
    pub fn from_baseline(race_pace: Decimal, ability: AbilityLevel) -> Result<Self> {
        if race_pace <= Decimal::ZERO {
            return Err(CoachError::InvalidInput(format!(
                "Baseline pace must be positive: {}",
                race_pace
            )));
        }

        let scale = ability.pace_offset_scale();
        let targets = PaceTargets {
            easy: race_pace + dec!(55.9) * scale,
            long_run: race_pace + dec!(37.3) * scale,
            race: race_pace,
            tempo: race_pace + dec!(11.2),
            interval: race_pace - dec!(18.6),
        };

        if targets.interval <= Decimal::ZERO {
            return Err(CoachError::InvalidInput(format!(
                "Baseline pace {} s/km is too fast to derive training paces",
                race_pace
            )));
        }
        Ok(targets.rounded())
    }

    fn map(&self, f: impl Fn(Decimal) -> Decimal) -> Self {
        PaceTargets {
            easy: f(self.easy),
            long_run: f(self.long_run),
            race: f(self.race),
            tempo: f(self.tempo),
            interval: f(self.interval),
        }
    }

    /// Round every pace to a tenth of a second
    pub fn rounded(&self) -> Self {
        self.map(|p| p.round_dp(1))
    }

    pub fn as_array(&self) -> [Decimal; 5] {
        [self.easy, self.long_run, self.race, self.tempo, self.interval]
    }

    /// True when every pace is strictly faster than the matching pace in `other`
    pub fn all_faster_than(&self, other: &PaceTargets) -> bool {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .all(|(mine, theirs)| mine < theirs)
    }
}

/// Pace adjustment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceConfig {
    /// Share of an observed delta carried into future paces (default: 0.7)
    pub damping: Decimal,

    /// Per-ability damping overrides
    pub ability_damping: PerAbility<Decimal>,

    /// Riegel fatigue exponent (default: 1.06)
    pub riegel_exponent: Decimal,
}

impl Default for PaceConfig {
    fn default() -> Self {
        PaceConfig {
            damping: dec!(0.7),
            ability_damping: PerAbility::default(),
            riegel_exponent: dec!(1.06),
        }
    }
}

impl PaceConfig {
    pub fn validate(&self) -> Result<()> {
        let in_range = |k: &Decimal| *k > Decimal::ZERO && *k <= Decimal::ONE;
        if !in_range(&self.damping) || !self.ability_damping.iter().all(in_range) {
            return Err(CoachError::Configuration(
                "Damping factors must be in (0, 1]".to_string(),
            ));
        }
        if self.riegel_exponent < Decimal::ONE {
            return Err(CoachError::Configuration(format!(
                "Riegel exponent must be at least 1: {}",
                self.riegel_exponent
            )));
        }
        Ok(())
    }
}

/// Damped pace adjuster
#[derive(Debug, Clone, Default)]
pub struct PaceAdjuster {
    config: PaceConfig,
}

impl PaceAdjuster {
    pub fn new() -> Self {
        PaceAdjuster {
            config: PaceConfig::default(),
        }
    }

    pub fn with_config(config: PaceConfig) -> Self {
        PaceAdjuster { config }
    }

    pub fn config(&self) -> &PaceConfig {
        &self.config
    }

    pub fn damping_for(&self, ability: AbilityLevel) -> Decimal {
        self.config
            .ability_damping
            .get(ability)
            .copied()
            .unwrap_or(self.config.damping)
    }

    /// Move every pace by `damping × delta` relative to its current value
    pub fn adjust(&self, current: &PaceTargets, delta: Decimal, ability: AbilityLevel) -> Result<PaceTargets> {
        if delta.abs() >= Decimal::ONE {
            return Err(CoachError::InvalidInput(format!(
                "Performance delta out of range: {}",
                delta
            )));
        }

        let factor = Decimal::ONE + self.damping_for(ability) * delta;
        Ok(current.map(|pace| pace * factor))
    }

    /// Signed pace delta between a predicted and an actual time over the same distance
    pub fn performance_delta(predicted_seconds: u32, actual_seconds: u32) -> Result<Decimal> {
        if predicted_seconds == 0 || actual_seconds == 0 {
            return Err(CoachError::InvalidInput(
                "Race times must be positive".to_string(),
            ));
        }
        let predicted = Decimal::from(predicted_seconds);
        Ok((Decimal::from(actual_seconds) - predicted) / predicted)
    }

    /// Riegel extrapolation: T2 = T1 × (D2 / D1)^exponent
    pub fn predict_finish_seconds(
        &self,
        reference_km: Decimal,
        reference_seconds: u32,
        target_km: Decimal,
    ) -> Result<u32> {
        if reference_km <= Decimal::ZERO || target_km <= Decimal::ZERO || reference_seconds == 0 {
            return Err(CoachError::InvalidInput(
                "Prediction needs positive distances and time".to_string(),
            ));
        }

        let ratio = (target_km / reference_km).to_f64().unwrap_or(1.0);
        let exponent = self.config.riegel_exponent.to_f64().unwrap_or(1.06);
        let predicted = f64::from(reference_seconds) * ratio.powf(exponent);

        if !predicted.is_finite() || predicted > f64::from(u32::MAX) {
            return Err(CoachError::InvalidInput(format!(
                "Predicted time out of range for {} km",
                target_km
            )));
        }
        Ok(predicted.round() as u32)
    }
}
