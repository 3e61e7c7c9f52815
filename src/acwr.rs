//! Acute:Chronic Workload Ratio (ACWR)
//!
//! Acute load is the summed workout load (distance × effort) over the trailing
//! acute window; chronic load is the summed load over the trailing chronic
//! window normalised to a weekly rate. Records are always recomputed from the
//! full log window and never cached.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::PerAbility;
use crate::error::{CoachError, Result};
use crate::models::{AbilityLevel, WorkoutLog};

/// Lower bounds (inclusive) of each ACWR risk band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcwrThresholds {
    /// Ratios below this are undertraining (default: 0.8)
    pub optimal_from: Decimal,

    /// Start of the moderate risk band (default: 1.3)
    pub moderate_from: Decimal,

    /// Start of the high risk band (default: 1.5)
    pub high_from: Decimal,
}

impl Default for AcwrThresholds {
    fn default() -> Self {
        AcwrThresholds {
            optimal_from: dec!(0.8),
            moderate_from: dec!(1.3),
            high_from: dec!(1.5),
        }
    }
}

impl AcwrThresholds {
    /// Classify a defined ratio
    pub fn classify(&self, ratio: Decimal) -> RiskBand {
        if ratio >= self.high_from {
            RiskBand::High
        } else if ratio >= self.moderate_from {
            RiskBand::Moderate
        } else if ratio >= self.optimal_from {
            RiskBand::Optimal
        } else {
            RiskBand::Undertraining
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.optimal_from <= Decimal::ZERO
            || self.moderate_from <= self.optimal_from
            || self.high_from <= self.moderate_from
        {
            return Err(CoachError::Configuration(format!(
                "ACWR thresholds must be positive and strictly increasing: {} / {} / {}",
                self.optimal_from, self.moderate_from, self.high_from
            )));
        }
        Ok(())
    }
}

/// ACWR configuration with customizable windows and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcwrConfig {
    /// Acute window in days (default: 7)
    pub acute_window_days: u16,

    /// Chronic window in days (default: 28)
    pub chronic_window_days: u16,

    /// Thresholds used when no ability override is set
    pub thresholds: AcwrThresholds,

    /// Per-ability threshold overrides
    pub ability_overrides: PerAbility<AcwrThresholds>,
}

impl Default for AcwrConfig {
    fn default() -> Self {
        AcwrConfig {
            acute_window_days: 7,
            chronic_window_days: 28,
            thresholds: AcwrThresholds::default(),
            ability_overrides: PerAbility::default(),
        }
    }
}

impl AcwrConfig {
    pub fn thresholds_for(&self, ability: AbilityLevel) -> &AcwrThresholds {
        self.ability_overrides.get(ability).unwrap_or(&self.thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acute_window_days == 0 || self.chronic_window_days < self.acute_window_days {
            return Err(CoachError::Configuration(format!(
                "ACWR windows must satisfy 0 < acute ({}) <= chronic ({})",
                self.acute_window_days, self.chronic_window_days
            )));
        }
        self.thresholds.validate()?;
        for thresholds in self.ability_overrides.iter() {
            thresholds.validate()?;
        }
        Ok(())
    }
}

/// Risk band derived from the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    /// Chronic load is zero while acute load is not
    InsufficientHistory,
    Undertraining,
    Optimal,
    Moderate,
    High,
}

impl RiskBand {
    /// Ordinal risk level; the sentinel band has none
    pub fn level(&self) -> Option<u8> {
        match self {
            RiskBand::InsufficientHistory => None,
            RiskBand::Undertraining => Some(0),
            RiskBand::Optimal => Some(1),
            RiskBand::Moderate => Some(2),
            RiskBand::High => Some(3),
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskBand::Moderate | RiskBand::High)
    }

    /// True when this band is an elevated band above `previous`.
    /// A missing or sentinel previous band counts as the lowest level.
    pub fn escalates_from(&self, previous: Option<RiskBand>) -> bool {
        let previous_level = previous.and_then(|band| band.level()).unwrap_or(0);
        self.is_elevated() && self.level().map_or(false, |level| level > previous_level)
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskBand::InsufficientHistory => "Not enough training history to assess load",
            RiskBand::Undertraining => "Undertraining (load below chronic baseline)",
            RiskBand::Optimal => "Optimal (load well matched to fitness)",
            RiskBand::Moderate => "Elevated injury risk",
            RiskBand::High => "High injury risk",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskBand::InsufficientHistory => "Need at least 4 weeks of training data",
            RiskBand::Undertraining => "Consider increasing training load gradually",
            RiskBand::Optimal => "Training load is well-balanced - continue current progression",
            RiskBand::Moderate => "Monitor closely and consider reducing load",
            RiskBand::High => "Reduce load immediately - high injury risk detected",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskBand::InsufficientHistory => "insufficient history",
            RiskBand::Undertraining => "undertraining",
            RiskBand::Optimal => "optimal",
            RiskBand::Moderate => "moderate",
            RiskBand::High => "high",
        };
        write!(f, "{}", label)
    }
}

/// Aggregated load for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoad {
    pub date: NaiveDate,

    /// Sum of distance × effort over the day's workouts
    pub total_load: Decimal,

    pub workout_count: u16,
}

/// ACWR snapshot for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcwrRecord {
    pub as_of: NaiveDate,

    /// Load summed over the acute window
    pub acute_load: Decimal,

    /// Load summed over the chronic window, as a weekly rate
    pub chronic_load: Decimal,

    /// acute / chronic; `None` for the insufficient-history sentinel
    pub ratio: Option<Decimal>,

    pub band: RiskBand,

    /// Number of log entries inside the chronic window
    pub entries_considered: usize,
}

/// Core ACWR calculation engine
#[derive(Debug, Clone, Default)]
pub struct AcwrCalculator {
    config: AcwrConfig,
}

impl AcwrCalculator {
    /// Create calculator with default configuration
    pub fn new() -> Self {
        AcwrCalculator {
            config: AcwrConfig::default(),
        }
    }

    /// Create calculator with custom configuration
    pub fn with_config(config: AcwrConfig) -> Self {
        AcwrCalculator { config }
    }

    pub fn config(&self) -> &AcwrConfig {
        &self.config
    }

    /// First day of the chronic window ending at `as_of`
    pub fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        Self::days_before(as_of, self.config.chronic_window_days)
    }

    fn days_before(as_of: NaiveDate, window_days: u16) -> NaiveDate {
        as_of
            .checked_sub_days(Days::new(u64::from(window_days.saturating_sub(1))))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Aggregate load per calendar day
    pub fn aggregate_daily_load(&self, logs: &[WorkoutLog]) -> BTreeMap<NaiveDate, DailyLoad> {
        let mut daily: BTreeMap<NaiveDate, DailyLoad> = BTreeMap::new();

        for log in logs {
            let load = log.load();
            daily
                .entry(log.date)
                .and_modify(|day| {
                    day.total_load += load;
                    day.workout_count += 1;
                })
                .or_insert(DailyLoad {
                    date: log.date,
                    total_load: load,
                    workout_count: 1,
                });
        }

        daily
    }

    /// Compute the ACWR record for `as_of` from the full log history
    pub fn calculate(&self, logs: &[WorkoutLog], as_of: NaiveDate, ability: AbilityLevel) -> AcwrRecord {
        let acute_start = Self::days_before(as_of, self.config.acute_window_days);
        let chronic_start = self.window_start(as_of);

        let mut acute_sum = Decimal::ZERO;
        let mut chronic_sum = Decimal::ZERO;
        let mut entries_considered = 0;

        for log in logs.iter().filter(|l| l.date >= chronic_start && l.date <= as_of) {
            let load = log.load();
            chronic_sum += load;
            entries_considered += 1;
            if log.date >= acute_start {
                acute_sum += load;
            }
        }

        let weeks = Decimal::from(self.config.chronic_window_days) / dec!(7);
        let chronic_load = chronic_sum / weeks;

        let (ratio, band) = if chronic_load.is_zero() {
            if acute_sum.is_zero() {
                let thresholds = self.config.thresholds_for(ability);
                (Some(Decimal::ZERO), thresholds.classify(Decimal::ZERO))
            } else {
                (None, RiskBand::InsufficientHistory)
            }
        } else {
            let ratio = acute_sum / chronic_load;
            (Some(ratio), self.config.thresholds_for(ability).classify(ratio))
        };

        tracing::debug!(
            %as_of,
            acute = %acute_sum,
            chronic = %chronic_load,
            ?ratio,
            %band,
            "ACWR computed"
        );

        AcwrRecord {
            as_of,
            acute_load: acute_sum,
            chronic_load,
            ratio,
            band,
            entries_considered,
        }
    }
}
