use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoachError, Result};

/// Marathon distance in kilometres
pub const MARATHON_KM: Decimal = dec!(42.195);

/// Longest single workout, race or weekly volume accepted, in kilometres
pub const MAX_DISTANCE_KM: Decimal = dec!(1000);

/// Longest single workout accepted, in minutes (one week)
pub const MAX_DURATION_MINUTES: Decimal = dec!(10080);

/// Slowest goal-race pace accepted, in seconds per kilometre
pub const MAX_PACE_SECONDS_PER_KM: Decimal = dec!(3600);

/// Athlete ability level, drives progression rates, peak volume and pace offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl AbilityLevel {
    /// Peak weekly volume (km) when training for a marathon
    pub fn marathon_peak_weekly_km(&self) -> Decimal {
        match self {
            AbilityLevel::Beginner => dec!(55),
            AbilityLevel::Intermediate => dec!(70),
            AbilityLevel::Advanced => dec!(90),
        }
    }

    /// Scale applied to the easy/long-run offsets from goal pace.
    /// Less experienced runners keep their aerobic work further from race pace.
    pub fn pace_offset_scale(&self) -> Decimal {
        match self {
            AbilityLevel::Beginner => dec!(1.2),
            AbilityLevel::Intermediate => dec!(1.0),
            AbilityLevel::Advanced => dec!(0.85),
        }
    }
}

impl fmt::Display for AbilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbilityLevel::Beginner => write!(f, "beginner"),
            AbilityLevel::Intermediate => write!(f, "intermediate"),
            AbilityLevel::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for AbilityLevel {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "beginner" | "novice" => Ok(AbilityLevel::Beginner),
            "intermediate" => Ok(AbilityLevel::Intermediate),
            "advanced" | "elite" => Ok(AbilityLevel::Advanced),
            _ => Err(CoachError::InvalidInput(format!("Unknown ability level: {}", s))),
        }
    }
}

/// Athlete profile as maintained by the external profile store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    /// Unique athlete identifier
    pub id: String,

    /// Athlete's display name
    pub name: String,

    /// Self-reported ability level
    pub ability_level: AbilityLevel,

    /// Goal race distance in kilometres
    pub goal_distance_km: Decimal,

    /// Current goal-race pace in seconds per kilometre
    pub baseline_pace: Decimal,

    /// Current weekly running volume in kilometres
    pub current_weekly_km: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AthleteProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        ability_level: AbilityLevel,
        baseline_pace: Decimal,
        current_weekly_km: Decimal,
    ) -> Self {
        let now = Utc::now();
        AthleteProfile {
            id: id.into(),
            name: name.into(),
            ability_level,
            goal_distance_km: MARATHON_KM,
            baseline_pace,
            current_weekly_km,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reject paces and volumes outside what plan arithmetic accepts
    pub fn validate(&self) -> Result<()> {
        if self.baseline_pace <= Decimal::ZERO || self.baseline_pace > MAX_PACE_SECONDS_PER_KM {
            return Err(CoachError::InvalidInput(format!(
                "Baseline pace must be between 0 and {} s/km: {}",
                MAX_PACE_SECONDS_PER_KM, self.baseline_pace
            )));
        }
        if self.current_weekly_km < Decimal::ZERO || self.current_weekly_km > MAX_DISTANCE_KM {
            return Err(CoachError::InvalidInput(format!(
                "Weekly volume must be between 0 and {} km: {}",
                MAX_DISTANCE_KM, self.current_weekly_km
            )));
        }
        Ok(())
    }
}

/// A single logged workout. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    /// Unique identifier
    pub id: String,

    /// Day the workout took place
    pub date: NaiveDate,

    /// Distance in kilometres
    pub distance_km: Decimal,

    /// Duration in minutes
    pub duration_minutes: Decimal,

    /// Rate of perceived exertion, 1-10
    pub effort: Decimal,

    pub notes: Option<String>,
}

impl WorkoutLog {
    pub fn new(date: NaiveDate, distance_km: Decimal, duration_minutes: Decimal, effort: Decimal) -> Self {
        WorkoutLog {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            distance_km,
            duration_minutes,
            effort,
            notes: None,
        }
    }

    /// Training load contributed by this workout (distance × effort)
    pub fn load(&self) -> Decimal {
        self.distance_km * self.effort
    }

    /// Reject entries that can never be valid as of `today`
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.date > today {
            return Err(CoachError::InvalidInput(format!(
                "Workout date {} is in the future (today is {})",
                self.date, today
            )));
        }
        if self.distance_km < Decimal::ZERO || self.distance_km > MAX_DISTANCE_KM {
            return Err(CoachError::InvalidInput(format!(
                "Distance must be between 0 and {} km: {}",
                MAX_DISTANCE_KM, self.distance_km
            )));
        }
        if self.duration_minutes < Decimal::ZERO || self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(CoachError::InvalidInput(format!(
                "Duration must be between 0 and {} minutes: {}",
                MAX_DURATION_MINUTES, self.duration_minutes
            )));
        }
        if self.effort < Decimal::ONE || self.effort > dec!(10) {
            return Err(CoachError::InvalidInput(format!(
                "Perceived effort must be between 1 and 10: {}",
                self.effort
            )));
        }
        Ok(())
    }
}

/// Injury severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjurySeverity {
    Mild,
    Moderate,
    Severe,
}

impl InjurySeverity {
    /// Moderate and severe reports suspend mileage progression
    pub fn requires_mitigation(&self) -> bool {
        *self >= InjurySeverity::Moderate
    }
}

impl fmt::Display for InjurySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjurySeverity::Mild => write!(f, "mild"),
            InjurySeverity::Moderate => write!(f, "moderate"),
            InjurySeverity::Severe => write!(f, "severe"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryStatus {
    Active,
    Resolving,
    Resolved,
}

/// A reported injury and the actions attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryReport {
    pub id: String,

    /// Body location, e.g. "it_band", "achilles"
    pub location: String,

    pub severity: InjurySeverity,

    pub reported_date: NaiveDate,

    pub status: InjuryStatus,

    pub resolved_date: Option<NaiveDate>,

    /// Mitigation actions issued for this report
    pub mitigation: Vec<String>,
}

impl InjuryReport {
    pub fn is_open(&self) -> bool {
        self.status != InjuryStatus::Resolved
    }
}

/// Corrective exercise returned by the exercise catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub sets: u8,
    pub reps: String,
    /// Why the exercise helps
    pub purpose: String,
}

/// Catalog entry for one injury location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehabProtocol {
    pub injury_name: String,
    pub exercises: Vec<Exercise>,
    /// Changes to normal training while the injury is open
    pub training_modifications: Vec<String>,
    pub return_to_running_criteria: Vec<String>,
}

/// Render seconds as `h:mm:ss`
pub fn format_hms(total_seconds: u32) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Parse `h:mm:ss`, `mm:ss` or plain seconds
pub fn parse_hms(input: &str) -> Result<u32> {
    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(CoachError::InvalidInput(format!("Invalid time: {}", input)));
    }

    let mut total: u32 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: u32 = part
            .parse()
            .map_err(|_| CoachError::InvalidInput(format!("Invalid time: {}", input)))?;
        if i > 0 && value >= 60 {
            return Err(CoachError::InvalidInput(format!("Invalid time: {}", input)));
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| CoachError::InvalidInput(format!("Time out of range: {}", input)))?;
    }
    Ok(total)
}

/// Render a pace (seconds per km) as `m:ss/km`
pub fn format_pace(seconds_per_km: Decimal) -> String {
    let secs = seconds_per_km.round().to_u32().unwrap_or(0);
    format!("{}:{:02}/km", secs / 60, secs % 60)
}

/// Serde helper accepting finish times as integer seconds or `h:mm:ss` strings
pub mod flexible_seconds {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(seconds: &u32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(*seconds)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SecondsVisitor;

        impl<'de> Visitor<'de> for SecondsVisitor {
            type Value = u32;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("seconds or an h:mm:ss string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
                u32::try_from(v).map_err(|_| E::custom("time out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
                u32::try_from(v).map_err(|_| E::custom("time must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
                super::parse_hms(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SecondsVisitor)
    }
}
