use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PerAbility;
use crate::error::{CoachError, Result};
use crate::models::{AbilityLevel, AthleteProfile, MARATHON_KM, MAX_DISTANCE_KM};
use crate::pace::PaceTargets;

/// Lifecycle of a training plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
}

/// Phase progression; ordering follows the lifecycle so status can only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
}

impl PhaseStatus {
    pub fn is_locked(&self) -> bool {
        !matches!(self, PhaseStatus::Pending)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "Pending"),
            PhaseStatus::InProgress => write!(f, "In progress"),
            PhaseStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// Requested milestone race, as supplied when a plan is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneSpec {
    /// Plan week at which the milestone race is run (a phase boundary)
    pub week: u32,
    pub distance_km: Decimal,
    #[serde(with = "crate::models::flexible_seconds")]
    pub predicted_time: u32,
}

/// Milestone race anchored at the end of a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub week: u32,
    pub distance_km: Decimal,
    pub predicted_seconds: u32,
    pub actual_seconds: Option<u32>,
    pub recorded_date: Option<NaiveDate>,
}

impl Milestone {
    pub fn is_recorded(&self) -> bool {
        self.actual_seconds.is_some()
    }

    /// Predicted pace in seconds per km
    pub fn predicted_pace(&self) -> Decimal {
        Decimal::from(self.predicted_seconds) / self.distance_km
    }
}

/// Contiguous block of training weeks `[start_week, end_week)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub index: usize,
    pub name: String,
    pub start_week: u32,
    pub end_week: u32,
    /// Planned volume, one entry per week of the phase
    pub weekly_mileage: Vec<Decimal>,
    pub paces: PaceTargets,
    pub milestone: Option<Milestone>,
    pub status: PhaseStatus,
}

impl Phase {
    pub fn weeks(&self) -> u32 {
        self.end_week - self.start_week
    }

    pub fn contains_week(&self, week: u32) -> bool {
        week >= self.start_week && week < self.end_week
    }

    pub fn planned_km(&self, week: u32) -> Option<Decimal> {
        if !self.contains_week(week) {
            return None;
        }
        self.weekly_mileage
            .get((week - self.start_week) as usize)
            .copied()
    }

    /// Advance status, never moving it backwards
    pub fn advance(&mut self, status: PhaseStatus) {
        if status > self.status {
            self.status = status;
        }
    }
}

/// Cap on effective weekly volume while an injury is unresolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MileageHold {
    pub injury_id: String,
    pub from_week: u32,
    pub capped_km: Decimal,
}

/// Multi-phase training plan toward a goal race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: String,
    pub athlete_id: String,
    pub goal_distance_km: Decimal,
    pub start_date: NaiveDate,
    pub goal_date: NaiveDate,
    pub duration_weeks: u32,
    pub phases: Vec<Phase>,
    pub status: PlanStatus,
    pub predicted_finish_seconds: u32,
    #[serde(default)]
    pub mileage_holds: Vec<MileageHold>,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingPlan {
    /// Plan week containing `date`; days before the start map to week 0
    pub fn week_of(&self, date: NaiveDate) -> u32 {
        let days = (date - self.start_date).num_days();
        if days <= 0 {
            0
        } else {
            u32::try_from(days / 7).unwrap_or(u32::MAX)
        }
    }

    pub fn activate(&mut self) {
        if self.status == PlanStatus::Draft {
            self.status = PlanStatus::Active;
            self.touch();
        }
    }

    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    pub fn phase_containing(&self, week: u32) -> Option<&Phase> {
        self.phases.iter().find(|p| p.contains_week(week))
    }

    pub fn milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.phases.iter().filter_map(|p| p.milestone.as_ref())
    }

    /// Index of the phase anchored on milestone `id`
    pub fn milestone_phase_index(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| {
            p.milestone
                .as_ref()
                .map(|m| m.id == id)
                .unwrap_or(false)
        })
    }

    /// Planned volume for every week of the plan
    pub fn planned_targets(&self) -> Vec<Decimal> {
        self.phases
            .iter()
            .flat_map(|p| p.weekly_mileage.iter().copied())
            .collect()
    }

    /// Planned volume for `week` after applying mileage holds
    pub fn effective_target(&self, week: u32) -> Option<Decimal> {
        let planned = self.phase_containing(week)?.planned_km(week)?;
        Some(
            self.mileage_holds
                .iter()
                .filter(|hold| week >= hold.from_week)
                .fold(planned, |km, hold| km.min(hold.capped_km)),
        )
    }

    pub fn effective_targets(&self) -> Vec<Decimal> {
        (0..self.duration_weeks)
            .filter_map(|week| self.effective_target(week))
            .collect()
    }

    pub fn is_held(&self) -> bool {
        !self.mileage_holds.is_empty()
    }

    /// Freeze progression from `week` at that week's effective volume
    pub fn apply_hold(&mut self, injury_id: &str, week: u32) -> Result<()> {
        if self.mileage_holds.iter().any(|h| h.injury_id == injury_id) {
            return Ok(());
        }
        let week = week.min(self.duration_weeks.saturating_sub(1));
        let capped_km = self.effective_target(week).ok_or_else(|| {
            CoachError::InvalidInput(format!("Week {} is outside the plan", week))
        })?;

        self.mileage_holds.push(MileageHold {
            injury_id: injury_id.to_string(),
            from_week: week,
            capped_km,
        });
        self.touch();
        Ok(())
    }

    /// Remove the hold for `injury_id`; true if one was present
    pub fn lift_hold(&mut self, injury_id: &str) -> bool {
        let before = self.mileage_holds.len();
        self.mileage_holds.retain(|h| h.injury_id != injury_id);
        let lifted = self.mileage_holds.len() != before;
        if lifted {
            self.touch();
        }
        lifted
    }

    /// Bring phase statuses up to date with `today`.
    ///
    /// A phase anchored on a milestone cannot complete, and the phase after it
    /// cannot start, until the milestone result has been recorded.
    pub fn advance_to(&mut self, today: NaiveDate) {
        let week = self.week_of(today);
        let mut previous_gate_open = true;

        for phase in &mut self.phases {
            let mut target = if week >= phase.end_week {
                PhaseStatus::Completed
            } else if week >= phase.start_week {
                PhaseStatus::InProgress
            } else {
                PhaseStatus::Pending
            };

            if !previous_gate_open {
                target = PhaseStatus::Pending;
            }
            let gate_open = phase
                .milestone
                .as_ref()
                .map(|m| m.is_recorded())
                .unwrap_or(true);
            if !gate_open {
                target = target.min(PhaseStatus::InProgress);
            }

            phase.advance(target);
            previous_gate_open = previous_gate_open && gate_open;
        }

        if self.status == PlanStatus::Active
            && self.phases.iter().all(|p| p.status == PhaseStatus::Completed)
        {
            self.status = PlanStatus::Completed;
        }
    }

    /// Check structural invariants: contiguous phases covering the horizon
    pub fn validate(&self) -> Result<()> {
        let violation = |msg: String| Err(CoachError::InvalidInput(format!("Plan invariant violated: {}", msg)));

        let Some(first) = self.phases.first() else {
            return violation("plan has no phases".to_string());
        };
        if first.start_week != 0 {
            return violation(format!("first phase starts at week {}", first.start_week));
        }

        let mut expected_start = 0;
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.index != i {
                return violation(format!("phase {} has index {}", i, phase.index));
            }
            if phase.start_week != expected_start || phase.end_week <= phase.start_week {
                return violation(format!(
                    "phase {} spans [{}, {}) after week {}",
                    i, phase.start_week, phase.end_week, expected_start
                ));
            }
            if phase.weekly_mileage.len() != phase.weeks() as usize {
                return violation(format!("phase {} has {} mileage entries for {} weeks", i, phase.weekly_mileage.len(), phase.weeks()));
            }
            if phase.weekly_mileage.iter().any(|km| *km < Decimal::ZERO) {
                return violation(format!("phase {} has negative mileage", i));
            }
            if phase.paces.as_array().iter().any(|p| *p <= Decimal::ZERO) {
                return violation(format!("phase {} has a non-positive pace", i));
            }
            if let Some(milestone) = &phase.milestone {
                if milestone.week != phase.end_week {
                    return violation(format!(
                        "milestone {} at week {} but phase {} ends at week {}",
                        milestone.id, milestone.week, i, phase.end_week
                    ));
                }
            }
            expected_start = phase.end_week;
        }

        if expected_start != self.duration_weeks {
            return violation(format!(
                "phases end at week {} but plan lasts {} weeks",
                expected_start, self.duration_weeks
            ));
        }
        Ok(())
    }
}

/// Plan construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Shortest allowed phase (default: 4 weeks)
    pub min_phase_weeks: u32,

    /// Week-over-week volume increase cap (default: 10%)
    pub max_weekly_increase: Decimal,

    /// Lowest starting weekly volume in km
    pub min_start_weekly_km: Decimal,

    /// Taper length in weeks, clamped to 1-3
    pub taper_weeks: u32,

    /// Taper reduction per week as a share of the pre-taper peak (default: 20%)
    pub taper_step: Decimal,

    /// Marathon peak weekly volume overrides per ability level
    pub peak_weekly_km: PerAbility<Decimal>,

    /// Longest plan horizon accepted (default: 104 weeks)
    pub max_duration_weeks: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            min_phase_weeks: 4,
            max_weekly_increase: dec!(0.10),
            min_start_weekly_km: dec!(15),
            taper_weeks: 3,
            taper_step: dec!(0.20),
            peak_weekly_km: PerAbility::default(),
            max_duration_weeks: 104,
        }
    }
}

impl PlanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_phase_weeks == 0 {
            return Err(CoachError::Configuration(
                "min_phase_weeks must be at least 1".to_string(),
            ));
        }
        if self.max_weekly_increase <= Decimal::ZERO || self.max_weekly_increase > dec!(0.5) {
            return Err(CoachError::Configuration(format!(
                "max_weekly_increase must be in (0, 0.5]: {}",
                self.max_weekly_increase
            )));
        }
        if self.min_start_weekly_km <= Decimal::ZERO {
            return Err(CoachError::Configuration(
                "min_start_weekly_km must be positive".to_string(),
            ));
        }
        if !(1..=3).contains(&self.taper_weeks) {
            return Err(CoachError::Configuration(format!(
                "taper_weeks must be between 1 and 3: {}",
                self.taper_weeks
            )));
        }
        if self.taper_step <= Decimal::ZERO
            || self.taper_step * Decimal::from(self.taper_weeks) >= Decimal::ONE
        {
            return Err(CoachError::Configuration(format!(
                "taper_step {} leaves no volume after {} taper weeks",
                self.taper_step, self.taper_weeks
            )));
        }
        if self.peak_weekly_km.iter().any(|km| *km <= Decimal::ZERO || *km > MAX_DISTANCE_KM) {
            return Err(CoachError::Configuration(format!(
                "peak_weekly_km overrides must be in (0, {}]",
                MAX_DISTANCE_KM
            )));
        }
        if self.max_duration_weeks < self.min_phase_weeks {
            return Err(CoachError::Configuration(format!(
                "max_duration_weeks {} is shorter than one phase",
                self.max_duration_weeks
            )));
        }
        Ok(())
    }

    /// Peak weekly volume for a goal race of `goal_km`
    pub fn peak_for(&self, ability: AbilityLevel, goal_km: Decimal) -> Decimal {
        let marathon_peak = self
            .peak_weekly_km
            .get(ability)
            .copied()
            .unwrap_or_else(|| ability.marathon_peak_weekly_km());
        marathon_peak * goal_km / MARATHON_KM
    }
}

/// Goal parameters for a new plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub goal_distance_km: Decimal,
    pub duration_weeks: u32,
    #[serde(default)]
    pub milestones: Vec<MilestoneSpec>,
    pub start_date: NaiveDate,
}

/// Builds draft plans from goal parameters
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    config: PlanConfig,
}

fn truncate_km(km: Decimal) -> Decimal {
    km.round_dp_with_strategy(1, RoundingStrategy::ToZero)
}

impl PlanBuilder {
    pub fn new() -> Self {
        PlanBuilder {
            config: PlanConfig::default(),
        }
    }

    pub fn with_config(config: PlanConfig) -> Self {
        PlanBuilder { config }
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    /// Build a draft plan for `profile`
    pub fn build(&self, profile: &AthleteProfile, request: &PlanRequest) -> Result<TrainingPlan> {
        profile.validate()?;
        self.validate_request(request)?;
        let goal_date = request
            .start_date
            .checked_add_days(Days::new(u64::from(request.duration_weeks) * 7))
            .ok_or_else(|| CoachError::InvalidInput("Goal date out of range".to_string()))?;
        let boundaries = self.phase_boundaries(request)?;

        let last_phase_weeks = request.duration_weeks - boundaries[boundaries.len() - 2];
        let mileage = self.mileage_curve(profile, request, last_phase_weeks);
        let paces = PaceTargets::from_baseline(profile.baseline_pace, profile.ability_level)?;

        let mut milestones: Vec<&MilestoneSpec> = request.milestones.iter().collect();
        milestones.sort_by_key(|m| m.week);

        let phases = boundaries
            .windows(2)
            .enumerate()
            .map(|(index, bounds)| {
                let (start_week, end_week) = (bounds[0], bounds[1]);
                let milestone = milestones.get(index).map(|spec| Milestone {
                    id: uuid::Uuid::new_v4().to_string(),
                    week: spec.week,
                    distance_km: spec.distance_km,
                    predicted_seconds: spec.predicted_time,
                    actual_seconds: None,
                    recorded_date: None,
                });
                let name = match &milestone {
                    Some(m) => format!("Build to {} km milestone", m.distance_km.normalize()),
                    None => "Build to goal race".to_string(),
                };

                Phase {
                    index,
                    name,
                    start_week,
                    end_week,
                    weekly_mileage: mileage[start_week as usize..end_week as usize].to_vec(),
                    paces: paces.clone(),
                    milestone,
                    status: PhaseStatus::Pending,
                }
            })
            .collect();

        let predicted = (profile.baseline_pace * request.goal_distance_km).round();
        let predicted_finish_seconds = predicted.to_u32().ok_or_else(|| {
            CoachError::InvalidInput(format!("Predicted finish time out of range: {}", predicted))
        })?;

        let now = Utc::now();
        let plan = TrainingPlan {
            id: uuid::Uuid::new_v4().to_string(),
            athlete_id: profile.id.clone(),
            goal_distance_km: request.goal_distance_km,
            start_date: request.start_date,
            goal_date,
            duration_weeks: request.duration_weeks,
            phases,
            status: PlanStatus::Draft,
            predicted_finish_seconds,
            mileage_holds: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        plan.validate()?;

        tracing::info!(
            athlete = %profile.id,
            weeks = plan.duration_weeks,
            phases = plan.phases.len(),
            predicted = predicted_finish_seconds,
            "Built training plan"
        );
        Ok(plan)
    }

    fn validate_request(&self, request: &PlanRequest) -> Result<()> {
        let distance_ok = |km: Decimal| km > Decimal::ZERO && km <= MAX_DISTANCE_KM;
        if !distance_ok(request.goal_distance_km) {
            return Err(CoachError::InvalidInput(format!(
                "Goal distance must be between 0 and {} km: {}",
                MAX_DISTANCE_KM, request.goal_distance_km
            )));
        }
        if request.duration_weeks > self.config.max_duration_weeks {
            return Err(CoachError::InvalidInput(format!(
                "Plans are limited to {} weeks: {}",
                self.config.max_duration_weeks, request.duration_weeks
            )));
        }
        for milestone in &request.milestones {
            if !distance_ok(milestone.distance_km) {
                return Err(CoachError::InvalidInput(format!(
                    "Milestone distance must be between 0 and {} km: {}",
                    MAX_DISTANCE_KM, milestone.distance_km
                )));
            }
            if milestone.predicted_time == 0 {
                return Err(CoachError::InvalidInput(
                    "Milestone predicted time must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Week boundaries `[0, m1, m2, ..., duration]`
    fn phase_boundaries(&self, request: &PlanRequest) -> Result<Vec<u32>> {
        let duration = request.duration_weeks;
        let min_weeks = self.config.min_phase_weeks;
        let phase_count = request.milestones.len() as u32 + 1;

        if duration < min_weeks.saturating_mul(phase_count) {
            return Err(CoachError::InfeasiblePlan(format!(
                "{} weeks cannot hold {} phases of at least {} weeks",
                duration, phase_count, min_weeks
            )));
        }

        let mut weeks: Vec<u32> = request.milestones.iter().map(|m| m.week).collect();
        weeks.sort_unstable();

        if let Some(week) = weeks.iter().find(|w| **w == 0 || **w >= duration) {
            return Err(CoachError::InfeasiblePlan(format!(
                "Milestone week {} is outside the plan (1..{})",
                week, duration
            )));
        }
        if let Some(pair) = weeks.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(CoachError::InfeasiblePlan(format!(
                "Two milestones fall in week {}",
                pair[0]
            )));
        }

        let mut boundaries = Vec::with_capacity(weeks.len() + 2);
        boundaries.push(0);
        boundaries.extend(weeks);
        boundaries.push(duration);

        if let Some(pair) = boundaries.windows(2).find(|pair| pair[1] - pair[0] < min_weeks) {
            return Err(CoachError::InfeasiblePlan(format!(
                "Phase from week {} to {} is shorter than {} weeks",
                pair[0], pair[1], min_weeks
            )));
        }
        Ok(boundaries)
    }

    /// Plan-wide weekly volume: capped ramp toward the peak, then taper
    fn mileage_curve(&self, profile: &AthleteProfile, request: &PlanRequest, last_phase_weeks: u32) -> Vec<Decimal> {
        let duration = request.duration_weeks as usize;
        let taper_weeks = self
            .config
            .taper_weeks
            .clamp(1, 3)
            .min(last_phase_weeks.saturating_sub(1)) as usize;
        let build_weeks = duration - taper_weeks;

        let peak = self.config.peak_for(profile.ability_level, request.goal_distance_km);
        let growth = Decimal::ONE + self.config.max_weekly_increase;

        let mut curve = Vec::with_capacity(duration);
        let mut current = truncate_km(profile.current_weekly_km.max(self.config.min_start_weekly_km));
        for _ in 0..build_weeks {
            curve.push(current);
            current = truncate_km((current * growth).min(peak.max(current)));
        }

        let pre_taper_peak = curve.last().copied().unwrap_or(current);
        for week in 1..=taper_weeks {
            let share = Decimal::ONE - self.config.taper_step * Decimal::from(week as u32);
            curve.push(truncate_km(pre_taper_peak * share));
        }
        curve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn athlete(weekly_km: Decimal) -> AthleteProfile {
        AthleteProfile::new("runner-1", "Test Runner", AbilityLevel::Intermediate, dec!(300), weekly_km)
    }

    fn request(weeks: u32, milestones: Vec<MilestoneSpec>) -> PlanRequest {
        PlanRequest {
            goal_distance_km: dec!(42.2),
            duration_weeks: weeks,
            milestones,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        }
    }

    fn milestone(week: u32, km: Decimal, seconds: u32) -> MilestoneSpec {
        MilestoneSpec {
            week,
            distance_km: km,
            predicted_time: seconds,
        }
    }

    #[test]
    fn test_two_phase_split() {
        let plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(26, vec![milestone(12, dec!(29), 9000)]))
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.phases.len(), 2);
        assert_eq!((plan.phases[0].start_week, plan.phases[0].end_week), (0, 12));
        assert_eq!((plan.phases[1].start_week, plan.phases[1].end_week), (12, 26));
        assert_eq!(plan.phases[0].name, "Build to 29 km milestone");
        assert_eq!(plan.phases[1].name, "Build to goal race");
        assert_eq!(plan.phases[0].milestone.as_ref().unwrap().week, 12);
        assert_eq!(plan.goal_date, NaiveDate::from_ymd_opt(2026, 7, 6).unwrap());
        assert_eq!(plan.predicted_finish_seconds, 12_660);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_mileage_ramp_and_taper() {
        let plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(26, vec![milestone(12, dec!(29), 9000)]))
            .unwrap();
        let targets = plan.planned_targets();

        assert_eq!(targets.len(), 26);
        assert_eq!(targets[0], dec!(30));

        let build = &targets[..23];
        for pair in build.windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!(pair[1] <= pair[0] * dec!(1.1));
        }
        assert_eq!(targets[22], dec!(70.0));
        assert_eq!(&targets[23..], &[dec!(56.0), dec!(42.0), dec!(28.0)]);
    }

    #[test]
    fn test_start_volume_floor() {
        let plan = PlanBuilder::new()
            .build(&athlete(dec!(5)), &request(16, vec![]))
            .unwrap();
        assert_eq!(plan.planned_targets()[0], dec!(15));
    }

    #[test]
    fn test_short_final_phase_shortens_taper() {
        let config = PlanConfig {
            min_phase_weeks: 2,
            ..PlanConfig::default()
        };
        let plan = PlanBuilder::with_config(config)
            .build(&athlete(dec!(30)), &request(10, vec![milestone(8, dec!(21.1), 6000)]))
            .unwrap();
        let targets = plan.planned_targets();

        // Final phase has two weeks, so only its last week tapers
        assert!(targets[9] < targets[8]);
        assert!(targets[8] >= targets[7]);
    }

    #[test]
    fn test_infeasible_milestones() {
        let builder = PlanBuilder::new();
        let profile = athlete(dec!(30));

        let cases = vec![
            request(26, vec![milestone(26, dec!(29), 9000)]),
            request(26, vec![milestone(0, dec!(29), 9000)]),
            request(26, vec![milestone(12, dec!(29), 9000), milestone(12, dec!(21.1), 6000)]),
            request(26, vec![milestone(2, dec!(10), 3000)]),
            request(26, vec![milestone(24, dec!(10), 3000)]),
            request(3, vec![]),
        ];
        for case in cases {
            let err = builder.build(&profile, &case).unwrap_err();
            assert!(matches!(err, CoachError::InfeasiblePlan(_)), "{:?}", case);
        }
    }

    #[test]
    fn test_invalid_goal_parameters() {
        let builder = PlanBuilder::new();
        let profile = athlete(dec!(30));

        let mut bad_goal = request(16, vec![]);
        bad_goal.goal_distance_km = dec!(0);
        assert!(matches!(builder.build(&profile, &bad_goal), Err(CoachError::InvalidInput(_))));

        let bad_milestone = request(16, vec![milestone(8, dec!(10), 0)]);
        assert!(matches!(builder.build(&profile, &bad_milestone), Err(CoachError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_out_of_range_distances() {
        let builder = PlanBuilder::new();
        let huge = Decimal::from_scientific("1e28").unwrap();

        let mut goal = request(16, vec![]);
        goal.goal_distance_km = huge;
        assert!(matches!(builder.build(&athlete(dec!(30)), &goal), Err(CoachError::InvalidInput(_))));

        let long_milestone = request(16, vec![milestone(8, huge, 3000)]);
        assert!(matches!(
            builder.build(&athlete(dec!(30)), &long_milestone),
            Err(CoachError::InvalidInput(_))
        ));

        let plan = request(16, vec![]);
        assert!(matches!(builder.build(&athlete(huge), &plan), Err(CoachError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_overlong_horizon() {
        let builder = PlanBuilder::new();
        let profile = athlete(dec!(30));

        assert!(builder.build(&profile, &request(104, vec![])).is_ok());
        for weeks in [105, u32::MAX] {
            let err = builder.build(&profile, &request(weeks, vec![])).unwrap_err();
            assert!(matches!(err, CoachError::InvalidInput(_)), "{} weeks", weeks);
        }

        let config = PlanConfig {
            max_duration_weeks: 2,
            ..PlanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_milestone_predicted_pace() {
        let plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(26, vec![milestone(12, dec!(20), 6000)]))
            .unwrap();
        let milestone = plan.milestones().next().unwrap();
        assert_eq!(milestone.predicted_pace(), dec!(300));
    }

    #[test]
    fn test_advance_waits_for_milestone_result() {
        let mut plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(26, vec![milestone(12, dec!(29), 9000)]))
            .unwrap();
        plan.activate();

        let week_13 = plan.start_date + Days::new(13 * 7);
        plan.advance_to(week_13);
        assert_eq!(plan.phases[0].status, PhaseStatus::InProgress);
        assert_eq!(plan.phases[1].status, PhaseStatus::Pending);

        if let Some(m) = plan.phases[0].milestone.as_mut() {
            m.actual_seconds = Some(8640);
        }
        plan.advance_to(week_13);
        assert_eq!(plan.phases[0].status, PhaseStatus::Completed);
        assert_eq!(plan.phases[1].status, PhaseStatus::InProgress);

        // Status never regresses
        plan.advance_to(plan.start_date);
        assert_eq!(plan.phases[0].status, PhaseStatus::Completed);

        plan.advance_to(plan.goal_date);
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[test]
    fn test_mileage_hold_caps_later_weeks() {
        let mut plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(16, vec![]))
            .unwrap();
        let planned = plan.planned_targets();

        plan.apply_hold("injury-1", 3).unwrap();
        let effective = plan.effective_targets();

        assert_eq!(&effective[..4], &planned[..4]);
        assert!(effective[4..].iter().all(|km| *km <= planned[3]));
        assert_eq!(plan.planned_targets(), planned);

        assert!(plan.lift_hold("injury-1"));
        assert_eq!(plan.effective_targets(), planned);
        assert!(!plan.lift_hold("injury-1"));
    }

    #[test]
    fn test_validate_detects_gap() {
        let mut plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(26, vec![milestone(12, dec!(29), 9000)]))
            .unwrap();
        plan.phases[1].start_week = 13;
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_week_of() {
        let plan = PlanBuilder::new()
            .build(&athlete(dec!(30)), &request(16, vec![]))
            .unwrap();
        assert_eq!(plan.week_of(plan.start_date - Days::new(3)), 0);
        assert_eq!(plan.week_of(plan.start_date + Days::new(6)), 0);
        assert_eq!(plan.week_of(plan.start_date + Days::new(7)), 1);
    }
}
