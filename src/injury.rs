//! Injury risk monitoring
//!
//! The monitor scores every new workout against the trailing ACWR window,
//! walks a per-athlete state machine and emits graduated mitigation
//! directives. Injury reports force mitigation and, for moderate or severe
//! injuries, hold weekly mileage on the active plan until resolved.
//!
//! All methods take the current state by reference and return an updated
//! copy, so the caller decides when (and whether) to persist it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::acwr::{AcwrCalculator, AcwrRecord, RiskBand};
use crate::error::{CoachError, Result};
use crate::models::{
    AbilityLevel, Exercise, InjuryReport, InjurySeverity, InjuryStatus, RehabProtocol, WorkoutLog,
};
use crate::training_plan::TrainingPlan;

/// Monitor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    Monitoring,
    Warning,
    Mitigating,
    Resolved,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Monitoring => write!(f, "monitoring"),
            MonitorState::Warning => write!(f, "warning"),
            MonitorState::Mitigating => write!(f, "mitigating"),
            MonitorState::Resolved => write!(f, "resolved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DirectiveKind {
    ReduceLoad { percent: u8 },
    FreezeProgression { week: u32, capped_km: Decimal },
    CorrectiveExercises {
        location: String,
        exercises: Vec<Exercise>,
        training_modifications: Vec<String>,
        return_to_running_criteria: Vec<String>,
    },
    ResumeProgression,
    IncreaseLoad,
}

/// Guidance emitted by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationDirective {
    pub kind: DirectiveKind,
    pub issued: NaiveDate,
    pub reason: String,
}

impl MitigationDirective {
    fn new(kind: DirectiveKind, issued: NaiveDate, reason: impl Into<String>) -> Self {
        MitigationDirective {
            kind,
            issued,
            reason: reason.into(),
        }
    }
}

/// Persisted per-athlete monitor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMonitorState {
    pub athlete_id: String,
    pub state: MonitorState,
    pub last_band: Option<RiskBand>,
    pub last_record: Option<AcwrRecord>,
    pub injuries: Vec<InjuryReport>,
    pub directives: Vec<MitigationDirective>,
    pub updated_at: DateTime<Utc>,
}

impl RiskMonitorState {
    pub fn new(athlete_id: impl Into<String>) -> Self {
        RiskMonitorState {
            athlete_id: athlete_id.into(),
            state: MonitorState::Monitoring,
            last_band: None,
            last_record: None,
            injuries: Vec::new(),
            directives: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn find_injury(&self, injury_id: &str) -> Option<&InjuryReport> {
        self.injuries.iter().find(|i| i.id == injury_id)
    }

    pub fn open_injuries(&self) -> impl Iterator<Item = &InjuryReport> {
        self.injuries.iter().filter(|i| i.is_open())
    }

    /// True while a moderate or severe injury is unresolved
    pub fn has_blocking_injury(&self) -> bool {
        self.open_injuries().any(|i| i.severity.requires_mitigation())
    }
}

/// Monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Load reduction advised on escalation (default: 20%)
    pub reduce_load_percent: u8,

    /// Oldest directives beyond this count are dropped from the state
    pub directive_history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            reduce_load_percent: 20,
            directive_history_limit: 200,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reduce_load_percent == 0 || self.reduce_load_percent > 100 {
            return Err(CoachError::Configuration(format!(
                "reduce_load_percent must be in 1..=100: {}",
                self.reduce_load_percent
            )));
        }
        if self.directive_history_limit == 0 {
            return Err(CoachError::Configuration(
                "directive_history_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of observing a workout
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutAssessment {
    pub state: RiskMonitorState,
    pub record: AcwrRecord,
    pub directives: Vec<MitigationDirective>,
}

/// Result of an injury report or resolution
#[derive(Debug, Clone, PartialEq)]
pub struct InjuryUpdate {
    pub state: RiskMonitorState,
    pub report: InjuryReport,
    pub directives: Vec<MitigationDirective>,
}

#[derive(Debug, Clone, Default)]
pub struct InjuryRiskMonitor {
    calculator: AcwrCalculator,
    config: MonitorConfig,
}

impl InjuryRiskMonitor {
    pub fn new(calculator: AcwrCalculator, config: MonitorConfig) -> Self {
        InjuryRiskMonitor { calculator, config }
    }

    pub fn calculator(&self) -> &AcwrCalculator {
        &self.calculator
    }

    /// Current ACWR without touching state
    pub fn assess(&self, history: &[WorkoutLog], today: NaiveDate, ability: AbilityLevel) -> AcwrRecord {
        self.calculator.calculate(history, today, ability)
    }

    /// Score a new workout against `history` (which must not yet contain it)
    pub fn record_workout(
        &self,
        current: &RiskMonitorState,
        log: &WorkoutLog,
        history: &[WorkoutLog],
        ability: AbilityLevel,
        today: NaiveDate,
    ) -> Result<WorkoutAssessment> {
        log.validate(today)?;

        let mut logs = Vec::with_capacity(history.len() + 1);
        logs.extend_from_slice(history);
        logs.push(log.clone());
        let record = self.calculator.calculate(&logs, today, ability);
        let band = record.band;

        let mut state = current.clone();
        let mut directives = Vec::new();

        let escalated = band.escalates_from(current.last_band);
        if escalated {
            let ratio = record
                .ratio
                .map(|r| r.round_dp(2).to_string())
                .unwrap_or_else(|| "n/a".to_string());
            directives.push(MitigationDirective::new(
                DirectiveKind::ReduceLoad {
                    percent: self.config.reduce_load_percent,
                },
                today,
                format!("ACWR {} is in the {} band: {}", ratio, band, band.recommendation()),
            ));
            tracing::warn!(athlete = %current.athlete_id, %band, %ratio, "Load risk escalated");
        }

        if band == RiskBand::Undertraining && current.last_band != Some(RiskBand::Undertraining) {
            directives.push(MitigationDirective::new(
                DirectiveKind::IncreaseLoad,
                today,
                band.recommendation(),
            ));
        }

        state.state = match current.state {
            MonitorState::Mitigating => MonitorState::Mitigating,
            _ if escalated => MonitorState::Warning,
            MonitorState::Warning
                if matches!(band, RiskBand::Optimal | RiskBand::Undertraining) =>
            {
                MonitorState::Monitoring
            }
            MonitorState::Resolved => MonitorState::Monitoring,
            other => other,
        };
        if state.state != current.state {
            tracing::info!(
                athlete = %current.athlete_id,
                from = %current.state,
                to = %state.state,
                "Monitor state changed"
            );
        }

        state.last_band = Some(band);
        state.last_record = Some(record.clone());
        self.push_directives(&mut state, &directives);

        Ok(WorkoutAssessment {
            state,
            record,
            directives,
        })
    }

    /// File an injury report; moderate and severe injuries hold mileage on `plan`
    pub fn report_injury(
        &self,
        current: &RiskMonitorState,
        location: &str,
        severity: InjurySeverity,
        protocol: Option<RehabProtocol>,
        today: NaiveDate,
        plan: Option<&mut TrainingPlan>,
    ) -> Result<InjuryUpdate> {
        let location = location.trim();
        if location.is_empty() {
            return Err(CoachError::InvalidInput(
                "Injury location must not be empty".to_string(),
            ));
        }

        let mut report = InjuryReport {
            id: uuid::Uuid::new_v4().to_string(),
            location: location.to_string(),
            severity,
            reported_date: today,
            status: InjuryStatus::Active,
            resolved_date: None,
            mitigation: Vec::new(),
        };
        let mut state = current.clone();
        let mut directives = Vec::new();

        if severity.requires_mitigation() {
            state.state = MonitorState::Mitigating;

            match plan {
                Some(plan) => {
                    let week = plan.week_of(today);
                    plan.apply_hold(&report.id, week)?;
                    let capped_km = plan
                        .mileage_holds
                        .iter()
                        .find(|h| h.injury_id == report.id)
                        .map(|h| h.capped_km)
                        .unwrap_or(Decimal::ZERO);
                    report.mitigation.push(format!(
                        "Weekly mileage held at {} km from week {} until resolved",
                        capped_km, week
                    ));
                    directives.push(MitigationDirective::new(
                        DirectiveKind::FreezeProgression { week, capped_km },
                        today,
                        format!("{} {} injury", severity, location),
                    ));
                }
                None => report
                    .mitigation
                    .push("No active plan; avoid increasing weekly mileage until resolved".to_string()),
            }
            tracing::warn!(
                athlete = %current.athlete_id,
                injury = %report.id,
                %severity,
                location,
                "Injury reported, progression frozen"
            );
        } else {
            report
                .mitigation
                .push("Monitor symptoms; reduce intensity if pain persists".to_string());
            tracing::info!(athlete = %current.athlete_id, injury = %report.id, location, "Mild injury reported");
        }

        match protocol {
            Some(protocol) => {
                report.mitigation.push(format!(
                    "{} corrective exercises assigned for {}",
                    protocol.exercises.len(),
                    protocol.injury_name
                ));
                report
                    .mitigation
                    .extend(protocol.training_modifications.iter().cloned());
                directives.push(MitigationDirective::new(
                    DirectiveKind::CorrectiveExercises {
                        location: location.to_string(),
                        exercises: protocol.exercises,
                        training_modifications: protocol.training_modifications,
                        return_to_running_criteria: protocol.return_to_running_criteria,
                    },
                    today,
                    format!("Rehab for {}", location),
                ));
            }
            None => report
                .mitigation
                .push(format!("No corrective exercises on file for {}", location)),
        }

        state.injuries.push(report.clone());
        self.push_directives(&mut state, &directives);

        Ok(InjuryUpdate {
            state,
            report,
            directives,
        })
    }

    /// Mark an injury as improving; it stays open until resolved
    pub fn mark_resolving(&self, current: &RiskMonitorState, injury_id: &str) -> Result<InjuryUpdate> {
        let mut state = current.clone();
        let report = Self::open_injury_mut(&mut state, injury_id)?;
        report.status = InjuryStatus::Resolving;
        let report = report.clone();
        state.updated_at = Utc::now();

        Ok(InjuryUpdate {
            state,
            report,
            directives: Vec::new(),
        })
    }

    /// Resolve an injury, lifting its mileage hold from `plan`
    pub fn resolve_injury(
        &self,
        current: &RiskMonitorState,
        injury_id: &str,
        today: NaiveDate,
        plan: Option<&mut TrainingPlan>,
    ) -> Result<InjuryUpdate> {
        let mut state = current.clone();
        let report = Self::open_injury_mut(&mut state, injury_id)?;
        report.status = InjuryStatus::Resolved;
        report.resolved_date = Some(today);
        let report = report.clone();

        if let Some(plan) = plan {
            plan.lift_hold(injury_id);
        }

        let mut directives = Vec::new();
        if state.state == MonitorState::Mitigating && !state.has_blocking_injury() {
            state.state = MonitorState::Resolved;
            directives.push(MitigationDirective::new(
                DirectiveKind::ResumeProgression,
                today,
                format!("{} injury resolved", report.location),
            ));
            tracing::info!(athlete = %state.athlete_id, injury = injury_id, "Progression resumed");
        }

        self.push_directives(&mut state, &directives);
        Ok(InjuryUpdate {
            state,
            report,
            directives,
        })
    }

    fn open_injury_mut<'a>(state: &'a mut RiskMonitorState, injury_id: &str) -> Result<&'a mut InjuryReport> {
        let report = state
            .injuries
            .iter_mut()
            .find(|i| i.id == injury_id)
            .ok_or_else(|| CoachError::not_found("injury", injury_id))?;
        if report.status == InjuryStatus::Resolved {
            return Err(CoachError::InvalidInput(format!(
                "Injury {} is already resolved",
                injury_id
            )));
        }
        Ok(report)
    }

    fn push_directives(&self, state: &mut RiskMonitorState, directives: &[MitigationDirective]) {
        state.directives.extend_from_slice(directives);
        let limit = self.config.directive_history_limit;
        if state.directives.len() > limit {
            let excess = state.directives.len() - limit;
            state.directives.drain(..excess);
        }
        state.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AthleteProfile;
    use crate::training_plan::{PlanBuilder, PlanRequest};
    use chrono::Days;
    use rust_decimal_macros::dec;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + Days::new(n)
    }

    fn run(n: u64, km: Decimal) -> WorkoutLog {
        WorkoutLog::new(day(n), km, km * dec!(6), dec!(4))
    }

    /// 21 easy days then 6 harder days; the 28th day is the new workout
    fn spike_history() -> (Vec<WorkoutLog>, WorkoutLog) {
        let mut history: Vec<_> = (0..21).map(|d| run(d, dec!(5))).collect();
        history.extend((21..27).map(|d| run(d, dec!(10))));
        (history, run(27, dec!(10)))
    }

    fn plan() -> TrainingPlan {
        let profile = AthleteProfile::new("runner-1", "Test Runner", AbilityLevel::Intermediate, dec!(300), dec!(30));
        let request = PlanRequest {
            goal_distance_km: dec!(42.195),
            duration_weeks: 16,
            milestones: vec![],
            start_date: day(0),
        };
        PlanBuilder::new().build(&profile, &request).unwrap()
    }

    fn protocol() -> Option<RehabProtocol> {
        Some(RehabProtocol {
            injury_name: "IT Band Syndrome".to_string(),
            exercises: vec![Exercise {
                name: "Clamshells".to_string(),
                sets: 3,
                reps: "15 each side".to_string(),
                purpose: "Hip abductor strength".to_string(),
            }],
            training_modifications: vec!["Avoid hills".to_string()],
            return_to_running_criteria: vec!["Pain-free walking for 3 days".to_string()],
        })
    }

    #[test]
    fn test_spike_escalates_to_warning() {
        let monitor = InjuryRiskMonitor::default();
        let (history, log) = spike_history();
        let state = RiskMonitorState::new("runner-1");

        let result = monitor
            .record_workout(&state, &log, &history, AbilityLevel::Intermediate, day(27))
            .unwrap();

        assert_eq!(result.record.ratio, Some(dec!(1.6)));
        assert_eq!(result.record.band, RiskBand::High);
        assert_eq!(result.state.state, MonitorState::Warning);
        assert_eq!(
            result.directives[0].kind,
            DirectiveKind::ReduceLoad { percent: 20 }
        );

        // Staying in the same band does not repeat the directive
        let mut history = history;
        history.push(log);
        let again = monitor
            .record_workout(&result.state, &run(27, dec!(1)), &history, AbilityLevel::Intermediate, day(27))
            .unwrap();
        assert_eq!(again.record.band, RiskBand::High);
        assert!(again.directives.is_empty());
        assert_eq!(again.state.state, MonitorState::Warning);
    }

    #[test]
    fn test_warning_returns_to_monitoring() {
        let monitor = InjuryRiskMonitor::default();
        let history: Vec<_> = (0..27).map(|d| run(d, dec!(5))).collect();
        let mut state = RiskMonitorState::new("runner-1");
        state.state = MonitorState::Warning;
        state.last_band = Some(RiskBand::High);

        let result = monitor
            .record_workout(&state, &run(27, dec!(5)), &history, AbilityLevel::Intermediate, day(27))
            .unwrap();

        assert_eq!(result.record.band, RiskBand::Optimal);
        assert_eq!(result.state.state, MonitorState::Monitoring);
        assert!(result.directives.is_empty());
    }

    #[test]
    fn test_undertraining_advice_once() {
        let monitor = InjuryRiskMonitor::default();
        let mut history: Vec<_> = (0..21).map(|d| run(d, dec!(10))).collect();
        history.extend((21..27).map(|d| run(d, dec!(2))));
        let state = RiskMonitorState::new("runner-1");

        let first = monitor
            .record_workout(&state, &run(27, dec!(2)), &history, AbilityLevel::Intermediate, day(27))
            .unwrap();
        assert_eq!(first.record.band, RiskBand::Undertraining);
        assert_eq!(first.directives.len(), 1);
        assert_eq!(first.directives[0].kind, DirectiveKind::IncreaseLoad);

        let second = monitor
            .record_workout(&first.state, &run(27, dec!(1)), &history, AbilityLevel::Intermediate, day(27))
            .unwrap();
        assert!(second.directives.is_empty());
    }

    #[test]
    fn test_invalid_workouts_rejected() {
        let monitor = InjuryRiskMonitor::default();
        let state = RiskMonitorState::new("runner-1");

        let future = run(10, dec!(5));
        let err = monitor
            .record_workout(&state, &future, &[], AbilityLevel::Intermediate, day(9))
            .unwrap_err();
        assert!(matches!(err, CoachError::InvalidInput(_)));

        let mut hard = run(1, dec!(5));
        hard.effort = dec!(11);
        assert!(monitor
            .record_workout(&state, &hard, &[], AbilityLevel::Intermediate, day(9))
            .is_err());
    }

    #[test]
    fn test_severe_injury_holds_mileage_until_resolved() {
        let monitor = InjuryRiskMonitor::default();
        let state = RiskMonitorState::new("runner-1");
        let mut plan = plan();
        let planned = plan.planned_targets();
        let today = day(7 * 4 + 2);

        let update = monitor
            .report_injury(&state, "it_band", InjurySeverity::Severe, protocol(), today, Some(&mut plan))
            .unwrap();

        assert_eq!(update.state.state, MonitorState::Mitigating);
        assert!(update.state.has_blocking_injury());
        assert!(matches!(
            update.directives[0].kind,
            DirectiveKind::FreezeProgression { week: 4, .. }
        ));
        assert!(matches!(update.directives[1].kind, DirectiveKind::CorrectiveExercises { .. }));
        let effective = plan.effective_targets();
        assert!(effective[5..].iter().all(|km| *km <= planned[4]));

        // Band changes do not leave mitigation
        let history: Vec<_> = (0..29).map(|d| run(d, dec!(5))).collect();
        let after_run = monitor
            .record_workout(&update.state, &run(30, dec!(5)), &history, AbilityLevel::Intermediate, today)
            .unwrap();
        assert_eq!(after_run.state.state, MonitorState::Mitigating);

        let resolved = monitor
            .resolve_injury(&after_run.state, &update.report.id, day(45), Some(&mut plan))
            .unwrap();
        assert_eq!(resolved.state.state, MonitorState::Resolved);
        assert_eq!(resolved.directives[0].kind, DirectiveKind::ResumeProgression);
        assert_eq!(resolved.report.resolved_date, Some(day(45)));
        assert_eq!(plan.effective_targets(), planned);

        // Next workout returns to monitoring
        let next = monitor
            .record_workout(&resolved.state, &run(45, dec!(5)), &history, AbilityLevel::Intermediate, day(45))
            .unwrap();
        assert_ne!(next.state.state, MonitorState::Resolved);
    }

    #[test]
    fn test_mild_injury_only_attaches_exercises() {
        let monitor = InjuryRiskMonitor::default();
        let state = RiskMonitorState::new("runner-1");
        let mut plan = plan();

        let update = monitor
            .report_injury(&state, "plantar_fasciitis", InjurySeverity::Mild, protocol(), day(3), Some(&mut plan))
            .unwrap();

        assert_eq!(update.state.state, MonitorState::Monitoring);
        assert!(!plan.is_held());
        assert_eq!(update.directives.len(), 1);
        assert!(update.report.mitigation.iter().any(|m| m.contains("Monitor symptoms")));
        assert!(update.report.mitigation.iter().any(|m| m == "Avoid hills"));
        match &update.directives[0].kind {
            DirectiveKind::CorrectiveExercises {
                exercises,
                training_modifications,
                return_to_running_criteria,
                ..
            } => {
                assert_eq!(exercises.len(), 1);
                assert_eq!(training_modifications, &vec!["Avoid hills".to_string()]);
                assert_eq!(return_to_running_criteria.len(), 1);
            }
            other => panic!("unexpected directive {:?}", other),
        }
    }

    #[test]
    fn test_resolution_errors() {
        let monitor = InjuryRiskMonitor::default();
        let state = RiskMonitorState::new("runner-1");

        let err = monitor.resolve_injury(&state, "nope", day(1), None).unwrap_err();
        assert!(matches!(err, CoachError::NotFound { .. }));

        let update = monitor
            .report_injury(&state, "achilles", InjurySeverity::Moderate, None, day(1), None)
            .unwrap();
        let id = update.report.id.clone();

        let resolving = monitor.mark_resolving(&update.state, &id).unwrap();
        assert_eq!(resolving.report.status, InjuryStatus::Resolving);
        assert_eq!(resolving.state.state, MonitorState::Mitigating);

        let resolved = monitor.resolve_injury(&resolving.state, &id, day(20), None).unwrap();
        let err = monitor.resolve_injury(&resolved.state, &id, day(21), None).unwrap_err();
        assert!(matches!(err, CoachError::InvalidInput(_)));
        assert!(monitor.mark_resolving(&resolved.state, &id).is_err());
    }

    #[test]
    fn test_second_blocking_injury_keeps_mitigating() {
        let monitor = InjuryRiskMonitor::default();
        let state = RiskMonitorState::new("runner-1");

        let first = monitor
            .report_injury(&state, "achilles", InjurySeverity::Moderate, None, day(1), None)
            .unwrap();
        let second = monitor
            .report_injury(&first.state, "shin_splints", InjurySeverity::Severe, None, day(2), None)
            .unwrap();

        let resolved = monitor
            .resolve_injury(&second.state, &first.report.id, day(10), None)
            .unwrap();
        assert_eq!(resolved.state.state, MonitorState::Mitigating);
        assert!(resolved.directives.is_empty());
    }

    #[test]
    fn test_directive_history_is_bounded() {
        let monitor = InjuryRiskMonitor::new(
            AcwrCalculator::new(),
            MonitorConfig {
                directive_history_limit: 2,
                ..MonitorConfig::default()
            },
        );
        let mut state = RiskMonitorState::new("runner-1");
        for n in 0..3 {
            state = monitor
                .report_injury(&state, "knee", InjurySeverity::Mild, protocol(), day(n), None)
                .unwrap()
                .state;
        }
        assert_eq!(state.directives.len(), 2);
        assert_eq!(state.directives[0].issued, day(1));
    }
}
