//! Milestone reconciliation
//!
//! When a milestone race result arrives, every phase that has not started yet
//! gets paces adjusted by the damped performance delta, and the goal-race
//! prediction is refreshed by Riegel extrapolation. Phases already entered are
//! left exactly as they were. The input plan is never modified; the caller
//! stores the returned copy only on success.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoachError, Result};
use crate::models::AbilityLevel;
use crate::pace::PaceAdjuster;
use crate::training_plan::{PhaseStatus, TrainingPlan};

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub plan: TrainingPlan,
    /// Signed pace delta (negative: faster than predicted)
    pub delta: Decimal,
    /// Indices of the phases whose paces were rewritten
    pub rewritten_phases: Vec<usize>,
    pub previous_goal_seconds: u32,
    pub predicted_goal_seconds: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MilestoneReconciler {
    adjuster: PaceAdjuster,
}

fn failed(err: CoachError) -> CoachError {
    match err {
        CoachError::ReconciliationFailed(_) => err,
        other => CoachError::ReconciliationFailed(other.to_string()),
    }
}

impl MilestoneReconciler {
    pub fn new(adjuster: PaceAdjuster) -> Self {
        MilestoneReconciler { adjuster }
    }

    pub fn adjuster(&self) -> &PaceAdjuster {
        &self.adjuster
    }

    /// Record `actual_seconds` for milestone `milestone_id` and re-plan pending phases
    pub fn reconcile(
        &self,
        plan: &TrainingPlan,
        ability: AbilityLevel,
        milestone_id: &str,
        actual_seconds: u32,
        recorded_date: NaiveDate,
    ) -> Result<Reconciliation> {
        let index = plan
            .milestone_phase_index(milestone_id)
            .ok_or_else(|| CoachError::not_found("milestone", milestone_id))?;
        let phase = &plan.phases[index];
        let milestone = phase
            .milestone
            .as_ref()
            .ok_or_else(|| CoachError::not_found("milestone", milestone_id))?;

        if milestone.is_recorded() {
            return Err(CoachError::InvalidInput(format!(
                "Milestone {} already has a recorded result",
                milestone_id
            )));
        }
        if actual_seconds == 0 {
            return Err(CoachError::InvalidInput(
                "Milestone time must be positive".to_string(),
            ));
        }
        if phase.status == PhaseStatus::Pending {
            return Err(CoachError::InvalidInput(format!(
                "Phase '{}' has not started; its milestone cannot have been run",
                phase.name
            )));
        }

        let delta = PaceAdjuster::performance_delta(milestone.predicted_seconds, actual_seconds)
            .map_err(failed)?;
        let predicted_goal_seconds = self
            .adjuster
            .predict_finish_seconds(milestone.distance_km, actual_seconds, plan.goal_distance_km)
            .map_err(failed)?;

        let mut updated = plan.clone();
        if let Some(recorded) = updated.phases[index].milestone.as_mut() {
            recorded.actual_seconds = Some(actual_seconds);
            recorded.recorded_date = Some(recorded_date);
        }

        let mut rewritten_phases = Vec::new();
        for phase in updated.phases.iter_mut().skip(index + 1) {
            if phase.status != PhaseStatus::Pending {
                continue;
            }
            phase.paces = self
                .adjuster
                .adjust(&phase.paces, delta, ability)
                .map_err(failed)?
                .rounded();
            rewritten_phases.push(phase.index);
        }

        updated.predicted_finish_seconds = predicted_goal_seconds;
        updated.touch();
        updated.validate().map_err(failed)?;

        tracing::info!(
            plan = %plan.id,
            milestone = milestone_id,
            %delta,
            rewritten = rewritten_phases.len(),
            predicted_goal_seconds,
            "Applied milestone result"
        );

        Ok(Reconciliation {
            plan: updated,
            delta,
            rewritten_phases,
            previous_goal_seconds: plan.predicted_finish_seconds,
            predicted_goal_seconds,
        })
    }
}
