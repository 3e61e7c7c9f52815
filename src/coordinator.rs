//! Planning and injury coordinators
//!
//! Coordinators load state from the stores, run the domain functions on
//! copies and write the results back only when every step succeeded.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::acwr::{AcwrCalculator, AcwrRecord};
use crate::config::EngineConfig;
use crate::error::{CoachError, Result};
use crate::injury::{InjuryRiskMonitor, MitigationDirective, MonitorState, RiskMonitorState};
use crate::models::{InjuryReport, InjurySeverity, WorkoutLog};
use crate::pace::PaceAdjuster;
use crate::reconcile::MilestoneReconciler;
use crate::store::{
    ExerciseCatalog, InjuryStore, PlanStore, ProfileStore, StaticExerciseCatalog, WorkoutLogStore,
};
use crate::training_plan::{MilestoneSpec, PhaseStatus, PlanBuilder, PlanRequest, TrainingPlan};

/// Athlete and date every command executes against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub athlete_id: String,
    pub today: NaiveDate,
}

impl CommandContext {
    pub fn new(athlete_id: impl Into<String>, today: NaiveDate) -> Self {
        CommandContext {
            athlete_id: athlete_id.into(),
            today,
        }
    }
}

/// Store handles shared by both coordinators
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub plans: Arc<dyn PlanStore>,
    pub workouts: Arc<dyn WorkoutLogStore>,
    pub injuries: Arc<dyn InjuryStore>,
    pub catalog: Arc<dyn ExerciseCatalog>,
}

impl Stores {
    /// Use one backend for every store, with the built-in exercise catalog
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ProfileStore + PlanStore + WorkoutLogStore + InjuryStore + 'static,
    {
        Stores {
            profiles: store.clone(),
            plans: store.clone(),
            workouts: store.clone(),
            injuries: store,
            catalog: Arc::new(StaticExerciseCatalog),
        }
    }
}

/// Plan as reported to the athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanView {
    pub current_week: u32,
    /// Weekly targets after mileage holds
    pub effective_weekly_km: Vec<Decimal>,
    pub plan: TrainingPlan,
}

impl PlanView {
    pub fn new(plan: TrainingPlan, today: NaiveDate) -> Self {
        PlanView {
            current_week: plan.week_of(today),
            effective_weekly_km: plan.effective_targets(),
            plan,
        }
    }
}

/// Injury-risk snapshot as reported to the athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskView {
    pub state: MonitorState,
    pub acwr: AcwrRecord,
    pub open_injuries: Vec<InjuryReport>,
    pub recent_directives: Vec<MitigationDirective>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneOutcome {
    pub delta: Decimal,
    pub rewritten_phases: Vec<usize>,
    pub previous_goal_seconds: u32,
    pub predicted_goal_seconds: u32,
    pub plan: PlanView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutOutcome {
    pub workout_id: String,
    pub acwr: AcwrRecord,
    pub state: MonitorState,
    pub directives: Vec<MitigationDirective>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryOutcome {
    pub injury: InjuryReport,
    pub state: MonitorState,
    pub directives: Vec<MitigationDirective>,
}

const RECENT_DIRECTIVES: usize = 5;

/// Owns plan creation and milestone re-planning
pub struct PlanningCoordinator {
    profiles: Arc<dyn ProfileStore>,
    plans: Arc<dyn PlanStore>,
    injuries: Arc<dyn InjuryStore>,
    builder: PlanBuilder,
    reconciler: MilestoneReconciler,
}

impl PlanningCoordinator {
    pub fn new(stores: &Stores, builder: PlanBuilder, reconciler: MilestoneReconciler) -> Self {
        PlanningCoordinator {
            profiles: Arc::clone(&stores.profiles),
            plans: Arc::clone(&stores.plans),
            injuries: Arc::clone(&stores.injuries),
            builder,
            reconciler,
        }
    }

    /// Build and activate a plan, replacing any existing one
    pub fn create_plan(
        &self,
        ctx: &CommandContext,
        goal_distance_km: Decimal,
        duration_weeks: u32,
        milestones: Vec<MilestoneSpec>,
    ) -> Result<PlanView> {
        let profile = self.profiles.get_profile(&ctx.athlete_id)?;
        let request = PlanRequest {
            goal_distance_km,
            duration_weeks,
            milestones,
            start_date: ctx.today,
        };

        let mut plan = self.builder.build(&profile, &request)?;
        plan.activate();
        plan.advance_to(ctx.today);

        // Every open moderate or severe injury holds the new plan, whether or
        // not a plan existed when it was reported
        if let Some(state) = self.injuries.get_state(&ctx.athlete_id)? {
            let week = plan.week_of(ctx.today);
            for injury in blocking_injuries(&state) {
                plan.apply_hold(&injury.id, week)?;
            }
        }

        if let Some(previous) = self.plans.get_plan(&ctx.athlete_id)? {
            tracing::info!(athlete = %ctx.athlete_id, replaced = %previous.id, "Replacing training plan");
        }

        self.plans.put_plan(&ctx.athlete_id, &plan)?;
        Ok(PlanView::new(plan, ctx.today))
    }

    /// Record a milestone result and re-plan the phases that follow it
    pub fn log_milestone_result(
        &self,
        ctx: &CommandContext,
        milestone_id: &str,
        actual_seconds: u32,
    ) -> Result<MilestoneOutcome> {
        let stored = self.active_plan(&ctx.athlete_id)?;
        let profile = self.profiles.get_profile(&ctx.athlete_id)?;

        let mut current = stored.clone();
        current.advance_to(ctx.today);

        let reconciliation = self.reconciler.reconcile(
            &current,
            profile.ability_level,
            milestone_id,
            actual_seconds,
            ctx.today,
        )?;

        let mut plan = reconciliation.plan;
        if let Some(index) = plan.milestone_phase_index(milestone_id) {
            plan.phases[index].advance(PhaseStatus::Completed);
        }
        plan.advance_to(ctx.today);

        self.plans.put_plan(&ctx.athlete_id, &plan)?;
        Ok(MilestoneOutcome {
            delta: reconciliation.delta,
            rewritten_phases: reconciliation.rewritten_phases,
            previous_goal_seconds: reconciliation.previous_goal_seconds,
            predicted_goal_seconds: reconciliation.predicted_goal_seconds,
            plan: PlanView::new(plan, ctx.today),
        })
    }

    /// Current plan as of `ctx.today`, without persisting anything
    pub fn plan_view(&self, ctx: &CommandContext) -> Result<Option<PlanView>> {
        Ok(self.plans.get_plan(&ctx.athlete_id)?.map(|mut plan| {
            plan.advance_to(ctx.today);
            PlanView::new(plan, ctx.today)
        }))
    }

    fn active_plan(&self, athlete_id: &str) -> Result<TrainingPlan> {
        self.plans
            .get_plan(athlete_id)?
            .ok_or_else(|| CoachError::not_found("plan", athlete_id))
    }
}

/// Owns workout scoring and injury handling
pub struct InjuryCoordinator {
    profiles: Arc<dyn ProfileStore>,
    plans: Arc<dyn PlanStore>,
    workouts: Arc<dyn WorkoutLogStore>,
    injuries: Arc<dyn InjuryStore>,
    catalog: Arc<dyn ExerciseCatalog>,
    monitor: InjuryRiskMonitor,
}

impl InjuryCoordinator {
    pub fn new(stores: &Stores, monitor: InjuryRiskMonitor) -> Self {
        InjuryCoordinator {
            profiles: Arc::clone(&stores.profiles),
            plans: Arc::clone(&stores.plans),
            workouts: Arc::clone(&stores.workouts),
            injuries: Arc::clone(&stores.injuries),
            catalog: Arc::clone(&stores.catalog),
            monitor,
        }
    }

    fn load_state(&self, athlete_id: &str) -> Result<RiskMonitorState> {
        Ok(self
            .injuries
            .get_state(athlete_id)?
            .unwrap_or_else(|| RiskMonitorState::new(athlete_id)))
    }

    /// Persist the monitor state, then the plan. A failed plan write puts the
    /// previous state back so no hold outlives its injury record.
    fn commit(
        &self,
        ctx: &CommandContext,
        previous: &RiskMonitorState,
        state: &RiskMonitorState,
        plan: Option<&TrainingPlan>,
    ) -> Result<()> {
        self.injuries.put_state(state)?;
        let Some(plan) = plan else {
            return Ok(());
        };
        if let Err(err) = self.plans.put_plan(&ctx.athlete_id, plan) {
            tracing::error!(athlete = %ctx.athlete_id, error = %err, "Plan write failed, restoring monitor state");
            if let Err(restore) = self.injuries.put_state(previous) {
                tracing::error!(athlete = %ctx.athlete_id, error = %restore, "Monitor state restore failed");
            }
            return Err(err);
        }
        Ok(())
    }

    fn history(&self, ctx: &CommandContext) -> Result<Vec<WorkoutLog>> {
        let start = self.monitor.calculator().window_start(ctx.today);
        self.workouts.query(&ctx.athlete_id, start, ctx.today)
    }

    /// Score and store a new workout
    pub fn log_workout(&self, ctx: &CommandContext, log: WorkoutLog) -> Result<WorkoutOutcome> {
        let profile = self.profiles.get_profile(&ctx.athlete_id)?;
        let state = self.load_state(&ctx.athlete_id)?;
        let history = self.history(ctx)?;

        let assessment = self.monitor.record_workout(
            &state,
            &log,
            &history,
            profile.ability_level,
            ctx.today,
        )?;

        self.workouts.append(&ctx.athlete_id, &log)?;
        self.injuries.put_state(&assessment.state)?;

        Ok(WorkoutOutcome {
            workout_id: log.id,
            acwr: assessment.record,
            state: assessment.state.state,
            directives: assessment.directives,
        })
    }

    pub fn report_injury(
        &self,
        ctx: &CommandContext,
        location: &str,
        severity: InjurySeverity,
    ) -> Result<InjuryOutcome> {
        let state = self.load_state(&ctx.athlete_id)?;
        let mut plan = self.plans.get_plan(&ctx.athlete_id)?;
        let protocol = self.catalog.protocol(location);

        let update = self.monitor.report_injury(
            &state,
            location,
            severity,
            protocol,
            ctx.today,
            plan.as_mut(),
        )?;

        let changed_plan = plan.as_ref().filter(|_| severity.requires_mitigation());
        self.commit(ctx, &state, &update.state, changed_plan)?;

        Ok(InjuryOutcome {
            injury: update.report,
            state: update.state.state,
            directives: update.directives,
        })
    }

    pub fn mark_resolving(&self, ctx: &CommandContext, injury_id: &str) -> Result<InjuryOutcome> {
        let state = self.load_state(&ctx.athlete_id)?;
        let update = self.monitor.mark_resolving(&state, injury_id)?;
        self.injuries.put_state(&update.state)?;

        Ok(InjuryOutcome {
            injury: update.report,
            state: update.state.state,
            directives: update.directives,
        })
    }

    pub fn resolve_injury(&self, ctx: &CommandContext, injury_id: &str) -> Result<InjuryOutcome> {
        let state = self.load_state(&ctx.athlete_id)?;
        let mut plan = self.plans.get_plan(&ctx.athlete_id)?;
        let holds_before = plan.as_ref().map(|p| p.mileage_holds.len());

        let update = self
            .monitor
            .resolve_injury(&state, injury_id, ctx.today, plan.as_mut())?;

        // Also drop holds left behind by injuries that are no longer open
        if let Some(plan) = plan.as_mut() {
            let open: Vec<&str> = blocking_injuries(&update.state).map(|i| i.id.as_str()).collect();
            let stale: Vec<String> = plan
                .mileage_holds
                .iter()
                .filter(|h| !open.contains(&h.injury_id.as_str()))
                .map(|h| h.injury_id.clone())
                .collect();
            for id in stale {
                plan.lift_hold(&id);
            }
        }

        let changed_plan = plan
            .as_ref()
            .filter(|p| holds_before != Some(p.mileage_holds.len()));
        self.commit(ctx, &state, &update.state, changed_plan)?;

        Ok(InjuryOutcome {
            injury: update.report,
            state: update.state.state,
            directives: update.directives,
        })
    }

    /// Current risk picture, computed without persisting anything
    pub fn risk_view(&self, ctx: &CommandContext) -> Result<RiskView> {
        let profile = self.profiles.get_profile(&ctx.athlete_id)?;
        let state = self.load_state(&ctx.athlete_id)?;
        let history = self.history(ctx)?;
        let acwr = self.monitor.assess(&history, ctx.today, profile.ability_level);

        let skip = state.directives.len().saturating_sub(RECENT_DIRECTIVES);
        Ok(RiskView {
            state: state.state,
            acwr,
            open_injuries: state.open_injuries().cloned().collect(),
            recent_directives: state.directives[skip..].to_vec(),
        })
    }
}

fn blocking_injuries(state: &RiskMonitorState) -> impl Iterator<Item = &InjuryReport> {
    state
        .open_injuries()
        .filter(|injury| injury.severity.requires_mitigation())
}

/// Construct both coordinators from engine configuration
pub fn build_coordinators(config: &EngineConfig, stores: &Stores) -> (PlanningCoordinator, InjuryCoordinator) {
    let planning = PlanningCoordinator::new(
        stores,
        PlanBuilder::with_config(config.plan.clone()),
        MilestoneReconciler::new(PaceAdjuster::with_config(config.pace.clone())),
    );
    let injury = InjuryCoordinator::new(
        stores,
        InjuryRiskMonitor::new(
            AcwrCalculator::with_config(config.acwr.clone()),
            config.monitor.clone(),
        ),
    );
    (planning, injury)
}
