use chrono::{Days, NaiveDate};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;

use coachrs::config::EngineConfig;
use coachrs::coordinator::{CommandContext, Stores};
use coachrs::dispatcher::{Command, Dispatcher, Response};
use coachrs::injury::{DirectiveKind, MonitorState};
use coachrs::store::{InMemoryStore, PlanStore, ProfileStore, WorkoutLogStore};
use coachrs::training_plan::{MilestoneSpec, PhaseStatus, TrainingPlan};
use coachrs::{AbilityLevel, AthleteProfile, CoachError, InjurySeverity, RiskBand, SqliteStore, WorkoutLog};

/// End-to-end athlete scenarios driven through the dispatcher

const ATHLETE: &str = "runner-1";

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
}

fn day(offset: u64) -> CommandContext {
    CommandContext::new(ATHLETE, start() + Days::new(offset))
}

fn profile() -> AthleteProfile {
    AthleteProfile::new(ATHLETE, "Test Runner", AbilityLevel::Intermediate, dec!(300), dec!(30))
}

fn engine() -> (Dispatcher, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store.put_profile(&profile()).unwrap();
    let dispatcher = Dispatcher::from_config(&EngineConfig::default(), &Stores::shared(Arc::clone(&store)));
    (dispatcher, store)
}

fn create_marathon_plan(dispatcher: &Dispatcher) -> TrainingPlan {
    let command = Command::CreatePlan {
        goal_distance_km: dec!(42.2),
        duration_weeks: 26,
        milestones: vec![MilestoneSpec {
            week: 12,
            distance_km: dec!(29),
            predicted_time: 9000,
        }],
    };
    match dispatcher.dispatch(&day(0), command).unwrap() {
        Response::PlanCreated { plan } => plan.plan,
        other => panic!("unexpected response: {:?}", other),
    }
}

fn milestone_id(plan: &TrainingPlan) -> String {
    plan.phases[0].milestone.as_ref().unwrap().id.clone()
}

#[test]
fn test_marathon_plan_splits_at_milestone() {
    let (dispatcher, _) = engine();
    let plan = create_marathon_plan(&dispatcher);

    assert_eq!(plan.phases.len(), 2);
    assert_eq!((plan.phases[0].start_week, plan.phases[0].end_week), (0, 12));
    assert_eq!((plan.phases[1].start_week, plan.phases[1].end_week), (12, 26));
    assert_eq!(plan.phases[0].milestone.as_ref().unwrap().predicted_seconds, 9000);
    assert_eq!(plan.phases[0].status, PhaseStatus::InProgress);
    assert_eq!(plan.phases[1].status, PhaseStatus::Pending);
}

#[test]
fn test_faster_milestone_speeds_up_next_phase() {
    let (dispatcher, store) = engine();
    let plan = create_marathon_plan(&dispatcher);
    let before = plan.phases[1].paces.clone();

    let raw = format!(
        r#"{{"kind":"LogMilestoneResult","milestone_id":"{}","actual_time":"2:24:00"}}"#,
        milestone_id(&plan)
    );
    let outcome = match dispatcher.dispatch_raw(&day(83), &raw).unwrap() {
        Response::MilestoneRecorded { outcome } => outcome,
        other => panic!("unexpected response: {:?}", other),
    };

    assert_eq!(outcome.delta, dec!(-0.04));
    assert_eq!(outcome.rewritten_phases, vec![1]);
    assert!(outcome.predicted_goal_seconds < outcome.previous_goal_seconds);

    let stored = store.get_plan(ATHLETE).unwrap().unwrap();
    let after = &stored.phases[1].paces;
    assert!(after.easy < before.easy);
    assert!(after.long_run < before.long_run);
    assert!(after.race < before.race);
    assert!(after.tempo < before.tempo);
    assert!(after.interval < before.interval);
    assert_eq!(stored.phases[0].paces, plan.phases[0].paces);
    assert_eq!(stored.phases[0].status, PhaseStatus::Completed);

    // A second result for the same milestone is rejected and changes nothing
    let err = dispatcher.dispatch_raw(&day(84), &raw).unwrap_err();
    assert!(matches!(err, CoachError::InvalidInput(_)));
    assert_eq!(store.get_plan(ATHLETE).unwrap().unwrap(), stored);
}

#[test]
fn test_load_spike_week_triggers_reduce_load_once() {
    let (dispatcher, store) = engine();

    // Four steady weeks of imported history: 5 km at effort 4 every day
    for offset in 0..28 {
        store
            .append(ATHLETE, &WorkoutLog::new(day(offset).today, dec!(5), dec!(30), dec!(4)))
            .unwrap();
    }

    // Then seven consecutive days at four times the daily load
    let mut outcomes = Vec::new();
    for offset in 28..35 {
        let ctx = day(offset);
        let command = Command::LogWorkout {
            date: ctx.today,
            distance_km: dec!(10),
            duration_minutes: dec!(55),
            effort: dec!(8),
            notes: None,
        };
        match dispatcher.dispatch(&ctx, command).unwrap() {
            Response::WorkoutLogged { outcome } => outcomes.push(outcome),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    // Day one: acute 200 against chronic 155 is still optimal
    assert_eq!(outcomes[0].acwr.band, RiskBand::Optimal);
    assert_eq!(outcomes[0].state, MonitorState::Monitoring);
    assert!(outcomes[0].directives.is_empty());

    // Day two: acute 260 against chronic 170 crosses into the high band
    assert_eq!(outcomes[1].acwr.band, RiskBand::High);
    assert_eq!(outcomes[1].state, MonitorState::Warning);
    assert_eq!(outcomes[1].directives.len(), 1);
    assert!(matches!(
        outcomes[1].directives[0].kind,
        DirectiveKind::ReduceLoad { percent } if percent >= 20
    ));

    // Staying in the band does not repeat the directive
    for outcome in &outcomes[2..] {
        assert_eq!(outcome.acwr.band, RiskBand::High);
        assert_eq!(outcome.state, MonitorState::Warning);
        assert!(outcome.directives.is_empty());
    }

    let last = &outcomes[6].acwr;
    assert_eq!(last.acute_load, dec!(560));
    assert_eq!(last.chronic_load, dec!(245));
    assert_eq!(last.entries_considered, 28);

    let status = match dispatcher.dispatch(&day(34), Command::GetStatus {}).unwrap() {
        Response::Status { risk, .. } => risk,
        other => panic!("unexpected response: {:?}", other),
    };
    assert_eq!(status.state, MonitorState::Warning);
    let reductions = status
        .recent_directives
        .iter()
        .filter(|d| matches!(d.kind, DirectiveKind::ReduceLoad { .. }))
        .count();
    assert_eq!(reductions, 1);
    assert_eq!(store.query(ATHLETE, day(28).today, day(34).today).unwrap().len(), 7);
}

#[test]
fn test_severe_injury_freezes_mileage_until_resolved() {
    let (dispatcher, store) = engine();
    let plan = create_marathon_plan(&dispatcher);
    let planned = plan.planned_targets();

    let report = match dispatcher
        .dispatch_raw(&day(14), r#"{"kind":"ReportInjury","location":"shin","severity":"severe"}"#)
        .unwrap()
    {
        Response::InjuryReported { outcome } => outcome,
        other => panic!("unexpected response: {:?}", other),
    };
    assert_eq!(report.injury.severity, InjurySeverity::Severe);
    assert_eq!(report.state, MonitorState::Mitigating);

    let capped = report
        .directives
        .iter()
        .find_map(|d| match &d.kind {
            DirectiveKind::FreezeProgression { week, capped_km } => Some((*week, *capped_km)),
            _ => None,
        })
        .expect("freeze directive");
    assert_eq!(capped.0, 2);
    assert_eq!(capped.1, planned[2]);
    assert!(report
        .directives
        .iter()
        .any(|d| matches!(d.kind, DirectiveKind::CorrectiveExercises { .. })));

    let held = store.get_plan(ATHLETE).unwrap().unwrap();
    for (week, km) in held.effective_targets().iter().enumerate().skip(2) {
        assert!(*km <= capped.1, "week {} exceeds the hold", week);
    }

    let resolved = match dispatcher
        .dispatch(&day(35), Command::ResolveInjury { injury_id: report.injury.id.clone() })
        .unwrap()
    {
        Response::InjuryUpdated { outcome } => outcome,
        other => panic!("unexpected response: {:?}", other),
    };
    assert_eq!(resolved.state, MonitorState::Resolved);
    assert!(resolved
        .directives
        .iter()
        .any(|d| matches!(d.kind, DirectiveKind::ResumeProgression)));

    let released = store.get_plan(ATHLETE).unwrap().unwrap();
    assert_eq!(released.effective_targets(), planned);
}

#[test]
fn test_status_is_read_only() {
    let (dispatcher, store) = engine();
    create_marathon_plan(&dispatcher);
    let stored = store.get_plan(ATHLETE).unwrap().unwrap();

    let first = dispatcher.dispatch(&day(20), Command::GetStatus {}).unwrap();
    let second = dispatcher.dispatch(&day(20), Command::GetStatus {}).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.get_plan(ATHLETE).unwrap().unwrap(), stored);

    match first {
        Response::Status { plan, risk } => {
            assert_eq!(plan.unwrap().current_week, 2);
            assert_eq!(risk.state, MonitorState::Monitoring);
            assert!(risk.open_injuries.is_empty());
        }
        other => panic!("unexpected response: {:?}", other),
    }
}

#[test]
fn test_unknown_command_is_rejected() {
    let (dispatcher, store) = engine();
    let err = dispatcher
        .dispatch_raw(&day(0), r#"{"kind":"SkipTraining","days":3}"#)
        .unwrap_err();

    assert!(matches!(err, CoachError::UnknownCommand(_)));
    assert!(store.get_plan(ATHLETE).unwrap().is_none());
}

#[test]
fn test_out_of_range_inputs_are_rejected() {
    let (dispatcher, store) = engine();
    let plan = create_marathon_plan(&dispatcher);

    let cases = [
        r#"{"kind":"LogWorkout","date":"2026-01-06","distance_km":"1e28","duration_minutes":"60","effort":"5"}"#.to_string(),
        r#"{"kind":"LogWorkout","date":"2026-01-06","distance_km":"10","duration_minutes":"1e28","effort":"5"}"#.to_string(),
        r#"{"kind":"CreatePlan","goal_distance_km":"1e28","duration_weeks":26}"#.to_string(),
        r#"{"kind":"CreatePlan","goal_distance_km":"42.195","duration_weeks":4294967295}"#.to_string(),
        format!(
            r#"{{"kind":"LogMilestoneResult","milestone_id":"{}","actual_time":"99999999:00:00"}}"#,
            milestone_id(&plan)
        ),
    ];
    for raw in &cases {
        let err = dispatcher.dispatch_raw(&day(1), raw).unwrap_err();
        assert!(matches!(err, CoachError::InvalidInput(_)), "{} -> {:?}", raw, err);
    }

    assert_eq!(store.get_plan(ATHLETE).unwrap().unwrap(), plan);
    assert!(store.query(ATHLETE, day(0).today, day(1).today).unwrap().is_empty());
}

#[test]
fn test_state_survives_reopening_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("coachrs.db");

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        store.put_profile(&profile()).unwrap();
        let dispatcher = Dispatcher::from_config(&EngineConfig::default(), &Stores::shared(store));
        create_marathon_plan(&dispatcher);
        dispatcher
            .dispatch(
                &day(1),
                Command::LogWorkout {
                    date: day(1).today,
                    distance_km: dec!(8),
                    duration_minutes: dec!(48),
                    effort: dec!(4),
                    notes: Some("easy".to_string()),
                },
            )
            .unwrap();
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let logs = store.query(ATHLETE, start(), day(1).today).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].notes.as_deref(), Some("easy"));

    let dispatcher = Dispatcher::from_config(&EngineConfig::default(), &Stores::shared(store));
    match dispatcher.dispatch(&day(2), Command::GetStatus {}).unwrap() {
        Response::Status { plan, risk } => {
            assert_eq!(plan.unwrap().plan.phases.len(), 2);
            assert_eq!(risk.acwr.entries_considered, 1);
        }
        other => panic!("unexpected response: {:?}", other),
    }
}
