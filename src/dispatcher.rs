//! Command parsing and routing
//!
//! Commands arrive as JSON objects tagged by `kind`. The dispatcher routes each
//! one to the coordinator that owns it and returns a serialisable response.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::coordinator::{
    build_coordinators, CommandContext, InjuryCoordinator, InjuryOutcome, MilestoneOutcome,
    PlanView, PlanningCoordinator, RiskView, Stores, WorkoutOutcome,
};
use crate::error::{CoachError, Result};
use crate::logging::log_command_error;
use crate::models::{flexible_seconds, InjurySeverity, WorkoutLog};
use crate::training_plan::MilestoneSpec;

/// Every request the engine understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Command {
    CreatePlan {
        goal_distance_km: Decimal,
        duration_weeks: u32,
        #[serde(default)]
        milestones: Vec<MilestoneSpec>,
    },
    LogMilestoneResult {
        milestone_id: String,
        /// Seconds, or "h:mm:ss"
        #[serde(with = "flexible_seconds")]
        actual_time: u32,
    },
    LogWorkout {
        date: chrono::NaiveDate,
        distance_km: Decimal,
        duration_minutes: Decimal,
        effort: Decimal,
        #[serde(default)]
        notes: Option<String>,
    },
    ReportInjury {
        location: String,
        severity: InjurySeverity,
    },
    MarkInjuryResolving {
        injury_id: String,
    },
    ResolveInjury {
        injury_id: String,
    },
    GetStatus {},
}

impl Command {
    pub const KINDS: [&'static str; 7] = [
        "CreatePlan",
        "LogMilestoneResult",
        "LogWorkout",
        "ReportInjury",
        "MarkInjuryResolving",
        "ResolveInjury",
        "GetStatus",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreatePlan { .. } => "CreatePlan",
            Command::LogMilestoneResult { .. } => "LogMilestoneResult",
            Command::LogWorkout { .. } => "LogWorkout",
            Command::ReportInjury { .. } => "ReportInjury",
            Command::MarkInjuryResolving { .. } => "MarkInjuryResolving",
            Command::ResolveInjury { .. } => "ResolveInjury",
            Command::GetStatus {} => "GetStatus",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Command::GetStatus {})
    }
}

/// Successful command results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Response {
    PlanCreated {
        plan: PlanView,
    },
    MilestoneRecorded {
        #[serde(flatten)]
        outcome: MilestoneOutcome,
    },
    WorkoutLogged {
        #[serde(flatten)]
        outcome: WorkoutOutcome,
    },
    InjuryReported {
        #[serde(flatten)]
        outcome: InjuryOutcome,
    },
    InjuryUpdated {
        #[serde(flatten)]
        outcome: InjuryOutcome,
    },
    Status {
        plan: Option<PlanView>,
        risk: RiskView,
    },
}

/// Failure payload for callers that report errors in-band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&CoachError> for ErrorBody {
    fn from(err: &CoachError) -> Self {
        ErrorBody {
            code: err.code().to_string(),
            message: err.user_message(),
            retryable: err.is_retryable(),
        }
    }
}

/// Turns raw athlete input into a typed command
pub trait IntentClassifier: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Command>;
}

/// Accepts commands already structured as tagged JSON objects
#[derive(Debug, Clone, Default)]
pub struct JsonIntentClassifier;

impl IntentClassifier for JsonIntentClassifier {
    fn parse(&self, raw: &str) -> Result<Command> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CoachError::InvalidInput(format!("Command is not valid JSON: {}", e)))?;

        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| CoachError::InvalidInput("Command has no 'kind' field".to_string()))?;
        if !Command::KINDS.contains(&kind) {
            return Err(CoachError::UnknownCommand(kind.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| CoachError::InvalidInput(format!("Malformed {} command: {}", kind, e)))
    }
}

pub struct Dispatcher {
    planning: PlanningCoordinator,
    injury: InjuryCoordinator,
    classifier: Box<dyn IntentClassifier>,
}

impl Dispatcher {
    pub fn new(planning: PlanningCoordinator, injury: InjuryCoordinator) -> Self {
        Dispatcher {
            planning,
            injury,
            classifier: Box::new(JsonIntentClassifier),
        }
    }

    /// Wire coordinators over `stores` using `config`
    pub fn from_config(config: &EngineConfig, stores: &Stores) -> Self {
        let (planning, injury) = build_coordinators(config, stores);
        Self::new(planning, injury)
    }

    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Parse and execute raw input
    pub fn dispatch_raw(&self, ctx: &CommandContext, raw: &str) -> Result<Response> {
        let command = self.classifier.parse(raw).map_err(|err| {
            log_command_error("parse", &err);
            err
        })?;
        self.dispatch(ctx, command)
    }

    pub fn dispatch(&self, ctx: &CommandContext, command: Command) -> Result<Response> {
        let kind = command.kind();
        let span = tracing::info_span!("command", kind, athlete = %ctx.athlete_id, today = %ctx.today);
        let _guard = span.enter();
        tracing::debug!("Dispatching command");

        let result = self.route(ctx, command);
        if let Err(err) = &result {
            log_command_error(kind, err);
        }
        result
    }

    fn route(&self, ctx: &CommandContext, command: Command) -> Result<Response> {
        match command {
            Command::CreatePlan {
                goal_distance_km,
                duration_weeks,
                milestones,
            } => Ok(Response::PlanCreated {
                plan: self
                    .planning
                    .create_plan(ctx, goal_distance_km, duration_weeks, milestones)?,
            }),
            Command::LogMilestoneResult {
                milestone_id,
                actual_time,
            } => Ok(Response::MilestoneRecorded {
                outcome: self
                    .planning
                    .log_milestone_result(ctx, &milestone_id, actual_time)?,
            }),
            Command::LogWorkout {
                date,
                distance_km,
                duration_minutes,
                effort,
                notes,
            } => {
                let mut log = WorkoutLog::new(date, distance_km, duration_minutes, effort);
                log.notes = notes;
                Ok(Response::WorkoutLogged {
                    outcome: self.injury.log_workout(ctx, log)?,
                })
            }
            Command::ReportInjury { location, severity } => Ok(Response::InjuryReported {
                outcome: self.injury.report_injury(ctx, &location, severity)?,
            }),
            Command::MarkInjuryResolving { injury_id } => Ok(Response::InjuryUpdated {
                outcome: self.injury.mark_resolving(ctx, &injury_id)?,
            }),
            Command::ResolveInjury { injury_id } => Ok(Response::InjuryUpdated {
                outcome: self.injury.resolve_injury(ctx, &injury_id)?,
            }),
            Command::GetStatus {} => Ok(Response::Status {
                plan: self.planning.plan_view(ctx)?,
                risk: self.injury.risk_view(ctx)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        let classifier = JsonIntentClassifier;

        let command = classifier
            .parse(r#"{"kind":"LogMilestoneResult","milestone_id":"m1","actual_time":"2:24:00"}"#)
            .unwrap();
        assert_eq!(
            command,
            Command::LogMilestoneResult {
                milestone_id: "m1".to_string(),
                actual_time: 8640
            }
        );

        let command = classifier.parse(r#"{"kind":"GetStatus"}"#).unwrap();
        assert!(command.is_read_only());

        let command = classifier
            .parse(r#"{"kind":"ReportInjury","location":"shin","severity":"severe"}"#)
            .unwrap();
        assert_eq!(command.kind(), "ReportInjury");
    }

    #[test]
    fn test_unknown_kind() {
        let err = JsonIntentClassifier
            .parse(r#"{"kind":"DeleteEverything"}"#)
            .unwrap_err();
        assert!(matches!(err, CoachError::UnknownCommand(kind) if kind == "DeleteEverything"));
    }

    #[test]
    fn test_malformed_payloads() {
        let classifier = JsonIntentClassifier;
        for raw in [
            "not json",
            r#"{"goal_distance_km": 42.2}"#,
            r#"{"kind":"CreatePlan","goal_distance_km":42.2}"#,
            r#"{"kind":"ReportInjury","location":"knee","severity":"catastrophic"}"#,
        ] {
            assert!(
                matches!(classifier.parse(raw), Err(CoachError::InvalidInput(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_kinds_match_variants() {
        let json = serde_json::to_value(Command::GetStatus {}).unwrap();
        assert_eq!(json["kind"], "GetStatus");
        for kind in Command::KINDS {
            let parsed = JsonIntentClassifier.parse(&format!(r#"{{"kind":"{}"}}"#, kind));
            assert!(!matches!(parsed, Err(CoachError::UnknownCommand(_))));
        }
    }
}
