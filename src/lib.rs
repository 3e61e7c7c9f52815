// Library interface for coachrs modules
// This allows integration tests and the CLI to share the engine

pub mod acwr;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod injury;
pub mod logging;
pub mod models;
pub mod pace;
pub mod reconcile;
pub mod store;
pub mod training_plan;

// Re-export commonly used types for convenience
pub use models::*;
pub use acwr::{AcwrCalculator, AcwrConfig, AcwrRecord, RiskBand};
pub use pace::{PaceAdjuster, PaceTargets};
pub use training_plan::{PlanBuilder, PlanRequest, TrainingPlan};
pub use reconcile::MilestoneReconciler;
pub use injury::{InjuryRiskMonitor, MonitorState, RiskMonitorState};
pub use coordinator::{CommandContext, InjuryCoordinator, PlanningCoordinator, Stores};
pub use dispatcher::{Command, Dispatcher, IntentClassifier, JsonIntentClassifier, Response};
pub use store::{InMemoryStore, StaticExerciseCatalog};
pub use database::SqliteStore;
pub use config::{AppConfig, EngineConfig};
pub use error::{CoachError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
