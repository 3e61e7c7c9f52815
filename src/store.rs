//! Storage contracts consumed by the coordinators
//!
//! Stores take `&self` and synchronise internally so a single instance can be
//! shared behind an `Arc` by both coordinators.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CoachError, Result, StoreError};
use crate::injury::RiskMonitorState;
use crate::models::{AthleteProfile, Exercise, RehabProtocol, WorkoutLog};
use crate::training_plan::TrainingPlan;

/// Athlete profiles, read-only to the engine
pub trait ProfileStore: Send + Sync {
    /// Profile for `athlete_id`, or `NotFound`
    fn get_profile(&self, athlete_id: &str) -> Result<AthleteProfile>;

    fn put_profile(&self, profile: &AthleteProfile) -> Result<()>;

    /// Validate and store `profile`, keeping the original creation time when
    /// the athlete already exists. Read failures other than `NotFound` abort
    /// without writing.
    fn upsert_profile(&self, mut profile: AthleteProfile) -> Result<AthleteProfile> {
        profile.validate()?;
        match self.get_profile(&profile.id) {
            Ok(existing) => profile.created_at = existing.created_at,
            Err(CoachError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        self.put_profile(&profile)?;
        Ok(profile)
    }
}

/// One current plan per athlete
pub trait PlanStore: Send + Sync {
    fn get_plan(&self, athlete_id: &str) -> Result<Option<TrainingPlan>>;

    /// Replace the athlete's plan
    fn put_plan(&self, athlete_id: &str, plan: &TrainingPlan) -> Result<()>;
}

/// Append-only workout history
pub trait WorkoutLogStore: Send + Sync {
    fn append(&self, athlete_id: &str, log: &WorkoutLog) -> Result<()>;

    /// Logs dated within `[start, end]`, ordered by date
    fn query(&self, athlete_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<WorkoutLog>>;
}

/// Injury monitor state per athlete
pub trait InjuryStore: Send + Sync {
    fn get_state(&self, athlete_id: &str) -> Result<Option<RiskMonitorState>>;

    fn put_state(&self, state: &RiskMonitorState) -> Result<()>;
}

/// Read-only corrective exercise library
pub trait ExerciseCatalog: Send + Sync {
    /// Full rehab protocol for a body location, if one is on file
    fn protocol(&self, location: &str) -> Option<RehabProtocol>;

    /// Exercises for a body location; empty when the location is unknown
    fn lookup(&self, location: &str) -> Vec<Exercise> {
        self.protocol(location)
            .map(|protocol| protocol.exercises)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<String, AthleteProfile>,
    plans: HashMap<String, TrainingPlan>,
    workouts: HashMap<String, Vec<WorkoutLog>>,
    monitors: HashMap<String, RiskMonitorState>,
}

/// Mutex-guarded in-memory implementation of every store trait
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CoachError::Storage(StoreError::Poisoned))
    }
}

impl ProfileStore for InMemoryStore {
    fn get_profile(&self, athlete_id: &str) -> Result<AthleteProfile> {
        self.lock()?
            .profiles
            .get(athlete_id)
            .cloned()
            .ok_or_else(|| CoachError::not_found("athlete", athlete_id))
    }

    fn put_profile(&self, profile: &AthleteProfile) -> Result<()> {
        self.lock()?
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

impl PlanStore for InMemoryStore {
    fn get_plan(&self, athlete_id: &str) -> Result<Option<TrainingPlan>> {
        Ok(self.lock()?.plans.get(athlete_id).cloned())
    }

    fn put_plan(&self, athlete_id: &str, plan: &TrainingPlan) -> Result<()> {
        self.lock()?
            .plans
            .insert(athlete_id.to_string(), plan.clone());
        Ok(())
    }
}

impl WorkoutLogStore for InMemoryStore {
    fn append(&self, athlete_id: &str, log: &WorkoutLog) -> Result<()> {
        let mut tables = self.lock()?;
        let logs = tables.workouts.entry(athlete_id.to_string()).or_default();
        // Keep date order; same-day entries stay in arrival order
        let position = logs.partition_point(|existing| existing.date <= log.date);
        logs.insert(position, log.clone());
        Ok(())
    }

    fn query(&self, athlete_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<WorkoutLog>> {
        Ok(self
            .lock()?
            .workouts
            .get(athlete_id)
            .map(|logs| {
                logs.iter()
                    .filter(|log| log.date >= start && log.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl InjuryStore for InMemoryStore {
    fn get_state(&self, athlete_id: &str) -> Result<Option<RiskMonitorState>> {
        Ok(self.lock()?.monitors.get(athlete_id).cloned())
    }

    fn put_state(&self, state: &RiskMonitorState) -> Result<()> {
        self.lock()?
            .monitors
            .insert(state.athlete_id.clone(), state.clone());
        Ok(())
    }
}

/// Built-in library for the five most common running injuries
#[derive(Debug, Clone, Default)]
pub struct StaticExerciseCatalog;

fn exercise(name: &str, sets: u8, reps: &str, purpose: &str) -> Exercise {
    Exercise {
        name: name.to_string(),
        sets,
        reps: reps.to_string(),
        purpose: purpose.to_string(),
    }
}

impl StaticExerciseCatalog {
    /// Canonical catalog key for a free-form location
    pub fn normalize(location: &str) -> Option<&'static str> {
        let key: String = location
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();

        match key.as_str() {
            "it_band" | "itb" | "iliotibial_band" | "it_band_syndrome" => Some("it_band"),
            "plantar_fasciitis" | "plantar" | "heel" | "arch" => Some("plantar_fasciitis"),
            "achilles" | "achilles_tendonitis" | "achilles_tendon" => Some("achilles_tendonitis"),
            "shin_splints" | "shin" | "shins" => Some("shin_splints"),
            "runners_knee" | "runner_s_knee" | "knee" | "patellofemoral" => Some("runners_knee"),
            _ => None,
        }
    }

    pub fn locations() -> &'static [&'static str] {
        &[
            "it_band",
            "plantar_fasciitis",
            "achilles_tendonitis",
            "shin_splints",
            "runners_knee",
        ]
    }
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl ExerciseCatalog for StaticExerciseCatalog {
    fn protocol(&self, location: &str) -> Option<RehabProtocol> {
        let protocol = match Self::normalize(location)? {
            "it_band" => RehabProtocol {
                injury_name: "IT Band Syndrome".to_string(),
                exercises: vec![
                    exercise("Foam roll lateral thigh", 1, "60 seconds each side", "Reduce tension along the IT band"),
                    exercise("Clamshells", 3, "15 each side", "Strengthen hip abductors"),
                    exercise("Side-lying leg raises", 3, "12 each side", "Stabilise the pelvis"),
                ],
                training_modifications: lines(&[
                    "Reduce weekly mileage by 20% for 2 weeks",
                    "Avoid hills and cambered surfaces",
                    "No speed work for 2 weeks",
                ]),
                return_to_running_criteria: lines(&[
                    "No pain during daily activities for 3 days",
                    "All exercises pain-free",
                    "Restart at 50% of previous mileage",
                ]),
            },
            "plantar_fasciitis" => RehabProtocol {
                injury_name: "Plantar Fasciitis".to_string(),
                exercises: vec![
                    exercise("Towel scrunches", 3, "20", "Strengthen intrinsic foot muscles"),
                    exercise("Calf stretch against wall", 3, "30 seconds each side", "Relieve plantar fascia load"),
                    exercise("Frozen bottle roll", 1, "2 minutes each foot", "Reduce inflammation"),
                ],
                training_modifications: lines(&[
                    "Run on soft surfaces only",
                    "Drop runs longer than 60 minutes",
                    "Avoid barefoot walking",
                ]),
                return_to_running_criteria: lines(&[
                    "First steps in the morning are pain-free",
                    "Single-leg calf raises pain-free",
                ]),
            },
            "achilles_tendonitis" => RehabProtocol {
                injury_name: "Achilles Tendonitis".to_string(),
                exercises: vec![
                    exercise("Eccentric heel drops", 3, "15 each side", "Load the tendon progressively"),
                    exercise("Seated soleus raises", 3, "20", "Build soleus endurance"),
                ],
                training_modifications: lines(&[
                    "No hill repeats or strides",
                    "Cross-train instead of back-to-back run days",
                ]),
                return_to_running_criteria: lines(&[
                    "Tendon not tender to pinch",
                    "20 single-leg hops pain-free",
                ]),
            },
            "shin_splints" => RehabProtocol {
                injury_name: "Shin Splints".to_string(),
                exercises: vec![
                    exercise("Toe walks", 2, "30 metres", "Strengthen anterior tibialis"),
                    exercise("Heel walks", 2, "30 metres", "Balance lower-leg loading"),
                    exercise("Resisted dorsiflexion", 3, "15 each side", "Strengthen shin muscles"),
                ],
                training_modifications: lines(&[
                    "Reduce weekly mileage by 30%",
                    "Replace track sessions with cycling",
                ]),
                return_to_running_criteria: lines(&[
                    "No point tenderness along the shin",
                    "Brisk walking for 30 minutes pain-free",
                ]),
            },
            "runners_knee" => RehabProtocol {
                injury_name: "Runner's Knee".to_string(),
                exercises: vec![
                    exercise("Glute bridges", 3, "15", "Improve hip extension control"),
                    exercise("Step-downs", 3, "10 each side", "Train knee tracking"),
                    exercise("Wall sits", 3, "30 seconds", "Build quadriceps strength"),
                ],
                training_modifications: lines(&[
                    "Avoid downhill running",
                    "Shorten stride and raise cadence",
                ]),
                return_to_running_criteria: lines(&[
                    "Stairs pain-free in both directions",
                    "Single-leg squat to 60 degrees pain-free",
                ]),
            },
            _ => return None,
        };
        Some(protocol)
    }
}
