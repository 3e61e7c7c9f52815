use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CoachError, Result, StoreError};
use crate::injury::RiskMonitorState;
use crate::models::{AthleteProfile, WorkoutLog};
use crate::store::{InjuryStore, PlanStore, ProfileStore, WorkoutLogStore};
use crate::training_plan::TrainingPlan;

/// SQLite-backed implementation of the store traits.
///
/// Profiles and workouts are stored as rows; plans and monitor states are
/// stored as JSON documents keyed by athlete.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn decimal_column(row: &Row, column: &str) -> rusqlite::Result<Decimal> {
    let text: String = row.get(column)?;
    text.parse::<Decimal>().map_err(|e| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

fn decode_document<T: serde::de::DeserializeOwned>(json: &str, table: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        CoachError::Storage(StoreError::Corrupt {
            table: table.to_string(),
            reason: e.to_string(),
        })
    })
}

impl SqliteStore {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoachError::Storage(StoreError::Poisoned))
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        // WAL for concurrent readers; in-memory databases report "memory"
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(StoreError::from)?;

        conn.execute_batch(
            r#"
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS athletes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                ability_level TEXT NOT NULL,
                goal_distance_km TEXT NOT NULL,
                baseline_pace TEXT NOT NULL,
                current_weekly_km TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workouts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                athlete_id TEXT NOT NULL,
                date DATE NOT NULL,
                distance_km TEXT NOT NULL,
                duration_minutes TEXT NOT NULL,
                effort TEXT NOT NULL,
                notes TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_workouts_athlete_date ON workouts (athlete_id, date);

            CREATE TABLE IF NOT EXISTS plans (
                athlete_id TEXT PRIMARY KEY,
                plan_id TEXT NOT NULL,
                revision INTEGER NOT NULL,
                document TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS monitor_states (
                athlete_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                document TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )
        .map_err(StoreError::from)?;

        Ok(())
    }

    fn profile_from_row(row: &Row) -> rusqlite::Result<AthleteProfile> {
        let ability: String = row.get("ability_level")?;
        Ok(AthleteProfile {
            id: row.get("id")?,
            name: row.get("name")?,
            ability_level: ability.parse().map_err(|e: CoachError| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?,
            goal_distance_km: decimal_column(row, "goal_distance_km")?,
            baseline_pace: decimal_column(row, "baseline_pace")?,
            current_weekly_km: decimal_column(row, "current_weekly_km")?,
            created_at: row.get::<_, DateTime<Utc>>("created_at")?,
            updated_at: row.get::<_, DateTime<Utc>>("updated_at")?,
        })
    }

    fn workout_from_row(row: &Row) -> rusqlite::Result<WorkoutLog> {
        Ok(WorkoutLog {
            id: row.get("id")?,
            date: row.get::<_, NaiveDate>("date")?,
            distance_km: decimal_column(row, "distance_km")?,
            duration_minutes: decimal_column(row, "duration_minutes")?,
            effort: decimal_column(row, "effort")?,
            notes: row.get("notes")?,
        })
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(StoreError::from)?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(DatabaseStats {
            athlete_count: count("athletes")?,
            workout_count: count("workouts")?,
            plan_count: count("plans")?,
            monitor_count: count("monitor_states")?,
        })
    }
}

impl ProfileStore for SqliteStore {
    fn get_profile(&self, athlete_id: &str) -> Result<AthleteProfile> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, ability_level, goal_distance_km, baseline_pace, current_weekly_km, created_at, updated_at
                 FROM athletes WHERE id = ?1",
                params![athlete_id],
                Self::profile_from_row,
            )
            .optional()
            .map_err(StoreError::from)?;

        row.ok_or_else(|| CoachError::not_found("athlete", athlete_id))
    }

    fn put_profile(&self, profile: &AthleteProfile) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO athletes (
                id, name, ability_level, goal_distance_km, baseline_pace, current_weekly_km, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                profile.id,
                profile.name,
                profile.ability_level.to_string(),
                profile.goal_distance_km.to_string(),
                profile.baseline_pace.to_string(),
                profile.current_weekly_km.to_string(),
                profile.created_at,
                profile.updated_at,
            ],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }
}

impl PlanStore for SqliteStore {
    fn get_plan(&self, athlete_id: &str) -> Result<Option<TrainingPlan>> {
        let conn = self.lock()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM plans WHERE athlete_id = ?1",
                params![athlete_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;

        document
            .map(|json| decode_document(&json, "plans"))
            .transpose()
    }

    fn put_plan(&self, athlete_id: &str, plan: &TrainingPlan) -> Result<()> {
        let document = serde_json::to_string(plan).map_err(StoreError::from)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO plans (athlete_id, plan_id, revision, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![athlete_id, plan.id, plan.revision, document, plan.updated_at],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }
}

impl WorkoutLogStore for SqliteStore {
    fn append(&self, athlete_id: &str, log: &WorkoutLog) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO workouts (id, athlete_id, date, distance_km, duration_minutes, effort, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.id,
                athlete_id,
                log.date,
                log.distance_km.to_string(),
                log.duration_minutes.to_string(),
                log.effort.to_string(),
                log.notes,
            ],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    fn query(&self, athlete_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<WorkoutLog>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, date, distance_km, duration_minutes, effort, notes FROM workouts
                 WHERE athlete_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date, seq",
            )
            .map_err(StoreError::from)?;

        let logs = stmt
            .query_map(params![athlete_id, start, end], Self::workout_from_row)
            .map_err(StoreError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)?;
        Ok(logs)
    }
}

impl InjuryStore for SqliteStore {
    fn get_state(&self, athlete_id: &str) -> Result<Option<RiskMonitorState>> {
        let conn = self.lock()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM monitor_states WHERE athlete_id = ?1",
                params![athlete_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;

        document
            .map(|json| decode_document(&json, "monitor_states"))
            .transpose()
    }

    fn put_state(&self, state: &RiskMonitorState) -> Result<()> {
        let document = serde_json::to_string(state).map_err(StoreError::from)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO monitor_states (athlete_id, state, document, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![state.athlete_id, state.state.to_string(), document, state.updated_at],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub athlete_count: usize,
    pub workout_count: usize,
    pub plan_count: usize,
    pub monitor_count: usize,
}
