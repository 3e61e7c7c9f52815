use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use coachrs::acwr::{AcwrCalculator, RiskBand};
use coachrs::config::AppConfig;
use coachrs::coordinator::{CommandContext, Stores};
use coachrs::dispatcher::{Dispatcher, ErrorBody};
use coachrs::logging::{init_logging, log_command_error};
use coachrs::store::ProfileStore;
use coachrs::training_plan::{MilestoneSpec, PlanBuilder, PlanRequest};
use coachrs::{
    format_hms, format_pace, parse_hms, AbilityLevel, AthleteProfile, SqliteStore, WorkoutLog,
};

/// coachrs - Marathon training adaptation CLI
///
/// Builds phased marathon plans, re-plans them from milestone race results and
/// watches workout load for injury risk using the acute:chronic workload ratio.
#[derive(Parser)]
#[command(name = "coachrs")]
#[command(author = "coachrs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Marathon Training Adaptation CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute JSON commands, one per line, and print JSON responses
    Run {
        /// Athlete the commands apply to
        #[arg(short, long)]
        athlete: String,

        /// Date to evaluate commands against (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        today: Option<NaiveDate>,

        /// Command file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Database path (overrides config)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show the daily ACWR series for a workout CSV
    Acwr {
        /// CSV with date, distance_km, duration_minutes, effort columns
        #[arg(short, long)]
        file: PathBuf,

        /// Ability level used for band thresholds
        #[arg(short = 'l', long, default_value = "intermediate")]
        ability: AbilityLevel,

        /// Last date of the series (default: latest workout)
        #[arg(short, long)]
        to: Option<NaiveDate>,

        /// Number of days to show
        #[arg(short, long, default_value = "14")]
        days: u32,
    },

    /// Preview a plan without storing it
    Plan {
        /// Goal race distance in km
        #[arg(short, long, default_value = "42.195")]
        goal_km: Decimal,

        /// Plan duration in weeks
        #[arg(short, long)]
        weeks: u32,

        /// Goal race pace (m:ss per km or seconds)
        #[arg(short, long)]
        pace: String,

        /// Current weekly volume in km
        #[arg(short = 'k', long, default_value = "30")]
        weekly_km: Decimal,

        #[arg(short = 'l', long, default_value = "intermediate")]
        ability: AbilityLevel,

        /// Milestone as WEEK:KM:TIME, e.g. 12:29:2:30:00 (repeatable)
        #[arg(short, long)]
        milestone: Vec<String>,
    },

    /// Create or update an athlete profile
    Profile {
        #[arg(short, long)]
        athlete: String,

        #[arg(short, long)]
        name: String,

        #[arg(short = 'l', long, default_value = "intermediate")]
        ability: AbilityLevel,

        /// Goal race pace (m:ss per km or seconds)
        #[arg(short, long)]
        pace: String,

        /// Current weekly volume in km
        #[arg(short = 'k', long)]
        weekly_km: Decimal,

        /// Database path (overrides config)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show or initialise configuration
    Config {
        /// Write the default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

#[derive(Debug, Deserialize)]
struct CsvWorkout {
    date: NaiveDate,
    distance_km: Decimal,
    duration_minutes: Decimal,
    effort: Decimal,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Tabled)]
struct AcwrRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Acute")]
    acute: String,
    #[tabled(rename = "Chronic")]
    chronic: String,
    #[tabled(rename = "ACWR")]
    ratio: String,
    #[tabled(rename = "Band")]
    band: String,
}

#[derive(Tabled)]
struct WeekRow {
    #[tabled(rename = "Week")]
    week: u32,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Target km")]
    km: String,
    #[tabled(rename = "Easy")]
    easy: String,
    #[tabled(rename = "Long")]
    long_run: String,
    #[tabled(rename = "Tempo")]
    tempo: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Milestone")]
    milestone: String,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_file(path),
        None => Ok(AppConfig::load_or_default()),
    }
}

fn parse_pace(input: &str) -> Result<Decimal> {
    let seconds = parse_hms(input).with_context(|| format!("Invalid pace: {}", input))?;
    Ok(Decimal::from(seconds))
}

fn parse_milestone(input: &str) -> Result<MilestoneSpec> {
    let mut parts = input.splitn(3, ':');
    let (Some(week), Some(km), Some(time)) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("Milestone must be WEEK:KM:TIME, got {}", input);
    };
    Ok(MilestoneSpec {
        week: week.parse().with_context(|| format!("Invalid milestone week: {}", week))?,
        distance_km: km.parse().with_context(|| format!("Invalid milestone distance: {}", km))?,
        predicted_time: parse_hms(time)?,
    })
}

fn band_label(band: RiskBand) -> ColoredString {
    match band {
        RiskBand::Optimal => band.to_string().green(),
        RiskBand::Undertraining => band.to_string().cyan(),
        RiskBand::Moderate => band.to_string().yellow(),
        RiskBand::High => band.to_string().red().bold(),
        RiskBand::InsufficientHistory => band.to_string().dimmed(),
    }
}

fn run_commands(
    config: &AppConfig,
    athlete: String,
    today: NaiveDate,
    input: Option<PathBuf>,
    database: Option<PathBuf>,
) -> Result<()> {
    let db_path = database.unwrap_or_else(|| config.storage.database_path.clone());
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    let dispatcher = Dispatcher::from_config(&config.engine, &Stores::shared(store));
    let ctx = CommandContext::new(athlete, today);

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(&path)
                .with_context(|| format!("Failed to open command file {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match dispatcher.dispatch_raw(&ctx, &line) {
            Ok(response) => serde_json::json!({ "ok": true, "response": response }),
            Err(err) => serde_json::json!({ "ok": false, "error": ErrorBody::from(&err) }),
        };
        writeln!(out, "{}", serde_json::to_string(&reply)?)?;
    }
    Ok(())
}

fn show_acwr(
    config: &AppConfig,
    file: &Path,
    ability: AbilityLevel,
    to: Option<NaiveDate>,
    days: u32,
) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let mut logs = Vec::new();
    for (line, row) in reader.deserialize::<CsvWorkout>().enumerate() {
        let row = row.with_context(|| format!("Bad workout row {}", line + 2))?;
        let mut log = WorkoutLog::new(row.date, row.distance_km, row.duration_minutes, row.effort);
        log.notes = row.notes;
        logs.push(log);
    }

    let Some(last) = to.or_else(|| logs.iter().map(|l| l.date).max()) else {
        println!("{}", "No workouts found".yellow());
        return Ok(());
    };
    for log in &logs {
        if let Err(err) = log.validate(last) {
            log_command_error("acwr", &err);
            anyhow::bail!(err.user_message());
        }
    }

    let calculator = AcwrCalculator::with_config(config.engine.acwr.clone());
    let first = last - Days::new(u64::from(days.max(1) - 1));
    let records: Vec<_> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|d| calculator.calculate(&logs, d, ability))
        .collect();

    let rows: Vec<AcwrRow> = records
        .iter()
        .map(|r| AcwrRow {
            date: r.as_of.to_string(),
            acute: r.acute_load.round_dp(1).to_string(),
            chronic: r.chronic_load.round_dp(1).to_string(),
            ratio: r
                .ratio
                .map(|x| x.round_dp(2).to_string())
                .unwrap_or_else(|| "-".to_string()),
            band: r.band.to_string(),
        })
        .collect();

    println!("{}", format!("ACWR for {} workouts ({})", logs.len(), ability).blue().bold());
    println!("{}", Table::new(rows).with(Style::rounded()));
    if let Some(latest) = records.last() {
        println!(
            "{} {} - {}",
            "Current:".bold(),
            band_label(latest.band),
            latest.band.recommendation()
        );
    }
    Ok(())
}

fn preview_plan(
    config: &AppConfig,
    goal_km: Decimal,
    weeks: u32,
    pace: &str,
    weekly_km: Decimal,
    ability: AbilityLevel,
    milestones: &[String],
) -> Result<()> {
    let profile = AthleteProfile::new("preview", "Preview", ability, parse_pace(pace)?, weekly_km);
    let request = PlanRequest {
        goal_distance_km: goal_km,
        duration_weeks: weeks,
        milestones: milestones
            .iter()
            .map(|m| parse_milestone(m))
            .collect::<Result<Vec<_>>>()?,
        start_date: Local::now().date_naive(),
    };

    let plan = PlanBuilder::with_config(config.engine.plan.clone())
        .build(&profile, &request)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let mut rows = Vec::new();
    for phase in &plan.phases {
        for week in phase.start_week..phase.end_week {
            let milestone = phase
                .milestone
                .as_ref()
                .filter(|m| m.week == week + 1)
                .map(|m| {
                    format!(
                        "{} km in {} ({})",
                        m.distance_km,
                        format_hms(m.predicted_seconds),
                        format_pace(m.predicted_pace())
                    )
                })
                .unwrap_or_default();
            rows.push(WeekRow {
                week: week + 1,
                phase: phase.name.clone(),
                km: phase.planned_km(week).map(|km| km.to_string()).unwrap_or_default(),
                easy: format_pace(phase.paces.easy),
                long_run: format_pace(phase.paces.long_run),
                tempo: format_pace(phase.paces.tempo),
                interval: format_pace(phase.paces.interval),
                milestone,
            });
        }
    }

    println!(
        "{}",
        format!("{} km plan over {} weeks ({})", goal_km, weeks, ability).green().bold()
    );
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!(
        "{} {} at {}",
        "Predicted finish:".bold(),
        format_hms(plan.predicted_finish_seconds),
        format_pace(profile.baseline_pace)
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let log_config = config.logging.clone().with_verbosity(cli.verbose);
    init_logging(&log_config)?;

    match cli.command {
        Commands::Run {
            athlete,
            today,
            input,
            database,
        } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            run_commands(&config, athlete, today, input, database)?;
        }

        Commands::Acwr {
            file,
            ability,
            to,
            days,
        } => show_acwr(&config, &file, ability, to, days)?,

        Commands::Plan {
            goal_km,
            weeks,
            pace,
            weekly_km,
            ability,
            milestone,
        } => preview_plan(&config, goal_km, weeks, &pace, weekly_km, ability, &milestone)?,

        Commands::Profile {
            athlete,
            name,
            ability,
            pace,
            weekly_km,
            database,
        } => {
            let db_path = database.unwrap_or_else(|| config.storage.database_path.clone());
            let store = SqliteStore::open(&db_path)?;
            let profile = AthleteProfile::new(&athlete, name, ability, parse_pace(&pace)?, weekly_km);
            let profile = store.upsert_profile(profile).map_err(|err| {
                log_command_error("profile", &err);
                anyhow::anyhow!(err.user_message())
            })?;
            println!("{}", format!("✓ Saved profile {}", athlete).green());
            println!("  Ability: {}", ability);
            println!("  Goal pace: {}", format_pace(profile.baseline_pace));
            println!("  Weekly volume: {} km", weekly_km);

            let stats = store.stats()?;
            println!(
                "  Database: {} athletes, {} plans, {} workouts",
                stats.athlete_count, stats.plan_count, stats.workout_count
            );
        }

        Commands::Config { init } => {
            if init {
                let mut config = AppConfig::default();
                let path = cli
                    .config
                    .unwrap_or_else(AppConfig::default_config_path);
                config.save_to_file(&path)?;
                println!("{}", format!("✓ Wrote default configuration to {}", path.display()).green());
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}
