use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use coachrs::acwr::AcwrCalculator;
use coachrs::training_plan::{MilestoneSpec, PlanBuilder, PlanRequest};
use coachrs::{AbilityLevel, AthleteProfile, WorkoutLog};

/// Benchmarks for the load and planning calculations
///
/// ACWR is recomputed from the raw log window on every workout, so its cost
/// should stay flat as history grows beyond the chronic window.

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn create_workout_series(days: u64) -> Vec<WorkoutLog> {
    (0..days)
        .map(|day| {
            let km = Decimal::from(5 + day % 12);
            let effort = Decimal::from(3 + day % 6);
            WorkoutLog::new(start_date() + Days::new(day), km, km * dec!(6), effort)
        })
        .collect()
}

fn bench_acwr_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("ACWR Calculation");
    let calculator = AcwrCalculator::new();

    for &days in &[28u64, 90, 365, 1095] {
        let logs = create_workout_series(days);
        let as_of = start_date() + Days::new(days - 1);

        group.throughput(Throughput::Elements(days));
        group.bench_with_input(BenchmarkId::new("calculate", days), &logs, |b, logs| {
            b.iter(|| calculator.calculate(black_box(logs), as_of, AbilityLevel::Intermediate));
        });
    }

    group.finish();
}

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("Plan Build");
    let builder = PlanBuilder::new();
    let profile = AthleteProfile::new("bench", "Bench Runner", AbilityLevel::Intermediate, dec!(300), dec!(30));

    for &milestones in &[0u32, 2, 4] {
        let request = PlanRequest {
            goal_distance_km: dec!(42.195),
            duration_weeks: 30,
            milestones: (1..=milestones)
                .map(|i| MilestoneSpec {
                    week: i * 6,
                    distance_km: dec!(21.1),
                    predicted_time: 6500,
                })
                .collect(),
            start_date: start_date(),
        };

        group.bench_with_input(BenchmarkId::new("build", milestones), &request, |b, request| {
            b.iter(|| builder.build(black_box(&profile), black_box(request)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_acwr_calculation, bench_plan_build);
criterion_main!(benches);
