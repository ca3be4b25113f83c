use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use liftrs::{
    EngineConfig, ExerciseCatalog, ExerciseCatalogEntry, ExerciseType, Performance, Prescription,
    RecommendationRequest, SessionRecord, SetRecord, TrainingSnapshot,
};
use rust_decimal::Decimal;

/// Benchmarks for the engine's per-request computations
///
/// Histories of increasing length stand in for users with months to years
/// of logged sessions.

const EXERCISES: [(&str, ExerciseType, &[&str]); 4] = [
    ("squat", ExerciseType::Compound, &["quads", "glutes"]),
    ("bench", ExerciseType::Compound, &["chest", "triceps"]),
    ("row", ExerciseType::Compound, &["lats", "biceps"]),
    ("curl", ExerciseType::Isolation, &["biceps"]),
];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 23, 18, 0, 0).unwrap()
}

fn create_catalog() -> ExerciseCatalog {
    ExerciseCatalog::new(EXERCISES.iter().map(|(id, kind, muscles)| ExerciseCatalogEntry {
        id: id.to_string(),
        name: id.to_string(),
        exercise_type: *kind,
        muscle_groups: muscles.iter().map(|m| m.to_string()).collect(),
        default_rest_seconds: 120,
    }))
}

fn create_history(sessions: usize) -> Vec<SessionRecord> {
    (1..=sessions)
        .map(|i| {
            let at = now() - Duration::days(i as i64 * 2);
            let sets = EXERCISES
                .iter()
                .enumerate()
                .flat_map(|(e, (id, _, _))| {
                    (0..3u32).map(move |s| {
                        let rpe = 7.0 + ((i + e + s as usize) % 4) as f64 * 0.5;
                        SetRecord::new(
                            *id,
                            s,
                            Prescription {
                                reps: Some(5),
                                rpe: Some(8.0),
                                ..Prescription::default()
                            },
                            Performance {
                                weight: Some(Decimal::from(100 + (i % 20) as i64 + e as i64 * 25)),
                                reps: Some(5 + (i % 3) as u32),
                                rpe: Some(rpe),
                                rir: None,
                            },
                            true,
                            at + Duration::minutes((e * 15 + s as usize * 4) as i64),
                        )
                    })
                })
                .collect();
            SessionRecord::new(format!("s{}", i), at, sets)
        })
        .collect()
}

fn bench_fatigue_state(c: &mut Criterion) {
    let config = EngineConfig::default();
    let model = config.fatigue_model();
    let catalog = create_catalog();

    let mut group = c.benchmark_group("Fatigue Model");
    for &sessions in &[10, 100, 500] {
        let history = create_history(sessions);
        group.throughput(Throughput::Elements(sessions as u64));
        group.bench_with_input(
            BenchmarkId::new("fatigue_state", sessions),
            &history,
            |b, history| {
                b.iter(|| {
                    let sets = history.iter().flat_map(|s| s.sets.iter());
                    black_box(model.fatigue_state(sets, &catalog, now()))
                });
            },
        );
    }
    group.finish();
}

fn bench_recommendation(c: &mut Criterion) {
    let recommender = EngineConfig::default().recommender();
    let catalog = create_catalog();

    let mut group = c.benchmark_group("Recommender");
    for &sessions in &[10, 100, 500] {
        let history = create_history(sessions);
        let request = RecommendationRequest::new("squat", 6, now()).with_target_rpe(8.0);
        group.bench_with_input(
            BenchmarkId::new("recommend", sessions),
            &history,
            |b, history| {
                b.iter(|| {
                    let snapshot = TrainingSnapshot {
                        history,
                        catalog: &catalog,
                        maxes: &[],
                    };
                    black_box(recommender.recommend(&request, &[], snapshot))
                });
            },
        );
    }
    group.finish();
}

fn bench_readiness(c: &mut Criterion) {
    let scorer = EngineConfig::default().readiness_scorer();
    let catalog = create_catalog();
    let planned = vec!["squat".to_string(), "row".to_string()];

    let mut group = c.benchmark_group("Readiness");
    for &sessions in &[10, 100, 500] {
        let history = create_history(sessions);
        group.bench_with_input(
            BenchmarkId::new("assess", sessions),
            &history,
            |b, history| {
                b.iter(|| black_box(scorer.assess(history, &catalog, &planned, now())));
            },
        );
    }
    group.finish();
}

fn bench_causal_suite(c: &mut Criterion) {
    let mut config = EngineConfig::default();
    config.causal.bootstrap_resamples = 200;
    let suite = config.causal_suite();

    let mut group = c.benchmark_group("Causal Suite");
    group.sample_size(20);
    for &sessions in &[20, 60, 180] {
        let history = create_history(sessions);
        group.bench_with_input(
            BenchmarkId::new("analyze", sessions),
            &history,
            |b, history| {
                b.iter(|| black_box(suite.analyze(history)));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fatigue_state,
    bench_recommendation,
    bench_readiness,
    bench_causal_suite
);
criterion_main!(benches);
