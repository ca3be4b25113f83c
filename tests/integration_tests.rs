use chrono::{DateTime, Duration, TimeZone, Utc};
use liftrs::recommender::BasisKind;
use liftrs::{
    CausalSuite, Confidence, EngineConfig, ExerciseCatalog, ExerciseCatalogEntry, ExerciseType,
    FatigueSeverity, Performance, Prescription, ReadinessSource, RecommendationRequest,
    SessionRecord, SetRecord, TrainingSnapshot,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Integration tests that exercise complete engine workflows

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 23, 18, 0, 0).unwrap()
}

fn catalog() -> ExerciseCatalog {
    let entry = |id: &str, kind: ExerciseType, muscles: &[&str]| ExerciseCatalogEntry {
        id: id.to_string(),
        name: id.to_string(),
        exercise_type: kind,
        muscle_groups: muscles.iter().map(|m| m.to_string()).collect(),
        default_rest_seconds: 120,
    };
    ExerciseCatalog::new(vec![
        entry("squat", ExerciseType::Compound, &["quads", "glutes"]),
        entry("bench", ExerciseType::Compound, &["chest", "triceps"]),
        entry("pushdown", ExerciseType::Isolation, &["triceps"]),
    ])
}

fn logged(
    exercise: &str,
    index: u32,
    weight: Decimal,
    reps: u32,
    prescribed_rpe: f64,
    rpe: f64,
    at: DateTime<Utc>,
) -> SetRecord {
    SetRecord::new(
        exercise,
        index,
        Prescription {
            reps: Some(reps),
            rpe: Some(prescribed_rpe),
            ..Prescription::default()
        },
        Performance {
            weight: Some(weight),
            reps: Some(reps),
            rpe: Some(rpe),
            rir: None,
        },
        true,
        at,
    )
}

/// Squat sessions every third day; the fourth-most-recent one is the best 5-rep set
fn squat_history(sessions: i64) -> Vec<SessionRecord> {
    (1..=sessions)
        .map(|i| {
            let at = now() - Duration::days(i * 3);
            let weight = if i == 4 { dec!(225) } else { dec!(205) };
            SessionRecord::new(
                format!("squat-{}", i),
                at,
                (0..3)
                    .map(|s| {
                        let set_at = at + Duration::minutes(s as i64 * 4);
                        logged("squat", s, weight, 5, 8.0, 8.0, set_at)
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Varied sessions so every session-level series moves
fn varied_history(sessions: i64) -> Vec<SessionRecord> {
    (1..=sessions)
        .map(|i| {
            let at = now() - Duration::days(i * 2);
            let x = i as f64;
            let weight = Decimal::from(150 + (i * 7) % 40);
            let early = 7.0 + (x * 0.9).sin().abs();
            let late = (early + 0.5 + (x * 1.7).cos().abs()).min(10.0);
            let reps = 4 + (i % 4) as u32;
            let sets = vec![
                logged("squat", 0, weight, reps, 8.0, early, at),
                logged(
                    "squat",
                    1,
                    weight,
                    reps,
                    8.0,
                    (early + late) / 2.0,
                    at + Duration::minutes(4),
                ),
                logged("squat", 2, weight, reps, 8.0, late, at + Duration::minutes(8)),
            ];
            SessionRecord::new(format!("varied-{}", i), at, sets)
        })
        .collect()
}

#[test]
fn test_recommendation_repeats_best_matching_set() {
    let config = EngineConfig::default();
    let history = squat_history(12);
    let catalog = catalog();
    let snapshot = TrainingSnapshot {
        history: &history,
        catalog: &catalog,
        maxes: &[],
    };

    let request = RecommendationRequest::new("squat", 5, now());
    let result = config.recommender().recommend(&request, &[], snapshot).unwrap();

    assert_eq!(result.suggested_weight, dec!(225));
    assert_eq!(result.suggested_reps, 5);
    assert_eq!(result.based_on(), BasisKind::Historical);
    assert_eq!(result.confidence, Confidence::High);
    assert!(result.fatigue_alert().is_none());
}

#[test]
fn test_in_session_overshoot_flows_into_next_exercise() {
    let config = EngineConfig::default();
    let catalog = catalog();
    let session_start = now() - Duration::minutes(30);

    // pushdown history sits outside the fatigue window
    let history: Vec<SessionRecord> = (1..=4)
        .map(|i| {
            let at = now() - Duration::days(i * 5);
            SessionRecord::new(
                format!("arms-{}", i),
                at,
                vec![logged("pushdown", 0, dec!(50), 10, 8.0, 8.0, at)],
            )
        })
        .collect();

    let session_sets: Vec<SetRecord> = (0..3)
        .map(|i| {
            logged(
                "bench",
                i,
                dec!(185),
                5,
                7.5,
                9.0,
                session_start + Duration::minutes(i as i64 * 5),
            )
        })
        .collect();

    let monitor = config.session_monitor().assess(&session_sets, Some("pushdown"), &catalog, now());
    assert!(monitor.should_reduce_weight);
    assert!(monitor.severity().unwrap() >= FatigueSeverity::Moderate);
    assert!((monitor.peak_overshoot - 1.5).abs() < 1e-9);

    let snapshot = TrainingSnapshot {
        history: &history,
        catalog: &catalog,
        maxes: &[],
    };
    let request = RecommendationRequest::new("pushdown", 10, now());
    let result = config
        .recommender()
        .recommend(&request, &session_sets, snapshot)
        .unwrap();

    // 1.5 overshoot × 4% per point
    assert_eq!(result.based_on(), BasisKind::RpeAdjustment);
    assert_eq!(result.suggested_weight, dec!(47));
    let alert = result.fatigue_alert().unwrap();
    assert!(alert.affected_muscles.contains("triceps"));
}

#[test]
fn test_short_history_is_insufficient_for_causal_but_scores_readiness() {
    let config = EngineConfig::default();
    let history = squat_history(6);
    let catalog = catalog();

    let report = config.causal_suite().analyze(&history);
    assert_eq!(report.sessions, 6);
    assert!(report.fatigue_to_performance.is_insufficient());
    assert!(report.volume_to_fatigue.is_insufficient());
    assert!(report.intensity_to_performance.is_insufficient());
    assert!(report.volume_via_fatigue.is_insufficient());
    assert!(report.high_volume_fatigue.is_insufficient());
    assert!(report.period_change.is_insufficient());

    let readiness = config
        .readiness_scorer()
        .assess(&history, &catalog, &["squat".to_string()], now());
    assert_eq!(readiness.source, ReadinessSource::Computed);
    assert!((0.0..=10.0).contains(&readiness.score));
    assert!((0.0..=1.0).contains(&readiness.confidence));
    assert!(!readiness.muscle_recovery.is_empty());
}

#[test]
fn test_causal_suite_runs_on_sufficient_history() {
    let mut config = EngineConfig::default();
    config.causal.bootstrap_resamples = 100;
    let history = varied_history(24);

    let report = config.causal_suite().analyze(&history);

    assert_eq!(report.sessions, 24);
    assert!(!report.fatigue_to_performance.is_insufficient());
    assert!(!report.volume_to_fatigue.is_insufficient());
    assert!(!report.intensity_to_performance.is_insufficient());
    assert!(!report.volume_via_fatigue.is_insufficient());
    assert!(!report.period_change.is_insufficient());

    if let Some(granger) = report.fatigue_to_performance.estimate() {
        assert!((0.0..=1.0).contains(&granger.p_value));
        assert_eq!(granger.lag, 1);
    }
}

#[test]
fn test_causal_analysis_is_deterministic() {
    let mut config = EngineConfig::default();
    config.causal.bootstrap_resamples = 50;
    let history = varied_history(16);
    let suite: CausalSuite = config.causal_suite();

    assert_eq!(suite.analyze(&history), suite.analyze(&history));
}

#[test]
fn test_report_serializes_for_the_ui() {
    let report = EngineConfig::default().causal_suite().analyze(&squat_history(3));
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["sessions"], 3);
    assert_eq!(json["fatigue_to_performance"]["status"], "insufficient_data");
    assert_eq!(json["period_change"]["detail"]["required"], 10);
}
