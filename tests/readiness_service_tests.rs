use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use liftrs::{
    ExerciseCatalog, ExerciseCatalogEntry, ExerciseType, HistoryAggregator, HistoryError,
    HistoryProvider, Performance, Prescription, ReadinessConfig, ReadinessScorer,
    ReadinessService, ReadinessSource, ReadinessStatus, SessionRecord, SetRecord,
    TrainingHistory,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 23, 6, 0, 0).unwrap()
}

fn training_history() -> TrainingHistory {
    let catalog = ExerciseCatalog::new(vec![ExerciseCatalogEntry {
        id: "squat".to_string(),
        name: "Back Squat".to_string(),
        exercise_type: ExerciseType::Compound,
        muscle_groups: ["quads", "glutes"].iter().map(|m| m.to_string()).collect(),
        default_rest_seconds: 180,
    }]);
    let sessions = (1..=10)
        .map(|i| {
            let at = now() - Duration::days(i * 2);
            let set = SetRecord::new(
                "squat",
                0,
                Prescription::default(),
                Performance {
                    weight: Some(dec!(200)),
                    reps: Some(5),
                    rpe: Some(8.0),
                    rir: None,
                },
                true,
                at,
            );
            SessionRecord::new(format!("s{}", i), at, vec![set])
        })
        .collect();
    TrainingHistory { sessions, catalog }
}

/// Serves a fixed history and counts fetches
struct CountingProvider {
    history: TrainingHistory,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Self {
        CountingProvider {
            history: training_history(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for CountingProvider {
    async fn training_history(&self, _user_id: &str) -> Result<TrainingHistory, HistoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.clone())
    }
}

struct SlowProvider {
    delay: std::time::Duration,
}

#[async_trait]
impl HistoryProvider for SlowProvider {
    async fn training_history(&self, _user_id: &str) -> Result<TrainingHistory, HistoryError> {
        tokio::time::sleep(self.delay).await;
        Ok(training_history())
    }
}

/// A long-tenured user: scoring this history takes far longer than a millisecond
struct LargeHistoryProvider {
    history: TrainingHistory,
}

impl LargeHistoryProvider {
    fn new(sessions: i64) -> Self {
        let mut history = training_history();
        history.sessions = (1..=sessions)
            .map(|i| {
                let at = now() - Duration::minutes(i * 10);
                let sets = (0..3)
                    .map(|s| {
                        let performance = Performance {
                            weight: Some(dec!(200)),
                            reps: Some(5),
                            rpe: Some(8.5),
                            rir: None,
                        };
                        SetRecord::new("squat", s, Prescription::default(), performance, true, at)
                    })
                    .collect();
                SessionRecord::new(format!("s{}", i), at, sets)
            })
            .collect();
        LargeHistoryProvider { history }
    }
}

#[async_trait]
impl HistoryProvider for LargeHistoryProvider {
    async fn training_history(&self, _user_id: &str) -> Result<TrainingHistory, HistoryError> {
        Ok(self.history.clone())
    }
}

struct FailingProvider;

#[async_trait]
impl HistoryProvider for FailingProvider {
    async fn training_history(&self, user_id: &str) -> Result<TrainingHistory, HistoryError> {
        Err(HistoryError::Unavailable {
            user_id: user_id.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

fn service<P: HistoryProvider + 'static>(provider: Arc<P>, timeout_ms: u64) -> ReadinessService<P> {
    let config = ReadinessConfig {
        timeout_ms,
        ..ReadinessConfig::default()
    };
    ReadinessService::new(provider, ReadinessScorer::with_config(config, HistoryAggregator::new()))
}

fn planned(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn test_slow_history_returns_fallback_within_budget() {
    let provider = Arc::new(SlowProvider {
        delay: std::time::Duration::from_millis(2_000),
    });
    let service = service(provider, 50);

    let started = std::time::Instant::now();
    let result = service.readiness("u1", &planned(&["squat"]), now()).await;

    assert!(started.elapsed() < std::time::Duration::from_millis(1_000));
    assert_eq!(result.source, ReadinessSource::Fallback);
    assert_eq!(result.score, 6.5);
    assert_eq!(result.confidence, 0.3);
    assert_eq!(result.status, ReadinessStatus::Moderate);
    assert!(!result.warnings.is_empty());
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn test_slow_scoring_returns_fallback_on_current_thread_runtime() {
    let service = service(Arc::new(LargeHistoryProvider::new(20_000)), 1);

    let result = service.readiness("u1", &planned(&["squat"]), now()).await;

    assert_eq!(result.source, ReadinessSource::Fallback);
    assert_eq!(result.score, 6.5);
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn test_failing_history_returns_fallback() {
    let service = service(Arc::new(FailingProvider), 2_500);

    let result = service.readiness("u1", &[], now()).await;

    assert!(result.is_fallback());
    assert_eq!(result.score, 6.5);
    assert!(result.acwr.is_none());
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let provider = Arc::new(CountingProvider::new());
    let service = service(Arc::clone(&provider), 2_500);

    let first = service.readiness("u1", &planned(&["squat"]), now()).await;
    let second = service.readiness("u1", &planned(&["squat", "squat"]), now()).await;

    assert_eq!(first.source, ReadinessSource::Computed);
    assert_eq!(second.source, ReadinessSource::Cached);
    assert_eq!(second.score, first.score);
    assert_eq!(provider.calls(), 1);

    // another user is computed separately
    let other = service.readiness("u2", &planned(&["squat"]), now()).await;
    assert_eq!(other.source, ReadinessSource::Computed);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_invalidation_forces_recompute() {
    let provider = Arc::new(CountingProvider::new());
    let service = service(Arc::clone(&provider), 2_500);

    service.readiness("u1", &planned(&["squat"]), now()).await;
    service.readiness("u1", &[], now()).await;
    assert_eq!(service.invalidate_user("u1").await, 2);

    let result = service.readiness("u1", &planned(&["squat"]), now()).await;
    assert_eq!(result.source, ReadinessSource::Computed);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_stale_request_is_discarded() {
    let service = service(Arc::new(CountingProvider::new()), 2_500);
    let plan = planned(&["squat"]);

    let first = service.begin_request();
    let second = service.begin_request();

    let (stale, latest) = tokio::join!(
        service.readiness_for(first, "u1", &plan, now()),
        service.readiness_for(second, "u1", &plan, now()),
    );

    assert!(stale.is_none());
    let latest = latest.unwrap();
    assert!(!latest.is_fallback());
    assert!((0.0..=10.0).contains(&latest.score));

    // a token delivers at most once
    assert!(service.readiness_for(second, "u1", &plan, now()).await.is_none());
}
