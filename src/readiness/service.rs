//! Async readiness service
//!
//! Fetches history through a [`HistoryProvider`], scores it on the blocking
//! pool, and races both against a watchdog. A slow or failing fetch
//! yields the bounded fallback result instead of an error. Results are
//! cached per user and planned-exercise set; fallbacks never are.
//!
//! Overlapping requests are reconciled with a [`RequestGate`]: every request
//! takes a monotonically increasing token and only the latest token may
//! deliver its result, exactly once.

use super::{ReadinessConfig, ReadinessResult, ReadinessScorer, ReadinessSource};
use crate::error::{EngineError, ErrorSeverity, HistoryError};
use crate::models::{ExerciseCatalog, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// History and catalog for one user
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub sessions: Vec<SessionRecord>,
    pub catalog: ExerciseCatalog,
}

/// Supplies training history from the host's persistence layer
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn training_history(&self, user_id: &str) -> Result<TrainingHistory, HistoryError>;
}

/// Monotonic request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Latest-request-wins gate
#[derive(Debug, Default)]
pub struct RequestGate {
    latest: AtomicU64,
    delivered: AtomicU64,
}

impl RequestGate {
    pub fn new() -> Self {
        RequestGate::default()
    }

    /// Issue a token that supersedes every earlier one
    pub fn issue(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Claim delivery for `token`
    ///
    /// Succeeds only for the latest token and only the first time.
    pub fn accept(&self, token: RequestToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.delivered.fetch_max(token.0, Ordering::SeqCst) < token.0
    }
}

/// Cache key: user plus the sorted, de-duplicated planned exercises
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadinessCacheKey {
    pub user_id: String,
    pub planned_exercises: Vec<String>,
}

impl ReadinessCacheKey {
    pub fn new(user_id: impl Into<String>, planned_exercises: &[String]) -> Self {
        let mut planned = planned_exercises.to_vec();
        planned.sort();
        planned.dedup();
        ReadinessCacheKey {
            user_id: user_id.into(),
            planned_exercises: planned,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ReadinessResult,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// LRU readiness cache with per-entry TTL
pub struct ReadinessCache {
    store: Mutex<LruCache<ReadinessCacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ReadinessCache {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
        Some(n) => n,
        None => unreachable!(),
    };

    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(Self::DEFAULT_CAPACITY);
        ReadinessCache {
            store: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Unexpired entry marked as cached
    pub async fn get(&self, key: &ReadinessCacheKey) -> Option<ReadinessResult> {
        let mut store = self.store.lock().await;
        let (expired, mut result) = {
            let entry = store.get(key)?;
            (entry.is_expired(), entry.result.clone())
        };
        if expired {
            store.pop(key);
            return None;
        }
        result.source = ReadinessSource::Cached;
        Some(result)
    }

    /// Store a computed result; fallbacks are ignored
    pub async fn put(&self, key: ReadinessCacheKey, result: &ReadinessResult) -> bool {
        if result.is_fallback() {
            return false;
        }
        let entry = CacheEntry {
            result: result.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.store.lock().await.put(key, entry);
        true
    }

    /// Drop every entry for a user; returns the number removed
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        let mut store = self.store.lock().await;
        let keys: Vec<ReadinessCacheKey> = store
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            store.pop(key);
        }
        if !keys.is_empty() {
            tracing::debug!(user_id, removed = keys.len(), "Invalidated readiness cache");
        }
        keys.len()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }
}

/// Readiness with a time budget, request gating and caching
pub struct ReadinessService<P: HistoryProvider + 'static> {
    provider: Arc<P>,
    scorer: Arc<ReadinessScorer>,
    cache: ReadinessCache,
    gate: RequestGate,
    budget: Duration,
}

impl<P: HistoryProvider + 'static> ReadinessService<P> {
    pub fn new(provider: Arc<P>, scorer: ReadinessScorer) -> Self {
        let config = scorer.config().clone();
        ReadinessService {
            provider,
            cache: ReadinessCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            budget: Duration::from_millis(config.timeout_ms),
            scorer: Arc::new(scorer),
            gate: RequestGate::new(),
        }
    }

    pub fn config(&self) -> &ReadinessConfig {
        self.scorer.config()
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn cache(&self) -> &ReadinessCache {
        &self.cache
    }

    /// Start a request; earlier outstanding requests become stale
    pub fn begin_request(&self) -> RequestToken {
        self.gate.issue()
    }

    /// Readiness for `token`, or `None` if a newer request superseded it
    pub async fn readiness_for(
        &self,
        token: RequestToken,
        user_id: &str,
        planned_exercises: &[String],
        now: DateTime<Utc>,
    ) -> Option<ReadinessResult> {
        let result = self.readiness(user_id, planned_exercises, now).await;
        if self.gate.accept(token) {
            Some(result)
        } else {
            tracing::debug!(token = token.value(), "Discarding stale readiness response");
            None
        }
    }

    /// Readiness within the time budget; never fails
    pub async fn readiness(
        &self,
        user_id: &str,
        planned_exercises: &[String],
        now: DateTime<Utc>,
    ) -> ReadinessResult {
        let key = ReadinessCacheKey::new(user_id, planned_exercises);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(user_id, "Readiness cache hit");
            return cached;
        }

        let scorer = Arc::clone(&self.scorer);
        let planned = key.planned_exercises.clone();

        // Scoring runs on the blocking pool so the watchdog can fire even on
        // a current-thread runtime; dropping this future cancels the fetch.
        let work = async {
            let history = self.provider.training_history(user_id).await?;
            tokio::task::spawn_blocking(move || {
                scorer.assess(&history.sessions, &history.catalog, &planned, now)
            })
            .await
            .map_err(|e| EngineError::Internal(format!("readiness scoring failed: {}", e)))
        };

        let outcome: Result<ReadinessResult, EngineError> = tokio::select! {
            result = work => result,
            _ = tokio::time::sleep(self.budget) => Err(EngineError::Timeout {
                operation: "readiness".to_string(),
                budget_ms: self.budget.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(result) => {
                self.cache.put(key, &result).await;
                result
            }
            Err(e) => {
                let retryable = e.is_retryable();
                match e.severity() {
                    ErrorSeverity::Critical | ErrorSeverity::Error => {
                        tracing::error!(user_id, error = %e, retryable, "Readiness fallback")
                    }
                    ErrorSeverity::Warning => {
                        tracing::warn!(user_id, error = %e, retryable, "Readiness fallback")
                    }
                    ErrorSeverity::Info => {
                        tracing::info!(user_id, error = %e, retryable, "Readiness fallback")
                    }
                }
                ReadinessResult::fallback(self.scorer.config(), now, &e)
            }
        }
    }

    /// Drop cached readiness for a user, e.g. after a new session is logged
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        self.cache.invalidate_user(user_id).await
    }
}
