//! Readiness Scorer
//!
//! Blends three signals into a 0-10 pre-session readiness score:
//!
//! - **ACWR** (acute:chronic workload ratio): last 7 days of session load
//!   against the 28-day weekly average.
//! - **Recovery**: time since each planned muscle group was last trained,
//!   on a compound (72 h) or isolation (48 h) curve.
//! - **Performance trend**: the last three sessions' performance proxy
//!   against the three before them.
//!
//! Components that cannot be computed are left out and the remaining
//! weights are renormalized; missing components lower the confidence.
//!
//! The synchronous [`ReadinessScorer`] is a pure function of its inputs. The
//! [`service`] module wraps it with a history provider, watchdog, request
//! gate and cache.

pub mod service;

pub use service::{
    HistoryProvider, ReadinessCache, ReadinessCacheKey, ReadinessService, RequestGate,
    RequestToken, TrainingHistory,
};

use crate::error::EngineError;
use crate::history::{HistoryAggregator, SessionLoad};
use crate::models::{ExerciseCatalog, ExerciseType, SessionRecord};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Readiness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub acute_days: i64,
    pub chronic_days: i64,

    /// ACWR below this is undertrained
    pub undertrained_below: f64,
    /// ACWR up to this is optimal
    pub optimal_max: f64,
    /// ACWR up to this is caution, above is high risk
    pub caution_max: f64,

    pub compound_recovery_hours: f64,
    pub isolation_recovery_hours: f64,
    pub recovered_threshold: f64,
    pub recovering_threshold: f64,

    /// Sessions per side of the trend comparison
    pub trend_window: usize,
    /// Relative change treated as stable
    pub trend_tolerance: f64,

    pub acwr_weight: f64,
    pub recovery_weight: f64,
    pub trend_weight: f64,

    pub high_threshold: f64,
    pub moderate_threshold: f64,

    /// Sessions in the chronic window for full history confidence
    pub full_confidence_sessions: usize,

    /// Watchdog budget for fetch + score
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,

    pub fallback_score: f64,
    pub fallback_confidence: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessConfig {
            acute_days: 7,
            chronic_days: 28,
            undertrained_below: 0.8,
            optimal_max: 1.3,
            caution_max: 1.5,
            compound_recovery_hours: 72.0,
            isolation_recovery_hours: 48.0,
            recovered_threshold: 0.9,
            recovering_threshold: 0.6,
            trend_window: 3,
            trend_tolerance: 0.05,
            acwr_weight: 0.4,
            recovery_weight: 0.4,
            trend_weight: 0.2,
            high_threshold: 7.5,
            moderate_threshold: 5.0,
            full_confidence_sessions: 12,
            timeout_ms: 2500,
            cache_ttl_secs: 300,
            cache_capacity: 256,
            fallback_score: 6.5,
            fallback_confidence: 0.3,
        }
    }
}

/// ACWR band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcwrStatus {
    /// Below 0.8: detraining
    Undertrained,
    /// 0.8-1.3: the sweet spot
    Optimal,
    /// 1.3-1.5: elevated injury risk
    Caution,
    /// Above 1.5: high injury risk
    HighRisk,
}

impl AcwrStatus {
    pub fn from_ratio(ratio: f64, config: &ReadinessConfig) -> Self {
        if ratio < config.undertrained_below {
            AcwrStatus::Undertrained
        } else if ratio <= config.optimal_max {
            AcwrStatus::Optimal
        } else if ratio <= config.caution_max {
            AcwrStatus::Caution
        } else {
            AcwrStatus::HighRisk
        }
    }

    /// Component score in [0, 1]
    fn component_score(&self) -> f64 {
        match self {
            AcwrStatus::Optimal => 1.0,
            AcwrStatus::Undertrained => 0.75,
            AcwrStatus::Caution => 0.5,
            AcwrStatus::HighRisk => 0.2,
        }
    }
}

/// Acute:chronic workload ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acwr {
    /// Sum of session load in the acute window
    pub acute_load: Decimal,
    /// Chronic window load expressed per acute window (28-day sum / 4)
    pub chronic_load: Decimal,
    pub ratio: f64,
    pub status: AcwrStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Recovered,
    Recovering,
    Fatigued,
}

/// Recovery of one muscle group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleRecovery {
    pub muscle: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub hours_since: Option<f64>,
    pub required_hours: f64,
    /// 0.0-1.0
    pub recovery: f64,
    pub status: RecoveryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

/// Recent vs previous performance proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrend {
    pub direction: TrendDirection,
    pub recent_mean: f64,
    pub previous_mean: f64,
    /// Relative change; `None` when the previous mean is zero
    pub change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    High,
    Moderate,
    Low,
}

/// Where a readiness result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessSource {
    Computed,
    Cached,
    Fallback,
}

/// Per-component scores in [0, 1]; `None` when unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessComponents {
    pub acwr: Option<f64>,
    pub recovery: Option<f64>,
    pub trend: Option<f64>,
}

/// Pre-session readiness assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessResult {
    /// 0-10, one decimal
    pub score: f64,
    pub status: ReadinessStatus,
    /// 0.0-1.0
    pub confidence: f64,
    pub acwr: Option<Acwr>,
    pub muscle_recovery: Vec<MuscleRecovery>,
    pub trend: Option<PerformanceTrend>,
    pub components: ReadinessComponents,
    /// Most adverse first
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub source: ReadinessSource,
    pub computed_at: DateTime<Utc>,
}

impl ReadinessResult {
    /// Bounded conservative result used when computation cannot finish
    pub fn fallback(config: &ReadinessConfig, now: DateTime<Utc>, cause: &EngineError) -> Self {
        ReadinessResult {
            score: config.fallback_score,
            status: ReadinessStatus::Moderate,
            confidence: config.fallback_confidence,
            acwr: None,
            muscle_recovery: Vec::new(),
            trend: None,
            components: ReadinessComponents::default(),
            warnings: vec![
                "Readiness data is incomplete; showing a conservative estimate.".to_string(),
                cause.user_message(),
            ],
            recommendations: vec![
                "Start with your warm-up sets and adjust based on how they feel.".to_string(),
            ],
            source: ReadinessSource::Fallback,
            computed_at: now,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ReadinessSource::Fallback
    }
}

/// Message with an adversity rank used for ordering
struct Advice {
    rank: u8,
    warning: Option<String>,
    recommendation: Option<String>,
}

/// Pre-session readiness calculator
#[derive(Debug, Clone, Default)]
pub struct ReadinessScorer {
    config: ReadinessConfig,
    aggregator: HistoryAggregator,
}

impl ReadinessScorer {
    pub fn new() -> Self {
        ReadinessScorer::default()
    }

    pub fn with_config(config: ReadinessConfig, aggregator: HistoryAggregator) -> Self {
        ReadinessScorer { config, aggregator }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Compute readiness for a session about to train `planned_exercises`
    ///
    /// With no planned exercises every muscle in the history is considered.
    pub fn assess(
        &self,
        history: &[SessionRecord],
        catalog: &ExerciseCatalog,
        planned_exercises: &[String],
        now: DateTime<Utc>,
    ) -> ReadinessResult {
        let loads = self.aggregator.session_loads(history);
        let acwr = self.acwr(&loads, now);
        let muscle_recovery = self.muscle_recovery(history, catalog, planned_exercises, now);
        let trend = self.performance_trend(history);

        let components = ReadinessComponents {
            acwr: acwr.as_ref().map(|a| a.status.component_score()),
            recovery: Some(if muscle_recovery.is_empty() {
                1.0
            } else {
                muscle_recovery.iter().map(|m| m.recovery).sum::<f64>()
                    / muscle_recovery.len() as f64
            }),
            trend: trend.as_ref().map(|t| match t.direction {
                TrendDirection::Improving => 1.0,
                TrendDirection::Stable => 0.8,
                TrendDirection::Declining => 0.5,
            }),
        };

        let weighted = [
            (components.acwr, self.config.acwr_weight),
            (components.recovery, self.config.recovery_weight),
            (components.trend, self.config.trend_weight),
        ];
        let weight_sum: f64 = weighted.iter().filter(|(c, _)| c.is_some()).map(|(_, w)| w).sum();
        let blended: f64 = weighted
            .iter()
            .filter_map(|(c, w)| c.map(|c| c * w))
            .sum::<f64>()
            / weight_sum.max(f64::EPSILON);
        let score = (blended * 100.0).round() / 10.0;

        let status = if score >= self.config.high_threshold {
            ReadinessStatus::High
        } else if score >= self.config.moderate_threshold {
            ReadinessStatus::Moderate
        } else {
            ReadinessStatus::Low
        };

        let chronic_start = now - Duration::days(self.config.chronic_days);
        let recent_sessions = loads
            .iter()
            .filter(|l| l.started_at > chronic_start && l.started_at <= now)
            .count();
        let history_share =
            (recent_sessions as f64 / self.config.full_confidence_sessions.max(1) as f64).min(1.0);
        let confidence = (0.2
            + 0.4 * history_share
            + if acwr.is_some() { 0.2 } else { 0.0 }
            + if trend.is_some() { 0.2 } else { 0.0 })
        .min(1.0);

        let (warnings, recommendations) =
            self.advice(acwr.as_ref(), &muscle_recovery, trend.as_ref());

        tracing::info!(
            score,
            status = ?status,
            confidence,
            acwr = acwr.as_ref().map(|a| a.ratio),
            sessions_28d = recent_sessions,
            "Readiness computed"
        );

        ReadinessResult {
            score,
            status,
            confidence,
            acwr,
            muscle_recovery,
            trend,
            components,
            warnings,
            recommendations,
            source: ReadinessSource::Computed,
            computed_at: now,
        }
    }

    /// ACWR over `(now - 7d, now]` vs `(now - 28d, now]`; `None` without chronic load
    pub fn acwr(&self, loads: &[SessionLoad], now: DateTime<Utc>) -> Option<Acwr> {
        let window_sum = |days: i64| -> Decimal {
            let start = now - Duration::days(days);
            loads
                .iter()
                .filter(|l| l.started_at > start && l.started_at <= now)
                .map(|l| l.load)
                .sum()
        };

        let acute_load = window_sum(self.config.acute_days);
        let weeks =
            Decimal::from(self.config.chronic_days) / Decimal::from(self.config.acute_days.max(1));
        if weeks.is_zero() {
            return None;
        }
        let chronic_load = window_sum(self.config.chronic_days) / weeks;
        if chronic_load <= Decimal::ZERO {
            return None;
        }

        let ratio = (acute_load / chronic_load).to_f64()?;
        let status = AcwrStatus::from_ratio(ratio, &self.config);
        tracing::debug!(%acute_load, %chronic_load, ratio, "ACWR computed");

        Some(Acwr {
            acute_load,
            chronic_load,
            ratio,
            status,
        })
    }

    /// Recovery for planned muscles (or every trained muscle)
    pub fn muscle_recovery(
        &self,
        history: &[SessionRecord],
        catalog: &ExerciseCatalog,
        planned_exercises: &[String],
        now: DateTime<Utc>,
    ) -> Vec<MuscleRecovery> {
        let last_trained = self.aggregator.last_trained(history, catalog);
        let muscles: BTreeSet<String> = if planned_exercises.is_empty() {
            last_trained.keys().cloned().collect()
        } else {
            catalog.muscle_groups_for(planned_exercises)
        };

        muscles
            .into_iter()
            .map(|muscle| match last_trained.get(&muscle) {
                Some(stimulus) => {
                    let required_hours = match stimulus.exercise_type {
                        ExerciseType::Compound => self.config.compound_recovery_hours,
                        ExerciseType::Isolation => self.config.isolation_recovery_hours,
                    };
                    let hours =
                        ((now - stimulus.last_trained).num_seconds() as f64 / 3600.0).max(0.0);
                    let recovery = self.recovery_fraction(hours, required_hours);
                    MuscleRecovery {
                        muscle,
                        last_trained: Some(stimulus.last_trained),
                        hours_since: Some(hours),
                        required_hours,
                        recovery,
                        status: self.recovery_status(recovery),
                    }
                }
                None => MuscleRecovery {
                    muscle,
                    last_trained: None,
                    hours_since: None,
                    required_hours: self.config.isolation_recovery_hours,
                    recovery: 1.0,
                    status: RecoveryStatus::Recovered,
                },
            })
            .collect()
    }

    /// `1 - exp(-ln20 · h / required)`, 95% recovered at the required time
    pub fn recovery_fraction(&self, hours: f64, required_hours: f64) -> f64 {
        if required_hours <= 0.0 {
            return 1.0;
        }
        (1.0 - (-(20f64.ln()) * hours / required_hours).exp()).clamp(0.0, 1.0)
    }

    fn recovery_status(&self, recovery: f64) -> RecoveryStatus {
        if recovery >= self.config.recovered_threshold {
            RecoveryStatus::Recovered
        } else if recovery >= self.config.recovering_threshold {
            RecoveryStatus::Recovering
        } else {
            RecoveryStatus::Fatigued
        }
    }

    /// Last `trend_window` sessions against the preceding ones; needs four or more
    pub fn performance_trend(&self, history: &[SessionRecord]) -> Option<PerformanceTrend> {
        let performance = self.aggregator.collect_series(history).performance();
        let window = self.config.trend_window.max(1);
        if performance.len() < (window + 1).max(4) {
            return None;
        }

        let split = performance.len() - window;
        let recent = &performance[split..];
        let previous = &performance[split.saturating_sub(window)..split];
        let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
        let recent_mean = mean(recent);
        let previous_mean = mean(previous);

        let change = (previous_mean.abs() > f64::EPSILON)
            .then(|| (recent_mean - previous_mean) / previous_mean.abs());
        let direction = match change {
            Some(c) if c > self.config.trend_tolerance => TrendDirection::Improving,
            Some(c) if c < -self.config.trend_tolerance => TrendDirection::Declining,
            Some(_) => TrendDirection::Stable,
            None if recent_mean > f64::EPSILON => TrendDirection::Improving,
            None if recent_mean < -f64::EPSILON => TrendDirection::Declining,
            None => TrendDirection::Stable,
        };

        Some(PerformanceTrend {
            direction,
            recent_mean,
            previous_mean,
            change,
        })
    }

    fn advice(
        &self,
        acwr: Option<&Acwr>,
        recovery: &[MuscleRecovery],
        trend: Option<&PerformanceTrend>,
    ) -> (Vec<String>, Vec<String>) {
        let mut advice: Vec<Advice> = Vec::new();

        if let Some(acwr) = acwr {
            let item = match acwr.status {
                AcwrStatus::HighRisk => Advice {
                    rank: 4,
                    warning: Some(format!(
                        "Training load spiked: ACWR {:.2} is in the high-risk zone.",
                        acwr.ratio
                    )),
                    recommendation: Some(
                        "Cut volume by 20-30% today and avoid max-effort attempts.".to_string(),
                    ),
                },
                AcwrStatus::Caution => Advice {
                    rank: 2,
                    warning: Some(format!(
                        "Training load is climbing quickly (ACWR {:.2}).",
                        acwr.ratio
                    )),
                    recommendation: Some(
                        "Keep intensity as planned but skip extra volume.".to_string(),
                    ),
                },
                AcwrStatus::Undertrained => Advice {
                    rank: 1,
                    warning: None,
                    recommendation: Some(format!(
                        "Recent load is below your usual (ACWR {:.2}); build back gradually.",
                        acwr.ratio
                    )),
                },
                AcwrStatus::Optimal => Advice {
                    rank: 0,
                    warning: None,
                    recommendation: Some("Training load is in the optimal range.".to_string()),
                },
            };
            advice.push(item);
        }

        let fatigued: Vec<&str> = recovery
            .iter()
            .filter(|m| m.status == RecoveryStatus::Fatigued)
            .map(|m| m.muscle.as_str())
            .collect();
        let recovering: Vec<&str> = recovery
            .iter()
            .filter(|m| m.status == RecoveryStatus::Recovering)
            .map(|m| m.muscle.as_str())
            .collect();
        if !fatigued.is_empty() {
            advice.push(Advice {
                rank: 3,
                warning: Some(format!("Not yet recovered: {}.", fatigued.join(", "))),
                recommendation: Some(
                    "Reduce load on these muscle groups or train something else today."
                        .to_string(),
                ),
            });
        } else if !recovering.is_empty() {
            advice.push(Advice {
                rank: 1,
                warning: None,
                recommendation: Some(format!(
                    "Still recovering: {}. Warm up thoroughly.",
                    recovering.join(", ")
                )),
            });
        }

        if let Some(trend) = trend {
            if trend.direction == TrendDirection::Declining {
                advice.push(Advice {
                    rank: 2,
                    warning: Some("Session performance has been declining.".to_string()),
                    recommendation: Some("Consider a deload week if this continues.".to_string()),
                });
            }
        }

        advice.sort_by(|a, b| b.rank.cmp(&a.rank));
        let warnings = advice.iter().filter_map(|a| a.warning.clone()).collect();
        let recommendations = advice.into_iter().filter_map(|a| a.recommendation).collect();
        (warnings, recommendations)
    }
}
