//! Set History Aggregator
//!
//! Normalizes raw session history into per-exercise and per-muscle-group
//! sequences, selects best sets, and derives the session-level time series
//! consumed by the causal suite and the readiness scorer.
//!
//! ## Session proxies
//! - Performance: `(10 - avg RPE) × 10 × (total volume / 1000)`
//! - Fatigue: `clamp(0, 100, (late-third avg RPE - early-third avg RPE) × 15 + 30)`
//! - Intensity: total volume / total reps (mean load per rep)
//!
//! Everything here is a pure transform over borrowed input.

use crate::models::{ExerciseCatalog, ExerciseType, SessionRecord, SetRecord};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Minimum usable sessions before statistical series are produced
    pub min_sessions: usize,

    /// Baseline added to the early/late RPE drift in the fatigue proxy
    pub fatigue_proxy_baseline: f64,

    /// Multiplier applied to the early/late RPE drift
    pub fatigue_proxy_scale: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            min_sessions: 10,
            fatigue_proxy_baseline: 30.0,
            fatigue_proxy_scale: 15.0,
        }
    }
}

/// One point of the session-level series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub fatigue: f64,
    pub performance: f64,
    pub volume: f64,
    pub intensity: f64,
    pub rpe: f64,
}

/// Session-level time series in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSeries {
    pub points: Vec<SessionMetrics>,
}

impl SessionSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn fatigue(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.fatigue).collect()
    }

    pub fn performance(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.performance).collect()
    }

    pub fn volume(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.volume).collect()
    }

    pub fn intensity(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    pub fn rpe(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.rpe).collect()
    }
}

/// Result of requesting statistical series from history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesOutcome {
    Ready(SessionSeries),
    InsufficientData { sessions: usize, required: usize },
}

/// Most recent stimulus received by a muscle group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleStimulus {
    pub muscle: String,
    pub last_trained: DateTime<Utc>,
    /// Compound if any compound exercise hit the muscle in that session
    pub exercise_type: ExerciseType,
}

/// Training load of one session, for workload ratios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLoad {
    pub started_at: DateTime<Utc>,
    pub load: Decimal,
}

/// Core aggregation engine
#[derive(Debug, Clone, Default)]
pub struct HistoryAggregator {
    config: HistoryConfig,
}

impl HistoryAggregator {
    pub fn new() -> Self {
        HistoryAggregator {
            config: HistoryConfig::default(),
        }
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        HistoryAggregator { config }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Completed sets for an exercise ordered by time (oldest first)
    pub fn exercise_sets<'a>(
        &self,
        history: &'a [SessionRecord],
        exercise_id: &str,
    ) -> Vec<&'a SetRecord> {
        let mut sets: Vec<&SetRecord> = history
            .iter()
            .flat_map(|session| session.completed_sets())
            .filter(|set| set.exercise_id() == exercise_id)
            .collect();
        sets.sort_by_key(|set| set.timestamp());
        sets
    }

    /// Best set by e1rm, ties broken by the most recent timestamp
    pub fn best_set<'a>(&self, sets: &[&'a SetRecord]) -> Option<&'a SetRecord> {
        sets.iter()
            .copied()
            .filter(|set| set.is_working_set())
            .filter_map(|set| set.e1rm().map(|e1rm| (e1rm, set)))
            .max_by(|(a_e1rm, a), (b_e1rm, b)| {
                a_e1rm
                    .cmp(b_e1rm)
                    .then_with(|| a.timestamp().cmp(&b.timestamp()))
            })
            .map(|(_, set)| set)
    }

    /// Best set performed at exactly `target_reps`, else the overall best set
    ///
    /// The returned flag is `true` when the set matches the rep target.
    pub fn best_set_for_reps<'a>(
        &self,
        sets: &[&'a SetRecord],
        target_reps: u32,
    ) -> Option<(&'a SetRecord, bool)> {
        let at_target: Vec<&SetRecord> = sets
            .iter()
            .copied()
            .filter(|set| set.actual().reps == Some(target_reps))
            .collect();

        match self.best_set(&at_target) {
            Some(set) => Some((set, true)),
            None => self.best_set(sets).map(|set| (set, false)),
        }
    }

    /// Most recent completed working set for an exercise, searching the
    /// current session before history
    pub fn most_recent_working_set<'a>(
        &self,
        session_sets: &'a [SetRecord],
        history: &'a [SessionRecord],
        exercise_id: &str,
    ) -> Option<&'a SetRecord> {
        let latest_in_session = session_sets
            .iter()
            .filter(|set| set.exercise_id() == exercise_id && set.is_working_set())
            .max_by_key(|set| set.timestamp());

        latest_in_session.or_else(|| {
            self.exercise_sets(history, exercise_id)
                .into_iter()
                .filter(|set| set.is_working_set())
                .last()
        })
    }

    /// Completed sets grouped by muscle group
    pub fn muscle_group_sets<'a>(
        &self,
        history: &'a [SessionRecord],
        catalog: &ExerciseCatalog,
    ) -> BTreeMap<String, Vec<&'a SetRecord>> {
        let mut grouped: BTreeMap<String, Vec<&SetRecord>> = BTreeMap::new();
        for set in history.iter().flat_map(|s| s.completed_sets()) {
            for muscle in catalog.muscle_groups(set.exercise_id()) {
                grouped.entry(muscle).or_default().push(set);
            }
        }
        for sets in grouped.values_mut() {
            sets.sort_by_key(|set| set.timestamp());
        }
        grouped
    }

    /// Last time each muscle group received completed work
    ///
    /// The stimulus counts as compound when any compound exercise hit the
    /// muscle on that last training day.
    pub fn last_trained(
        &self,
        history: &[SessionRecord],
        catalog: &ExerciseCatalog,
    ) -> BTreeMap<String, MuscleStimulus> {
        let mut hits: BTreeMap<String, Vec<(DateTime<Utc>, ExerciseType)>> = BTreeMap::new();
        for set in history.iter().flat_map(|s| s.completed_sets()) {
            let Some(entry) = catalog.get(set.exercise_id()) else {
                continue;
            };
            for muscle in &entry.muscle_groups {
                hits.entry(muscle.clone())
                    .or_default()
                    .push((set.timestamp(), entry.exercise_type));
            }
        }

        hits.into_iter()
            .filter_map(|(muscle, stimuli)| {
                let last_trained = stimuli.iter().map(|(at, _)| *at).max()?;
                let last_day = last_trained.date_naive();
                let compound = stimuli.iter().any(|(at, kind)| {
                    at.date_naive() == last_day && *kind == ExerciseType::Compound
                });
                let exercise_type = if compound {
                    ExerciseType::Compound
                } else {
                    ExerciseType::Isolation
                };
                Some((
                    muscle.clone(),
                    MuscleStimulus {
                        muscle,
                        last_trained,
                        exercise_type,
                    },
                ))
            })
            .collect()
    }

    /// Per-session training load (completed volume), chronological
    pub fn session_loads(&self, history: &[SessionRecord]) -> Vec<SessionLoad> {
        let mut loads: Vec<SessionLoad> = history
            .iter()
            .filter(|s| s.completed_count() > 0)
            .map(|s| SessionLoad {
                started_at: s.started_at,
                load: s.total_volume(),
            })
            .collect();
        loads.sort_by_key(|l| l.started_at);
        loads
    }

    /// Metrics for a single session, `None` if it lacks weight/reps/RPE data
    pub fn session_metrics(&self, session: &SessionRecord) -> Option<SessionMetrics> {
        let working: Vec<&SetRecord> = session
            .completed_sets()
            .filter(|set| set.is_working_set())
            .collect();
        if working.is_empty() {
            return None;
        }

        let average_rpe = session.average_rpe()?;
        let volume = session.total_volume().to_f64()?;
        let reps = session.total_reps();
        let intensity = if reps > 0 { volume / reps as f64 } else { 0.0 };

        let performance = (10.0 - average_rpe) * 10.0 * (volume / 1000.0);
        let fatigue = self.fatigue_proxy(session).unwrap_or(self.config.fatigue_proxy_baseline);

        Some(SessionMetrics {
            session_id: session.id.clone(),
            started_at: session.started_at,
            fatigue,
            performance,
            volume,
            intensity,
            rpe: average_rpe,
        })
    }

    /// Late-third minus early-third RPE drift, scaled into 0-100
    pub fn fatigue_proxy(&self, session: &SessionRecord) -> Option<f64> {
        let mut rated: Vec<&SetRecord> = session
            .completed_sets()
            .filter(|set| set.actual().effective_rpe().is_some())
            .collect();
        if rated.is_empty() {
            return None;
        }
        rated.sort_by_key(|set| (set.timestamp(), set.set_index()));

        let third = (rated.len() / 3).max(1);
        let mean_rpe = |sets: &[&SetRecord]| {
            sets.iter()
                .filter_map(|s| s.actual().effective_rpe())
                .sum::<f64>()
                / sets.len() as f64
        };
        let early = mean_rpe(&rated[..third]);
        let late = mean_rpe(&rated[rated.len() - third..]);

        let raw =
            (late - early) * self.config.fatigue_proxy_scale + self.config.fatigue_proxy_baseline;
        Some(raw.clamp(0.0, 100.0))
    }

    /// Chronological series of every usable session, without a minimum
    pub fn collect_series(&self, history: &[SessionRecord]) -> SessionSeries {
        let mut points: Vec<SessionMetrics> = history
            .iter()
            .filter_map(|session| self.session_metrics(session))
            .collect();
        points.sort_by_key(|p| p.started_at);
        SessionSeries { points }
    }

    /// Session series for the causal suite, gated on the minimum session count
    pub fn session_series(&self, history: &[SessionRecord]) -> SeriesOutcome {
        let series = self.collect_series(history);
        if series.len() < self.config.min_sessions {
            tracing::debug!(
                sessions = series.len(),
                required = self.config.min_sessions,
                "Not enough usable sessions for statistical series"
            );
            return SeriesOutcome::InsufficientData {
                sessions: series.len(),
                required: self.config.min_sessions,
            };
        }
        SeriesOutcome::Ready(series)
    }
}
