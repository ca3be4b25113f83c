//! Fatigue Model
//!
//! Translates RPE overshoot (actual minus prescribed exertion) into a
//! per-muscle-group fatigue score.
//!
//! # Sports Science Background
//!
//! When a lifter reports a higher RPE than the program prescribed for the
//! same load, the gap is a practical marker of accumulated neuromuscular
//! fatigue. Autoregulated programs react to sustained overshoot by dropping
//! load; a single noisy rating should not.
//!
//! # Model
//!
//! - Each completed set with both actual and prescribed RPE (or RIR) yields
//!   an overshoot `o`.
//! - Older sets are discounted exponentially, `w = 0.5^(age / half_life)`,
//!   and ignored entirely beyond the window.
//! - Per muscle: `score = max(0, Σ w·o / max(Σ w, 1))`. With at least one
//!   effective set this is a decayed mean; as history ages out the score fades.
//! - Sets without prescribed RPE still add to decayed volume load.
//!
//! The state is rebuilt from its inputs on every call. Nothing is cached.

use crate::models::{ExerciseCatalog, SetRecord};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Fatigue model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Half-life of a set's contribution, in hours
    pub half_life_hours: f64,

    /// Sets older than this are ignored, in hours
    pub window_hours: f64,

    /// Overshoot score at which fatigue becomes mild (and active)
    pub mild_threshold: f64,

    /// Overshoot score for moderate severity
    pub moderate_threshold: f64,

    /// Overshoot score for high severity
    pub high_threshold: f64,

    /// Overshoot score for critical severity
    pub critical_threshold: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        FatigueConfig {
            half_life_hours: 48.0,
            window_hours: 96.0,
            mild_threshold: 0.5,
            moderate_threshold: 1.0,
            high_threshold: 2.0,
            critical_threshold: 3.0,
        }
    }
}

/// Fatigue severity, ordered mild < moderate < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueSeverity {
    Mild,
    Moderate,
    High,
    Critical,
}

impl FatigueSeverity {
    /// Severity band for an overshoot score, `None` below the mild threshold
    pub fn from_score(score: f64, config: &FatigueConfig) -> Option<Self> {
        match score {
            s if s >= config.critical_threshold => Some(FatigueSeverity::Critical),
            s if s >= config.high_threshold => Some(FatigueSeverity::High),
            s if s >= config.moderate_threshold => Some(FatigueSeverity::Moderate),
            s if s >= config.mild_threshold => Some(FatigueSeverity::Mild),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FatigueSeverity::Mild => "Sets are feeling slightly harder than planned",
            FatigueSeverity::Moderate => "Sets are consistently harder than planned",
            FatigueSeverity::High => "Effort is well above plan; performance is likely compromised",
            FatigueSeverity::Critical => "Effort far exceeds plan; stop or drastically reduce load",
        }
    }
}

impl fmt::Display for FatigueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatigueSeverity::Mild => write!(f, "mild"),
            FatigueSeverity::Moderate => write!(f, "moderate"),
            FatigueSeverity::High => write!(f, "high"),
            FatigueSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Fatigue warning attached to recommendations and session assessments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAlert {
    pub severity: FatigueSeverity,
    pub affected_muscles: BTreeSet<String>,
    pub explanation: String,
    pub scientific_basis: String,
}

const SCIENTIFIC_BASIS: &str = "RPE-based autoregulation: sustained exertion above the \
prescribed RPE at a given load indicates accumulated neuromuscular fatigue and reduced \
readiness to express strength (Helms et al., 2016; Zourdos et al., 2016).";

/// Accumulated fatigue for one muscle group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleFatigue {
    pub muscle: String,
    /// Decayed mean RPE overshoot, floored at zero
    pub score: f64,
    /// Σ w·o
    pub weighted_overshoot: f64,
    /// Σ w over sets with RPE data
    pub effective_sets: f64,
    /// Raw count of sets with RPE data inside the window
    pub rated_sets: usize,
    /// Decayed volume load over all completed sets inside the window
    pub volume_load: f64,
    pub last_stimulus: DateTime<Utc>,
}

/// Whether the fatigue signal carries information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueStatus {
    /// No completed set with RPE data; callers fall back to non-fatigue logic
    Inactive,
    Active,
}

/// Per-muscle fatigue snapshot for a single computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleFatigueState {
    pub computed_at: DateTime<Utc>,
    pub muscles: BTreeMap<String, MuscleFatigue>,
}

impl MuscleFatigueState {
    pub fn status(&self) -> FatigueStatus {
        if self.muscles.values().any(|m| m.rated_sets > 0) {
            FatigueStatus::Active
        } else {
            FatigueStatus::Inactive
        }
    }

    pub fn get(&self, muscle: &str) -> Option<&MuscleFatigue> {
        self.muscles.get(muscle)
    }

    /// Highest score among the given muscles (all muscles if empty)
    pub fn peak_score<'a>(&self, muscles: impl IntoIterator<Item = &'a String>) -> f64 {
        let mut requested = muscles.into_iter().peekable();
        if requested.peek().is_none() {
            return self.muscles.values().map(|m| m.score).fold(0.0, f64::max);
        }
        requested
            .filter_map(|m| self.muscles.get(m))
            .map(|m| m.score)
            .fold(0.0, f64::max)
    }

    /// Largest rated-set count among the given muscles
    pub fn rated_sets<'a>(&self, muscles: impl IntoIterator<Item = &'a String>) -> usize {
        muscles
            .into_iter()
            .filter_map(|m| self.muscles.get(m))
            .map(|m| m.rated_sets)
            .max()
            .unwrap_or(0)
    }
}

/// Fatigue computation engine
#[derive(Debug, Clone, Default)]
pub struct FatigueModel {
    config: FatigueConfig,
}

impl FatigueModel {
    pub fn new() -> Self {
        FatigueModel {
            config: FatigueConfig::default(),
        }
    }

    pub fn with_config(config: FatigueConfig) -> Self {
        FatigueModel { config }
    }

    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    /// Build the per-muscle fatigue state from a set of logged sets
    ///
    /// Sets for exercises missing from the catalog cannot be attributed to a
    /// muscle group and are skipped.
    pub fn fatigue_state<'a>(
        &self,
        sets: impl IntoIterator<Item = &'a SetRecord>,
        catalog: &ExerciseCatalog,
        now: DateTime<Utc>,
    ) -> MuscleFatigueState {
        let mut muscles: BTreeMap<String, MuscleFatigue> = BTreeMap::new();

        for set in sets.into_iter().filter(|s| s.is_completed()) {
            let age_hours = ((now - set.timestamp()).num_seconds() as f64 / 3600.0).max(0.0);
            if age_hours > self.config.window_hours {
                continue;
            }
            let weight = self.decay_weight(age_hours);
            let overshoot = set.rpe_overshoot();
            let volume = set.volume_load().and_then(|v| v.to_f64()).unwrap_or(0.0);

            for muscle in catalog.muscle_groups(set.exercise_id()) {
                let entry = muscles.entry(muscle.clone()).or_insert_with(|| MuscleFatigue {
                    muscle,
                    score: 0.0,
                    weighted_overshoot: 0.0,
                    effective_sets: 0.0,
                    rated_sets: 0,
                    volume_load: 0.0,
                    last_stimulus: set.timestamp(),
                });

                entry.volume_load += weight * volume;
                if set.timestamp() > entry.last_stimulus {
                    entry.last_stimulus = set.timestamp();
                }
                if let Some(o) = overshoot {
                    entry.weighted_overshoot += weight * o;
                    entry.effective_sets += weight;
                    entry.rated_sets += 1;
                }
            }
        }

        for fatigue in muscles.values_mut() {
            fatigue.score = if fatigue.rated_sets == 0 {
                0.0
            } else {
                (fatigue.weighted_overshoot / fatigue.effective_sets.max(1.0)).max(0.0)
            };
        }

        tracing::debug!(
            muscles = muscles.len(),
            active = muscles.values().any(|m| m.rated_sets > 0),
            "Computed muscle fatigue state"
        );

        MuscleFatigueState {
            computed_at: now,
            muscles,
        }
    }

    /// Exponential decay weight for a set of the given age
    pub fn decay_weight(&self, age_hours: f64) -> f64 {
        if self.config.half_life_hours <= 0.0 {
            return 1.0;
        }
        0.5f64.powf(age_hours / self.config.half_life_hours)
    }

    pub fn severity(&self, score: f64) -> Option<FatigueSeverity> {
        FatigueSeverity::from_score(score, &self.config)
    }

    /// Alert for the given muscles if any of them is at least mildly fatigued
    ///
    /// An empty `muscles` set considers every muscle in the state.
    pub fn alert_for(
        &self,
        state: &MuscleFatigueState,
        muscles: &BTreeSet<String>,
    ) -> Option<FatigueAlert> {
        let candidates: Vec<&MuscleFatigue> = if muscles.is_empty() {
            state.muscles.values().collect()
        } else {
            muscles.iter().filter_map(|m| state.get(m)).collect()
        };

        let affected: BTreeSet<String> = candidates
            .iter()
            .filter(|m| m.score >= self.config.mild_threshold)
            .map(|m| m.muscle.clone())
            .collect();
        let peak = candidates.iter().map(|m| m.score).fold(0.0, f64::max);
        let severity = self.severity(peak)?;

        let explanation = format!(
            "{}: average RPE overshoot of {:.1} across {}.",
            severity.description(),
            peak,
            affected.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        Some(FatigueAlert {
            severity,
            affected_muscles: affected,
            explanation,
            scientific_basis: SCIENTIFIC_BASIS.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseCatalogEntry, ExerciseType, Performance, Prescription};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 23, 18, 0, 0).unwrap()
    }

    fn catalog() -> ExerciseCatalog {
        ExerciseCatalog::new(vec![
            ExerciseCatalogEntry {
                id: "bench".to_string(),
                name: "Bench Press".to_string(),
                exercise_type: ExerciseType::Compound,
                muscle_groups: ["chest", "triceps"].iter().map(|s| s.to_string()).collect(),
                default_rest_seconds: 180,
            },
            ExerciseCatalogEntry {
                id: "curl".to_string(),
                name: "Biceps Curl".to_string(),
                exercise_type: ExerciseType::Isolation,
                muscle_groups: ["biceps"].iter().map(|s| s.to_string()).collect(),
                default_rest_seconds: 60,
            },
        ])
    }

    fn set(
        exercise: &str,
        prescribed: Option<f64>,
        actual: Option<f64>,
        at: DateTime<Utc>,
    ) -> SetRecord {
        SetRecord::new(
            exercise,
            0,
            Prescription {
                rpe: prescribed,
                ..Prescription::default()
            },
            Performance {
                weight: Some(dec!(100)),
                reps: Some(5),
                rpe: actual,
                rir: None,
            },
            true,
            at,
        )
    }

    #[test]
    fn test_inactive_without_rpe_data() {
        let sets = vec![set("bench", None, None, now())];
        let state = FatigueModel::new().fatigue_state(&sets, &catalog(), now());

        assert_eq!(state.status(), FatigueStatus::Inactive);
        // volume still counts
        assert!(state.get("chest").unwrap().volume_load > 0.0);
    }

    #[test]
    fn test_consistent_overshoot_is_mean() {
        let sets: Vec<SetRecord> = (0..3)
            .map(|i| set("bench", Some(8.0), Some(9.5), now() - Duration::minutes(10 - i * 3)))
            .collect();
        let model = FatigueModel::new();
        let state = model.fatigue_state(&sets, &catalog(), now());

        let chest = state.get("chest").unwrap();
        assert_eq!(state.status(), FatigueStatus::Active);
        assert_eq!(chest.rated_sets, 3);
        assert!((chest.score - 1.5).abs() < 1e-9);
        assert_eq!(model.severity(chest.score), Some(FatigueSeverity::Moderate));
        assert!(state.get("biceps").is_none());
    }

    #[test]
    fn test_single_old_set_fades() {
        let sets = vec![set("bench", Some(8.0), Some(10.0), now() - Duration::hours(48))];
        let state = FatigueModel::new().fatigue_state(&sets, &catalog(), now());

        // weight 0.5, floor of one effective set => 2.0 * 0.5
        assert!((state.get("chest").unwrap().score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sets_outside_window_ignored() {
        let sets = vec![set("bench", Some(8.0), Some(10.0), now() - Duration::hours(120))];
        let state = FatigueModel::new().fatigue_state(&sets, &catalog(), now());
        assert!(state.muscles.is_empty());
        assert_eq!(state.status(), FatigueStatus::Inactive);
    }

    #[test]
    fn test_undershoot_floors_at_zero() {
        let sets = vec![set("bench", Some(8.0), Some(6.0), now())];
        let state = FatigueModel::new().fatigue_state(&sets, &catalog(), now());
        assert_eq!(state.get("chest").unwrap().score, 0.0);
    }

    #[test]
    fn test_alert_for_affected_muscles() {
        let sets = vec![
            set("bench", Some(8.0), Some(10.0), now()),
            set("bench", Some(8.0), Some(10.0), now()),
            set("curl", Some(8.0), Some(8.0), now()),
        ];
        let model = FatigueModel::new();
        let state = model.fatigue_state(&sets, &catalog(), now());

        let alert = model.alert_for(&state, &BTreeSet::new()).unwrap();
        assert_eq!(alert.severity, FatigueSeverity::High);
        assert!(alert.affected_muscles.contains("chest"));
        assert!(!alert.affected_muscles.contains("biceps"));

        let biceps: BTreeSet<String> = ["biceps".to_string()].into_iter().collect();
        assert!(model.alert_for(&state, &biceps).is_none());
    }

    #[test]
    fn test_severity_ordering() {
        let config = FatigueConfig::default();
        assert_eq!(FatigueSeverity::from_score(0.2, &config), None);
        assert_eq!(FatigueSeverity::from_score(0.5, &config), Some(FatigueSeverity::Mild));
        assert_eq!(FatigueSeverity::from_score(3.4, &config), Some(FatigueSeverity::Critical));
        assert!(FatigueSeverity::Mild < FatigueSeverity::Moderate);
        assert!(FatigueSeverity::High < FatigueSeverity::Critical);
    }
}
