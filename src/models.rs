//! Core training data structures
//!
//! Set and session records are read-only snapshots supplied by the host's
//! persistence layer. Derived metrics (e1rm, volume load) are computed once
//! at construction and cannot drift from the inputs: the only way to build a
//! [`SetRecord`] is through [`SetRecord::new`] or deserialization of a
//! [`RawSetRecord`], both of which sanitize and derive.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Exercise classification used by recovery curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    /// Multi-joint lift (squat, bench, deadlift, row)
    Compound,
    /// Single-joint accessory work
    Isolation,
}

/// Unit a weight was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
    Lb,
}

impl WeightUnit {
    /// Pounds per kilogram
    pub const LB_PER_KG: Decimal = dec!(2.20462);

    /// Convert a weight from this unit into `target`
    pub fn convert(&self, weight: Decimal, target: WeightUnit) -> Decimal {
        match (self, target) {
            (WeightUnit::Kg, WeightUnit::Lb) => weight.saturating_mul(Self::LB_PER_KG),
            (WeightUnit::Lb, WeightUnit::Kg) => weight / Self::LB_PER_KG,
            _ => weight,
        }
    }
}

/// Prescribed targets for a set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub rir: Option<f64>,
    /// Percentage of one-rep max (e.g. 75 for 75%)
    pub percent_of_1rm: Option<Decimal>,
}

impl Prescription {
    /// Prescribed RPE, falling back to `10 - RIR`
    pub fn effective_rpe(&self) -> Option<f64> {
        self.rpe.or_else(|| self.rir.map(|rir| 10.0 - rir))
    }
}

/// What the lifter actually did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub weight: Option<Decimal>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub rir: Option<f64>,
}

impl Performance {
    /// Reported RPE, falling back to `10 - RIR`
    pub fn effective_rpe(&self) -> Option<f64> {
        self.rpe.or_else(|| self.rir.map(|rir| 10.0 - rir))
    }
}

/// Metrics derived from weight and reps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    /// Estimated one-rep max (Epley), rounded to a whole unit
    pub e1rm: Option<Decimal>,
    /// weight × reps
    pub volume_load: Option<Decimal>,
}

impl DerivedMetrics {
    /// Derive e1rm and volume load from a weight/reps pair
    ///
    /// Epley: `e1rm = weight × (1 + reps / 30)`. A metric that would overflow
    /// is left unset.
    pub fn from_performance(weight: Option<Decimal>, reps: Option<u32>) -> Self {
        match (weight, reps) {
            (Some(weight), Some(reps)) => Self {
                e1rm: epley_e1rm(weight, reps),
                volume_load: weight.checked_mul(Decimal::from(reps)),
            },
            _ => Self::default(),
        }
    }
}

/// Epley estimated one-rep max rounded to the nearest whole unit
///
/// `None` when the product does not fit in a `Decimal`.
pub fn epley_e1rm(weight: Decimal, reps: u32) -> Option<Decimal> {
    let factor = Decimal::ONE + Decimal::from(reps) / dec!(30);
    weight
        .checked_mul(factor)
        .map(|e1rm| e1rm.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Weight that would produce `e1rm` at `reps` (inverse Epley, unrounded)
pub fn epley_weight_for_reps(e1rm: Decimal, reps: u32) -> Decimal {
    let factor = Decimal::ONE + Decimal::from(reps) / dec!(30);
    e1rm / factor
}

/// A single logged set
///
/// Immutable once built; use [`SetRecord::with_performance`] to obtain a
/// corrected copy with re-derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSetRecord", into = "RawSetRecord")]
pub struct SetRecord {
    exercise_id: String,
    set_index: u32,
    prescribed: Prescription,
    actual: Performance,
    completed: bool,
    timestamp: DateTime<Utc>,
    derived: DerivedMetrics,
}

impl SetRecord {
    pub fn new(
        exercise_id: impl Into<String>,
        set_index: u32,
        prescribed: Prescription,
        actual: Performance,
        completed: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let derived = DerivedMetrics::from_performance(actual.weight, actual.reps);
        Self {
            exercise_id: exercise_id.into(),
            set_index,
            prescribed,
            actual,
            completed,
            timestamp,
            derived,
        }
    }

    /// Copy of this set with a corrected performance; derived metrics are recomputed
    pub fn with_performance(&self, actual: Performance) -> Self {
        Self::new(
            self.exercise_id.clone(),
            self.set_index,
            self.prescribed.clone(),
            actual,
            self.completed,
            self.timestamp,
        )
    }

    /// Copy of this set with a different completion flag
    pub fn with_completed(&self, completed: bool) -> Self {
        Self {
            completed,
            ..self.clone()
        }
    }

    pub fn exercise_id(&self) -> &str {
        &self.exercise_id
    }

    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    pub fn prescribed(&self) -> &Prescription {
        &self.prescribed
    }

    pub fn actual(&self) -> &Performance {
        &self.actual
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn derived(&self) -> DerivedMetrics {
        self.derived
    }

    pub fn e1rm(&self) -> Option<Decimal> {
        self.derived.e1rm
    }

    pub fn volume_load(&self) -> Option<Decimal> {
        self.derived.volume_load
    }

    /// Completed with both weight and reps
    pub fn is_working_set(&self) -> bool {
        self.completed && self.actual.weight.is_some() && self.actual.reps.is_some()
    }

    /// `actual RPE - prescribed RPE` when both are known
    pub fn rpe_overshoot(&self) -> Option<f64> {
        Some(self.actual.effective_rpe()? - self.prescribed.effective_rpe()?)
    }
}

/// Unvalidated set data as it arrives from storage or sync
///
/// Numeric fields are plain floats so that NaN/negative garbage can be
/// detected and dropped instead of poisoning aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSetRecord {
    pub exercise_id: String,
    pub set_index: u32,
    pub prescribed_reps: Option<f64>,
    pub prescribed_rpe: Option<f64>,
    pub prescribed_rir: Option<f64>,
    pub percent_of_1rm: Option<f64>,
    pub weight: Option<f64>,
    pub reps: Option<f64>,
    pub rpe: Option<f64>,
    pub rir: Option<f64>,
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<RawSetRecord> for SetRecord {
    fn from(raw: RawSetRecord) -> Self {
        let prescribed = Prescription {
            reps: sanitize_reps(raw.prescribed_reps),
            rpe: sanitize_rpe(raw.prescribed_rpe),
            rir: sanitize_rir(raw.prescribed_rir),
            percent_of_1rm: sanitize_weight(raw.percent_of_1rm),
        };
        let actual = Performance {
            weight: sanitize_weight(raw.weight),
            reps: sanitize_reps(raw.reps),
            rpe: sanitize_rpe(raw.rpe),
            rir: sanitize_rir(raw.rir),
        };

        if (raw.weight.is_some() && actual.weight.is_none())
            || (raw.reps.is_some() && actual.reps.is_none())
            || (raw.rpe.is_some() && actual.rpe.is_none())
        {
            tracing::warn!(
                exercise_id = %raw.exercise_id,
                set_index = raw.set_index,
                "Dropped malformed numeric input from set record"
            );
        }

        SetRecord::new(
            raw.exercise_id,
            raw.set_index,
            prescribed,
            actual,
            raw.completed,
            raw.timestamp,
        )
    }
}

impl From<SetRecord> for RawSetRecord {
    fn from(record: SetRecord) -> Self {
        RawSetRecord {
            exercise_id: record.exercise_id,
            set_index: record.set_index,
            prescribed_reps: record.prescribed.reps.map(f64::from),
            prescribed_rpe: record.prescribed.rpe,
            prescribed_rir: record.prescribed.rir,
            percent_of_1rm: record.prescribed.percent_of_1rm.and_then(|p| p.to_f64()),
            weight: record.actual.weight.and_then(|w| w.to_f64()),
            reps: record.actual.reps.map(f64::from),
            rpe: record.actual.rpe,
            rir: record.actual.rir,
            completed: record.completed,
            timestamp: record.timestamp,
        }
    }
}

/// Heaviest weight (or percentage) accepted from raw input
pub const MAX_WEIGHT: f64 = 10_000.0;

/// Finite weight (or percentage) in `[0, MAX_WEIGHT]`
pub fn sanitize_weight(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|v| v.is_finite() && (0.0..=MAX_WEIGHT).contains(v))
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(3))
}

/// Finite, non-negative rep count rounded to a whole number
pub fn sanitize_reps(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.round() as u32)
}

/// RPE on the 1-10 scale
pub fn sanitize_rpe(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (1.0..=10.0).contains(v))
}

/// Reps in reserve on the 0-10 scale
pub fn sanitize_rir(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (0.0..=10.0).contains(v))
}

/// A logged training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Sets in logging order
    pub sets: Vec<SetRecord>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, started_at: DateTime<Utc>, sets: Vec<SetRecord>) -> Self {
        Self {
            id: id.into(),
            started_at,
            ended_at: None,
            sets,
        }
    }

    pub fn completed_sets(&self) -> impl Iterator<Item = &SetRecord> {
        self.sets.iter().filter(|s| s.completed)
    }

    /// Total volume load over completed sets
    pub fn total_volume(&self) -> Decimal {
        self.completed_sets()
            .filter_map(|s| s.volume_load())
            .fold(Decimal::ZERO, |total, volume| total.saturating_add(volume))
    }

    /// Total reps over completed sets with a recorded weight and rep count
    pub fn total_reps(&self) -> u32 {
        self.completed_sets()
            .filter(|s| s.is_working_set())
            .filter_map(|s| s.actual.reps)
            .sum()
    }

    /// Average RPE over completed sets that report one
    pub fn average_rpe(&self) -> Option<f64> {
        let rpes: Vec<f64> = self
            .completed_sets()
            .filter_map(|s| s.actual.effective_rpe())
            .collect();
        if rpes.is_empty() {
            None
        } else {
            Some(rpes.iter().sum::<f64>() / rpes.len() as f64)
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed_sets().count()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            started_at: self.started_at,
            total_sets: self.sets.len(),
            completed_sets: self.completed_count(),
            total_volume: self.total_volume(),
            average_rpe: self.average_rpe(),
        }
    }
}

/// Aggregate totals of a session (completed sets only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub total_sets: usize,
    pub completed_sets: usize,
    pub total_volume: Decimal,
    pub average_rpe: Option<f64>,
}

/// Exercise reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseCatalogEntry {
    pub id: String,
    pub name: String,
    pub exercise_type: ExerciseType,
    pub muscle_groups: BTreeSet<String>,
    pub default_rest_seconds: u32,
}

/// Read-only lookup of exercise metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseCatalog {
    entries: HashMap<String, ExerciseCatalogEntry>,
}

impl ExerciseCatalog {
    pub fn new(entries: impl IntoIterator<Item = ExerciseCatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn get(&self, exercise_id: &str) -> Option<&ExerciseCatalogEntry> {
        self.entries.get(exercise_id)
    }

    /// Muscle groups trained by an exercise; empty if unknown
    pub fn muscle_groups(&self, exercise_id: &str) -> BTreeSet<String> {
        self.get(exercise_id)
            .map(|e| e.muscle_groups.clone())
            .unwrap_or_default()
    }

    pub fn exercise_type(&self, exercise_id: &str) -> Option<ExerciseType> {
        self.get(exercise_id).map(|e| e.exercise_type)
    }

    /// Union of muscle groups across several exercises
    pub fn muscle_groups_for<'a>(
        &self,
        exercise_ids: impl IntoIterator<Item = &'a String>,
    ) -> BTreeSet<String> {
        exercise_ids
            .into_iter()
            .flat_map(|id| self.muscle_groups(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a one-rep max was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxSource {
    Tested,
    Estimated,
}

/// A user's one-rep max for an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMaxRecord {
    pub exercise_id: String,
    pub weight: Decimal,
    pub unit: WeightUnit,
    pub source: MaxSource,
    pub test_date: NaiveDate,
}

impl UserMaxRecord {
    /// Max expressed in `unit`
    pub fn weight_in(&self, unit: WeightUnit) -> Decimal {
        self.unit.convert(self.weight, unit)
    }
}

/// Snap a weight to the nearest 0.5 of the tracked unit
pub fn snap_weight(weight: Decimal) -> Decimal {
    (weight
        .saturating_mul(dec!(2))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        / dec!(2))
    .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 23, 18, 0, 0).unwrap()
    }

    fn set(weight: Decimal, reps: u32) -> SetRecord {
        SetRecord::new(
            "squat",
            0,
            Prescription::default(),
            Performance {
                weight: Some(weight),
                reps: Some(reps),
                rpe: Some(8.0),
                rir: None,
            },
            true,
            ts(),
        )
    }

    #[test]
    fn test_epley_e1rm() {
        assert_eq!(epley_e1rm(dec!(225), 5), Some(dec!(263)));
        assert_eq!(epley_e1rm(dec!(100), 10), Some(dec!(133)));
        assert_eq!(epley_e1rm(dec!(100), 0), Some(dec!(100)));
        assert_eq!(epley_e1rm(Decimal::MAX, 5), None);
    }

    #[test]
    fn test_derived_metrics() {
        let record = set(dec!(225), 5);
        assert_eq!(record.volume_load(), Some(dec!(1125)));
        assert_eq!(record.e1rm(), Some(dec!(263)));
    }

    #[test]
    fn test_with_performance_recomputes() {
        let record = set(dec!(100), 5);
        let corrected = record.with_performance(Performance {
            weight: Some(dec!(110)),
            reps: Some(5),
            rpe: None,
            rir: None,
        });
        assert_eq!(corrected.volume_load(), Some(dec!(550)));
        assert_eq!(record.volume_load(), Some(dec!(500)));
    }

    #[test]
    fn test_missing_weight_has_no_derived_metrics() {
        let record = SetRecord::new(
            "pullup",
            1,
            Prescription::default(),
            Performance {
                weight: None,
                reps: Some(8),
                rpe: None,
                rir: None,
            },
            true,
            ts(),
        );
        assert_eq!(record.e1rm(), None);
        assert_eq!(record.volume_load(), None);
        assert!(!record.is_working_set());
    }

    #[test]
    fn test_raw_sanitization() {
        let raw = RawSetRecord {
            exercise_id: "bench".to_string(),
            weight: Some(f64::NAN),
            reps: Some(5.0),
            rpe: Some(14.0),
            rir: Some(2.0),
            completed: true,
            timestamp: ts(),
            ..RawSetRecord::default()
        };
        let record = SetRecord::from(raw);
        assert_eq!(record.actual.weight, None);
        assert_eq!(record.actual.reps, Some(5));
        assert_eq!(record.actual.rpe, None);
        assert_eq!(record.actual.effective_rpe(), Some(8.0));
        assert_eq!(record.volume_load(), None);
    }

    #[test]
    fn test_rpe_overshoot_uses_rir_fallback() {
        let record = SetRecord::new(
            "squat",
            0,
            Prescription {
                rir: Some(2.0),
                ..Prescription::default()
            },
            Performance {
                weight: Some(dec!(100)),
                reps: Some(5),
                rpe: Some(9.5),
                rir: None,
            },
            true,
            ts(),
        );
        assert_eq!(record.rpe_overshoot(), Some(1.5));
    }

    #[test]
    fn test_session_totals_use_completed_sets_only() {
        let skipped = set(dec!(300), 5).with_completed(false);
        let session = SessionRecord::new("s1", ts(), vec![set(dec!(100), 5), skipped]);

        assert_eq!(session.total_volume(), dec!(500));
        assert_eq!(session.completed_count(), 1);
        assert_eq!(session.average_rpe(), Some(8.0));
        assert_eq!(session.summary().total_sets, 2);
    }

    #[test]
    fn test_snap_weight() {
        assert_eq!(snap_weight(dec!(101.2)), dec!(101));
        assert_eq!(snap_weight(dec!(101.3)), dec!(101.5));
        assert_eq!(snap_weight(dec!(101.75)), dec!(102));
    }

    #[test]
    fn test_unit_conversion() {
        let max = UserMaxRecord {
            exercise_id: "squat".to_string(),
            weight: dec!(100),
            unit: WeightUnit::Kg,
            source: MaxSource::Tested,
            test_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        };
        assert_eq!(max.weight_in(WeightUnit::Lb), dec!(220.462));
        assert_eq!(max.weight_in(WeightUnit::Kg), dec!(100));
    }

    #[test]
    fn test_serde_round_trip_rederives() {
        let json = r#"{
            "exercise_id": "bench", "set_index": 2, "weight": 100.0, "reps": 5.0,
            "rpe": 8.5, "completed": true, "timestamp": "2024-09-23T18:00:00Z"
        }"#;
        let record: SetRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.volume_load(), Some(dec!(500)));
        assert_eq!(record.actual.rpe, Some(8.5));

        let encoded = serde_json::to_string(&record).unwrap();
        let back: SetRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_oversized_weight_is_dropped_not_panicking() {
        let json = r#"{
            "exercise_id": "squat", "weight": 5e28, "reps": 5.0,
            "completed": true, "timestamp": "2024-09-23T18:00:00Z"
        }"#;
        let record: SetRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.actual().weight, None);
        assert_eq!(record.actual().reps, Some(5));
        assert_eq!(record.volume_load(), None);
        assert_eq!(record.e1rm(), None);
        assert_eq!(sanitize_weight(Some(MAX_WEIGHT)), Some(dec!(10000)));
        assert_eq!(sanitize_weight(Some(MAX_WEIGHT + 1.0)), None);
    }

    #[test]
    fn test_overflowing_metrics_are_unset() {
        let derived = DerivedMetrics::from_performance(Some(Decimal::MAX), Some(5));
        assert_eq!(derived.volume_load, None);
        assert_eq!(derived.e1rm, None);

        let session = SessionRecord::new(
            "s1",
            ts(),
            vec![set(Decimal::MAX, 1), set(Decimal::MAX, 1)],
        );
        assert_eq!(session.total_volume(), Decimal::MAX);
    }

    #[test]
    fn test_changes_go_through_rederiving_copies() {
        let record = set(dec!(100), 5);
        let heavier = record.with_performance(Performance {
            weight: Some(dec!(200)),
            ..record.actual().clone()
        });
        assert_eq!(heavier.volume_load(), Some(dec!(1000)));
        assert_eq!(heavier.e1rm(), Some(dec!(233)));

        let skipped = heavier.with_completed(false);
        assert!(!skipped.is_completed());
        assert_eq!(skipped.volume_load(), heavier.volume_load());
        assert_eq!(skipped.exercise_id(), "squat");
        assert_eq!(skipped.timestamp(), ts());
    }

    proptest! {
        #[test]
        fn test_derived_metric_identities(weight_tenths in 0u32..5000u32, reps in 0u32..30u32) {
            let weight = Decimal::from(weight_tenths) / dec!(10);
            let record = set(weight, reps);

            prop_assert_eq!(record.volume_load(), Some(weight * Decimal::from(reps)));
            let expected = (weight * (Decimal::ONE + Decimal::from(reps) / dec!(30)))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            prop_assert_eq!(record.e1rm(), Some(expected));
        }
    }
}
