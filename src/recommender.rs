//! Weight/Rep Recommender
//!
//! Produces a single set-level load suggestion from, in priority order:
//!
//! 1. **RPE adjustment**: active overshoot on a muscle group the exercise
//!    trains. The most recent working weight is reduced in proportion to the
//!    overshoot and a [`FatigueAlert`] is attached.
//! 2. **Percentage of 1RM**: a prescribed percentage and a known max.
//! 3. **Historical**: the best set for the rep target, projected with inverse
//!    Epley when no set was performed at exactly that rep count.
//!
//! With none of the above available the recommender returns `None` and the
//! caller seeds its own default. Weights are snapped to the nearest 0.5 of the
//! tracked unit.

use crate::fatigue::{FatigueAlert, FatigueModel};
use crate::history::HistoryAggregator;
use crate::models::{
    epley_weight_for_reps, snap_weight, ExerciseCatalog, MaxSource, SessionRecord, SetRecord,
    UserMaxRecord, WeightUnit,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Recommender configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Unit suggestions are expressed in; maxes are converted into it
    pub tracked_unit: WeightUnit,

    /// Load reduction per point of RPE overshoot (0.04 = 4%)
    pub reduction_per_rpe: f64,

    /// Upper bound on the fatigue reduction
    pub max_reduction: f64,

    /// Load change per point of target-vs-reference RPE difference
    pub rpe_autoregulation_per_point: f64,

    /// Upper bound on the RPE autoregulation in either direction
    pub max_autoregulation: f64,

    /// Maxes older than this many days lose one confidence level
    pub stale_max_days: i64,

    /// Rated sets needed for high confidence in a fatigue adjustment
    pub high_confidence_sets: usize,

    /// Rated sets needed for medium confidence in a fatigue adjustment
    pub medium_confidence_sets: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        RecommenderConfig {
            tracked_unit: WeightUnit::Lb,
            reduction_per_rpe: 0.04,
            max_reduction: 0.20,
            rpe_autoregulation_per_point: 0.03,
            max_autoregulation: 0.10,
            stale_max_days: 180,
            high_confidence_sets: 6,
            medium_confidence_sets: 3,
        }
    }
}

/// Ordered confidence level, low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// One level lower, saturating at low
    pub fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Equivalent scalar in [0, 1]
    pub fn as_scalar(&self) -> f64 {
        match self {
            Confidence::Low => 0.33,
            Confidence::Medium => 0.66,
            Confidence::High => 1.0,
        }
    }
}

/// What a recommendation was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "based_on", rename_all = "snake_case")]
pub enum RecommendationBasis {
    Historical {
        reference_weight: Decimal,
        reference_reps: u32,
        reference_e1rm: Decimal,
        /// True when the reference set was at a different rep count
        projected: bool,
    },
    RpeAdjustment {
        alert: FatigueAlert,
        base_weight: Decimal,
        overshoot: f64,
        /// Applied reduction, 0.0-1.0
        reduction: f64,
    },
    #[serde(rename = "percentage_1rm")]
    Percentage1Rm {
        one_rep_max: Decimal,
        percent: Decimal,
        max_source: MaxSource,
    },
}

/// Discriminant of [`RecommendationBasis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisKind {
    Historical,
    RpeAdjustment,
    #[serde(rename = "percentage_1rm")]
    Percentage1Rm,
}

impl RecommendationBasis {
    pub fn kind(&self) -> BasisKind {
        match self {
            RecommendationBasis::Historical { .. } => BasisKind::Historical,
            RecommendationBasis::RpeAdjustment { .. } => BasisKind::RpeAdjustment,
            RecommendationBasis::Percentage1Rm { .. } => BasisKind::Percentage1Rm,
        }
    }
}

/// Set-level suggestion returned to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub exercise_id: String,
    pub suggested_weight: Decimal,
    pub suggested_reps: u32,
    pub reasoning: String,
    pub confidence: Confidence,
    #[serde(flatten)]
    pub basis: RecommendationBasis,
}

impl RecommendationResult {
    pub fn based_on(&self) -> BasisKind {
        self.basis.kind()
    }

    pub fn fatigue_alert(&self) -> Option<&FatigueAlert> {
        match &self.basis {
            RecommendationBasis::RpeAdjustment { alert, .. } => Some(alert),
            _ => None,
        }
    }
}

/// Parameters of a recommendation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub exercise_id: String,
    pub target_reps: u32,
    pub target_rpe: Option<f64>,
    /// Prescribed percentage of 1RM (e.g. 80 for 80%)
    pub percent_of_1rm: Option<Decimal>,
    pub now: DateTime<Utc>,
}

impl RecommendationRequest {
    pub fn new(exercise_id: impl Into<String>, target_reps: u32, now: DateTime<Utc>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            target_reps,
            target_rpe: None,
            percent_of_1rm: None,
            now,
        }
    }

    pub fn with_target_rpe(mut self, rpe: f64) -> Self {
        self.target_rpe = Some(rpe).filter(|r| r.is_finite());
        self
    }

    pub fn with_percent_of_1rm(mut self, percent: Decimal) -> Self {
        self.percent_of_1rm = Some(percent);
        self
    }
}

/// Read-only inputs from the host's collaborators
#[derive(Debug, Clone, Copy)]
pub struct TrainingSnapshot<'a> {
    pub history: &'a [SessionRecord],
    pub catalog: &'a ExerciseCatalog,
    pub maxes: &'a [UserMaxRecord],
}

/// Load suggestion before fatigue handling
struct Candidate {
    weight: Decimal,
    confidence: Confidence,
    basis: RecommendationBasis,
    reasoning: String,
}

/// Weight/rep recommendation engine
#[derive(Debug, Clone, Default)]
pub struct WeightRecommender {
    config: RecommenderConfig,
    fatigue: FatigueModel,
    aggregator: HistoryAggregator,
}

impl WeightRecommender {
    pub fn new() -> Self {
        WeightRecommender::default()
    }

    pub fn with_config(
        config: RecommenderConfig,
        fatigue: FatigueModel,
        aggregator: HistoryAggregator,
    ) -> Self {
        WeightRecommender {
            config,
            fatigue,
            aggregator,
        }
    }

    /// Recommend a load for the next set of `request.exercise_id`
    pub fn recommend(
        &self,
        request: &RecommendationRequest,
        session_sets: &[SetRecord],
        snapshot: TrainingSnapshot<'_>,
    ) -> Option<RecommendationResult> {
        let baseline = self
            .percentage_candidate(request, snapshot.maxes)
            .or_else(|| self.historical_candidate(request, snapshot.history));

        if let Some(adjusted) =
            self.fatigue_candidate(request, session_sets, snapshot, baseline.as_ref())
        {
            return Some(self.finish(request, adjusted));
        }

        match baseline {
            Some(candidate) => Some(self.finish(request, candidate)),
            None => {
                tracing::debug!(
                    exercise_id = %request.exercise_id,
                    "No history, max, or fatigue data; no recommendation"
                );
                None
            }
        }
    }

    fn finish(
        &self,
        request: &RecommendationRequest,
        candidate: Candidate,
    ) -> RecommendationResult {
        let result = RecommendationResult {
            exercise_id: request.exercise_id.clone(),
            suggested_weight: snap_weight(candidate.weight),
            suggested_reps: request.target_reps,
            reasoning: candidate.reasoning,
            confidence: candidate.confidence,
            basis: candidate.basis,
        };
        tracing::debug!(
            exercise_id = %result.exercise_id,
            weight = %result.suggested_weight,
            based_on = ?result.based_on(),
            confidence = ?result.confidence,
            "Recommendation computed"
        );
        result
    }

    /// Step 1: reduce load when muscles used by the exercise show overshoot
    ///
    /// The adjusted weight never exceeds the non-fatigue suggestion so that
    /// more overshoot can only lower the recommendation.
    fn fatigue_candidate(
        &self,
        request: &RecommendationRequest,
        session_sets: &[SetRecord],
        snapshot: TrainingSnapshot<'_>,
        baseline: Option<&Candidate>,
    ) -> Option<Candidate> {
        let muscles = snapshot.catalog.muscle_groups(&request.exercise_id);
        if muscles.is_empty() {
            return None;
        }

        let sets = snapshot
            .history
            .iter()
            .flat_map(|s| s.sets.iter())
            .chain(session_sets.iter());
        let state = self.fatigue.fatigue_state(sets, snapshot.catalog, request.now);
        let alert = self.fatigue.alert_for(&state, &muscles)?;
        let overshoot = state.peak_score(&muscles);

        let recent = self
            .aggregator
            .most_recent_working_set(session_sets, snapshot.history, &request.exercise_id)
            .and_then(|set| set.actual().weight);
        let base_weight = recent.or(baseline.map(|c| c.weight))?;

        let reduction =
            (overshoot * self.config.reduction_per_rpe).clamp(0.0, self.config.max_reduction);
        let factor = Decimal::from_f64(1.0 - reduction)?;
        let mut weight = base_weight * factor;
        if let Some(baseline) = baseline {
            weight = weight.min(baseline.weight);
        }

        let rated = state.rated_sets(&muscles);
        let confidence = if rated >= self.config.high_confidence_sets {
            Confidence::High
        } else if rated >= self.config.medium_confidence_sets {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let reasoning = format!(
            "RPE has been running {:.1} above target on {}. \
             Reducing {} by {:.0}% to keep the set at the intended effort.",
            overshoot,
            alert.affected_muscles.iter().cloned().collect::<Vec<_>>().join(", "),
            base_weight.normalize(),
            reduction * 100.0
        );

        Some(Candidate {
            weight,
            confidence,
            basis: RecommendationBasis::RpeAdjustment {
                alert,
                base_weight,
                overshoot,
                reduction,
            },
            reasoning,
        })
    }

    /// Step 2: percentage of a known one-rep max
    fn percentage_candidate(
        &self,
        request: &RecommendationRequest,
        maxes: &[UserMaxRecord],
    ) -> Option<Candidate> {
        let percent = request.percent_of_1rm.filter(|p| *p > Decimal::ZERO)?;
        let max = maxes
            .iter()
            .filter(|m| m.exercise_id == request.exercise_id && m.weight > Decimal::ZERO)
            .max_by_key(|m| m.test_date)?;

        let one_rep_max = max.weight_in(self.config.tracked_unit);
        let weight = one_rep_max * percent / Decimal::ONE_HUNDRED;

        let mut confidence = match max.source {
            MaxSource::Tested => Confidence::High,
            MaxSource::Estimated => Confidence::Medium,
        };
        let age_days = (request.now.date_naive() - max.test_date).num_days();
        if age_days > self.config.stale_max_days {
            confidence = confidence.downgrade();
        }

        let reasoning = format!(
            "{}% of your {} max of {} ({} days old).",
            percent.normalize(),
            match max.source {
                MaxSource::Tested => "tested",
                MaxSource::Estimated => "estimated",
            },
            snap_weight(one_rep_max),
            age_days.max(0)
        );

        Some(Candidate {
            weight,
            confidence,
            basis: RecommendationBasis::Percentage1Rm {
                one_rep_max,
                percent,
                max_source: max.source,
            },
            reasoning,
        })
    }

    /// Step 3: best historical set for the rep target
    fn historical_candidate(
        &self,
        request: &RecommendationRequest,
        history: &[SessionRecord],
    ) -> Option<Candidate> {
        let sets = self.aggregator.exercise_sets(history, &request.exercise_id);
        let (best, exact) = self.aggregator.best_set_for_reps(&sets, request.target_reps)?;
        let reference_weight = best.actual().weight?;
        let reference_reps = best.actual().reps?;
        let reference_e1rm = best.e1rm()?;

        let mut weight = if exact {
            reference_weight
        } else {
            epley_weight_for_reps(reference_e1rm, request.target_reps)
        };

        let mut reasoning = if exact {
            format!(
                "Best recent set at {} reps was {}.",
                reference_reps,
                reference_weight.normalize()
            )
        } else {
            format!(
                "Projected from your best set of {}x{} (e1RM {}).",
                reference_weight.normalize(),
                reference_reps,
                reference_e1rm.normalize()
            )
        };

        if let (Some(target), Some(actual)) = (request.target_rpe, best.actual().effective_rpe()) {
            let adjustment = ((target - actual) * self.config.rpe_autoregulation_per_point)
                .clamp(-self.config.max_autoregulation, self.config.max_autoregulation);
            if adjustment != 0.0 {
                if let Some(factor) = Decimal::from_f64(1.0 + adjustment) {
                    weight *= factor;
                    reasoning.push_str(&format!(
                        " Adjusted {:+.0}% for a target RPE of {:.1}.",
                        adjustment * 100.0,
                        target
                    ));
                }
            }
        }

        let plenty = sets.len() >= self.config.medium_confidence_sets;
        let confidence = match (exact, plenty) {
            (true, true) => Confidence::High,
            (true, false) | (false, true) => Confidence::Medium,
            (false, false) => Confidence::Low,
        };

        Some(Candidate {
            weight,
            confidence,
            basis: RecommendationBasis::Historical {
                reference_weight,
                reference_reps,
                reference_e1rm,
                projected: !exact,
            },
            reasoning,
        })
    }
}
