//! Causal Inference Suite
//!
//! Independent estimators over the session-level series built by the
//! history aggregator:
//!
//! - [`granger`]: does one series' past predict another's future?
//! - [`mediation`]: how much of an effect flows through a mediator?
//! - [`propensity`]: effect of a binary treatment, adjusted for covariates
//! - [`did`]: before/after change relative to a control
//!
//! Every estimator returns a [`CausalOutcome`]; too little data or a
//! degenerate design is a normal result, never an error or a panic.

pub mod did;
pub mod granger;
pub mod mediation;
pub mod propensity;
pub mod stats;

pub use did::{difference_in_differences, DidGroups, DidResult};
pub use granger::{granger_causality, GrangerResult};
pub use mediation::{mediation_analysis, MediationResult};
pub use propensity::{propensity_score_matching, PsmResult};

use crate::error::{CalculationError, EngineError};
use crate::history::{HistoryAggregator, SeriesOutcome, SessionSeries};
use crate::models::SessionRecord;
use serde::{Deserialize, Serialize};

/// Causal suite configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalConfig {
    /// Significance level
    pub alpha: f64,
    pub bootstrap_resamples: usize,
    /// Seed for the bootstrap; resample `i` uses `seed + i`
    pub seed: u64,
    /// Matching caliper in standard deviations of the propensity score
    pub caliper_sd: f64,
    /// Minimum observations per estimator
    pub min_observations: usize,
    /// Minimum treated and control units for matching
    pub min_group_size: usize,
    /// Minimum observations per DID group
    pub did_min_group_size: usize,
    pub granger_lag: usize,
    pub ridge_penalty: f64,
    pub logistic_max_iterations: usize,
    pub logistic_tolerance: f64,
    /// Sample size at which confidence stops growing
    pub confidence_saturation: usize,
}

impl Default for CausalConfig {
    fn default() -> Self {
        CausalConfig {
            alpha: 0.05,
            bootstrap_resamples: 500,
            seed: 42,
            caliper_sd: 0.25,
            min_observations: 10,
            min_group_size: 3,
            did_min_group_size: 2,
            granger_lag: 1,
            ridge_penalty: 0.1,
            logistic_max_iterations: 50,
            logistic_tolerance: 1e-8,
            confidence_saturation: 30,
        }
    }
}

/// Result of a causal estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CausalOutcome<T> {
    Estimated(T),
    InsufficientData { observations: usize, required: usize },
    /// Enough data, but the design cannot be estimated (singular, constant)
    Degenerate { reason: String },
}

impl<T> CausalOutcome<T> {
    pub fn insufficient(observations: usize, required: usize) -> Self {
        CausalOutcome::InsufficientData {
            observations,
            required,
        }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        CausalOutcome::Degenerate {
            reason: reason.into(),
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, CausalOutcome::Estimated(_))
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, CausalOutcome::InsufficientData { .. })
    }

    pub fn estimate(&self) -> Option<&T> {
        match self {
            CausalOutcome::Estimated(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_estimate(self) -> Option<T> {
        match self {
            CausalOutcome::Estimated(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CausalOutcome<U> {
        match self {
            CausalOutcome::Estimated(value) => CausalOutcome::Estimated(f(value)),
            CausalOutcome::InsufficientData {
                observations,
                required,
            } => CausalOutcome::InsufficientData {
                observations,
                required,
            },
            CausalOutcome::Degenerate { reason } => CausalOutcome::Degenerate { reason },
        }
    }
}

impl<T> From<CalculationError> for CausalOutcome<T> {
    fn from(error: CalculationError) -> Self {
        let error = EngineError::from(error);
        tracing::debug!(
            error = %error,
            severity = ?error.severity(),
            "Causal estimate is degenerate"
        );
        CausalOutcome::Degenerate {
            reason: error.user_message(),
        }
    }
}

/// Standard causal questions over a user's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalReport {
    /// Usable sessions in the series
    pub sessions: usize,
    pub fatigue_to_performance: CausalOutcome<GrangerResult>,
    pub volume_to_fatigue: CausalOutcome<GrangerResult>,
    pub intensity_to_performance: CausalOutcome<GrangerResult>,
    /// Volume -> fatigue -> performance
    pub volume_via_fatigue: CausalOutcome<MediationResult>,
    /// Fatigue in high- vs low-volume sessions, matched on intensity and RPE
    pub high_volume_fatigue: CausalOutcome<PsmResult>,
    /// Performance change between the two halves of the history against the
    /// fatigue proxy as control
    pub period_change: CausalOutcome<DidResult>,
}

/// Runs the standard estimators over session history
#[derive(Debug, Clone, Default)]
pub struct CausalSuite {
    config: CausalConfig,
    aggregator: HistoryAggregator,
}

impl CausalSuite {
    pub fn new() -> Self {
        CausalSuite::default()
    }

    pub fn with_config(config: CausalConfig, aggregator: HistoryAggregator) -> Self {
        CausalSuite { config, aggregator }
    }

    pub fn config(&self) -> &CausalConfig {
        &self.config
    }

    pub fn analyze(&self, history: &[SessionRecord]) -> CausalReport {
        match self.aggregator.session_series(history) {
            SeriesOutcome::Ready(series) => self.analyze_series(&series),
            SeriesOutcome::InsufficientData { sessions, required } => CausalReport {
                sessions,
                fatigue_to_performance: CausalOutcome::insufficient(sessions, required),
                volume_to_fatigue: CausalOutcome::insufficient(sessions, required),
                intensity_to_performance: CausalOutcome::insufficient(sessions, required),
                volume_via_fatigue: CausalOutcome::insufficient(sessions, required),
                high_volume_fatigue: CausalOutcome::insufficient(sessions, required),
                period_change: CausalOutcome::insufficient(sessions, required),
            },
        }
    }

    /// Run every estimator on an already-built series
    pub fn analyze_series(&self, series: &SessionSeries) -> CausalReport {
        let fatigue = series.fatigue();
        let performance = series.performance();
        let volume = series.volume();
        let intensity = series.intensity();
        let rpe = series.rpe();
        let lag = self.config.granger_lag;

        let (granger, (mediation, (psm, did))) = rayon::join(
            || {
                (
                    granger_causality(&fatigue, &performance, lag, &self.config)
                        .map(|r| r.described("fatigue", "performance")),
                    granger_causality(&volume, &fatigue, lag, &self.config)
                        .map(|r| r.described("volume", "fatigue")),
                    granger_causality(&intensity, &performance, lag, &self.config)
                        .map(|r| r.described("intensity", "performance")),
                )
            },
            || {
                rayon::join(
                    || {
                        mediation_analysis(&volume, &fatigue, &performance, &self.config)
                            .map(|r| r.described("volume", "fatigue", "performance"))
                    },
                    || {
                        (
                            self.high_volume_fatigue(&volume, &intensity, &rpe, &fatigue),
                            self.period_change(&performance, &fatigue),
                        )
                    },
                )
            },
        );

        let report = CausalReport {
            sessions: series.len(),
            fatigue_to_performance: granger.0,
            volume_to_fatigue: granger.1,
            intensity_to_performance: granger.2,
            volume_via_fatigue: mediation,
            high_volume_fatigue: psm,
            period_change: did,
        };

        tracing::info!(
            sessions = report.sessions,
            fatigue_to_performance = report.fatigue_to_performance.is_estimated(),
            mediation = report.volume_via_fatigue.is_estimated(),
            matching = report.high_volume_fatigue.is_estimated(),
            period_change = report.period_change.is_estimated(),
            "Causal analysis complete"
        );
        report
    }

    /// Sessions above median volume are treated
    fn high_volume_fatigue(
        &self,
        volume: &[f64],
        intensity: &[f64],
        rpe: &[f64],
        fatigue: &[f64],
    ) -> CausalOutcome<PsmResult> {
        let Some(median_volume) = stats::median(volume) else {
            return CausalOutcome::insufficient(0, self.config.min_observations);
        };
        let treated: Vec<bool> = volume.iter().map(|v| *v > median_volume).collect();
        let covariates: Vec<Vec<f64>> = intensity
            .iter()
            .zip(rpe)
            .map(|(i, r)| vec![*i, *r])
            .collect();
        propensity_score_matching(&treated, &covariates, fatigue, &self.config)
            .map(|r| r.described("high-volume sessions", "fatigue"))
    }

    /// First half vs second half of the history
    fn period_change(&self, performance: &[f64], fatigue: &[f64]) -> CausalOutcome<DidResult> {
        let split = performance.len() / 2;
        difference_in_differences(
            DidGroups {
                treatment_pre: &performance[..split],
                treatment_post: &performance[split..],
                control_pre: &fatigue[..split],
                control_post: &fatigue[split..],
            },
            &self.config,
        )
        .map(|r| r.described("Performance", "the fatigue proxy"))
    }
}
