//! Granger causality
//!
//! Does the past of `cause` improve prediction of `effect` beyond the past
//! of `effect` itself? Two lagged regressions are compared:
//!
//! - restricted: `effect_t ~ effect_{t-1..t-lag}`
//! - unrestricted: `effect_t ~ effect_{t-1..t-lag} + cause_{t-1..t-lag}`
//!
//! `F = ((RSS_r - RSS_u) / lag) / (RSS_u / (N - 2·lag - 1))` with `N` the
//! number of regression rows.

use super::stats::{confidence, f_test_p_value, ols};
use super::{CausalConfig, CausalOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrangerResult {
    pub lag: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_numerator: usize,
    pub df_denominator: usize,
    pub restricted_rss: f64,
    pub unrestricted_rss: f64,
    /// p < alpha
    pub causal: bool,
    pub observations: usize,
    pub confidence: f64,
    pub interpretation: String,
}

impl GrangerResult {
    /// Re-word the interpretation with the names of the two series
    pub fn described(mut self, cause: &str, effect: &str) -> Self {
        self.interpretation = interpret(self.causal, self.p_value, self.lag, cause, effect);
        self
    }
}

fn interpret(causal: bool, p_value: f64, lag: usize, cause: &str, effect: &str) -> String {
    let sessions = if lag == 1 {
        "the previous session".to_string()
    } else {
        format!("the previous {} sessions", lag)
    };
    if causal {
        format!(
            "{} in {} significantly improves prediction of {} (p = {:.3}).",
            capitalize(cause),
            sessions,
            effect,
            p_value
        )
    } else {
        format!(
            "No evidence that {} in {} helps predict {} (p = {:.3}).",
            cause, sessions, effect, p_value
        )
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Test whether `cause` Granger-causes `effect`
pub fn granger_causality(
    cause: &[f64],
    effect: &[f64],
    lag: usize,
    config: &CausalConfig,
) -> CausalOutcome<GrangerResult> {
    if cause.len() != effect.len() {
        return CausalOutcome::degenerate(format!(
            "series lengths differ ({} vs {})",
            cause.len(),
            effect.len()
        ));
    }
    if lag == 0 {
        return CausalOutcome::degenerate("lag must be at least 1");
    }

    let series_len = cause.len();
    let required = config.min_observations.max(3 * lag + 2);
    if series_len < required {
        return CausalOutcome::insufficient(series_len, required);
    }

    let rows = series_len - lag;
    let df_denominator = rows - 2 * lag - 1;

    let target: Vec<f64> = effect[lag..].to_vec();
    let lagged = |series: &[f64], k: usize| -> Vec<f64> {
        (lag..series_len).map(|t| series[t - k]).collect()
    };
    let own_lags: Vec<Vec<f64>> = (1..=lag).map(|k| lagged(effect, k)).collect();
    let cause_lags: Vec<Vec<f64>> = (1..=lag).map(|k| lagged(cause, k)).collect();

    let restricted_regressors: Vec<&[f64]> = own_lags.iter().map(Vec::as_slice).collect();
    let unrestricted_regressors: Vec<&[f64]> = own_lags
        .iter()
        .chain(cause_lags.iter())
        .map(Vec::as_slice)
        .collect();

    let restricted = match ols(&target, &restricted_regressors, "granger restricted") {
        Ok(fit) => fit,
        Err(e) => return e.into(),
    };
    let unrestricted = match ols(&target, &unrestricted_regressors, "granger unrestricted") {
        Ok(fit) => fit,
        Err(e) => return e.into(),
    };

    let rss_r = restricted.residual_sum_squares;
    let rss_u = unrestricted.residual_sum_squares;
    if rss_u <= f64::EPSILON * rss_r.max(1.0) {
        return CausalOutcome::degenerate("unrestricted model fits the data exactly");
    }

    let f_statistic = (((rss_r - rss_u) / lag as f64) / (rss_u / df_denominator as f64)).max(0.0);
    let Some(p_value) = f_test_p_value(f_statistic, lag as f64, df_denominator as f64) else {
        return CausalOutcome::degenerate("F distribution undefined for these degrees of freedom");
    };

    tracing::debug!(lag, f_statistic, p_value, rows, "Granger test");

    let causal = p_value < config.alpha;
    CausalOutcome::Estimated(GrangerResult {
        lag,
        f_statistic,
        p_value,
        df_numerator: lag,
        df_denominator,
        restricted_rss: rss_r,
        unrestricted_rss: rss_u,
        causal,
        observations: series_len,
        confidence: confidence(p_value, series_len, config.confidence_saturation),
        interpretation: interpret(causal, p_value, lag, "the driver", "the outcome"),
    })
}
