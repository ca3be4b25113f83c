//! Propensity score matching
//!
//! 1. Standardize covariates and fit a logistic model of treatment
//!    assignment (Newton-Raphson with a small ridge penalty so separable
//!    data still converges).
//! 2. Greedy 1:1 nearest-neighbour matching without replacement, only
//!    within a caliper of `caliper_sd × sd(propensity)`.
//! 3. Effect on the treated = mean paired outcome difference, tested with
//!    a paired t statistic on `k - 1` degrees of freedom.

use super::stats::{confidence, invert, mean, std_dev, t_inference};
use super::{CausalConfig, CausalOutcome};
use crate::error::CalculationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsmResult {
    /// Average treatment effect on the matched treated units
    pub effect: f64,
    pub standard_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub matched_pairs: usize,
    pub treated_count: usize,
    pub control_count: usize,
    pub unmatched_treated: usize,
    pub caliper: f64,
    pub significant: bool,
    pub observations: usize,
    pub confidence: f64,
    pub interpretation: String,
}

impl PsmResult {
    /// Re-word the interpretation with the treatment and outcome names
    pub fn described(mut self, treatment: &str, outcome: &str) -> Self {
        self.interpretation = interpret(&self, treatment, outcome);
        self
    }
}

fn interpret(result: &PsmResult, treatment: &str, outcome: &str) -> String {
    if result.significant {
        let direction = if result.effect > 0.0 { "higher" } else { "lower" };
        format!(
            "After matching {} pairs, {} has {} {:.2} {} (p = {:.3}).",
            result.matched_pairs,
            treatment,
            outcome,
            result.effect.abs(),
            direction,
            result.p_value
        )
    } else {
        format!(
            "After matching {} pairs, {} has no significant difference in {} (p = {:.3}).",
            result.matched_pairs, treatment, outcome, result.p_value
        )
    }
}

/// Column-standardized covariates; constant columns become zeros
fn standardize(rows: &[Vec<f64>], width: usize) -> Vec<Vec<f64>> {
    let columns: Vec<(f64, f64)> = (0..width)
        .map(|j| {
            let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            (mean(&column), std_dev(&column))
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .zip(&columns)
                .map(|(v, (m, sd))| if *sd > f64::EPSILON { (v - m) / sd } else { 0.0 })
                .collect()
        })
        .collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Propensity scores from a ridge-stabilized logistic regression
pub fn propensity_scores(
    treated: &[bool],
    covariates: &[Vec<f64>],
    config: &CausalConfig,
) -> Result<Vec<f64>, CalculationError> {
    let width = covariates.first().map_or(0, Vec::len);
    let design: Vec<Vec<f64>> = standardize(covariates, width)
        .into_iter()
        .map(|row| std::iter::once(1.0).chain(row).collect())
        .collect();
    let k = width + 1;
    let mut beta = vec![0.0; k];

    for _ in 0..config.logistic_max_iterations {
        let mut gradient = vec![0.0; k];
        let mut hessian = vec![vec![0.0; k]; k];

        for (row, &t) in design.iter().zip(treated) {
            let p = sigmoid(row.iter().zip(&beta).map(|(x, b)| x * b).sum());
            let y = if t { 1.0 } else { 0.0 };
            let w = p * (1.0 - p);
            for a in 0..k {
                gradient[a] += row[a] * (y - p);
                for b in 0..k {
                    hessian[a][b] += w * row[a] * row[b];
                }
            }
        }
        // intercept is not penalized
        for j in 1..k {
            gradient[j] -= config.ridge_penalty * beta[j];
            hessian[j][j] += config.ridge_penalty;
        }

        let inverse = invert(&hessian, "propensity model")?;
        let step: Vec<f64> = inverse
            .iter()
            .map(|r| r.iter().zip(&gradient).map(|(h, g)| h * g).sum())
            .collect();
        for (b, s) in beta.iter_mut().zip(&step) {
            *b += s;
        }

        if step.iter().all(|s| s.abs() < config.logistic_tolerance) {
            return Ok(design
                .iter()
                .map(|row| sigmoid(row.iter().zip(&beta).map(|(x, b)| x * b).sum()))
                .collect());
        }
    }

    Err(CalculationError::NonConvergence {
        calculation: "propensity model".to_string(),
        iterations: config.logistic_max_iterations,
    })
}

/// Greedy 1:1 matching without replacement; returns (treated, control) index pairs
pub fn greedy_match(scores: &[f64], treated: &[bool], caliper: f64) -> Vec<(usize, usize)> {
    let mut controls: Vec<usize> = (0..scores.len()).filter(|&i| !treated[i]).collect();
    let mut pairs = Vec::new();

    for t in (0..scores.len()).filter(|&i| treated[i]) {
        let nearest = controls
            .iter()
            .enumerate()
            .map(|(slot, &c)| (slot, c, (scores[t] - scores[c]).abs()))
            .filter(|(_, _, distance)| *distance <= caliper)
            .min_by(|a, b| a.2.total_cmp(&b.2));
        if let Some((slot, c, _)) = nearest {
            pairs.push((t, c));
            controls.remove(slot);
        }
    }
    pairs
}

/// Effect of treatment on `outcome`, adjusting for `covariates` (one row per unit)
pub fn propensity_score_matching(
    treated: &[bool],
    covariates: &[Vec<f64>],
    outcome: &[f64],
    config: &CausalConfig,
) -> CausalOutcome<PsmResult> {
    let n = treated.len();
    if covariates.len() != n || outcome.len() != n {
        return CausalOutcome::degenerate("treatment, covariate and outcome lengths differ");
    }
    let width = covariates.first().map_or(0, Vec::len);
    if covariates.iter().any(|row| row.len() != width) {
        return CausalOutcome::degenerate("covariate rows have different widths");
    }

    let treated_count = treated.iter().filter(|t| **t).count();
    let control_count = n - treated_count;
    let smallest_group = treated_count.min(control_count);
    if smallest_group < config.min_group_size {
        return CausalOutcome::insufficient(smallest_group, config.min_group_size);
    }
    if n < config.min_observations {
        return CausalOutcome::insufficient(n, config.min_observations);
    }

    let scores = match propensity_scores(treated, covariates, config) {
        Ok(scores) => scores,
        Err(e) => return e.into(),
    };
    let caliper = config.caliper_sd * std_dev(&scores);
    let pairs = greedy_match(&scores, treated, caliper);
    if pairs.len() < 2 {
        return CausalOutcome::insufficient(pairs.len(), 2);
    }

    let differences: Vec<f64> = pairs.iter().map(|&(t, c)| outcome[t] - outcome[c]).collect();
    let k = differences.len();
    let effect = mean(&differences);
    let standard_error = std_dev(&differences) / (k as f64).sqrt();
    let (t_statistic, p_value) = t_inference(effect, standard_error, (k - 1) as f64);

    tracing::debug!(
        effect,
        p_value,
        matched_pairs = k,
        treated_count,
        caliper,
        "Propensity score matching"
    );

    let mut result = PsmResult {
        effect,
        standard_error,
        t_statistic,
        p_value,
        matched_pairs: k,
        treated_count,
        control_count,
        unmatched_treated: treated_count - k,
        caliper,
        significant: p_value < config.alpha,
        observations: n,
        confidence: confidence(p_value, 2 * k, config.confidence_saturation),
        interpretation: String::new(),
    };
    result.interpretation = interpret(&result, "the treated group", "the outcome");
    CausalOutcome::Estimated(result)
}
