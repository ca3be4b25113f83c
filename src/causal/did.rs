//! Difference-in-differences
//!
//! `DID = (mean(T_post) - mean(T_pre)) - (mean(C_post) - mean(C_pre))`
//!
//! The standard error treats the four groups as independent samples:
//! `SE = sqrt(Σ var_g / n_g)`, with a Student t reference on `N - 4` d.f.

use super::stats::{confidence, mean, t_inference, variance};
use super::{CausalConfig, CausalOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidResult {
    pub estimate: f64,
    pub treatment_change: f64,
    pub control_change: f64,
    pub standard_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    pub significant: bool,
    pub observations: usize,
    pub confidence: f64,
    pub interpretation: String,
}

impl DidResult {
    /// Re-word the interpretation with the treatment and control names
    pub fn described(mut self, treatment: &str, control: &str) -> Self {
        self.interpretation = interpret(&self, treatment, control);
        self
    }
}

fn interpret(result: &DidResult, treatment: &str, control: &str) -> String {
    if result.significant {
        let direction = if result.estimate > 0.0 { "more" } else { "less" };
        format!(
            "{} changed by {:.2} {} than {} across the split (p = {:.3}).",
            treatment,
            result.estimate.abs(),
            direction,
            control,
            result.p_value
        )
    } else {
        format!(
            "{} changed in line with {} across the split (p = {:.3}).",
            treatment, control, result.p_value
        )
    }
}

/// Observations of the treatment and control groups before and after
#[derive(Debug, Clone, Copy)]
pub struct DidGroups<'a> {
    pub treatment_pre: &'a [f64],
    pub treatment_post: &'a [f64],
    pub control_pre: &'a [f64],
    pub control_post: &'a [f64],
}

impl DidGroups<'_> {
    fn all(&self) -> [&[f64]; 4] {
        [
            self.treatment_pre,
            self.treatment_post,
            self.control_pre,
            self.control_post,
        ]
    }
}

pub fn difference_in_differences(
    groups: DidGroups<'_>,
    config: &CausalConfig,
) -> CausalOutcome<DidResult> {
    let smallest = groups.all().iter().map(|g| g.len()).min().unwrap_or(0);
    if smallest < config.did_min_group_size {
        return CausalOutcome::insufficient(smallest, config.did_min_group_size);
    }

    let observations: usize = groups.all().iter().map(|g| g.len()).sum();
    let degrees_of_freedom = observations.saturating_sub(4);
    if degrees_of_freedom == 0 {
        return CausalOutcome::insufficient(observations, 5);
    }

    let treatment_change = mean(groups.treatment_post) - mean(groups.treatment_pre);
    let control_change = mean(groups.control_post) - mean(groups.control_pre);
    let estimate = treatment_change - control_change;

    let standard_error = groups
        .all()
        .iter()
        .map(|g| variance(g) / g.len() as f64)
        .sum::<f64>()
        .sqrt();
    let (t_statistic, p_value) = t_inference(estimate, standard_error, degrees_of_freedom as f64);

    tracing::debug!(estimate, standard_error, p_value, observations, "Difference-in-differences");

    let mut result = DidResult {
        estimate,
        treatment_change,
        control_change,
        standard_error,
        t_statistic,
        p_value,
        degrees_of_freedom,
        significant: p_value < config.alpha,
        observations,
        confidence: confidence(p_value, observations, config.confidence_saturation),
        interpretation: String::new(),
    };
    result.interpretation = interpret(&result, "The treatment series", "the control");
    CausalOutcome::Estimated(result)
}
