//! Mediation analysis (Baron & Kenny paths with Sobel and bootstrap inference)
//!
//! For treatment `X`, mediator `M` and outcome `Y`:
//!
//! - a-path: `M ~ X`
//! - b and direct (c') paths: `Y ~ X + M`
//! - total effect c: `Y ~ X`
//!
//! The indirect effect is `a·b`. Significance comes from a percentile
//! bootstrap of `a·b`; the Sobel test is reported alongside.

use super::stats::{confidence, ols, percentile, z_test_p_value};
use super::{CausalConfig, CausalOutcome};
use crate::error::CalculationError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediationResult {
    pub total_effect: f64,
    pub direct_effect: f64,
    pub indirect_effect: f64,
    pub a_path: f64,
    pub b_path: f64,
    /// Share of the total effect carried by the mediator, clamped to [0, 1]
    pub proportion_mediated: f64,
    pub sobel_z: f64,
    pub sobel_p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Resamples that produced a finite estimate
    pub bootstrap_resamples: usize,
    /// Bootstrap CI excludes zero
    pub significant: bool,
    pub observations: usize,
    pub confidence: f64,
    pub interpretation: String,
}

impl MediationResult {
    /// Share of the effect above which mediation is the dominant pathway
    pub const DOMINANT_SHARE: f64 = 0.5;

    pub fn mediation_dominant(&self) -> bool {
        self.significant && self.proportion_mediated > Self::DOMINANT_SHARE
    }

    /// Re-word the interpretation with the names of the three variables
    pub fn described(mut self, treatment: &str, mediator: &str, outcome: &str) -> Self {
        self.interpretation = interpret(&self, treatment, mediator, outcome);
        self
    }
}

fn interpret(result: &MediationResult, treatment: &str, mediator: &str, outcome: &str) -> String {
    let share = result.proportion_mediated * 100.0;
    if !result.significant {
        format!(
            "No reliable indirect effect of {} on {} through {} (95% CI {:.3} to {:.3}).",
            treatment, outcome, mediator, result.ci_lower, result.ci_upper
        )
    } else if result.mediation_dominant() {
        format!(
            "{:.0}% of the effect of {} on {} flows through {}; mediation is the dominant pathway.",
            share, treatment, outcome, mediator
        )
    } else {
        format!(
            "{:.0}% of the effect of {} on {} flows through {}; the direct pathway dominates.",
            share, treatment, outcome, mediator
        )
    }
}

struct Paths {
    a: f64,
    se_a: f64,
    b: f64,
    se_b: f64,
    direct: f64,
    total: f64,
}

fn fit_paths(x: &[f64], m: &[f64], y: &[f64]) -> Result<Paths, CalculationError> {
    let a_fit = ols(m, &[x], "mediation a-path")?;
    let b_fit = ols(y, &[x, m], "mediation b-path")?;
    let c_fit = ols(y, &[x], "mediation total effect")?;
    Ok(Paths {
        a: a_fit.coefficient(1),
        se_a: a_fit.standard_error(1),
        b: b_fit.coefficient(2),
        se_b: b_fit.standard_error(2),
        direct: b_fit.coefficient(1),
        total: c_fit.coefficient(1),
    })
}

/// Indirect effect on one bootstrap resample
fn resampled_indirect(x: &[f64], m: &[f64], y: &[f64], seed: u64) -> Option<f64> {
    let n = x.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n);
    let mut ms = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for _ in 0..n {
        let i = rng.gen_range(0..n);
        xs.push(x[i]);
        ms.push(m[i]);
        ys.push(y[i]);
    }
    let a = ols(&ms, &[&xs], "bootstrap a-path").ok()?.coefficient(1);
    let b = ols(&ys, &[&xs, &ms], "bootstrap b-path").ok()?.coefficient(2);
    Some(a * b).filter(|v| v.is_finite())
}

/// Estimate how much of the effect of `x` on `y` flows through `m`
pub fn mediation_analysis(
    x: &[f64],
    m: &[f64],
    y: &[f64],
    config: &CausalConfig,
) -> CausalOutcome<MediationResult> {
    let n = x.len();
    if m.len() != n || y.len() != n {
        return CausalOutcome::degenerate("treatment, mediator and outcome lengths differ");
    }
    if n < config.min_observations {
        return CausalOutcome::insufficient(n, config.min_observations);
    }

    let paths = match fit_paths(x, m, y) {
        Ok(paths) => paths,
        Err(e) => return e.into(),
    };

    let indirect = paths.a * paths.b;
    let proportion = if paths.total.abs() < 1e-12 {
        0.0
    } else {
        (indirect / paths.total).clamp(0.0, 1.0)
    };

    let sobel_se =
        (paths.b.powi(2) * paths.se_a.powi(2) + paths.a.powi(2) * paths.se_b.powi(2)).sqrt();
    let (sobel_z, sobel_p_value) = if sobel_se > f64::EPSILON {
        let z = indirect / sobel_se;
        (z, z_test_p_value(z).unwrap_or(1.0))
    } else if indirect.abs() > f64::EPSILON {
        (f64::INFINITY.copysign(indirect), 0.0)
    } else {
        (0.0, 1.0)
    };

    let mut draws: Vec<f64> = (0..config.bootstrap_resamples as u64)
        .into_par_iter()
        .filter_map(|i| resampled_indirect(x, m, y, config.seed.wrapping_add(i)))
        .collect();
    draws.sort_by(|a, b| a.total_cmp(b));

    let tail = config.alpha / 2.0;
    let (ci_lower, ci_upper) = match (percentile(&draws, tail), percentile(&draws, 1.0 - tail)) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => return CausalOutcome::degenerate("no bootstrap resample could be fitted"),
    };
    let significant = ci_lower > 0.0 || ci_upper < 0.0;

    tracing::debug!(
        indirect,
        proportion,
        ci_lower,
        ci_upper,
        resamples = draws.len(),
        "Mediation analysis"
    );

    let mut result = MediationResult {
        total_effect: paths.total,
        direct_effect: paths.direct,
        indirect_effect: indirect,
        a_path: paths.a,
        b_path: paths.b,
        proportion_mediated: proportion,
        sobel_z,
        sobel_p_value,
        ci_lower,
        ci_upper,
        bootstrap_resamples: draws.len(),
        significant,
        observations: n,
        confidence: confidence(sobel_p_value, n, config.confidence_saturation),
        interpretation: String::new(),
    };
    result.interpretation = interpret(&result, "the treatment", "the mediator", "the outcome");
    CausalOutcome::Estimated(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize, seed: u64, direct: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let x: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
        let m: Vec<f64> = x.iter().map(|v| 2.0 * v + rng.gen_range(-3.0..3.0)).collect();
        let y: Vec<f64> = x
            .iter()
            .zip(&m)
            .map(|(xv, mv)| 3.0 * mv + direct * xv + rng.gen_range(-0.5..0.5))
            .collect();
        (x, m, y)
    }

    #[test]
    fn test_fully_mediated_effect() {
        let (x, m, y) = synthetic(40, 3, 0.0);
        let config = CausalConfig {
            bootstrap_resamples: 200,
            ..CausalConfig::default()
        };

        let result = mediation_analysis(&x, &m, &y, &config);
        let estimate = result.estimate().unwrap();

        assert!((estimate.proportion_mediated - 1.0).abs() < 0.05);
        assert!((estimate.total_effect - 6.0).abs() < 1.0);
        assert!(estimate.direct_effect.abs() < 0.5);
        assert!(estimate.significant);
        assert!(estimate.ci_lower > 0.0);
        assert!(estimate.sobel_p_value < 0.001);
        assert!(estimate.mediation_dominant());
        assert!(estimate.interpretation.contains("dominant pathway"));
    }

    #[test]
    fn test_bootstrap_is_reproducible_for_a_seed() {
        let (x, m, y) = synthetic(25, 9, 1.0);
        let config = CausalConfig {
            bootstrap_resamples: 100,
            ..CausalConfig::default()
        };

        let first = mediation_analysis(&x, &m, &y, &config);
        let second = mediation_analysis(&x, &m, &y, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_mediation_proportion() {
        let (x, m, y) = synthetic(50, 5, 6.0);
        let config = CausalConfig {
            bootstrap_resamples: 100,
            ..CausalConfig::default()
        };

        let estimate = mediation_analysis(&x, &m, &y, &config).into_estimate().unwrap();
        // indirect 6 of total 12
        assert!((estimate.proportion_mediated - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_too_few_observations() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(
            mediation_analysis(&v, &v, &v, &CausalConfig::default()),
            CausalOutcome::InsufficientData {
                observations: 3,
                required: 10
            }
        );
    }
}
