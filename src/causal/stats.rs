//! Small statistics toolkit shared by the causal estimators
//!
//! Ordinary least squares on normal equations, matrix inversion with partial
//! pivoting, and tail probabilities from `statrs` distributions. Only what
//! the estimators need.

use crate::error::CalculationError;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Pivots smaller than this (relative to the largest diagonal) are singular
const SINGULAR_TOLERANCE: f64 = 1e-10;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator); 0 for fewer than two values
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Linear-interpolated percentile of sorted data, `q` in [0, 1]
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// `(1 - p) · min(1, n / saturation)`
pub fn confidence(p_value: f64, observations: usize, saturation: usize) -> f64 {
    let coverage = (observations as f64 / saturation.max(1) as f64).min(1.0);
    ((1.0 - p_value) * coverage).clamp(0.0, 1.0)
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting
pub fn invert(matrix: &[Vec<f64>], calculation: &str) -> Result<Vec<Vec<f64>>, CalculationError> {
    let n = matrix.len();
    let scale = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row.get(i).copied().unwrap_or(0.0).abs())
        .fold(0.0, f64::max)
        .max(1.0);

    let mut a: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut augmented = row.clone();
            augmented.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            augmented
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() < SINGULAR_TOLERANCE * scale {
            return Err(CalculationError::SingularMatrix {
                calculation: calculation.to_string(),
            });
        }
        a.swap(col, pivot_row);

        let pivot = a[col][col];
        for value in a[col].iter_mut() {
            *value /= pivot;
        }
        let normalized = a[col].clone();
        for (row, values) in a.iter_mut().enumerate() {
            let factor = values[col];
            if row != col && factor != 0.0 {
                for (value, p) in values.iter_mut().zip(&normalized) {
                    *value -= factor * p;
                }
            }
        }
    }

    Ok(a.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Fitted linear model
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Intercept first, then one coefficient per regressor
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub residual_sum_squares: f64,
    pub observations: usize,
}

impl OlsFit {
    pub fn coefficient(&self, index: usize) -> f64 {
        self.coefficients.get(index).copied().unwrap_or(0.0)
    }

    pub fn standard_error(&self, index: usize) -> f64 {
        self.standard_errors.get(index).copied().unwrap_or(0.0)
    }
}

/// Least squares fit of `y` on an intercept plus `regressors` (one slice each)
pub fn ols(
    y: &[f64],
    regressors: &[&[f64]],
    calculation: &str,
) -> Result<OlsFit, CalculationError> {
    let n = y.len();
    let k = regressors.len() + 1;
    if regressors.iter().any(|r| r.len() != n) {
        return Err(CalculationError::InvalidParameter {
            calculation: calculation.to_string(),
            parameter: "regressor length".to_string(),
            value: format!("expected {}", n),
        });
    }
    if n <= k {
        return Err(CalculationError::InsufficientData {
            calculation: calculation.to_string(),
            reason: format!("{} observations for {} parameters", n, k),
        });
    }

    let row = |i: usize| -> Vec<f64> {
        std::iter::once(1.0)
            .chain(regressors.iter().map(|r| r[i]))
            .collect()
    };

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for i in 0..n {
        let x = row(i);
        for a in 0..k {
            xty[a] += x[a] * y[i];
            for b in 0..k {
                xtx[a][b] += x[a] * x[b];
            }
        }
    }

    let inverse = invert(&xtx, calculation)?;
    let coefficients: Vec<f64> = inverse
        .iter()
        .map(|r| r.iter().zip(&xty).map(|(a, b)| a * b).sum())
        .collect();

    let residual_sum_squares: f64 = (0..n)
        .map(|i| {
            let fitted: f64 = row(i).iter().zip(&coefficients).map(|(x, b)| x * b).sum();
            (y[i] - fitted).powi(2)
        })
        .sum();
    let sigma2 = residual_sum_squares / (n - k) as f64;
    let standard_errors = (0..k)
        .map(|j| (sigma2 * inverse[j][j]).max(0.0).sqrt())
        .collect();

    Ok(OlsFit {
        coefficients,
        standard_errors,
        residual_sum_squares,
        observations: n,
    })
}

/// Upper-tail probability of an F statistic
pub fn f_test_p_value(f: f64, df1: f64, df2: f64) -> Option<f64> {
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    let dist = FisherSnedecor::new(df1, df2).ok()?;
    Some((1.0 - dist.cdf(f)).clamp(0.0, 1.0))
}

/// Two-sided Student t p-value
pub fn t_test_p_value(t: f64, df: f64) -> Option<f64> {
    if t.is_nan() {
        return None;
    }
    if t.is_infinite() {
        return Some(0.0);
    }
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Two-sided standard normal p-value
pub fn z_test_p_value(z: f64) -> Option<f64> {
    if z.is_nan() {
        return None;
    }
    let dist = Normal::new(0.0, 1.0).ok()?;
    Some((2.0 * (1.0 - dist.cdf(z.abs()))).clamp(0.0, 1.0))
}

/// t statistic and p-value for an estimate, treating a zero standard error
/// as exact (p = 1 for a zero estimate, 0 otherwise)
pub fn t_inference(estimate: f64, standard_error: f64, df: f64) -> (f64, f64) {
    if standard_error <= f64::EPSILON {
        let p = if estimate.abs() <= f64::EPSILON { 1.0 } else { 0.0 };
        let t = if p == 1.0 { 0.0 } else { f64::INFINITY.copysign(estimate) };
        return (t, p);
    }
    let t = estimate / standard_error;
    (t, t_test_p_value(t, df).unwrap_or(1.0))
}
