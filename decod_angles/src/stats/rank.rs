//! Rank statistics: Spearman correlation and the Wilcoxon signed-rank test.

use ndarray::{Array1, ArrayBase, Axis, Data, Ix2};
use statrs::distribution::{ContinuousCDF, Normal};

/// Largest sample for which the exact null distribution is enumerated.
const EXACT_MAX_N: usize = 50;

/// Average ranks (1-based); ties share the mean of their positions.
pub fn rank_data(vals: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = vals.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; vals.len()];
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i + 1;
        while j < indexed.len() && indexed[j].1 == indexed[i].1 {
            j += 1;
        }
        let avg_rank = ((i + 1) as f64 + j as f64) / 2.0;
        for &(idx, _) in &indexed[i..j] {
            ranks[idx] = avg_rank;
        }
        i = j;
    }
    ranks
}

pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return f64::NAN;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut num, mut denom_x, mut denom_y) = (0.0, 0.0, 0.0);
    for (&xx, &yy) in x.iter().zip(y) {
        let dx = xx - mean_x;
        let dy = yy - mean_y;
        num += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    let denom = (denom_x * denom_y).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    num / denom
}

/// Spearman rank correlation over the pairs where neither value is NaN.
pub fn spearman_correlation(x: &[f64], y: &[f64]) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(&a, &b)| (a, b))
        .unzip();
    pearson_correlation(&rank_data(&xs), &rank_data(&ys))
}

/// Spearman correlation of every column of `x` (samples × features) with `y`.
pub fn repeated_spearman<S>(x: &ArrayBase<S, Ix2>, y: &[f64]) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    x.axis_iter(Axis(1))
        .map(|column| {
            let column: Vec<f64> = column.iter().copied().collect();
            spearman_correlation(&column, y)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WilcoxonResult {
    /// `min(W+, W-)`.
    pub statistic: f64,
    /// Two-sided p-value.
    pub pvalue: f64,
    /// Number of non-zero, non-NaN samples.
    pub n: usize,
}

/// Two-sided Wilcoxon signed-rank test of `x` against zero.
///
/// NaNs and exact zeros are discarded. Without ties or zeros and with at
/// most 50 samples the exact null distribution is used; otherwise the
/// normal approximation with tie correction.
pub fn wilcoxon(x: &[f64]) -> WilcoxonResult {
    let valid: Vec<f64> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    let has_zeros = valid.iter().any(|&v| v == 0.0);
    let d: Vec<f64> = valid.into_iter().filter(|&v| v != 0.0).collect();
    let n = d.len();
    if n == 0 {
        return WilcoxonResult { statistic: f64::NAN, pvalue: f64::NAN, n };
    }

    let abs: Vec<f64> = d.iter().map(|v| v.abs()).collect();
    let ranks = rank_data(&abs);
    let w_plus: f64 = d.iter().zip(&ranks).filter(|(v, _)| **v > 0.0).map(|(_, r)| r).sum();
    let w_minus: f64 = d.iter().zip(&ranks).filter(|(v, _)| **v < 0.0).map(|(_, r)| r).sum();
    let statistic = w_plus.min(w_minus);

    let tie_sizes = tie_sizes(&abs);
    let has_ties = tie_sizes.iter().any(|&t| t > 1);

    let pvalue = if n <= EXACT_MAX_N && !has_ties && !has_zeros {
        exact_pvalue(n, statistic)
    } else {
        normal_pvalue(n, statistic, &tie_sizes)
    };
    WilcoxonResult { statistic, pvalue, n }
}

fn tie_sizes(vals: &[f64]) -> Vec<usize> {
    let mut sorted = vals.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut sizes = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        sizes.push(j - i);
        i = j;
    }
    sizes
}

/// `2 · P(T <= statistic)` under the null, counting sign assignments.
fn exact_pvalue(n: usize, statistic: f64) -> f64 {
    let max_sum = n * (n + 1) / 2;
    let mut counts = vec![0u64; max_sum + 1];
    counts[0] = 1;
    for k in 1..=n {
        for s in (k..=max_sum).rev() {
            counts[s] += counts[s - k];
        }
    }
    let t = statistic.floor() as usize;
    let below: u64 = counts[..=t.min(max_sum)].iter().sum();
    let p = 2.0 * below as f64 / 2f64.powi(n as i32);
    p.min(1.0)
}

fn normal_pvalue(n: usize, statistic: f64, tie_sizes: &[usize]) -> f64 {
    let n = n as f64;
    let mean = n * (n + 1.0) / 4.0;
    let tie_correction: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum::<f64>()
        / 48.0;
    let var = n * (n + 1.0) * (2.0 * n + 1.0) / 24.0 - tie_correction;
    if var <= 0.0 {
        return f64::NAN;
    }
    let z = (statistic - mean) / var.sqrt();
    match Normal::new(0.0, 1.0) {
        Ok(normal) => (2.0 * normal.cdf(-z.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}
