use std::fmt;

use ndarray::{Array, ArrayBase, Axis, Data, RemoveAxis};

use super::rank::wilcoxon;

fn finite(x: &[f64]) -> impl Iterator<Item = f64> + '_ {
    x.iter().copied().filter(|v| !v.is_nan())
}

pub fn nan_count(x: &[f64]) -> usize {
    finite(x).count()
}

pub fn nan_mean(x: &[f64]) -> f64 {
    let n = nan_count(x);
    if n == 0 {
        return f64::NAN;
    }
    finite(x).sum::<f64>() / n as f64
}

/// Population standard deviation (ddof = 0) of the non-NaN values.
pub fn nan_std(x: &[f64]) -> f64 {
    let n = nan_count(x);
    if n == 0 {
        return f64::NAN;
    }
    let mean = nan_mean(x);
    (finite(x).map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt()
}

pub fn nan_sem(x: &[f64]) -> f64 {
    nan_std(x) / (nan_count(x) as f64).sqrt()
}

pub fn nan_mean_axis<S, D>(a: &ArrayBase<S, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: RemoveAxis,
{
    a.map_axis(axis, |lane| nan_mean(&lane.to_vec()))
}

pub fn nan_sem_axis<S, D>(a: &ArrayBase<S, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: RemoveAxis,
{
    a.map_axis(axis, |lane| nan_sem(&lane.to_vec()))
}

/// Wilcoxon p-value of every lane along `axis`.
pub fn wilcoxon_axis<S, D>(a: &ArrayBase<S, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: RemoveAxis,
{
    a.map_axis(axis, |lane| wilcoxon(&lane.to_vec()).pvalue)
}

/// Group summary across subjects: mean, standard error and Wilcoxon p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanSem {
    pub mean: f64,
    pub sem: f64,
    pub pvalue: f64,
}

impl MeanSem {
    pub fn new(x: &[f64]) -> Self {
        Self {
            mean: nan_mean(x),
            sem: nan_sem(x),
            pvalue: wilcoxon(x).pvalue,
        }
    }

    pub fn is_significant(&self) -> bool {
        self.pvalue < 0.05
    }
}

impl fmt::Display for MeanSem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}+/-{:.3}, p={:.4}]", self.mean, self.sem, self.pvalue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn nans_do_not_change_the_summary() {
        let clean = [0.1, 0.3, -0.2, 0.4, 0.5, 0.2];
        let interleaved = [f64::NAN, 0.1, 0.3, f64::NAN, -0.2, 0.4, 0.5, 0.2];
        let trailing = [0.1, 0.3, -0.2, 0.4, 0.5, 0.2, f64::NAN, f64::NAN];

        let expected = MeanSem::new(&clean);
        assert_eq!(MeanSem::new(&interleaved), expected);
        assert_eq!(MeanSem::new(&trailing), expected);
        assert_eq!(nan_count(&trailing), 6);
    }

    #[test]
    fn sem_uses_population_std() {
        let x = [1.0, 3.0, f64::NAN];
        assert_eq!(nan_mean(&x), 2.0);
        assert_eq!(nan_std(&x), 1.0);
        assert!((nan_sem(&x) - 1.0 / 2f64.sqrt()).abs() < 1e-12);
        assert!(nan_mean(&[f64::NAN]).is_nan());
    }

    #[test]
    fn display_matches_table_cells() {
        let s = MeanSem { mean: 0.1234, sem: 0.01, pvalue: 0.04 };
        assert_eq!(s.to_string(), "[0.123+/-0.010, p=0.0400]");
        assert!(s.is_significant());
    }

    #[test]
    fn axis_helpers_reduce_subjects() {
        let a = array![[1.0, f64::NAN], [3.0, 2.0]];
        let m = nan_mean_axis(&a, Axis(0));
        assert_eq!(m.to_vec(), vec![2.0, 2.0]);
        let p = wilcoxon_axis(&a, Axis(0));
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 1.0).abs() < 1e-12);
    }
}
