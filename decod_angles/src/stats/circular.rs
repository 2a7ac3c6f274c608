//! Circular statistics on angles in radians.
//!
//! Every reduction skips NaNs and returns NaN when nothing is left.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use log::debug;
use ndarray::{Array, Array1, ArrayBase, Axis, Data, RemoveAxis};

/// Wraps an angle to `[-π, π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

pub fn circ_mean<I>(angles: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (mut sin, mut cos, mut n) = (0.0, 0.0, 0usize);
    for a in angles.into_iter().filter(|a| !a.is_nan()) {
        sin += a.sin();
        cos += a.cos();
        n += 1;
    }
    if n == 0 {
        return f64::NAN;
    }
    sin.atan2(cos)
}

/// Accuracy of angular errors: `π/2 - mean |error|`.
///
/// Uniformly distributed errors score 0, perfect predictions score `π/2`.
pub fn angle_acc<I>(errors: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (mut sum, mut n) = (0.0, 0usize);
    for e in errors.into_iter().filter(|e| !e.is_nan()) {
        sum += wrap_angle(e).abs();
        n += 1;
    }
    if n == 0 {
        return f64::NAN;
    }
    FRAC_PI_2 - sum / n as f64
}

pub fn circ_mean_axis<S, D>(angles: &ArrayBase<S, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: RemoveAxis,
{
    angles.map_axis(axis, |lane| circ_mean(lane.iter().copied()))
}

pub fn angle_acc_axis<S, D>(errors: &ArrayBase<S, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: RemoveAxis,
{
    errors.map_axis(axis, |lane| angle_acc(lane.iter().copied()))
}

/// Centres of `n_bins` equal bins covering `[-π, π)`.
pub fn bin_centers(n_bins: usize) -> Array1<f64> {
    let width = TAU / n_bins as f64;
    (0..n_bins).map(|i| -PI + (i as f64 + 0.5) * width).collect()
}

/// Circular tuning curve: probability of each angle bin.
///
/// Returns the probabilities and the bin centres.
pub fn circ_tuning<I>(angles: I, n_bins: usize) -> (Array1<f64>, Array1<f64>)
where
    I: IntoIterator<Item = f64>,
{
    let width = TAU / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    let mut total = 0usize;
    for a in angles.into_iter().filter(|a| !a.is_nan()) {
        let idx = (((wrap_angle(a) + PI) / width).floor() as usize).min(n_bins - 1);
        counts[idx] += 1;
        total += 1;
    }

    let probas = if total == 0 {
        debug!("empty tuning curve over {n_bins} bins");
        Array1::from_elem(n_bins, f64::NAN)
    } else {
        counts.iter().map(|&c| c as f64 / total as f64).collect()
    };
    (probas, bin_centers(n_bins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn wrap_keeps_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert_eq!(wrap_angle(PI), -PI);
    }

    #[test]
    fn circ_mean_crosses_the_discontinuity() {
        let m = circ_mean([PI - 0.1, -PI + 0.1]);
        assert!((m.abs() - PI).abs() < 1e-9, "{m}");
        assert!((circ_mean([f64::NAN, 0.2, f64::NAN, 0.4]) - 0.3).abs() < 1e-9);
        assert!(circ_mean(Vec::new()).is_nan());
    }

    #[test]
    fn angle_acc_bounds() {
        assert!((angle_acc([0.0, 0.0]) - FRAC_PI_2).abs() < 1e-12);
        assert!((angle_acc([PI, -PI]) + FRAC_PI_2).abs() < 1e-12);
        assert!(angle_acc([f64::NAN]).is_nan());
    }

    #[test]
    fn axis_reductions_skip_nans() {
        let errors = array![[0.0, f64::NAN], [0.0, 1.0], [f64::NAN, f64::NAN]];
        let acc = angle_acc_axis(&errors, Axis(0));
        assert!((acc[0] - FRAC_PI_2).abs() < 1e-12);
        assert!((acc[1] - (FRAC_PI_2 - 1.0)).abs() < 1e-12);

        let per_trial = circ_mean_axis(&errors, Axis(1));
        assert!(per_trial[2].is_nan());
        assert!((per_trial[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn uniform_angles_give_flat_tuning() {
        const N: usize = 24;
        let mut rng = StdRng::seed_from_u64(42);
        let angles: Vec<f64> = (0..240_000).map(|_| rng.gen_range(-PI..PI)).collect();
        let (probas, bins) = circ_tuning(angles, N);

        assert_eq!(bins.len(), N);
        assert!((probas.sum() - 1.0).abs() < 1e-9);
        let flat = 1.0 / N as f64;
        for p in &probas {
            assert!((p - flat).abs() < 0.1 * flat, "{p} vs {flat}");
        }
    }

    #[test]
    fn tuning_peaks_on_the_matching_bin() {
        let (probas, bins) = circ_tuning([0.01, 0.02, 2.0 * PI + 0.03], 4);
        assert_eq!(probas.to_vec(), vec![0.0, 0.0, 1.0, 0.0]);
        assert!((bins[2] - PI / 4.0).abs() < 1e-12);

        let (empty, _) = circ_tuning([f64::NAN], 4);
        assert!(empty.iter().all(|p| p.is_nan()));
    }
}
