//! Prediction errors read off the generalization-across-time grid.
//!
//! All errors are wrapped to `[-π, π)`; a NaN reference angle (e.g. an
//! absent stimulus) propagates as NaN.

use ndarray::{Array1, Array2, Array3, Axis};

use crate::models::{Gat, Toi};
use crate::stats::{circ_mean, circ_mean_axis, wrap_angle};

/// Error of every trial and grid cell against per-trial `reference` angles.
pub fn prediction_error(gat: &Gat, reference: &Array1<f64>) -> Array3<f64> {
    let mut err = gat.y_pred.clone();
    for (mut trial, &truth) in err.axis_iter_mut(Axis(0)).zip(reference.iter()) {
        trial.mapv_inplace(|p| wrap_angle(p - truth));
    }
    err
}

/// Diagonal (train time == test time) error against `reference`: trials × times.
pub fn diagonal_error_against(gat: &Gat, reference: &Array1<f64>) -> Array2<f64> {
    let (n_trials, n_times, _) = gat.y_pred.dim();
    Array2::from_shape_fn((n_trials, n_times), |(k, t)| {
        wrap_angle(gat.y_pred[[k, t, t]] - reference[k])
    })
}

pub fn diagonal_error(gat: &Gat) -> Array2<f64> {
    diagonal_error_against(gat, &gat.y_true)
}

/// Raw diagonal predictions: trials × times.
pub fn diagonal_prediction(gat: &Gat) -> Array2<f64> {
    let (n_trials, n_times, _) = gat.y_pred.dim();
    Array2::from_shape_fn((n_trials, n_times), |(k, t)| gat.y_pred[[k, t, t]])
}

/// Per-trial circular mean of `per_time` (trials × times) over the samples in `toi`.
pub fn toi_average(per_time: &Array2<f64>, times: &[f64], toi: Toi) -> Array1<f64> {
    let idx = toi.indices(times);
    circ_mean_axis(&per_time.select(Axis(1), &idx), Axis(1))
}

/// Classifiers trained inside `toi`, tested at every time: trials × test time.
///
/// The error of each trial is circularly averaged over those classifiers.
pub fn generalization_error(gat: &Gat, toi: Toi) -> Array2<f64> {
    let train = toi.indices(gat.times());
    let (n_trials, _, n_test) = gat.y_pred.dim();
    Array2::from_shape_fn((n_trials, n_test), |(k, j)| {
        circ_mean(train.iter().map(|&i| wrap_angle(gat.y_pred[[k, i, j]] - gat.y_true[k])))
    })
}

/// Errors of the classifiers trained inside `toi`, realigned on the diagonal.
///
/// Shape: trials × classifier × lag, where lag 0 is the classifier's own
/// training time and lag `l` tests `l` samples later. Lags running past the
/// last sample are NaN.
pub fn aligned_error(gat: &Gat, toi: Toi) -> Array3<f64> {
    let train = toi.indices(gat.times());
    let (n_trials, _, n_test) = gat.y_pred.dim();
    Array3::from_shape_fn((n_trials, train.len(), n_test), |(k, c, lag)| {
        let i = train[c];
        let j = i + lag;
        if j < n_test {
            wrap_angle(gat.y_pred[[k, i, j]] - gat.y_true[k])
        } else {
            f64::NAN
        }
    })
}
