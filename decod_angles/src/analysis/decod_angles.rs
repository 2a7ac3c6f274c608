//! Per-subject reduction of the angle classifiers into circular statistics.
//!
//! Every array in [`TuningResults`] has the subject as its leading axis, in
//! the order the subjects were fed in.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::{s, stack, Array1, Array2, Array3, ArrayView, Axis, Dimension, RemoveAxis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::predict::{
    aligned_error, diagonal_error, diagonal_prediction, generalization_error, toi_average,
};
use crate::config::{
    self, peak_window, subscores, visibility, Artifact, Layout, PathParams, AVERAGE_SUBJECT,
    EARLY_WINDOWS, N_BINS, N_VIS, TOIS,
};
use crate::data_handling::decod::{DecodDataset, SubjectDecoding};
use crate::helper_functions::write_json;
use crate::models::{Dataset, NanArray, Toi};
use crate::stats::{
    angle_acc, angle_acc_axis, bin_centers, circ_tuning, nan_mean_axis, repeated_spearman,
    wrap_angle,
};

/// Tolerance under which two true angles are the same stimulus.
const ANGLE_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscoreResults {
    /// subject × time
    pub dynamics: NanArray,
    /// subject × toi
    pub toi: NanArray,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResults {
    pub analysis: String,
    pub subjects: Vec<String>,
    pub times: Vec<f64>,
    pub bins: Vec<f64>,
    pub tois: Vec<Toi>,
    /// Distinct true angles, in the order of `angle_pred`'s second axis.
    pub angles: Vec<f64>,
    /// subject × time
    pub diagonal: NanArray,
    /// subject × angle × bin
    pub angle_pred: NanArray,
    /// subject × toi × bin
    pub toi: NanArray,
    pub subscore: BTreeMap<String, SubscoreResults>,
    /// subject × toi × visibility × lag
    pub align_on_diag: NanArray,
    /// subject × toi × lag
    pub r_vis_duration: NanArray,
    /// subject × early window × time
    pub early_maintain: NanArray,
}

/// One subject's share of [`TuningResults`], without the subject axis.
#[derive(Debug, Clone)]
pub struct SubjectTuning {
    pub times: Vec<f64>,
    pub diagonal: Array1<f64>,
    pub angle_pred: Array2<f64>,
    pub toi: Array2<f64>,
    pub subscore: BTreeMap<String, (Array1<f64>, Array1<f64>)>,
    pub align_on_diag: Array3<f64>,
    pub r_vis_duration: Array2<f64>,
    pub early_maintain: Array2<f64>,
}

/// Sorted distinct angles, merging values closer than the tolerance.
pub fn unique_angles(y_true: &[f64]) -> Vec<f64> {
    let mut angles: Vec<f64> = y_true.iter().copied().filter(|a| !a.is_nan()).collect();
    angles.sort_by(f64::total_cmp);
    angles.dedup_by(|a, b| (*a - *b).abs() < ANGLE_TOL);
    angles
}

pub fn subject_tuning(
    subject: &SubjectDecoding,
    analysis: &str,
    angles: &[f64],
) -> PolarsResult<SubjectTuning> {
    let gat = &subject.gat;
    let times = gat.times();
    let n_times = gat.n_times();
    let subevents = subject.subevents()?;

    // Mean error across trials on the diagonal
    let y_error = diagonal_error(gat);
    let diagonal = angle_acc_axis(&y_error, Axis(0));

    // Prediction tuning of each true angle at the peak window
    let peak = peak_window(analysis);
    let y_pred = toi_average(&diagonal_prediction(gat), times, peak);
    let mut angle_pred = Array2::from_elem((angles.len(), N_BINS), f64::NAN);
    for (mut row, &angle) in angle_pred.rows_mut().into_iter().zip(angles) {
        let sel = gat
            .y_true
            .iter()
            .zip(&y_pred)
            .filter(|(truth, _)| wrap_angle(**truth - angle).abs() < ANGLE_TOL)
            .map(|(_, &pred)| pred);
        let (probas, _) = circ_tuning(sel, N_BINS);
        row.assign(&probas);
    }

    // Error tuning per toi
    let mut toi = Array2::from_elem((TOIS.len(), N_BINS), f64::NAN);
    for (mut row, &window) in toi.rows_mut().into_iter().zip(TOIS.iter()) {
        let (probas, _) = circ_tuning(toi_average(&y_error, times, window), N_BINS);
        row.assign(&probas);
    }

    // Error dynamics and per-toi accuracy of each visibility subselection
    let toi_errors: Vec<Array1<f64>> =
        TOIS.iter().map(|&window| toi_average(&y_error, times, window)).collect();
    let mut subscore = BTreeMap::new();
    for sub in subscores() {
        let sel = subevents.query(sub.query.clone())?;
        let entry = if sel.is_empty() {
            info!("{}: no trial matches '{}'", subject.subject, sub.name);
            (Array1::from_elem(n_times, f64::NAN), Array1::from_elem(TOIS.len(), f64::NAN))
        } else {
            let dynamics = angle_acc_axis(&y_error.select(Axis(0), &sel), Axis(0));
            let per_toi = toi_errors
                .iter()
                .map(|errors| angle_acc(sel.iter().map(|&k| errors[k])))
                .collect();
            (dynamics, per_toi)
        };
        subscore.insert(sub.name.to_string(), entry);
    }

    // Duration: realign on the diagonal and split by visibility
    let present = subevents.query(col("target_present").eq(lit(true)))?;
    let detect_button = subevents.f64_column("detect_button")?;
    let mut align_on_diag = Array3::from_elem((TOIS.len(), N_VIS, n_times), f64::NAN);
    let mut r_vis_duration = Array2::from_elem((TOIS.len(), n_times), f64::NAN);
    for (t, &window) in TOIS.iter().enumerate() {
        let aligned = aligned_error(gat, window);
        for pas in 0..N_VIS {
            let sel = subevents.query(visibility(pas as i64))?;
            if sel.is_empty() {
                continue;
            }
            // accuracy across trials, then mean across the toi's classifiers
            let acc = angle_acc_axis(&aligned.select(Axis(0), &sel), Axis(0));
            align_on_diag
                .slice_mut(s![t, pas, ..])
                .assign(&nan_mean_axis(&acc, Axis(0)));
        }

        if present.is_empty() {
            continue;
        }
        let x = angle_acc_axis(&aligned.select(Axis(0), &present), Axis(1));
        let vis: Vec<f64> = present.iter().map(|&k| detect_button[k]).collect();
        r_vis_duration.row_mut(t).assign(&repeated_spearman(&x, &vis));
    }

    // Maintenance of the early classifiers
    let mut early_maintain = Array2::from_elem((EARLY_WINDOWS.len(), n_times), f64::NAN);
    for (mut row, &window) in early_maintain.rows_mut().into_iter().zip(EARLY_WINDOWS.iter()) {
        row.assign(&angle_acc_axis(&generalization_error(gat, window), Axis(0)));
    }

    Ok(SubjectTuning {
        times: times.to_vec(),
        diagonal,
        angle_pred,
        toi,
        subscore,
        align_on_diag,
        r_vis_duration,
        early_maintain,
    })
}

/// Stacks per-subject arrays along a new leading subject axis.
pub(crate) fn stack_subjects<D>(arrays: &[ArrayView<'_, f64, D>]) -> PolarsResult<NanArray>
where
    D: Dimension,
    D::Larger: RemoveAxis,
{
    stack(Axis(0), arrays)
        .map(NanArray::from)
        .map_err(|e| PolarsError::ShapeMismatch(format!("cannot stack subjects: {e}").into()))
}

/// Reduces every subject, in iteration order, into one result set.
pub fn aggregate_tuning<I>(analysis: &str, subjects: I) -> PolarsResult<TuningResults>
where
    I: IntoIterator<Item = PolarsResult<SubjectDecoding>>,
{
    let mut names = Vec::new();
    let mut per_subject: Vec<SubjectTuning> = Vec::new();
    let mut angles: Option<Vec<f64>> = None;

    for (s, subject) in subjects.into_iter().enumerate() {
        let subject = subject?;
        info!("{analysis}: subject {s} ({})", subject.subject);
        let angles: &[f64] =
            angles.get_or_insert_with(|| unique_angles(&subject.gat.y_true.to_vec()));
        let tuning = subject_tuning(&subject, analysis, angles)?;
        if let Some(first) = per_subject.first() {
            if first.times != tuning.times {
                return Err(PolarsError::ShapeMismatch(
                    format!("{}: time axis differs from the first subject", subject.subject).into(),
                ));
            }
        }
        names.push(subject.subject);
        per_subject.push(tuning);
    }

    let Some(first) = per_subject.first() else {
        return Err(PolarsError::NoData(format!("{analysis}: no subject to aggregate").into()));
    };

    let mut subscore = BTreeMap::new();
    for name in first.subscore.keys() {
        let dynamics: Vec<_> = per_subject.iter().map(|r| r.subscore[name].0.view()).collect();
        let toi: Vec<_> = per_subject.iter().map(|r| r.subscore[name].1.view()).collect();
        subscore.insert(
            name.clone(),
            SubscoreResults { dynamics: stack_subjects(&dynamics)?, toi: stack_subjects(&toi)? },
        );
    }

    macro_rules! stacked {
        ($field:ident) => {
            stack_subjects(&per_subject.iter().map(|r| r.$field.view()).collect::<Vec<_>>())?
        };
    }

    Ok(TuningResults {
        analysis: analysis.to_string(),
        subjects: names,
        times: first.times.clone(),
        bins: bin_centers(N_BINS).to_vec(),
        tois: TOIS.to_vec(),
        angles: angles.unwrap_or_default(),
        diagonal: stacked!(diagonal),
        angle_pred: stacked!(angle_pred),
        toi: stacked!(toi),
        subscore,
        align_on_diag: stacked!(align_on_diag),
        r_vis_duration: stacked!(r_vis_duration),
        early_maintain: stacked!(early_maintain),
    })
}

/// Score path of the tuning results of `analysis`.
pub fn tuning_path(layout: &Layout, analysis: &str) -> PolarsResult<PathBuf> {
    let params = PathParams::default()
        .subject(AVERAGE_SUBJECT)
        .analysis(&format!("{analysis}-tuning"));
    layout.path(Artifact::Score, &params)
}

/// Loads every subject of `analysis`, aggregates and saves the results.
pub fn run_decod_angles(layout: &Layout, analysis: &str) -> PolarsResult<PathBuf> {
    let subjects = config::SUBJECTS.iter().map(|&subject| {
        DecodDataset::for_subject(layout, subject, analysis)?.load()
    });
    let results = aggregate_tuning(analysis, subjects)?;

    let missing = results.subscore.iter().filter(|(_, r)| r.toi.iter().all(|v| v.is_nan()));
    for (name, _) in missing {
        warn!("{analysis}: subselection '{name}' is empty for every subject");
    }

    let fname = tuning_path(layout, analysis)?;
    write_json(&results, &fname)?;
    info!("{analysis}: results saved to {}", fname.display());
    Ok(fname)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data_handling::events::Events;
    use crate::models::Gat;
    use ndarray::array;
    use polars::df;
    use std::f64::consts::FRAC_PI_2;

    /// Samples every 50 ms from -100 ms to 1.2 s.
    pub(crate) fn times() -> Array1<f64> {
        (0..27).map(|i| -0.1 + i as f64 * 0.05).collect()
    }

    /// Six trials over two angles, all seen with ratings 1..3, decoded
    /// perfectly after 100 ms.
    pub(crate) fn subject(name: &str) -> SubjectDecoding {
        let times = times();
        let y_true = array![0.5, 2.5, 0.5, 2.5, 0.5, 2.5];
        let y_pred = Array3::from_shape_fn((6, times.len(), times.len()), |(k, i, j)| {
            if times[i] >= 0.1 && times[j] >= 0.1 {
                y_true[k]
            } else {
                y_true[k] + std::f64::consts::PI
            }
        });
        let events = Events::new(
            df![
                "detect_button" => &[1i64, 2, 3, 1, 2, 3, 0],
                "target_present" => &[true, true, true, true, true, true, false],
            ]
            .unwrap(),
        );
        SubjectDecoding {
            subject: name.to_string(),
            gat: Gat { times, y_true, y_pred },
            events_sel: (0..6).collect(),
            events,
        }
    }

    #[test]
    fn unique_angles_merge_close_values() {
        assert_eq!(unique_angles(&[2.5, 0.5, 0.5 + 1e-9, f64::NAN]), vec![0.5, 2.5]);
    }

    #[test]
    fn perfect_decoding_after_onset() {
        let s = subject("ak130184");
        let tuning = subject_tuning(&s, config::TARGET_ANALYSIS, &[0.5, 2.5]).unwrap();

        assert!((tuning.diagonal[5] - FRAC_PI_2).abs() < 1e-9);
        assert!((tuning.diagonal[0] + FRAC_PI_2).abs() < 1e-9);
        // each angle's prediction falls in a single bin
        for row in tuning.angle_pred.rows() {
            assert_eq!(row.iter().filter(|&&p| p == 1.0).count(), 1);
        }
        let (seen_dynamics, seen_toi) = &tuning.subscore["seen"];
        assert!((seen_dynamics[10] - FRAC_PI_2).abs() < 1e-9);
        assert!((seen_toi[2] - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn empty_subselections_are_nan_placeholders() {
        let s = subject("ak130184");
        let tuning = subject_tuning(&s, config::TARGET_ANALYSIS, &[0.5, 2.5]).unwrap();

        for name in ["unseen", "pas0", "absent"] {
            let (dynamics, toi) = &tuning.subscore[name];
            assert_eq!(dynamics.len(), s.gat.n_times());
            assert_eq!(toi.len(), TOIS.len());
            assert!(dynamics.iter().chain(toi.iter()).all(|v| v.is_nan()), "{name}");
        }
        // no unseen trial: the visibility-0 duration row is NaN, the others are not
        assert!(tuning.align_on_diag.slice(s![2, 0, ..]).iter().all(|v| v.is_nan()));
        assert!(tuning.align_on_diag[[2, 3, 0]].is_finite());
    }

    #[test]
    fn aggregation_keeps_subject_order_and_shapes() {
        let subjects = [subject("ak130184"), subject("el130086")];
        let results =
            aggregate_tuning(config::TARGET_ANALYSIS, subjects.into_iter().map(Ok)).unwrap();

        assert_eq!(results.subjects, vec!["ak130184", "el130086"]);
        assert_eq!(results.diagonal.shape(), &[2, 27]);
        assert_eq!(results.angle_pred.shape(), &[2, 2, N_BINS]);
        assert_eq!(results.toi.shape(), &[2, TOIS.len(), N_BINS]);
        assert_eq!(results.align_on_diag.shape(), &[2, TOIS.len(), N_VIS, 27]);
        assert_eq!(results.r_vis_duration.shape(), &[2, TOIS.len(), 27]);
        assert_eq!(results.early_maintain.shape(), &[2, EARLY_WINDOWS.len(), 27]);
        assert_eq!(results.subscore["absent"].toi.shape(), &[2, TOIS.len()]);
    }

    #[test]
    fn serialized_results_are_reproducible() {
        let run = || {
            let subjects = [subject("ak130184"), subject("el130086")];
            let results =
                aggregate_tuning(config::PROBE_ANALYSIS, subjects.into_iter().map(Ok)).unwrap();
            serde_json::to_vec(&results).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn mismatched_time_axes_are_rejected() {
        let mut other = subject("el130086");
        other.gat.times[0] = -0.2;
        let subjects = [subject("ak130184"), other];
        assert!(aggregate_tuning(config::TARGET_ANALYSIS, subjects.into_iter().map(Ok)).is_err());
    }
}
