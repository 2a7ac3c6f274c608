//! Cross-generalization of the target and probe classifiers.
//!
//! Both classifiers are scored against both stimuli. Trials are split by
//! the probe tilt, and the bias is half the circular distance between the
//! mean error of the two tilt directions, signed so that a positive value
//! means the decoded angle is attracted towards the other stimulus.

use std::path::PathBuf;

use ndarray::{s, Array1, Array2, Array3, Array4, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::decod_angles::stack_subjects;
use super::predict::{diagonal_error_against, prediction_error, toi_average};
use crate::config::{
    peak_window, visibility, Artifact, Layout, PathParams, AVERAGE_SUBJECT, N_BINS, N_VIS,
    PROBE_ANALYSIS, SUBJECTS, TARGET_ANALYSIS, TARGET_PROBE, TILTS, TOIS,
};
use crate::data_handling::decod::{DecodDataset, SubjectDecoding};
use crate::data_handling::events::Events;
use crate::helper_functions::write_json;
use crate::models::{Dataset, NanArray, Toi};
use crate::stats::{bin_centers, circ_mean, circ_tuning, wilcoxon_axis, wrap_angle};

/// Classifier axis of every result array.
pub const CLASSIFIERS: [&str; 2] = [TARGET_ANALYSIS, PROBE_ANALYSIS];
/// Reference axis: events column the error is measured against.
pub const REFERENCES: [&str; 2] = ["target_angle", "probe_angle"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasResults {
    pub subjects: Vec<String>,
    pub times: Vec<f64>,
    pub bins: Vec<f64>,
    pub tois: Vec<Toi>,
    /// subject × clf × ref × bin × tilt
    pub tuning: NanArray,
    /// subject × clf × ref × train × test
    pub bias: NanArray,
    /// clf × ref × train × test
    pub bias_pval: NanArray,
    /// subject × clf × ref × toi
    pub bias_toi: NanArray,
    /// subject × clf × ref × visibility × toi
    pub bias_vis_toi: NanArray,
}

/// Sign of the other stimulus' offset for a `+1` probe tilt.
///
/// The probe sits at `target + tilt`, so measured from the probe the target
/// lies on the opposite side.
fn attraction_sign(reference: usize) -> f64 {
    if reference == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Signed half-difference between the circular means of `plus` and `minus`.
pub fn bias_between<I, J>(plus: I, minus: J, sign: f64) -> f64
where
    I: IntoIterator<Item = f64>,
    J: IntoIterator<Item = f64>,
{
    sign * wrap_angle(circ_mean(plus) - circ_mean(minus)) / 2.0
}

fn tilt_query(tilt: i64) -> Expr {
    col("probe_tilt").eq(lit(tilt))
}

struct SubjectBias {
    times: Vec<f64>,
    tuning: Array4<f64>,
    bias: Array4<f64>,
    bias_toi: Array3<f64>,
    bias_vis_toi: Array4<f64>,
}

/// One classifier scored against one reference.
struct ClassifierBias {
    tuning: Array2<f64>,
    bias: Array2<f64>,
    bias_toi: Array1<f64>,
    bias_vis_toi: Array2<f64>,
}

fn classifier_bias(
    decoding: &SubjectDecoding,
    subevents: &Events,
    reference: usize,
) -> PolarsResult<ClassifierBias> {
    let gat = &decoding.gat;
    let times = gat.times();
    let n_times = gat.n_times();
    let sign = attraction_sign(reference);

    let angles = Array1::from(subevents.f64_column(REFERENCES[reference])?);
    let err = prediction_error(gat, &angles);
    let diag = diagonal_error_against(gat, &angles);

    let plus = subevents.query(tilt_query(1))?;
    let minus = subevents.query(tilt_query(-1))?;
    if plus.is_empty() || minus.is_empty() {
        info!("{}: a tilt direction has no trial, bias is NaN", decoding.subject);
    }

    let peak = toi_average(&diag, times, peak_window(PROBE_ANALYSIS));
    let mut tuning = Array2::from_elem((N_BINS, TILTS.len()), f64::NAN);
    for (mut column, &tilt) in tuning.columns_mut().into_iter().zip(TILTS.iter()) {
        let sel = subevents.query(tilt_query(tilt))?;
        let (probas, _) = circ_tuning(sel.iter().map(|&k| peak[k]), N_BINS);
        column.assign(&probas);
    }

    let bias = Array2::from_shape_fn((n_times, n_times), |(i, j)| {
        bias_between(
            plus.iter().map(|&k| err[[k, i, j]]),
            minus.iter().map(|&k| err[[k, i, j]]),
            sign,
        )
    });

    let per_toi: Vec<Array1<f64>> =
        TOIS.iter().map(|&toi| toi_average(&diag, times, toi)).collect();
    let bias_toi = per_toi
        .iter()
        .map(|v| bias_between(plus.iter().map(|&k| v[k]), minus.iter().map(|&k| v[k]), sign))
        .collect();

    let mut bias_vis_toi = Array2::from_elem((N_VIS, TOIS.len()), f64::NAN);
    for pas in 0..N_VIS {
        let vis_plus = subevents.query(visibility(pas as i64).and(tilt_query(1)))?;
        let vis_minus = subevents.query(visibility(pas as i64).and(tilt_query(-1)))?;
        for (t, v) in per_toi.iter().enumerate() {
            bias_vis_toi[[pas, t]] = bias_between(
                vis_plus.iter().map(|&k| v[k]),
                vis_minus.iter().map(|&k| v[k]),
                sign,
            );
        }
    }

    Ok(ClassifierBias { tuning, bias, bias_toi, bias_vis_toi })
}

fn subject_bias(target: &SubjectDecoding, probe: &SubjectDecoding) -> PolarsResult<SubjectBias> {
    if target.gat.times != probe.gat.times {
        return Err(PolarsError::ShapeMismatch(
            format!("{}: target and probe classifiers use different times", target.subject)
                .into(),
        ));
    }
    let n_times = target.gat.n_times();
    let mut out = SubjectBias {
        times: target.gat.times().to_vec(),
        tuning: Array4::from_elem((2, 2, N_BINS, TILTS.len()), f64::NAN),
        bias: Array4::from_elem((2, 2, n_times, n_times), f64::NAN),
        bias_toi: Array3::from_elem((2, 2, TOIS.len()), f64::NAN),
        bias_vis_toi: Array4::from_elem((2, 2, N_VIS, TOIS.len()), f64::NAN),
    };

    for (c, decoding) in [target, probe].into_iter().enumerate() {
        let subevents = decoding.subevents()?;
        for r in 0..REFERENCES.len() {
            let scored = classifier_bias(decoding, &subevents, r)?;
            out.tuning.slice_mut(s![c, r, .., ..]).assign(&scored.tuning);
            out.bias.slice_mut(s![c, r, .., ..]).assign(&scored.bias);
            out.bias_toi.slice_mut(s![c, r, ..]).assign(&scored.bias_toi);
            out.bias_vis_toi.slice_mut(s![c, r, .., ..]).assign(&scored.bias_vis_toi);
        }
    }
    Ok(out)
}

/// Aggregates `(target, probe)` classifier pairs, one per subject.
pub fn aggregate_bias<I>(pairs: I) -> PolarsResult<BiasResults>
where
    I: IntoIterator<Item = PolarsResult<(SubjectDecoding, SubjectDecoding)>>,
{
    let mut names = Vec::new();
    let mut per_subject: Vec<SubjectBias> = Vec::new();
    for pair in pairs {
        let (target, probe) = pair?;
        info!("{TARGET_PROBE}: subject {}", target.subject);
        let bias = subject_bias(&target, &probe)?;
        if let Some(first) = per_subject.first() {
            if first.times != bias.times {
                return Err(PolarsError::ShapeMismatch(
                    format!("{}: time axis differs from the first subject", target.subject).into(),
                ));
            }
        }
        names.push(target.subject);
        per_subject.push(bias);
    }

    let Some(first) = per_subject.first() else {
        return Err(PolarsError::NoData(format!("{TARGET_PROBE}: no subject to aggregate").into()));
    };
    let times = first.times.clone();

    let tuning = stack_subjects(&per_subject.iter().map(|b| b.tuning.view()).collect::<Vec<_>>())?;
    let bias = stack_subjects(&per_subject.iter().map(|b| b.bias.view()).collect::<Vec<_>>())?;
    let bias_toi =
        stack_subjects(&per_subject.iter().map(|b| b.bias_toi.view()).collect::<Vec<_>>())?;
    let bias_vis_toi =
        stack_subjects(&per_subject.iter().map(|b| b.bias_vis_toi.view()).collect::<Vec<_>>())?;
    let bias_pval = NanArray::from(wilcoxon_axis(&*bias, Axis(0)));

    Ok(BiasResults {
        subjects: names,
        times,
        bins: bin_centers(N_BINS).to_vec(),
        tois: TOIS.to_vec(),
        tuning,
        bias,
        bias_pval,
        bias_toi,
        bias_vis_toi,
    })
}

pub fn bias_path(layout: &Layout) -> PolarsResult<PathBuf> {
    let params = PathParams::default().subject(AVERAGE_SUBJECT).analysis(TARGET_PROBE);
    layout.path(Artifact::Score, &params)
}

/// Loads both classifiers of every subject, aggregates and saves the bias.
pub fn run_target_probe(layout: &Layout) -> PolarsResult<PathBuf> {
    let pairs = SUBJECTS.iter().map(|&subject| {
        let target = DecodDataset::for_subject(layout, subject, TARGET_ANALYSIS)?.load()?;
        let probe = DecodDataset::for_subject(layout, subject, PROBE_ANALYSIS)?.load()?;
        Ok((target, probe))
    });
    let results = aggregate_bias(pairs)?;

    let fname = bias_path(layout)?;
    write_json(&results, &fname)?;
    info!("{TARGET_PROBE}: results saved to {}", fname.display());
    Ok(fname)
}
