//! Figures and tables of the target/probe decoding bias.

use std::f64::consts::FRAC_PI_3;

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use plotters::prelude::*;
use polars::prelude::*;
use tracing::info;

use super::plots::{draw_bar_sem, draw_decod, draw_gat, draw_tuning, TILT_COLORS, VIS_COLORS};
use super::Report;
use crate::analysis::target_probe::{BiasResults, CLASSIFIERS, REFERENCES};
use crate::config::{PROBE_ONSET, TILTS};
use crate::models::polars_err;
use crate::stats::{nan_count, nan_mean_axis, nan_std, repeated_spearman, MeanSem};

const CLIM: f64 = 0.1;
/// Toi of the direct target/probe contrast.
const CONTRAST_TOI: usize = 3;
const REF_PROBE: usize = 1;

/// Stimuli whose classifier bias is split by visibility.
pub const STIMULI: [&str; 2] = ["target", "probe"];

/// Subjects × visibility bias of classifier `clf`, against the probe angle.
fn vis_scores(results: &BiasResults, clf: usize, toi: usize) -> PolarsResult<Array2<f64>> {
    results
        .bias_vis_toi
        .slice(s![.., clf, REF_PROBE, .., toi])
        .to_owned()
        .into_dimensionality()
        .map_err(|e| polars_err(Box::new(e)))
}

/// Rows `vis0..vis3` and `diff` (vis3 - vis0), one column per toi.
pub fn visibility_table(results: &BiasResults, clf: usize) -> PolarsResult<Vec<Vec<String>>> {
    let mut header = vec![String::new()];
    header.extend(results.tois.iter().map(|toi| toi.to_string()));
    let mut rows: Vec<Vec<String>> =
        ["vis0", "vis1", "vis2", "vis3", "diff"].iter().map(|r| vec![r.to_string()]).collect();

    for t in 0..results.tois.len() {
        let scores = vis_scores(results, clf, t)?;
        let mut columns: Vec<Array1<f64>> =
            scores.axis_iter(Axis(1)).map(|c| c.to_owned()).collect();
        let diff = match (columns.first(), columns.last()) {
            (Some(first), Some(last)) => Some(last - first),
            _ => None,
        };
        columns.extend(diff);
        for (row, column) in rows.iter_mut().zip(&columns) {
            row.push(MeanSem::new(&column.to_vec()).to_string());
        }
    }

    let mut table = vec![header];
    table.extend(rows);
    Ok(table)
}

/// Probe-classifier minus target-classifier bias at the last toi, against the probe.
pub fn target_probe_contrast(results: &BiasResults) -> MeanSem {
    let probe = results.bias_toi.slice(s![.., 1, REF_PROBE, CONTRAST_TOI]);
    let target = results.bias_toi.slice(s![.., 0, REF_PROBE, CONTRAST_TOI]);
    MeanSem::new(&(&probe - &target).to_vec())
}

/// Per-subject Spearman R between target-classifier bias and visibility.
pub fn visibility_correlation(
    results: &BiasResults,
    toi: usize,
) -> PolarsResult<(Array1<f64>, MeanSem)> {
    let scores = vis_scores(results, 0, toi)?;
    let ratings: Vec<f64> = (0..scores.ncols()).map(|v| v as f64).collect();
    let all_r = repeated_spearman(&scores.t(), &ratings);

    let r = all_r.to_vec();
    let mut summary = MeanSem::new(&r);
    // spread over every subject, including those without a coefficient
    summary.sem = nan_std(&r) / (all_r.len() as f64).sqrt();
    Ok((all_r, summary))
}

pub fn correlation_table(results: &BiasResults) -> PolarsResult<Vec<Vec<String>>> {
    let mut table = vec![vec!["toi".to_string(), "R".to_string(), "n".to_string()]];
    for (t, toi) in results.tois.iter().enumerate() {
        let (all_r, summary) = visibility_correlation(results, t)?;
        table.push(vec![
            toi.to_string(),
            summary.to_string(),
            nan_count(&all_r.to_vec()).to_string(),
        ]);
    }
    Ok(table)
}

fn subjects_by_bins(
    results: &BiasResults,
    clf: usize,
    reference: usize,
    tilt: usize,
) -> PolarsResult<ArrayView2<'_, f64>> {
    results
        .tuning
        .slice(s![.., clf, reference, .., tilt])
        .into_dimensionality()
        .map_err(|e| polars_err(Box::new(e)))
}

/// Error tuning at probe time, per classifier and reference, split by tilt.
pub fn plot_cross_generalization(report: &mut Report, results: &BiasResults) -> PolarsResult<()> {
    let path = report.add_figure("target_probe", "cross_generalization")?;
    let root = BitMapBackend::new(&path, (1000, 760)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    for (idx, panel) in root.split_evenly((2, 2)).iter().enumerate() {
        let (clf, reference) = (idx / 2, idx % 2);
        // the other stimulus sits at +tilt from the target, -tilt from the probe
        let side = if reference == 0 { 1.0 } else { -1.0 };

        let mut curves = Vec::new();
        let mut vlines = Vec::new();
        for (t, &tilt) in TILTS.iter().enumerate() {
            curves.push((subjects_by_bins(results, clf, reference, t)?, TILT_COLORS[t]));
            if tilt != 0 {
                vlines.push((side * tilt as f64 * FRAC_PI_3, TILT_COLORS[t]));
            }
        }
        let title = format!("clf {} / error to {}", STIMULI[clf], STIMULI[reference]);
        draw_tuning(panel, &title, &results.bins, &curves, &vlines)?;
    }
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Bias generalization matrices with per-cell significance.
pub fn plot_bias_gat(report: &mut Report, results: &BiasResults) -> PolarsResult<()> {
    let path = report.add_figure("gat", "bias")?;
    let root = BitMapBackend::new(&path, (1000, 920)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    for (idx, panel) in root.split_evenly((2, 2)).iter().enumerate() {
        let (clf, reference) = (idx / 2, idx % 2);
        let bias = results.bias.slice(s![.., clf, reference, .., ..]);
        let mean: Array2<f64> = nan_mean_axis(&bias, Axis(0))
            .into_dimensionality()
            .map_err(|e| polars_err(Box::new(e)))?;
        let sig: Array2<bool> = results
            .bias_pval
            .slice(s![clf, reference, .., ..])
            .mapv(|p| p < 0.05)
            .into_dimensionality()
            .map_err(|e| polars_err(Box::new(e)))?;
        let title = format!("clf {} / error to {}", STIMULI[clf], STIMULI[reference]);
        draw_gat(panel, &title, &results.times, &mean, &sig, CLIM, &[PROBE_ONSET])?;
    }
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Diagonal of the target classifier's bias towards the probe.
pub fn plot_bias_diagonal(report: &mut Report, results: &BiasResults) -> PolarsResult<()> {
    let n_times = results.times.len();
    let bias = results.bias.slice(s![.., 0, REF_PROBE, .., ..]);
    let scores =
        Array2::from_shape_fn((results.subjects.len(), n_times), |(s, t)| bias[[s, t, t]]);
    let sig: Vec<bool> =
        (0..n_times).map(|t| results.bias_pval[&[0, REF_PROBE, t, t][..]] < 0.05).collect();

    let path = report.add_figure("diagonal", "bias")?;
    let root = BitMapBackend::new(&path, (1050, 300)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;
    draw_decod(
        &root,
        "Decoding bias",
        &results.times,
        scores.view(),
        &sig,
        RGBColor(1, 102, 94),
        &[PROBE_ONSET],
    )?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Bias per visibility rating in each toi, one figure and table per stimulus.
pub fn plot_visibility(report: &mut Report, results: &BiasResults) -> PolarsResult<()> {
    for (clf, stimulus) in STIMULI.iter().enumerate() {
        let section = format!("visibility_{stimulus}");
        let path = report.add_figure(&section, "bias")?;
        let root = BitMapBackend::new(&path, (1200, 300)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

        let panels = root.split_evenly((1, results.tois.len()));
        for (t, (panel, toi)) in panels.iter().zip(&results.tois).enumerate() {
            let scores = vis_scores(results, clf, t)?;
            draw_bar_sem(panel, &toi.label(), scores.view(), &VIS_COLORS, -0.1..0.25)?;
        }
        root.present().map_err(|e| polars_err(Box::new(e)))?;

        let table = visibility_table(results, clf)?;
        report.add_table(&table, &format!("bias_{section}"), stimulus, "table")?;
    }
    Ok(())
}

/// Everything the bias report shows, in order.
pub fn bias_section(report: &mut Report, results: &BiasResults) -> PolarsResult<()> {
    info!(
        "Bias report over {} subjects and {} classifiers",
        results.subjects.len(),
        CLASSIFIERS.len()
    );
    plot_cross_generalization(report, results)?;
    plot_bias_gat(report, results)?;
    plot_bias_diagonal(report, results)?;
    plot_visibility(report, results)?;

    let contrast = target_probe_contrast(results);
    info!("probe - target bias at {}: {contrast}", results.tois[CONTRAST_TOI]);
    report.add_html(
        format!(
            "<p>Probe minus target classifier bias towards the {} at {}: {}</p>",
            REFERENCES[REF_PROBE],
            results.tois[CONTRAST_TOI].label(),
            super::escape(&contrast.to_string())
        ),
        "target_probe",
        "contrast",
    );

    for t in 0..results.tois.len() {
        let (_, summary) = visibility_correlation(results, t)?;
        info!("bias x visibility at {}: {summary}", results.tois[t]);
    }
    let table = correlation_table(results)?;
    report.add_table(&table, "bias_visibility_correlation", "target", "spearman")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{N_BINS, N_VIS, TOIS};
    use crate::models::NanArray;
    use ndarray::{ArrayD, IxDyn};

    /// Bias growing with visibility for every subject, larger for the probe classifier.
    fn results(n_subjects: usize) -> BiasResults {
        let n_times = 3;
        let bias_vis_toi = ArrayD::from_shape_fn(
            IxDyn(&[n_subjects, 2, 2, N_VIS, TOIS.len()]),
            |ix| 0.01 * (ix[3] as f64 + 1.0) * (ix[1] as f64 + 1.0) + 0.001 * ix[0] as f64,
        );
        let bias_toi = ArrayD::from_shape_fn(IxDyn(&[n_subjects, 2, 2, TOIS.len()]), |ix| {
            0.05 * (ix[1] as f64 + 1.0) + 0.001 * ix[0] as f64
        });
        BiasResults {
            subjects: (0..n_subjects).map(|s| format!("s{s}")).collect(),
            times: vec![0.0, 0.5, 1.0],
            bins: vec![0.0; N_BINS],
            tois: TOIS.to_vec(),
            tuning: NanArray::nan(&[n_subjects, 2, 2, N_BINS, 3]),
            bias: NanArray::nan(&[n_subjects, 2, 2, n_times, n_times]),
            bias_pval: NanArray::nan(&[2, 2, n_times, n_times]),
            bias_toi: NanArray(bias_toi),
            bias_vis_toi: NanArray(bias_vis_toi),
        }
    }

    #[test]
    fn visibility_table_layout() {
        let r = results(5);
        let table = visibility_table(&r, 0).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table[0].len(), TOIS.len() + 1);
        assert_eq!(table[0][1], TOIS[0].to_string());
        assert_eq!(table[5][0], "diff");
        // vis3 - vis0 = 0.03 for every subject
        assert!(table[5][1].starts_with("[0.030+/-0.000, p="), "{}", table[5][1]);
        assert_eq!(table[1][1], "[0.012+/-0.001, p=0.0625]");
    }

    #[test]
    fn contrast_is_probe_minus_target() {
        let c = target_probe_contrast(&results(6));
        assert!((c.mean - 0.05).abs() < 1e-12);
        assert!(c.sem.abs() < 1e-12);
    }

    #[test]
    fn monotonic_bias_correlates_with_visibility() {
        let r = results(5);
        let (all_r, summary) = visibility_correlation(&r, 2).unwrap();
        assert_eq!(all_r.len(), 5);
        assert!(all_r.iter().all(|&v| (v - 1.0).abs() < 1e-12));
        assert!((summary.mean - 1.0).abs() < 1e-12);
        assert_eq!(correlation_table(&r).unwrap().len(), TOIS.len() + 1);
    }

    #[test]
    fn correlation_ignores_missing_ratings() {
        let mut r = results(4);
        r.bias_vis_toi[&[0, 0, REF_PROBE, 1, 0][..]] = f64::NAN;
        let (all_r, _) = visibility_correlation(&r, 0).unwrap();
        assert!((all_r[0] - 1.0).abs() < 1e-12);
    }
}
