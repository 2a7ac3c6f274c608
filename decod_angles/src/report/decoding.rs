//! Overview of the angle decoding itself, from the per-analysis tuning results.

use ndarray::{s, Array2, ArrayView2, Axis};
use plotters::prelude::*;
use polars::prelude::*;
use tracing::info;

use super::plots::{draw_decod, draw_tuning, VIS_COLORS};
use super::Report;
use crate::analysis::decod_angles::TuningResults;
use crate::config::{EARLY_WINDOWS, PROBE_ONSET};
use crate::models::{polars_err, NanArray};
use crate::stats::{wilcoxon_axis, MeanSem};

const DECOD_COLOR: RGBColor = RGBColor(84, 39, 136);

fn view2(values: &NanArray) -> PolarsResult<ArrayView2<'_, f64>> {
    values.view().into_dimensionality().map_err(|e| polars_err(Box::new(e)))
}

fn significant(scores: ArrayView2<'_, f64>) -> Vec<bool> {
    wilcoxon_axis(&scores, Axis(0)).iter().map(|&p| p < 0.05).collect()
}

/// Mean ± SEM of each subselection's accuracy, one column per toi.
pub fn subscore_table(results: &TuningResults) -> PolarsResult<Vec<Vec<String>>> {
    let mut header = vec![String::new()];
    header.extend(results.tois.iter().map(|toi| toi.to_string()));
    let mut table = vec![header];

    for (name, scores) in &results.subscore {
        let toi = view2(&scores.toi)?;
        let mut row = vec![name.clone()];
        row.extend(toi.axis_iter(Axis(1)).map(|c| MeanSem::new(&c.to_vec()).to_string()));
        table.push(row);
    }
    Ok(table)
}

fn plot_diagonal(report: &mut Report, results: &TuningResults) -> PolarsResult<()> {
    let diagonal = view2(&results.diagonal)?;
    let path = report.add_figure(&results.analysis, "diagonal")?;
    let root = BitMapBackend::new(&path, (1050, 300)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;
    draw_decod(
        &root,
        "Angle accuracy",
        &results.times,
        diagonal,
        &significant(diagonal),
        DECOD_COLOR,
        &[PROBE_ONSET],
    )?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

fn plot_toi_tuning(report: &mut Report, results: &TuningResults) -> PolarsResult<()> {
    let path = report.add_figure(&results.analysis, "toi_tuning")?;
    let root = BitMapBackend::new(&path, (1200, 300)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    let panels = root.split_evenly((1, results.tois.len()));
    for (t, (panel, toi)) in panels.iter().zip(&results.tois).enumerate() {
        let curve: ArrayView2<'_, f64> = results
            .toi
            .slice(s![.., t, ..])
            .into_dimensionality()
            .map_err(|e| polars_err(Box::new(e)))?;
        draw_tuning(panel, &toi.label(), &results.bins, &[(curve, DECOD_COLOR)], &[])?;
    }
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Prediction tuning of each true angle, colours cycling over the angles.
fn plot_angle_pred(report: &mut Report, results: &TuningResults) -> PolarsResult<()> {
    let path = report.add_figure(&results.analysis, "angle_pred")?;
    let root = BitMapBackend::new(&path, (700, 420)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    let mut curves = Vec::new();
    for a in 0..results.angles.len() {
        let curve: ArrayView2<'_, f64> = results
            .angle_pred
            .slice(s![.., a, ..])
            .into_dimensionality()
            .map_err(|e| polars_err(Box::new(e)))?;
        curves.push((curve, VIS_COLORS[a % VIS_COLORS.len()]));
    }
    let vlines: Vec<(f64, RGBColor)> = results
        .angles
        .iter()
        .enumerate()
        .map(|(a, &angle)| (angle, VIS_COLORS[a % VIS_COLORS.len()]))
        .collect();
    draw_tuning(&root, "Predicted angle", &results.bins, &curves, &vlines)?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

fn plot_early_maintain(report: &mut Report, results: &TuningResults) -> PolarsResult<()> {
    let path = report.add_figure(&results.analysis, "early_maintain")?;
    let root =
        BitMapBackend::new(&path, (1050, 300 * EARLY_WINDOWS.len() as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    let panels = root.split_evenly((EARLY_WINDOWS.len(), 1));
    for (w, (panel, window)) in panels.iter().zip(EARLY_WINDOWS.iter()).enumerate() {
        let scores: Array2<f64> = results
            .early_maintain
            .slice(s![.., w, ..])
            .to_owned()
            .into_dimensionality()
            .map_err(|e| polars_err(Box::new(e)))?;
        let title = format!("Classifiers trained {}", window.label());
        draw_decod(
            panel,
            &title,
            &results.times,
            scores.view(),
            &significant(scores.view()),
            DECOD_COLOR,
            &[PROBE_ONSET],
        )?;
    }
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Decoding overview of one analysis: figures and the subselection table.
pub fn decoding_section(report: &mut Report, results: &TuningResults) -> PolarsResult<()> {
    info!("Decoding overview of {} over {} subjects", results.analysis, results.subjects.len());
    plot_diagonal(report, results)?;
    plot_angle_pred(report, results)?;
    plot_toi_tuning(report, results)?;
    plot_early_maintain(report, results)?;

    let table = subscore_table(results)?;
    let name = format!("{}_subscores", results.analysis);
    report.add_table(&table, &name, &results.analysis, "subscores")?;
    Ok(())
}
