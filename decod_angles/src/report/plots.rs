//! Group-level figures drawn with the plotters bitmap backend.
//!
//! Every `draw_*` function takes subjects on the first axis and draws the
//! mean across subjects into one panel.

use std::ops::Range;

use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Dimension};
use ndarray_stats::QuantileExt;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::*;

use crate::models::polars_err;
use crate::stats::{nan_mean_axis, nan_sem_axis, MeanSem};

pub type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

pub const CAPTION_FONT: (&str, f64) = ("sans-serif bold", 20.0);
pub const LABEL_FONT: (&str, f64) = ("sans-serif", 14.0);

/// Visibility ratings 0..3, blue to red.
pub const VIS_COLORS: [RGBColor; 4] = [
    RGBColor(0, 0, 255),
    RGBColor(170, 170, 255),
    RGBColor(255, 170, 170),
    RGBColor(255, 0, 0),
];

/// Probe tilt -1, 0 and +1.
pub const TILT_COLORS: [RGBColor; 3] =
    [RGBColor(166, 97, 26), RGBColor(150, 150, 150), RGBColor(1, 133, 113)];

/// Blue (0) to white (0.5) to red (1).
pub fn bwr(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    if t < 0.5 {
        let s = (t * 2.0 * 255.0).round() as u8;
        RGBColor(s, s, 255)
    } else {
        let s = ((1.0 - t) * 2.0 * 255.0).round() as u8;
        RGBColor(255, s, s)
    }
}

/// NaN-skipping extent of `values`, padded by 5%, or `fallback` when empty.
pub fn padded_range<S, D>(values: &ArrayBase<S, D>, fallback: Range<f64>) -> Range<f64>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let (lo, hi) = (*values.min_skipnan(), *values.max_skipnan());
    if !lo.is_finite() || !hi.is_finite() {
        return fallback;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.05 };
    (lo - pad)..(hi + pad)
}

/// Sampling step of `times`; 1 for a single sample.
fn time_step(times: &[f64]) -> f64 {
    match times {
        [a, b, ..] => b - a,
        _ => 1.0,
    }
}

fn mean_sem(values: ArrayView2<'_, f64>) -> (Vec<f64>, Vec<f64>) {
    (nan_mean_axis(&values, Axis(0)).to_vec(), nan_sem_axis(&values, Axis(0)).to_vec())
}

/// Band between `mean - sem` and `mean + sem`, skipping NaN samples.
fn sem_band(x: &[f64], mean: &[f64], sem: &[f64]) -> Vec<(f64, f64)> {
    let valid: Vec<usize> =
        (0..x.len()).filter(|&i| mean[i].is_finite() && sem[i].is_finite()).collect();
    let upper = valid.iter().map(|&i| (x[i], mean[i] + sem[i]));
    let lower = valid.iter().rev().map(|&i| (x[i], mean[i] - sem[i]));
    upper.chain(lower).collect()
}

/// Tuning curves: one `subjects × bins` array per curve.
pub fn draw_tuning(
    panel: &Panel<'_>,
    title: &str,
    bins: &[f64],
    curves: &[(ArrayView2<'_, f64>, RGBColor)],
    vlines: &[(f64, RGBColor)],
) -> PolarsResult<()> {
    let chance = 1.0 / bins.len().max(1) as f64;
    let mut y_range = 0.0..2.0 * chance;
    for (values, _) in curves {
        let r = padded_range(values, y_range.clone());
        y_range = y_range.start.min(r.start)..y_range.end.max(r.end);
    }

    let mut chart = ChartBuilder::on(panel)
        .caption(title, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(-std::f64::consts::PI..std::f64::consts::PI, y_range)
        .map_err(|e| polars_err(Box::new(e)))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Angle error")
        .y_desc("Probability")
        .label_style(LABEL_FONT)
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    chart
        .draw_series(LineSeries::new(
            [(-std::f64::consts::PI, chance), (std::f64::consts::PI, chance)],
            BLACK.mix(0.3),
        ))
        .map_err(|e| polars_err(Box::new(e)))?;
    for &(x, color) in vlines {
        let (lo, hi) = (chart.y_range().start, chart.y_range().end);
        chart
            .draw_series(LineSeries::new([(x, lo), (x, hi)], color.stroke_width(1)))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    for (values, color) in curves {
        let (mean, sem) = mean_sem(values.view());
        let band = sem_band(bins, &mean, &sem);
        if band.len() > 2 {
            chart
                .draw_series(std::iter::once(Polygon::new(band, color.mix(0.25))))
                .map_err(|e| polars_err(Box::new(e)))?;
        }
        chart
            .draw_series(LineSeries::new(
                bins.iter().zip(&mean).filter(|(_, m)| m.is_finite()).map(|(&x, &m)| (x, m)),
                color.stroke_width(2),
            ))
            .map_err(|e| polars_err(Box::new(e)))?;
    }
    Ok(())
}

/// Temporal generalization matrix of the group mean, train time on y.
///
/// Cells with `sig == false` are faded; `marks` draws both axis lines.
pub fn draw_gat(
    panel: &Panel<'_>,
    title: &str,
    times: &[f64],
    mean: &Array2<f64>,
    sig: &Array2<bool>,
    clim: f64,
    marks: &[f64],
) -> PolarsResult<()> {
    let step = time_step(times);
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Ok(());
    };
    let extent = (first - step / 2.0)..(last + step / 2.0);

    let mut chart = ChartBuilder::on(panel)
        .caption(title, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(extent.clone(), extent.clone())
        .map_err(|e| polars_err(Box::new(e)))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Test time (s)")
        .y_desc("Train time (s)")
        .label_style(LABEL_FONT)
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    let cells = mean.indexed_iter().map(|((i, j), &value)| {
        let color = bwr((value + clim) / (2.0 * clim));
        let alpha = if sig[[i, j]] { 1.0 } else { 0.35 };
        let (x, y) = (times[j], times[i]);
        Rectangle::new(
            [(x - step / 2.0, y - step / 2.0), (x + step / 2.0, y + step / 2.0)],
            color.mix(alpha).filled(),
        )
    });
    chart.draw_series(cells).map_err(|e| polars_err(Box::new(e)))?;

    for &m in marks {
        chart
            .draw_series(LineSeries::new([(m, extent.start), (m, extent.end)], &BLACK))
            .map_err(|e| polars_err(Box::new(e)))?;
        chart
            .draw_series(LineSeries::new([(extent.start, m), (extent.end, m)], &BLACK))
            .map_err(|e| polars_err(Box::new(e)))?;
    }
    Ok(())
}

/// Time course of `subjects × times` scores with significant samples filled.
pub fn draw_decod(
    panel: &Panel<'_>,
    title: &str,
    times: &[f64],
    scores: ArrayView2<'_, f64>,
    sig: &[bool],
    color: RGBColor,
    marks: &[f64],
) -> PolarsResult<()> {
    let (mean, sem) = mean_sem(scores);
    let band = sem_band(times, &mean, &sem);
    let y_values: ndarray::Array1<f64> = band.iter().map(|&(_, y)| y).chain([0.0]).collect();
    let y_range = padded_range(&y_values, -0.1..0.1);
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Ok(());
    };

    let mut chart = ChartBuilder::on(panel)
        .caption(title, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(first..last, y_range.clone())
        .map_err(|e| polars_err(Box::new(e)))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time (s)")
        .label_style(LABEL_FONT)
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    chart
        .draw_series(LineSeries::new([(first, 0.0), (last, 0.0)], BLACK.mix(0.5)))
        .map_err(|e| polars_err(Box::new(e)))?;
    for &m in marks {
        chart
            .draw_series(LineSeries::new([(m, y_range.start), (m, y_range.end)], &BLACK))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    let step = time_step(times);
    let filled = times.iter().zip(&mean).zip(sig).filter(|((_, m), s)| **s && m.is_finite()).map(
        |((&t, &m), _)| {
            Rectangle::new([(t - step / 2.0, 0.0), (t + step / 2.0, m)], color.mix(0.6).filled())
        },
    );
    chart.draw_series(filled).map_err(|e| polars_err(Box::new(e)))?;
    if band.len() > 2 {
        chart
            .draw_series(std::iter::once(Polygon::new(band, color.mix(0.2))))
            .map_err(|e| polars_err(Box::new(e)))?;
    }
    chart
        .draw_series(LineSeries::new(
            times.iter().zip(&mean).filter(|(_, m)| m.is_finite()).map(|(&t, &m)| (t, m)),
            color.stroke_width(2),
        ))
        .map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

/// Mean ± SEM bars of each `subjects × bars` column, starred when p < .05.
pub fn draw_bar_sem(
    panel: &Panel<'_>,
    title: &str,
    values: ArrayView2<'_, f64>,
    colors: &[RGBColor],
    y_range: Range<f64>,
) -> PolarsResult<()> {
    let n_bars = values.ncols();
    let mut chart = ChartBuilder::on(panel)
        .caption(title, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(10)
        .y_label_area_size(45)
        .build_cartesian_2d(0.0..n_bars as f64, y_range)
        .map_err(|e| polars_err(Box::new(e)))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .label_style(LABEL_FONT)
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    for (b, column) in values.axis_iter(Axis(1)).enumerate() {
        let summary = MeanSem::new(&column.to_vec());
        if !summary.mean.is_finite() {
            continue;
        }
        let color = colors[b % colors.len()];
        let (x0, x1, xc) = (b as f64 + 0.1, b as f64 + 0.9, b as f64 + 0.5);

        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x0, 0.0), (x1, summary.mean)],
                color.filled(),
            )))
            .map_err(|e| polars_err(Box::new(e)))?;
        if summary.sem.is_finite() {
            chart
                .draw_series(LineSeries::new(
                    [(xc, summary.mean - summary.sem), (xc, summary.mean + summary.sem)],
                    BLACK.stroke_width(2),
                ))
                .map_err(|e| polars_err(Box::new(e)))?;
        }
        if summary.is_significant() {
            chart
                .draw_series(std::iter::once(Text::new(
                    "*".to_string(),
                    (xc, summary.mean / 2.0),
                    ("sans-serif bold", 24).into_font().color(&WHITE),
                )))
                .map_err(|e| polars_err(Box::new(e)))?;
        }
    }
    Ok(())
}
