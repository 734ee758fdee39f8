//! PNG renderers for the analysis tables.
//!
//! Rendering sits outside the numeric pipeline; every function here only
//! consumes plain numeric tables and fit reports.

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::error::AnalysisError;
use crate::fit::gaussian::MixtureFit;
use crate::fit::sigmoid::SigmoidFit;
use crate::histogram::DensityHistogram;
use crate::recording::Recording;
use crate::summary::SweepSummary;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            background: WHITE,
            palette: vec![
                BLACK,
                RGBColor(128, 0, 0),
                BLUE,
                RGBColor(255, 51, 0),
                GREEN,
                MAGENTA,
            ],
        }
    }
}

/// Stimulus traces over response traces, one series per sweep.
pub fn render_sweeps_png(
    recording: &Recording,
    style: &PlotStyle,
) -> Result<Vec<u8>, AnalysisError> {
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (upper, lower) = root.split_vertically((style.height / 3) as i32);

        let t_max = recording
            .stim_time_ms
            .iter()
            .chain(&recording.time_ms)
            .copied()
            .fold(0.0f64, f64::max);
        let (p_lo, p_hi) = padded_bounds(&recording.pressure_mmhg);
        let (i_lo, i_hi) = padded_bounds(&recording.current_pa);

        let mut stim_chart = ChartBuilder::on(&upper)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .build_cartesian_2d(0f64..t_max, p_lo..p_hi)?;
        stim_chart
            .configure_mesh()
            .disable_mesh()
            .y_desc("Pressure (mm Hg)")
            .draw()?;
        for view in recording.sweeps() {
            let color = style.palette[(view.sweep - 1) % style.palette.len()];
            let series = view
                .stim_time_ms
                .iter()
                .zip(view.pressure_mmhg)
                .map(|(&t, &p)| (t, p));
            stim_chart.draw_series(LineSeries::new(series, &color))?;
        }

        let mut resp_chart = ChartBuilder::on(&lower)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0f64..t_max, i_lo..i_hi)?;
        resp_chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Time (ms)")
            .y_desc("Current (pA)")
            .draw()?;
        for view in recording.sweeps() {
            let color = style.palette[(view.sweep - 1) % style.palette.len()];
            let series = view
                .time_ms
                .iter()
                .zip(view.current_pa)
                .map(|(&t, &i)| (t, i));
            resp_chart.draw_series(LineSeries::new(series, &color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// Normalized response vs. pressure, with an optional sigmoid overlay.
pub fn render_summary_png(
    summaries: &[SweepSummary],
    fit: Option<&SigmoidFit>,
    style: &PlotStyle,
) -> Result<Vec<u8>, AnalysisError> {
    if summaries.is_empty() {
        return Err(AnalysisError::Plot("no summary rows to plot".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;

        let pressures: Vec<f64> = summaries.iter().map(|s| s.pressure_mmhg).collect();
        let (x_lo, x_hi) = padded_bounds(&pressures);
        let y_hi = summaries
            .iter()
            .map(|s| s.normalized)
            .fold(1.0f64, f64::max);

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_lo..x_hi, 0f64..y_hi * 1.05)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Pressure (-mm Hg)")
            .y_desc("I/Imax")
            .draw()?;

        let marker = style.palette[3 % style.palette.len()];
        chart.draw_series(
            summaries
                .iter()
                .map(|s| Circle::new((s.pressure_mmhg, s.normalized), 4, marker.filled())),
        )?;
        if let Some(fit) = fit {
            chart.draw_series(LineSeries::new(fit.curve(100), &BLACK))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// Density bars with optional fitted-component overlays.
pub fn render_histogram_png(
    histogram: &DensityHistogram,
    fit: Option<&MixtureFit>,
    style: &PlotStyle,
) -> Result<Vec<u8>, AnalysisError> {
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;

        let d_max = histogram
            .densities
            .iter()
            .copied()
            .fold(0.0f64, f64::max)
            .max(1e-9);
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(histogram.min..histogram.max, 0f64..d_max * 1.05)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Current (pA)")
            .y_desc("Density")
            .draw()?;

        let half = histogram.bin_width / 2.0;
        chart.draw_series(histogram.centers.iter().zip(&histogram.densities).map(
            |(&c, &d)| {
                Rectangle::new([(c - half, 0.0), (c + half, d)], BLACK.filled())
            },
        ))?;
        if let Some(fit) = fit {
            for (idx, _) in fit.components.iter().enumerate() {
                let color = style.palette[(idx + 1) % style.palette.len()];
                chart.draw_series(LineSeries::new(
                    fit.component_curve(idx, 500),
                    color.stroke_width(2),
                ))?;
            }
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn padded_bounds(values: &[f64]) -> (f64, f64) {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) || (hi - lo).abs() < f64::EPSILON {
        return (-1.0, 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AnalysisError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| AnalysisError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
