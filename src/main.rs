use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

use sweepfit::plot::{render_histogram_png, render_summary_png, render_sweeps_png, PlotStyle};
use sweepfit::{
    baseline, decompose, density_histogram, fit_dose_response, freedman_diaconis_bins, load_file,
    summarize, FitOptions, MixtureFit, SigmoidFit, SummaryOptions, SummaryStat, SweepSummary,
    TimeWindow,
};

/// Analyze a HEKA ascii sweep export: baseline correction, per-sweep
/// summaries, dose-response sigmoid fit, and an optional Gaussian
/// decomposition of one sweep's amplitude histogram.
#[derive(Parser, Debug)]
#[command(name = "sweepfit", version)]
struct Args {
    /// Path to the .asc export.
    input: PathBuf,

    /// Baseline window in ms, as start:end. Subtracted before any analysis.
    #[arg(long, value_parser = parse_window)]
    baseline: Option<TimeWindow>,

    /// Summary window in ms, as start:end. Enables the summary table and
    /// the dose-response fit.
    #[arg(long, value_parser = parse_window)]
    window: Option<TimeWindow>,

    /// Statistic used to reduce each sweep.
    #[arg(long, value_enum, default_value_t = Stat::Min)]
    stat: Stat,

    /// Time (ms) of the late-current measurement for the inactivation ratio.
    #[arg(long, default_value_t = 250.0)]
    late_time: f64,

    /// Sweep whose current amplitudes are histogrammed. Enables the
    /// histogram decomposition.
    #[arg(long)]
    hist_sweep: Option<usize>,

    /// Restrict the histogrammed sweep to this window (ms, start:end).
    #[arg(long, value_parser = parse_window)]
    hist_window: Option<TimeWindow>,

    /// Histogram bin count. Defaults to the Freedman-Diaconis estimate.
    #[arg(long)]
    bins: Option<usize>,

    /// Number of Gaussian components to fit (1 to 3).
    #[arg(long, default_value_t = 2)]
    gauss: usize,

    /// Output directory for the JSON report and PNGs.
    #[arg(long, default_value = "sweepfit-out")]
    out_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Stat {
    Max,
    Min,
    Mean,
}

impl From<Stat> for SummaryStat {
    fn from(stat: Stat) -> Self {
        match stat {
            Stat::Max => SummaryStat::Max,
            Stat::Min => SummaryStat::Min,
            Stat::Mean => SummaryStat::Mean,
        }
    }
}

fn parse_window(raw: &str) -> Result<TimeWindow, String> {
    let (start, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got '{raw}'"))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|_| format!("bad window start '{start}'"))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|_| format!("bad window end '{end}'"))?;
    TimeWindow::new(start, end).map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct Report {
    input: String,
    n_sweeps: usize,
    samples_per_sweep: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    baselines_pa: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summaries: Option<Vec<SweepSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dose_response: Option<SigmoidFit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mixture: Option<MixtureFit>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut recording =
        load_file(&args.input).with_context(|| format!("loading {}", args.input.display()))?;
    info!(
        "{}: {} sweeps of {} samples",
        args.input.display(),
        recording.n_sweeps(),
        recording.samples_per_sweep()
    );

    let baselines_pa = match args.baseline {
        Some(window) => {
            Some(baseline::subtract(&mut recording, window).context("baseline subtraction")?)
        }
        None => None,
    };

    let fit_options = FitOptions::default();
    let mut summaries: Option<Vec<SweepSummary>> = None;
    let mut dose_response: Option<SigmoidFit> = None;
    if let Some(window) = args.window {
        let options = SummaryOptions {
            late_time_ms: args.late_time,
        };
        let rows =
            summarize(&recording, window, args.stat.into(), &options).context("sweep summary")?;
        match fit_dose_response(&rows, &fit_options) {
            Ok(fit) => dose_response = Some(fit),
            Err(err) => info!("dose-response fit skipped: {err}"),
        }
        summaries = Some(rows);
    }

    let mut mixture: Option<MixtureFit> = None;
    let mut hist = None;
    if let Some(sweep) = args.hist_sweep {
        let amplitudes = match args.hist_window {
            Some(window) => {
                recording
                    .isolate(sweep, window)
                    .context("isolating sweep")?
                    .1
            }
            None => recording
                .sweep(sweep)
                .context("selecting sweep")?
                .current_pa
                .to_vec(),
        };
        let bins = match args.bins {
            Some(bins) => bins,
            None => freedman_diaconis_bins(&amplitudes).context("choosing bin count")?,
        };
        let histogram = density_histogram(&amplitudes, bins).context("building histogram")?;
        mixture =
            Some(decompose(&histogram, args.gauss, &fit_options).context("mixture decomposition")?);
        hist = Some(histogram);
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let style = PlotStyle::default();

    let sweeps_png = render_sweeps_png(&recording, &style).context("rendering sweeps")?;
    fs::write(args.out_dir.join("sweeps.png"), sweeps_png)?;
    if let Some(rows) = &summaries {
        let png =
            render_summary_png(rows, dose_response.as_ref(), &style).context("rendering summary")?;
        fs::write(args.out_dir.join("summary.png"), png)?;
    }
    if let Some(histogram) = &hist {
        let png = render_histogram_png(histogram, mixture.as_ref(), &style)
            .context("rendering histogram")?;
        fs::write(args.out_dir.join("histogram.png"), png)?;
    }

    let report = Report {
        input: args.input.display().to_string(),
        n_sweeps: recording.n_sweeps(),
        samples_per_sweep: recording.samples_per_sweep(),
        baselines_pa,
        summaries,
        dose_response,
        mixture,
    };
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(args.out_dir.join("report.json"), json)?;
    info!("report written to {}", args.out_dir.display());
    Ok(())
}
