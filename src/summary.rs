use log::debug;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::recording::{Recording, TimeWindow};

/// Statistic used to reduce each sweep's windowed current trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStat {
    Max,
    Min,
    Mean,
}

#[derive(Clone, Copy, Debug)]
pub struct SummaryOptions {
    /// Time (ms) at which the late current is sampled for the inactivation
    /// ratio. Looked up on the full sweep, nearest sample wins.
    pub late_time_ms: f64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self { late_time_ms: 250.0 }
    }
}

/// One sweep reduced to a point on the dose-response curve.
#[derive(Clone, Debug, Serialize)]
pub struct SweepSummary {
    pub sweep: usize,
    /// |median| stimulus pressure over the windowed subset, mmHg.
    pub pressure_mmhg: f64,
    /// The chosen statistic of the windowed current trace, pA.
    pub current_pa: f64,
    /// Statistic normalized across sweeps (I/Imax).
    pub normalized: f64,
    /// Sample standard deviation of the windowed trace (Mean only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdev_pa: Option<f64>,
    /// Current at the late measurement time (Min only), pA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub late_current_pa: Option<f64>,
    /// Late current over peak current (Min only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivation: Option<f64>,
}

/// Reduce every sweep to a summary row.
pub fn summarize(
    recording: &Recording,
    window: TimeWindow,
    stat: SummaryStat,
    options: &SummaryOptions,
) -> Result<Vec<SweepSummary>, AnalysisError> {
    let mut rows = Vec::with_capacity(recording.n_sweeps());
    for view in recording.sweeps() {
        let indices = view.window_indices(window);
        if indices.is_empty() {
            return Err(AnalysisError::EmptyWindow {
                start_ms: window.start_ms,
                end_ms: window.end_ms,
                sweep: view.sweep,
            });
        }
        let windowed: Vec<f64> = indices.iter().map(|&k| view.current_pa[k]).collect();
        let pressures: Vec<f64> = indices.iter().map(|&k| view.pressure_mmhg[k]).collect();
        let pressure_mmhg = median(&pressures).abs();

        let value = match stat {
            SummaryStat::Max => windowed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SummaryStat::Min => windowed.iter().copied().fold(f64::INFINITY, f64::min),
            SummaryStat::Mean => mean(&windowed),
        };
        let stdev_pa = (stat == SummaryStat::Mean).then(|| sample_stdev(&windowed));
        let late_current_pa = (stat == SummaryStat::Min)
            .then(|| current_nearest(view.time_ms, view.current_pa, options.late_time_ms));

        rows.push(SweepSummary {
            sweep: view.sweep,
            pressure_mmhg,
            current_pa: value,
            normalized: 0.0,
            stdev_pa,
            late_current_pa,
            inactivation: None,
        });
    }

    // Normalize across sweeps.
    let normalizer = match stat {
        SummaryStat::Max => rows
            .iter()
            .map(|r| r.current_pa)
            .fold(f64::NEG_INFINITY, f64::max),
        SummaryStat::Min => rows.iter().map(|r| r.current_pa).fold(f64::INFINITY, f64::min),
        SummaryStat::Mean => rows
            .iter()
            .map(|r| r.current_pa.abs())
            .fold(f64::NEG_INFINITY, f64::max),
    };
    if normalizer == 0.0 {
        return Err(AnalysisError::ZeroNormalizer);
    }
    for row in &mut rows {
        row.normalized = match stat {
            SummaryStat::Mean => row.current_pa.abs() / normalizer,
            _ => row.current_pa / normalizer,
        };
        if stat == SummaryStat::Min {
            row.inactivation = row.late_current_pa.map(|late| late / row.current_pa);
        }
    }
    debug!("summarized {} sweeps with {:?}", rows.len(), stat);
    Ok(rows)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Current at the sample whose time is nearest to `t_ms`.
fn current_nearest(time_ms: &[f64], current_pa: &[f64], t_ms: f64) -> f64 {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (idx, &t) in time_ms.iter().enumerate() {
        let dist = (t - t_ms).abs();
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    current_pa[best]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three sweeps of 6 samples at 0..6 ms with increasingly deep inward
    /// currents in the 2..5 ms window.
    fn recording() -> Recording {
        let time: Vec<f64> = (0..18).map(|k| (k % 6) as f64).collect();
        let mut current = Vec::new();
        let mut pressure = Vec::new();
        for (depth, p) in [(10.0, -10.0), (20.0, -30.0), (40.0, -50.0)] {
            current.extend_from_slice(&[0.0, 0.0, -depth, -depth, -depth / 2.0, 0.0]);
            pressure.extend_from_slice(&[p; 6]);
        }
        Recording::from_columns(3, time.clone(), current, time, pressure, None).unwrap()
    }

    #[test]
    fn min_summary_normalizes_to_deepest_sweep() {
        let rec = recording();
        let window = TimeWindow::new(2.0, 5.0).unwrap();
        let rows = summarize(&rec, window, SummaryStat::Min, &SummaryOptions::default()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].current_pa, -10.0);
        assert_eq!(rows[2].current_pa, -40.0);
        assert!((rows[2].normalized - 1.0).abs() < 1e-12);
        assert!((rows[0].normalized - 0.25).abs() < 1e-12);
        // Pressures are folded to magnitudes.
        assert_eq!(rows[1].pressure_mmhg, 30.0);
    }

    #[test]
    fn min_summary_reports_inactivation_at_late_time() {
        let rec = recording();
        let window = TimeWindow::new(2.0, 5.0).unwrap();
        let rows = summarize(
            &rec,
            window,
            SummaryStat::Min,
            &SummaryOptions { late_time_ms: 4.0 },
        )
        .unwrap();
        // At 4 ms each sweep has decayed to half its peak.
        assert!((rows[0].late_current_pa.unwrap() - (-5.0)).abs() < 1e-12);
        assert!((rows[0].inactivation.unwrap() - 0.5).abs() < 1e-12);
        assert!((rows[2].inactivation.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mean_summary_uses_absolute_normalization() {
        let rec = recording();
        let window = TimeWindow::new(2.0, 5.0).unwrap();
        let rows = summarize(&rec, window, SummaryStat::Mean, &SummaryOptions::default()).unwrap();
        // Means are negative; normalized values are |mean| / max|mean|.
        assert!(rows[2].current_pa < 0.0);
        assert!((rows[2].normalized - 1.0).abs() < 1e-12);
        assert!(rows[0].normalized > 0.0 && rows[0].normalized < 1.0);
        assert!(rows[0].stdev_pa.unwrap() > 0.0);
        assert!(rows[0].late_current_pa.is_none());
    }

    #[test]
    fn max_summary_on_outward_currents() {
        let time: Vec<f64> = (0..8).map(|k| (k % 4) as f64).collect();
        let current = vec![0.0, 5.0, 5.0, 0.0, 0.0, 10.0, 10.0, 0.0];
        let rec = Recording::from_columns(
            2,
            time.clone(),
            current,
            time,
            vec![-20.0, -20.0, -20.0, -20.0, -40.0, -40.0, -40.0, -40.0],
            None,
        )
        .unwrap();
        let window = TimeWindow::new(0.0, 4.0).unwrap();
        let rows = summarize(&rec, window, SummaryStat::Max, &SummaryOptions::default()).unwrap();
        assert_eq!(rows[0].current_pa, 5.0);
        assert!((rows[0].normalized - 0.5).abs() < 1e-12);
        assert!((rows[1].normalized - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flat_zero_traces_cannot_be_normalized() {
        let time: Vec<f64> = (0..4).map(|k| k as f64).collect();
        let rec = Recording::from_columns(
            1,
            time.clone(),
            vec![0.0; 4],
            time,
            vec![0.0; 4],
            None,
        )
        .unwrap();
        let window = TimeWindow::new(0.0, 4.0).unwrap();
        assert!(matches!(
            summarize(&rec, window, SummaryStat::Max, &SummaryOptions::default()),
            Err(AnalysisError::ZeroNormalizer)
        ));
    }
}
