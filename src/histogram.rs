use serde::Serialize;

use crate::error::AnalysisError;

/// Density-normalized amplitude histogram.
///
/// Uniform bins over `[min, max]`; densities integrate to 1 over the range.
#[derive(Clone, Debug, Serialize)]
pub struct DensityHistogram {
    /// Bin centers (left edge + half a bin width).
    pub centers: Vec<f64>,
    /// Normalized counts per bin: count / (n * bin_width).
    pub densities: Vec<f64>,
    pub bin_width: f64,
    pub min: f64,
    pub max: f64,
}

/// Bin `values` into `n_bins` uniform density bins.
pub fn density_histogram(values: &[f64], n_bins: usize) -> Result<DensityHistogram, AnalysisError> {
    if values.is_empty() {
        return Err(AnalysisError::Histogram("at least one value".into()));
    }
    if n_bins == 0 {
        return Err(AnalysisError::Histogram("a positive bin count".into()));
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return Err(AnalysisError::Histogram(
            "a non-degenerate value range".into(),
        ));
    }
    let bin_width = range / n_bins as f64;

    let mut counts = vec![0usize; n_bins];
    for &v in values {
        // The top edge closes the last bin.
        let mut idx = ((v - min) / bin_width) as usize;
        if idx >= n_bins {
            idx = n_bins - 1;
        }
        counts[idx] += 1;
    }

    let norm = values.len() as f64 * bin_width;
    let densities = counts.iter().map(|&c| c as f64 / norm).collect();
    let centers = (0..n_bins)
        .map(|k| min + (k as f64 + 0.5) * bin_width)
        .collect();
    Ok(DensityHistogram {
        centers,
        densities,
        bin_width,
        min,
        max,
    })
}

/// Freedman-Diaconis bin count: range / (2 * IQR * n^(-1/3)).
pub fn freedman_diaconis_bins(values: &[f64]) -> Result<usize, AnalysisError> {
    if values.len() < 2 {
        return Err(AnalysisError::Histogram("at least two values".into()));
    }
    let iqr = quantile(values, 0.75) - quantile(values, 0.25);
    if iqr <= 0.0 {
        return Err(AnalysisError::Histogram(
            "a non-zero interquartile range".into(),
        ));
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bin_width = 2.0 * iqr * (values.len() as f64).powf(-1.0 / 3.0);
    Ok(((max - min) / bin_width).round().max(1.0) as usize)
}

/// Linear-interpolation quantile, `q` in [0, 1].
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
