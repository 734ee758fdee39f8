use log::info;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::fit::leastsq::{curve_fit, FitOptions, FitSolution};
use crate::summary::SweepSummary;

/// Boltzmann sigmoid: 1 / (1 + exp((p50 - p) / k)).
pub fn sigmoid(p: f64, p50: f64, k: f64) -> f64 {
    1.0 / (1.0 + ((p50 - p) / k).exp())
}

/// Fitted dose-response curve.
#[derive(Clone, Debug, Serialize)]
pub struct SigmoidFit {
    /// Pressure of half-maximal activation, mmHg.
    pub p50: f64,
    /// Slope factor at the inflection point.
    pub slope: f64,
    pub solution: FitSolution,
    pressure_range: (f64, f64),
}

impl SigmoidFit {
    /// Sample the fitted sigmoid over the observed pressure range.
    pub fn curve(&self, n_points: usize) -> Vec<(f64, f64)> {
        let (lo, hi) = self.pressure_range;
        let n = n_points.max(2);
        (0..n)
            .map(|k| {
                let p = lo + (hi - lo) * k as f64 / (n - 1) as f64;
                (p, sigmoid(p, self.p50, self.slope))
            })
            .collect()
    }

    pub fn value_at(&self, pressure: f64) -> f64 {
        sigmoid(pressure, self.p50, self.slope)
    }
}

/// Fit the sigmoid to summary rows, starting from the default guess [1, 1].
pub fn fit_dose_response(
    summaries: &[SweepSummary],
    options: &FitOptions,
) -> Result<SigmoidFit, AnalysisError> {
    let pressures: Vec<f64> = summaries.iter().map(|s| s.pressure_mmhg).collect();
    let normalized: Vec<f64> = summaries.iter().map(|s| s.normalized).collect();
    fit_dose_response_from(&pressures, &normalized, &[1.0, 1.0], options)
}

/// Fit the sigmoid to raw (pressure, normalized response) pairs with an
/// explicit initial guess `[p50, k]`.
pub fn fit_dose_response_from(
    pressures: &[f64],
    normalized: &[f64],
    guess: &[f64; 2],
    options: &FitOptions,
) -> Result<SigmoidFit, AnalysisError> {
    if pressures.len() < 2 {
        return Err(AnalysisError::FitInput(
            "dose-response fit needs at least two sweeps".into(),
        ));
    }
    let solution = curve_fit(
        |p, params| sigmoid(p, params[0], params[1]),
        pressures,
        normalized,
        guess,
        options,
    )?;
    let lo = pressures.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = pressures.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    info!(
        "dose-response fit: p50 = {:.2} mmHg, k = {:.2} (converged: {})",
        solution.params[0], solution.params[1], solution.converged
    );
    Ok(SigmoidFit {
        p50: solution.params[0],
        slope: solution.params[1],
        pressure_range: (lo, hi),
        solution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_known_p50_and_slope() {
        let pressures: Vec<f64> = (1..=12).map(|k| k as f64 * 10.0).collect();
        let normalized: Vec<f64> = pressures.iter().map(|&p| sigmoid(p, 55.0, 8.0)).collect();
        let fit =
            fit_dose_response_from(&pressures, &normalized, &[40.0, 4.0], &FitOptions::default())
                .unwrap();
        assert!(fit.solution.converged);
        assert!((fit.p50 - 55.0).abs() < 1e-3);
        assert!((fit.slope - 8.0).abs() < 1e-3);
        // Half-maximal response at p50 by construction.
        assert!((fit.value_at(fit.p50) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn default_guess_handles_small_scale_curves() {
        // Pressures of a few mmHg keep the default [1, 1] guess in the
        // basin of attraction, mirroring the original workflow.
        let pressures: Vec<f64> = (0..10).map(|k| k as f64).collect();
        let normalized: Vec<f64> = pressures.iter().map(|&p| sigmoid(p, 4.0, 1.5)).collect();
        let summaries: Vec<SweepSummary> = pressures
            .iter()
            .zip(&normalized)
            .enumerate()
            .map(|(idx, (&p, &y))| SweepSummary {
                sweep: idx + 1,
                pressure_mmhg: p,
                current_pa: -y,
                normalized: y,
                stdev_pa: None,
                late_current_pa: None,
                inactivation: None,
            })
            .collect();
        let fit = fit_dose_response(&summaries, &FitOptions::default()).unwrap();
        assert!((fit.p50 - 4.0).abs() < 1e-2);
        assert!((fit.slope - 1.5).abs() < 1e-2);
    }

    #[test]
    fn curve_spans_observed_pressures() {
        let pressures: Vec<f64> = vec![10.0, 20.0, 30.0, 40.0];
        let normalized: Vec<f64> = pressures.iter().map(|&p| sigmoid(p, 25.0, 5.0)).collect();
        let fit =
            fit_dose_response_from(&pressures, &normalized, &[20.0, 5.0], &FitOptions::default())
                .unwrap();
        let curve = fit.curve(100);
        assert_eq!(curve.len(), 100);
        assert!((curve[0].0 - 10.0).abs() < 1e-12);
        assert!((curve[99].0 - 40.0).abs() < 1e-12);
        // Monotone increasing for a positive slope factor.
        assert!(curve.windows(2).all(|w| w[1].1 >= w[0].1));
    }

    #[test]
    fn single_point_is_rejected() {
        let result =
            fit_dose_response_from(&[10.0], &[0.5], &[1.0, 1.0], &FitOptions::default());
        assert!(matches!(result, Err(AnalysisError::FitInput(_))));
    }
}
