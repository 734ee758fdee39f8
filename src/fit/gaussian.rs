//! Multi-Gaussian decomposition of current-amplitude histograms.
//!
//! Open and closed channel levels show up as modes in the amplitude
//! histogram; fitting a small Gaussian mixture to the density estimate
//! separates them.

use log::info;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::fit::leastsq::{curve_fit, FitOptions, FitSolution};
use crate::histogram::DensityHistogram;

const SQRT_2PI: f64 = 2.5066282746310002;

/// One mixture component: a scaled normal pdf.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct GaussComponent {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
}

/// amplitude * N(x; mean, sigma).
pub fn gauss(x: f64, component: &GaussComponent) -> f64 {
    let z = (x - component.mean) / component.sigma;
    component.amplitude * (-0.5 * z * z).exp() / (component.sigma * SQRT_2PI)
}

/// Sum of all component pdfs at `x`.
pub fn mixture(x: f64, components: &[GaussComponent]) -> f64 {
    components.iter().map(|c| gauss(x, c)).sum()
}

/// Heuristic starting point for an `n`-component fit.
///
/// The first component sits on the densest bin with unit weight and a
/// narrow sigma; each further component halves the weight, steps the mean
/// down by 2.2 pA per rank, and doubles the sigma. The step size matches a
/// typical single-channel amplitude, which is what makes the heuristic
/// land near the open-level modes. The first mean deliberately sits on the
/// densest bin's center rather than its left edge; the half-bin-width
/// difference does not matter to convergence.
pub fn initial_guesses(histogram: &DensityHistogram, n: usize) -> Vec<GaussComponent> {
    let densest = histogram
        .densities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let mut guesses = vec![GaussComponent {
        amplitude: 1.0,
        mean: histogram.centers.get(densest).copied().unwrap_or(0.0),
        sigma: 0.5,
    }];
    for rank in 1..n {
        let prev = guesses[rank - 1];
        guesses.push(GaussComponent {
            amplitude: 0.5 * prev.amplitude,
            mean: prev.mean - 2.2 * rank as f64,
            sigma: 2.0 * prev.sigma,
        });
    }
    guesses
}

/// Result of fitting a Gaussian mixture to a density histogram.
#[derive(Clone, Debug, Serialize)]
pub struct MixtureFit {
    pub components: Vec<GaussComponent>,
    pub solution: FitSolution,
    range: (f64, f64),
}

impl MixtureFit {
    /// Sample the full mixture over the histogram range.
    pub fn mixture_curve(&self, n_points: usize) -> Vec<(f64, f64)> {
        self.sample(n_points, |x| mixture(x, &self.components))
    }

    /// Sample one fitted component over the histogram range.
    pub fn component_curve(&self, component: usize, n_points: usize) -> Vec<(f64, f64)> {
        let c = self.components[component];
        self.sample(n_points, move |x| gauss(x, &c))
    }

    fn sample<F: Fn(f64) -> f64>(&self, n_points: usize, f: F) -> Vec<(f64, f64)> {
        let (lo, hi) = self.range;
        let n = n_points.max(2);
        (0..n)
            .map(|k| {
                let x = lo + (hi - lo) * k as f64 / (n - 1) as f64;
                (x, f(x))
            })
            .collect()
    }
}

/// Fit an `n`-component mixture (1..=3) to the histogram densities.
pub fn decompose(
    histogram: &DensityHistogram,
    n: usize,
    options: &FitOptions,
) -> Result<MixtureFit, AnalysisError> {
    if n == 0 || n > 3 {
        return Err(AnalysisError::FitInput(format!(
            "mixture supports 1 to 3 components, got {n}"
        )));
    }
    decompose_from(histogram, &initial_guesses(histogram, n), options)
}

/// Fit a mixture starting from explicit component guesses.
pub fn decompose_from(
    histogram: &DensityHistogram,
    guesses: &[GaussComponent],
    options: &FitOptions,
) -> Result<MixtureFit, AnalysisError> {
    let n = guesses.len();
    if n == 0 || n > 3 {
        return Err(AnalysisError::FitInput(format!(
            "mixture supports 1 to 3 components, got {n}"
        )));
    }
    if histogram.centers.len() < 3 * n {
        return Err(AnalysisError::FitInput(format!(
            "{} bins cannot constrain {} mixture parameters",
            histogram.centers.len(),
            3 * n
        )));
    }

    // Parameters flatten as [a1..an, m1..mn, s1..sn].
    let mut p0 = Vec::with_capacity(3 * n);
    p0.extend(guesses.iter().map(|c| c.amplitude));
    p0.extend(guesses.iter().map(|c| c.mean));
    p0.extend(guesses.iter().map(|c| c.sigma));

    let model = move |x: f64, p: &[f64]| -> f64 {
        (0..n)
            .map(|k| {
                gauss(
                    x,
                    &GaussComponent {
                        amplitude: p[k],
                        mean: p[n + k],
                        sigma: p[2 * n + k],
                    },
                )
            })
            .sum()
    };
    let solution = curve_fit(model, &histogram.centers, &histogram.densities, &p0, options)?;

    let components: Vec<GaussComponent> = (0..n)
        .map(|k| GaussComponent {
            amplitude: solution.params[k],
            mean: solution.params[n + k],
            // The pdf is even in sigma; report the magnitude.
            sigma: solution.params[2 * n + k].abs(),
        })
        .collect();
    info!(
        "mixture fit: {} components, cost {:.3e}, converged: {}",
        n, solution.cost, solution.converged
    );
    Ok(MixtureFit {
        components,
        solution,
        range: (histogram.min, histogram.max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_from_mixture(components: &[GaussComponent], lo: f64, hi: f64, bins: usize) -> DensityHistogram {
        let bin_width = (hi - lo) / bins as f64;
        let centers: Vec<f64> = (0..bins).map(|k| lo + (k as f64 + 0.5) * bin_width).collect();
        let densities = centers.iter().map(|&x| mixture(x, components)).collect();
        DensityHistogram {
            centers,
            densities,
            bin_width,
            min: lo,
            max: hi,
        }
    }

    #[test]
    fn gauss_peaks_at_the_mean() {
        let c = GaussComponent {
            amplitude: 2.0,
            mean: -1.0,
            sigma: 0.5,
        };
        let peak = gauss(-1.0, &c);
        assert!((peak - 2.0 / (0.5 * SQRT_2PI)).abs() < 1e-12);
        assert!(gauss(0.0, &c) < peak);
    }

    #[test]
    fn guesses_follow_the_halving_and_stepping_rule() {
        let hist = histogram_from_mixture(
            &[GaussComponent {
                amplitude: 1.0,
                mean: 0.0,
                sigma: 0.6,
            }],
            -3.0,
            3.0,
            30,
        );
        let guesses = initial_guesses(&hist, 3);
        assert_eq!(guesses.len(), 3);
        assert_eq!(guesses[0].amplitude, 1.0);
        assert!((guesses[0].mean.abs()) < 0.2); // densest bin is near zero
        assert_eq!(guesses[0].sigma, 0.5);
        assert_eq!(guesses[1].amplitude, 0.5);
        assert!((guesses[1].mean - (guesses[0].mean - 2.2)).abs() < 1e-12);
        assert_eq!(guesses[1].sigma, 1.0);
        assert_eq!(guesses[2].amplitude, 0.25);
        assert!((guesses[2].mean - (guesses[1].mean - 4.4)).abs() < 1e-12);
        assert_eq!(guesses[2].sigma, 2.0);
    }

    #[test]
    fn recovers_two_component_mixture_from_heuristic_start() {
        // Closed level at 0 pA, open level one channel amplitude below.
        let truth = [
            GaussComponent {
                amplitude: 1.0,
                mean: 0.0,
                sigma: 0.8,
            },
            GaussComponent {
                amplitude: 0.5,
                mean: -2.2,
                sigma: 1.0,
            },
        ];
        let hist = histogram_from_mixture(&truth, -6.0, 3.0, 45);
        let fit = decompose(&hist, 2, &FitOptions::default()).unwrap();
        assert!(fit.solution.converged);
        assert!((fit.components[0].amplitude - 1.0).abs() < 1e-3);
        assert!((fit.components[0].mean - 0.0).abs() < 1e-3);
        assert!((fit.components[0].sigma - 0.8).abs() < 1e-3);
        assert!((fit.components[1].amplitude - 0.5).abs() < 1e-3);
        assert!((fit.components[1].mean - (-2.2)).abs() < 1e-3);
        assert!((fit.components[1].sigma - 1.0).abs() < 1e-3);
    }

    #[test]
    fn component_curves_cover_the_histogram_range() {
        let truth = [GaussComponent {
            amplitude: 1.0,
            mean: -1.0,
            sigma: 0.7,
        }];
        let hist = histogram_from_mixture(&truth, -4.0, 2.0, 24);
        let fit = decompose(&hist, 1, &FitOptions::default()).unwrap();
        let curve = fit.component_curve(0, 500);
        assert_eq!(curve.len(), 500);
        assert!((curve[0].0 - (-4.0)).abs() < 1e-12);
        assert!((curve[499].0 - 2.0).abs() < 1e-12);
        let full = fit.mixture_curve(500);
        for (a, b) in curve.iter().zip(&full) {
            assert!((a.1 - b.1).abs() < 1e-9);
        }
    }

    #[test]
    fn component_count_is_bounded() {
        let hist = histogram_from_mixture(
            &[GaussComponent {
                amplitude: 1.0,
                mean: 0.0,
                sigma: 1.0,
            }],
            -3.0,
            3.0,
            30,
        );
        assert!(matches!(
            decompose(&hist, 0, &FitOptions::default()),
            Err(AnalysisError::FitInput(_))
        ));
        assert!(matches!(
            decompose(&hist, 4, &FitOptions::default()),
            Err(AnalysisError::FitInput(_))
        ));
    }

    #[test]
    fn too_few_bins_are_rejected() {
        let hist = histogram_from_mixture(
            &[GaussComponent {
                amplitude: 1.0,
                mean: 0.0,
                sigma: 1.0,
            }],
            -3.0,
            3.0,
            5,
        );
        assert!(matches!(
            decompose(&hist, 3, &FitOptions::default()),
            Err(AnalysisError::FitInput(_))
        ));
    }
}
