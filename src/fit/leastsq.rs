//! Nonlinear least squares via Levenberg-Marquardt.
//!
//! Minimizes ||f(x)||^2 for a residual function f: R^n -> R^m using damped
//! Gauss-Newton steps with a forward-difference Jacobian. The damping factor
//! grows by 10 on a rejected step and shrinks by 10 on an accepted one, so
//! the iteration slides between gradient descent and Gauss-Newton.

use log::debug;
use serde::Serialize;

use crate::error::AnalysisError;

const SINGULAR_THRESHOLD: f64 = 1e-14;
const ZERO_THRESHOLD: f64 = 1e-10;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const LAMBDA_MAX: f64 = 1e10;

#[derive(Clone, Copy, Debug)]
pub struct FitOptions {
    pub max_iter: usize,
    /// Convergence threshold on the cost itself.
    pub f_tol: f64,
    /// Convergence threshold on the step norm.
    pub x_tol: f64,
    /// Convergence threshold on the gradient norm.
    pub g_tol: f64,
    /// Forward-difference step for the Jacobian.
    pub eps: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            f_tol: 1e-10,
            x_tol: 1e-10,
            g_tol: 1e-10,
            eps: 1e-8,
        }
    }
}

/// Converged parameters plus the uncertainty report.
#[derive(Clone, Debug, Serialize)]
pub struct FitSolution {
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of squared residuals at the solution.
    pub cost: f64,
    pub iterations: usize,
    pub n_evaluations: usize,
    pub converged: bool,
    /// Parameter covariance s^2 (J^T J)^-1, when it exists.
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Square roots of the covariance diagonal.
    pub std_errors: Option<Vec<f64>>,
}

/// Minimize ||f(x)||^2 starting from `x0`.
pub fn leastsq<F>(f: F, x0: &[f64], options: &FitOptions) -> Result<FitSolution, AnalysisError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x0.len();
    if n == 0 {
        return Err(AnalysisError::FitInput("empty initial guess".into()));
    }
    let mut x = x0.to_vec();
    let mut fx = f(&x);
    let m = fx.len();
    if m == 0 {
        return Err(AnalysisError::FitInput(
            "residual function returned no residuals".into(),
        ));
    }

    let mut cost = sum_squares(&fx);
    let mut lambda = LAMBDA_START;
    let mut n_evaluations = 1usize;
    let mut converged = false;
    let mut iterations = 0usize;

    for iter in 0..options.max_iter {
        iterations = iter + 1;
        if cost < options.f_tol {
            converged = true;
            break;
        }

        let jac = jacobian(&f, &x, &fx, options.eps);
        n_evaluations += n;
        let (mut jtj, jtf) = normal_equations(&jac, &fx, n, m);

        let grad_norm = jtf.iter().map(|v| v * v).sum::<f64>().sqrt();
        if grad_norm < options.g_tol {
            converged = true;
            break;
        }

        // Damp the diagonal and keep it positive definite.
        for (row, d) in jtj.iter_mut().enumerate() {
            d[row] *= 1.0 + lambda;
            if d[row] < ZERO_THRESHOLD {
                d[row] = ZERO_THRESHOLD;
            }
        }

        let rhs: Vec<f64> = jtf.iter().map(|v| -v).collect();
        let step = match gauss_solve(&jtj, &rhs) {
            Some(step) => step,
            None => {
                lambda = (lambda * LAMBDA_UP).min(LAMBDA_MAX);
                continue;
            }
        };

        let x_trial: Vec<f64> = x.iter().zip(&step).map(|(a, b)| a + b).collect();
        let fx_trial = f(&x_trial);
        n_evaluations += 1;
        let cost_trial = sum_squares(&fx_trial);

        if cost_trial < cost {
            let step_norm = step.iter().map(|v| v * v).sum::<f64>().sqrt();
            x = x_trial;
            fx = fx_trial;
            cost = cost_trial;
            lambda = (lambda * LAMBDA_DOWN).max(ZERO_THRESHOLD);
            if step_norm < options.x_tol {
                converged = true;
                break;
            }
        } else {
            lambda = (lambda * LAMBDA_UP).min(LAMBDA_MAX);
        }
    }

    let (covariance, std_errors) = covariance_at(&f, &x, &fx, cost, options.eps);
    if !converged {
        debug!("leastsq stopped at iteration cap ({})", options.max_iter);
    }
    Ok(FitSolution {
        params: x,
        residuals: fx,
        cost,
        iterations,
        n_evaluations,
        converged,
        covariance,
        std_errors,
    })
}

/// Fit `model(x, params)` to `(xs, ys)` by least squares.
pub fn curve_fit<M>(
    model: M,
    xs: &[f64],
    ys: &[f64],
    p0: &[f64],
    options: &FitOptions,
) -> Result<FitSolution, AnalysisError>
where
    M: Fn(f64, &[f64]) -> f64,
{
    if xs.len() != ys.len() {
        return Err(AnalysisError::FitInput(format!(
            "x and y lengths differ: {} vs {}",
            xs.len(),
            ys.len()
        )));
    }
    if xs.is_empty() {
        return Err(AnalysisError::FitInput("no data points".into()));
    }
    let residuals = |params: &[f64]| -> Vec<f64> {
        xs.iter()
            .zip(ys)
            .map(|(&x, &y)| model(x, params) - y)
            .collect()
    };
    leastsq(residuals, p0, options)
}

fn sum_squares(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// Forward-difference Jacobian, m x n: J[i][j] = d f_i / d x_j.
fn jacobian<F>(f: &F, x: &[f64], fx: &[f64], eps: f64) -> Vec<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x.len();
    let m = fx.len();
    let mut jac = vec![vec![0.0; n]; m];
    let mut x_pert = x.to_vec();
    for j in 0..n {
        let saved = x_pert[j];
        x_pert[j] = saved + eps;
        let fx_pert = f(&x_pert);
        x_pert[j] = saved;
        for i in 0..m {
            jac[i][j] = (fx_pert[i] - fx[i]) / eps;
        }
    }
    jac
}

/// Build J^T J and J^T f from the Jacobian.
fn normal_equations(jac: &[Vec<f64>], fx: &[f64], n: usize, m: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut jtj = vec![vec![0.0; n]; n];
    let mut jtf = vec![0.0; n];
    for k in 0..m {
        let row = &jac[k];
        for i in 0..n {
            jtf[i] += row[i] * fx[k];
            for j in i..n {
                jtj[i][j] += row[i] * row[j];
            }
        }
    }
    // Mirror the upper triangle.
    for i in 0..n {
        for j in 0..i {
            jtj[i][j] = jtj[j][i];
        }
    }
    (jtj, jtf)
}

/// Gaussian elimination with partial pivoting. `None` on a singular system.
fn gauss_solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }
    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b)
        .map(|(row, &rhs)| {
            let mut r = row.clone();
            r.push(rhs);
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| {
            aug[r1][col]
                .abs()
                .partial_cmp(&aug[r2][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if aug[pivot][col].abs() < SINGULAR_THRESHOLD {
            return None;
        }
        aug.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = aug[row][col] / aug[col][col];
            for j in col..=n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut acc = aug[i][n];
        for j in (i + 1)..n {
            acc -= aug[i][j] * x[j];
        }
        x[i] = acc / aug[i][i];
    }
    Some(x)
}

/// Covariance s^2 (J^T J)^-1 at the solution, with s^2 = cost / (m - n).
///
/// Returns `(None, None)` when there are no spare degrees of freedom or the
/// normal matrix is singular.
fn covariance_at<F>(
    f: &F,
    x: &[f64],
    fx: &[f64],
    cost: f64,
    eps: f64,
) -> (Option<Vec<Vec<f64>>>, Option<Vec<f64>>)
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x.len();
    let m = fx.len();
    if m <= n {
        return (None, None);
    }
    let jac = jacobian(f, x, fx, eps);
    let (jtj, _) = normal_equations(&jac, fx, n, m);
    let s2 = cost / (m - n) as f64;

    // Invert J^T J column by column.
    let mut inv = vec![vec![0.0; n]; n];
    for col in 0..n {
        let mut e = vec![0.0; n];
        e[col] = 1.0;
        match gauss_solve(&jtj, &e) {
            Some(column) => {
                for row in 0..n {
                    inv[row][col] = column[row] * s2;
                }
            }
            None => return (None, None),
        }
    }
    let std_errors = (0..n).map(|k| inv[k][k].max(0.0).sqrt()).collect();
    (Some(inv), Some(std_errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_line_parameters() {
        let xs: Vec<f64> = (0..5).map(|k| k as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.0 + 2.0 * x).collect();
        let solution = curve_fit(
            |x, p| p[0] + p[1] * x,
            &xs,
            &ys,
            &[0.0, 0.0],
            &FitOptions::default(),
        )
        .unwrap();
        assert!(solution.converged);
        assert!((solution.params[0] - 1.0).abs() < 1e-4);
        assert!((solution.params[1] - 2.0).abs() < 1e-4);
        assert!(solution.cost < 1e-8);
    }

    #[test]
    fn recovers_exponential_decay() {
        let xs: Vec<f64> = (0..10).map(|k| k as f64 * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 2.0 * (-0.5 * x).exp()).collect();
        let solution = curve_fit(
            |x, p| p[0] * (-p[1] * x).exp(),
            &xs,
            &ys,
            &[1.0, 1.0],
            &FitOptions::default(),
        )
        .unwrap();
        assert!(solution.converged);
        assert!((solution.params[0] - 2.0).abs() < 1e-4);
        assert!((solution.params[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn noisy_fit_reports_uncertainties() {
        let xs: Vec<f64> = (0..20).map(|k| k as f64 * 0.5).collect();
        let noise = [
            0.1, -0.05, 0.02, -0.08, 0.03, 0.07, -0.02, 0.04, -0.06, 0.01, -0.03, 0.05, -0.01,
            0.06, -0.04, 0.02, -0.07, 0.03, -0.02, 0.05,
        ];
        let ys: Vec<f64> = xs
            .iter()
            .zip(noise)
            .map(|(&x, n)| 1.5 + 0.8 * x + n)
            .collect();
        let solution = curve_fit(
            |x, p| p[0] + p[1] * x,
            &xs,
            &ys,
            &[0.0, 0.0],
            &FitOptions::default(),
        )
        .unwrap();
        assert!(solution.converged);
        assert!((solution.params[0] - 1.5).abs() < 0.1);
        assert!((solution.params[1] - 0.8).abs() < 0.05);
        let errors = solution.std_errors.unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| *e > 0.0 && *e < 0.1));
        let cov = solution.covariance.unwrap();
        assert!((cov[0][1] - cov[1][0]).abs() < 1e-12);
    }

    #[test]
    fn perfect_fit_with_spare_dof_still_returns() {
        // Covariance exists structurally even when residuals are ~0.
        let xs: Vec<f64> = (0..6).map(|k| k as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x).collect();
        let solution =
            curve_fit(|x, p| p[0] * x, &xs, &ys, &[0.5], &FitOptions::default()).unwrap();
        assert!(solution.converged);
        assert!((solution.params[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn empty_guess_is_rejected() {
        let result = leastsq(|_: &[f64]| vec![0.0], &[], &FitOptions::default());
        assert!(matches!(result, Err(AnalysisError::FitInput(_))));
    }

    #[test]
    fn mismatched_data_is_rejected() {
        let result = curve_fit(
            |_, _| 0.0,
            &[1.0, 2.0, 3.0],
            &[1.0, 2.0],
            &[1.0],
            &FitOptions::default(),
        );
        assert!(matches!(result, Err(AnalysisError::FitInput(_))));
    }

    #[test]
    fn gauss_solve_flags_singular_systems() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(gauss_solve(&a, &[1.0, 2.0]).is_none());
    }
}
