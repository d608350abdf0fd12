//! Box-constrained Levenberg-Marquardt
//!
//! Levenberg (1944), Marquardt (1963). Steps are projected onto the box and
//! variables pinned at a bound with the gradient pushing outward are frozen
//! for that iteration. Every buffer is owned by a single call.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::core::{VolError, VolResult};

/// Box constraints `lower <= x <= upper`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoxConstraints {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> VolResult<Self> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(VolError::invalid_parameter(
                "constraints require same non-zero lower/upper dimensions",
            ));
        }
        for (i, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(VolError::invalid_parameter(format!(
                    "invalid bound at index {i}: [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| v.clamp(self.lower[i], self.upper[i]))
            .collect()
    }

    /// Indices of coordinates sitting on a bound
    pub fn active(&self, x: &[f64]) -> Vec<usize> {
        x.iter()
            .enumerate()
            .filter(|&(i, &v)| self.at_lower(i, v) || self.at_upper(i, v))
            .map(|(i, _)| i)
            .collect()
    }

    fn at_lower(&self, i: usize, v: f64) -> bool {
        v - self.lower[i] <= BOUND_EPSILON * self.lower[i].abs().max(1.0)
    }

    fn at_upper(&self, i: usize, v: f64) -> bool {
        self.upper[i] - v <= BOUND_EPSILON * self.upper[i].abs().max(1.0)
    }
}

const BOUND_EPSILON: f64 = 1e-10;

/// Why the optimizer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Residuals are zero to working precision
    ExactFit,
    /// Accepted step reduced the SSE by less than the relative tolerance
    ObjectiveTolerance,
    /// Projected gradient vanished
    GradientTolerance,
    /// Step collapsed
    StepTolerance,
    /// No damping level yields a lower SSE
    Stagnation,
    /// Gradient or objective stopped being finite
    NumericalFailure,
    MaxIterations,
}

impl TerminationReason {
    /// Stagnation counts: no step reduces the SSE, so the relative
    /// reduction is zero.
    pub fn is_converged(&self) -> bool {
        !matches!(
            self,
            TerminationReason::NumericalFailure | TerminationReason::MaxIterations
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative SSE reduction threshold
    pub tolerance: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub gradient_tolerance: f64,
    pub step_tolerance: f64,
    pub exact_fit: f64,
    pub finite_diff_epsilon: f64,
    pub max_stagnation: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.3,
            gradient_tolerance: 1e-14,
            step_tolerance: 1e-12,
            exact_fit: 1e-20,
            finite_diff_epsilon: 1e-5,
            max_stagnation: 25,
        }
    }
}

/// Best point found and how the run ended
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Σ r²
    pub sse: f64,
    pub iterations: usize,
    pub reason: TerminationReason,
}

impl LmOutcome {
    pub fn converged(&self) -> bool {
        self.reason.is_converged()
    }
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

fn finite_difference_jacobian<F>(
    x: &[f64],
    base_residuals: &[f64],
    bounds: &BoxConstraints,
    eps_scale: f64,
    residual_fn: &mut F,
) -> DMatrix<f64>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let m = base_residuals.len();
    let n = x.len();
    let mut jacobian = DMatrix::zeros(m, n);

    for c in 0..n {
        let mut xp = x.to_vec();
        let h = (x[c].abs() * eps_scale).max(1e-7);

        xp[c] = (x[c] + h).min(bounds.upper[c]);
        if (xp[c] - x[c]).abs() < 1e-14 {
            xp[c] = (x[c] - h).max(bounds.lower[c]);
        }

        let denom = xp[c] - x[c];
        if denom.abs() < 1e-14 {
            continue;
        }

        let rp = residual_fn(&xp);
        for r in 0..m {
            jacobian[(r, c)] = (rp[r] - base_residuals[r]) / denom;
        }
    }

    jacobian
}

/// Minimise Σ r(x)² over the box.
///
/// The residual function must return a vector of fixed length with finite
/// entries; callers map pricing failures to a finite penalty.
pub fn levenberg_marquardt<F>(
    initial: &[f64],
    bounds: &BoxConstraints,
    options: LmOptions,
    mut residual_fn: F,
) -> VolResult<LmOutcome>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    if initial.len() != bounds.dimension() {
        return Err(VolError::invalid_parameter(
            "initial vector dimension does not match bounds",
        ));
    }

    let mut x = bounds.clamp(initial);
    let mut residuals = residual_fn(&x);
    if residuals.is_empty() {
        return Err(VolError::invalid_parameter("no residuals to fit"));
    }
    let mut sse = sum_of_squares(&residuals);
    if !sse.is_finite() {
        return Err(VolError::model_domain("objective is not finite at the initial point"));
    }

    let n = x.len();
    let mut lambda = options.initial_lambda.max(1e-12);
    let mut iterations = 0;
    let mut stagnation = 0;
    let mut reason = TerminationReason::MaxIterations;

    'outer: while iterations < options.max_iterations {
        if sse <= options.exact_fit {
            reason = TerminationReason::ExactFit;
            break;
        }
        iterations += 1;

        let jacobian = finite_difference_jacobian(
            &x,
            &residuals,
            bounds,
            options.finite_diff_epsilon,
            &mut residual_fn,
        );
        let r_vec = DVector::from_column_slice(&residuals);
        let jt = jacobian.transpose();
        let normal = &jt * &jacobian;
        let mut gradient = &jt * r_vec;

        // Freeze coordinates that the descent direction would push out of the box
        let mut frozen = vec![false; n];
        for i in 0..n {
            let pushes_down = gradient[i] > 0.0 && bounds.at_lower(i, x[i]);
            let pushes_up = gradient[i] < 0.0 && bounds.at_upper(i, x[i]);
            if pushes_down || pushes_up {
                frozen[i] = true;
                gradient[i] = 0.0;
            }
        }

        let gradient_norm = gradient.norm();
        if !gradient_norm.is_finite() {
            reason = TerminationReason::NumericalFailure;
            break;
        }
        if gradient_norm <= options.gradient_tolerance {
            reason = TerminationReason::GradientTolerance;
            break;
        }

        // Inner loop: raise damping until a step improves the SSE
        loop {
            let mut a = normal.clone();
            for i in 0..n {
                if frozen[i] {
                    for j in 0..n {
                        a[(i, j)] = 0.0;
                        a[(j, i)] = 0.0;
                    }
                    a[(i, i)] = 1.0;
                } else {
                    a[(i, i)] += lambda * (a[(i, i)].abs() + 1.0);
                }
            }

            let step = a.lu().solve(&(-&gradient));
            let Some(delta) = step else {
                lambda = (lambda * options.lambda_up).min(1e12);
                stagnation += 1;
                if stagnation >= options.max_stagnation {
                    reason = TerminationReason::Stagnation;
                    break 'outer;
                }
                continue;
            };

            let candidate: Vec<f64> = bounds.clamp(
                &x.iter()
                    .zip(delta.iter())
                    .map(|(xi, di)| xi + di)
                    .collect::<Vec<_>>(),
            );
            let step_norm = candidate
                .iter()
                .zip(&x)
                .map(|(c, xi)| (c - xi) * (c - xi))
                .sum::<f64>()
                .sqrt();
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step_norm <= options.step_tolerance * (x_norm + options.step_tolerance) {
                reason = TerminationReason::StepTolerance;
                break 'outer;
            }

            let candidate_residuals = residual_fn(&candidate);
            let candidate_sse = sum_of_squares(&candidate_residuals);

            if candidate_sse.is_finite() && candidate_sse < sse {
                let relative_reduction = (sse - candidate_sse) / sse;
                x = candidate;
                residuals = candidate_residuals;
                sse = candidate_sse;
                lambda = (lambda * options.lambda_down).max(1e-12);
                stagnation = 0;

                if relative_reduction < options.tolerance {
                    reason = TerminationReason::ObjectiveTolerance;
                    break 'outer;
                }
                continue 'outer;
            }

            lambda = (lambda * options.lambda_up).min(1e12);
            stagnation += 1;
            if stagnation >= options.max_stagnation {
                reason = TerminationReason::Stagnation;
                break 'outer;
            }
        }
    }

    if reason == TerminationReason::MaxIterations && sse <= options.exact_fit {
        reason = TerminationReason::ExactFit;
    }

    Ok(LmOutcome {
        x,
        residuals,
        sse,
        iterations,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_constraints() {
        assert!(BoxConstraints::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(BoxConstraints::new(vec![1.0], vec![0.0]).is_err());

        let bounds = BoxConstraints::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
        assert_eq!(bounds.clamp(&[2.0, -3.0]), vec![1.0, -1.0]);
        assert_eq!(bounds.active(&[1.0, 0.0]), vec![0]);
    }

    #[test]
    fn test_fits_linear_model() {
        // y = 2x + 1
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let bounds = BoxConstraints::new(vec![-10.0, -10.0], vec![10.0, 10.0]).unwrap();
        let out = levenberg_marquardt(&[0.0, 0.0], &bounds, LmOptions::default(), |p| {
            xs.iter().map(|x| p[0] * x + p[1] - (2.0 * x + 1.0)).collect()
        })
        .unwrap();

        assert!(out.converged());
        assert!((out.x[0] - 2.0).abs() < 1e-6);
        assert!((out.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rosenbrock_residuals() {
        let bounds = BoxConstraints::new(vec![-5.0, -5.0], vec![5.0, 5.0]).unwrap();
        let out = levenberg_marquardt(&[-1.2, 1.0], &bounds, LmOptions::default(), |p| {
            vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]]
        })
        .unwrap();
        assert!((out.x[0] - 1.0).abs() < 1e-4);
        assert!((out.x[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_minimum_outside_box_lands_on_bound() {
        // unconstrained optimum at x = -2
        let bounds = BoxConstraints::new(vec![0.0], vec![5.0]).unwrap();
        let out = levenberg_marquardt(&[3.0], &bounds, LmOptions::default(), |p| {
            vec![p[0] + 2.0, 0.5 * (p[0] + 2.0)]
        })
        .unwrap();
        assert!(out.x[0].abs() < 1e-12);
        assert!(out.converged());
        assert_eq!(bounds.active(&out.x), vec![0]);
    }

    #[test]
    fn test_iteration_cap_keeps_best_point() {
        let bounds = BoxConstraints::new(vec![-5.0, -5.0], vec![5.0, 5.0]).unwrap();
        let options = LmOptions {
            max_iterations: 2,
            ..Default::default()
        };
        let start_sse = {
            let (a, b) = (-1.2_f64, 1.0_f64);
            (10.0 * (b - a * a)).powi(2) + (1.0 - a).powi(2)
        };
        let out = levenberg_marquardt(&[-1.2, 1.0], &bounds, options, |p| {
            vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]]
        })
        .unwrap();
        assert_eq!(out.reason, TerminationReason::MaxIterations);
        assert!(!out.converged());
        assert!(out.sse <= start_sse);
        assert_eq!(out.iterations, 2);
    }

    #[test]
    fn test_rejects_dimension_mismatch() {
        let bounds = BoxConstraints::new(vec![0.0], vec![1.0]).unwrap();
        assert!(levenberg_marquardt(&[0.5, 0.5], &bounds, LmOptions::default(), |_| vec![0.0]).is_err());
    }
}
