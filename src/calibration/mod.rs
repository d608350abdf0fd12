//! Smile calibration
//!
//! Fits one model to one expiry's market implied vols by minimising
//! Σ (model_iv - market_iv)² with the box-constrained Levenberg-Marquardt in
//! [`optimizer`]. Each call builds its own parameter vector, bounds and
//! buffers, so calibrations of different models can run side by side.

pub mod optimizer;

pub use optimizer::{levenberg_marquardt, BoxConstraints, LmOptions, LmOutcome, TerminationReason};

use crate::config::{CalibrationConfig, EngineConfig, PricingConfig};
use crate::core::{
    CalibrationResult, CalibrationWarning, HestonParams, ImpliedVolPoint, MarketContext, MertonParams,
    ModelKind, ModelParameters, PointResidual, SabrParams, VolError, VolResult,
};
use crate::models::{ImpliedVolSolver, SmilePricer};

/// Parameter vector layout and bounds of one model
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    kind: ModelKind,
    names: Vec<&'static str>,
    bounds: BoxConstraints,
    /// SABR beta held out of the vector
    fixed_beta: Option<f64>,
}

impl ParameterSpace {
    /// Layout for `kind`. SABR's alpha bound scales with the forward since
    /// alpha carries units of F^{1-β}.
    pub fn for_model(kind: ModelKind, forward: f64, sabr_beta: Option<f64>) -> VolResult<Self> {
        let (names, lower, upper, fixed_beta) = match kind {
            ModelKind::BlackScholes => (vec!["sigma"], vec![1e-4], vec![5.0], None),
            ModelKind::Heston => (
                vec!["v0", "theta", "kappa", "sigma_v", "rho"],
                vec![1e-4, 1e-4, 1e-3, 1e-3, -0.999],
                vec![4.0, 4.0, 20.0, 5.0, 0.999],
                None,
            ),
            ModelKind::Sabr => {
                let min_beta = sabr_beta.unwrap_or(0.0);
                let alpha_max = 5.0 * forward.powf(1.0 - min_beta).max(1.0);
                match sabr_beta {
                    Some(beta) => (
                        vec!["alpha", "rho", "nu"],
                        vec![1e-6, -0.999, 0.0],
                        vec![alpha_max, 0.999, 5.0],
                        Some(beta),
                    ),
                    None => (
                        vec!["alpha", "beta", "rho", "nu"],
                        vec![1e-6, 0.0, -0.999, 0.0],
                        vec![alpha_max, 1.0, 0.999, 5.0],
                        None,
                    ),
                }
            }
            ModelKind::Merton => (
                vec!["sigma", "lambda", "mu_j", "sigma_j"],
                vec![0.01, 0.0, -1.0, 0.0],
                vec![3.0, 5.0, 1.0, 2.0],
                None,
            ),
        };
        Ok(Self {
            kind,
            names,
            bounds: BoxConstraints::new(lower, upper)?,
            fixed_beta,
        })
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn bounds(&self) -> &BoxConstraints {
        &self.bounds
    }

    pub fn to_vector(&self, params: &ModelParameters) -> VolResult<Vec<f64>> {
        if params.kind() != self.kind {
            return Err(VolError::invalid_parameter(format!(
                "initial guess is for {}, calibrating {}",
                params.kind(),
                self.kind
            )));
        }
        if let (ModelParameters::Sabr(p), Some(beta)) = (params, self.fixed_beta) {
            if (p.beta - beta).abs() > 1e-12 {
                return Err(VolError::invalid_parameter(format!(
                    "initial guess has sabr beta {}, but beta is fixed at {beta}",
                    p.beta
                )));
            }
        }
        let x = match *params {
            ModelParameters::BlackScholes { sigma } => vec![sigma],
            ModelParameters::Heston(p) => vec![p.v0, p.theta, p.kappa, p.sigma_v, p.rho],
            ModelParameters::Sabr(p) => match self.fixed_beta {
                Some(_) => vec![p.alpha, p.rho, p.nu],
                None => vec![p.alpha, p.beta, p.rho, p.nu],
            },
            ModelParameters::Merton(p) => vec![p.sigma, p.lambda, p.mu_j, p.sigma_j],
        };
        if let Some((name, value)) = self.names.iter().zip(&x).find(|(_, v)| !v.is_finite()) {
            return Err(VolError::invalid_parameter(format!(
                "initial guess for {} has non-finite {name} = {value}",
                self.kind
            )));
        }
        Ok(x)
    }

    pub fn to_params(&self, x: &[f64]) -> ModelParameters {
        match self.kind {
            ModelKind::BlackScholes => ModelParameters::BlackScholes { sigma: x[0] },
            ModelKind::Heston => ModelParameters::Heston(HestonParams::new(x[0], x[1], x[2], x[3], x[4])),
            ModelKind::Sabr => match self.fixed_beta {
                Some(beta) => ModelParameters::Sabr(SabrParams::new(x[0], beta, x[1], x[2])),
                None => ModelParameters::Sabr(SabrParams::new(x[0], x[1], x[2], x[3])),
            },
            ModelKind::Merton => ModelParameters::Merton(MertonParams::new(x[0], x[1], x[2], x[3])),
        }
    }
}

/// Calibrates smile models with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    config: CalibrationConfig,
    pricing: PricingConfig,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig, pricing: PricingConfig) -> Self {
        Self { config, pricing }
    }

    pub fn from_engine(config: &EngineConfig) -> Self {
        Self::new(config.calibration.clone(), config.pricing.clone())
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Fit `kind` to the market points of one expiry.
    ///
    /// Hitting the iteration cap is not an error: the best parameters are
    /// returned with `converged = false`.
    pub fn calibrate(
        &self,
        kind: ModelKind,
        points: &[ImpliedVolPoint],
        ctx: &MarketContext,
        initial_guess: Option<&ModelParameters>,
    ) -> VolResult<CalibrationResult> {
        self.config.validate()?;
        ctx.validate()?;
        if points.is_empty() {
            return Err(VolError::invalid_parameter(format!(
                "no market points to calibrate {kind} against"
            )));
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !(p.strike.is_finite() && p.strike > 0.0 && p.market_iv.is_finite() && p.market_iv > 0.0))
        {
            return Err(VolError::invalid_parameter(format!(
                "invalid market point at strike {}: iv {}",
                bad.strike, bad.market_iv
            )));
        }

        let space = ParameterSpace::for_model(kind, ctx.forward(), self.config.sabr_beta)?;
        let start = match initial_guess {
            Some(guess) => *guess,
            None => self.default_guess(kind, points, ctx),
        };
        let x0 = space.to_vector(&start)?;

        let strikes: Vec<f64> = points.iter().map(|p| p.strike).collect();
        let market: Vec<f64> = points.iter().map(|p| p.market_iv).collect();
        let solver = ImpliedVolSolver::new(self.pricing.solver.clone());
        let penalty = self.config.failure_penalty;

        tracing::debug!(
            "Calibrating {} to {} points (T={:.4})",
            kind,
            points.len(),
            ctx.time_to_expiry
        );

        let options = LmOptions {
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
            ..LmOptions::default()
        };
        let outcome = levenberg_marquardt(&x0, space.bounds(), options, |x| {
            let params = space.to_params(x);
            match SmilePricer::new(&params, ctx, &self.pricing) {
                Ok(pricer) => pricer
                    .smile(&strikes, &solver)
                    .into_iter()
                    .zip(&market)
                    .map(|(iv, m)| match iv {
                        Ok(v) => v - m,
                        Err(_) => penalty,
                    })
                    .collect(),
                Err(_) => vec![penalty; strikes.len()],
            }
        })?;

        let parameters = space.to_params(&outcome.x);
        let result = self.assemble_result(&space, parameters, &outcome, &strikes, &market, ctx)?;

        tracing::debug!(
            "{} calibration finished: sse={:.3e}, iterations={}, converged={} ({:?})",
            kind,
            result.sse,
            result.iterations,
            result.converged,
            outcome.reason
        );
        if !result.converged {
            tracing::warn!(
                "{} calibration stopped after {} iterations without converging",
                kind,
                result.iterations
            );
        }

        Ok(result)
    }

    /// Configured starting point, with the vol level moved to the market's
    /// at-the-money vol when `seed_from_atm` is set.
    fn default_guess(&self, kind: ModelKind, points: &[ImpliedVolPoint], ctx: &MarketContext) -> ModelParameters {
        let mut guess = self.config.initial_guesses.for_model(kind);
        if let ModelParameters::Sabr(ref mut p) = guess {
            if let Some(beta) = self.config.sabr_beta {
                p.beta = beta;
            }
        }
        if !self.config.seed_from_atm {
            return guess;
        }

        let forward = ctx.forward();
        let atm_vol = points
            .iter()
            .min_by(|a, b| (a.strike - forward).abs().total_cmp(&(b.strike - forward).abs()))
            .map(|p| p.market_iv);
        let Some(atm) = atm_vol else {
            return guess;
        };

        match guess {
            ModelParameters::BlackScholes { ref mut sigma } => *sigma = atm,
            ModelParameters::Heston(ref mut p) => {
                p.v0 = atm * atm;
                p.theta = atm * atm;
            }
            ModelParameters::Sabr(ref mut p) => p.alpha = atm * forward.powf(1.0 - p.beta),
            ModelParameters::Merton(ref mut p) => p.sigma = atm,
        }
        guess
    }

    fn assemble_result(
        &self,
        space: &ParameterSpace,
        parameters: ModelParameters,
        outcome: &LmOutcome,
        strikes: &[f64],
        market: &[f64],
        ctx: &MarketContext,
    ) -> VolResult<CalibrationResult> {
        let solver = ImpliedVolSolver::new(self.pricing.solver.clone());
        let model_ivs: Vec<Option<f64>> = match SmilePricer::new(&parameters, ctx, &self.pricing) {
            Ok(pricer) => pricer.smile(strikes, &solver).into_iter().map(Result::ok).collect(),
            Err(_) => vec![None; strikes.len()],
        };

        let penalty = self.config.failure_penalty;
        let residuals: Vec<PointResidual> = strikes
            .iter()
            .zip(market)
            .zip(&model_ivs)
            .map(|((&strike, &market_iv), &model_iv)| PointResidual {
                strike,
                market_iv,
                model_iv,
                residual: model_iv.map_or(penalty, |v| v - market_iv),
            })
            .collect();

        let sse: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
        let rmse = (sse / residuals.len() as f64).sqrt();

        let mut warnings = Vec::new();
        if parameters.feller_satisfied() == Some(false) {
            warnings.push(CalibrationWarning::FellerViolated);
        }
        let active = space.bounds().active(&outcome.x);
        let boundary_constrained = !active.is_empty();
        if boundary_constrained {
            warnings.push(CalibrationWarning::BoundaryConstrained {
                parameters: active.iter().map(|&i| space.names()[i].to_string()).collect(),
            });
        }
        let failed: Vec<f64> = residuals
            .iter()
            .filter(|r| r.model_iv.is_none())
            .map(|r| r.strike)
            .collect();
        if !failed.is_empty() {
            warnings.push(CalibrationWarning::PointFailures { strikes: failed });
        }

        Ok(CalibrationResult {
            model: space.kind,
            parameters,
            residuals,
            sse,
            rmse,
            converged: outcome.converged(),
            iterations: outcome.iterations,
            boundary_constrained,
            warnings,
        })
    }
}

/// Calibrate with an engine configuration
pub fn calibrate(
    kind: ModelKind,
    points: &[ImpliedVolPoint],
    ctx: &MarketContext,
    initial_guess: Option<&ModelParameters>,
    config: &EngineConfig,
) -> VolResult<CalibrationResult> {
    Calibrator::from_engine(config).calibrate(kind, points, ctx, initial_guess)
}
