//! Volatility Models
//!
//! Implements:
//! - Black-Scholes (pricing, Greeks, the vol normalizer for all models)
//! - Implied volatility solver
//! - Heston stochastic volatility (Lewis integral)
//! - SABR (Hagan expansion)
//! - Merton jump-diffusion (Poisson series)
//!
//! `SmilePricer` dispatches a `ModelParameters` value to the right pricer so
//! callers get model implied vols without matching on the model themselves.

pub mod black_scholes;
pub mod heston;
pub mod implied;
pub mod merton;
pub mod sabr;

pub use black_scholes::{greeks, norm_cdf, norm_pdf, price};
pub use heston::HestonModel;
pub use implied::{implied_vol, newton_step_accepted, price_bounds, ImpliedVolSolver, IvSolution, SolveMethod};
pub use merton::MertonModel;
pub use sabr::{hagan_implied_vol, SabrModel};

use crate::config::PricingConfig;
use crate::core::{ensure_positive, MarketContext, ModelParameters, OptionType, VolResult};

/// Any model, bound to one expiry
#[derive(Debug, Clone)]
pub enum SmilePricer {
    BlackScholes { sigma: f64, ctx: MarketContext },
    Heston(HestonModel),
    Sabr(SabrModel),
    Merton(MertonModel),
}

impl SmilePricer {
    /// Validate the parameters and do any per-expiry precomputation
    pub fn new(params: &ModelParameters, ctx: &MarketContext, pricing: &PricingConfig) -> VolResult<Self> {
        params.validate()?;
        ctx.validate()?;
        Ok(match *params {
            ModelParameters::BlackScholes { sigma } => SmilePricer::BlackScholes { sigma, ctx: *ctx },
            ModelParameters::Heston(p) => SmilePricer::Heston(HestonModel::new(p, *ctx, &pricing.heston)?),
            ModelParameters::Sabr(p) => SmilePricer::Sabr(SabrModel::new(p, *ctx)?),
            ModelParameters::Merton(p) => SmilePricer::Merton(MertonModel::new(p, *ctx, &pricing.merton)?),
        })
    }

    /// Model implied volatility at `strike`
    pub fn implied_vol(&self, strike: f64, solver: &ImpliedVolSolver) -> VolResult<f64> {
        ensure_positive(strike, "strike")?;
        match self {
            SmilePricer::BlackScholes { sigma, .. } => Ok(*sigma),
            SmilePricer::Heston(m) => m.implied_vol(strike, solver),
            SmilePricer::Sabr(m) => m.implied_vol(strike),
            SmilePricer::Merton(m) => m.implied_vol(strike, solver),
        }
    }

    pub fn smile(&self, strikes: &[f64], solver: &ImpliedVolSolver) -> Vec<VolResult<f64>> {
        strikes.iter().map(|&k| self.implied_vol(k, solver)).collect()
    }

    /// Model price of a European option
    pub fn price(&self, strike: f64, option_type: OptionType) -> VolResult<f64> {
        match self {
            SmilePricer::BlackScholes { sigma, ctx } => black_scholes::price(
                ctx.spot_price,
                strike,
                ctx.time_to_expiry,
                *sigma,
                ctx.risk_free_rate,
                ctx.dividend_yield,
                option_type,
            ),
            SmilePricer::Heston(m) => m.price(strike, option_type),
            SmilePricer::Sabr(m) => m.price(strike, option_type),
            SmilePricer::Merton(m) => m.price(strike, option_type),
        }
    }
}

/// Model implied volatility at one strike
pub fn implied_vol_at(
    strike: f64,
    ctx: &MarketContext,
    params: &ModelParameters,
    pricing: &PricingConfig,
) -> VolResult<f64> {
    let solver = ImpliedVolSolver::new(pricing.solver.clone());
    SmilePricer::new(params, ctx, pricing)?.implied_vol(strike, &solver)
}

/// Model implied volatilities for a whole smile.
///
/// The outer error covers invalid parameters or context; per-strike
/// failures are reported in place.
pub fn smile_vols(
    strikes: &[f64],
    ctx: &MarketContext,
    params: &ModelParameters,
    pricing: &PricingConfig,
) -> VolResult<Vec<VolResult<f64>>> {
    let solver = ImpliedVolSolver::new(pricing.solver.clone());
    let pricer = SmilePricer::new(params, ctx, pricing)?;
    Ok(pricer.smile(strikes, &solver))
}
