//! Merton Jump-Diffusion Model
//!
//! Lognormal jumps arriving at Poisson rate λ on top of a Black-Scholes
//! diffusion. Conditional on n jumps the terminal price is lognormal, so the
//! price is a Poisson-weighted sum of Black prices:
//!
//! V = Σ_n e^{-λT}(λT)^n/n! · Black(F_n, K, σ_n, T, e^{-rT})
//!
//! with k = e^{μ_j + σ_j²/2} - 1, σ_n² = σ² + nσ_j²/T and
//! F_n = S exp((r - λk - q)T + n ln(1 + k)).

use super::black_scholes::black_forward;
use super::implied::{invert_model_price, ImpliedVolSolver};
use crate::config::MertonSeriesConfig;
use crate::core::{MarketContext, MertonParams, OptionType, VolError, VolResult};

/// e^{-λT} underflows past this
const MAX_EXPECTED_JUMPS: f64 = 700.0;

#[derive(Debug, Clone)]
pub struct MertonModel {
    params: MertonParams,
    ctx: MarketContext,
    series: MertonSeriesConfig,
}

impl MertonModel {
    pub fn new(params: MertonParams, ctx: MarketContext, series: &MertonSeriesConfig) -> VolResult<Self> {
        params.validate()?;
        ctx.validate()?;
        let expected_jumps = params.lambda * ctx.time_to_expiry;
        if expected_jumps > MAX_EXPECTED_JUMPS {
            return Err(VolError::model_domain(format!(
                "merton lambda*T = {expected_jumps} too large for the Poisson series"
            )));
        }
        Ok(Self {
            params,
            ctx,
            series: series.clone(),
        })
    }

    pub fn params(&self) -> &MertonParams {
        &self.params
    }

    pub fn price(&self, strike: f64, option_type: OptionType) -> VolResult<f64> {
        if !strike.is_finite() || strike <= 0.0 {
            return Err(VolError::invalid_parameter(format!("strike must be positive, got {strike}")));
        }

        let p = &self.params;
        let ctx = &self.ctx;
        let time = ctx.time_to_expiry;
        let df = ctx.discount_factor();
        let k = p.mean_jump();
        let log_jump = p.mu_j + 0.5 * p.sigma_j * p.sigma_j;
        let expected_jumps = p.lambda * time;
        let drift = ctx.risk_free_rate - p.lambda * k - ctx.dividend_yield;

        let mut weight = (-expected_jumps).exp();
        let mut cumulative = 0.0;
        let mut total = 0.0;
        let mut truncated = false;

        for n in 0..self.series.max_terms {
            if n > 0 {
                weight *= expected_jumps / n as f64;
            }
            let vol_n = if n == 0 {
                p.sigma
            } else {
                (p.sigma * p.sigma + n as f64 * p.sigma_j * p.sigma_j / time).sqrt()
            };
            let forward_n = ctx.spot_price * (drift * time + n as f64 * log_jump).exp();

            total += weight * black_forward(forward_n, strike, vol_n, time, df, option_type);
            cumulative += weight;

            if 1.0 - cumulative < self.series.tail_tolerance {
                truncated = true;
                break;
            }
        }

        if !truncated {
            return Err(VolError::model_domain(format!(
                "merton series still missing {:.2e} of Poisson mass after {} terms",
                1.0 - cumulative,
                self.series.max_terms
            )));
        }
        if !total.is_finite() {
            return Err(VolError::model_domain(format!("merton price not finite at strike {strike}")));
        }
        Ok(total)
    }

    /// Black-Scholes vol of the out-of-the-money option at `strike`
    pub fn implied_vol(&self, strike: f64, solver: &ImpliedVolSolver) -> VolResult<f64> {
        let option_type = OptionType::otm_for(strike, self.ctx.forward());
        let price = self.price(strike, option_type)?;
        invert_model_price(solver, price, &self.ctx, strike, option_type)
    }

    pub fn smile(&self, strikes: &[f64], solver: &ImpliedVolSolver) -> Vec<VolResult<f64>> {
        strikes.iter().map(|&k| self.implied_vol(k, solver)).collect()
    }
}
