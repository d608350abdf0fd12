//! SABR Model
//!
//! Hagan et al. (2002) lognormal implied vol expansion:
//!
//! dF = α F^β dW_1,  dα = ν α dW_2,  d<W_1, W_2> = ρ dt
//!
//! Evaluated on the forward F = S e^{(r-q)T}. The expansion is closed form,
//! so no pricing integral or root finding is involved.

use super::black_scholes::black_forward;
use crate::core::{MarketContext, OptionType, SabrParams, VolError, VolResult};

const SMALL_Z: f64 = 1e-7;
const RHO_EDGE: f64 = 1e-12;

/// z / x(z), with the ρ = ±1 closed forms
fn z_over_x(z: f64, rho: f64) -> VolResult<f64> {
    if z.abs() < SMALL_Z {
        return Ok(1.0 - 0.5 * rho * z);
    }

    let x = if (1.0 - rho).abs() < RHO_EDGE {
        if z >= 1.0 {
            return Err(VolError::model_domain(format!("sabr x(z) undefined for rho=1, z={z}")));
        }
        -(1.0 - z).ln()
    } else if (1.0 + rho).abs() < RHO_EDGE {
        if z <= -1.0 {
            return Err(VolError::model_domain(format!("sabr x(z) undefined for rho=-1, z={z}")));
        }
        (1.0 + z).ln()
    } else {
        let s = (1.0 - 2.0 * rho * z + z * z).sqrt();
        ((s + z - rho) / (1.0 - rho)).ln()
    };

    if !x.is_finite() || x == 0.0 {
        return Err(VolError::model_domain(format!("sabr x(z) degenerate at z={z}")));
    }
    Ok(z / x)
}

/// Hagan implied vol for a strike on a given forward
pub fn hagan_implied_vol(params: &SabrParams, forward: f64, strike: f64, time: f64) -> VolResult<f64> {
    params.validate()?;
    if !(forward.is_finite() && forward > 0.0 && strike.is_finite() && strike > 0.0) {
        return Err(VolError::invalid_parameter(format!(
            "forward and strike must be positive, got F={forward}, K={strike}"
        )));
    }
    if !(time.is_finite() && time > 0.0) {
        return Err(VolError::invalid_parameter(format!("time_to_expiry must be positive, got {time}")));
    }

    let SabrParams { alpha, beta, rho, nu } = *params;
    let one_minus_beta = 1.0 - beta;

    let log_fk = (forward / strike).ln();
    let fk_pow = (forward * strike).powf(0.5 * one_minus_beta);

    let lfk2 = log_fk * log_fk;
    let omb2 = one_minus_beta * one_minus_beta;
    let denominator = fk_pow * (1.0 + omb2 / 24.0 * lfk2 + omb2 * omb2 / 1920.0 * lfk2 * lfk2);

    let z = nu / alpha * fk_pow * log_fk;
    let zx = z_over_x(z, rho)?;

    let correction = 1.0
        + (omb2 * alpha * alpha / (24.0 * fk_pow * fk_pow)
            + rho * beta * nu * alpha / (4.0 * fk_pow)
            + (2.0 - 3.0 * rho * rho) * nu * nu / 24.0)
            * time;

    let vol = alpha / denominator * zx * correction;
    if !vol.is_finite() || vol <= 0.0 {
        return Err(VolError::model_domain(format!(
            "sabr vol not positive at strike {strike}: {vol}"
        )));
    }
    Ok(vol)
}

/// SABR pricer bound to one expiry
#[derive(Debug, Clone, Copy)]
pub struct SabrModel {
    params: SabrParams,
    ctx: MarketContext,
}

impl SabrModel {
    pub fn new(params: SabrParams, ctx: MarketContext) -> VolResult<Self> {
        params.validate()?;
        ctx.validate()?;
        Ok(Self { params, ctx })
    }

    pub fn params(&self) -> &SabrParams {
        &self.params
    }

    pub fn implied_vol(&self, strike: f64) -> VolResult<f64> {
        hagan_implied_vol(&self.params, self.ctx.forward(), strike, self.ctx.time_to_expiry)
    }

    pub fn smile(&self, strikes: &[f64]) -> Vec<VolResult<f64>> {
        strikes.iter().map(|&k| self.implied_vol(k)).collect()
    }

    /// Black price at the SABR vol
    pub fn price(&self, strike: f64, option_type: OptionType) -> VolResult<f64> {
        let vol = self.implied_vol(strike)?;
        Ok(black_forward(
            self.ctx.forward(),
            strike,
            vol,
            self.ctx.time_to_expiry,
            self.ctx.discount_factor(),
            option_type,
        ))
    }
}
