//! Heston Stochastic Volatility Model
//!
//! The Heston model assumes variance follows a mean-reverting square-root process:
//!
//! dS = (r - q) * S * dt + √v * S * dW_S
//! dv = κ(θ - v) * dt + σ_v * √v * dW_v
//!
//! Calls are priced with the Lewis (2001) single integral
//!
//! C = df [F - √(FK)/π ∫₀^∞ Re(e^{iuk} φ(u - i/2)) / (u² + 1/4) du],  k = ln(F/K)
//!
//! where φ is the characteristic function of ln(S_T/F), evaluated in the
//! "little trap" form of Albrecher et al. so the complex logarithm never
//! crosses its branch cut. The integral uses composite Gauss-Legendre on a
//! fixed panel layout; the characteristic function only depends on the
//! parameters and the expiry, so it is evaluated once per smile and reused
//! for every strike.

use num_complex::Complex64;
use std::f64::consts::PI;

use super::black_scholes::black_forward;
use super::implied::{invert_model_price, ImpliedVolSolver};
use crate::config::HestonQuadratureConfig;
use crate::core::{HestonParams, MarketContext, OptionType, VolError, VolResult};

/// Below this vol-of-vol the variance path is treated as deterministic
pub const DETERMINISTIC_VOL_OF_VOL: f64 = 1e-6;

const KAPPA_EPSILON: f64 = 1e-8;
const MIN_VARIANCE_FOR_CUTOFF: f64 = 1e-4;

/// 8-point Gauss-Legendre nodes on [-1, 1] (positive half) and weights
const GL_NODES: [f64; 4] = [
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_3,
];
const GL_WEIGHTS: [f64; 4] = [
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];

/// Integrated variance ∫₀ᵀ E[v_t] dt
pub fn integrated_variance(params: &HestonParams, time: f64) -> f64 {
    let decay = if params.kappa < KAPPA_EPSILON {
        time
    } else {
        (1.0 - (-params.kappa * time).exp()) / params.kappa
    };
    params.theta * time + (params.v0 - params.theta) * decay
}

/// Characteristic function of ln(S_T / F) at complex argument `w`
pub fn characteristic_function(params: &HestonParams, time: f64, w: Complex64) -> Complex64 {
    let i = Complex64::i();
    // w² + iw
    let a = w * w + i * w;

    if params.sigma_v < DETERMINISTIC_VOL_OF_VOL {
        return (-0.5 * integrated_variance(params, time) * a).exp();
    }

    let sigma2 = params.sigma_v * params.sigma_v;
    let xi = params.kappa - params.rho * params.sigma_v * i * w;
    let d = (xi * xi + sigma2 * a).sqrt();
    let xi_plus_d = xi + d;
    if xi_plus_d.norm() < 1e-300 {
        return Complex64::new(f64::NAN, f64::NAN);
    }
    // ξ - d without cancellation
    let xi_minus_d = -sigma2 * a / xi_plus_d;
    let g = xi_minus_d / xi_plus_d;
    let e = (-d * time).exp();

    let c = (params.kappa * params.theta / sigma2)
        * (xi_minus_d * time - 2.0 * ((1.0 - g * e) / (1.0 - g)).ln());
    let dd = (xi_minus_d / sigma2) * (1.0 - e) / (1.0 - g * e);

    (c + dd * params.v0).exp()
}

/// Heston pricer for one expiry
///
/// Holds the quadrature nodes and the characteristic function evaluated on
/// them; pricing a strike is then a weighted sum.
#[derive(Debug, Clone)]
pub struct HestonModel {
    params: HestonParams,
    ctx: MarketContext,
    nodes: Vec<f64>,
    weights: Vec<f64>,
    phi: Vec<Complex64>,
    price_floor: f64,
}

impl HestonModel {
    pub fn new(params: HestonParams, ctx: MarketContext, quadrature: &HestonQuadratureConfig) -> VolResult<Self> {
        params.validate()?;
        ctx.validate()?;

        let cutoff = integration_cutoff(&params, ctx.time_to_expiry, quadrature);
        let (nodes, weights) = gauss_legendre_panels(cutoff, quadrature);

        let phi = nodes
            .iter()
            .map(|&u| characteristic_function(&params, ctx.time_to_expiry, Complex64::new(u, -0.5)))
            .collect::<Vec<_>>();
        if phi.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(VolError::model_domain(format!(
                "heston characteristic function not finite for {params:?} at T={}",
                ctx.time_to_expiry
            )));
        }

        Ok(Self {
            params,
            ctx,
            nodes,
            weights,
            phi,
            price_floor: quadrature.price_floor,
        })
    }

    pub fn params(&self) -> &HestonParams {
        &self.params
    }

    /// Undiscounted-band-clamped call price
    pub fn call_price(&self, strike: f64) -> VolResult<f64> {
        if !strike.is_finite() || strike <= 0.0 {
            return Err(VolError::invalid_parameter(format!("strike must be positive, got {strike}")));
        }
        let forward = self.ctx.forward();
        let df = self.ctx.discount_factor();
        let k = (forward / strike).ln();

        let integral: f64 = self
            .nodes
            .iter()
            .zip(&self.weights)
            .zip(&self.phi)
            .map(|((&u, &w), &phi)| {
                let kernel = Complex64::new(0.0, u * k).exp() * phi;
                w * kernel.re / (u * u + 0.25)
            })
            .sum();

        let call = df * (forward - (forward * strike).sqrt() / PI * integral);
        if !call.is_finite() {
            return Err(VolError::model_domain(format!("heston price not finite at strike {strike}")));
        }
        let lower = df * (forward - strike).max(0.0);
        let upper = df * forward;
        Ok(call.clamp(lower, upper))
    }

    /// Price through put-call parity for puts
    pub fn price(&self, strike: f64, option_type: OptionType) -> VolResult<f64> {
        let call = self.call_price(strike)?;
        match option_type {
            OptionType::Call => Ok(call),
            OptionType::Put => {
                let df = self.ctx.discount_factor();
                Ok((call - df * (self.ctx.forward() - strike)).max(0.0))
            }
        }
    }

    /// Black-Scholes vol of the out-of-the-money option at `strike`
    pub fn implied_vol(&self, strike: f64, solver: &ImpliedVolSolver) -> VolResult<f64> {
        let forward = self.ctx.forward();
        let option_type = OptionType::otm_for(strike, forward);
        let price = self.price(strike, option_type)?;
        let floor = self.price_floor * self.ctx.discount_factor() * forward;
        if price < floor {
            return Err(VolError::model_domain(format!(
                "heston {option_type} price {price:.3e} at strike {strike} is below the quadrature floor {floor:.3e}"
            )));
        }
        invert_model_price(solver, price, &self.ctx, strike, option_type)
    }

    /// Implied vols for many strikes, sharing the characteristic function
    pub fn smile(&self, strikes: &[f64], solver: &ImpliedVolSolver) -> Vec<VolResult<f64>> {
        strikes.iter().map(|&k| self.implied_vol(k, solver)).collect()
    }

    /// Black price with the integrated variance, the σ_v → 0 limit
    pub fn deterministic_price(&self, strike: f64, option_type: OptionType) -> f64 {
        let t = self.ctx.time_to_expiry;
        let vol = (integrated_variance(&self.params, t) / t).max(0.0).sqrt();
        black_forward(self.ctx.forward(), strike, vol, t, self.ctx.discount_factor(), option_type)
    }
}

/// Upper integration limit
pub fn integration_cutoff(params: &HestonParams, time: f64, quadrature: &HestonQuadratureConfig) -> f64 {
    let v_min = params.v0.min(params.theta).max(MIN_VARIANCE_FOR_CUTOFF);
    (60.0 / (v_min * time))
        .sqrt()
        .clamp(quadrature.min_cutoff, quadrature.max_cutoff)
}

/// Nodes and weights for [0, inner_limit] ∪ [inner_limit, cutoff]
fn gauss_legendre_panels(cutoff: f64, quadrature: &HestonQuadratureConfig) -> (Vec<f64>, Vec<f64>) {
    let total = 8 * (quadrature.inner_panels + quadrature.outer_panels);
    let mut nodes = Vec::with_capacity(total);
    let mut weights = Vec::with_capacity(total);

    let mut push_panels = |start: f64, end: f64, panels: usize| {
        let width = (end - start) / panels as f64;
        for p in 0..panels {
            let center = start + (p as f64 + 0.5) * width;
            let half = 0.5 * width;
            for (&x, &w) in GL_NODES.iter().zip(GL_WEIGHTS.iter()) {
                nodes.push(center - half * x);
                weights.push(half * w);
                nodes.push(center + half * x);
                weights.push(half * w);
            }
        }
    };

    push_panels(0.0, quadrature.inner_limit, quadrature.inner_panels);
    push_panels(quadrature.inner_limit, cutoff, quadrature.outer_panels);
    (nodes, weights)
}
