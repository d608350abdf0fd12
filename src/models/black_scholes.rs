//! Black-Scholes Model
//!
//! Provides:
//! - European option pricing
//! - Greeks computation
//! - The forward/discount Black kernel shared with the Merton series
//!
//! Black-Scholes is the normalizer for every other model: model prices are
//! mapped back to volatility units through it.

use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

use crate::core::{ensure_finite, ensure_positive, Greeks, OptionType, VolResult};

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes d1 parameter
pub fn d1(spot: f64, strike: f64, time: f64, vol: f64, rate: f64, div: f64) -> f64 {
    let forward = spot * ((rate - div) * time).exp();
    ((forward / strike).ln() + 0.5 * vol * vol * time) / (vol * time.sqrt())
}

/// Black-Scholes d2 parameter
pub fn d2(spot: f64, strike: f64, time: f64, vol: f64, rate: f64, div: f64) -> f64 {
    d1(spot, strike, time, vol, rate, div) - vol * time.sqrt()
}

/// Black (1976) price on a forward, discounted with `df`.
///
/// Inputs are assumed valid.
pub(crate) fn black_forward(
    forward: f64,
    strike: f64,
    vol: f64,
    time: f64,
    df: f64,
    option_type: OptionType,
) -> f64 {
    let std_dev = vol * time.sqrt();
    let d1 = ((forward / strike).ln() + 0.5 * std_dev * std_dev) / std_dev;
    let d2 = d1 - std_dev;

    let value = match option_type {
        OptionType::Call => df * (forward * norm_cdf(d1) - strike * norm_cdf(d2)),
        OptionType::Put => df * (strike * norm_cdf(-d2) - forward * norm_cdf(-d1)),
    };
    value.max(0.0)
}

/// Unvalidated spot price, for the solver's inner loop
pub(crate) fn price_unchecked(
    spot: f64,
    strike: f64,
    time: f64,
    vol: f64,
    rate: f64,
    div: f64,
    option_type: OptionType,
) -> f64 {
    let forward = spot * ((rate - div) * time).exp();
    let df = (-rate * time).exp();
    black_forward(forward, strike, vol, time, df, option_type)
}

/// dV/dσ, identical for calls and puts
pub(crate) fn vega_unchecked(spot: f64, strike: f64, time: f64, vol: f64, rate: f64, div: f64) -> f64 {
    let d1 = d1(spot, strike, time, vol, rate, div);
    spot * (-div * time).exp() * norm_pdf(d1) * time.sqrt()
}

fn validate_inputs(spot: f64, strike: f64, time: f64, vol: f64, rate: f64, div: f64) -> VolResult<()> {
    ensure_positive(spot, "spot")?;
    ensure_positive(strike, "strike")?;
    ensure_positive(time, "time_to_expiry")?;
    ensure_positive(vol, "volatility")?;
    ensure_finite(rate, "rate")?;
    ensure_finite(div, "dividend_yield")?;
    Ok(())
}

/// Black-Scholes European option price
pub fn price(
    spot: f64,
    strike: f64,
    time: f64,
    vol: f64,
    rate: f64,
    div: f64,
    option_type: OptionType,
) -> VolResult<f64> {
    validate_inputs(spot, strike, time, vol, rate, div)?;
    Ok(price_unchecked(spot, strike, time, vol, rate, div, option_type))
}

/// Black-Scholes Greeks
///
/// Raw partial derivatives: vega per unit of vol, theta per year (dV/dt as
/// calendar time passes), rho per unit of rate.
pub fn greeks(
    spot: f64,
    strike: f64,
    time: f64,
    vol: f64,
    rate: f64,
    div: f64,
    option_type: OptionType,
) -> VolResult<Greeks> {
    validate_inputs(spot, strike, time, vol, rate, div)?;

    let d1 = d1(spot, strike, time, vol, rate, div);
    let d2 = d1 - vol * time.sqrt();
    let df = (-rate * time).exp();
    let sqrt_t = time.sqrt();
    let pdf_d1 = norm_pdf(d1);
    let div_factor = (-div * time).exp();

    let delta = match option_type {
        OptionType::Call => div_factor * norm_cdf(d1),
        OptionType::Put => div_factor * (norm_cdf(d1) - 1.0),
    };

    let gamma = div_factor * pdf_d1 / (spot * vol * sqrt_t);

    let vega = spot * div_factor * pdf_d1 * sqrt_t;

    let decay = -spot * div_factor * pdf_d1 * vol / (2.0 * sqrt_t);
    let theta = match option_type {
        OptionType::Call => {
            decay - rate * strike * df * norm_cdf(d2) + div * spot * div_factor * norm_cdf(d1)
        }
        OptionType::Put => {
            decay + rate * strike * df * norm_cdf(-d2) - div * spot * div_factor * norm_cdf(-d1)
        }
    };

    let rho = match option_type {
        OptionType::Call => strike * time * df * norm_cdf(d2),
        OptionType::Put => -strike * time * df * norm_cdf(-d2),
    };

    let mut greeks = Greeks::new(delta, gamma, vega, theta, rho);

    // d(delta)/d(vol)
    greeks.vanna = Some(-div_factor * pdf_d1 * d2 / vol);
    // d(vega)/d(vol)
    greeks.volga = Some(vega * d1 * d2 / vol);

    Ok(greeks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VolError;

    #[test]
    fn test_norm_cdf() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((norm_cdf(1.96) - 0.975).abs() < 0.001);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 0.001);
        assert!((norm_cdf(1.0) + norm_cdf(-1.0) - 1.0).abs() < 1e-15);
        assert!(norm_cdf(-40.0) >= 0.0);
    }

    #[test]
    fn test_reference_price() {
        let call = price(100.0, 105.0, 1.0, 0.2, 0.05, 0.0, OptionType::Call).unwrap();
        assert!((call - 8.02).abs() < 0.01, "call = {call}");
    }

    #[test]
    fn test_put_call_parity() {
        let (spot, strike, time, vol, rate, div) = (100.0, 95.0, 0.75, 0.3, 0.04, 0.015);
        let call = price(spot, strike, time, vol, rate, div, OptionType::Call).unwrap();
        let put = price(spot, strike, time, vol, rate, div, OptionType::Put).unwrap();
        let parity = spot * (-div * time).exp() - strike * (-rate * time).exp();
        assert!((call - put - parity).abs() < 1e-10);
    }

    #[test]
    fn test_invalid_inputs() {
        for (spot, strike, time, vol) in [
            (0.0, 100.0, 1.0, 0.2),
            (100.0, -1.0, 1.0, 0.2),
            (100.0, 100.0, 0.0, 0.2),
            (100.0, 100.0, 1.0, 0.0),
            (f64::NAN, 100.0, 1.0, 0.2),
        ] {
            let res = price(spot, strike, time, vol, 0.05, 0.0, OptionType::Call);
            assert!(matches!(res, Err(VolError::InvalidParameter(_))));
        }
        assert!(greeks(100.0, 100.0, -1.0, 0.2, 0.05, 0.0, OptionType::Put).is_err());
    }

    #[test]
    fn test_greeks() {
        let g = greeks(100.0, 100.0, 1.0, 0.20, 0.05, 0.0, OptionType::Call).unwrap();

        assert!(g.delta > 0.5 && g.delta < 0.7);
        assert!(g.gamma > 0.0);
        assert!(g.theta < 0.0);
        assert!(g.vega > 0.0);
        assert!(g.rho > 0.0);

        let p = greeks(100.0, 100.0, 1.0, 0.20, 0.05, 0.0, OptionType::Put).unwrap();
        assert!((g.delta - p.delta - 1.0).abs() < 1e-12);
        assert!((g.gamma - p.gamma).abs() < 1e-12);
        assert!((g.vega - p.vega).abs() < 1e-12);
    }

    #[test]
    fn test_vega_matches_finite_difference() {
        let (spot, strike, time, vol, rate, div) = (100.0, 110.0, 0.5, 0.25, 0.03, 0.01);
        let h = 1e-5;
        let up = price(spot, strike, time, vol + h, rate, div, OptionType::Call).unwrap();
        let down = price(spot, strike, time, vol - h, rate, div, OptionType::Call).unwrap();
        let fd = (up - down) / (2.0 * h);

        let g = greeks(spot, strike, time, vol, rate, div, OptionType::Call).unwrap();
        assert!((g.vega - fd).abs() < 1e-5);
        assert!((vega_unchecked(spot, strike, time, vol, rate, div) - g.vega).abs() < 1e-12);
    }

    #[test]
    fn test_price_increases_with_vol() {
        let mut last_call = 0.0;
        let mut last_put = 0.0;
        for i in 1..=40 {
            let vol = 0.05 * i as f64;
            let call = price(100.0, 120.0, 0.5, vol, 0.05, 0.0, OptionType::Call).unwrap();
            let put = price(100.0, 80.0, 0.5, vol, 0.05, 0.0, OptionType::Put).unwrap();
            assert!(call > last_call);
            assert!(put > last_put);
            last_call = call;
            last_put = put;
        }
    }

    #[test]
    fn test_price_is_deterministic() {
        let a = price(101.3, 97.5, 0.37, 0.31, 0.02, 0.01, OptionType::Put).unwrap();
        let b = price(101.3, 97.5, 0.37, 0.31, 0.02, 0.01, OptionType::Put).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
