//! Implied volatility solver
//!
//! Safeguarded Newton-Raphson on vega, falling back to bisection when Newton
//! is no longer trustworthy. Every evaluation tightens a bracket around the
//! root, so the bisection phase starts from everything Newton learned.

use serde::{Deserialize, Serialize};

use super::black_scholes::{price_unchecked, vega_unchecked};
use crate::config::SolverConfig;
use crate::core::{ensure_finite, ensure_positive, MarketContext, OptionType, VolError, VolResult};

/// Price tolerance never exceeds this fraction of the option's time value
pub const RELATIVE_PRICE_TOLERANCE: f64 = 1e-6;

/// Time value below this multiple of the price level is rounding noise
const TIME_VALUE_RESOLUTION: f64 = 64.0 * f64::EPSILON;

/// Which phase produced the final vol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMethod {
    Newton,
    Bisection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvSolution {
    pub vol: f64,
    pub iterations: usize,
    pub method: SolveMethod,
}

/// No-arbitrage price band (lower, upper) for a European option.
///
/// Call: [df·max(F-K, 0), S·e^{-qT}], put: [df·max(K-F, 0), K·e^{-rT}].
pub fn price_bounds(
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    div: f64,
    option_type: OptionType,
) -> (f64, f64) {
    let df = (-rate * time).exp();
    let forward = spot * ((rate - div) * time).exp();
    let lower = df * option_type.intrinsic(forward, strike);
    let upper = match option_type {
        OptionType::Call => spot * (-div * time).exp(),
        OptionType::Put => strike * df,
    };
    (lower, upper)
}

/// Newton candidate is usable only with a meaningful vega and strictly
/// inside the current bracket.
pub fn newton_step_accepted(candidate: f64, vega: f64, lo: f64, hi: f64, vega_floor: f64) -> bool {
    vega.is_finite() && vega > vega_floor && candidate.is_finite() && candidate > lo && candidate < hi
}

/// Implied volatility solver
#[derive(Debug, Clone, Default)]
pub struct ImpliedVolSolver {
    config: SolverConfig,
}

impl ImpliedVolSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve for the Black-Scholes vol reproducing `market_price`
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        market_price: f64,
        spot: f64,
        strike: f64,
        time: f64,
        rate: f64,
        div: f64,
        option_type: OptionType,
    ) -> VolResult<IvSolution> {
        ensure_positive(spot, "spot")?;
        ensure_positive(strike, "strike")?;
        ensure_positive(time, "time_to_expiry")?;
        ensure_finite(rate, "rate")?;
        ensure_finite(div, "dividend_yield")?;
        if !market_price.is_finite() || market_price < 0.0 {
            return Err(VolError::invalid_parameter(format!(
                "market price must be finite and non-negative, got {market_price}"
            )));
        }

        let (lower, upper) = price_bounds(spot, strike, time, rate, div, option_type);
        if market_price < lower {
            return Err(VolError::arbitrage(format!(
                "{option_type} price {market_price:.6} below intrinsic {lower:.6} at strike {strike}"
            )));
        }
        if market_price > upper {
            return Err(VolError::arbitrage(format!(
                "{option_type} price {market_price:.6} above upper bound {upper:.6} at strike {strike}"
            )));
        }

        // Only the time value carries vol information. A price sitting on the
        // lower bound, or above it by rounding noise only, identifies no vol.
        let time_value = market_price - lower;
        if time_value <= TIME_VALUE_RESOLUTION * market_price.max(lower) || time_value <= 0.0 {
            return Err(VolError::no_root(format!(
                "{option_type} price {market_price:.3e} at strike {strike} has no time value to invert"
            )));
        }

        let cfg = &self.config;
        // Absolute tolerance, capped at a fixed fraction of the time value for
        // cheap options.
        let tolerance = cfg.tolerance.min(RELATIVE_PRICE_TOLERANCE * time_value);
        let objective = |vol: f64| price_unchecked(spot, strike, time, vol, rate, div, option_type) - market_price;

        let mut lo = cfg.vol_lower;
        let mut hi = cfg.vol_upper;
        let f_lo = objective(lo);
        let f_hi = objective(hi);
        if f_lo.abs() < tolerance {
            return Ok(IvSolution { vol: lo, iterations: 0, method: SolveMethod::Bisection });
        }
        if f_hi.abs() < tolerance {
            return Ok(IvSolution { vol: hi, iterations: 0, method: SolveMethod::Bisection });
        }
        if f_lo > 0.0 || f_hi < 0.0 {
            return Err(VolError::no_root(format!(
                "price {market_price:.6} not attainable for vol in [{lo}, {hi}] at strike {strike}"
            )));
        }

        let mut iterations = 0;
        let mut vol = self
            .initial_guess(market_price, spot, strike, time, rate, div)
            .clamp(lo, hi);
        if vol <= lo || vol >= hi {
            vol = 0.5 * (lo + hi);
        }

        let newton_cap = cfg.max_newton_iterations.min(cfg.max_iterations);
        while iterations < newton_cap {
            iterations += 1;
            let diff = objective(vol);
            if diff.abs() < tolerance {
                return Ok(IvSolution { vol, iterations, method: SolveMethod::Newton });
            }
            if diff > 0.0 {
                hi = vol;
            } else {
                lo = vol;
            }

            let vega = vega_unchecked(spot, strike, time, vol, rate, div);
            let candidate = vol - diff / vega;
            if !newton_step_accepted(candidate, vega, lo, hi, cfg.vega_floor) {
                break;
            }
            if (candidate - vol).abs() < cfg.vol_tolerance {
                return Ok(IvSolution { vol: candidate, iterations, method: SolveMethod::Newton });
            }
            vol = candidate;
        }

        while iterations < cfg.max_iterations {
            iterations += 1;
            let mid = 0.5 * (lo + hi);
            let diff = objective(mid);
            if diff.abs() < tolerance || hi - lo < cfg.vol_tolerance {
                return Ok(IvSolution { vol: mid, iterations, method: SolveMethod::Bisection });
            }
            if diff > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        Err(VolError::convergence(
            format!("implied vol for strike {strike} not found"),
            iterations,
            Some(0.5 * (lo + hi)),
        ))
    }

    /// Inflection-point seed sqrt(2|ln(F/K)|/T) away from the money,
    /// Brenner-Subrahmanyam at the money.
    fn initial_guess(&self, market_price: f64, spot: f64, strike: f64, time: f64, rate: f64, div: f64) -> f64 {
        if let Some(vol) = self.config.initial_vol {
            return vol;
        }
        let forward = spot * ((rate - div) * time).exp();
        let log_moneyness = (forward / strike).ln().abs();
        if log_moneyness > 1e-8 {
            (2.0 * log_moneyness / time).sqrt()
        } else {
            let df = (-rate * time).exp();
            market_price / (0.4 * df * forward * time.sqrt())
        }
    }
}

/// Black-Scholes vol of a model price for the option at `strike`.
///
/// A model price that carries no time value has no vol, which is a property
/// of the model at that strike rather than a bad quote.
pub(crate) fn invert_model_price(
    solver: &ImpliedVolSolver,
    price: f64,
    ctx: &MarketContext,
    strike: f64,
    option_type: OptionType,
) -> VolResult<f64> {
    solver
        .solve(
            price,
            ctx.spot_price,
            strike,
            ctx.time_to_expiry,
            ctx.risk_free_rate,
            ctx.dividend_yield,
            option_type,
        )
        .map(|s| s.vol)
        .map_err(|err| match err {
            VolError::NoRoot(msg) => VolError::model_domain(format!("model price not invertible: {msg}")),
            other => other,
        })
}

/// Implied volatility with default solver settings
pub fn implied_vol(
    market_price: f64,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    div: f64,
    option_type: OptionType,
) -> VolResult<f64> {
    ImpliedVolSolver::default()
        .solve(market_price, spot, strike, time, rate, div, option_type)
        .map(|s| s.vol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::price;

    #[test]
    fn test_reference_round_trip() {
        let market = price(100.0, 105.0, 1.0, 0.2, 0.05, 0.0, OptionType::Call).unwrap();
        let iv = implied_vol(market, 100.0, 105.0, 1.0, 0.05, 0.0, OptionType::Call).unwrap();
        assert!((iv - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_otm_put_round_trip() {
        let market = price(100.0, 90.0, 0.25, 0.30, 0.05, 0.01, OptionType::Put).unwrap();
        let iv = implied_vol(market, 100.0, 90.0, 0.25, 0.05, 0.01, OptionType::Put).unwrap();
        assert!((iv - 0.30).abs() < 1e-4);
    }

    #[test]
    fn test_below_intrinsic_is_arbitrage() {
        // deep ITM call worth at least ~df*(F-K) ≈ 21.9
        let res = implied_vol(15.0, 100.0, 80.0, 0.5, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::ArbitrageViolation(_))));
    }

    #[test]
    fn test_above_upper_bound_is_arbitrage() {
        let res = implied_vol(120.0, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::ArbitrageViolation(_))));
        let res = implied_vol(99.0, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Put);
        assert!(matches!(res, Err(VolError::ArbitrageViolation(_))));
    }

    #[test]
    fn test_price_outside_bracket_has_no_root() {
        // Upper bound is ~100 but a 500% vol only reaches ~98.8
        let res = implied_vol(99.9, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::NoRoot(_))));
    }

    #[test]
    fn test_newton_step_guard() {
        assert!(newton_step_accepted(0.3, 10.0, 0.1, 0.5, 1e-10));
        assert!(!newton_step_accepted(0.6, 10.0, 0.1, 0.5, 1e-10));
        assert!(!newton_step_accepted(0.1, 10.0, 0.1, 0.5, 1e-10));
        assert!(!newton_step_accepted(0.3, 1e-12, 0.1, 0.5, 1e-10));
        assert!(!newton_step_accepted(f64::NAN, 10.0, 0.1, 0.5, 1e-10));
    }

    #[test]
    fn test_newton_path_for_regular_quote() {
        let market = price(100.0, 100.0, 1.0, 0.2, 0.05, 0.0, OptionType::Call).unwrap();
        let sol = ImpliedVolSolver::default()
            .solve(market, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call)
            .unwrap();
        assert_eq!(sol.method, SolveMethod::Newton);
        assert!(sol.iterations < 10);
        assert!((sol.vol - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_switches_to_bisection_on_diverging_newton() {
        // From 490% vol the Newton step overshoots below zero
        let solver = ImpliedVolSolver::new(SolverConfig {
            initial_vol: Some(4.9),
            ..Default::default()
        });
        let market = price(100.0, 100.0, 1.0, 0.2, 0.05, 0.0, OptionType::Call).unwrap();
        let sol = solver
            .solve(market, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call)
            .unwrap();
        assert_eq!(sol.method, SolveMethod::Bisection);
        assert!((sol.vol - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_iteration_cap_reports_best_estimate() {
        let solver = ImpliedVolSolver::new(SolverConfig {
            initial_vol: Some(4.9),
            max_newton_iterations: 1,
            max_iterations: 2,
            ..Default::default()
        });
        let market = price(100.0, 100.0, 1.0, 0.2, 0.05, 0.0, OptionType::Call).unwrap();
        match solver.solve(market, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call) {
            Err(VolError::ConvergenceFailure {
                iterations,
                best_estimate,
                ..
            }) => {
                assert_eq!(iterations, 2);
                let estimate = best_estimate.unwrap();
                assert!(estimate.is_finite() && estimate > 0.0);
            }
            other => panic!("expected convergence failure, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let res = implied_vol(5.0, 100.0, 100.0, 0.0, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::InvalidParameter(_))));
        let res = implied_vol(f64::NAN, 100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::InvalidParameter(_))));
    }

    #[test]
    fn test_zero_time_value_has_no_root() {
        let res = implied_vol(0.0, 100.0, 130.0, 1.0 / 52.0, 0.03, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::NoRoot(_))));
        // ITM call priced exactly at its discounted intrinsic value
        let (lower, _) = price_bounds(100.0, 80.0, 0.5, 0.05, 0.0, OptionType::Call);
        let res = implied_vol(lower, 100.0, 80.0, 0.5, 0.05, 0.0, OptionType::Call);
        assert!(matches!(res, Err(VolError::NoRoot(_))));
    }

    #[test]
    fn test_price_below_tolerance_is_not_the_bracket_floor() {
        // ~1.6e-12, far below the 1e-6 absolute tolerance
        let market = price(100.0, 160.0, 0.05, 0.30, 0.0, 0.0, OptionType::Call).unwrap();
        assert!(market > 0.0 && market < 1e-10);
        let sol = ImpliedVolSolver::default()
            .solve(market, 100.0, 160.0, 0.05, 0.0, 0.0, OptionType::Call)
            .unwrap();
        assert!(sol.vol > 2.0 * SolverConfig::default().vol_lower);
        assert!((sol.vol - 0.30).abs() < 1e-4, "{}", sol.vol);
    }

    #[test]
    fn test_cheap_wing_prices_keep_their_ordering() {
        // Cheaper OTM calls at the same strike must map to lower vols
        let vols = [0.15, 0.2, 0.25];
        let ivs: Vec<f64> = vols
            .iter()
            .map(|&v| {
                let market = price(100.0, 130.0, 1.0 / 52.0, v, 0.0, 0.0, OptionType::Call).unwrap();
                implied_vol(market, 100.0, 130.0, 1.0 / 52.0, 0.0, 0.0, OptionType::Call).unwrap()
            })
            .collect();
        for (iv, v) in ivs.iter().zip(vols) {
            assert!((iv - v).abs() < 1e-4, "{iv} vs {v}");
        }
    }

    #[test]
    fn test_deep_wings_recover_vol() {
        for (strike, option_type) in [(60.0, OptionType::Put), (160.0, OptionType::Call)] {
            let market = price(100.0, strike, 1.0, 0.35, 0.02, 0.0, option_type).unwrap();
            let iv = implied_vol(market, 100.0, strike, 1.0, 0.02, 0.0, option_type).unwrap();
            assert!((iv - 0.35).abs() < 1e-4, "strike {strike}: {iv}");
        }
    }
}
