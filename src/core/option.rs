//! Option type and market context
//!
//! The market context is shared read-only by every computation for one expiry.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ensure_finite, ensure_positive, VolResult};

/// Option type (Call or Put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Payoff direction: +1 for call, -1 for put
    pub fn phi(&self) -> f64 {
        match self {
            OptionType::Call => 1.0,
            OptionType::Put => -1.0,
        }
    }

    /// Intrinsic value at given spot (or forward)
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }

    /// Out-of-the-money side relative to a forward
    pub fn otm_for(strike: f64, forward: f64) -> Self {
        if strike >= forward {
            OptionType::Call
        } else {
            OptionType::Put
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Spot, maturity and carry for a single expiration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Underlying spot price
    pub spot_price: f64,
    /// Time to expiry in years
    pub time_to_expiry: f64,
    /// Continuously compounded risk-free rate
    pub risk_free_rate: f64,
    /// Continuous dividend yield
    pub dividend_yield: f64,
}

impl MarketContext {
    pub fn new(spot_price: f64, time_to_expiry: f64, risk_free_rate: f64, dividend_yield: f64) -> Self {
        Self {
            spot_price,
            time_to_expiry,
            risk_free_rate,
            dividend_yield,
        }
    }

    pub fn validate(&self) -> VolResult<()> {
        ensure_positive(self.spot_price, "spot_price")?;
        ensure_positive(self.time_to_expiry, "time_to_expiry")?;
        ensure_finite(self.risk_free_rate, "risk_free_rate")?;
        ensure_finite(self.dividend_yield, "dividend_yield")?;
        Ok(())
    }

    /// Forward price F = S * exp((r - q) * T)
    pub fn forward(&self) -> f64 {
        self.spot_price * ((self.risk_free_rate - self.dividend_yield) * self.time_to_expiry).exp()
    }

    /// Discount factor exp(-r * T)
    pub fn discount_factor(&self) -> f64 {
        (-self.risk_free_rate * self.time_to_expiry).exp()
    }

    /// Simple moneyness K / S
    pub fn moneyness(&self, strike: f64) -> f64 {
        strike / self.spot_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_type() {
        assert_eq!(OptionType::Call.phi(), 1.0);
        assert_eq!(OptionType::Put.phi(), -1.0);

        assert_eq!(OptionType::Call.intrinsic(110.0, 100.0), 10.0);
        assert_eq!(OptionType::Put.intrinsic(90.0, 100.0), 10.0);
        assert_eq!(OptionType::Call.intrinsic(90.0, 100.0), 0.0);

        assert_eq!(OptionType::otm_for(105.0, 100.0), OptionType::Call);
        assert_eq!(OptionType::otm_for(95.0, 100.0), OptionType::Put);
    }

    #[test]
    fn test_context_forward() {
        let ctx = MarketContext::new(100.0, 0.5, 0.05, 0.01);
        let expected = 100.0 * (0.04_f64 * 0.5).exp();
        assert!((ctx.forward() - expected).abs() < 1e-12);
        assert!((ctx.moneyness(110.0) - 1.1).abs() < 1e-12);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_context_rejects_bad_expiry() {
        let ctx = MarketContext::new(100.0, 0.0, 0.05, 0.0);
        assert!(ctx.validate().is_err());

        let ctx = MarketContext::new(-1.0, 1.0, 0.05, 0.0);
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_option_type_serde() {
        let json = serde_json::to_string(&OptionType::Put).unwrap();
        assert_eq!(json, "\"put\"");
    }
}
