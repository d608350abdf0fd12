//! Option quote data
//!
//! One immutable quote per contract, as supplied by the data collaborator.

use serde::{Deserialize, Serialize};

use super::option::OptionType;

/// Option market quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Strike price
    pub strike: f64,
    /// Call or put
    pub option_type: OptionType,
    /// Quoted option price
    #[serde(default)]
    pub market_price: Option<f64>,
    /// Implied volatility, if the provider already supplies one
    #[serde(default)]
    pub market_iv: Option<f64>,
    /// Bid price
    #[serde(default)]
    pub bid: Option<f64>,
    /// Ask price
    #[serde(default)]
    pub ask: Option<f64>,
    /// Trading volume
    #[serde(default)]
    pub volume: Option<u64>,
    /// Open interest
    #[serde(default)]
    pub open_interest: Option<u64>,
}

impl OptionQuote {
    /// Create an empty quote for a contract
    pub fn new(strike: f64, option_type: OptionType) -> Self {
        Self {
            strike,
            option_type,
            market_price: None,
            market_iv: None,
            bid: None,
            ask: None,
            volume: None,
            open_interest: None,
        }
    }

    pub fn call(strike: f64) -> Self {
        Self::new(strike, OptionType::Call)
    }

    pub fn put(strike: f64) -> Self {
        Self::new(strike, OptionType::Put)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.market_price = Some(price);
        self
    }

    pub fn with_iv(mut self, iv: f64) -> Self {
        self.market_iv = Some(iv);
        self
    }

    pub fn with_bid_ask(mut self, bid: f64, ask: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    /// Mid price from bid/ask
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b >= 0.0 && a >= b => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Best available price (quoted price > mid)
    pub fn best_price(&self) -> Option<f64> {
        self.market_price.or_else(|| self.mid())
    }

    /// Bid-ask spread
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Relative spread (spread / mid)
    pub fn relative_spread(&self) -> Option<f64> {
        match (self.spread(), self.mid()) {
            (Some(s), Some(m)) if m > 0.0 => Some(s / m),
            _ => None,
        }
    }
}
