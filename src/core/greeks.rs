//! Option Greeks
//!
//! First and second order sensitivities, as raw partial derivatives.

use serde::{Deserialize, Serialize};

/// Option Greeks (sensitivities)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta: dV/dS
    pub delta: f64,
    /// Gamma: d²V/dS²
    pub gamma: f64,
    /// Vega: dV/dσ (per unit of volatility)
    pub vega: f64,
    /// Theta: dV/dt (per year, calendar decay)
    pub theta: f64,
    /// Rho: dV/dr (per unit of rate)
    pub rho: f64,
    /// Vanna: d²V/dSdσ
    pub vanna: Option<f64>,
    /// Volga/Vomma: d²V/dσ²
    pub volga: Option<f64>,
}

impl Greeks {
    pub fn new(delta: f64, gamma: f64, vega: f64, theta: f64, rho: f64) -> Self {
        Self {
            delta,
            gamma,
            vega,
            theta,
            rho,
            vanna: None,
            volga: None,
        }
    }

    /// Vega per 1% volatility move
    pub fn vega_pct(&self) -> f64 {
        self.vega / 100.0
    }

    /// Theta per calendar day
    pub fn theta_per_day(&self) -> f64 {
        self.theta / 365.0
    }
}
