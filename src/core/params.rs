//! Model parameter sets
//!
//! Every calibration produces one of these as a fresh value. Parameters are
//! validated before any pricing takes place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{VolError, VolResult};

/// Identifier for a smile model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    BlackScholes,
    Heston,
    Sabr,
    Merton,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::BlackScholes,
        ModelKind::Heston,
        ModelKind::Sabr,
        ModelKind::Merton,
    ];

    /// Stable name used as the key in comparison output
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::BlackScholes => "black_scholes",
            ModelKind::Heston => "heston",
            ModelKind::Sabr => "sabr",
            ModelKind::Merton => "merton",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = VolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "black_scholes" | "bs" => Ok(ModelKind::BlackScholes),
            "heston" => Ok(ModelKind::Heston),
            "sabr" => Ok(ModelKind::Sabr),
            "merton" => Ok(ModelKind::Merton),
            other => Err(VolError::invalid_parameter(format!("unknown model '{other}'"))),
        }
    }
}

/// Heston stochastic volatility parameters
///
/// dS = (r - q) S dt + √v S dW_S
/// dv = κ(θ - v) dt + σ_v √v dW_v,   d<W_S, W_v> = ρ dt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonParams {
    /// Initial variance
    pub v0: f64,
    /// Long-run variance
    pub theta: f64,
    /// Mean reversion speed
    pub kappa: f64,
    /// Volatility of variance
    pub sigma_v: f64,
    /// Spot/variance correlation
    pub rho: f64,
}

impl HestonParams {
    pub fn new(v0: f64, theta: f64, kappa: f64, sigma_v: f64, rho: f64) -> Self {
        Self {
            v0,
            theta,
            kappa,
            sigma_v,
            rho,
        }
    }

    /// Equity-index style starting point (20% vol, negative skew)
    pub fn typical_equity() -> Self {
        Self::new(0.04, 0.04, 2.0, 0.3, -0.7)
    }

    /// Feller condition 2κθ ≥ σ_v². Reported, never enforced.
    pub fn feller_satisfied(&self) -> bool {
        2.0 * self.kappa * self.theta >= self.sigma_v * self.sigma_v
    }

    pub fn validate(&self) -> VolResult<()> {
        if !(self.v0.is_finite() && self.v0 > 0.0) {
            return Err(VolError::model_domain("heston v0 must be positive"));
        }
        if !(self.theta.is_finite() && self.theta > 0.0) {
            return Err(VolError::model_domain("heston theta must be positive"));
        }
        if !(self.kappa.is_finite() && self.kappa > 0.0) {
            return Err(VolError::model_domain("heston kappa must be positive"));
        }
        if !(self.sigma_v.is_finite() && self.sigma_v > 0.0) {
            return Err(VolError::model_domain("heston sigma_v must be positive"));
        }
        if !(self.rho.is_finite() && self.rho.abs() <= 1.0) {
            return Err(VolError::model_domain("heston rho must be in [-1, 1]"));
        }
        Ok(())
    }
}

impl Default for HestonParams {
    fn default() -> Self {
        Self::typical_equity()
    }
}

/// SABR parameters (Hagan et al. 2002)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrParams {
    pub alpha: f64,
    pub beta: f64,
    pub rho: f64,
    pub nu: f64,
}

impl SabrParams {
    pub fn new(alpha: f64, beta: f64, rho: f64, nu: f64) -> Self {
        Self {
            alpha,
            beta,
            rho,
            nu,
        }
    }

    pub fn validate(&self) -> VolResult<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(VolError::model_domain(format!(
                "sabr alpha must be positive, got {}",
                self.alpha
            )));
        }
        if !(self.beta.is_finite() && (0.0..=1.0).contains(&self.beta)) {
            return Err(VolError::model_domain(format!(
                "sabr beta must be in [0, 1], got {}",
                self.beta
            )));
        }
        if !(self.rho.is_finite() && self.rho.abs() <= 1.0) {
            return Err(VolError::model_domain(format!(
                "sabr rho must be in [-1, 1], got {}",
                self.rho
            )));
        }
        if !(self.nu.is_finite() && self.nu >= 0.0) {
            return Err(VolError::model_domain(format!(
                "sabr nu must be non-negative, got {}",
                self.nu
            )));
        }
        Ok(())
    }
}

impl Default for SabrParams {
    fn default() -> Self {
        Self::new(0.2, 0.7, -0.3, 0.4)
    }
}

/// Merton jump-diffusion parameters. Jumps are lognormal: ln(1 + J) ~ N(mu_j, sigma_j²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MertonParams {
    /// Diffusion volatility
    pub sigma: f64,
    /// Jump intensity per year
    pub lambda: f64,
    /// Mean of the log jump size
    pub mu_j: f64,
    /// Std dev of the log jump size
    pub sigma_j: f64,
}

impl MertonParams {
    pub fn new(sigma: f64, lambda: f64, mu_j: f64, sigma_j: f64) -> Self {
        Self {
            sigma,
            lambda,
            mu_j,
            sigma_j,
        }
    }

    /// Mean relative jump size k = E[J] = exp(mu_j + sigma_j²/2) - 1
    pub fn mean_jump(&self) -> f64 {
        (self.mu_j + 0.5 * self.sigma_j * self.sigma_j).exp() - 1.0
    }

    pub fn validate(&self) -> VolResult<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(VolError::model_domain("merton sigma must be positive"));
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(VolError::model_domain("merton lambda must be non-negative"));
        }
        if !self.mu_j.is_finite() {
            return Err(VolError::model_domain("merton mu_j must be finite"));
        }
        if !(self.sigma_j.is_finite() && self.sigma_j >= 0.0) {
            return Err(VolError::model_domain("merton sigma_j must be non-negative"));
        }
        Ok(())
    }
}

impl Default for MertonParams {
    fn default() -> Self {
        Self::new(0.2, 0.1, -0.05, 0.15)
    }
}

/// Calibrated or user-supplied parameters for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParameters {
    BlackScholes { sigma: f64 },
    Heston(HestonParams),
    Sabr(SabrParams),
    Merton(MertonParams),
}

impl ModelParameters {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParameters::BlackScholes { .. } => ModelKind::BlackScholes,
            ModelParameters::Heston(_) => ModelKind::Heston,
            ModelParameters::Sabr(_) => ModelKind::Sabr,
            ModelParameters::Merton(_) => ModelKind::Merton,
        }
    }

    /// Documented defaults for a model
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::BlackScholes => ModelParameters::BlackScholes { sigma: 0.2 },
            ModelKind::Heston => ModelParameters::Heston(HestonParams::default()),
            ModelKind::Sabr => ModelParameters::Sabr(SabrParams::default()),
            ModelKind::Merton => ModelParameters::Merton(MertonParams::default()),
        }
    }

    pub fn validate(&self) -> VolResult<()> {
        match self {
            ModelParameters::BlackScholes { sigma } => {
                if sigma.is_finite() && *sigma > 0.0 {
                    Ok(())
                } else {
                    Err(VolError::model_domain("black-scholes sigma must be positive"))
                }
            }
            ModelParameters::Heston(p) => p.validate(),
            ModelParameters::Sabr(p) => p.validate(),
            ModelParameters::Merton(p) => p.validate(),
        }
    }

    /// Feller check for Heston, `None` for the other models
    pub fn feller_satisfied(&self) -> Option<bool> {
        match self {
            ModelParameters::Heston(p) => Some(p.feller_satisfied()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feller_condition() {
        let params = HestonParams::typical_equity();
        // 2 * 2.0 * 0.04 = 0.16 >= 0.3² = 0.09
        assert!(params.feller_satisfied());

        let params = HestonParams::new(0.04, 0.04, 1.0, 0.5, -0.7);
        // 0.08 < 0.25
        assert!(!params.feller_satisfied());
        // still a valid parameter set
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_sabr_domain() {
        assert!(SabrParams::new(0.2, 1.2, 0.0, 0.3).validate().is_err());
        assert!(SabrParams::new(0.2, 0.5, -1.5, 0.3).validate().is_err());
        assert!(SabrParams::new(0.0, 0.5, 0.0, 0.3).validate().is_err());
        assert!(SabrParams::new(0.2, 0.5, 0.0, -0.1).validate().is_err());
        assert!(SabrParams::new(0.2, 0.5, 1.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_model_kind_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("garch".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_parameters_serde_tag() {
        let params = ModelParameters::Sabr(SabrParams::new(0.2, 1.0, -0.3, 0.4));
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"model\":\"sabr\""));

        let back: ModelParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.kind(), ModelKind::Sabr);
    }

    #[test]
    fn test_merton_mean_jump() {
        let p = MertonParams::new(0.2, 0.0, 0.0, 0.0);
        assert_eq!(p.mean_jump(), 0.0);
        let p = MertonParams::default();
        assert!(p.mean_jump() < 0.0);
    }
}
