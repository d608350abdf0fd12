//! Engine configuration
//!
//! Every tunable of the solver, the model pricers, the calibrators and the
//! surface grid, with documented defaults. Callers override any subset; a
//! JSON document only needs the fields it changes.

use serde::{Deserialize, Serialize};

use crate::core::{
    HestonParams, MertonParams, ModelKind, ModelParameters, SabrParams, VolError, VolResult,
};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub solver: SolverConfig,
    pub pricing: PricingConfig,
    pub calibration: CalibrationConfig,
    pub surface: SurfaceGridConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> VolResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| VolError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VolResult<()> {
        self.solver.validate()?;
        self.pricing.validate()?;
        self.calibration.validate()?;
        self.surface.validate()
    }

    /// Cheaper settings for interactive use and tests
    pub fn fast() -> Self {
        Self {
            calibration: CalibrationConfig::fast(),
            ..Default::default()
        }
    }
}

/// Implied volatility solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Absolute price tolerance |model - market|
    /// Default: 1e-6
    pub tolerance: f64,
    /// Stop once the bracket or Newton step is narrower than this
    /// Default: 1e-12
    pub vol_tolerance: f64,
    /// Default: 50
    pub max_newton_iterations: usize,
    /// Newton and bisection combined
    /// Default: 100
    pub max_iterations: usize,
    /// Default: 1e-4
    pub vol_lower: f64,
    /// Default: 5.0
    pub vol_upper: f64,
    /// Newton is abandoned below this vega
    /// Default: 1e-10
    pub vega_floor: f64,
    /// Overrides the analytic seed
    pub initial_vol: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            vol_tolerance: 1e-12,
            max_newton_iterations: 50,
            max_iterations: 100,
            vol_lower: 1e-4,
            vol_upper: 5.0,
            vega_floor: 1e-10,
            initial_vol: None,
        }
    }
}

impl SolverConfig {
    /// Tight price tolerance, used when turning model prices into vols
    pub fn precise() -> Self {
        Self {
            tolerance: 1e-10,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> VolResult<()> {
        if !(self.tolerance > 0.0 && self.vol_tolerance > 0.0) {
            return Err(VolError::invalid_parameter("solver tolerances must be positive"));
        }
        if !(self.vol_lower > 0.0 && self.vol_upper > self.vol_lower && self.vol_upper.is_finite()) {
            return Err(VolError::invalid_parameter(format!(
                "invalid volatility bracket [{}, {}]",
                self.vol_lower, self.vol_upper
            )));
        }
        if self.max_iterations == 0 {
            return Err(VolError::invalid_parameter("max_iterations must be at least 1"));
        }
        if let Some(v) = self.initial_vol {
            if !(v.is_finite() && v > 0.0) {
                return Err(VolError::invalid_parameter("initial_vol must be positive"));
            }
        }
        Ok(())
    }
}

/// Numerical settings of the semi-closed-form pricers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub heston: HestonQuadratureConfig,
    pub merton: MertonSeriesConfig,
    /// Used to turn model prices into implied vols
    pub solver: SolverConfig,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            heston: HestonQuadratureConfig::default(),
            merton: MertonSeriesConfig::default(),
            solver: SolverConfig::precise(),
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> VolResult<()> {
        self.heston.validate()?;
        self.merton.validate()?;
        self.solver.validate()
    }
}

/// Gauss-Legendre integration of the Heston pricing integral.
///
/// The integral is cut at u_max = clamp(sqrt(60 / (v_min T)), min_cutoff,
/// max_cutoff) with v_min = min(v0, theta). [0, inner_limit] is split into
/// `inner_panels` panels and [inner_limit, u_max] into `outer_panels`.
/// Out-of-the-money prices below `price_floor`·df·F are within the
/// quadrature error and are not inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HestonQuadratureConfig {
    /// Default: 10.0
    pub inner_limit: f64,
    /// Default: 20
    pub inner_panels: usize,
    /// Default: 64
    pub outer_panels: usize,
    /// Default: 100.0
    pub min_cutoff: f64,
    /// Default: 1000.0
    pub max_cutoff: f64,
    /// Default: 1e-8
    pub price_floor: f64,
}

impl Default for HestonQuadratureConfig {
    fn default() -> Self {
        Self {
            inner_limit: 10.0,
            inner_panels: 20,
            outer_panels: 64,
            min_cutoff: 100.0,
            max_cutoff: 1000.0,
            price_floor: 1e-8,
        }
    }
}

impl HestonQuadratureConfig {
    pub fn validate(&self) -> VolResult<()> {
        if self.inner_panels == 0 || self.outer_panels == 0 {
            return Err(VolError::invalid_parameter("quadrature needs at least one panel"));
        }
        if !(self.inner_limit > 0.0 && self.min_cutoff > self.inner_limit && self.max_cutoff >= self.min_cutoff) {
            return Err(VolError::invalid_parameter(
                "quadrature limits must satisfy 0 < inner_limit < min_cutoff <= max_cutoff",
            ));
        }
        if !(self.price_floor.is_finite() && self.price_floor >= 0.0) {
            return Err(VolError::invalid_parameter("price_floor must be finite and non-negative"));
        }
        Ok(())
    }
}

/// Truncation of the Merton Poisson series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MertonSeriesConfig {
    /// Stop when the remaining Poisson mass is below this
    /// Default: 1e-8
    pub tail_tolerance: f64,
    /// Default: 100
    pub max_terms: usize,
}

impl Default for MertonSeriesConfig {
    fn default() -> Self {
        Self {
            tail_tolerance: 1e-8,
            max_terms: 100,
        }
    }
}

impl MertonSeriesConfig {
    pub fn validate(&self) -> VolResult<()> {
        if !(self.tail_tolerance > 0.0) || self.max_terms == 0 {
            return Err(VolError::invalid_parameter("invalid merton series settings"));
        }
        Ok(())
    }
}

/// Per-model starting points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialGuesses {
    pub heston: HestonParams,
    pub sabr: SabrParams,
    pub merton: MertonParams,
    pub black_scholes_sigma: f64,
}

impl Default for InitialGuesses {
    fn default() -> Self {
        Self {
            heston: HestonParams::default(),
            sabr: SabrParams::default(),
            merton: MertonParams::default(),
            black_scholes_sigma: 0.2,
        }
    }
}

impl InitialGuesses {
    pub fn for_model(&self, kind: ModelKind) -> ModelParameters {
        match kind {
            ModelKind::BlackScholes => ModelParameters::BlackScholes {
                sigma: self.black_scholes_sigma,
            },
            ModelKind::Heston => ModelParameters::Heston(self.heston),
            ModelKind::Sabr => ModelParameters::Sabr(self.sabr),
            ModelKind::Merton => ModelParameters::Merton(self.merton),
        }
    }
}

/// Least-squares calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Relative SSE reduction on an accepted step below which we stop
    /// Default: 1e-8
    pub tolerance: f64,
    /// Default: 200
    pub max_iterations: usize,
    /// Residual assigned to a strike the model cannot price
    /// Default: 1.0
    pub failure_penalty: f64,
    /// `Some(beta)` fixes SABR beta, `None` calibrates it
    /// Default: Some(1.0)
    pub sabr_beta: Option<f64>,
    /// Seed the vol-level parameter from the at-the-money market vol
    /// Default: true
    pub seed_from_atm: bool,
    pub initial_guesses: InitialGuesses,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            failure_penalty: 1.0,
            sabr_beta: Some(1.0),
            seed_from_atm: true,
            initial_guesses: InitialGuesses::default(),
        }
    }
}

impl CalibrationConfig {
    /// Looser stopping rule and a lower cap
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 60,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> VolResult<()> {
        if !(self.tolerance > 0.0) || self.max_iterations == 0 {
            return Err(VolError::invalid_parameter(
                "calibration tolerance and max_iterations must be positive",
            ));
        }
        if !(self.failure_penalty > 0.0 && self.failure_penalty.is_finite()) {
            return Err(VolError::invalid_parameter("failure_penalty must be positive"));
        }
        if let Some(beta) = self.sabr_beta {
            if !(0.0..=1.0).contains(&beta) {
                return Err(VolError::invalid_parameter(format!(
                    "sabr_beta must be in [0, 1], got {beta}"
                )));
            }
        }
        Ok(())
    }
}

/// Regular moneyness axis for surface post-processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceGridConfig {
    /// Default: 0.7
    pub min_moneyness: f64,
    /// Default: 1.3
    pub max_moneyness: f64,
    /// Number of grid levels, endpoints included
    /// Default: 25
    pub steps: usize,
}

impl Default for SurfaceGridConfig {
    fn default() -> Self {
        Self {
            min_moneyness: 0.7,
            max_moneyness: 1.3,
            steps: 25,
        }
    }
}

impl SurfaceGridConfig {
    pub fn validate(&self) -> VolResult<()> {
        if !(self.min_moneyness > 0.0 && self.max_moneyness > self.min_moneyness) {
            return Err(VolError::invalid_parameter(format!(
                "invalid moneyness range [{}, {}]",
                self.min_moneyness, self.max_moneyness
            )));
        }
        if self.steps < 2 {
            return Err(VolError::invalid_parameter("grid needs at least 2 steps"));
        }
        Ok(())
    }

    pub fn levels(&self) -> Vec<f64> {
        let width = self.max_moneyness - self.min_moneyness;
        let last = (self.steps - 1) as f64;
        (0..self.steps)
            .map(|i| self.min_moneyness + width * i as f64 / last)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.solver.tolerance, 1e-6);
        assert_eq!(config.solver.max_newton_iterations, 50);
        assert_eq!(config.solver.max_iterations, 100);
        assert_eq!(config.calibration.tolerance, 1e-8);
        assert_eq!(config.calibration.max_iterations, 200);
        assert_eq!(config.calibration.sabr_beta, Some(1.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_override() {
        let config = EngineConfig::from_json(
            r#"{"solver": {"tolerance": 1e-8}, "calibration": {"max_iterations": 50, "sabr_beta": null}}"#,
        )
        .unwrap();
        assert_eq!(config.solver.tolerance, 1e-8);
        assert_eq!(config.solver.vol_upper, 5.0);
        assert_eq!(config.calibration.max_iterations, 50);
        assert_eq!(config.calibration.sabr_beta, None);
        assert_eq!(config.calibration.initial_guesses.heston.kappa, 2.0);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            EngineConfig::from_json("{not json"),
            Err(VolError::Serialization(_))
        ));
        assert!(EngineConfig::from_json(r#"{"surface": {"steps": 1}}"#).is_err());
    }

    #[test]
    fn test_grid_levels() {
        let levels = SurfaceGridConfig::default().levels();
        assert_eq!(levels.len(), 25);
        assert!((levels[0] - 0.7).abs() < 1e-12);
        assert!((levels[24] - 1.3).abs() < 1e-12);
        assert!((levels[12] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_initial_guess_lookup() {
        let guesses = InitialGuesses::default();
        assert_eq!(guesses.for_model(ModelKind::Sabr).kind(), ModelKind::Sabr);
        match guesses.for_model(ModelKind::Merton) {
            ModelParameters::Merton(p) => assert_eq!(p.lambda, 0.1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
