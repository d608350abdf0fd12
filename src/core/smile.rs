//! Smile-level results
//!
//! Market implied vols extracted from quotes, calibration outcomes and the
//! per-expiry model comparison handed back to callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::option::{MarketContext, OptionType};
use super::params::{ModelKind, ModelParameters};

/// Where a market implied vol came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    /// Inverted from a quoted (or mid) price
    SolvedFromPrice,
    /// Taken as supplied by the data provider
    Quoted,
}

/// One market implied volatility observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedVolPoint {
    pub strike: f64,
    /// strike / spot
    pub moneyness: f64,
    pub market_iv: f64,
    pub option_type: OptionType,
    pub source: QuoteSource,
}

/// Why a quote was dropped from a smile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingPrice,
    InvalidInput,
    BelowIntrinsic,
    AboveUpperBound,
    NoRootInBracket,
    NoConvergence,
    DuplicateStrike,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::MissingPrice => "missing price",
            RejectReason::InvalidInput => "invalid input",
            RejectReason::BelowIntrinsic => "below intrinsic",
            RejectReason::AboveUpperBound => "above upper bound",
            RejectReason::NoRootInBracket => "no root in bracket",
            RejectReason::NoConvergence => "no convergence",
            RejectReason::DuplicateStrike => "duplicate strike",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedQuote {
    pub strike: f64,
    pub option_type: OptionType,
    pub reason: RejectReason,
    pub detail: String,
    /// Last bracket midpoint when the solver hit its iteration cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_estimate: Option<f64>,
}

/// Result of inverting a batch of quotes: retained points plus every drop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteInversion {
    /// Sorted by strike, one per strike
    pub points: Vec<ImpliedVolPoint>,
    pub rejected: Vec<RejectedQuote>,
}

impl QuoteInversion {
    pub fn strikes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.strike).collect()
    }
}

/// Fit at a single strike
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointResidual {
    pub strike: f64,
    pub market_iv: f64,
    /// `None` when the model could not produce a vol at this strike
    pub model_iv: Option<f64>,
    /// model - market, or the penalty value when `model_iv` is `None`
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationWarning {
    /// Heston 2κθ < σ_v²
    FellerViolated,
    /// Named parameters finished on a bound
    BoundaryConstrained { parameters: Vec<String> },
    /// Strikes the final parameters could not price
    PointFailures { strikes: Vec<f64> },
}

/// Outcome of fitting one model to one smile. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub model: ModelKind,
    pub parameters: ModelParameters,
    pub residuals: Vec<PointResidual>,
    /// Sum of squared residuals
    pub sse: f64,
    pub rmse: f64,
    pub converged: bool,
    pub iterations: usize,
    pub boundary_constrained: bool,
    pub warnings: Vec<CalibrationWarning>,
}

impl CalibrationResult {
    /// Fitted vol at a calibration strike
    pub fn model_iv_at(&self, strike: f64) -> Option<f64> {
        self.residuals
            .iter()
            .find(|r| (r.strike - strike).abs() < 1e-9)
            .and_then(|r| r.model_iv)
    }

    pub fn max_abs_residual(&self) -> f64 {
        self.residuals
            .iter()
            .map(|r| r.residual.abs())
            .fold(0.0, f64::max)
    }
}

/// Per-model entry in a comparison; a failing model does not hide the others
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Calibrated(CalibrationResult),
    Failed { model: ModelKind, error: String },
}

impl ModelOutcome {
    pub fn model(&self) -> ModelKind {
        match self {
            ModelOutcome::Calibrated(result) => result.model,
            ModelOutcome::Failed { model, .. } => *model,
        }
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        match self {
            ModelOutcome::Calibrated(result) => Some(result),
            ModelOutcome::Failed { .. } => None,
        }
    }
}

/// One strike of a model comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmileComparisonPoint {
    pub strike: f64,
    pub moneyness: f64,
    pub market_iv: f64,
    /// Model name -> model implied vol; models that failed here are absent.
    /// Keys iterate alphabetically, not in request order: walk
    /// `VolSmileComparison::models_used` (or use
    /// [`VolSmileComparison::model_ivs`]) to present them in the caller's order.
    pub calculated_ivs: BTreeMap<String, f64>,
}

/// Market smile against every requested model for one expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolSmileComparison {
    pub symbol: String,
    pub expiration_date: Option<NaiveDate>,
    pub time_to_expiry: f64,
    pub spot_price: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    /// Caller order
    pub models_used: Vec<ModelKind>,
    /// Strike ascending
    pub data_points: Vec<SmileComparisonPoint>,
    /// Same order as `models_used`
    pub calibrations: Vec<ModelOutcome>,
    pub rejected: Vec<RejectedQuote>,
}

impl VolSmileComparison {
    pub fn context(&self) -> MarketContext {
        MarketContext::new(
            self.spot_price,
            self.time_to_expiry,
            self.risk_free_rate,
            self.dividend_yield,
        )
    }

    pub fn outcome(&self, model: ModelKind) -> Option<&ModelOutcome> {
        self.calibrations.iter().find(|o| o.model() == model)
    }

    pub fn result(&self, model: ModelKind) -> Option<&CalibrationResult> {
        self.outcome(model).and_then(ModelOutcome::result)
    }

    /// Model vols at one comparison point, in `models_used` order
    pub fn model_ivs(&self, point: &SmileComparisonPoint) -> Vec<(ModelKind, Option<f64>)> {
        self.models_used
            .iter()
            .map(|&kind| (kind, point.calculated_ivs.get(kind.name()).copied()))
            .collect()
    }

    /// Market smile as an assembler input
    pub fn market_smile(&self) -> ExpirySmile {
        ExpirySmile {
            expiration_date: self.expiration_date,
            time_to_expiry: self.time_to_expiry,
            spot_price: self.spot_price,
            points: self
                .data_points
                .iter()
                .map(|p| (p.strike, p.market_iv))
                .collect(),
        }
    }
}

/// Retained (strike, iv) pairs for a single expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirySmile {
    pub expiration_date: Option<NaiveDate>,
    pub time_to_expiry: f64,
    pub spot_price: f64,
    pub points: Vec<(f64, f64)>,
}

impl ExpirySmile {
    pub fn new(time_to_expiry: f64, spot_price: f64, points: Vec<(f64, f64)>) -> Self {
        Self {
            expiration_date: None,
            time_to_expiry,
            spot_price,
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> CalibrationResult {
        CalibrationResult {
            model: ModelKind::BlackScholes,
            parameters: ModelParameters::BlackScholes { sigma: 0.2 },
            residuals: vec![
                PointResidual {
                    strike: 95.0,
                    market_iv: 0.21,
                    model_iv: Some(0.2),
                    residual: -0.01,
                },
                PointResidual {
                    strike: 105.0,
                    market_iv: 0.19,
                    model_iv: Some(0.2),
                    residual: 0.01,
                },
            ],
            sse: 2e-4,
            rmse: 0.01,
            converged: true,
            iterations: 3,
            boundary_constrained: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_result_lookup() {
        let result = sample_result();
        assert_eq!(result.model_iv_at(95.0), Some(0.2));
        assert_eq!(result.model_iv_at(100.0), None);
        assert!((result.max_abs_residual() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let ok = ModelOutcome::Calibrated(sample_result());
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("\"status\":\"calibrated\""));

        let failed = ModelOutcome::Failed {
            model: ModelKind::Heston,
            error: "Model domain error".to_string(),
        };
        assert_eq!(failed.model(), ModelKind::Heston);
        assert!(failed.result().is_none());
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
    }

    #[test]
    fn test_model_ivs_follow_request_order() {
        let point = SmileComparisonPoint {
            strike: 100.0,
            moneyness: 1.0,
            market_iv: 0.2,
            calculated_ivs: BTreeMap::from([
                ("black_scholes".to_string(), 0.2),
                ("sabr".to_string(), 0.21),
            ]),
        };
        let comparison = VolSmileComparison {
            symbol: "SYN".to_string(),
            expiration_date: None,
            time_to_expiry: 0.5,
            spot_price: 100.0,
            risk_free_rate: 0.0,
            dividend_yield: 0.0,
            models_used: vec![ModelKind::Sabr, ModelKind::Heston, ModelKind::BlackScholes],
            data_points: vec![point.clone()],
            calibrations: Vec::new(),
            rejected: Vec::new(),
        };
        let keys: Vec<&str> = point.calculated_ivs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["black_scholes", "sabr"]);
        assert_eq!(
            comparison.model_ivs(&point),
            vec![
                (ModelKind::Sabr, Some(0.21)),
                (ModelKind::Heston, None),
                (ModelKind::BlackScholes, Some(0.2)),
            ]
        );
    }

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(RejectReason::BelowIntrinsic.to_string(), "below intrinsic");
        let json = serde_json::to_string(&RejectReason::NoRootInBracket).unwrap();
        assert_eq!(json, "\"no_root_in_bracket\"");
    }
}
