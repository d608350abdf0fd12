//! Multi-model smile comparison
//!
//! Calibrates each requested model to the same market smile and lines the
//! model vols up against the market strike by strike. Models are calibrated
//! on the rayon pool; nothing is shared between them but read-only inputs.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::quotes::invert_quotes;
use crate::calibration::Calibrator;
use crate::config::EngineConfig;
use crate::core::{
    MarketContext, ModelKind, ModelOutcome, OptionQuote, SmileComparisonPoint, VolSmileComparison, VolResult,
};

/// All quotes of one expiry together with its market context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryQuotes {
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    pub context: MarketContext,
    pub quotes: Vec<OptionQuote>,
}

/// Compare `models` against the market smile of one expiry.
///
/// Fails only on invalid context or configuration. Quotes that cannot be
/// inverted end up in `rejected`; a model that cannot be calibrated is
/// reported as `ModelOutcome::Failed` and the other models still run.
pub fn compare_models(
    symbol: &str,
    expiration_date: Option<NaiveDate>,
    quotes: &[OptionQuote],
    ctx: &MarketContext,
    models: &[ModelKind],
    config: &EngineConfig,
) -> VolResult<VolSmileComparison> {
    config.validate()?;
    let inversion = invert_quotes(quotes, ctx, &config.solver)?;
    let points = &inversion.points;

    tracing::debug!(
        "{}: {} of {} quotes usable, calibrating {} models",
        symbol,
        points.len(),
        quotes.len(),
        models.len()
    );

    let calibrator = Calibrator::from_engine(config);
    let calibrations: Vec<ModelOutcome> = models
        .par_iter()
        .map(|&kind| match calibrator.calibrate(kind, points, ctx, None) {
            Ok(result) => ModelOutcome::Calibrated(result),
            Err(e) => {
                tracing::warn!("{}: {} calibration failed: {}", symbol, kind, e);
                ModelOutcome::Failed {
                    model: kind,
                    error: e.to_string(),
                }
            }
        })
        .collect();

    let data_points = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let calculated_ivs: BTreeMap<String, f64> = calibrations
                .iter()
                .filter_map(|outcome| {
                    let result = outcome.result()?;
                    let iv = result.residuals.get(i)?.model_iv?;
                    Some((result.model.name().to_string(), iv))
                })
                .collect();
            SmileComparisonPoint {
                strike: p.strike,
                moneyness: p.moneyness,
                market_iv: p.market_iv,
                calculated_ivs,
            }
        })
        .collect();

    Ok(VolSmileComparison {
        symbol: symbol.to_string(),
        expiration_date,
        time_to_expiry: ctx.time_to_expiry,
        spot_price: ctx.spot_price,
        risk_free_rate: ctx.risk_free_rate,
        dividend_yield: ctx.dividend_yield,
        models_used: models.to_vec(),
        data_points,
        calibrations,
        rejected: inversion.rejected,
    })
}

/// One comparison per expiry, expiries processed in parallel.
/// Results keep the input order; one bad expiry does not affect the others.
pub fn compare_expiries(
    symbol: &str,
    expiries: &[ExpiryQuotes],
    models: &[ModelKind],
    config: &EngineConfig,
) -> Vec<VolResult<VolSmileComparison>> {
    expiries
        .par_iter()
        .map(|e| compare_models(symbol, e.expiration_date, &e.quotes, &e.context, models, config))
        .collect()
}
