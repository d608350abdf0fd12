//! Quote inversion
//!
//! Quote -> market implied vol, one quote at a time, with the reason for
//! every quote that does not make it into the smile.

use crate::config::SolverConfig;
use crate::core::{
    ImpliedVolPoint, MarketContext, OptionQuote, OptionType, QuoteInversion, QuoteSource, RejectReason,
    RejectedQuote, VolError, VolResult,
};
use crate::models::{price_bounds, ImpliedVolSolver};

/// Invert every quote of one expiry.
///
/// A quoted price (or the bid/ask mid) is preferred over a provider IV.
/// Where a call and a put share a strike the out-of-the-money one is kept.
/// Only an invalid market context fails the whole batch.
pub fn invert_quotes(
    quotes: &[OptionQuote],
    ctx: &MarketContext,
    solver_config: &SolverConfig,
) -> VolResult<QuoteInversion> {
    ctx.validate()?;
    solver_config.validate()?;
    let solver = ImpliedVolSolver::new(solver_config.clone());

    let mut points = Vec::with_capacity(quotes.len());
    let mut rejected = Vec::new();

    for quote in quotes {
        match invert_one(quote, ctx, &solver) {
            Ok(point) => points.push(point),
            Err(rejection) => {
                tracing::warn!(
                    "Dropping {} quote at strike {}: {} ({})",
                    quote.option_type,
                    quote.strike,
                    rejection.reason,
                    rejection.detail
                );
                rejected.push(rejection);
            }
        }
    }

    let points = keep_out_of_the_money(points, ctx.forward(), &mut rejected);
    Ok(QuoteInversion { points, rejected })
}

fn reject(quote: &OptionQuote, reason: RejectReason, detail: String) -> RejectedQuote {
    RejectedQuote {
        strike: quote.strike,
        option_type: quote.option_type,
        reason,
        detail,
        best_estimate: None,
    }
}

fn invert_one(
    quote: &OptionQuote,
    ctx: &MarketContext,
    solver: &ImpliedVolSolver,
) -> Result<ImpliedVolPoint, RejectedQuote> {
    let strike = quote.strike;
    if !strike.is_finite() || strike <= 0.0 {
        return Err(reject(quote, RejectReason::InvalidInput, format!("strike {strike}")));
    }

    let point = |market_iv, source| ImpliedVolPoint {
        strike,
        moneyness: ctx.moneyness(strike),
        market_iv,
        option_type: quote.option_type,
        source,
    };

    if let Some(price) = quote.best_price() {
        if !price.is_finite() || price <= 0.0 {
            return Err(reject(quote, RejectReason::InvalidInput, format!("price {price}")));
        }
        return solver
            .solve(
                price,
                ctx.spot_price,
                strike,
                ctx.time_to_expiry,
                ctx.risk_free_rate,
                ctx.dividend_yield,
                quote.option_type,
            )
            .map(|s| point(s.vol, QuoteSource::SolvedFromPrice))
            .map_err(|e| classify(&e, price, quote, ctx));
    }

    match quote.market_iv {
        Some(iv) if iv.is_finite() && iv > 0.0 => Ok(point(iv, QuoteSource::Quoted)),
        Some(iv) => Err(reject(quote, RejectReason::InvalidInput, format!("implied vol {iv}"))),
        None => Err(reject(
            quote,
            RejectReason::MissingPrice,
            "no price, bid/ask or implied vol".to_string(),
        )),
    }
}

/// Solver error -> rejection. A solver that ran out of iterations still
/// hands back its last bracket midpoint.
fn classify(err: &VolError, price: f64, quote: &OptionQuote, ctx: &MarketContext) -> RejectedQuote {
    let reason = match err {
        VolError::ArbitrageViolation(_) => {
            let (lower, _) = price_bounds(
                ctx.spot_price,
                quote.strike,
                ctx.time_to_expiry,
                ctx.risk_free_rate,
                ctx.dividend_yield,
                quote.option_type,
            );
            if price < lower {
                RejectReason::BelowIntrinsic
            } else {
                RejectReason::AboveUpperBound
            }
        }
        VolError::NoRoot(_) => RejectReason::NoRootInBracket,
        VolError::ConvergenceFailure { .. } => RejectReason::NoConvergence,
        _ => RejectReason::InvalidInput,
    };
    let best_estimate = match err {
        VolError::ConvergenceFailure { best_estimate, .. } => *best_estimate,
        _ => None,
    };
    RejectedQuote {
        best_estimate,
        ..reject(quote, reason, err.to_string())
    }
}

/// Strike ascending, one point per strike
fn keep_out_of_the_money(
    mut points: Vec<ImpliedVolPoint>,
    forward: f64,
    rejected: &mut Vec<RejectedQuote>,
) -> Vec<ImpliedVolPoint> {
    points.sort_by(|a, b| a.strike.total_cmp(&b.strike));

    let mut kept: Vec<ImpliedVolPoint> = Vec::with_capacity(points.len());
    for point in points {
        let Some(last) = kept.last_mut() else {
            kept.push(point);
            continue;
        };
        if (last.strike - point.strike).abs() > 1e-9 {
            kept.push(point);
            continue;
        }

        let otm = OptionType::otm_for(point.strike, forward);
        let dropped = if point.option_type == otm && last.option_type != otm {
            std::mem::replace(last, point)
        } else {
            point
        };
        tracing::warn!(
            "Duplicate strike {}: keeping the {} quote",
            dropped.strike,
            last.option_type
        );
        rejected.push(RejectedQuote {
            strike: dropped.strike,
            option_type: dropped.option_type,
            reason: RejectReason::DuplicateStrike,
            detail: format!("{} quote kept at this strike", last.option_type),
            best_estimate: None,
        });
    }
    kept
}
