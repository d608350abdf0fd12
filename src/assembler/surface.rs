//! Surface assembly from per-expiry smiles

use crate::core::{ExpirySmile, VolError, VolResult, VolSmileComparison, VolSurface, VolSurfacePoint};

/// Merge smiles into a raw surface.
///
/// Points are sorted by expiry then strike and a repeated (strike, expiry)
/// keeps its first occurrence. Points with a non-positive strike or vol are
/// skipped. No interpolation happens here; see
/// [`VolSurface::with_moneyness_grid`].
pub fn build_surface(smiles: &[ExpirySmile]) -> VolResult<VolSurface> {
    let first = smiles
        .first()
        .ok_or_else(|| VolError::invalid_parameter("no smiles to build a surface from"))?;
    let spot_price = first.spot_price;

    let mut points = Vec::with_capacity(smiles.iter().map(|s| s.points.len()).sum());
    for smile in smiles {
        if !(smile.spot_price.is_finite() && smile.spot_price > 0.0) {
            return Err(VolError::invalid_parameter(format!(
                "smile spot must be positive, got {}",
                smile.spot_price
            )));
        }
        if !(smile.time_to_expiry.is_finite() && smile.time_to_expiry > 0.0) {
            return Err(VolError::invalid_parameter(format!(
                "smile time_to_expiry must be positive, got {}",
                smile.time_to_expiry
            )));
        }
        if (smile.spot_price - spot_price).abs() > 1e-9 * spot_price {
            tracing::warn!(
                "Smile at T={} uses spot {} (surface spot {})",
                smile.time_to_expiry,
                smile.spot_price,
                spot_price
            );
        }

        for &(strike, implied_vol) in &smile.points {
            if !(strike.is_finite() && strike > 0.0 && implied_vol.is_finite() && implied_vol > 0.0) {
                tracing::warn!(
                    "Skipping surface point T={} K={} iv={}",
                    smile.time_to_expiry,
                    strike,
                    implied_vol
                );
                continue;
            }
            points.push(VolSurfacePoint {
                strike,
                expiry: smile.time_to_expiry,
                implied_vol,
                moneyness: strike / smile.spot_price,
            });
        }
    }

    let (surface, removed) = VolSurface::from_points(spot_price, points);
    if removed > 0 {
        tracing::warn!("Dropped {} duplicate (strike, expiry) surface points", removed);
    }
    tracing::debug!(
        "Built surface: {} points, {} expirations, {} strikes",
        surface.len(),
        surface.num_expirations,
        surface.num_strikes
    );
    Ok(surface)
}

/// Surface of the market smiles behind a set of comparisons
pub fn surface_from_comparisons(comparisons: &[VolSmileComparison]) -> VolResult<VolSurface> {
    let smiles: Vec<ExpirySmile> = comparisons.iter().map(VolSmileComparison::market_smile).collect();
    build_surface(&smiles)
}
