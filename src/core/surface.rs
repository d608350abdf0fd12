//! Volatility Surface
//!
//! Raw strike × expiry implied volatility points, plus an optional regular
//! moneyness × expiry grid built from them on request.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::{VolError, VolResult};
use crate::config::SurfaceGridConfig;

/// Two strikes or expiries closer than this are the same key.
pub const SURFACE_KEY_EPSILON: f64 = 1e-9;

/// Single surface observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolSurfacePoint {
    pub strike: f64,
    /// Time to expiry in years
    pub expiry: f64,
    pub implied_vol: f64,
    /// strike / spot
    pub moneyness: f64,
}

/// Regular grid, rows are expiries and columns are moneyness levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneynessGrid {
    pub moneyness: Vec<f64>,
    pub expiries: Vec<f64>,
    /// vols[[expiry_idx, moneyness_idx]]
    pub vols: Array2<f64>,
}

impl MoneynessGrid {
    /// Bilinear interpolation, flat outside the grid
    pub fn vol_at(&self, moneyness: f64, expiry: f64) -> Option<f64> {
        if !moneyness.is_finite() || !expiry.is_finite() {
            return None;
        }
        let (ei_lo, ei_hi, e_frac) = find_bracket(&self.expiries, expiry)?;
        let (mi_lo, mi_hi, m_frac) = find_bracket(&self.moneyness, moneyness)?;

        let v00 = self.vols[[ei_lo, mi_lo]];
        let v01 = self.vols[[ei_lo, mi_hi]];
        let v10 = self.vols[[ei_hi, mi_lo]];
        let v11 = self.vols[[ei_hi, mi_hi]];

        let v0 = v00 * (1.0 - m_frac) + v01 * m_frac;
        let v1 = v10 * (1.0 - m_frac) + v11 * m_frac;

        Some(v0 * (1.0 - e_frac) + v1 * e_frac)
    }
}

/// Implied volatility surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolSurface {
    pub spot_price: f64,
    /// Unique (strike, expiry); sorted by expiry then strike
    pub points: Vec<VolSurfacePoint>,
    pub num_expirations: usize,
    pub num_strikes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<MoneynessGrid>,
}

impl VolSurface {
    /// Sort, drop duplicate keys (first one wins) and count.
    /// Returns the surface and the number of duplicates removed.
    pub fn from_points(spot_price: f64, mut points: Vec<VolSurfacePoint>) -> (Self, usize) {
        points.sort_by(|a, b| {
            a.expiry
                .total_cmp(&b.expiry)
                .then_with(|| a.strike.total_cmp(&b.strike))
        });
        let before = points.len();
        points.dedup_by(|later, earlier| same_key(earlier, later));
        let removed = before - points.len();

        let mut surface = Self {
            spot_price,
            points,
            num_expirations: 0,
            num_strikes: 0,
            grid: None,
        };
        surface.num_expirations = surface.expiries().len();
        surface.num_strikes = surface.strikes().len();
        (surface, removed)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct expiries, ascending
    pub fn expiries(&self) -> Vec<f64> {
        distinct_sorted(self.points.iter().map(|p| p.expiry))
    }

    /// Distinct strikes across all expiries, ascending
    pub fn strikes(&self) -> Vec<f64> {
        distinct_sorted(self.points.iter().map(|p| p.strike))
    }

    /// Raw points of one expiry, strike ascending
    pub fn smile_at(&self, expiry: f64) -> Vec<VolSurfacePoint> {
        self.points
            .iter()
            .filter(|p| (p.expiry - expiry).abs() < SURFACE_KEY_EPSILON)
            .copied()
            .collect()
    }

    /// Raw vol at an exact (strike, expiry) key
    pub fn raw_vol(&self, strike: f64, expiry: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|p| {
                (p.expiry - expiry).abs() < SURFACE_KEY_EPSILON
                    && (p.strike - strike).abs() < SURFACE_KEY_EPSILON
            })
            .map(|p| p.implied_vol)
    }

    /// Copy of this surface with a regular moneyness grid attached.
    ///
    /// Each expiry row is linear in moneyness between that expiry's raw
    /// points and flat beyond them. Raw points are left as they are.
    pub fn with_moneyness_grid(&self, config: &SurfaceGridConfig) -> VolResult<VolSurface> {
        config.validate()?;
        if self.points.is_empty() {
            return Err(VolError::invalid_parameter(
                "cannot grid an empty surface",
            ));
        }

        let moneyness = config.levels();
        let expiries = self.expiries();
        let mut vols = Array2::zeros((expiries.len(), moneyness.len()));

        for (ei, &expiry) in expiries.iter().enumerate() {
            let mut row: Vec<(f64, f64)> = self
                .smile_at(expiry)
                .iter()
                .map(|p| (p.moneyness, p.implied_vol))
                .collect();
            row.sort_by(|a, b| a.0.total_cmp(&b.0));
            let xs: Vec<f64> = row.iter().map(|(m, _)| *m).collect();

            for (mi, &m) in moneyness.iter().enumerate() {
                let (lo, hi, frac) = find_bracket(&xs, m).ok_or_else(|| {
                    VolError::invalid_parameter(format!("no points at expiry {expiry}"))
                })?;
                vols[[ei, mi]] = row[lo].1 * (1.0 - frac) + row[hi].1 * frac;
            }
        }

        Ok(VolSurface {
            grid: Some(MoneynessGrid {
                moneyness,
                expiries,
                vols,
            }),
            ..self.clone()
        })
    }

    /// Interpolated vol from the grid, if one was built
    pub fn vol_at(&self, moneyness: f64, expiry: f64) -> Option<f64> {
        self.grid.as_ref()?.vol_at(moneyness, expiry)
    }
}

fn same_key(a: &VolSurfacePoint, b: &VolSurfacePoint) -> bool {
    (a.expiry - b.expiry).abs() < SURFACE_KEY_EPSILON
        && (a.strike - b.strike).abs() < SURFACE_KEY_EPSILON
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup_by(|a, b| (*a - *b).abs() < SURFACE_KEY_EPSILON);
    out
}

/// Bracketing indices and interpolation fraction; clamps outside the axis
fn find_bracket(axis: &[f64], value: f64) -> Option<(usize, usize, f64)> {
    if axis.is_empty() {
        return None;
    }

    if value <= axis[0] {
        return Some((0, 0, 0.0));
    }
    let last = axis.len() - 1;
    if value >= axis[last] {
        return Some((last, last, 0.0));
    }

    let hi = axis.partition_point(|&x| x <= value);
    let lo = hi - 1;
    let width = axis[hi] - axis[lo];
    let frac = if width > 0.0 {
        (value - axis[lo]) / width
    } else {
        0.0
    };
    Some((lo, hi, frac))
}
