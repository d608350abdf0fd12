//! # Smile Models - Implied Volatility Smile Calibration
//!
//! Extracts market implied volatilities from option quotes, fits smile models
//! to them and assembles the results into per-expiry comparisons and an
//! implied volatility surface.
//!
//! ## Overview
//!
//! Four models are fitted to the same market smile:
//! - **Black-Scholes**: Flat volatility, the baseline
//! - **Heston**: Stochastic variance, priced with the Lewis integral
//! - **SABR**: Hagan's closed-form implied vol expansion
//! - **Merton**: Lognormal jumps on a diffusion, priced as a Poisson series
//!
//! Every model is normalised to Black-Scholes implied vol, so the smiles can
//! be compared strike by strike.
//!
//! ## Key Components
//!
//! - **Implied vol solver**: Newton with an explicit bisection fallback
//! - **Calibration**: Box-constrained Levenberg-Marquardt on implied vols
//! - **Assembler**: Quote inversion, multi-model comparison, surface merge
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smile_models::prelude::*;
//!
//! let ctx = MarketContext::new(100.0, 0.5, 0.03, 0.0);
//! let quotes = vec![
//!     OptionQuote::put(90.0).with_price(1.95),
//!     OptionQuote::put(100.0).with_price(4.85),
//!     OptionQuote::call(110.0).with_price(2.70),
//! ];
//!
//! let comparison = compare_models(
//!     "SPY",
//!     None,
//!     &quotes,
//!     &ctx,
//!     &[ModelKind::Sabr, ModelKind::Heston],
//!     &EngineConfig::default(),
//! )
//! .unwrap();
//!
//! for point in &comparison.data_points {
//!     println!("{} {:.4} {:?}", point.strike, point.market_iv, point.calculated_ivs);
//! }
//! ```
//!
//! ## What This Library Does NOT Do
//!
//! - Fetch or cache market data
//! - Price American or path-dependent options
//! - Enforce calendar or butterfly arbitrage across the surface

pub mod assembler;
pub mod calibration;
pub mod config;
pub mod core;
pub mod models;

/// Prelude with commonly used types
pub mod prelude {
    // Core types
    pub use crate::core::{
        CalibrationResult, CalibrationWarning, ExpirySmile, Greeks, HestonParams, ImpliedVolPoint,
        MarketContext, MertonParams, ModelKind, ModelOutcome, ModelParameters, OptionQuote, OptionType,
        QuoteInversion, RejectReason, SabrParams, VolError, VolResult, VolSmileComparison, VolSurface,
        VolSurfacePoint,
    };

    // Configuration
    pub use crate::config::{CalibrationConfig, EngineConfig, PricingConfig, SolverConfig, SurfaceGridConfig};

    // Models
    pub use crate::models::{
        greeks as bs_greeks, implied_vol, implied_vol_at, price as bs_price, smile_vols, HestonModel,
        ImpliedVolSolver, MertonModel, SabrModel, SmilePricer,
    };

    // Calibration
    pub use crate::calibration::{calibrate, Calibrator};

    // Assembly
    pub use crate::assembler::{
        build_surface, compare_expiries, compare_models, invert_quotes, surface_from_comparisons, ExpiryQuotes,
    };
}

// Re-export main types at crate root
pub use crate::core::{VolError, VolResult};
pub use crate::models::{HestonModel, MertonModel, SabrModel};
