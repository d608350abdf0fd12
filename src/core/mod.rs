//! Core data types for smile calibration
//!
//! Defines fundamental types:
//! - OptionType / MarketContext: contract side and per-expiry market state
//! - OptionQuote: quoted price, IV, bid/ask
//! - ModelParameters: tagged parameter sets for each smile model
//! - Smile and surface results

pub mod error;
pub mod greeks;
pub mod option;
pub mod params;
pub mod quote;
pub mod smile;
pub mod surface;

pub use error::*;
pub use greeks::*;
pub use option::*;
pub use params::*;
pub use quote::*;
pub use smile::*;
pub use surface::*;
