//! Smile and surface assembly
//!
//! Turns raw option quotes into market implied vols, runs every requested
//! model against them and merges per-expiry smiles into a surface. Per-quote
//! and per-model failures are recorded next to the results instead of
//! aborting the batch.

pub mod comparison;
pub mod quotes;
pub mod surface;

pub use comparison::{compare_expiries, compare_models, ExpiryQuotes};
pub use quotes::invert_quotes;
pub use surface::{build_surface, surface_from_comparisons};
