//! Error types for smile calibration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Arbitrage violation: {0}")]
    ArbitrageViolation(String),

    /// The target price cannot be reached by any volatility in the solver bracket.
    #[error("No root in volatility bracket: {0}")]
    NoRoot(String),

    #[error("Model domain error: {0}")]
    ModelDomain(String),

    /// Iteration cap reached. `best_estimate` is informational only and is
    /// never handed back as a converged value.
    #[error("Convergence failure after {iterations} iterations: {message}")]
    ConvergenceFailure {
        message: String,
        iterations: usize,
        best_estimate: Option<f64>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

pub type VolResult<T> = Result<T, VolError>;

impl VolError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn arbitrage(msg: impl Into<String>) -> Self {
        Self::ArbitrageViolation(msg.into())
    }

    pub fn no_root(msg: impl Into<String>) -> Self {
        Self::NoRoot(msg.into())
    }

    pub fn model_domain(msg: impl Into<String>) -> Self {
        Self::ModelDomain(msg.into())
    }

    pub fn convergence(
        msg: impl Into<String>,
        iterations: usize,
        best_estimate: Option<f64>,
    ) -> Self {
        Self::ConvergenceFailure {
            message: msg.into(),
            iterations,
            best_estimate,
        }
    }
}

/// Reject NaN, infinities, zero and negatives.
pub(crate) fn ensure_positive(value: f64, name: &str) -> VolResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(VolError::invalid_parameter(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(value)
}

pub(crate) fn ensure_finite(value: f64, name: &str) -> VolResult<f64> {
    if !value.is_finite() {
        return Err(VolError::invalid_parameter(format!(
            "{name} must be finite, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_failure_keeps_estimate() {
        let err = VolError::convergence("cap reached", 100, Some(0.21));
        match err {
            VolError::ConvergenceFailure {
                iterations,
                best_estimate,
                ..
            } => {
                assert_eq!(iterations, 100);
                assert_eq!(best_estimate, Some(0.21));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = VolError::arbitrage("price below intrinsic");
        assert!(format!("{err}").contains("below intrinsic"));

        let err = VolError::model_domain("beta must be in [0, 1]");
        assert!(format!("{err}").contains("beta"));
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive(1.0, "spot").is_ok());
        assert!(ensure_positive(0.0, "spot").is_err());
        assert!(ensure_positive(f64::NAN, "spot").is_err());
        assert!(ensure_finite(-2.0, "rate").is_ok());
        assert!(ensure_finite(f64::INFINITY, "rate").is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VolError>();
    }
}
