//! Latent feature models that plug into the feature-allocation samplers.
//!
//! Each model provides a parameter bundle implementing
//! [`FeatureParameters`](crate::distributions::FeatureParameters) and a likelihood
//! implementing [`DataDistribution`](crate::distributions::DataDistribution). Updates of
//! the continuous parameters are left to the caller.

pub mod lfrm;
pub mod linear_gaussian;

use crate::error::ConfigError;

pub(crate) fn check_precision(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::InvalidPrior(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}
