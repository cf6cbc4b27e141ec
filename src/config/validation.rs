//! Configuration validation.

use crate::config::schema::AgentConfig;

/// A rejected configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("service_name must not be empty")]
    EmptyServiceName,

    #[error("sample_ratio must be within [0.0, 1.0], got {0}")]
    SampleRatioOutOfRange(f64),
}

/// Validate a configuration from any source.
pub fn validate_config(config: &AgentConfig) -> Result<(), ValidationError> {
    if config.service_name.is_empty() {
        return Err(ValidationError::EmptyServiceName);
    }
    if !(0.0..=1.0).contains(&config.sample_ratio) {
        return Err(ValidationError::SampleRatioOutOfRange(config.sample_ratio));
    }
    Ok(())
}
