//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Service name reported with every transaction.
    pub service_name: String,

    /// Deployment environment label (e.g. "production").
    pub environment: Option<String>,

    /// Fraction of transactions selected for full context capture.
    pub sample_ratio: f64,

    /// Request path prefixes that are never instrumented.
    pub ignore_url_prefixes: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: "unnamed-service".to_string(),
            environment: None,
            sample_ratio: 1.0,
            ignore_url_prefixes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: AgentConfig = toml::from_str("service_name = \"billing\"").unwrap();
        assert_eq!(config.service_name, "billing");
        assert_eq!(config.environment, None);
        assert_eq!(config.sample_ratio, 1.0);
        assert!(config.ignore_url_prefixes.is_empty());
    }

    #[test]
    fn parses_a_full_config() {
        let config: AgentConfig = toml::from_str(
            r#"
            service_name = "billing"
            environment = "staging"
            sample_ratio = 0.25
            ignore_url_prefixes = ["/health", "/metrics"]
            "#,
        )
        .unwrap();
        assert_eq!(config.environment.as_deref(), Some("staging"));
        assert_eq!(config.sample_ratio, 0.25);
        assert_eq!(config.ignore_url_prefixes, ["/health", "/metrics"]);
    }
}
