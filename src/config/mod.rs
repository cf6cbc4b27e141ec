//! Agent configuration.
//!
//! # Responsibilities
//! - Define the configuration schema with serde defaults
//! - Load and validate TOML configuration files

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AgentConfig;
pub use validation::{validate_config, ValidationError};
