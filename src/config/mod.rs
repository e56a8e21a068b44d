//! Deployment configuration
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Cluster config (/etc/crq/config.toml)
//! 3. Local config (crq.toml, or --config)
//! 4. CLI `--set key=value` overrides
//!
//! The merged value is checked into a typed [`DeploymentConfig`].

mod defaults;
mod deployment;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use deployment::DeploymentConfig;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, parse_override};

/// Default location of the cluster-wide config file.
pub const CLUSTER_CONFIG_PATH: &str = "/etc/crq/config.toml";

/// Default location of the local config file.
pub const LOCAL_CONFIG_PATH: &str = "crq.toml";
