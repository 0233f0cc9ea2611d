//! Configuration loading helpers
//!
//! Services describe their configuration as `serde` structs; this module
//! merges a YAML file with prefixed environment variables through figment.

use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to load configuration: {0}")]
    Extract(String),
}

/// Load a configuration file with environment overrides
///
/// Priority (highest to lowest):
/// 1. Environment variables starting with `env_prefix` (`__` separates nesting)
/// 2. The YAML file at `path`
/// 3. Serde defaults declared on `T`
pub fn load_yaml_config<T, P>(path: P, env_prefix: &str) -> Result<T, ConfigLoadError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()));
    }

    info!("Loading configuration from {}", path.display());
    debug!("Environment override prefix: {}", env_prefix);

    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| ConfigLoadError::Extract(e.to_string()))
}

/// Parse configuration from an in-memory YAML document (no environment merge)
pub fn parse_yaml_config<T>(yaml: &str) -> Result<T, ConfigLoadError>
where
    T: DeserializeOwned,
{
    Figment::new()
        .merge(Yaml::string(yaml))
        .extract()
        .map_err(|e| ConfigLoadError::Extract(e.to_string()))
}
