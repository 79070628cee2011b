use crate::config::types::{Config, Pipeline};
use crate::config::validation::{validate, validate_pipeline};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use dragnet::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Max retries: {}", config.max_retries);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Loads and parses a pipeline document from the given path
///
/// Cross-references against the config (site names, selectors) are checked
/// later when the pipeline is resolved into crawl targets; this only checks
/// the pipeline's own shape.
///
/// # Arguments
///
/// * `path` - Path to the TOML pipeline file
///
/// # Returns
///
/// * `Ok(Pipeline)` - Successfully loaded and validated pipeline
/// * `Err(ConfigError)` - Failed to load, parse, or validate the pipeline
pub fn load_pipeline(path: &Path) -> Result<Pipeline, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let pipeline: Pipeline = toml::from_str(&content)?;

    validate_pipeline(&pipeline)?;

    Ok(pipeline)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
