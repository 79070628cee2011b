//! Dragnet: a configurable crawl and extraction pipeline
//!
//! This crate drives multi-site scraping runs: per-site pagination with retry
//! and rate limiting, optional login sessions and proxy rotation, declarative
//! post-processing of the extracted records, and pluggable storage sinks.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod output;
pub mod process;
pub mod record;
pub mod storage;

use thiserror::Error;

/// Main error type for dragnet operations
#[derive(Debug, Error)]
pub enum DragnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// All of these surface before any network activity: configuration is
/// validated eagerly and a bad document fails the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Pipeline references unknown site '{0}'")]
    UnknownSite(String),

    #[error("Invalid selector for '{name}': {selector}")]
    InvalidSelector { name: String, selector: String },
}

/// Errors from a single fetch attempt
///
/// These are retryable: the pagination driver retries a failed fetch up to
/// the configured attempt bound before skipping the page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("{0}")]
    Unsupported(String),
}

/// Login failures, fatal for the affected site
///
/// A site whose authentication fails is skipped entirely; login is never
/// retried within a run to avoid credential lockout.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Site '{site}' requires login but has no credentials configured")]
    MissingCredentials { site: String },

    #[error("Login rejected for site '{site}' (HTTP {status})")]
    Rejected { site: String, status: u16 },

    #[error("Login timed out for site '{site}'")]
    Timeout { site: String },

    #[error("Login failed for site '{site}': {message}")]
    Network { site: String, message: String },
}

/// Extraction errors
///
/// A selector that matches nothing is not an error (the field is simply
/// absent from the record); this only covers selectors that fail to parse
/// at extraction time.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Selector '{name}' failed to parse: {message}")]
    Selector { name: String, message: String },
}

/// Result type alias for dragnet operations
pub type Result<T> = std::result::Result<T, DragnetError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, Operation, Pipeline, ScrapeMode};
pub use crawler::Orchestrator;
pub use output::{RunReport, SiteReport, SiteStatus};
pub use record::{FieldValue, Record, RecordBatch};
