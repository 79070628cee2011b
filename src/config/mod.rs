//! Configuration module for dragnet
//!
//! This module handles loading, parsing, and validating the two TOML
//! documents a run is built from: the global config (limits, storage,
//! proxies, named sites) and the pipeline (which sites to crawl and how to
//! transform the records).
//!
//! # Example
//!
//! ```no_run
//! use dragnet::config::{load_config, load_pipeline};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! let pipeline = load_pipeline(Path::new("pipeline.toml")).unwrap();
//! println!("Crawling {} site(s)", pipeline.sites.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Condition, Config, CrawlTarget, ExportConfig, ExportFormat, ExtractOptions,
    LoginConfig, Operation, PaginationConfig, Pipeline, PostProcessing, ProxyConfig, ScrapeMode,
    SiteConfig, StorageConfig, StorageKind,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_pipeline};

// Re-export validation entry points
pub use validation::{resolve_targets, validate, validate_pipeline};
