//! Crawl machinery
//!
//! This module contains the core crawling logic, including:
//! - Per-site pagination driving with retry and skip handling
//! - Login session establishment
//! - Request pacing and proxy rotation
//! - Record extraction from fetched pages
//! - Whole-run orchestration across concurrent site tasks

mod driver;
mod extract;
mod governor;
mod orchestrator;
mod session;

pub use driver::{crawl_site, CrawlOutcome};
pub use extract::{extract_page, ExtractedPage, SelectorSet};
pub use governor::{Governor, ProxyPool, RequestOutcome};
pub use orchestrator::Orchestrator;
pub use session::authenticate;

use crate::config::{Config, Pipeline};
use crate::output::RunReport;

/// Runs a pipeline against a configuration
///
/// This is the main library entry point. It will:
/// 1. Resolve the pipeline into concrete crawl targets
/// 2. Open the storage sink
/// 3. Crawl every site, bounded by `max-concurrent-sites`
/// 4. Post-process and store each site's records
/// 5. Report per-site outcomes
///
/// # Arguments
///
/// * `config` - The validated global configuration
/// * `pipeline` - The pipeline to run
/// * `config_hash` - Hash of the config document, carried into the report
///
/// # Returns
///
/// * `Ok(RunReport)` - The run finished; individual sites may still have failed
/// * `Err(DragnetError)` - The pipeline could not start
pub async fn run_pipeline(
    config: Config,
    pipeline: &Pipeline,
    config_hash: &str,
) -> crate::Result<RunReport> {
    let orchestrator = Orchestrator::new(config, pipeline, config_hash)?;
    Ok(orchestrator.run().await)
}
