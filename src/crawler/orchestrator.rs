//! Run orchestration
//!
//! This module contains the top of the crawl machinery: it resolves a
//! pipeline into concrete targets, opens the run's storage sink, then
//! crawls every site as its own task under the configured concurrency
//! bound. A failing site never takes the run down; whatever happened to it
//! lands in its slice of the run report.

use crate::config::{resolve_targets, validate, Config, CrawlTarget, Operation, Pipeline};
use crate::crawler::driver::crawl_site;
use crate::crawler::governor::{Governor, ProxyPool};
use crate::crawler::session::authenticate;
use crate::fetch::build_fetcher;
use crate::output::{RunReport, SiteReport, SiteStatus};
use crate::process::process;
use crate::storage::{open_export_sink, open_sink, StorageSink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// Drives one run end to end
///
/// # Example
///
/// ```no_run
/// use dragnet::config::{load_config, load_pipeline};
/// use dragnet::Orchestrator;
/// use std::path::Path;
///
/// # async fn run() -> dragnet::Result<()> {
/// let config = load_config(Path::new("config.toml"))?;
/// let pipeline = load_pipeline(Path::new("pipeline.toml"))?;
///
/// let orchestrator = Orchestrator::new(config, &pipeline, "hash")?;
/// let report = orchestrator.run().await;
/// println!("stored {} records", report.total_records_stored());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    config: Arc<Config>,
    targets: Vec<CrawlTarget>,
    operations: Arc<Vec<Operation>>,
    sink: Arc<dyn StorageSink>,
    pool: Option<Arc<ProxyPool>>,
    cancel: CancellationToken,
    config_hash: String,
}

impl Orchestrator {
    /// Builds an orchestrator for one pipeline
    ///
    /// Everything that can be rejected before network activity is rejected
    /// here: unknown site names, invalid URLs and selectors, browser-mode
    /// targets in a build without browser support, and a storage
    /// destination that cannot be opened.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated global configuration
    /// * `pipeline` - The pipeline to run
    /// * `config_hash` - Hash of the config document, carried into the report
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(DragnetError)` - The pipeline cannot run against this config
    pub fn new(
        config: Config,
        pipeline: &Pipeline,
        config_hash: impl Into<String>,
    ) -> crate::Result<Self> {
        validate(&config)?;
        let targets = resolve_targets(&config, pipeline)?;

        // A pipeline export block redirects the whole run's output
        let sink = match &pipeline.post_processing.export {
            Some(export) => open_export_sink(export)?,
            None => open_sink(&config.storage)?,
        };

        let pool = if config.proxy.enabled {
            let endpoints: Vec<Url> = config
                .proxy
                .endpoints
                .iter()
                .filter_map(|endpoint| Url::parse(endpoint).ok())
                .collect();
            ProxyPool::new(endpoints).map(Arc::new)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            targets,
            operations: Arc::new(pipeline.post_processing.operations.clone()),
            sink,
            pool,
            cancel: CancellationToken::new(),
            config_hash: config_hash.into(),
        })
    }

    /// Token that cancels the run when triggered
    ///
    /// Sites already fetching finish their in-flight request; records
    /// gathered up to that point are still processed and stored.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every target to completion and reports what happened
    ///
    /// Sites run concurrently, at most `max-concurrent-sites` at a time.
    /// The report lists sites in the pipeline's declared order regardless
    /// of finish order.
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        info!(
            sites = self.targets.len(),
            destination = %self.sink.destination(),
            "starting run"
        );

        let semaphore = Arc::new(Semaphore::new(
            self.config.max_concurrent_sites as usize,
        ));
        let mut tasks: JoinSet<(usize, SiteReport)> = JoinSet::new();

        for (index, target) in self.targets.iter().enumerate() {
            let target = target.clone();
            let config = Arc::clone(&self.config);
            let operations = Arc::clone(&self.operations);
            let sink = Arc::clone(&self.sink);
            let pool = self.pool.clone();
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        return (index, SiteReport::cancelled(&target.name));
                    }
                    permit = semaphore.acquire_owned() => permit,
                };
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => return (index, SiteReport::cancelled(&target.name)),
                };

                let report = run_site(&target, config, operations, sink, pool, cancel).await;
                (index, report)
            });
        }

        let mut slots: Vec<Option<SiteReport>> =
            (0..self.targets.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(join_error) => {
                    error!(error = %join_error, "site task aborted");
                }
            }
        }

        let sites: Vec<SiteReport> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    SiteReport::failed(&self.targets[index].name, "site task aborted")
                })
            })
            .collect();

        let proxy_failures = match &self.pool {
            Some(pool) => pool.failure_counts().await,
            None => Vec::new(),
        };

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            config_hash: self.config_hash.clone(),
            sites,
            proxy_failures,
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            status = report.status().as_str(),
            records = report.total_records_stored(),
            "run finished"
        );
        report
    }
}

/// Runs one site: fetcher, optional login, crawl, post-process, store
async fn run_site(
    target: &CrawlTarget,
    config: Arc<Config>,
    operations: Arc<Vec<Operation>>,
    sink: Arc<dyn StorageSink>,
    pool: Option<Arc<ProxyPool>>,
    cancel: CancellationToken,
) -> SiteReport {
    let fetcher = match build_fetcher(target.mode, &config) {
        Ok(fetcher) => fetcher,
        Err(build_error) => {
            error!(site = %target.name, error = %build_error, "cannot build fetcher");
            return SiteReport::failed(&target.name, build_error.to_string());
        }
    };

    let governor = Governor::new(
        Duration::from_millis(config.delay_between_requests),
        pool,
    );

    let session = match authenticate(target, fetcher.as_ref(), &governor).await {
        Ok(session) => session,
        Err(auth_error) => {
            warn!(site = %target.name, error = %auth_error, "authentication failed, skipping site");
            return SiteReport::failed(&target.name, auth_error.to_string());
        }
    };

    let outcome = crawl_site(
        target,
        fetcher.as_ref(),
        &governor,
        session.as_ref(),
        config.max_retries,
        &cancel,
    )
    .await;

    let records_extracted = outcome.batch.len();
    let processed = process(outcome.batch, &operations);
    let records_stored = processed.len();

    if let Err(store_error) = sink.store(&processed).await {
        error!(site = %target.name, error = %store_error, "storing records failed");
        return SiteReport {
            site: target.name.clone(),
            status: SiteStatus::Failed,
            pages_fetched: outcome.pages_fetched,
            pages_skipped: outcome.pages_skipped,
            records_extracted,
            records_stored: 0,
            error: Some(store_error.to_string()),
        };
    }

    let status = if outcome.cancelled {
        SiteStatus::Cancelled
    } else if outcome.pages_fetched == 0 && outcome.pages_skipped > 0 {
        SiteStatus::Failed
    } else if outcome.pages_skipped > 0 {
        SiteStatus::Partial
    } else {
        SiteStatus::Complete
    };

    let skip_note = if outcome.pages_skipped > 0 {
        Some(format!(
            "{} pages skipped after exhausting retries",
            outcome.pages_skipped
        ))
    } else {
        None
    };

    info!(
        site = %target.name,
        status = status.as_str(),
        pages = outcome.pages_fetched,
        records = records_stored,
        "site finished"
    );

    SiteReport {
        site: target.name.clone(),
        status,
        pages_fetched: outcome.pages_fetched,
        pages_skipped: outcome.pages_skipped,
        records_extracted,
        records_stored,
        error: skip_note,
    }
}
