//! Dragnet main entry point
//!
//! This is the command-line interface for the dragnet crawl pipeline.

use anyhow::Context;
use clap::Parser;
use dragnet::config::{
    load_config_with_hash, load_pipeline, resolve_targets, Config, Pipeline, ScrapeMode,
    StorageKind,
};
use dragnet::output::print_run_report;
use dragnet::Orchestrator;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file consulted when neither --config nor the pipeline names one
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Dragnet: a configurable crawl and extraction pipeline
///
/// Dragnet drives multi-site scraping runs from two TOML documents: a
/// global config naming sites, limits, and storage, and a pipeline picking
/// the sites to crawl and the post-processing to apply to their records.
#[derive(Parser, Debug)]
#[command(name = "dragnet")]
#[command(version = "1.0.0")]
#[command(about = "A configurable crawl and extraction pipeline", long_about = None)]
struct Cli {
    /// Path to the pipeline TOML file
    #[arg(short, long, value_name = "PIPELINE", default_value = "pipeline.toml")]
    pipeline: PathBuf,

    /// Path to the config TOML file (overrides the pipeline's `config` key)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Scrape a single URL instead of running a pipeline file
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// Output file for --url runs
    #[arg(short, long, value_name = "FILE", default_value = "scraped_data.csv")]
    output: String,

    /// Fetch mode for --url runs (http or browser)
    #[arg(short, long, value_name = "MODE", default_value = "http")]
    mode: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate both documents and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let pipeline = if let Some(url) = &cli.url {
        tracing::info!("Running single-URL pipeline for {}", url);
        single_url_pipeline(url, &cli.mode)?
    } else {
        tracing::info!("Loading pipeline from: {}", cli.pipeline.display());
        load_pipeline(&cli.pipeline)
            .with_context(|| format!("cannot load pipeline {}", cli.pipeline.display()))?
    };

    let (mut config, config_hash) =
        load_run_config(cli.config.as_deref(), pipeline.config.as_deref())?;

    if cli.url.is_some() {
        apply_output_override(&mut config, &cli.output);
    }

    if cli.dry_run {
        handle_dry_run(&config, &pipeline)?;
        return Ok(());
    }

    handle_run(config, pipeline, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dragnet=info,warn"),
            1 => EnvFilter::new("dragnet=debug,info"),
            2 => EnvFilter::new("dragnet=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the one-shot pipeline a bare URL runs as
///
/// There are no selectors, so records carry the context fields plus the
/// generic link, image, and metadata extractions.
fn single_url_pipeline(url: &str, mode: &str) -> anyhow::Result<Pipeline> {
    Ok(Pipeline {
        urls: vec![url.to_string()],
        mode: Some(parse_mode(mode)?),
        extract_links: true,
        extract_images: true,
        extract_metadata: true,
        ..Default::default()
    })
}

fn parse_mode(raw: &str) -> anyhow::Result<ScrapeMode> {
    match raw {
        "http" => Ok(ScrapeMode::Http),
        "browser" => Ok(ScrapeMode::Browser),
        other => anyhow::bail!("unknown mode '{}' (expected http or browser)", other),
    }
}

/// Loads the config the pipeline runs against
///
/// An explicitly named config must exist, whether it came from --config or
/// from the pipeline's `config` key. Only the fallback default path may be
/// absent, in which case built-in defaults apply.
fn load_run_config(
    cli_path: Option<&Path>,
    pipeline_path: Option<&str>,
) -> anyhow::Result<(Config, String)> {
    let named = cli_path
        .map(Path::to_path_buf)
        .or_else(|| pipeline_path.map(PathBuf::from));

    if let Some(path) = named {
        let (config, hash) = load_config_with_hash(&path)
            .with_context(|| format!("cannot load config {}", path.display()))?;
        tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        );
        return Ok((config, hash));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        let (config, hash) = load_config_with_hash(default_path)
            .with_context(|| format!("cannot load config {}", default_path.display()))?;
        tracing::info!(
            "Configuration loaded from {} (hash: {})",
            DEFAULT_CONFIG_PATH,
            hash
        );
        Ok((config, hash))
    } else {
        tracing::info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
        Ok((Config::default(), "builtin".to_string()))
    }
}

/// Points the run's storage at the --output file for single-URL runs
fn apply_output_override(config: &mut Config, output: &str) {
    config.storage.path = output.to_string();
    config.storage.kind = match Path::new(output).extension().and_then(|e| e.to_str()) {
        Some("json") => StorageKind::Json,
        Some("db") | Some("sqlite") => StorageKind::Sqlite,
        _ => StorageKind::Csv,
    };
}

/// Handles the --dry-run mode: validates both documents and shows the plan
fn handle_dry_run(config: &Config, pipeline: &Pipeline) -> anyhow::Result<()> {
    let targets = resolve_targets(config, pipeline)?;

    println!("=== Dragnet Dry Run ===\n");

    println!("Limits:");
    println!("  Request timeout: {}s", config.request_timeout);
    println!(
        "  Delay between requests: {}ms",
        config.delay_between_requests
    );
    println!("  Max retries per page: {}", config.max_retries);
    println!("  Max concurrent sites: {}", config.max_concurrent_sites);

    println!("\nStorage:");
    match &pipeline.post_processing.export {
        Some(export) => println!("  Export override: {:?} at {}.*", export.format, export.path),
        None => println!("  {:?} at {}", config.storage.kind, config.storage.path),
    }

    println!("\nProxy pool:");
    if config.proxy.enabled {
        for endpoint in &config.proxy.endpoints {
            println!("  - {}", endpoint);
        }
    } else {
        println!("  rotation disabled");
    }

    println!("\nTargets ({}):", targets.len());
    for target in &targets {
        println!("  - {} [{}]", target.name, target.mode.as_str());
        for url in &target.urls {
            println!("    * {}", url);
        }
        println!("    selectors: {}", target.selectors.len());
        if let Some(pagination) = target.pagination.as_ref().filter(|p| p.enabled) {
            println!(
                "    pagination: up to {} pages via '{}'",
                pagination.max_pages, pagination.next_selector
            );
        }
        if target.required_login().is_some() {
            println!("    login required");
        }
    }

    println!(
        "\nPost-processing operations: {}",
        pipeline.post_processing.operations.len()
    );

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} site(s)", targets.len());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_run(
    config: Config,
    pipeline: Pipeline,
    config_hash: String,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config, &pipeline, config_hash)
        .context("pipeline cannot run against this config")?;

    // Ctrl-C requests a graceful stop; records gathered so far still land
    // in storage and the report
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await;
    print_run_report(&report);

    Ok(())
}
