use crate::config::types::{
    Config, CrawlTarget, ExtractOptions, LoginConfig, PaginationConfig, Pipeline, ProxyConfig,
    ScrapeMode, SiteConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_limits(config)?;
    validate_proxy_config(&config.proxy)?;
    for (name, site) in &config.sites {
        validate_site(name, site)?;
    }
    Ok(())
}

/// Validates global crawl limits
fn validate_limits(config: &Config) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1 second, got {}",
            config.request_timeout
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.max_concurrent_sites < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_sites must be >= 1, got {}",
            config.max_concurrent_sites
        )));
    }

    if config.storage.path.is_empty() {
        return Err(ConfigError::Validation(
            "storage path cannot be empty".to_string(),
        ));
    }

    validate_table_name(&config.storage.table)?;

    Ok(())
}

/// Validates the SQLite table name
///
/// The name ends up inside a CREATE TABLE statement, so it is restricted to
/// plain identifiers.
fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "storage table '{}' must be a plain identifier (letters, digits, underscores)",
            table
        )));
    }

    Ok(())
}

/// Validates the proxy pool
fn validate_proxy_config(proxy: &ProxyConfig) -> Result<(), ConfigError> {
    if !proxy.enabled {
        return Ok(());
    }

    if proxy.endpoints.is_empty() {
        return Err(ConfigError::Validation(
            "proxy rotation is enabled but no endpoints are configured".to_string(),
        ));
    }

    for endpoint in &proxy.endpoints {
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy endpoint '{}': {}", endpoint, e))
        })?;
    }

    Ok(())
}

/// Validates one site entry
fn validate_site(name: &str, site: &SiteConfig) -> Result<(), ConfigError> {
    if site.urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must have at least one start URL",
            name
        )));
    }

    parse_urls(name, &site.urls)?;
    validate_selector_map(&site.selectors)?;

    if let Some(pagination) = &site.pagination {
        validate_pagination(name, pagination)?;
    }

    if let Some(login) = &site.login {
        validate_login(name, login)?;
    }

    Ok(())
}

/// Validates a field-name to CSS-selector map
fn validate_selector_map(selectors: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (field, selector) in selectors {
        if Selector::parse(selector).is_err() {
            return Err(ConfigError::InvalidSelector {
                name: field.clone(),
                selector: selector.clone(),
            });
        }
    }
    Ok(())
}

/// Validates a pagination block
fn validate_pagination(site: &str, pagination: &PaginationConfig) -> Result<(), ConfigError> {
    if Selector::parse(&pagination.next_selector).is_err() {
        return Err(ConfigError::InvalidSelector {
            name: format!("{}.pagination", site),
            selector: pagination.next_selector.clone(),
        });
    }

    if pagination.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "Site '{}': max_pages must be >= 1, got {}",
            site, pagination.max_pages
        )));
    }

    Ok(())
}

/// Validates a login block
///
/// Missing credentials are deliberately not rejected here. A site whose
/// login lacks a username or password fails at crawl time with an
/// authentication error for that site alone, leaving the rest of the run
/// untouched.
fn validate_login(site: &str, login: &LoginConfig) -> Result<(), ConfigError> {
    Url::parse(&login.login_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid login URL '{}' for site '{}': {}",
            login.login_url, site, e
        ))
    })?;

    if login.username_field.is_empty() || login.password_field.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}': login field names cannot be empty",
            site
        )));
    }

    if Selector::parse(&login.submit_selector).is_err() {
        return Err(ConfigError::InvalidSelector {
            name: format!("{}.login", site),
            selector: login.submit_selector.clone(),
        });
    }

    Ok(())
}

/// Validates a pipeline's own shape, independent of any config
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<(), ConfigError> {
    if !pipeline.sites.is_empty() && !pipeline.urls.is_empty() {
        return Err(ConfigError::Validation(
            "A pipeline cannot declare both `sites` and `urls`".to_string(),
        ));
    }

    if pipeline.sites.is_empty() && pipeline.urls.is_empty() {
        return Err(ConfigError::Validation(
            "A pipeline must declare either `sites` or `urls`".to_string(),
        ));
    }

    parse_urls("pipeline", &pipeline.urls)?;
    validate_selector_map(&pipeline.selectors)?;

    if let Some(export) = &pipeline.post_processing.export {
        if export.path.is_empty() {
            return Err(ConfigError::Validation(
                "export path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Resolves a pipeline against a config into concrete crawl targets
///
/// Site names are looked up in the config's `[sites]` table. An inline URL
/// list becomes a single target named `adhoc` using the pipeline's own
/// selectors. Targets come back in the pipeline's declared order.
pub fn resolve_targets(
    config: &Config,
    pipeline: &Pipeline,
) -> Result<Vec<CrawlTarget>, ConfigError> {
    validate_pipeline(pipeline)?;

    let extract = ExtractOptions {
        links: pipeline.extract_links,
        images: pipeline.extract_images,
        metadata: pipeline.extract_metadata,
    };

    let mut targets = Vec::new();

    if pipeline.sites.is_empty() {
        targets.push(CrawlTarget {
            name: "adhoc".to_string(),
            urls: parse_urls("adhoc", &pipeline.urls)?,
            mode: pipeline.mode.unwrap_or_default(),
            selectors: pipeline.selectors.clone(),
            pagination: None,
            login: None,
            extract,
        });
    } else {
        let mut seen = HashSet::new();
        for name in &pipeline.sites {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Site '{}' appears more than once in the pipeline",
                    name
                )));
            }

            let site = config
                .sites
                .get(name)
                .ok_or_else(|| ConfigError::UnknownSite(name.clone()))?;

            targets.push(CrawlTarget {
                name: name.clone(),
                urls: parse_urls(name, &site.urls)?,
                // A site's own mode wins over the pipeline default
                mode: site.mode.or(pipeline.mode).unwrap_or_default(),
                selectors: site.selectors.clone(),
                pagination: site.pagination.clone(),
                login: site.login.clone(),
                extract,
            });
        }
    }

    if !cfg!(feature = "browser") {
        if let Some(target) = targets.iter().find(|t| t.mode == ScrapeMode::Browser) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' wants browser mode, but this build has no browser support",
                target.name
            )));
        }
    }

    Ok(targets)
}

/// Parses a list of raw URL strings, rejecting non-HTTP schemes
fn parse_urls(owner: &str, raw: &[String]) -> Result<Vec<Url>, ConfigError> {
    let mut urls = Vec::with_capacity(raw.len());

    for candidate in raw {
        let url = Url::parse(candidate).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid URL '{}' for '{}': {}", candidate, owner, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "URL '{}' for '{}' must use the http or https scheme",
                candidate, owner
            )));
        }

        urls.push(url);
    }

    Ok(urls)
}
