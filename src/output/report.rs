//! Run reports
//!
//! A run always finishes with a report carrying one entry per site in the
//! pipeline's declared order, no matter how many sites failed. Failures
//! live in the report, not in the run's return value.

use chrono::{DateTime, Utc};
use url::Url;

/// Terminal status of one site's crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    /// Every attempted page was fetched and the batch was stored
    Complete,

    /// Some pages were skipped, but records were produced and stored
    Partial,

    /// The site produced no stored records
    Failed,

    /// Cancellation cut the site short; gathered records were still
    /// processed and stored
    Cancelled,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One site's slice of the run report
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub status: SiteStatus,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub records_extracted: usize,
    pub records_stored: usize,

    /// What went wrong, for failed or partial sites
    pub error: Option<String>,
}

impl SiteReport {
    /// Report for a site that failed before fetching anything
    pub fn failed(site: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            status: SiteStatus::Failed,
            pages_fetched: 0,
            pages_skipped: 0,
            records_extracted: 0,
            records_stored: 0,
            error: Some(error.into()),
        }
    }

    /// Report for a site cancelled before its crawl began
    pub fn cancelled(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            status: SiteStatus::Cancelled,
            pages_fetched: 0,
            pages_skipped: 0,
            records_extracted: 0,
            records_stored: 0,
            error: None,
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    Partial,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Everything one run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Hash of the config document the run was built from
    pub config_hash: String,

    /// Per-site reports in the pipeline's declared order
    pub sites: Vec<SiteReport>,

    /// Per-endpoint failure counts from the proxy pool, if one was used
    pub proxy_failures: Vec<(Url, u64)>,

    /// Whether cancellation was requested during the run
    pub cancelled: bool,
}

impl RunReport {
    /// Aggregate status across all sites
    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            return RunStatus::Cancelled;
        }

        if self
            .sites
            .iter()
            .all(|s| s.status == SiteStatus::Complete)
        {
            return RunStatus::Complete;
        }

        if !self.sites.is_empty()
            && self.sites.iter().all(|s| s.status == SiteStatus::Failed)
        {
            return RunStatus::Failed;
        }

        RunStatus::Partial
    }

    pub fn total_records_stored(&self) -> usize {
        self.sites.iter().map(|s| s.records_stored).sum()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Prints a run report to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_run_report(report: &RunReport) {
    println!("=== Run Report ===\n");

    let seconds = report.duration().num_milliseconds() as f64 / 1000.0;
    println!(
        "Run status: {} ({:.1}s, config {})",
        report.status().as_str(),
        seconds,
        short_hash(&report.config_hash)
    );
    println!();

    println!("Sites:");
    for site in &report.sites {
        println!(
            "  {}: {} ({} fetched, {} skipped, {} extracted, {} stored)",
            site.site,
            site.status.as_str(),
            site.pages_fetched,
            site.pages_skipped,
            site.records_extracted,
            site.records_stored
        );
        if let Some(error) = &site.error {
            println!("    error: {}", error);
        }
    }
    println!();

    if !report.proxy_failures.is_empty() {
        println!("Proxy failures:");
        for (endpoint, count) in &report.proxy_failures {
            println!("  - {}: {}", endpoint, count);
        }
        println!();
    }

    println!("Total records stored: {}", report.total_records_stored());
}

fn short_hash(hash: &str) -> &str {
    if hash.len() >= 12 {
        &hash[..12]
    } else {
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_with(status: SiteStatus, stored: usize) -> SiteReport {
        SiteReport {
            site: "s".to_string(),
            status,
            pages_fetched: 1,
            pages_skipped: 0,
            records_extracted: stored,
            records_stored: stored,
            error: None,
        }
    }

    fn report_of(sites: Vec<SiteReport>, cancelled: bool) -> RunReport {
        let now = Utc::now();
        RunReport {
            started_at: now,
            finished_at: now,
            config_hash: "deadbeef".to_string(),
            sites,
            proxy_failures: Vec::new(),
            cancelled,
        }
    }

    #[test]
    fn test_all_complete_is_complete() {
        let report = report_of(
            vec![
                site_with(SiteStatus::Complete, 3),
                site_with(SiteStatus::Complete, 2),
            ],
            false,
        );
        assert_eq!(report.status(), RunStatus::Complete);
        assert_eq!(report.total_records_stored(), 5);
    }

    #[test]
    fn test_mixed_outcomes_are_partial() {
        let report = report_of(
            vec![
                site_with(SiteStatus::Complete, 3),
                site_with(SiteStatus::Failed, 0),
            ],
            false,
        );
        assert_eq!(report.status(), RunStatus::Partial);
    }

    #[test]
    fn test_all_failed_is_failed() {
        let report = report_of(
            vec![
                site_with(SiteStatus::Failed, 0),
                site_with(SiteStatus::Failed, 0),
            ],
            false,
        );
        assert_eq!(report.status(), RunStatus::Failed);
    }

    #[test]
    fn test_cancellation_wins_over_site_statuses() {
        let report = report_of(vec![site_with(SiteStatus::Complete, 3)], true);
        assert_eq!(report.status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_failed_helper_is_empty() {
        let report = SiteReport::failed("news", "no route to host");
        assert_eq!(report.status, SiteStatus::Failed);
        assert_eq!(report.records_stored, 0);
        assert!(report.error.is_some());
    }
}
