//! Run reporting
//!
//! This module provides the types that describe what a run did. The
//! orchestrator assembles a [`RunReport`] as site tasks finish and the
//! binary prints it once the run settles.

mod report;

pub use report::{print_run_report, RunReport, RunStatus, SiteReport, SiteStatus};
