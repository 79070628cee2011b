//! Declarative record post-processing
//!
//! Operations run in their declared order over a site's gathered batch,
//! after the crawl and before storage. They are pure: no fetching, no IO,
//! and the output depends only on the batch and the operation list.

mod ops;

pub use ops::process;
