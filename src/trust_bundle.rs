//! RDS trust bundle acquisition and caching.
//!
//! Connections to Amazon RDS endpoints are verified against the published
//! global certificate bundle. The bundle is downloaded once, cached under
//! `.rds-certs/` in the working directory and reused for 30 days.

mod cache;
mod source;
mod store;

pub use cache::{is_valid_pem, TrustBundleCache, TrustBundleStatus};
pub use source::{BundleSource, HttpBundleSource};
pub use store::{BundleStore, BundleWriter, FileStat, FsBundleStore, MemoryBundleStore};
