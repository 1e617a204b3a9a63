/*!
 * snapcopy - tag-driven snapshot replication and retention
 *
 * A controller that, on every pass over a set of authorized regions:
 * - Reads a copy policy from a well-known tag on automated snapshots
 * - Copies those snapshots to the requested destination regions
 * - Tags each copy with an expiration date
 * - Removes the policy tag once every destination holds a copy
 * - Deletes manual snapshots whose expiration date has passed
 *
 * The provider is reached through the `SnapshotStore` trait; AWS RDS is the
 * native backend (feature `rds`), an in-memory store backs the tests.
 *
 * Version: 0.3.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod config;
pub mod copier;
pub mod daemon;
pub mod error;
pub mod expiry;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod regions;
pub mod store;

// Re-export commonly used types
pub use config::{ControllerConfig, LogFormat, LogLevel, LoggingConfig};
pub use daemon::Controller;
pub use error::{Result, SnapcopyError};
pub use metrics::{PassReport, RegionStats};
pub use policy::{PolicyDecision, ResolvedPolicy};
pub use regions::RegionSet;
pub use store::{MemoryStore, SnapshotStore};

#[cfg(feature = "rds")]
pub use store::{RdsStore, RdsStoreConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
