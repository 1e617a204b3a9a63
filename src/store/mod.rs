//! Snapshot store abstraction
//!
//! The controller never talks to a provider SDK directly. Every listing,
//! tag read/write, copy and delete goes through the [`SnapshotStore`] trait,
//! which has two implementations:
//!
//! - `RdsStore`: AWS RDS via `aws-sdk-rds` (feature `rds`)
//! - [`MemoryStore`]: in-memory store with failure injection, for tests
//!
//! All operations are scoped to a single region. Nothing is cached: each call
//! is a fresh query against the remote store.
//!
//! # Example
//!
//! ```no_run
//! use snapcopy::store::{MemoryStore, SnapshotKind, SnapshotStore};
//!
//! # async fn example() -> snapcopy::store::StoreResult<()> {
//! let store = MemoryStore::new();
//! store.add_snapshot("us-east-1", "rds:orders-2024-05-01-03-10", SnapshotKind::Automated, &[]);
//!
//! for snapshot in store.list_snapshots("us-east-1", SnapshotKind::Automated).await? {
//!     let tags = store.read_tags(&snapshot.region, &snapshot.arn).await?;
//!     println!("{} has {} tags", snapshot.identifier, tags.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod memory;

#[cfg(feature = "rds")]
mod rds;

pub use error::{StoreError, StoreResult, SNAPSHOT_ALREADY_EXISTS, SNAPSHOT_QUOTA_EXCEEDED};
pub use memory::{MemoryStore, StoreCall};

#[cfg(feature = "rds")]
pub use rds::{RdsStore, RdsStoreConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tags attached to a snapshot, keyed by tag name
pub type TagSet = HashMap<String, String>;

/// Snapshot origin as understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Taken by the provider on a schedule; copied, never deleted here
    Automated,
    /// Created as a copy target or by hand; eligible for expiry
    Manual,
}

impl SnapshotKind {
    /// Provider-side snapshot type filter
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Automated => "automated",
            SnapshotKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot as returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Provider-scoped identifier (e.g. `rds:orders-2024-05-01-03-10`)
    pub identifier: String,

    /// Globally addressable resource reference
    pub arn: String,

    /// Region the snapshot lives in
    pub region: String,

    pub kind: SnapshotKind,
}

impl Snapshot {
    pub fn new(
        identifier: impl Into<String>,
        arn: impl Into<String>,
        region: impl Into<String>,
        kind: SnapshotKind,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            arn: arn.into(),
            region: region.into(),
            kind,
        }
    }
}

/// A cross-region copy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Resource reference of the snapshot being copied
    pub source_arn: String,

    /// Region of the snapshot being copied
    pub source_region: String,

    /// Region the copy is created in
    pub destination_region: String,

    /// Identifier of the new snapshot in the destination region
    pub target_identifier: String,

    /// Propagate the source snapshot's tags to the copy
    pub copy_tags: bool,
}

/// Classified result of a copy request
///
/// Duplicate names and quota limits are expected steady-state answers from
/// the provider, so they are outcomes rather than errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Copy started; carries the resource reference of the new snapshot
    Created { arn: String },

    /// A snapshot with the target identifier already exists
    AlreadyExists,

    /// Provider limit on concurrent cross-region copies reached
    QuotaExceeded,

    /// Any other provider failure
    Failed(StoreError),
}

impl CopyOutcome {
    /// Classify a failed copy call by its provider error code
    pub fn from_error(error: StoreError) -> Self {
        match error.code() {
            Some(SNAPSHOT_ALREADY_EXISTS) => CopyOutcome::AlreadyExists,
            Some(SNAPSHOT_QUOTA_EXCEEDED) => CopyOutcome::QuotaExceeded,
            _ => CopyOutcome::Failed(error),
        }
    }
}

/// Remote snapshot store operations, all scoped to one region
///
/// Implementors must be `Send + Sync` so a store can be shared by
/// per-region workers.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// List every snapshot of the given kind in a region
    ///
    /// Implementations follow provider pagination until exhausted.
    async fn list_snapshots(&self, region: &str, kind: SnapshotKind)
        -> StoreResult<Vec<Snapshot>>;

    /// Read the current tags of a resource
    async fn read_tags(&self, region: &str, arn: &str) -> StoreResult<TagSet>;

    /// Remove a single tag from a resource
    async fn remove_tag(&self, region: &str, arn: &str, key: &str) -> StoreResult<()>;

    /// Add (or overwrite) tags on a resource
    async fn add_tags(&self, region: &str, arn: &str, tags: &TagSet) -> StoreResult<()>;

    /// Copy a snapshot into `request.destination_region`
    async fn copy_snapshot(&self, request: &CopyRequest) -> CopyOutcome;

    /// Delete a snapshot by identifier
    async fn delete_snapshot(&self, region: &str, identifier: &str) -> StoreResult<()>;

    /// List regions available to the account
    async fn list_regions(&self) -> StoreResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_outcome_classification() {
        assert_eq!(
            CopyOutcome::from_error(StoreError::service(SNAPSHOT_ALREADY_EXISTS, "taken")),
            CopyOutcome::AlreadyExists
        );
        assert_eq!(
            CopyOutcome::from_error(StoreError::service(SNAPSHOT_QUOTA_EXCEEDED, "limit 5")),
            CopyOutcome::QuotaExceeded
        );

        let other = StoreError::service("AccessDenied", "not allowed");
        assert_eq!(
            CopyOutcome::from_error(other.clone()),
            CopyOutcome::Failed(other)
        );

        let network = StoreError::Network("reset".to_string());
        assert!(matches!(
            CopyOutcome::from_error(network),
            CopyOutcome::Failed(StoreError::Network(_))
        ));
    }

    #[test]
    fn test_snapshot_kind_names() {
        assert_eq!(SnapshotKind::Automated.as_str(), "automated");
        assert_eq!(SnapshotKind::Manual.to_string(), "manual");
    }
}
