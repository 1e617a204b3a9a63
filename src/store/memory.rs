//! In-memory snapshot store
//!
//! Keeps region-scoped snapshots and their tags in memory and behaves like the
//! provider for the operations the controller uses: copying onto an existing
//! identifier yields `AlreadyExists`, deleting a missing snapshot fails, and
//! so on. Failures can be injected per region, per resource and per copy
//! destination. Every mutating call is recorded so tests can assert on what
//! the controller actually did.

use super::error::{StoreError, StoreResult};
use super::{CopyOutcome, CopyRequest, Snapshot, SnapshotKind, SnapshotStore, TagSet};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Account id used when minting resource references
const ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Clone)]
struct StoredSnapshot {
    arn: String,
    kind: SnapshotKind,
    tags: TagSet,
}

/// A mutating call observed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Copy(CopyRequest),
    AddTags { region: String, arn: String, tags: TagSet },
    RemoveTag { region: String, arn: String, key: String },
    Delete { region: String, identifier: String },
}

#[derive(Debug, Default)]
struct State {
    /// region -> identifier -> snapshot
    snapshots: BTreeMap<String, BTreeMap<String, StoredSnapshot>>,
    available_regions: Vec<String>,
    scripted_copies: HashMap<String, CopyOutcome>,
    failing_listings: HashSet<String>,
    failing_tag_writes: HashSet<String>,
    failing_deletes: HashSet<String>,
    calls: Vec<StoreCall>,
}

/// In-memory [`SnapshotStore`] implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

/// Resource reference for a snapshot in the given region
fn snapshot_arn(region: &str, identifier: &str) -> String {
    format!("arn:aws:rds:{}:{}:snapshot:{}", region, ACCOUNT_ID, identifier)
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that reports the given regions as available
    pub fn with_regions<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.write().available_regions = regions.into_iter().map(Into::into).collect();
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a snapshot and return its resource reference
    pub fn add_snapshot(
        &self,
        region: &str,
        identifier: &str,
        kind: SnapshotKind,
        tags: &[(&str, &str)],
    ) -> String {
        let arn = snapshot_arn(region, identifier);
        let snapshot = StoredSnapshot {
            arn: arn.clone(),
            kind,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.write()
            .snapshots
            .entry(region.to_string())
            .or_default()
            .insert(identifier.to_string(), snapshot);
        arn
    }

    /// Answer every copy into `destination` with a fixed outcome
    pub fn script_copy(&self, destination: &str, outcome: CopyOutcome) {
        self.write()
            .scripted_copies
            .insert(destination.to_string(), outcome);
    }

    /// Drop a scripted outcome so copies to `destination` behave normally again
    pub fn unscript_copy(&self, destination: &str) {
        self.write().scripted_copies.remove(destination);
    }

    /// Make listings in a region fail with a network error
    pub fn fail_listing(&self, region: &str) {
        self.write().failing_listings.insert(region.to_string());
    }

    /// Make tag writes (add and remove) on a resource fail
    pub fn fail_tag_writes(&self, arn: &str) {
        self.write().failing_tag_writes.insert(arn.to_string());
    }

    /// Make deletion of a snapshot identifier fail
    pub fn fail_delete(&self, identifier: &str) {
        self.write().failing_deletes.insert(identifier.to_string());
    }

    /// Check whether a snapshot exists
    pub fn contains(&self, region: &str, identifier: &str) -> bool {
        self.read()
            .snapshots
            .get(region)
            .is_some_and(|snapshots| snapshots.contains_key(identifier))
    }

    /// Current tags of a snapshot (for assertions)
    pub fn tags_of(&self, region: &str, identifier: &str) -> Option<TagSet> {
        self.read()
            .snapshots
            .get(region)
            .and_then(|snapshots| snapshots.get(identifier))
            .map(|snapshot| snapshot.tags.clone())
    }

    /// Number of snapshots held in a region
    pub fn snapshot_count(&self, region: &str) -> usize {
        self.read().snapshots.get(region).map_or(0, BTreeMap::len)
    }

    /// All mutating calls observed so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.read().calls.clone()
    }

    /// Copy requests observed so far, in order
    pub fn copy_requests(&self) -> Vec<CopyRequest> {
        self.read()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::Copy(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Deleted snapshot identifiers observed so far, in order
    pub fn deletions(&self) -> Vec<String> {
        self.read()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::Delete { identifier, .. } => Some(identifier.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.write().calls.clear();
    }
}

/// Locate a snapshot by resource reference within a region
fn find_by_arn<'a>(
    state: &'a mut State,
    region: &str,
    arn: &str,
) -> StoreResult<&'a mut StoredSnapshot> {
    state
        .snapshots
        .get_mut(region)
        .and_then(|snapshots| snapshots.values_mut().find(|s| s.arn == arn))
        .ok_or_else(|| StoreError::NotFound(arn.to_string()))
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn list_snapshots(
        &self,
        region: &str,
        kind: SnapshotKind,
    ) -> StoreResult<Vec<Snapshot>> {
        let state = self.read();
        if state.failing_listings.contains(region) {
            return Err(StoreError::Network(format!(
                "endpoint for {} unreachable",
                region
            )));
        }

        Ok(state
            .snapshots
            .get(region)
            .into_iter()
            .flatten()
            .filter(|(_, snapshot)| snapshot.kind == kind)
            .map(|(identifier, snapshot)| {
                Snapshot::new(identifier.clone(), snapshot.arn.clone(), region, kind)
            })
            .collect())
    }

    async fn read_tags(&self, region: &str, arn: &str) -> StoreResult<TagSet> {
        let mut state = self.write();
        Ok(find_by_arn(&mut state, region, arn)?.tags.clone())
    }

    async fn remove_tag(&self, region: &str, arn: &str, key: &str) -> StoreResult<()> {
        let mut state = self.write();
        state.calls.push(StoreCall::RemoveTag {
            region: region.to_string(),
            arn: arn.to_string(),
            key: key.to_string(),
        });
        if state.failing_tag_writes.contains(arn) {
            return Err(StoreError::service("InternalFailure", "tag write rejected"));
        }
        find_by_arn(&mut state, region, arn)?.tags.remove(key);
        Ok(())
    }

    async fn add_tags(&self, region: &str, arn: &str, tags: &TagSet) -> StoreResult<()> {
        let mut state = self.write();
        state.calls.push(StoreCall::AddTags {
            region: region.to_string(),
            arn: arn.to_string(),
            tags: tags.clone(),
        });
        if state.failing_tag_writes.contains(arn) {
            return Err(StoreError::service("InternalFailure", "tag write rejected"));
        }
        let snapshot = find_by_arn(&mut state, region, arn)?;
        snapshot
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn copy_snapshot(&self, request: &CopyRequest) -> CopyOutcome {
        let mut state = self.write();
        state.calls.push(StoreCall::Copy(request.clone()));

        if let Some(outcome) = state.scripted_copies.get(&request.destination_region) {
            return outcome.clone();
        }

        let source_tags = match find_by_arn(&mut state, &request.source_region, &request.source_arn)
        {
            Ok(source) => source.tags.clone(),
            Err(e) => return CopyOutcome::Failed(e),
        };

        let destination = state
            .snapshots
            .entry(request.destination_region.clone())
            .or_default();
        if destination.contains_key(&request.target_identifier) {
            return CopyOutcome::AlreadyExists;
        }

        let arn = snapshot_arn(&request.destination_region, &request.target_identifier);
        destination.insert(
            request.target_identifier.clone(),
            StoredSnapshot {
                arn: arn.clone(),
                kind: SnapshotKind::Manual,
                tags: if request.copy_tags {
                    source_tags
                } else {
                    TagSet::new()
                },
            },
        );
        CopyOutcome::Created { arn }
    }

    async fn delete_snapshot(&self, region: &str, identifier: &str) -> StoreResult<()> {
        let mut state = self.write();
        state.calls.push(StoreCall::Delete {
            region: region.to_string(),
            identifier: identifier.to_string(),
        });
        if state.failing_deletes.contains(identifier) {
            return Err(StoreError::service(
                "InvalidDBSnapshotState",
                "snapshot is not in available state",
            ));
        }
        state
            .snapshots
            .get_mut(region)
            .and_then(|snapshots| snapshots.remove(identifier))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(identifier.to_string()))
    }

    async fn list_regions(&self) -> StoreResult<Vec<String>> {
        Ok(self.read().available_regions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_request(destination: &str, source_arn: &str, copy_tags: bool) -> CopyRequest {
        CopyRequest {
            source_arn: source_arn.to_string(),
            source_region: "us-east-1".to_string(),
            destination_region: destination.to_string(),
            target_identifier: "orders-2024-05-01".to_string(),
            copy_tags,
        }
    }

    #[tokio::test]
    async fn test_listing_filters_by_kind() {
        let store = MemoryStore::new();
        store.add_snapshot("us-east-1", "rds:a", SnapshotKind::Automated, &[]);
        store.add_snapshot("us-east-1", "b", SnapshotKind::Manual, &[]);
        store.add_snapshot("us-west-2", "rds:c", SnapshotKind::Automated, &[]);

        let automated = store
            .list_snapshots("us-east-1", SnapshotKind::Automated)
            .await
            .unwrap();
        assert_eq!(automated.len(), 1);
        assert_eq!(automated[0].identifier, "rds:a");
        assert_eq!(automated[0].region, "us-east-1");

        let empty = store
            .list_snapshots("eu-west-1", SnapshotKind::Manual)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_copy_then_duplicate() {
        let store = MemoryStore::new();
        let source = store.add_snapshot(
            "us-east-1",
            "rds:orders-2024-05-01",
            SnapshotKind::Automated,
            &[("team", "billing")],
        );

        let first = store
            .copy_snapshot(&copy_request("us-west-2", &source, true))
            .await;
        let CopyOutcome::Created { arn } = first else {
            panic!("expected Created, got {:?}", first);
        };
        assert!(arn.contains("us-west-2"));
        let copied = store.tags_of("us-west-2", "orders-2024-05-01").unwrap();
        assert_eq!(copied.get("team").map(String::as_str), Some("billing"));

        let second = store
            .copy_snapshot(&copy_request("us-west-2", &source, true))
            .await;
        assert_eq!(second, CopyOutcome::AlreadyExists);
        assert_eq!(store.copy_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_without_tags() {
        let store = MemoryStore::new();
        let source = store.add_snapshot(
            "us-east-1",
            "rds:orders-2024-05-01",
            SnapshotKind::Automated,
            &[("team", "billing")],
        );

        store
            .copy_snapshot(&copy_request("us-west-2", &source, false))
            .await;
        assert!(store
            .tags_of("us-west-2", "orders-2024-05-01")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scripted_copy_outcome() {
        let store = MemoryStore::new();
        let source = store.add_snapshot("us-east-1", "rds:x", SnapshotKind::Automated, &[]);
        store.script_copy("us-west-2", CopyOutcome::QuotaExceeded);

        let outcome = store
            .copy_snapshot(&copy_request("us-west-2", &source, true))
            .await;
        assert_eq!(outcome, CopyOutcome::QuotaExceeded);
        assert!(!store.contains("us-west-2", "orders-2024-05-01"));
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let store = MemoryStore::new();
        let outcome = store
            .copy_snapshot(&copy_request("us-west-2", "arn:missing", true))
            .await;
        assert!(matches!(outcome, CopyOutcome::Failed(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tag_writes_and_failures() {
        let store = MemoryStore::new();
        let arn = store.add_snapshot("us-east-1", "snap", SnapshotKind::Manual, &[("k", "v")]);

        let mut tags = TagSet::new();
        tags.insert("expires".to_string(), "2024-01-01".to_string());
        store.add_tags("us-east-1", &arn, &tags).await.unwrap();
        store.remove_tag("us-east-1", &arn, "k").await.unwrap();

        let current = store.read_tags("us-east-1", &arn).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current.get("expires").map(String::as_str), Some("2024-01-01"));

        store.fail_tag_writes(&arn);
        assert!(store.remove_tag("us-east-1", &arn, "expires").await.is_err());
        assert_eq!(store.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.add_snapshot("us-east-1", "snap", SnapshotKind::Manual, &[]);
        store.add_snapshot("us-east-1", "stuck", SnapshotKind::Manual, &[]);
        store.fail_delete("stuck");

        store.delete_snapshot("us-east-1", "snap").await.unwrap();
        assert!(!store.contains("us-east-1", "snap"));
        assert!(store.delete_snapshot("us-east-1", "snap").await.is_err());
        assert!(store.delete_snapshot("us-east-1", "stuck").await.is_err());
        assert!(store.contains("us-east-1", "stuck"));
        assert_eq!(store.deletions(), vec!["snap", "snap", "stuck"]);
    }

    #[tokio::test]
    async fn test_failing_listing() {
        let store = MemoryStore::with_regions(["us-east-1"]);
        store.fail_listing("us-east-1");
        let err = store
            .list_snapshots("us-east-1", SnapshotKind::Automated)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.list_regions().await.unwrap(), vec!["us-east-1"]);
    }
}
