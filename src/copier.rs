//! Copy orchestrator
//!
//! Drives cross-region copies of automated snapshots according to their
//! policy tag:
//!
//! 1. Read the snapshot's tags; no policy tag means nothing to do.
//! 2. Parse and resolve the policy; anything but [`PolicyDecision::Copy`] is
//!    reported and left alone.
//! 3. Copy to every destination inside the authorized [`RegionSet`],
//!    deferring the others.
//! 4. Tag each new copy with its expiration date.
//! 5. Once every requested destination holds a copy, remove the policy tag
//!    from the source so the next pass skips it. A deferred, quota-limited
//!    or failed destination keeps the tag and is retried on the next pass.
//!
//! No failure here escapes a single destination or snapshot.

use crate::config::ControllerConfig;
use crate::expiry::format_expiration;
use crate::logging::DRY_RUN_TARGET;
use crate::metrics::RegionStats;
use crate::policy::{self, PolicyDecision, ResolvedPolicy};
use crate::regions::RegionSet;
use crate::store::{
    CopyOutcome, CopyRequest, Snapshot, SnapshotKind, SnapshotStore, StoreResult, TagSet,
};
use chrono::{Days, NaiveDate};
use tracing::{debug, error, info, warn};

/// Result of copying a snapshot into one destination region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationResult {
    /// Copy started; `tagged` is false when the expiration tag could not be set
    Created {
        arn: String,
        expires: NaiveDate,
        tagged: bool,
    },
    /// A snapshot with the target name already exists there
    AlreadyExists,
    /// Provider cross-region copy limit reached; retried next pass
    QuotaExceeded,
    /// Any other provider failure; retried next pass
    Failed(String),
    /// Dry run: the copy would have been requested
    Simulated { expires: NaiveDate },
}

impl DestinationResult {
    /// The destination holds (or, in a dry run, would hold) a copy
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            DestinationResult::Created { .. }
                | DestinationResult::AlreadyExists
                | DestinationResult::Simulated { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAttempt {
    pub region: String,
    pub result: DestinationResult,
}

/// What happened to the policy tag on the source snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTagAction {
    /// Left in place for a later pass
    Kept,
    /// Removed after every destination was settled
    Cleared,
    /// Removal was attempted and failed
    Failed(String),
    /// Dry run: the tag would have been removed
    Simulated,
}

/// Outcome of processing one automated snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCopyReport {
    /// The snapshot carries no policy tag
    Untagged,
    /// Tags could not be read
    TagReadFailed(String),
    /// Policy present but not actionable
    Skipped(PolicyDecision),
    /// Copies were attempted
    Processed {
        attempts: Vec<DestinationAttempt>,
        /// Requested destinations outside the authorized region set
        deferred: Vec<String>,
        source_tag: SourceTagAction,
    },
}

/// Name of the copy in the destination region: the identifier without its
/// provider prefix (`rds:orders-2024-05-01` -> `orders-2024-05-01`)
pub fn target_identifier(identifier: &str) -> &str {
    identifier
        .split_once(':')
        .map_or(identifier, |(_, name)| name)
}

/// `today + retention_days`, saturating at the last representable date
pub fn expiration_date(today: NaiveDate, retention_days: u32) -> NaiveDate {
    today
        .checked_add_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MAX)
}

/// Copies automated snapshots of one pass
pub struct CopyOrchestrator<'a, S: SnapshotStore + ?Sized> {
    store: &'a S,
    config: &'a ControllerConfig,
    regions: &'a RegionSet,
    today: NaiveDate,
}

impl<'a, S: SnapshotStore + ?Sized> CopyOrchestrator<'a, S> {
    pub fn new(
        store: &'a S,
        config: &'a ControllerConfig,
        regions: &'a RegionSet,
        today: NaiveDate,
    ) -> Self {
        Self {
            store,
            config,
            regions,
            today,
        }
    }

    /// Process every automated snapshot in a region
    ///
    /// Only a failed listing is returned as an error; per-snapshot problems
    /// are logged and counted in `stats`.
    pub async fn sweep_region(&self, region: &str, stats: &mut RegionStats) -> StoreResult<()> {
        let snapshots = self
            .store
            .list_snapshots(region, SnapshotKind::Automated)
            .await?;
        debug!("Found {} automated snapshots", snapshots.len());

        for snapshot in &snapshots {
            let report = self.process_snapshot(snapshot).await;
            stats.record_copy(&report);
        }

        Ok(())
    }

    /// Apply the policy of a single automated snapshot
    pub async fn process_snapshot(&self, snapshot: &Snapshot) -> SnapshotCopyReport {
        let source_id = &snapshot.identifier;

        let tags = match self.store.read_tags(&snapshot.region, &snapshot.arn).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Could not read tags of snapshot ({}): {}", source_id, e);
                return SnapshotCopyReport::TagReadFailed(e.to_string());
            }
        };

        let Some(raw) = tags.get(&self.config.tag_key) else {
            debug!(
                "Ignoring snapshot ({}) for copy, tag ({}) not found",
                source_id, self.config.tag_key
            );
            return SnapshotCopyReport::Untagged;
        };
        debug!(
            "Value for tag ({}) in the snapshot ({}) is ({})",
            self.config.tag_key, source_id, raw
        );

        let resolved = policy::evaluate(raw, self.config.default_retention_days);
        debug!(policy = ?resolved, "Resolved policy for snapshot ({})", source_id);

        match resolved.decision() {
            PolicyDecision::Copy => self.copy_to_destinations(snapshot, &resolved).await,
            PolicyDecision::Malformed => {
                error!("Parser error for snapshot ({}) [{}]", source_id, raw);
                SnapshotCopyReport::Skipped(PolicyDecision::Malformed)
            }
            PolicyDecision::NoDestination => {
                warn!("Snapshot ({}) has no destination set", source_id);
                SnapshotCopyReport::Skipped(PolicyDecision::NoDestination)
            }
            PolicyDecision::Disabled => {
                debug!("Copy disabled for snapshot ({})", source_id);
                SnapshotCopyReport::Skipped(PolicyDecision::Disabled)
            }
        }
    }

    async fn copy_to_destinations(
        &self,
        snapshot: &Snapshot,
        policy: &ResolvedPolicy,
    ) -> SnapshotCopyReport {
        let target = target_identifier(&snapshot.identifier);
        let expires = expiration_date(self.today, policy.retention_days);

        let mut attempts = Vec::with_capacity(policy.destinations.len());
        let mut deferred = Vec::new();

        for destination in &policy.destinations {
            if !self.regions.contains(destination) {
                debug!(
                    "Skipping destination ({}) for snapshot ({}): region not managed",
                    destination, snapshot.identifier
                );
                deferred.push(destination.clone());
                continue;
            }

            let result = self
                .copy_one(snapshot, target, destination, policy.copy_tags, expires)
                .await;
            attempts.push(DestinationAttempt {
                region: destination.clone(),
                result,
            });
        }

        let source_tag = if !deferred.is_empty() {
            debug!(
                "Keeping policy tag on snapshot ({}), deferred destinations: {}",
                snapshot.identifier,
                deferred.join(",")
            );
            SourceTagAction::Kept
        } else if !attempts.iter().all(|a| a.result.is_settled()) {
            debug!(
                "Keeping policy tag on snapshot ({}) until every destination holds a copy",
                snapshot.identifier
            );
            SourceTagAction::Kept
        } else {
            self.clear_source_tag(snapshot).await
        };

        SnapshotCopyReport::Processed {
            attempts,
            deferred,
            source_tag,
        }
    }

    async fn copy_one(
        &self,
        snapshot: &Snapshot,
        target: &str,
        destination: &str,
        copy_tags: bool,
        expires: NaiveDate,
    ) -> DestinationResult {
        let source_id = &snapshot.identifier;

        if self.config.dry_run {
            info!(
                target: DRY_RUN_TARGET,
                "[DRY-RUN] Would copy snapshot ({}) to ({}) as ({}), expiring {}",
                source_id, destination, target, expires
            );
            return DestinationResult::Simulated { expires };
        }

        let request = CopyRequest {
            source_arn: snapshot.arn.clone(),
            source_region: snapshot.region.clone(),
            destination_region: destination.to_string(),
            target_identifier: target.to_string(),
            copy_tags,
        };

        match self.store.copy_snapshot(&request).await {
            CopyOutcome::Created { arn } => {
                info!(
                    "Snapshot ({}) copied to ({}) as ({})",
                    source_id, destination, target
                );
                let tagged = self.tag_copy(destination, &arn, expires).await;
                DestinationResult::Created {
                    arn,
                    expires,
                    tagged,
                }
            }
            CopyOutcome::AlreadyExists => {
                info!(
                    "Snapshot with the identifier ({}) already exists in ({})",
                    target, destination
                );
                DestinationResult::AlreadyExists
            }
            CopyOutcome::QuotaExceeded => {
                info!(
                    "Skipping snapshot ({}) for ({}): cross-region copy quota reached",
                    source_id, destination
                );
                DestinationResult::QuotaExceeded
            }
            CopyOutcome::Failed(e) => {
                error!("Snapshot ({}) copy to ({}) failed: {}", source_id, destination, e);
                DestinationResult::Failed(e.to_string())
            }
        }
    }

    /// Set the expiration tag on a fresh copy; failures are left for an operator
    async fn tag_copy(&self, region: &str, arn: &str, expires: NaiveDate) -> bool {
        let mut tags = TagSet::new();
        tags.insert(self.config.tag_key.clone(), format_expiration(expires));

        match self.store.add_tags(region, arn, &tags).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Copy ({}) in ({}) was not tagged to expire on {}, tag it manually: {}",
                    arn, region, expires, e
                );
                false
            }
        }
    }

    async fn clear_source_tag(&self, snapshot: &Snapshot) -> SourceTagAction {
        if self.config.dry_run {
            info!(
                target: DRY_RUN_TARGET,
                "[DRY-RUN] Would remove tag ({}) from snapshot ({})",
                self.config.tag_key, snapshot.identifier
            );
            return SourceTagAction::Simulated;
        }

        match self
            .store
            .remove_tag(&snapshot.region, &snapshot.arn, &self.config.tag_key)
            .await
        {
            Ok(()) => {
                info!(
                    "Removed tag ({}) from snapshot ({})",
                    self.config.tag_key, snapshot.identifier
                );
                SourceTagAction::Cleared
            }
            Err(e) => {
                error!(
                    "Could not remove tag ({}) from snapshot ({}): {}",
                    self.config.tag_key, snapshot.identifier, e
                );
                SourceTagAction::Failed(e.to_string())
            }
        }
    }
}
