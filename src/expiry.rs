//! Expiry sweeper
//!
//! Manual snapshots carrying the well-known tag hold their expiration date
//! in it (`YYYY-MM-DD`). Snapshots whose date is on or before today are
//! deleted; unparseable values are reported and left untouched.

use crate::config::ControllerConfig;
use crate::logging::DRY_RUN_TARGET;
use crate::metrics::RegionStats;
use crate::store::{Snapshot, SnapshotKind, SnapshotStore, StoreResult, TagSet};
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

/// Date format of the expiration tag value
pub const EXPIRATION_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_expiration(date: NaiveDate) -> String {
    date.format(EXPIRATION_DATE_FORMAT).to_string()
}

pub fn parse_expiration(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), EXPIRATION_DATE_FORMAT).ok()
}

/// Expiry state of a manual snapshot, derived from its tags alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryDecision {
    /// No expiration tag
    Unmanaged,
    /// Tag present but not a date; carries the raw value
    Malformed(String),
    /// Expires after today
    Retain(NaiveDate),
    /// Expiration date is today or earlier
    Expired(NaiveDate),
}

/// Decide what to do with a manual snapshot on `today`
pub fn evaluate_expiry(tags: &TagSet, tag_key: &str, today: NaiveDate) -> ExpiryDecision {
    let Some(value) = tags.get(tag_key) else {
        return ExpiryDecision::Unmanaged;
    };

    match parse_expiration(value) {
        None => ExpiryDecision::Malformed(value.clone()),
        Some(date) if date <= today => ExpiryDecision::Expired(date),
        Some(date) => ExpiryDecision::Retain(date),
    }
}

/// What the sweeper did with one manual snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    TagReadFailed(String),
    Unmanaged,
    Malformed(String),
    Retained(NaiveDate),
    Deleted(NaiveDate),
    DeleteFailed { expired: NaiveDate, error: String },
    /// Dry run: the snapshot would have been deleted
    Simulated(NaiveDate),
}

/// Deletes expired manual snapshots of one pass
pub struct ExpirySweeper<'a, S: SnapshotStore + ?Sized> {
    store: &'a S,
    config: &'a ControllerConfig,
    today: NaiveDate,
}

impl<'a, S: SnapshotStore + ?Sized> ExpirySweeper<'a, S> {
    pub fn new(store: &'a S, config: &'a ControllerConfig, today: NaiveDate) -> Self {
        Self {
            store,
            config,
            today,
        }
    }

    /// Check every manual snapshot in a region
    pub async fn sweep_region(&self, region: &str, stats: &mut RegionStats) -> StoreResult<()> {
        let snapshots = self.store.list_snapshots(region, SnapshotKind::Manual).await?;
        debug!("Found {} manual snapshots", snapshots.len());

        for snapshot in &snapshots {
            let outcome = self.process_snapshot(snapshot).await;
            stats.record_expiry(&outcome);
        }

        Ok(())
    }

    pub async fn process_snapshot(&self, snapshot: &Snapshot) -> ExpiryOutcome {
        let id = &snapshot.identifier;

        let tags = match self.store.read_tags(&snapshot.region, &snapshot.arn).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Could not read tags of snapshot ({}): {}", id, e);
                return ExpiryOutcome::TagReadFailed(e.to_string());
            }
        };

        match evaluate_expiry(&tags, &self.config.tag_key, self.today) {
            ExpiryDecision::Unmanaged => {
                debug!(
                    "Ignoring snapshot ({}) for expiry, tag ({}) not found",
                    id, self.config.tag_key
                );
                ExpiryOutcome::Unmanaged
            }
            ExpiryDecision::Malformed(value) => {
                error!(
                    "Snapshot ({}) has an unparseable expiration date ({})",
                    id, value
                );
                ExpiryOutcome::Malformed(value)
            }
            ExpiryDecision::Retain(date) => {
                debug!("Keeping snapshot ({}) until {}", id, date);
                ExpiryOutcome::Retained(date)
            }
            ExpiryDecision::Expired(date) => self.delete(snapshot, date).await,
        }
    }

    async fn delete(&self, snapshot: &Snapshot, expired: NaiveDate) -> ExpiryOutcome {
        let id = &snapshot.identifier;

        if self.config.dry_run {
            info!(
                target: DRY_RUN_TARGET,
                "[DRY-RUN] Would delete snapshot ({}) in ({}), expired {}",
                id, snapshot.region, expired
            );
            return ExpiryOutcome::Simulated(expired);
        }

        match self.store.delete_snapshot(&snapshot.region, id).await {
            Ok(()) => {
                warn!("Snapshot ({}) expired on {} and was deleted", id, expired);
                ExpiryOutcome::Deleted(expired)
            }
            Err(e) => {
                error!("Could not delete expired snapshot ({}): {}", id, e);
                ExpiryOutcome::DeleteFailed {
                    expired,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TAG_KEY;
    use crate::logging::init_test_logging;
    use crate::store::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tags(value: &str) -> TagSet {
        TagSet::from([(DEFAULT_TAG_KEY.to_string(), value.to_string())])
    }

    #[test]
    fn test_evaluate_expiry() {
        let today = date(2024, 5, 10);

        assert_eq!(
            evaluate_expiry(&TagSet::new(), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Unmanaged
        );
        assert_eq!(
            evaluate_expiry(&tags("2024-05-09"), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Expired(date(2024, 5, 9))
        );
        assert_eq!(
            evaluate_expiry(&tags("2024-05-10"), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Expired(today)
        );
        assert_eq!(
            evaluate_expiry(&tags("2024-05-11"), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Retain(date(2024, 5, 11))
        );
        assert_eq!(
            evaluate_expiry(&tags("enable=yes:copyto=us-west-2"), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Malformed("enable=yes:copyto=us-west-2".to_string())
        );
        assert_eq!(
            evaluate_expiry(&tags("2024-13-01"), DEFAULT_TAG_KEY, today),
            ExpiryDecision::Malformed("2024-13-01".to_string())
        );
    }

    #[test]
    fn test_format_is_stable() {
        let d = date(2024, 1, 5);
        assert_eq!(format_expiration(d), "2024-01-05");
        assert_eq!(parse_expiration(" 2024-01-05 "), Some(d));
        assert_eq!(parse_expiration("05/01/2024"), None);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired() {
        init_test_logging();
        let store = MemoryStore::new();
        let tagged = [
            ("old", "2024-05-01"),
            ("fresh", "2024-06-01"),
            ("garbled", "soon"),
        ];
        for (identifier, expires) in tagged {
            store.add_snapshot(
                "us-west-2",
                identifier,
                SnapshotKind::Manual,
                &[(DEFAULT_TAG_KEY, expires)],
            );
        }
        store.add_snapshot("us-west-2", "handmade", SnapshotKind::Manual, &[]);
        store.add_snapshot(
            "us-west-2",
            "rds:auto",
            SnapshotKind::Automated,
            &[(DEFAULT_TAG_KEY, "2020-01-01")],
        );

        let config = ControllerConfig::default();
        let mut stats = RegionStats::default();
        ExpirySweeper::new(&store, &config, date(2024, 5, 10))
            .sweep_region("us-west-2", &mut stats)
            .await
            .unwrap();

        assert_eq!(store.deletions(), vec!["old"]);
        assert!(store.contains("us-west-2", "fresh"));
        assert!(store.contains("us-west-2", "garbled"));
        assert!(store.contains("us-west-2", "rds:auto"));
        assert_eq!(stats.expired_deleted, 1);
        assert_eq!(stats.expiry_retained, 1);
        assert_eq!(stats.expiry_malformed, 1);
        assert_eq!(stats.expiry_unmanaged, 1);
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        init_test_logging();
        let store = MemoryStore::new();
        let arn = store.add_snapshot(
            "us-west-2",
            "stuck",
            SnapshotKind::Manual,
            &[(DEFAULT_TAG_KEY, "2024-05-01")],
        );
        store.fail_delete("stuck");
        let snapshot = Snapshot::new("stuck", arn, "us-west-2", SnapshotKind::Manual);

        let config = ControllerConfig::default();
        let outcome = ExpirySweeper::new(&store, &config, date(2024, 5, 10))
            .process_snapshot(&snapshot)
            .await;

        assert!(matches!(outcome, ExpiryOutcome::DeleteFailed { .. }));
        assert!(store.contains("us-west-2", "stuck"));
    }

    #[tokio::test]
    async fn test_dry_run_keeps_expired() {
        init_test_logging();
        let store = MemoryStore::new();
        let arn = store.add_snapshot(
            "us-west-2",
            "old",
            SnapshotKind::Manual,
            &[(DEFAULT_TAG_KEY, "2024-05-01")],
        );
        let snapshot = Snapshot::new("old", arn, "us-west-2", SnapshotKind::Manual);

        let config = ControllerConfig {
            dry_run: true,
            ..ControllerConfig::default()
        };
        let outcome = ExpirySweeper::new(&store, &config, date(2024, 5, 10))
            .process_snapshot(&snapshot)
            .await;

        assert_eq!(outcome, ExpiryOutcome::Simulated(date(2024, 5, 1)));
        assert!(store.calls().is_empty());
    }
}
