//! Pass metrics
//!
//! Counters for one region's sweep ([`RegionStats`]) and the aggregate of a
//! whole pass ([`PassReport`]). Both serialize to JSON for `--report-json`.

use crate::copier::{DestinationResult, SnapshotCopyReport, SourceTagAction};
use crate::error::{EXIT_PARTIAL, EXIT_SUCCESS};
use crate::expiry::ExpiryOutcome;
use crate::policy::PolicyDecision;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::time::Duration;

/// Statistics from sweeping one region
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionStats {
    /// Automated snapshots carrying a policy tag
    pub policies_found: usize,

    pub policies_disabled: usize,
    pub policies_without_destination: usize,
    pub policies_malformed: usize,

    pub copies_created: usize,
    pub copies_existing: usize,
    pub copies_quota_limited: usize,
    pub copies_failed: usize,

    /// Copies created without their expiration tag
    pub copies_untagged: usize,

    /// Destinations outside the authorized region set
    pub destinations_deferred: usize,

    pub source_tags_cleared: usize,
    pub source_tag_failures: usize,

    pub expiry_unmanaged: usize,
    pub expiry_malformed: usize,
    pub expiry_retained: usize,
    pub expired_deleted: usize,
    pub delete_failures: usize,

    pub tag_read_failures: usize,

    /// Mutations skipped because of dry run
    pub simulated_actions: usize,

    /// Listing failures that cut a sweep short
    pub sweep_errors: Vec<String>,

    pub duration: Option<Duration>,
}

impl RegionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_copy(&mut self, report: &SnapshotCopyReport) {
        match report {
            SnapshotCopyReport::Untagged => {}
            SnapshotCopyReport::TagReadFailed(_) => self.tag_read_failures += 1,
            SnapshotCopyReport::Skipped(decision) => {
                self.policies_found += 1;
                match decision {
                    PolicyDecision::Disabled => self.policies_disabled += 1,
                    PolicyDecision::NoDestination => self.policies_without_destination += 1,
                    PolicyDecision::Malformed => self.policies_malformed += 1,
                    PolicyDecision::Copy => {}
                }
            }
            SnapshotCopyReport::Processed {
                attempts,
                deferred,
                source_tag,
            } => {
                self.policies_found += 1;
                self.destinations_deferred += deferred.len();

                for attempt in attempts {
                    match &attempt.result {
                        DestinationResult::Created { tagged, .. } => {
                            self.copies_created += 1;
                            if !tagged {
                                self.copies_untagged += 1;
                            }
                        }
                        DestinationResult::AlreadyExists => self.copies_existing += 1,
                        DestinationResult::QuotaExceeded => self.copies_quota_limited += 1,
                        DestinationResult::Failed(_) => self.copies_failed += 1,
                        DestinationResult::Simulated { .. } => self.simulated_actions += 1,
                    }
                }

                match source_tag {
                    SourceTagAction::Kept => {}
                    SourceTagAction::Cleared => self.source_tags_cleared += 1,
                    SourceTagAction::Failed(_) => self.source_tag_failures += 1,
                    SourceTagAction::Simulated => self.simulated_actions += 1,
                }
            }
        }
    }

    pub fn record_expiry(&mut self, outcome: &ExpiryOutcome) {
        match outcome {
            ExpiryOutcome::TagReadFailed(_) => self.tag_read_failures += 1,
            ExpiryOutcome::Unmanaged => self.expiry_unmanaged += 1,
            ExpiryOutcome::Malformed(_) => self.expiry_malformed += 1,
            ExpiryOutcome::Retained(_) => self.expiry_retained += 1,
            ExpiryOutcome::Deleted(_) => self.expired_deleted += 1,
            ExpiryOutcome::DeleteFailed { .. } => self.delete_failures += 1,
            ExpiryOutcome::Simulated(_) => self.simulated_actions += 1,
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.sweep_errors.push(error.into());
    }

    /// Failures an operator should look at
    pub fn failures(&self) -> usize {
        self.policies_malformed
            + self.copies_failed
            + self.copies_untagged
            + self.source_tag_failures
            + self.delete_failures
            + self.tag_read_failures
            + self.sweep_errors.len()
    }

    pub fn summary(&self) -> String {
        format!(
            concat!(
                "Copies: {} created | {} existing | {} quota | {} failed | {} deferred | ",
                "Expiry: {} deleted | {} retained | {} failed"
            ),
            self.copies_created,
            self.copies_existing,
            self.copies_quota_limited,
            self.copies_failed,
            self.destinations_deferred,
            self.expired_deleted,
            self.expiry_retained,
            self.delete_failures
        )
    }
}

impl AddAssign<&RegionStats> for RegionStats {
    fn add_assign(&mut self, other: &RegionStats) {
        self.policies_found += other.policies_found;
        self.policies_disabled += other.policies_disabled;
        self.policies_without_destination += other.policies_without_destination;
        self.policies_malformed += other.policies_malformed;
        self.copies_created += other.copies_created;
        self.copies_existing += other.copies_existing;
        self.copies_quota_limited += other.copies_quota_limited;
        self.copies_failed += other.copies_failed;
        self.copies_untagged += other.copies_untagged;
        self.destinations_deferred += other.destinations_deferred;
        self.source_tags_cleared += other.source_tags_cleared;
        self.source_tag_failures += other.source_tag_failures;
        self.expiry_unmanaged += other.expiry_unmanaged;
        self.expiry_malformed += other.expiry_malformed;
        self.expiry_retained += other.expiry_retained;
        self.expired_deleted += other.expired_deleted;
        self.delete_failures += other.delete_failures;
        self.tag_read_failures += other.tag_read_failures;
        self.simulated_actions += other.simulated_actions;
        self.sweep_errors.extend(other.sweep_errors.iter().cloned());
        self.duration = match (self.duration, other.duration) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }
}

/// Result of one controller pass over every authorized region
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub today: NaiveDate,
    pub dry_run: bool,
    pub regions: BTreeMap<String, RegionStats>,
    pub duration: Option<Duration>,
}

impl PassReport {
    pub fn new(pass_id: impl Into<String>, today: NaiveDate, dry_run: bool) -> Self {
        Self {
            pass_id: pass_id.into(),
            today,
            dry_run,
            regions: BTreeMap::new(),
            duration: None,
        }
    }

    /// Counters summed over all regions (durations add up across regions)
    pub fn totals(&self) -> RegionStats {
        let mut totals = RegionStats::new();
        for stats in self.regions.values() {
            totals += stats;
        }
        totals
    }

    /// Regions whose sweep was cut short
    pub fn failed_regions(&self) -> Vec<&str> {
        self.regions
            .iter()
            .filter(|(_, stats)| !stats.sweep_errors.is_empty())
            .map(|(region, _)| region.as_str())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.regions.values().any(|stats| stats.failures() > 0)
    }

    /// Process exit code for a single-pass run
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }

    pub fn summary(&self) -> String {
        let totals = self.totals();
        format!(
            "Pass {}: {} regions ({} failed) | {}",
            self.pass_id,
            self.regions.len(),
            self.failed_regions().len(),
            totals.summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::DestinationAttempt;

    fn attempt(region: &str, result: DestinationResult) -> DestinationAttempt {
        DestinationAttempt {
            region: region.to_string(),
            result,
        }
    }

    #[test]
    fn test_record_copy_report() {
        let mut stats = RegionStats::new();
        let expires = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();

        stats.record_copy(&SnapshotCopyReport::Untagged);
        stats.record_copy(&SnapshotCopyReport::Skipped(PolicyDecision::Malformed));
        stats.record_copy(&SnapshotCopyReport::Processed {
            attempts: vec![
                attempt(
                    "us-west-2",
                    DestinationResult::Created {
                        arn: "arn".to_string(),
                        expires,
                        tagged: false,
                    },
                ),
                attempt("eu-west-1", DestinationResult::QuotaExceeded),
                attempt("eu-central-1", DestinationResult::AlreadyExists),
            ],
            deferred: vec!["ap-south-1".to_string()],
            source_tag: SourceTagAction::Kept,
        });

        assert_eq!(stats.policies_found, 2);
        assert_eq!(stats.policies_malformed, 1);
        assert_eq!(stats.copies_created, 1);
        assert_eq!(stats.copies_untagged, 1);
        assert_eq!(stats.copies_quota_limited, 1);
        assert_eq!(stats.copies_existing, 1);
        assert_eq!(stats.destinations_deferred, 1);
        assert_eq!(stats.source_tags_cleared, 0);
        // Malformed policy and untagged copy
        assert_eq!(stats.failures(), 2);
    }

    #[test]
    fn test_malformed_policy_fails_the_pass() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut stats = RegionStats::new();
        stats.record_copy(&SnapshotCopyReport::Skipped(PolicyDecision::Malformed));
        assert_eq!(stats.failures(), 1);

        let mut report = PassReport::new("pass-1", today, false);
        report.regions.insert("us-east-1".to_string(), stats);
        assert!(report.has_failures());
        assert_eq!(report.exit_code(), EXIT_PARTIAL);
    }

    #[test]
    fn test_record_expiry() {
        let mut stats = RegionStats::new();
        let d = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        stats.record_expiry(&ExpiryOutcome::Deleted(d));
        stats.record_expiry(&ExpiryOutcome::Retained(d));
        stats.record_expiry(&ExpiryOutcome::DeleteFailed {
            expired: d,
            error: "busy".to_string(),
        });

        assert_eq!(stats.expired_deleted, 1);
        assert_eq!(stats.expiry_retained, 1);
        assert_eq!(stats.delete_failures, 1);
        assert_eq!(stats.failures(), 1);
    }

    #[test]
    fn test_pass_report_totals_and_exit_code() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut report = PassReport::new("pass-1", today, false);

        let mut east = RegionStats::new();
        east.copies_created = 2;
        east.duration = Some(Duration::from_secs(1));
        let mut west = RegionStats::new();
        west.copies_created = 1;
        west.expired_deleted = 3;

        report.regions.insert("us-east-1".to_string(), east);
        report.regions.insert("us-west-2".to_string(), west.clone());
        assert_eq!(report.exit_code(), EXIT_SUCCESS);

        let totals = report.totals();
        assert_eq!(totals.copies_created, 3);
        assert_eq!(totals.expired_deleted, 3);
        assert_eq!(totals.duration, Some(Duration::from_secs(1)));

        west.record_error("listing failed: timeout");
        report.regions.insert("us-west-2".to_string(), west);
        assert_eq!(report.failed_regions(), vec!["us-west-2"]);
        assert_eq!(report.exit_code(), EXIT_PARTIAL);
        assert!(report.summary().contains("2 regions (1 failed)"));
    }

    #[test]
    fn test_report_serializes() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut report = PassReport::new("pass-1", today, true);
        report
            .regions
            .insert("us-east-1".to_string(), RegionStats::new());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["today"], "2024-05-01");
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["regions"]["us-east-1"]["copies_created"], 0);
    }
}
