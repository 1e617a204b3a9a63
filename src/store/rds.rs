//! RDS snapshot store
//!
//! Implements [`SnapshotStore`] on top of `aws-sdk-rds`, with region
//! discovery through EC2 `DescribeRegions`. A client is built per call for
//! the target region from one shared `SdkConfig`, so credentials are resolved
//! once per process.

use super::error::{StoreError, StoreResult};
use super::{CopyOutcome, CopyRequest, Snapshot, SnapshotKind, SnapshotStore, TagSet};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_rds::config::Region;
use aws_sdk_rds::types::Tag;
use aws_sdk_rds::Client as RdsClient;
use std::time::Duration;
use tracing::warn;

/// Region used for region discovery when nothing else is configured
const FALLBACK_HOME_REGION: &str = "us-east-1";

/// Connection settings for [`RdsStore`]
#[derive(Debug, Clone)]
pub struct RdsStoreConfig {
    /// Region used for account-level calls (region discovery)
    ///
    /// Falls back to the default provider chain, then `us-east-1`.
    pub home_region: Option<String>,

    /// Custom endpoint URL (for LocalStack and similar emulators)
    pub endpoint_url: Option<String>,

    /// Per-operation timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RdsStoreConfig {
    fn default() -> Self {
        Self {
            home_region: None,
            endpoint_url: None,
            timeout_seconds: 120,
        }
    }
}

/// RDS-backed snapshot store
#[derive(Clone)]
pub struct RdsStore {
    sdk_config: SdkConfig,
    config: RdsStoreConfig,
}

impl RdsStore {
    /// Load AWS configuration and create the store
    ///
    /// # Example
    ///
    /// ```no_run
    /// use snapcopy::store::{RdsStore, RdsStoreConfig};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let store = RdsStore::new(RdsStoreConfig::default()).await;
    /// }
    /// ```
    pub async fn new(config: RdsStoreConfig) -> Self {
        let region_provider = match &config.home_region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider().or_else(FALLBACK_HOME_REGION),
        };

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Self { sdk_config, config }
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &RdsStoreConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Build an RDS client bound to `region`
    fn rds_client(&self, region: &str) -> RdsClient {
        let mut builder = aws_sdk_rds::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()));

        if let Some(endpoint) = &self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let timeout_config = aws_sdk_rds::config::timeout::TimeoutConfig::builder()
            .operation_timeout(self.timeout())
            .build();
        builder = builder.timeout_config(timeout_config);

        RdsClient::from_conf(builder.build())
    }

    /// Build an EC2 client bound to the home region
    fn ec2_client(&self) -> aws_sdk_ec2::Client {
        let mut builder = aws_sdk_ec2::config::Builder::from(&self.sdk_config);

        if let Some(endpoint) = &self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let timeout_config = aws_sdk_ec2::config::timeout::TimeoutConfig::builder()
            .operation_timeout(self.timeout())
            .build();
        builder = builder.timeout_config(timeout_config);

        aws_sdk_ec2::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl SnapshotStore for RdsStore {
    async fn list_snapshots(
        &self,
        region: &str,
        kind: SnapshotKind,
    ) -> StoreResult<Vec<Snapshot>> {
        let client = self.rds_client(region);
        let mut pages = client
            .describe_db_snapshots()
            .snapshot_type(kind.as_str())
            .into_paginator()
            .send();

        let mut snapshots = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(StoreError::from)?;
            for snapshot in page.db_snapshots() {
                let (Some(identifier), Some(arn)) =
                    (snapshot.db_snapshot_identifier(), snapshot.db_snapshot_arn())
                else {
                    warn!("Skipping {} snapshot without identifier or ARN in {}", kind, region);
                    continue;
                };
                snapshots.push(Snapshot::new(identifier, arn, region, kind));
            }
        }

        Ok(snapshots)
    }

    async fn read_tags(&self, region: &str, arn: &str) -> StoreResult<TagSet> {
        let output = self
            .rds_client(region)
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await?;

        Ok(output
            .tag_list()
            .iter()
            .filter_map(|tag| {
                let key = tag.key()?.to_string();
                let value = tag.value().unwrap_or_default().to_string();
                Some((key, value))
            })
            .collect())
    }

    async fn remove_tag(&self, region: &str, arn: &str, key: &str) -> StoreResult<()> {
        self.rds_client(region)
            .remove_tags_from_resource()
            .resource_name(arn)
            .tag_keys(key)
            .send()
            .await?;
        Ok(())
    }

    async fn add_tags(&self, region: &str, arn: &str, tags: &TagSet) -> StoreResult<()> {
        let mut request = self
            .rds_client(region)
            .add_tags_to_resource()
            .resource_name(arn);

        for (key, value) in tags {
            request = request.tags(Tag::builder().key(key).value(value).build());
        }

        request.send().await?;
        Ok(())
    }

    async fn copy_snapshot(&self, request: &CopyRequest) -> CopyOutcome {
        let result = self
            .rds_client(&request.destination_region)
            .copy_db_snapshot()
            .source_db_snapshot_identifier(&request.source_arn)
            .target_db_snapshot_identifier(&request.target_identifier)
            .copy_tags(request.copy_tags)
            .send()
            .await;

        match result {
            Ok(output) => match output.db_snapshot().and_then(|s| s.db_snapshot_arn()) {
                Some(arn) => CopyOutcome::Created {
                    arn: arn.to_string(),
                },
                None => CopyOutcome::Failed(StoreError::InvalidResponse(format!(
                    "copy of {} into {} returned no snapshot ARN",
                    request.source_arn, request.destination_region
                ))),
            },
            Err(e) => CopyOutcome::from_error(StoreError::from(e)),
        }
    }

    async fn delete_snapshot(&self, region: &str, identifier: &str) -> StoreResult<()> {
        self.rds_client(region)
            .delete_db_snapshot()
            .db_snapshot_identifier(identifier)
            .send()
            .await?;
        Ok(())
    }

    async fn list_regions(&self) -> StoreResult<Vec<String>> {
        let output = self.ec2_client().describe_regions().send().await?;

        Ok(output
            .regions()
            .iter()
            .filter_map(|region| region.region_name().map(str::to_string))
            .collect())
    }
}
