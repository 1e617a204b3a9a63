//! Authorized region set
//!
//! The controller only ever acts inside the regions it was configured (or
//! discovered) with at start-up. Copy destinations outside the set are
//! deferred, never acted upon.

use crate::error::{Result, SnapcopyError};
use crate::store::SnapshotStore;
use std::fmt;
use tracing::info;

/// Ordered, de-duplicated list of authorized regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    regions: Vec<String>,
}

impl RegionSet {
    /// Build a set from region names; trims, lower-cases and de-duplicates
    /// while keeping first-seen order
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: Vec<String> = Vec::new();
        for region in regions {
            let region = region.as_ref().trim().to_lowercase();
            if !region.is_empty() && !set.contains(&region) {
                set.push(region);
            }
        }
        Self { regions: set }
    }

    /// Use the configured list, or ask the store once when there is none
    pub async fn resolve<S>(configured: Option<&[String]>, store: &S) -> Result<Self>
    where
        S: SnapshotStore + ?Sized,
    {
        let set = match configured {
            Some(regions) => {
                let set = Self::new(regions);
                if set.is_empty() {
                    return Err(SnapcopyError::Config(
                        "explicit region list is empty".to_string(),
                    ));
                }
                info!("Using {} configured regions: {}", set.len(), set);
                set
            }
            None => {
                let discovered = store
                    .list_regions()
                    .await
                    .map_err(|e| SnapcopyError::RegionDiscovery(e.to_string()))?;
                let set = Self::new(discovered);
                if set.is_empty() {
                    return Err(SnapcopyError::RegionDiscovery(
                        "provider returned no regions".to_string(),
                    ));
                }
                info!("Discovered {} regions: {}", set.len(), set);
                set
            }
        };

        Ok(set)
    }

    pub fn contains(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.regions.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_normalization_and_order() {
        let set = RegionSet::new(["US-East-1", " us-west-2", "us-east-1", ""]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["us-east-1", "us-west-2"]);
        assert!(set.contains("us-west-2"));
        assert!(!set.contains("eu-west-1"));
        assert_eq!(set.to_string(), "us-east-1,us-west-2");
    }

    #[tokio::test]
    async fn test_configured_list_skips_discovery() {
        let store = MemoryStore::with_regions(["ap-south-1"]);
        let configured = vec!["us-east-1".to_string()];

        let set = RegionSet::resolve(Some(configured.as_slice()), &store).await.unwrap();
        assert_eq!(set, RegionSet::new(["us-east-1"]));
    }

    #[tokio::test]
    async fn test_discovery() {
        let store = MemoryStore::with_regions(["us-east-1", "eu-west-1"]);

        let set = RegionSet::resolve(None, &store).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("eu-west-1"));
    }

    #[tokio::test]
    async fn test_empty_discovery_fails() {
        let store = MemoryStore::new();
        let err = RegionSet::resolve(None, &store).await.unwrap_err();
        assert!(matches!(err, SnapcopyError::RegionDiscovery(_)));
    }

    #[tokio::test]
    async fn test_empty_configured_list_fails() {
        let store = MemoryStore::with_regions(["us-east-1"]);
        let configured = vec![" ".to_string()];
        let err = RegionSet::resolve(Some(configured.as_slice()), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapcopyError::Config(_)));
    }
}
