//! Controller: the pass loop
//!
//! A pass sweeps every authorized region: first the copy orchestrator over
//! automated snapshots, then the expiry sweeper over manual ones. Each region
//! runs as its own task, so a failing or panicking region only shows up in
//! its own [`RegionStats`]. Concurrency is bounded by
//! `max_parallel_regions` (1 = one region at a time).

use crate::config::ControllerConfig;
use crate::copier::CopyOrchestrator;
use crate::error::{Result, SnapcopyError};
use crate::expiry::ExpirySweeper;
use crate::metrics::{PassReport, RegionStats};
use crate::regions::RegionSet;
use crate::store::SnapshotStore;
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives passes over a snapshot store
///
/// ```no_run
/// # use snapcopy::{Controller, ControllerConfig, MemoryStore};
/// # use std::sync::Arc;
/// # async fn example() -> snapcopy::Result<()> {
/// let config = ControllerConfig::default().with_regions(["us-east-1", "us-west-2"]);
/// let controller = Controller::connect(Arc::new(MemoryStore::new()), config).await?;
///
/// let report = controller.run_once().await;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
pub struct Controller<S: SnapshotStore> {
    store: Arc<S>,
    config: Arc<ControllerConfig>,
    regions: Arc<RegionSet>,
}

impl<S: SnapshotStore> Controller<S> {
    /// Create a controller over an already resolved region set
    pub fn new(store: Arc<S>, config: ControllerConfig, regions: RegionSet) -> Result<Self> {
        config.validate()?;
        if regions.is_empty() {
            return Err(SnapcopyError::Config(
                "authorized region set is empty".to_string(),
            ));
        }

        Ok(Self {
            store,
            config: Arc::new(config),
            regions: Arc::new(regions),
        })
    }

    /// Create a controller, resolving the region set from the configuration
    /// or, when none is configured, from the store
    pub async fn connect(store: Arc<S>, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let regions = RegionSet::resolve(config.regions.as_deref(), store.as_ref()).await?;
        Self::new(store, config, regions)
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one pass dated today (UTC)
    pub async fn run_once(&self) -> PassReport {
        self.run_pass(Utc::now().date_naive()).await
    }

    /// Run one pass over every authorized region
    ///
    /// Never fails as a whole: per-region failures are recorded in the
    /// returned report.
    pub async fn run_pass(&self, today: NaiveDate) -> PassReport {
        let pass_id = Uuid::new_v4().to_string();
        let span = info_span!("pass", pass_id = %pass_id, %today);

        async move {
            let started = Instant::now();
            info!(
                "Starting pass over {} regions ({}){}",
                self.regions.len(),
                self.regions,
                if self.config.dry_run { " [dry run]" } else { "" }
            );

            let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_regions));
            let mut handles = Vec::with_capacity(self.regions.len());

            for region in self.regions.iter() {
                let region = region.to_string();
                let store = Arc::clone(&self.store);
                let config = Arc::clone(&self.config);
                let regions = Arc::clone(&self.regions);
                let semaphore = Arc::clone(&semaphore);
                let task_region = region.clone();

                let handle = tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        sweep_region(store.as_ref(), &config, &regions, &task_region, today).await
                    }
                    .in_current_span(),
                );
                handles.push((region, handle));
            }

            let mut report = PassReport::new(pass_id.clone(), today, self.config.dry_run);
            for (region, handle) in handles {
                let stats = match handle.await {
                    Ok(stats) => stats,
                    Err(e) => {
                        error!(region = %region, "Region sweep aborted: {}", e);
                        let mut stats = RegionStats::new();
                        stats.record_error(format!("sweep aborted: {}", e));
                        stats
                    }
                };
                report.regions.insert(region, stats);
            }

            report.duration = Some(started.elapsed());
            info!("{}", report.summary());

            let failed = report.failed_regions();
            if !failed.is_empty() {
                warn!("Regions with incomplete sweeps: {}", failed.join(","));
            }

            report
        }
        .instrument(span)
        .await
    }

    /// Run passes every `interval` until Ctrl-C
    ///
    /// A pass in flight is allowed to finish before shutting down.
    pub async fn run(&self, interval: Duration) -> u64 {
        let shutdown = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => {
                    error!("Could not listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        self.run_until(interval, shutdown).await
    }

    /// Run passes every `interval` until `shutdown` resolves; returns the
    /// number of passes completed
    pub async fn run_until<F>(&self, interval: Duration, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        info!(
            "Controller active | Regions: {} | Interval: {}s | Parallel regions: {} | Dry run: {}",
            self.regions,
            interval.as_secs(),
            self.config.max_parallel_regions,
            self.config.dry_run
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut passes = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                    passes += 1;
                }
            }
        }

        info!("Controller stopped after {} passes", passes);
        passes
    }
}

/// Copy sweep then expiry sweep for one region
///
/// A failed listing cuts the corresponding sweep short but never the other.
async fn sweep_region<S: SnapshotStore + ?Sized>(
    store: &S,
    config: &ControllerConfig,
    regions: &RegionSet,
    region: &str,
    today: NaiveDate,
) -> RegionStats {
    let span = info_span!("region", region = %region);

    async move {
        let started = Instant::now();
        let mut stats = RegionStats::new();

        if let Err(e) = CopyOrchestrator::new(store, config, regions, today)
            .sweep_region(region, &mut stats)
            .await
        {
            error!("Could not list automated snapshots: {}", e);
            stats.record_error(format!("automated snapshot listing failed: {}", e));
        }

        if let Err(e) = ExpirySweeper::new(store, config, today)
            .sweep_region(region, &mut stats)
            .await
        {
            error!("Could not list manual snapshots: {}", e);
            stats.record_error(format!("manual snapshot listing failed: {}", e));
        }

        stats.duration = Some(started.elapsed());
        info!("{}", stats.summary());
        stats
    }
    .instrument(span)
    .await
}
