//! snapcopy - cross-region copy and expiry controller for RDS snapshots.
//!
//! Runs a single pass and exits, or keeps running passes on an interval.
//! Exit codes: 0 = clean pass, 1 = pass with failures, 2 = fatal error.

use anyhow::{Context, Result};
use clap::Parser;
use snapcopy::config::parse_region_list;
use snapcopy::error::EXIT_SUCCESS;
use snapcopy::logging::init_logging;
use snapcopy::{
    Controller, ControllerConfig, LogFormat, LogLevel, RdsStore, RdsStoreConfig, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Tag-driven cross-region copy and retention for RDS snapshots.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SNAPCOPY_CONFIG")]
    config: Option<PathBuf>,

    /// Tag key holding copy policies and expiration dates
    #[arg(long, env = "SNAPCOPY_TAG_KEY")]
    tag_key: Option<String>,

    /// Retention in days when a policy does not set one
    #[arg(long, env = "SNAPCOPY_DEFAULT_RETENTION_DAYS")]
    default_retention_days: Option<u32>,

    /// Comma-separated authorized regions (default: every enabled region)
    #[arg(short, long, env = "SNAPCOPY_REGIONS")]
    regions: Option<String>,

    /// Regions swept concurrently
    #[arg(long, env = "SNAPCOPY_MAX_PARALLEL_REGIONS")]
    max_parallel_regions: Option<usize>,

    /// Run a pass every N seconds instead of once
    #[arg(short, long, env = "SNAPCOPY_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Log intended copies, tag changes and deletions without performing them
    #[arg(long, env = "SNAPCOPY_DRY_RUN")]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "SNAPCOPY_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// Log format (compact, json)
    #[arg(long, env = "SNAPCOPY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Write JSON logs to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Custom RDS/EC2 endpoint URL
    #[arg(long, env = "SNAPCOPY_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Region used for region discovery (default: AWS provider chain)
    #[arg(long, env = "SNAPCOPY_HOME_REGION")]
    home_region: Option<String>,

    /// Write the pass report as JSON (single-pass mode)
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File configuration (or defaults) with command line and environment
    /// overrides applied
    fn build_config(&self) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ControllerConfig::default(),
        };

        if let Some(tag_key) = &self.tag_key {
            config.tag_key = tag_key.clone();
        }
        if let Some(days) = self.default_retention_days {
            config.default_retention_days = days;
        }
        if let Some(regions) = &self.regions {
            config.regions = Some(parse_region_list(regions));
        }
        if let Some(parallel) = self.max_parallel_regions {
            config.max_parallel_regions = parallel;
        }
        if self.interval_secs.is_some() {
            config.interval_secs = self.interval_secs;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.verbose {
            config.logging.level = LogLevel::Debug;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if self.log_file.is_some() {
            config.logging.file = self.log_file.clone();
        }
        if self.endpoint_url.is_some() {
            config.endpoint_url = self.endpoint_url.clone();
        }
        if self.home_region.is_some() {
            config.home_region = self.home_region.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.build_config()?;
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("snapcopy v{}", VERSION);

    let store = RdsStore::new(RdsStoreConfig {
        home_region: config.home_region.clone(),
        endpoint_url: config.endpoint_url.clone(),
        ..RdsStoreConfig::default()
    })
    .await;

    let controller = match Controller::connect(Arc::new(store), config.clone()).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Some(secs) = config.interval_secs {
        controller.run(Duration::from_secs(secs)).await;
        return Ok(());
    }

    let report = controller.run_once().await;

    if let Some(path) = &cli.report_json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    let code = report.exit_code();
    if code != EXIT_SUCCESS {
        std::process::exit(code);
    }

    Ok(())
}
