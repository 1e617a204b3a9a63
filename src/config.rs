/*!
 * Configuration types for snapcopy
 */

use crate::error::{Result, SnapcopyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Tag key read for copy policies and written for expiration dates
pub const DEFAULT_TAG_KEY: &str = "scheduler:rds-snapshot-copy";

/// Retention applied when a policy has no usable `retention` value
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Main configuration for the controller
///
/// Built once at process start and shared read-only with every sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Well-known tag key
    #[serde(default = "default_tag_key")]
    pub tag_key: String,

    /// Retention in days when a policy does not specify one
    #[serde(default = "default_retention_days")]
    pub default_retention_days: u32,

    /// Authorized regions (None = discover from the provider)
    #[serde(default)]
    pub regions: Option<Vec<String>>,

    /// Number of regions swept concurrently (1 = sequential)
    #[serde(default = "default_parallel_regions")]
    pub max_parallel_regions: usize,

    /// Seconds between passes (None = run a single pass and exit)
    #[serde(default)]
    pub interval_secs: Option<u64>,

    /// Log intended mutations instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    /// Custom provider endpoint URL
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Region for account-level calls such as region discovery
    /// (None = provider default chain)
    #[serde(default)]
    pub home_region: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,

    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

// Default value functions for serde
fn default_tag_key() -> String {
    DEFAULT_TAG_KEY.to_string()
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_parallel_regions() -> usize {
    1
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tag_key: default_tag_key(),
            default_retention_days: default_retention_days(),
            regions: None,
            max_parallel_regions: default_parallel_regions(),
            interval_secs: None,
            dry_run: false,
            endpoint_url: None,
            home_region: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            SnapcopyError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SnapcopyError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Restrict the controller to an explicit region list
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.regions = Some(
            regions
                .into_iter()
                .map(|r| r.as_ref().trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
        );
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tag_key.trim().is_empty() {
            return Err(SnapcopyError::Config("tag_key must not be empty".to_string()));
        }

        if self.max_parallel_regions == 0 {
            return Err(SnapcopyError::Config(
                "max_parallel_regions must be at least 1".to_string(),
            ));
        }

        if self.interval_secs == Some(0) {
            return Err(SnapcopyError::Config(
                "interval_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(regions) = &self.regions {
            if regions.iter().all(|r| r.trim().is_empty()) {
                return Err(SnapcopyError::Config(
                    "explicit region list is empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parse a comma-separated region list (`"us-east-1, US-West-2"`)
///
/// Entries are trimmed and lower-cased; empty entries are dropped.
pub fn parse_region_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|region| region.trim().to_lowercase())
        .filter(|region| !region.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.tag_key, "scheduler:rds-snapshot-copy");
        assert_eq!(config.default_retention_days, 7);
        assert_eq!(config.regions, None);
        assert_eq!(config.home_region, None);
        assert_eq!(config.max_parallel_regions, 1);
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_region_list() {
        assert_eq!(
            parse_region_list(" us-east-1, US-West-2 ,,eu-west-1 "),
            vec!["us-east-1", "us-west-2", "eu-west-1"]
        );
        assert!(parse_region_list(" , ").is_empty());
    }

    #[test]
    fn test_with_regions() {
        let config = ControllerConfig::default().with_regions(["US-EAST-1", " us-west-2 ", ""]);
        assert_eq!(
            config.regions,
            Some(vec!["us-east-1".to_string(), "us-west-2".to_string()])
        );
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ControllerConfig::default();

        config.tag_key = "  ".to_string();
        assert!(config.validate().is_err());
        config.tag_key = DEFAULT_TAG_KEY.to_string();

        config.max_parallel_regions = 0;
        assert!(config.validate().is_err());
        config.max_parallel_regions = 4;

        config.interval_secs = Some(0);
        assert!(config.validate().is_err());
        config.interval_secs = Some(3600);

        config.regions = Some(Vec::new());
        assert!(config.validate().is_err());
        config.regions = Some(vec!["us-east-1".to_string()]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            default_retention_days = 14
            regions = ["us-east-1", "us-west-2"]
            home_region = "eu-west-1"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: ControllerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tag_key, DEFAULT_TAG_KEY);
        assert_eq!(config.default_retention_days, 14);
        assert_eq!(config.regions.as_ref().map(Vec::len), Some(2));
        assert_eq!(config.home_region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.max_parallel_regions, 1);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_file_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let config = ControllerConfig {
            interval_secs: Some(3600),
            dry_run: true,
            ..ControllerConfig::default()
        }
        .with_regions(["us-east-1"]);

        config.to_file(file.path()).unwrap();
        let loaded = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "default_retention_days = \"seven\"").unwrap();

        let err = ControllerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, SnapcopyError::Config(_)));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
