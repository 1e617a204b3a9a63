/*!
 * Error types for snapcopy
 */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapcopyError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Errors that stop the controller before or outside a sweep.
///
/// Anything that happens while sweeping a single snapshot is reported
/// through logs and [`crate::metrics::RegionStats`] instead.
#[derive(Error, Debug)]
pub enum SnapcopyError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The authorized region set could not be determined
    #[error("Region discovery failed: {0}")]
    RegionDiscovery(String),

    /// Tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapcopyError {
    /// Get the process exit code for this error
    ///
    /// Every variant stops the controller before a pass can run;
    /// [`EXIT_PARTIAL`] is reserved for passes that completed with failures.
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }
}
