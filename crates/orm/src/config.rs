//! Runtime options, loaded from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use fromenv::FromEnv;

/// Options applied to CRUD statements.
#[derive(Debug, Clone, FromEnv)]
pub struct MapperOptions {
    /// Statement timeout in seconds. `0` leaves the driver default in place.
    #[env(from = "TABLEMAP_COMMAND_TIMEOUT", default = "0")]
    pub command_timeout_secs: u64,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            command_timeout_secs: 0,
        }
    }
}

impl MapperOptions {
    /// Load options from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::from_env().finalize().context("issue loading mapper options")
    }

    /// Statement timeout, if one is configured.
    #[must_use]
    pub const fn command_timeout(&self) -> Option<Duration> {
        if self.command_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.command_timeout_secs))
        }
    }
}

/// Options applied to bulk copies and the statements around them.
#[derive(Debug, Clone, FromEnv)]
pub struct BulkOptions {
    /// Seconds allowed for each bulk copy and reconciliation statement.
    #[env(from = "TABLEMAP_BULK_TIMEOUT", default = "600")]
    pub timeout_secs: u64,

    /// Rows sent per batch.
    #[env(from = "TABLEMAP_BULK_BATCH_SIZE", default = "5000")]
    pub batch_size: usize,

    /// Rows copied between progress notifications.
    #[env(from = "TABLEMAP_BULK_NOTIFY_AFTER", default = "1000")]
    pub notify_after: usize,

    /// Stream rows to the server instead of buffering them.
    #[env(from = "TABLEMAP_BULK_STREAMING", default = "false")]
    pub enable_streaming: bool,

    /// Preserve source identity values instead of letting the server assign them.
    #[env(from = "TABLEMAP_BULK_KEEP_IDENTITY", default = "false")]
    pub keep_identity: bool,

    /// Check constraints while copying.
    #[env(from = "TABLEMAP_BULK_CHECK_CONSTRAINTS", default = "false")]
    pub check_constraints: bool,

    /// Take a table lock for the duration of the copy.
    #[env(from = "TABLEMAP_BULK_TABLE_LOCK", default = "false")]
    pub table_lock: bool,

    /// Keep NULLs instead of applying column defaults.
    #[env(from = "TABLEMAP_BULK_KEEP_NULLS", default = "false")]
    pub keep_nulls: bool,

    /// Fire insert triggers on the destination.
    #[env(from = "TABLEMAP_BULK_FIRE_TRIGGERS", default = "false")]
    pub fire_triggers: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            batch_size: 5000,
            notify_after: 1000,
            enable_streaming: false,
            keep_identity: false,
            check_constraints: false,
            table_lock: false,
            keep_nulls: false,
            fire_triggers: false,
        }
    }
}

impl BulkOptions {
    /// Load options from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::from_env().finalize().context("issue loading bulk options")
    }

    /// Bulk statement timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
