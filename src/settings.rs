//! Layered run settings
//!
//! Precedence, lowest to highest:
//! 1. Built-in defaults
//! 2. Optional settings file (`--config`, any format the `config` crate reads)
//! 3. `FLEETRUN_*` environment variables
//! 4. Explicit command-line flags
//!
//! The credential is never part of the settings; it is prompted for.

use crate::dispatcher::{DEFAULT_MAX_PARALLEL, MAX_PARALLEL_LIMIT};
use crate::error::{FleetError, Result};
use crate::models::DEFAULT_SSH_PORT;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default connection-establishment timeout
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

const ENV_PREFIX: &str = "FLEETRUN";

/// Resolved settings for a run
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Remote principal
    pub user: String,
    pub connect_timeout_secs: u64,
    pub port: u16,
    pub max_parallel: usize,
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub user: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub port: Option<u16>,
    pub max_parallel: Option<usize>,
}

impl Settings {
    /// Resolve settings from every layer and validate them.
    ///
    /// # Errors
    ///
    /// * `FleetError::Settings` - If the file is missing or malformed
    /// * `FleetError::InvalidSetting` - If a value is out of range
    pub fn load(file: Option<&Path>, overrides: &SettingsOverrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("user", default_user())?
            .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT_SECS as i64)?
            .set_default("port", i64::from(DEFAULT_SSH_PORT))?
            .set_default("max_parallel", DEFAULT_MAX_PARALLEL as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("user", overrides.user.clone())?
            .set_override_option(
                "connect_timeout_secs",
                overrides.connect_timeout_secs.map(saturating_i64),
            )?
            .set_override_option("port", overrides.port.map(i64::from))?
            .set_override_option("max_parallel", overrides.max_parallel.map(saturating_i64))?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges the way a run needs them.
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(FleetError::InvalidSetting(
                "user must be set (--user, FLEETRUN_USER or $USER)".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(FleetError::InvalidSetting(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(FleetError::InvalidSetting("port must not be 0".to_string()));
        }

        if self.max_parallel == 0 {
            return Err(FleetError::InvalidSetting(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.max_parallel > MAX_PARALLEL_LIMIT {
            return Err(FleetError::InvalidSetting(format!(
                "max_parallel must be at most {} to prevent resource exhaustion",
                MAX_PARALLEL_LIMIT
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn saturating_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}
