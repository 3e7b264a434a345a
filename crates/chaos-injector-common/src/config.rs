//! Injector configuration model.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{InjectorError, Result};

/// Root configuration for one injector process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorConfig {
    /// Host procfs mount point (`/proc/<pid>/...` is resolved below it).
    pub mount_proc: PathBuf,
    /// Host cgroup filesystem mount point.
    pub mount_cgroup: PathBuf,
    /// When set, no mutating operation touches the host.
    pub dry_run: bool,
    /// Grace period for background commands to fail synchronously.
    pub bootstrap_window: Duration,
    /// Interval between keep-alive signals.
    pub keep_alive_interval: Duration,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            mount_proc: PathBuf::from(constants::DEFAULT_PROC_PATH),
            mount_cgroup: PathBuf::from(constants::DEFAULT_CGROUP_PATH),
            dry_run: false,
            bootstrap_window: constants::DEFAULT_BOOTSTRAP_WINDOW,
            keep_alive_interval: constants::DEFAULT_KEEP_ALIVE_INTERVAL,
        }
    }
}

impl InjectorConfig {
    /// Builds the configuration from the injector environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Config`] if `CHAOS_INJECTOR_MOUNT_PROC` or
    /// `CHAOS_INJECTOR_MOUNT_CGROUP` is not set.
    pub fn from_env(dry_run: bool) -> Result<Self> {
        Self::from_lookup(dry_run, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Config`] if a required variable is missing.
    pub fn from_lookup<F>(dry_run: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).map(PathBuf::from).ok_or_else(|| InjectorError::Config {
                message: format!("environment variable {key} doesn't exist"),
            })
        };

        Ok(Self {
            mount_proc: require(constants::ENV_MOUNT_PROC)?,
            mount_cgroup: require(constants::ENV_MOUNT_CGROUP)?,
            dry_run,
            ..Self::default()
        })
    }
}
