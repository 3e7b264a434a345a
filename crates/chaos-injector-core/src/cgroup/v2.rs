//! Cgroup v2: a single unified hierarchy for every controller.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chaos_injector_common::constants::CGROUP_PROCS_FILE;
use chaos_injector_common::error::{InjectorError, Result};
use nix::unistd::Pid;

use super::io::ThrottleDirection;
use super::{CgroupManager, CgroupOptions};

/// Manager over the unified hierarchy; the controller argument of every
/// operation is accepted but does not change the directory.
#[derive(Debug, Clone)]
pub struct CgroupV2Manager {
    mount_path: PathBuf,
    path: PathBuf,
    dry_run: bool,
}

impl CgroupV2Manager {
    /// Builds the manager from raw `/proc/<pid>/cgroup` entries.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Config`] if there is no unified (`0::`) entry.
    pub fn new(options: &CgroupOptions, raw: &BTreeMap<String, String>) -> Result<Self> {
        let relative = raw.get("").ok_or_else(|| InjectorError::Config {
            message: "no unified cgroup entry found for a cgroup v2 host".into(),
        })?;
        let path = super::resolve(&options.mount_path, "", relative);
        tracing::debug!(path = %path.display(), "unified cgroup path");

        Ok(Self {
            mount_path: options.mount_path.clone(),
            path,
            dry_run: options.dry_run,
        })
    }

    fn disk_throttle(&self, direction: ThrottleDirection, major: u32, bps: u64) -> Result<()> {
        tracing::info!(major, bps, file = direction.file(), "disk throttle requested");
        if self.dry_run {
            return Ok(());
        }
        Err(InjectorError::NotImplemented {
            operation: format!("{} on cgroup v2", direction.file()),
        })
    }
}

impl CgroupManager for CgroupV2Manager {
    fn read(&self, _controller: &str, file: &str) -> Result<String> {
        super::read_control_file(&self.path, file)
    }

    fn write(&self, _controller: &str, file: &str, data: &str) -> Result<()> {
        tracing::info!(path = %self.path.join(file).display(), data, "writing to cgroup file");
        if self.dry_run {
            return Ok(());
        }
        super::write_control_file(&self.path, file, data)
    }

    fn join(&self, pid: Pid) -> Result<()> {
        tracing::info!(pid = pid.as_raw(), "moving the pid to cgroup");
        if self.dry_run {
            return Ok(());
        }
        super::write_control_file(&self.path, CGROUP_PROCS_FILE, &pid.to_string())
    }

    fn exists(&self, _controller: &str) -> bool {
        self.path.join(CGROUP_PROCS_FILE).exists()
    }

    fn disk_throttle_read(&self, major: u32, bps: u64) -> Result<()> {
        self.disk_throttle(ThrottleDirection::Read, major, bps)
    }

    fn disk_throttle_write(&self, major: u32, bps: u64) -> Result<()> {
        self.disk_throttle(ThrottleDirection::Write, major, bps)
    }

    fn is_cgroup_v2(&self) -> bool {
        true
    }

    fn relative_path(&self, _controller: &str) -> String {
        super::relative_to_mount(&self.mount_path, &self.path)
    }
}
