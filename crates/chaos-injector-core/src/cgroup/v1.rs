//! Cgroup v1: one hierarchy per controller.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chaos_injector_common::constants::CGROUP_PROCS_FILE;
use chaos_injector_common::error::{InjectorError, Result};
use nix::unistd::Pid;

use super::io::{self, BLKIO_CONTROLLER, ThrottleDirection};
use super::{CgroupManager, CgroupOptions};

/// Manager over a v1 hierarchy, keyed by controller name.
#[derive(Debug, Clone)]
pub struct CgroupV1Manager {
    mount_path: PathBuf,
    paths: BTreeMap<String, PathBuf>,
    dry_run: bool,
}

impl CgroupV1Manager {
    /// Builds the controller map from raw `/proc/<pid>/cgroup` entries.
    ///
    /// The unified entry (empty key) and named hierarchies such as
    /// `name=systemd` are dropped: the former is meaningless on a v1 host
    /// and the latter are mounted under a directory that does not match
    /// their key.
    #[must_use]
    pub fn new(options: &CgroupOptions, raw: BTreeMap<String, String>) -> Self {
        let mut paths = BTreeMap::new();
        for (controller, relative) in raw {
            if controller.is_empty() || controller.starts_with("name=") {
                tracing::debug!(controller, "skipping non-resource hierarchy");
                continue;
            }
            let path = super::resolve(&options.mount_path, &controller, &relative);
            tracing::debug!(controller, path = %path.display(), "adding cgroup controller path");
            let _ = paths.insert(controller, path);
        }

        if !paths.contains_key("cpu") {
            if let Some(cpuacct) = paths.get("cpuacct").cloned() {
                let _ = paths.insert("cpu".to_string(), cpuacct);
            }
        }

        Self {
            mount_path: options.mount_path.clone(),
            paths,
            dry_run: options.dry_run,
        }
    }

    fn controller_dir(&self, controller: &str) -> Result<&Path> {
        self.paths
            .get(controller)
            .map(PathBuf::as_path)
            .ok_or_else(|| InjectorError::NotFound {
                kind: "cgroup controller",
                id: controller.to_string(),
            })
    }

    fn disk_throttle(&self, direction: ThrottleDirection, major: u32, bps: u64) -> Result<()> {
        self.write(BLKIO_CONTROLLER, direction.file(), &io::throttle_payload(major, bps))
    }
}

impl CgroupManager for CgroupV1Manager {
    fn read(&self, controller: &str, file: &str) -> Result<String> {
        super::read_control_file(self.controller_dir(controller)?, file)
    }

    fn write(&self, controller: &str, file: &str, data: &str) -> Result<()> {
        let dir = self.controller_dir(controller)?;
        tracing::info!(path = %dir.join(file).display(), data, "writing to cgroup file");
        if self.dry_run {
            return Ok(());
        }
        super::write_control_file(dir, file, data)
    }

    fn join(&self, pid: Pid) -> Result<()> {
        tracing::info!(pid = pid.as_raw(), "moving the pid to cgroup");
        if self.dry_run {
            return Ok(());
        }

        // a cpu entry backfilled from cpuacct points at the cpuacct directory
        let dirs: BTreeSet<&PathBuf> = self.paths.values().collect();
        for dir in dirs {
            if !dir.exists() {
                tracing::debug!(path = %dir.display(), "controller not mounted, skipping");
                continue;
            }
            super::write_control_file(dir, CGROUP_PROCS_FILE, &pid.to_string())?;
        }
        Ok(())
    }

    fn exists(&self, controller: &str) -> bool {
        self.controller_dir(controller)
            .is_ok_and(|dir| dir.join(CGROUP_PROCS_FILE).exists())
    }

    fn disk_throttle_read(&self, major: u32, bps: u64) -> Result<()> {
        self.disk_throttle(ThrottleDirection::Read, major, bps)
    }

    fn disk_throttle_write(&self, major: u32, bps: u64) -> Result<()> {
        self.disk_throttle(ThrottleDirection::Write, major, bps)
    }

    fn is_cgroup_v2(&self) -> bool {
        false
    }

    fn relative_path(&self, controller: &str) -> String {
        self.paths
            .get(controller)
            .map(|dir| super::relative_to_mount(&self.mount_path, dir))
            .unwrap_or_default()
    }
}
