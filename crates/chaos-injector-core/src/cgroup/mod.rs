//! Cgroup binding for a target process.
//!
//! Resolves the control-group hierarchy a PID belongs to from
//! `/proc/<pid>/cgroup` and exposes controller-keyed reads, writes and
//! joins on top of it. Cgroup v1 keeps one directory per controller; v2
//! has a single unified directory for every controller. The concrete
//! manager is picked once, at construction, by probing the host.

pub mod cpu;
pub mod io;
pub mod parser;
mod unsupported;
mod v1;
mod v2;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chaos_injector_common::config::InjectorConfig;
use chaos_injector_common::constants::CGROUP_V2_PROBE_FILE;
use chaos_injector_common::error::{InjectorError, Result};
use nix::unistd::Pid;

pub use unsupported::UnsupportedManager;
pub use v1::CgroupV1Manager;
pub use v2::CgroupV2Manager;

use crate::cpuset::CpuSet;

/// Capability interface over a bound cgroup hierarchy.
///
/// A binding is immutable once built: re-binding to another PID requires
/// a new manager.
pub trait CgroupManager: Send + Sync + fmt::Debug {
    /// Reads a control file, without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is unknown or the file is absent.
    fn read(&self, controller: &str, file: &str) -> Result<String>;

    /// Writes a control file. Succeeds without touching the host in dry-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is unknown or the write fails.
    fn write(&self, controller: &str, file: &str, data: &str) -> Result<()>;

    /// Moves `pid` into every controller directory of the binding.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to any `cgroup.procs` file fails.
    fn join(&self, pid: Pid) -> Result<()>;

    /// Returns `true` if the controller directory holds a `cgroup.procs` file.
    fn exists(&self, controller: &str) -> bool;

    /// Limits read bandwidth of the device with the given major number.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot be written or the cgroup
    /// version does not support it.
    fn disk_throttle_read(&self, major: u32, bps: u64) -> Result<()>;

    /// Limits write bandwidth of the device with the given major number.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot be written or the cgroup
    /// version does not support it.
    fn disk_throttle_write(&self, major: u32, bps: u64) -> Result<()>;

    /// Returns `true` when bound to a unified (v2) hierarchy.
    fn is_cgroup_v2(&self) -> bool;

    /// Returns the controller directory with the mount prefix stripped.
    ///
    /// Unknown controllers yield an empty string.
    fn relative_path(&self, controller: &str) -> String;

    /// Reads the effective CPU set of the cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the cpuset file is missing or malformed.
    fn read_cpuset(&self) -> Result<CpuSet> {
        cpu::read_effective_cpuset(self)
    }
}

/// Host layout used to bind a cgroup hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupOptions {
    /// Procfs root holding `<pid>/cgroup`.
    pub proc_root: PathBuf,
    /// Cgroup filesystem mount point.
    pub mount_path: PathBuf,
    /// File whose existence signals a unified (v2) host.
    pub unified_probe: PathBuf,
    /// Suppress every mutating operation.
    pub dry_run: bool,
}

impl CgroupOptions {
    /// Derives the layout from the injector configuration.
    #[must_use]
    pub fn from_config(config: &InjectorConfig) -> Self {
        Self {
            proc_root: config.mount_proc.clone(),
            mount_path: config.mount_cgroup.clone(),
            unified_probe: PathBuf::from(CGROUP_V2_PROBE_FILE),
            dry_run: config.dry_run,
        }
    }
}

/// Binds the cgroup hierarchy of `pid`.
///
/// Parses `<proc_root>/<pid>/cgroup`, prefixes every path with the mount
/// point and returns a v2 manager when the unified probe file exists, a
/// v1 manager otherwise.
///
/// # Errors
///
/// Returns an error if the target's cgroup file cannot be read (target
/// gone) or parsed.
#[cfg(target_os = "linux")]
pub fn new_manager(options: &CgroupOptions, pid: Pid) -> Result<Box<dyn CgroupManager>> {
    let cgroup_file = options.proc_root.join(pid.to_string()).join("cgroup");
    let content = std::fs::read_to_string(&cgroup_file).map_err(|e| InjectorError::Io {
        path: cgroup_file.clone(),
        source: e,
    })?;
    let paths = parser::parse_proc_cgroup(&content)?;
    let is_v2 = options.unified_probe.exists();

    tracing::info!(
        pid = pid.as_raw(),
        is_v2,
        mount = %options.mount_path.display(),
        "binding target cgroup hierarchy"
    );

    if is_v2 {
        Ok(Box::new(CgroupV2Manager::new(options, &paths)?))
    } else {
        Ok(Box::new(CgroupV1Manager::new(options, paths)))
    }
}

/// Stand-in for non-Linux hosts: every operation reports "not implemented".
///
/// # Errors
///
/// Never fails; the returned manager fails on use instead.
#[cfg(not(target_os = "linux"))]
pub fn new_manager(options: &CgroupOptions, pid: Pid) -> Result<Box<dyn CgroupManager>> {
    tracing::warn!(pid = pid.as_raw(), "cgroups require Linux, binding unsupported manager");
    Ok(Box::new(UnsupportedManager::new(options.dry_run)))
}

/// Joins a controller directory below the mount point.
fn resolve(mount_path: &Path, controller_dir: &str, relative: &str) -> PathBuf {
    mount_path
        .join(controller_dir)
        .join(relative.trim_start_matches('/'))
}

/// Strips the mount point from a controller directory.
fn relative_to_mount(mount_path: &Path, dir: &Path) -> String {
    dir.strip_prefix(mount_path)
        .unwrap_or(dir)
        .display()
        .to_string()
}

fn read_control_file(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    let content = std::fs::read_to_string(&path).map_err(|e| InjectorError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(content.strip_suffix('\n').unwrap_or(&content).to_string())
}

/// Appends `data` to an existing control file; most cgroup files treat
/// the append as an overwrite.
fn write_control_file(dir: &Path, file: &str, data: &str) -> Result<()> {
    let path = dir.join(file);
    let mut handle = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(|e| InjectorError::Io {
            path: path.clone(),
            source: e,
        })?;
    handle
        .write_all(data.as_bytes())
        .map_err(|e| InjectorError::Io { path, source: e })
}
