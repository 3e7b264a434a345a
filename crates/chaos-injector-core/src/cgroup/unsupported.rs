//! Manager for hosts without cgroup support.

use chaos_injector_common::error::{InjectorError, Result};
use nix::unistd::Pid;

use super::CgroupManager;

/// Stand-in manager: every operation fails with "not implemented",
/// dry-run included, so an unsupported host never looks healthy.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub struct UnsupportedManager {
    dry_run: bool,
}

impl UnsupportedManager {
    /// Creates the stand-in manager.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn unsupported<T>(&self, operation: &str) -> Result<T> {
        tracing::debug!(operation, dry_run = self.dry_run, "cgroup operation on unsupported host");
        Err(InjectorError::NotImplemented {
            operation: format!("cgroup {operation} on {}", std::env::consts::OS),
        })
    }
}

impl CgroupManager for UnsupportedManager {
    fn read(&self, _controller: &str, _file: &str) -> Result<String> {
        self.unsupported("read")
    }

    fn write(&self, _controller: &str, _file: &str, _data: &str) -> Result<()> {
        self.unsupported("write")
    }

    fn join(&self, _pid: Pid) -> Result<()> {
        self.unsupported("join")
    }

    fn exists(&self, _controller: &str) -> bool {
        false
    }

    fn disk_throttle_read(&self, _major: u32, _bps: u64) -> Result<()> {
        self.unsupported("disk throttle")
    }

    fn disk_throttle_write(&self, _major: u32, _bps: u64) -> Result<()> {
        self.unsupported("disk throttle")
    }

    fn is_cgroup_v2(&self) -> bool {
        false
    }

    fn relative_path(&self, _controller: &str) -> String {
        String::new()
    }
}
