//! `chaos-injector cgroup-info`: Print the cgroup binding of a target.

use std::collections::BTreeMap;

use chaos_injector_common::config::InjectorConfig;
use chaos_injector_core::cgroup::{self, CgroupManager, CgroupOptions};
use clap::Args;
use nix::unistd::Pid;
use serde::Serialize;

/// Controllers listed in the report when bound.
const REPORTED_CONTROLLERS: &[&str] = &["blkio", "cpu", "cpuacct", "cpuset", "freezer", "memory", "pids"];

/// Arguments for the `cgroup-info` command.
#[derive(Args, Debug)]
pub struct CgroupInfoArgs {
    /// PID of the target process.
    #[arg(long)]
    pub target_pid: i32,
}

/// Binding summary printed as JSON.
#[derive(Debug, Serialize)]
pub struct CgroupReport {
    /// Target PID.
    pub pid: i32,
    /// Whether the host runs the unified hierarchy.
    pub cgroup_v2: bool,
    /// Controller to path relative to the cgroup mount.
    pub paths: BTreeMap<String, String>,
    /// Effective CPU set, when readable.
    pub cpuset: Option<String>,
}

impl CgroupReport {
    /// Summarizes a bound manager.
    #[must_use]
    pub fn from_manager(pid: i32, manager: &dyn CgroupManager) -> Self {
        let paths = REPORTED_CONTROLLERS
            .iter()
            .map(|controller| ((*controller).to_string(), manager.relative_path(controller)))
            .filter(|(_, path)| !path.is_empty())
            .collect();
        let cpuset = match manager.read_cpuset() {
            Ok(cores) => Some(cores.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "effective cpuset unavailable");
                None
            }
        };

        Self {
            pid,
            cgroup_v2: manager.is_cgroup_v2(),
            paths,
            cpuset,
        }
    }
}

/// Executes the `cgroup-info` command.
///
/// # Errors
///
/// Returns an error if the target's cgroup cannot be bound.
pub fn execute(config: &InjectorConfig, args: &CgroupInfoArgs) -> anyhow::Result<()> {
    let manager = cgroup::new_manager(&CgroupOptions::from_config(config), Pid::from_raw(args.target_pid))?;
    crate::output::print_json(&CgroupReport::from_manager(args.target_pid, manager.as_ref()))
}
