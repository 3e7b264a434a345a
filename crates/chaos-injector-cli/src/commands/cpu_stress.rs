//! `chaos-injector cpu-stress`: Load the cores allocated to a target.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chaos_injector_common::config::InjectorConfig;
use chaos_injector_common::types::CoreCount;
use chaos_injector_core::cgroup::{self, CgroupOptions};
use chaos_injector_core::cpuset::CpuSet;
use chaos_injector_runtime::process::{LinuxProcessManager, ProcessManager};
use chaos_injector_runtime::stress::{CpuStresser, CpuStresserManager};
use clap::Args;
use nix::unistd::Pid;

/// Arguments for the `cpu-stress` command.
#[derive(Args, Debug)]
pub struct CpuStressArgs {
    /// PID of the target process.
    #[arg(long)]
    pub target_pid: i32,

    /// Cores to stress: an absolute count (`2`) or a share (`50%`).
    /// Defaults to every core of the target's cpuset.
    #[arg(long)]
    pub count: Option<CoreCount>,

    /// Share of each cycle spent busy on every stressed core.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub percentage: u8,

    /// Stop after this many seconds instead of waiting for a signal.
    #[arg(long)]
    pub duration: Option<u64>,
}

/// Executes the `cpu-stress` command.
///
/// Joins the target cgroup, raises the injector's priority, then keeps
/// one worker per selected core busy until interrupted.
///
/// # Errors
///
/// Returns an error if the cgroup cannot be bound or joined, or the
/// stress cannot be set up.
pub fn execute(config: &InjectorConfig, args: &CpuStressArgs) -> anyhow::Result<()> {
    let target = Pid::from_raw(args.target_pid);
    let cgroup = cgroup::new_manager(&CgroupOptions::from_config(config), target)?;
    let process_manager: Arc<dyn ProcessManager> = Arc::new(LinuxProcessManager::new(config.dry_run));
    let injector = process_manager.process_id();

    cgroup
        .join(injector)
        .with_context(|| format!("unable to join cgroup of process {target}"))?;
    process_manager.prioritize().context("unable to prioritize injector")?;

    let allocation = CpuStresserManager::new();
    let selected = allocation.track_injector_cores(cgroup.as_ref(), args.count)?;
    let cores = skip_stressed(&allocation, &selected);
    if cores.is_empty() {
        tracing::warn!(selected = %selected, "every selected core is already stressed");
        return Ok(());
    }
    for core in cores.iter() {
        allocation.track_core_already_stressed(core, injector);
    }

    let stresser = CpuStresser::new(
        config.dry_run,
        cores,
        args.percentage,
        Arc::clone(&process_manager),
    )?;
    let shutdown = super::shutdown_signal(args.duration.map(Duration::from_secs))?;
    tracing::info!(
        target_pid = args.target_pid,
        cores = %stresser.cores(),
        percentage = args.percentage,
        "stressing target cpuset"
    );
    stresser.stress(&shutdown)?;
    Ok(())
}

/// Removes cores that already have a stresser recorded.
fn skip_stressed(allocation: &CpuStresserManager, selected: &CpuSet) -> CpuSet {
    let stressed: CpuSet = allocation.stresser_pids().into_keys().collect();
    selected.difference(&stressed)
}
