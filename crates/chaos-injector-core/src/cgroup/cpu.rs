//! CPU set discovery through the `cpuset` controller.
//!
//! The effective CPU list lives in `cpuset.effective_cpus` on v1 and
//! `cpuset.cpus.effective` on v2.

use chaos_injector_common::constants::{CPUSET_EFFECTIVE_V1, CPUSET_EFFECTIVE_V2};
use chaos_injector_common::error::Result;

use super::CgroupManager;
use crate::cpuset::CpuSet;

/// Name of the controller holding CPU set files.
pub const CPUSET_CONTROLLER: &str = "cpuset";

/// Returns the effective CPU set file name for the cgroup version.
#[must_use]
pub const fn effective_cpus_file(is_v2: bool) -> &'static str {
    if is_v2 {
        CPUSET_EFFECTIVE_V2
    } else {
        CPUSET_EFFECTIVE_V1
    }
}

/// Reads and parses the effective CPU set of a cgroup.
///
/// # Errors
///
/// Returns an error if the control file is missing or its content is not
/// a valid CPU-list expression.
pub fn read_effective_cpuset<M: CgroupManager + ?Sized>(manager: &M) -> Result<CpuSet> {
    let file = effective_cpus_file(manager.is_cgroup_v2());
    let raw = manager.read(CPUSET_CONTROLLER, file)?;
    let cores = CpuSet::parse(&raw)?;
    tracing::debug!(file, cores = %cores, "effective cpuset read");
    Ok(cores)
}
