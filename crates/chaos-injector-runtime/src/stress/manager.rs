//! Tracks which cores are stressed and by whom.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chaos_injector_common::error::Result;
use chaos_injector_common::types::CoreCount;
use chaos_injector_core::cgroup::CgroupManager;
use chaos_injector_core::cpuset::CpuSet;
use nix::unistd::Pid;

#[derive(Debug, Default)]
struct Allocation {
    cores_to_be_stressed: CpuSet,
    stresser_pids: BTreeMap<usize, Pid>,
}

/// Core allocation shared by every stress disruption of one injector.
///
/// Safe to share between threads; every accessor takes the internal lock.
#[derive(Debug, Default)]
pub struct CpuStresserManager {
    allocation: RwLock<Allocation>,
}

impl CpuStresserManager {
    /// Creates an empty allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Allocation> {
        self.allocation.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Allocation> {
        self.allocation.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selects the cores to stress from the cgroup's effective CPU set.
    ///
    /// The lowest cores are picked first. A percentage is rounded up to a
    /// whole core and any request is capped at the available cores;
    /// `None` selects them all. The selection is added to the tracked set.
    ///
    /// # Errors
    ///
    /// Returns an error if the CPU set cannot be read or parsed.
    pub fn track_injector_cores(
        &self,
        cgroup: &dyn CgroupManager,
        requested: Option<CoreCount>,
    ) -> Result<CpuSet> {
        tracing::info!(requested = ?requested.map(|c| c.to_string()), "retrieving target cpuset allocated cores");
        let available = cgroup.read_cpuset()?;

        let count = requested.map_or(available.size(), |c| {
            c.scaled(available.size(), true).min(available.size())
        });
        let selected = available.take(count);

        let mut allocation = self.write();
        allocation.cores_to_be_stressed = allocation.cores_to_be_stressed.union(&selected);
        tracing::info!(
            available = %available,
            selected = %selected,
            tracked = %allocation.cores_to_be_stressed,
            "cores to be stressed updated"
        );
        Ok(selected)
    }

    /// Union of every selection made so far.
    #[must_use]
    pub fn cores_to_be_stressed(&self) -> CpuSet {
        self.read().cores_to_be_stressed.clone()
    }

    /// Whether a stresser is already recorded for `core`.
    #[must_use]
    pub fn is_core_already_stressed(&self, core: usize) -> bool {
        self.read().stresser_pids.contains_key(&core)
    }

    /// Records the stresser process running on `core`.
    pub fn track_core_already_stressed(&self, core: usize, stresser: Pid) {
        tracing::debug!(core, pid = stresser.as_raw(), "tracking stressed core");
        let _ = self.write().stresser_pids.insert(core, stresser);
    }

    /// Stresser PID per core.
    #[must_use]
    pub fn stresser_pids(&self) -> BTreeMap<usize, Pid> {
        self.read().stresser_pids.clone()
    }
}
