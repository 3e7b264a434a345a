//! Process lookup, signalling and scheduling for the injector.
//!
//! Every OS interaction on processes goes through [`ProcessManager`] so
//! supervised commands and stress workers can be tested with a fake.

use std::fmt;

use chaos_injector_common::constants::MAX_PRIORITY_VALUE;
use chaos_injector_common::error::{InjectorError, Result};
use chaos_injector_core::cpuset::CpuSet;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Handle on a process known to exist at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Process {
    pid: Pid,
}

impl Process {
    /// Wraps a PID without checking it.
    #[must_use]
    pub const fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// PID of the process.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }
}

/// Capability interface over process operations.
pub trait ProcessManager: Send + Sync + fmt::Debug {
    /// PID of the injector process.
    fn process_id(&self) -> Pid;

    /// Kernel thread ID of the calling thread.
    fn thread_id(&self) -> Pid;

    /// Raises the injector's process group to the highest priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the priority cannot be changed.
    fn prioritize(&self) -> Result<()>;

    /// Looks up a running process.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::NotFound`] with kind `process` when no
    /// such process exists.
    fn find(&self, pid: Pid) -> Result<Process>;

    /// Sends `signal` to the process. No-op under dry-run.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::ProcessDone`] if the process already
    /// exited, or [`InjectorError::Signal`] on any other failure.
    fn signal(&self, process: &Process, signal: Signal) -> Result<()>;

    /// Restricts the calling thread to the given cores. No-op under dry-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the affinity cannot be applied.
    fn set_affinity(&self, cores: &CpuSet) -> Result<()>;

    /// Cores the calling thread may currently run on.
    ///
    /// # Errors
    ///
    /// Returns an error if the affinity cannot be read.
    fn affinity(&self) -> Result<CpuSet>;
}

/// [`ProcessManager`] backed by the host kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxProcessManager {
    dry_run: bool,
}

impl LinuxProcessManager {
    /// Creates a manager; `dry_run` suppresses signals, priority and
    /// affinity changes.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl ProcessManager for LinuxProcessManager {
    fn process_id(&self) -> Pid {
        nix::unistd::getpid()
    }

    #[cfg(target_os = "linux")]
    fn thread_id(&self) -> Pid {
        nix::unistd::gettid()
    }

    #[cfg(not(target_os = "linux"))]
    fn thread_id(&self) -> Pid {
        nix::unistd::getpid()
    }

    fn prioritize(&self) -> Result<()> {
        let pgid = nix::unistd::getpgrp();
        tracing::info!(pgid = pgid.as_raw(), priority = MAX_PRIORITY_VALUE, "prioritizing process group");
        if self.dry_run {
            return Ok(());
        }

        let who = libc::id_t::try_from(pgid.as_raw()).map_err(|_| InjectorError::Scheduling {
            operation: "set priority",
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        })?;
        // SAFETY: setpriority takes plain integers and touches no memory
        // owned by this process.
        let rc = unsafe { libc::setpriority(libc::PRIO_PGRP, who, MAX_PRIORITY_VALUE) };
        if rc == -1 {
            return Err(InjectorError::Scheduling {
                operation: "set priority",
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn find(&self, pid: Pid) -> Result<Process> {
        match signal::kill(pid, None) {
            // EPERM: the process exists but belongs to someone else
            Ok(()) | Err(Errno::EPERM) => Ok(Process::new(pid)),
            Err(Errno::ESRCH) => Err(InjectorError::NotFound {
                kind: "process",
                id: pid.to_string(),
            }),
            Err(e) => Err(InjectorError::Signal {
                pid: pid.as_raw(),
                signal: "0".into(),
                source: e.into(),
            }),
        }
    }

    fn signal(&self, process: &Process, signal: Signal) -> Result<()> {
        tracing::debug!(pid = process.pid.as_raw(), signal = signal.as_str(), "sending signal");
        if self.dry_run {
            return Ok(());
        }

        signal::kill(process.pid, signal).map_err(|e| match e {
            Errno::ESRCH => InjectorError::ProcessDone {
                pid: process.pid.as_raw(),
            },
            other => InjectorError::Signal {
                pid: process.pid.as_raw(),
                signal: signal.as_str().to_string(),
                source: other.into(),
            },
        })
    }

    #[cfg(target_os = "linux")]
    fn set_affinity(&self, cores: &CpuSet) -> Result<()> {
        tracing::debug!(cores = %cores, "setting thread cpu affinity");
        if self.dry_run {
            return Ok(());
        }

        let scheduling_error = |e: Errno| InjectorError::Scheduling {
            operation: "set cpu affinity",
            source: e.into(),
        };
        let mut mask = nix::sched::CpuSet::new();
        for core in cores.iter() {
            mask.set(core).map_err(scheduling_error)?;
        }
        // pid 0 targets the calling thread
        nix::sched::sched_setaffinity(Pid::from_raw(0), &mask).map_err(scheduling_error)
    }

    #[cfg(not(target_os = "linux"))]
    fn set_affinity(&self, cores: &CpuSet) -> Result<()> {
        Err(InjectorError::NotImplemented {
            operation: format!("cpu affinity {cores} on {}", std::env::consts::OS),
        })
    }

    #[cfg(target_os = "linux")]
    fn affinity(&self) -> Result<CpuSet> {
        use nix::sched::{self, CpuSet as Mask};

        let mask = sched::sched_getaffinity(Pid::from_raw(0)).map_err(|e| InjectorError::Scheduling {
            operation: "get cpu affinity",
            source: e.into(),
        })?;
        Ok((0..Mask::count())
            .filter(|core| mask.is_set(*core).unwrap_or(false))
            .collect())
    }

    #[cfg(not(target_os = "linux"))]
    fn affinity(&self) -> Result<CpuSet> {
        Err(InjectorError::NotImplemented {
            operation: format!("cpu affinity on {}", std::env::consts::OS),
        })
    }
}
