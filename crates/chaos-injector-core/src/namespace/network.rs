//! Network namespace manager backed by `/proc/<pid>/ns/net` handles.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chaos_injector_common::error::{InjectorError, Result};
use nix::unistd::Pid;

use super::NetnsManager;

/// Namespace of the calling thread, captured once at construction.
#[cfg(target_os = "linux")]
const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// Holds open handles on the injector's own namespace and the target's.
///
/// Handles stay open for the manager's lifetime, so a target namespace
/// outlives its last process as long as the manager exists. `enter`
/// still refuses to switch once the target's procfs entry is gone.
///
/// Several threads may hold a bracket open on the same manager at once;
/// each one is tracked by its thread ID.
#[derive(Debug)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub struct NetworkNamespaceManager {
    root: File,
    target: File,
    target_path: PathBuf,
    entered_on: Mutex<BTreeSet<i32>>,
}

impl NetworkNamespaceManager {
    /// Resolves the root namespace and the namespace of `pid` under `proc_root`.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Io`] if either namespace file cannot be opened.
    pub fn new(proc_root: &Path, pid: Pid) -> Result<Self> {
        let target_path = proc_root.join(pid.to_string()).join("ns").join("net");
        let target = open_handle(&target_path)?;
        let root = open_handle(&root_handle_path())?;

        tracing::debug!(
            pid = pid.as_raw(),
            target = %target_path.display(),
            "resolved network namespaces"
        );

        Ok(Self {
            root,
            target,
            target_path,
            entered_on: Mutex::new(BTreeSet::new()),
        })
    }

    fn entered_on(&self) -> MutexGuard<'_, BTreeSet<i32>> {
        self.entered_on.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(target_os = "linux")]
fn root_handle_path() -> PathBuf {
    PathBuf::from(THREAD_SELF_NETNS)
}

#[cfg(not(target_os = "linux"))]
fn root_handle_path() -> PathBuf {
    PathBuf::from("/proc/self/ns/net")
}

fn open_handle(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| InjectorError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(target_os = "linux")]
impl NetnsManager for NetworkNamespaceManager {
    fn enter(&self) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        // the handle is still valid, but a dead target means a stale namespace
        std::fs::metadata(&self.target_path)
            .map(drop)
            .map_err(|e| InjectorError::Io {
                path: self.target_path.clone(),
                source: e,
            })?;

        let tid = nix::unistd::gettid();
        tracing::debug!(tid = tid.as_raw(), target = %self.target_path.display(), "entering network namespace");
        setns(&self.target, CloneFlags::CLONE_NEWNET).map_err(|e| InjectorError::Namespace {
            operation: "enter",
            source: e.into(),
        })?;
        let _ = self.entered_on().insert(tid.as_raw());
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        let tid = nix::unistd::gettid();
        let mut entered_on = self.entered_on();
        if !entered_on.contains(&tid.as_raw()) {
            let Some(expected) = entered_on.first().copied() else {
                tracing::debug!(tid = tid.as_raw(), "network namespace not entered, nothing to restore");
                return Ok(());
            };
            return Err(InjectorError::ThreadAffinity {
                expected,
                actual: tid.as_raw(),
            });
        }

        tracing::debug!(tid = tid.as_raw(), "restoring root network namespace");
        setns(&self.root, CloneFlags::CLONE_NEWNET).map_err(|e| InjectorError::Namespace {
            operation: "exit",
            source: e.into(),
        })?;
        let _ = entered_on.remove(&tid.as_raw());
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl NetnsManager for NetworkNamespaceManager {
    fn enter(&self) -> Result<()> {
        Err(InjectorError::NotImplemented {
            operation: format!("network namespace enter on {}", std::env::consts::OS),
        })
    }

    fn exit(&self) -> Result<()> {
        Err(InjectorError::NotImplemented {
            operation: format!("network namespace exit on {}", std::env::consts::OS),
        })
    }
}
