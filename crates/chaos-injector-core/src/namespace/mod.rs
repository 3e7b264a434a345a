//! Network namespace switching for a target process.
//!
//! `setns(2)` applies to the calling OS thread only. An `enter`/`exit`
//! bracket must therefore open and close on the same thread, and
//! namespace-sensitive work must run on that thread in between.
//! [`run_in_namespace`] does all three on a dedicated thread, which is the
//! preferred way to use a manager.

mod network;

use std::fmt;

use chaos_injector_common::error::{InjectorError, Result};

pub use network::NetworkNamespaceManager;

/// Capability interface over a root/target namespace pair.
pub trait NetnsManager: Send + Sync + fmt::Debug {
    /// Switches the calling thread into the target namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the target namespace vanished or the switch fails.
    fn enter(&self) -> Result<()>;

    /// Switches the calling thread back to the root namespace.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::ThreadAffinity`] if called from another
    /// thread than the one that entered, or an error if the switch fails.
    fn exit(&self) -> Result<()>;
}

/// Runs `work` inside the target namespace on a dedicated OS thread.
///
/// The thread enters, runs `work`, exits and terminates, so the caller's
/// own thread never changes namespace. If the bracket cannot be closed the
/// thread dies in the target namespace and nothing else ever runs on it.
///
/// # Errors
///
/// Returns an error if entering or exiting fails, or if `work` panics.
pub fn run_in_namespace<M, F, T>(manager: &M, work: F) -> Result<T>
where
    M: NetnsManager + ?Sized,
    F: FnOnce() -> T + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                manager.enter()?;
                let output = work();
                manager.exit()?;
                Ok(output)
            })
            .join()
            .unwrap_or_else(|_| {
                Err(InjectorError::Namespace {
                    operation: "run",
                    source: std::io::Error::other("namespace worker thread panicked"),
                })
            })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread::ThreadId;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingManager {
        calls: Mutex<Vec<(&'static str, ThreadId)>>,
    }

    impl RecordingManager {
        fn record(&self, op: &'static str) {
            self.calls
                .lock()
                .unwrap()
                .push((op, std::thread::current().id()));
        }
    }

    impl NetnsManager for RecordingManager {
        fn enter(&self) -> Result<()> {
            self.record("enter");
            Ok(())
        }

        fn exit(&self) -> Result<()> {
            self.record("exit");
            Ok(())
        }
    }

    #[test]
    fn bracket_runs_on_one_dedicated_thread() {
        let manager = RecordingManager::default();
        let worker = run_in_namespace(&manager, || std::thread::current().id()).unwrap();

        let calls = manager.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("enter", worker));
        assert_eq!(calls[1], ("exit", worker));
        assert_ne!(worker, std::thread::current().id());
    }

    #[test]
    fn panicking_work_is_reported() {
        let manager = RecordingManager::default();
        let err = run_in_namespace(&manager, || panic!("boom")).unwrap_err();
        assert!(matches!(err, InjectorError::Namespace { operation: "run", .. }));
        assert_eq!(manager.calls.lock().unwrap().len(), 1);
    }
}
