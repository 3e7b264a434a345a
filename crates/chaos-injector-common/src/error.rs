//! Unified error types for the chaos injector workspace.
//!
//! Every library crate returns [`Result`]; the binary wraps these into
//! `anyhow` at the top level.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum InjectorError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid or missing.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The operation has no implementation for this host or cgroup version.
    #[error("{operation} is not implemented")]
    NotImplemented {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// A CPU-list expression could not be parsed.
    #[error("invalid cpuset expression '{input}': {reason}")]
    CpuSetParse {
        /// Raw expression that failed to parse.
        input: String,
        /// Why the expression was rejected.
        reason: String,
    },

    /// A core count (absolute or percentage) is invalid.
    #[error("invalid core count '{value}': {reason}")]
    InvalidCount {
        /// Raw value supplied by the caller.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An external command could not be executed at all.
    #[error("unable to exec command '{command}': {source}")]
    Exec {
        /// Command line that failed to spawn.
        command: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },

    /// An external command exited during its bootstrap window.
    #[error("an error occurred during startup of exec command '{command}': {reason}")]
    Bootstrap {
        /// Command line that failed early.
        command: String,
        /// Exit status or wait failure description.
        reason: String,
    },

    /// The target process already exited.
    #[error("process {pid} is already finished")]
    ProcessDone {
        /// PID of the finished process.
        pid: i32,
    },

    /// Delivering a signal to a process failed.
    #[error("an error occurred while sending {signal} signal to process with pid {pid}: {source}")]
    Signal {
        /// Target PID.
        pid: i32,
        /// Signal name.
        signal: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A namespace switch failed.
    #[error("network namespace {operation} failed: {source}")]
    Namespace {
        /// Operation that failed (`enter`, `exit`, ...).
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Changing the scheduling of the injector itself failed.
    #[error("unable to {operation}: {source}")]
    Scheduling {
        /// Scheduling change that failed (`set priority`, `set cpu affinity`).
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A thread-pinned bracket was closed from a different OS thread.
    #[error("namespace bracket opened on thread {expected} but closed on thread {actual}")]
    ThreadAffinity {
        /// Thread that entered the namespace.
        expected: i32,
        /// Thread that attempted to exit it.
        actual: i32,
    },
}

impl InjectorError {
    /// Returns `true` when the error means the target process is gone.
    ///
    /// Covers both a PID that cannot be found and one that exited
    /// between lookup and signal delivery.
    #[must_use]
    pub fn is_process_gone(&self) -> bool {
        matches!(
            self,
            Self::ProcessDone { .. } | Self::NotFound { kind: "process", .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, InjectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_gone_covers_done_and_not_found() {
        assert!(InjectorError::ProcessDone { pid: 4 }.is_process_gone());
        assert!(
            InjectorError::NotFound {
                kind: "process",
                id: "4".into()
            }
            .is_process_gone()
        );
        assert!(
            !InjectorError::NotFound {
                kind: "cgroup controller",
                id: "cpu".into()
            }
            .is_process_gone()
        );
    }

    #[test]
    fn bootstrap_error_names_underlying_failure() {
        let err = InjectorError::Bootstrap {
            command: "tc qdisc".into(),
            reason: "exit status: 2".into(),
        };
        assert!(err.to_string().contains("exit status: 2"));
    }
}
