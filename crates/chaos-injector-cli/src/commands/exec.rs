//! `chaos-injector exec`: Run a supervised background command.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use chaos_injector_common::config::InjectorConfig;
use chaos_injector_common::error::Result;
use chaos_injector_common::types::CommandState;
use chaos_injector_core::namespace::{NetnsManager, NetworkNamespaceManager};
use chaos_injector_runtime::command::{BackgroundCmd, CmdFactory, ExecCmdFactory};
use chaos_injector_runtime::process::{LinuxProcessManager, ProcessManager};
use clap::Args;
use nix::unistd::Pid;

/// How often the supervision loop checks the command.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// PID of the target process.
    #[arg(long)]
    pub target_pid: Option<i32>,

    /// Spawn the command inside the target's network namespace.
    #[arg(long, requires = "target_pid")]
    pub netns: bool,

    /// Stop after this many seconds instead of waiting for a signal.
    #[arg(long)]
    pub duration: Option<u64>,

    /// Command to execute.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Starts the command, keeps it alive with `SIGCONT`, and terminates it
/// on Ctrl-C, SIGTERM, or when the duration elapses. Returns early when
/// the command exits on its own.
///
/// # Errors
///
/// Returns an error if the command fails to start, keep-alive fails, or
/// the command cannot be stopped.
pub fn execute(config: &InjectorConfig, args: ExecArgs) -> anyhow::Result<()> {
    let Some((program, rest)) = args.command.split_first() else {
        anyhow::bail!("exec command is empty");
    };

    let factory = ExecCmdFactory::new(config.dry_run);
    let process_manager: Arc<dyn ProcessManager> = Arc::new(LinuxProcessManager::new(config.dry_run));
    let mut background = BackgroundCmd::new(factory.new_cmd(program, rest), process_manager).with_timings(config);

    if args.netns {
        if let Some(pid) = args.target_pid {
            let namespace: Arc<dyn NetnsManager> =
                Arc::new(NetworkNamespaceManager::new(&config.mount_proc, Pid::from_raw(pid))?);
            background = background.in_namespace(namespace);
        }
    }

    let shutdown = super::shutdown_signal(args.duration.map(Duration::from_secs))?;
    background.start()?;
    background.keep_alive();

    supervise_then_stop(&background, &shutdown)?;
    Ok(())
}

/// Supervises the command, then always stops it. The first error wins.
fn supervise_then_stop(background: &BackgroundCmd, shutdown: &Receiver<()>) -> Result<()> {
    let supervised = supervise(background, shutdown);
    let stopped = background.stop();
    supervised.and(stopped)
}

/// Waits for shutdown or the command's own exit, whichever comes first.
fn supervise(background: &BackgroundCmd, shutdown: &Receiver<()>) -> Result<()> {
    loop {
        match shutdown.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {}
        }
        background.check()?;
        if background.state() == CommandState::Stopped {
            tracing::info!(exit_code = ?background.exit_code(), "command exited on its own");
            return Ok(());
        }
    }
}
