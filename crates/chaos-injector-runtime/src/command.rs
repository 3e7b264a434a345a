//! Supervised execution of external commands.
//!
//! [`ExecCmd`] is a thin wrapper over a child process. [`BackgroundCmd`]
//! supervises one: it detects failures during a short bootstrap window,
//! watches the eventual exit, keeps the process running with periodic
//! `SIGCONT` and terminates it with `SIGTERM`.

use std::fmt;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chaos_injector_common::config::InjectorConfig;
use chaos_injector_common::error::{InjectorError, Result};
use chaos_injector_common::types::CommandState;
use chaos_injector_core::namespace::{self, NetnsManager};
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::process::ProcessManager;

/// An external command that can be started once and waited on.
pub trait Cmd: Send + fmt::Display {
    /// Spawns the process. Does nothing under dry-run.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Exec`] if the process cannot be spawned.
    fn start(&mut self) -> Result<()>;

    /// Blocks until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was never started or waiting fails.
    fn wait(&mut self) -> Result<ExitStatus>;

    /// Blocks until the process has exited, leaving it unreaped so its
    /// PID cannot be recycled before [`Cmd::wait`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was never started or cannot be
    /// waited on without reaping it.
    fn wait_exited(&mut self) -> Result<()>;

    /// PID of the spawned process, `None` before a successful start.
    fn pid(&self) -> Option<Pid>;

    /// Exit code of the process, `None` while it has not been reaped or
    /// when it was killed by a signal.
    fn exit_code(&self) -> Option<i32>;

    /// Whether the command only pretends to run.
    fn dry_run(&self) -> bool;
}

/// Builds commands sharing one dry-run setting.
pub trait CmdFactory: Send + Sync {
    /// Creates a command for `program` with `args`. Nothing is spawned.
    fn new_cmd(&self, program: &str, args: &[String]) -> Box<dyn Cmd>;
}

/// Child process with inherited stdout and stderr.
#[derive(Debug)]
pub struct ExecCmd {
    program: String,
    args: Vec<String>,
    dry_run: bool,
    child: Option<Child>,
    status: Option<ExitStatus>,
}

impl ExecCmd {
    /// Creates the command without spawning it.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            args,
            dry_run,
            child: None,
            status: None,
        }
    }
}

impl fmt::Display for ExecCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl Cmd for ExecCmd {
    fn start(&mut self) -> Result<()> {
        if self.dry_run {
            tracing::info!(command = %self, "dry-run: command not executed");
            return Ok(());
        }

        let child = std::process::Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|e| InjectorError::Exec {
                command: self.to_string(),
                source: e,
            })?;
        tracing::debug!(command = %self, pid = child.id(), "command spawned");
        self.child = Some(child);
        Ok(())
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(InjectorError::NotFound {
                kind: "process",
                id: self.to_string(),
            });
        };
        let status = child.wait().map_err(|e| InjectorError::Io {
            path: PathBuf::from(&self.program),
            source: e,
        })?;
        self.status = Some(status);
        Ok(status)
    }

    #[cfg(target_os = "linux")]
    fn wait_exited(&mut self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::wait::{Id, WaitPidFlag, waitid};

        let Some(pid) = self.pid() else {
            return Err(InjectorError::NotFound {
                kind: "process",
                id: self.to_string(),
            });
        };
        loop {
            match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(InjectorError::Io {
                        path: PathBuf::from(&self.program),
                        source: e.into(),
                    });
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn wait_exited(&mut self) -> Result<()> {
        Err(InjectorError::NotImplemented {
            operation: format!("waiting without reaping on {}", std::env::consts::OS),
        })
    }

    fn pid(&self) -> Option<Pid> {
        let id = self.child.as_ref()?.id();
        i32::try_from(id).ok().map(Pid::from_raw)
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Factory producing [`ExecCmd`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecCmdFactory {
    dry_run: bool,
}

impl ExecCmdFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CmdFactory for ExecCmdFactory {
    fn new_cmd(&self, program: &str, args: &[String]) -> Box<dyn Cmd> {
        Box::new(ExecCmd::new(program, args.to_vec(), self.dry_run))
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone)]
enum Exit {
    Status(ExitStatus),
    WaitFailed(String),
}

impl Exit {
    fn success(&self) -> bool {
        matches!(self, Self::Status(status) if status.success())
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::WaitFailed(reason) => f.write_str(reason),
        }
    }
}

/// A running keep-alive loop. Dropping `stop` wakes the loop up.
struct Timer {
    generation: u64,
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct Supervision {
    state: CommandState,
    exit: Option<Exit>,
    timer: Option<Timer>,
    generation: u64,
    keep_alive_error: Option<InjectorError>,
}

type Shared = Arc<Mutex<Supervision>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Supervision> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Supervises a [`Cmd`] running in the background.
///
/// All operations succeed immediately under dry-run without touching the
/// host. At most one keep-alive loop runs at any time; it is guarded by
/// the same lock as the command state so `keep_alive` and `stop` cannot
/// race.
pub struct BackgroundCmd {
    cmd: Option<Box<dyn Cmd>>,
    command: String,
    dry_run: bool,
    process_manager: Arc<dyn ProcessManager>,
    namespace: Option<Arc<dyn NetnsManager>>,
    bootstrap_window: Duration,
    keep_alive_interval: Duration,
    pid: Option<Pid>,
    shared: Shared,
}

impl fmt::Debug for BackgroundCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundCmd")
            .field("command", &self.command)
            .field("dry_run", &self.dry_run)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BackgroundCmd {
    /// Wraps `cmd` with the default bootstrap window and keep-alive interval.
    #[must_use]
    pub fn new(cmd: Box<dyn Cmd>, process_manager: Arc<dyn ProcessManager>) -> Self {
        let defaults = InjectorConfig::default();
        Self {
            command: cmd.to_string(),
            dry_run: cmd.dry_run(),
            cmd: Some(cmd),
            process_manager,
            namespace: None,
            bootstrap_window: defaults.bootstrap_window,
            keep_alive_interval: defaults.keep_alive_interval,
            pid: None,
            shared: Arc::new(Mutex::new(Supervision {
                state: CommandState::Created,
                exit: None,
                timer: None,
                generation: 0,
                keep_alive_error: None,
            })),
        }
    }

    /// Takes the bootstrap window and keep-alive interval from `config`.
    #[must_use]
    pub fn with_timings(mut self, config: &InjectorConfig) -> Self {
        self.bootstrap_window = config.bootstrap_window;
        self.keep_alive_interval = config.keep_alive_interval;
        self
    }

    /// Spawns the process from inside the given network namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: Arc<dyn NetnsManager>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Whether the command only pretends to run.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// PID of the supervised process, once started.
    #[must_use]
    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CommandState {
        lock(&self.shared).state
    }

    /// Exit code of the process, once it has exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match lock(&self.shared).exit {
            Some(Exit::Status(status)) => status.code(),
            _ => None,
        }
    }

    /// Whether a keep-alive loop is currently running.
    #[must_use]
    pub fn is_keeping_alive(&self) -> bool {
        lock(&self.shared).timer.is_some()
    }

    /// Starts the process and waits out the bootstrap window.
    ///
    /// An exit within the window fails the start when it is not a success;
    /// an exit after it is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::Exec`] if the process cannot be spawned,
    /// [`InjectorError::Bootstrap`] if it failed during the window, or an
    /// error if the command was already started.
    pub fn start(&mut self) -> Result<()> {
        if self.dry_run {
            tracing::info!(command = %self.command, "dry-run: background command not started");
            lock(&self.shared).state = CommandState::Running;
            return Ok(());
        }

        let mut cmd = self.cmd.take().ok_or_else(|| InjectorError::Config {
            message: format!("command '{}' was already started", self.command),
        })?;

        tracing::info!(command = %self.command, "starting background command");
        lock(&self.shared).state = CommandState::Starting;
        if let Err(e) = self.spawn(cmd.as_mut()) {
            lock(&self.shared).state = CommandState::BootstrapFailed;
            return Err(e);
        }

        let Some(pid) = cmd.pid() else {
            lock(&self.shared).state = CommandState::BootstrapFailed;
            return Err(InjectorError::Bootstrap {
                command: self.command.clone(),
                reason: format!("no process created, exit code is {:?}", cmd.exit_code()),
            });
        };
        self.pid = Some(pid);

        let (exited_tx, exited_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let command = self.command.clone();
        let _watcher = std::thread::spawn(move || {
            let early = match cmd.wait_exited() {
                Ok(()) => None,
                Err(e) => {
                    tracing::debug!(pid = pid.as_raw(), error = %e, "falling back to a reaping wait");
                    Some(reap(cmd.as_mut()))
                }
            };
            // reap under the lock, so nothing signals a recycled PID
            let mut supervision = lock(&shared);
            let exit = early.unwrap_or_else(|| reap(cmd.as_mut()));
            if supervision.state == CommandState::Running {
                log_exit(&command, pid, &exit);
                supervision.state = CommandState::Stopped;
            }
            supervision.exit = Some(exit);
            if let Some(timer) = supervision.timer.take() {
                tracing::debug!(pid = pid.as_raw(), "process exited, stopping keep-alive");
                drop(timer.stop);
            }
            drop(supervision);
            let _ = exited_tx.send(());
        });

        let outcome = exited_rx.recv_timeout(self.bootstrap_window);
        let mut supervision = lock(&self.shared);
        match (outcome, supervision.exit.clone()) {
            (Err(RecvTimeoutError::Timeout), None) => {
                tracing::debug!(pid = pid.as_raw(), "bootstrap window elapsed, monitoring exit status");
                supervision.state = CommandState::Running;
                Ok(())
            }
            (_, Some(exit)) if exit.success() => {
                log_exit(&self.command, pid, &exit);
                supervision.state = CommandState::Stopped;
                Ok(())
            }
            (Err(RecvTimeoutError::Timeout), Some(exit)) => {
                // exited right after the window: not a start failure
                log_exit(&self.command, pid, &exit);
                supervision.state = CommandState::Stopped;
                Ok(())
            }
            (_, exit) => {
                supervision.state = CommandState::BootstrapFailed;
                Err(InjectorError::Bootstrap {
                    command: self.command.clone(),
                    reason: exit.map_or_else(|| "exit watcher vanished".to_string(), |e| e.to_string()),
                })
            }
        }
    }

    fn spawn(&self, cmd: &mut dyn Cmd) -> Result<()> {
        match &self.namespace {
            Some(ns) => namespace::run_in_namespace(ns.as_ref(), || cmd.start())?,
            None => cmd.start(),
        }
    }

    /// Starts the keep-alive loop sending `SIGCONT` every interval.
    ///
    /// Calling it again while a loop runs does nothing. The loop ends on
    /// `stop`, when the process is gone, or on the first signalling
    /// failure, which is then reported by [`Self::check`].
    pub fn keep_alive(&self) {
        if self.dry_run {
            return;
        }
        let Some(pid) = self.pid else {
            tracing::warn!(command = %self.command, "keep-alive requested before start, ignoring");
            return;
        };

        let mut supervision = lock(&self.shared);
        if supervision.timer.is_some() {
            return;
        }
        if supervision.exit.is_some() {
            tracing::debug!(pid = pid.as_raw(), "process already exited, no keep-alive");
            return;
        }

        supervision.generation += 1;
        let generation = supervision.generation;
        let (stop, stopped) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let process_manager = Arc::clone(&self.process_manager);
        let interval = self.keep_alive_interval;

        tracing::debug!(pid = pid.as_raw(), interval = ?interval, "sending SIGCONT to process periodically");
        let handle = std::thread::spawn(move || {
            keep_alive_loop(pid, interval, &stopped, process_manager.as_ref(), &shared, generation);
        });
        supervision.timer = Some(Timer {
            generation,
            stop,
            handle,
        });
    }

    /// Returns the error that ended the last keep-alive loop, once.
    ///
    /// # Errors
    ///
    /// Returns the recorded signalling failure, if any.
    pub fn check(&self) -> Result<()> {
        lock(&self.shared).keep_alive_error.take().map_or(Ok(()), Err)
    }

    /// Tears down the keep-alive loop and sends `SIGTERM` to the process.
    ///
    /// Succeeds when the process is already gone, so it can be called
    /// repeatedly during cleanup. A process whose exit was observed is
    /// never signalled.
    ///
    /// # Errors
    ///
    /// Returns an error if the process lookup or the signal fails for any
    /// other reason than the process being gone.
    pub fn stop(&self) -> Result<()> {
        if self.dry_run {
            lock(&self.shared).state = CommandState::Stopped;
            return Ok(());
        }

        self.stop_keep_alive();

        let Some(pid) = self.pid else {
            tracing::debug!(command = %self.command, "command never started, nothing to stop");
            return Ok(());
        };

        let mut supervision = lock(&self.shared);
        if supervision.exit.is_some() {
            tracing::debug!(pid = pid.as_raw(), "process already exited, nothing to stop");
            return Ok(());
        }

        tracing::info!(pid = pid.as_raw(), "sending SIGTERM to background process");
        let result = self
            .process_manager
            .find(pid)
            .and_then(|process| self.process_manager.signal(&process, Signal::SIGTERM));

        match result {
            Ok(()) => {}
            Err(e) if e.is_process_gone() => {
                tracing::info!(pid = pid.as_raw(), "process already gone, nothing to stop");
            }
            Err(e) => return Err(e),
        }

        if supervision.state == CommandState::Running {
            supervision.state = CommandState::Stopped;
        }
        Ok(())
    }

    fn stop_keep_alive(&self) {
        let timer = lock(&self.shared).timer.take();
        if let Some(timer) = timer {
            drop(timer.stop);
            if timer.handle.join().is_err() {
                tracing::error!(generation = timer.generation, "keep-alive thread panicked");
            }
        }
    }
}

impl Drop for BackgroundCmd {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}

fn keep_alive_loop(
    pid: Pid,
    interval: Duration,
    stopped: &mpsc::Receiver<()>,
    process_manager: &dyn ProcessManager,
    shared: &Shared,
    generation: u64,
) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let mut supervision = lock(shared);
        if supervision.exit.is_some() {
            return;
        }
        let result = process_manager
            .find(pid)
            .and_then(|process| process_manager.signal(&process, Signal::SIGCONT));
        let Err(e) = result else {
            tracing::trace!(pid = pid.as_raw(), "SIGCONT sent");
            continue;
        };

        if e.is_process_gone() {
            tracing::info!(pid = pid.as_raw(), "process is already finished, no more SIGCONT");
        } else {
            tracing::error!(pid = pid.as_raw(), error = %e, "keep-alive failed, timer removed");
            supervision.keep_alive_error = Some(e);
        }
        // stop may have replaced the timer in the meantime
        if supervision
            .timer
            .as_ref()
            .is_some_and(|t| t.generation == generation)
        {
            supervision.timer = None;
        }
        return;
    }
}

fn reap(cmd: &mut dyn Cmd) -> Exit {
    match cmd.wait() {
        Ok(status) => Exit::Status(status),
        Err(e) => Exit::WaitFailed(e.to_string()),
    }
}

fn log_exit(command: &str, pid: Pid, exit: &Exit) {
    if exit.success() {
        tracing::info!(command, pid = pid.as_raw(), "background command exited successfully");
    } else {
        tracing::warn!(command, pid = pid.as_raw(), exit = %exit, "background command exited with an error");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    use chaos_injector_core::cpuset::CpuSet;

    use super::*;
    use crate::process::Process;

    /// Command whose exit is driven by the test through a channel.
    struct FakeCmd {
        pid: Option<Pid>,
        started: Arc<AtomicBool>,
        exit: mpsc::Receiver<i32>,
        code: Option<i32>,
        fail_spawn: bool,
        dry_run: bool,
    }

    impl fmt::Display for FakeCmd {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("fake --flag")
        }
    }

    impl Cmd for FakeCmd {
        fn start(&mut self) -> Result<()> {
            if self.fail_spawn {
                return Err(InjectorError::Exec {
                    command: self.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn wait(&mut self) -> Result<ExitStatus> {
            self.wait_exited()?;
            Ok(ExitStatus::from_raw(self.code.unwrap_or(0) << 8))
        }

        fn wait_exited(&mut self) -> Result<()> {
            if self.code.is_none() {
                self.code = Some(self.exit.recv().unwrap_or(0));
            }
            Ok(())
        }

        fn pid(&self) -> Option<Pid> {
            self.pid
        }

        fn exit_code(&self) -> Option<i32> {
            None
        }

        fn dry_run(&self) -> bool {
            self.dry_run
        }
    }

    struct Fixture {
        exit: mpsc::Sender<i32>,
        started: Arc<AtomicBool>,
    }

    fn fake(dry_run: bool) -> (Box<FakeCmd>, Fixture) {
        let (tx, rx) = mpsc::channel();
        let started = Arc::new(AtomicBool::new(false));
        let cmd = Box::new(FakeCmd {
            pid: Some(Pid::from_raw(4242)),
            started: Arc::clone(&started),
            exit: rx,
            code: None,
            fail_spawn: false,
            dry_run,
        });
        (cmd, Fixture { exit: tx, started })
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Behavior {
        Alive,
        NotFound,
        Done,
        Denied,
        Broken,
    }

    #[derive(Debug)]
    struct FakeProcessManager {
        behavior: Mutex<Behavior>,
        signals: Mutex<Vec<Signal>>,
    }

    impl FakeProcessManager {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(behavior),
                signals: Mutex::new(Vec::new()),
            })
        }

        fn count(&self, signal: Signal) -> usize {
            self.signals
                .lock()
                .unwrap()
                .iter()
                .filter(|s| **s == signal)
                .count()
        }
    }

    impl ProcessManager for FakeProcessManager {
        fn process_id(&self) -> Pid {
            Pid::from_raw(1)
        }

        fn thread_id(&self) -> Pid {
            Pid::from_raw(1)
        }

        fn prioritize(&self) -> Result<()> {
            Ok(())
        }

        fn find(&self, pid: Pid) -> Result<Process> {
            match *self.behavior.lock().unwrap() {
                Behavior::NotFound => Err(InjectorError::NotFound {
                    kind: "process",
                    id: pid.to_string(),
                }),
                Behavior::Broken => Err(InjectorError::Config {
                    message: "procfs unavailable".into(),
                }),
                _ => Ok(Process::new(pid)),
            }
        }

        fn signal(&self, process: &Process, signal: Signal) -> Result<()> {
            self.signals.lock().unwrap().push(signal);
            match *self.behavior.lock().unwrap() {
                Behavior::Done => Err(InjectorError::ProcessDone {
                    pid: process.pid().as_raw(),
                }),
                Behavior::Denied => Err(InjectorError::Signal {
                    pid: process.pid().as_raw(),
                    signal: signal.as_str().into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                }),
                _ => Ok(()),
            }
        }

        fn set_affinity(&self, _cores: &CpuSet) -> Result<()> {
            Ok(())
        }

        fn affinity(&self) -> Result<CpuSet> {
            Ok(CpuSet::new())
        }
    }

    fn timings(bootstrap_ms: u64, keep_alive_ms: u64) -> InjectorConfig {
        InjectorConfig {
            bootstrap_window: Duration::from_millis(bootstrap_ms),
            keep_alive_interval: Duration::from_millis(keep_alive_ms),
            ..InjectorConfig::default()
        }
    }

    fn supervised(
        cmd: Box<FakeCmd>,
        pm: &Arc<FakeProcessManager>,
        config: &InjectorConfig,
    ) -> BackgroundCmd {
        let pm: Arc<dyn ProcessManager> = Arc::clone(pm) as Arc<dyn ProcessManager>;
        BackgroundCmd::new(cmd, pm).with_timings(config)
    }

    #[test]
    fn dry_run_touches_nothing() {
        let (cmd, fixture) = fake(true);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(50, 10));

        assert!(bg.dry_run());
        bg.start().unwrap();
        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(50));
        bg.stop().unwrap();

        assert!(!fixture.started.load(Ordering::SeqCst));
        assert!(pm.signals.lock().unwrap().is_empty());
        assert_eq!(bg.state(), CommandState::Stopped);
    }

    #[test]
    fn failure_within_bootstrap_window_fails_start() {
        let (cmd, fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(1_000, 1_000));
        fixture.exit.send(2).unwrap();

        let started = Instant::now();
        let err = bg.start().unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert!(matches!(err, InjectorError::Bootstrap { .. }));
        assert!(err.to_string().contains("fake --flag"));
        assert!(err.to_string().contains("exit status: 2"));
        assert_eq!(bg.state(), CommandState::BootstrapFailed);
        assert_eq!(bg.exit_code(), Some(2));
    }

    #[test]
    fn success_within_bootstrap_window_is_not_an_error() {
        let (cmd, fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(1_000, 1_000));
        fixture.exit.send(0).unwrap();

        bg.start().unwrap();
        assert_eq!(bg.state(), CommandState::Stopped);
        assert_eq!(bg.exit_code(), Some(0));
    }

    #[test]
    fn exit_after_bootstrap_window_is_only_observed() {
        let (cmd, fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(50, 1_000));

        bg.start().unwrap();
        assert_eq!(bg.state(), CommandState::Running);
        assert_eq!(bg.pid(), Some(Pid::from_raw(4242)));

        fixture.exit.send(1).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while bg.state() != CommandState::Stopped && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(bg.state(), CommandState::Stopped);
        assert_eq!(bg.exit_code(), Some(1));
    }

    #[test]
    fn exited_process_is_never_signalled_again() {
        let (cmd, fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 20));
        bg.start().unwrap();
        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(60));

        fixture.exit.send(0).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while bg.state() != CommandState::Stopped && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(bg.state(), CommandState::Stopped);
        let sent = pm.count(Signal::SIGCONT);

        std::thread::sleep(Duration::from_millis(200));
        bg.keep_alive();
        bg.stop().unwrap();

        assert_eq!(pm.count(Signal::SIGCONT), sent);
        assert_eq!(pm.count(Signal::SIGTERM), 0);
        assert!(!bg.is_keeping_alive());
    }

    #[test]
    fn spawn_failure_is_exec_error() {
        let (mut cmd, _fixture) = fake(false);
        cmd.fail_spawn = true;
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(50, 1_000));

        let err = bg.start().unwrap_err();
        assert!(matches!(err, InjectorError::Exec { .. }));
        assert_eq!(bg.state(), CommandState::BootstrapFailed);
    }

    #[test]
    fn missing_pid_after_start_fails() {
        let (mut cmd, _fixture) = fake(false);
        cmd.pid = None;
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(50, 1_000));

        assert!(matches!(bg.start(), Err(InjectorError::Bootstrap { .. })));
    }

    #[test]
    fn second_start_is_rejected() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 1_000));
        bg.start().unwrap();
        assert!(matches!(bg.start(), Err(InjectorError::Config { .. })));
    }

    #[test]
    fn keep_alive_twice_runs_one_timer() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 200));
        bg.start().unwrap();

        bg.keep_alive();
        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(500));
        bg.stop().unwrap();

        assert_eq!(pm.count(Signal::SIGCONT), 2);
        assert_eq!(pm.count(Signal::SIGTERM), 1);
        assert!(!bg.is_keeping_alive());
    }

    #[test]
    fn keep_alive_ends_quietly_when_process_done() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Done);
        let mut bg = supervised(cmd, &pm, &timings(10, 20));
        bg.start().unwrap();

        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(150));

        assert!(!bg.is_keeping_alive());
        assert_eq!(pm.count(Signal::SIGCONT), 1);
        bg.check().unwrap();
    }

    #[test]
    fn keep_alive_failure_surfaces_on_next_check() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Denied);
        let mut bg = supervised(cmd, &pm, &timings(10, 20));
        bg.start().unwrap();

        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(150));

        assert!(!bg.is_keeping_alive());
        assert!(matches!(bg.check(), Err(InjectorError::Signal { .. })));
        bg.check().unwrap();
    }

    #[test]
    fn keep_alive_can_restart_after_it_ended() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Done);
        let mut bg = supervised(cmd, &pm, &timings(10, 20));
        bg.start().unwrap();

        bg.keep_alive();
        std::thread::sleep(Duration::from_millis(100));
        *pm.behavior.lock().unwrap() = Behavior::Alive;
        bg.keep_alive();
        assert!(bg.is_keeping_alive());
        bg.stop().unwrap();
    }

    #[test]
    fn stop_is_idempotent_when_process_gone() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 1_000));
        bg.start().unwrap();

        bg.stop().unwrap();
        *pm.behavior.lock().unwrap() = Behavior::NotFound;
        bg.stop().unwrap();
        *pm.behavior.lock().unwrap() = Behavior::Done;
        bg.stop().unwrap();
        assert_eq!(bg.state(), CommandState::Stopped);
    }

    #[test]
    fn stop_reports_unexpected_lookup_failure() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 1_000));
        bg.start().unwrap();

        *pm.behavior.lock().unwrap() = Behavior::Broken;
        assert!(matches!(bg.stop(), Err(InjectorError::Config { .. })));
    }

    #[test]
    fn stop_before_start_is_ok() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let bg = supervised(cmd, &pm, &timings(10, 1_000));
        bg.stop().unwrap();
        assert!(pm.signals.lock().unwrap().is_empty());
        assert_eq!(bg.state(), CommandState::Created);
    }

    #[test]
    fn drop_tears_down_keep_alive() {
        let (cmd, _fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let mut bg = supervised(cmd, &pm, &timings(10, 20));
        bg.start().unwrap();
        bg.keep_alive();
        drop(bg);

        let sent = pm.count(Signal::SIGCONT);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(pm.count(Signal::SIGCONT), sent);
    }

    #[derive(Debug, Default)]
    struct RecordingNamespace {
        entered: AtomicBool,
        exited: AtomicBool,
    }

    impl NetnsManager for RecordingNamespace {
        fn enter(&self) -> Result<()> {
            self.entered.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn exit(&self) -> Result<()> {
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn spawns_inside_namespace_bracket() {
        let (cmd, fixture) = fake(false);
        let pm = FakeProcessManager::new(Behavior::Alive);
        let ns = Arc::new(RecordingNamespace::default());
        let mut bg = supervised(cmd, &pm, &timings(10, 1_000))
            .in_namespace(Arc::clone(&ns) as Arc<dyn NetnsManager>);

        bg.start().unwrap();
        assert!(fixture.started.load(Ordering::SeqCst));
        assert!(ns.entered.load(Ordering::SeqCst));
        assert!(ns.exited.load(Ordering::SeqCst));
    }

    #[test]
    fn exec_cmd_reports_exit_code() {
        let mut cmd = ExecCmd::new("sh", vec!["-c".into(), "exit 3".into()], false);
        assert_eq!(cmd.to_string(), "sh -c exit 3");
        assert!(cmd.pid().is_none());

        cmd.start().unwrap();
        assert!(cmd.pid().is_some());
        assert!(!cmd.wait().unwrap().success());
        assert_eq!(cmd.exit_code(), Some(3));
    }

    #[test]
    fn exec_cmd_missing_binary_is_exec_error() {
        let mut cmd = ExecCmd::new("/nonexistent/chaos-binary", Vec::new(), false);
        let err = cmd.start().unwrap_err();
        assert!(err.to_string().starts_with("unable to exec command '/nonexistent/chaos-binary'"));
    }

    #[test]
    fn factory_builds_dry_run_commands() {
        let mut cmd = ExecCmdFactory::new(true).new_cmd("tc", &["qdisc".into(), "show".into()]);
        assert!(cmd.dry_run());
        cmd.start().unwrap();
        assert!(cmd.pid().is_none());
        assert!(cmd.exit_code().is_none());
        assert!(cmd.wait().is_err());
    }
}
