//! Busy-loop CPU workers, one per core.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use chaos_injector_common::constants::STRESS_CYCLE_PERIOD;
use chaos_injector_common::error::{InjectorError, Result};
use chaos_injector_core::cpuset::CpuSet;

use crate::process::ProcessManager;

/// Loads a set of cores for a share of every cycle.
#[derive(Debug)]
pub struct CpuStresser {
    dry_run: bool,
    cores: CpuSet,
    percentage: u8,
    process_manager: Arc<dyn ProcessManager>,
}

impl CpuStresser {
    /// Creates a stresser loading each of `cores` for `percentage`% of
    /// every cycle.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::InvalidCount`] unless `percentage` is in
    /// `1..=100`.
    pub fn new(
        dry_run: bool,
        cores: CpuSet,
        percentage: u8,
        process_manager: Arc<dyn ProcessManager>,
    ) -> Result<Self> {
        if !(1..=100).contains(&percentage) {
            return Err(InjectorError::InvalidCount {
                value: percentage.to_string(),
                reason: "stress percentage must be between 1 and 100".into(),
            });
        }
        Ok(Self {
            dry_run,
            cores,
            percentage,
            process_manager,
        })
    }

    /// Cores loaded by this stresser.
    #[must_use]
    pub const fn cores(&self) -> &CpuSet {
        &self.cores
    }

    /// Busy time and pause time of one cycle.
    #[must_use]
    pub fn duty_cycle(&self) -> (Duration, Duration) {
        let busy = STRESS_CYCLE_PERIOD * u32::from(self.percentage) / 100;
        (busy, STRESS_CYCLE_PERIOD.saturating_sub(busy))
    }

    /// Stresses every core until `exit` yields or its sender is dropped.
    ///
    /// Returns once every worker has stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread panicked.
    pub fn stress(&self, exit: &Receiver<()>) -> Result<()> {
        if self.dry_run {
            tracing::debug!(cores = %self.cores, "dry-run: stress skipped, waiting for exit");
            let _ = exit.recv();
            return Ok(());
        }

        let previous = match self.process_manager.affinity() {
            Ok(previous) => Some(previous),
            Err(e) => {
                tracing::warn!(error = %e, "unable to read caller cpu affinity");
                None
            }
        };
        // workers inherit the affinity of the spawning thread before narrowing it
        if let Err(e) = self.process_manager.set_affinity(&self.cores) {
            tracing::warn!(cores = %self.cores, error = %e, "unable to restrict stresser to its cores");
        }

        let (busy, pause) = self.duty_cycle();
        let stop = AtomicBool::new(false);
        tracing::info!(cores = %self.cores, busy = ?busy, pause = ?pause, "stress is starting");

        let panicked = std::thread::scope(|scope| {
            let workers: Vec<_> = self
                .cores
                .iter()
                .map(|core| {
                    let stop = &stop;
                    scope.spawn(move || self.worker(core, busy, pause, stop))
                })
                .collect();

            let _ = exit.recv();
            tracing::info!(workers = workers.len(), "stopping all cpu stress workers");
            stop.store(true, Ordering::Relaxed);

            workers
                .into_iter()
                .map(std::thread::ScopedJoinHandle::join)
                .filter(std::result::Result::is_err)
                .count()
        });

        if let Some(previous) = previous {
            if let Err(e) = self.process_manager.set_affinity(&previous) {
                tracing::warn!(cores = %previous, error = %e, "unable to restore caller cpu affinity");
            }
        }

        if panicked > 0 {
            return Err(InjectorError::Config {
                message: format!("{panicked} cpu stress worker(s) panicked"),
            });
        }
        tracing::info!("all cpu stress workers are now stopped");
        Ok(())
    }

    fn worker(&self, core: usize, busy: Duration, pause: Duration, stop: &AtomicBool) {
        let thread_id = self.process_manager.thread_id().as_raw();
        let single: CpuSet = std::iter::once(core).collect();
        if let Err(e) = self.process_manager.set_affinity(&single) {
            tracing::warn!(core, thread_id, error = %e, "unable to pin stress worker, thread might move to another core");
        }
        tracing::debug!(core, thread_id, "stress worker started");

        while !stop.load(Ordering::Relaxed) {
            let cycle = Instant::now();
            while cycle.elapsed() < busy {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                std::hint::spin_loop();
            }
            if !pause.is_zero() && !stop.load(Ordering::Relaxed) {
                std::thread::sleep(pause);
            }
        }
        tracing::debug!(core, thread_id, "stress worker stopped");
    }
}
