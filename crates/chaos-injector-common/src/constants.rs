//! System-wide constants and default paths.

use std::time::Duration;

/// Environment variable holding the host procfs mount point.
pub const ENV_MOUNT_PROC: &str = "CHAOS_INJECTOR_MOUNT_PROC";

/// Environment variable holding the host cgroup filesystem mount point.
pub const ENV_MOUNT_CGROUP: &str = "CHAOS_INJECTOR_MOUNT_CGROUP";

/// Procfs location when the injector runs with the host PID namespace.
pub const DEFAULT_PROC_PATH: &str = "/proc/";

/// Cgroup filesystem mount point on the host.
pub const DEFAULT_CGROUP_PATH: &str = "/sys/fs/cgroup/";

/// Its existence means the host runs the unified (v2) hierarchy.
pub const CGROUP_V2_PROBE_FILE: &str = "/sys/fs/cgroup/cgroup.controllers";

/// Control file listing the processes of a cgroup.
pub const CGROUP_PROCS_FILE: &str = "cgroup.procs";

/// Effective CPU set file on cgroup v1.
pub const CPUSET_EFFECTIVE_V1: &str = "cpuset.effective_cpus";

/// Effective CPU set file on cgroup v2.
pub const CPUSET_EFFECTIVE_V2: &str = "cpuset.cpus.effective";

/// Blkio read throttling file (cgroup v1 only).
pub const BLKIO_THROTTLE_READ: &str = "blkio.throttle.read_bps_device";

/// Blkio write throttling file (cgroup v1 only).
pub const BLKIO_THROTTLE_WRITE: &str = "blkio.throttle.write_bps_device";

/// Grace period during which an early exit is a start failure.
pub const DEFAULT_BOOTSTRAP_WINDOW: Duration = Duration::from_secs(1);

/// Interval between two `SIGCONT` keep-alive signals.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Period of a CPU stress duty cycle.
pub const STRESS_CYCLE_PERIOD: Duration = Duration::from_millis(100);

/// Number of core IDs a kernel `cpu_set_t` can hold; IDs at or above it
/// are rejected.
pub const MAX_CPU_CORES: usize = 1024;

/// Niceness applied to the injector process group when prioritized.
pub const MAX_PRIORITY_VALUE: i32 = -20;

/// Application name used in CLI output and logs.
pub const APP_NAME: &str = "chaos-injector";
