//! Integration tests for cgroup binding against a synthetic host layout.
//!
//! Each test builds a fake procfs and cgroup mount under a temporary
//! directory and binds a manager through the public factory:
//! 1. v1 binding with a shared `cpu,cpuacct` hierarchy
//! 2. v2 binding selected by the unified probe file
//! 3. CPU set reads and their failure modes

#![cfg(target_os = "linux")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use chaos_injector_common::error::InjectorError;
use chaos_injector_core::cgroup::{self, CgroupOptions};
use nix::unistd::Pid;
use tempfile::TempDir;

const PID: i32 = 4242;

struct Host {
    root: TempDir,
}

impl Host {
    fn new(proc_cgroup: &str) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let proc_dir = root.path().join("proc").join(PID.to_string());
        std::fs::create_dir_all(&proc_dir).expect("proc dir");
        std::fs::write(proc_dir.join("cgroup"), proc_cgroup).expect("cgroup file");
        std::fs::create_dir_all(root.path().join("cgroup")).expect("cgroup mount");
        Self { root }
    }

    fn mount(&self) -> PathBuf {
        self.root.path().join("cgroup")
    }

    fn seed(&self, relative: &str, file: &str, content: &str) {
        let dir = self.mount().join(relative);
        std::fs::create_dir_all(&dir).expect("controller dir");
        std::fs::write(dir.join(file), content).expect("control file");
    }

    fn options(&self, dry_run: bool) -> CgroupOptions {
        CgroupOptions {
            proc_root: self.root.path().join("proc"),
            mount_path: self.mount(),
            unified_probe: self.mount().join("cgroup.controllers"),
            dry_run,
        }
    }

    fn unify(&self) {
        std::fs::write(self.mount().join("cgroup.controllers"), "cpuset cpu io memory\n")
            .expect("probe file");
    }
}

// ── Cgroup v1 ────────────────────────────────────────────────────────

#[test]
fn v1_binding_reads_shared_cpu_hierarchy() {
    let host = Host::new("8:cpu,cpuacct:/kubepods/pod1/container1\n");
    host.seed("cpu/kubepods/pod1/container1", "cpu.shares", "1024\n");

    let mgr = cgroup::new_manager(&host.options(false), Pid::from_raw(PID)).unwrap();

    assert!(!mgr.is_cgroup_v2());
    assert_eq!(mgr.read("cpu", "cpu.shares").unwrap(), "1024");
    assert_eq!(mgr.relative_path("cpu"), "cpu/kubepods/pod1/container1");
    assert_eq!(mgr.relative_path("cpuacct"), "cpuacct/kubepods/pod1/container1");
}

#[test]
fn v1_cpuset_read_strips_newline() {
    let host = Host::new("5:cpuset:/kubepods/pod1/container1\n");
    host.seed(
        "cpuset/kubepods/pod1/container1",
        "cpuset.effective_cpus",
        "0-3\n",
    );

    let mgr = cgroup::new_manager(&host.options(false), Pid::from_raw(PID)).unwrap();

    assert_eq!(mgr.read("cpuset", "cpuset.effective_cpus").unwrap(), "0-3");
    assert_eq!(mgr.read_cpuset().unwrap().to_vec(), vec![0, 1, 2, 3]);
}

#[test]
fn v1_join_in_dry_run_leaves_procs_untouched() {
    let host = Host::new("4:memory:/kubepods/pod1/container1\n");
    host.seed("memory/kubepods/pod1/container1", "cgroup.procs", "");

    let mgr = cgroup::new_manager(&host.options(true), Pid::from_raw(PID)).unwrap();
    mgr.join(Pid::from_raw(1)).unwrap();

    let procs = host.mount().join("memory/kubepods/pod1/container1/cgroup.procs");
    assert_eq!(std::fs::read_to_string(procs).unwrap(), "");
}

// ── Cgroup v2 ────────────────────────────────────────────────────────

#[test]
fn probe_file_selects_unified_binding() {
    let host = Host::new("0::/kubepods.slice/pod1/container1\n");
    host.unify();
    host.seed(
        "kubepods.slice/pod1/container1",
        "cpuset.cpus.effective",
        "2,4-5\n",
    );

    let mgr = cgroup::new_manager(&host.options(false), Pid::from_raw(PID)).unwrap();

    assert!(mgr.is_cgroup_v2());
    assert_eq!(mgr.relative_path("cpu"), "kubepods.slice/pod1/container1");
    assert_eq!(mgr.read_cpuset().unwrap().to_vec(), vec![2, 4, 5]);
    assert!(matches!(
        mgr.disk_throttle_read(8, 1024),
        Err(InjectorError::NotImplemented { .. })
    ));
}

// ── Failure modes ────────────────────────────────────────────────────

#[test]
fn vanished_target_fails_binding() {
    let host = Host::new("");
    let err = cgroup::new_manager(&host.options(false), Pid::from_raw(PID + 1)).unwrap_err();
    assert!(matches!(err, InjectorError::Io { .. }));
}

#[test]
fn malformed_cpuset_is_rejected() {
    let host = Host::new("5:cpuset:/pod\n");
    host.seed("cpuset/pod", "cpuset.effective_cpus", "0-a\n");

    let mgr = cgroup::new_manager(&host.options(false), Pid::from_raw(PID)).unwrap();
    assert!(matches!(
        mgr.read_cpuset(),
        Err(InjectorError::CpuSetParse { .. })
    ));
}

#[test]
fn missing_cpuset_file_is_io_error() {
    let host = Host::new("5:cpuset:/pod\n");
    std::fs::create_dir_all(host.mount().join("cpuset/pod")).unwrap();

    let mgr = cgroup::new_manager(&host.options(false), Pid::from_raw(PID)).unwrap();
    let err = mgr.read_cpuset().unwrap_err();
    assert!(matches!(err, InjectorError::Io { ref path, .. } if path.ends_with(Path::new("cpuset.effective_cpus"))));
}
