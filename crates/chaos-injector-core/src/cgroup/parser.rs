//! Parsing of `/proc/<pid>/cgroup` files and host-wide container scraping.
//!
//! The file format is one `hierarchy-id:controller-list:path` entry per
//! line, for example:
//!
//! ```text
//! 9:cpu,cpuacct:/kubepods/besteffort/pod2baa3444/47fc31db38b4fa0f
//! 8:memory:/kubepods/besteffort/pod2baa3444/47fc31db38b4fa0f
//! 1:name=systemd:/kubepods/besteffort/pod2baa3444/47fc31db38b4fa0f
//! 0::/kubepods/besteffort/pod2baa3444/47fc31db38b4fa0f
//! ```
//!
//! The unified (v2) entry has an empty controller list and is keyed by
//! the empty string.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use chaos_injector_common::error::{InjectorError, Result};
use regex::Regex;

/// Container IDs are either 64 hex digits (docker, containerd) or UUIDs.
#[allow(clippy::expect_used)]
static CONTAINER_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[0-9a-f]{64}|[0-9a-f]{8}(-[0-9a-f]{4}){3}-[0-9a-f]{12}").expect("container id regex is valid")
});

/// Parses a `/proc/<pid>/cgroup` file into a controller to path map.
///
/// Comma-separated controller lists (`cpu,cpuacct`) produce one entry
/// per controller. Blank lines are ignored.
///
/// # Errors
///
/// Returns [`InjectorError::Config`] if a line does not have three
/// colon-separated fields.
pub fn parse_proc_cgroup(content: &str) -> Result<BTreeMap<String, String>> {
    let mut paths = BTreeMap::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.splitn(3, ':');
        let (Some(_), Some(controllers), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(InjectorError::Config {
                message: format!("invalid cgroup entry: '{line}'"),
            });
        };
        for controller in controllers.split(',') {
            let _ = paths.insert(controller.to_string(), path.to_string());
        }
    }
    Ok(paths)
}

/// Extracts the last container ID found in the path field of a line.
#[must_use]
pub fn container_id_from_line(line: &str) -> Option<String> {
    let path = line.splitn(3, ':').nth(2)?;
    CONTAINER_ID_REGEX
        .find_iter(path)
        .last()
        .map(|m| m.as_str().to_string())
}

/// Parses the container ID and per-controller paths of a process.
///
/// The first line carrying a container ID wins. Root paths (`/`) and the
/// bare `/docker` path are skipped. When no line carries a container ID
/// the process is not containerized and the path map is empty. A `cpu`
/// entry is backfilled from `cpuacct` when only the latter is present.
#[must_use]
pub fn parse_cgroup_paths(content: &str) -> (Option<String>, BTreeMap<String, String>) {
    let mut container_id = None;
    let mut paths = BTreeMap::new();

    for line in content.lines() {
        let id = container_id_from_line(line);
        if id.is_none() {
            tracing::trace!(line, "no container id in cgroup entry");
        }
        if container_id.is_none() {
            container_id = id;
        }

        let mut fields = line.splitn(3, ':');
        let (Some(_), Some(controllers), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if path.len() <= 1 || path == "/docker" {
            continue;
        }
        for controller in controllers.split(',') {
            let _ = paths.insert(controller.to_string(), path.to_string());
        }
    }

    if container_id.is_none() {
        paths.clear();
    }

    if !paths.contains_key("cpu") {
        if let Some(cpuacct) = paths.get("cpuacct").cloned() {
            let _ = paths.insert("cpu".to_string(), cpuacct);
        }
    }

    (container_id, paths)
}

/// Cgroup membership of one container, as seen from the host procfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCgroup {
    /// Container runtime identifier.
    pub container_id: String,
    /// Host PIDs running inside the container.
    pub pids: Vec<i32>,
    /// Controller to cgroup path map.
    pub paths: BTreeMap<String, String>,
}

/// Groups every host process by the container cgroup it belongs to.
///
/// Walks the numeric entries of `proc_root`. A process only counts as
/// containerized when its `memory` and `freezer` paths exist and are
/// identical, which excludes runtime shims placed in a sibling cgroup.
/// Processes that vanish during the walk are skipped.
///
/// # Errors
///
/// Returns an error if `proc_root` itself cannot be listed.
pub fn scrape_container_cgroups(proc_root: &Path) -> Result<BTreeMap<String, ContainerCgroup>> {
    let entries = std::fs::read_dir(proc_root).map_err(|e| InjectorError::Io {
        path: proc_root.to_path_buf(),
        source: e,
    })?;

    let mut containers: BTreeMap<String, ContainerCgroup> = BTreeMap::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<i32>().ok()) else {
            continue;
        };

        let cgroup_file = entry.path().join("cgroup");
        let content = match std::fs::read_to_string(&cgroup_file) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %cgroup_file.display(), error = %e, "cgroup file could not be read");
                continue;
            }
        };

        let (Some(container_id), paths) = parse_cgroup_paths(&content) else {
            continue;
        };

        match (paths.get("memory"), paths.get("freezer")) {
            (Some(memory), Some(freezer)) if memory == freezer => {}
            (memory, freezer) => {
                tracing::debug!(
                    pid,
                    memory = ?memory,
                    freezer = ?freezer,
                    "skipping cgroup: does not appear to be a container"
                );
                continue;
            }
        }

        let _ = containers
            .entry(container_id.clone())
            .and_modify(|cg| cg.pids.push(pid))
            .or_insert_with(|| ContainerCgroup {
                container_id,
                pids: vec![pid],
                paths,
            });
    }

    Ok(containers)
}
