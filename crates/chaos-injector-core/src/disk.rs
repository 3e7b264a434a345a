//! Block device lookup for a filesystem path.
//!
//! Disk throttling rules are keyed by the device major number, so the
//! informer resolves the device backing a path with `df` and reads the
//! major from the device node.

use std::path::Path;

use chaos_injector_common::error::{InjectorError, Result};

/// Read-only view over a block device.
pub trait Informer: Send + Sync {
    /// Major number of the device.
    fn major(&self) -> u32;
    /// Device node path, as reported by `df` (e.g. `/dev/sda1`).
    fn source(&self) -> &str;
}

/// Block device backing a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInformer {
    major: u32,
    source: String,
}

impl DiskInformer {
    /// Resolves the device that holds `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, `df` fails or prints
    /// something unexpected, or the device node cannot be stat'ed.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(InjectorError::NotFound {
                kind: "path",
                id: path.display().to_string(),
            });
        }

        let output = std::process::Command::new("df")
            .arg("--output=source")
            .arg(path)
            .output()
            .map_err(|e| InjectorError::Exec {
                command: format!("df --output=source {}", path.display()),
                source: e,
            })?;
        if !output.status.success() {
            return Err(InjectorError::Config {
                message: format!(
                    "df failed for {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let source = parse_df_output(&String::from_utf8_lossy(&output.stdout))?;
        let major = device_major(Path::new(&source))?;
        tracing::debug!(path = %path.display(), source, major, "resolved backing device");

        Ok(Self { major, source })
    }
}

impl Informer for DiskInformer {
    fn major(&self) -> u32 {
        self.major
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// Extracts the device from `df --output=source` output.
///
/// # Errors
///
/// Returns [`InjectorError::Config`] unless the output is exactly one
/// header line followed by one device line.
pub fn parse_df_output(output: &str) -> Result<String> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match lines.as_slice() {
        [_header, device] => Ok((*device).to_string()),
        _ => Err(InjectorError::Config {
            message: format!(
                "unexpected df output, expected a header and a device line, got {} lines",
                lines.len()
            ),
        }),
    }
}

#[cfg(target_os = "linux")]
fn device_major(device: &Path) -> Result<u32> {
    let stat = nix::sys::stat::stat(device).map_err(|e| InjectorError::Io {
        path: device.to_path_buf(),
        source: e.into(),
    })?;
    let major = nix::sys::stat::major(stat.st_rdev);
    u32::try_from(major).map_err(|_| InjectorError::Config {
        message: format!("device major {major} of {} is out of range", device.display()),
    })
}

#[cfg(not(target_os = "linux"))]
fn device_major(device: &Path) -> Result<u32> {
    Err(InjectorError::NotImplemented {
        operation: format!("device lookup of {} on {}", device.display(), std::env::consts::OS),
    })
}
