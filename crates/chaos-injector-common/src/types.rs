//! Domain primitive types used across the chaos injector workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InjectorError;

/// A number of cores requested by the caller, absolute or relative.
///
/// Parsed from `"2"` (absolute) or `"30%"` (percentage of the cores
/// available to the target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreCount {
    /// An absolute number of cores.
    Absolute(u32),
    /// A percentage of the available cores.
    Percent(u32),
}

impl CoreCount {
    /// Scales the count against `total` available cores.
    ///
    /// Percentages are rounded up when `round_up` is set and down
    /// otherwise. Absolute counts are returned unchanged.
    #[must_use]
    pub fn scaled(self, total: usize, round_up: bool) -> usize {
        match self {
            Self::Absolute(n) => n as usize,
            Self::Percent(p) => {
                let product = p as usize * total;
                if round_up {
                    product.div_ceil(100)
                } else {
                    product / 100
                }
            }
        }
    }
}

impl FromStr for CoreCount {
    type Err = InjectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = |reason: &str| InjectorError::InvalidCount {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(pct) = raw.strip_suffix('%') {
            let value: u32 = pct
                .parse()
                .map_err(|_| invalid("percentage must be a non-negative integer"))?;
            return Ok(Self::Percent(value));
        }

        raw.parse()
            .map(Self::Absolute)
            .map_err(|_| invalid("expected an integer or a percentage such as '50%'"))
    }
}

impl fmt::Display for CoreCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(n) => write!(f, "{n}"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

/// Lifecycle state of a supervised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandState {
    /// Command object built, nothing spawned yet.
    Created,
    /// Process spawned, bootstrap window in progress.
    Starting,
    /// Process exited with an error inside its bootstrap window.
    BootstrapFailed,
    /// Process survived its bootstrap window.
    Running,
    /// Process terminated, either stopped or observed exiting.
    Stopped,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::BootstrapFailed => write!(f, "bootstrap-failed"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
