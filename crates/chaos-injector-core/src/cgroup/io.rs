//! Block I/O throttling via the v1 `blkio` controller.
//!
//! Rules are written as `<major>:0 <bytes per second>`, applying to the
//! whole device identified by its major number.

use chaos_injector_common::constants::{BLKIO_THROTTLE_READ, BLKIO_THROTTLE_WRITE};

/// Name of the v1 block I/O controller.
pub const BLKIO_CONTROLLER: &str = "blkio";

/// Which side of the I/O path to throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDirection {
    /// Throttle reads.
    Read,
    /// Throttle writes.
    Write,
}

impl ThrottleDirection {
    /// Returns the blkio control file for this direction.
    #[must_use]
    pub const fn file(self) -> &'static str {
        match self {
            Self::Read => BLKIO_THROTTLE_READ,
            Self::Write => BLKIO_THROTTLE_WRITE,
        }
    }
}

/// Formats a throttle rule for the given device major number.
#[must_use]
pub fn throttle_payload(major: u32, bps: u64) -> String {
    format!("{major}:0 {bps}")
}
