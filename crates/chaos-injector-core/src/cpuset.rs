//! CPU set parsing and manipulation.
//!
//! Handles the kernel CPU-list syntax used by `cpuset.*` control files:
//! comma-separated items, each a single core ID or an inclusive range
//! such as `0-3,7`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chaos_injector_common::constants::MAX_CPU_CORES;
use chaos_injector_common::error::{InjectorError, Result};

/// An ordered set of CPU core identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CpuSet(BTreeSet<usize>);

impl CpuSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parses a CPU-list expression.
    ///
    /// An empty (or whitespace-only) expression yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`InjectorError::CpuSetParse`] if any item is not an
    /// integer or a well-formed ascending range, or names a core beyond
    /// [`MAX_CPU_CORES`]. Nothing is returned on
    /// failure, never a partially-populated set.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let mut cores = BTreeSet::new();
        if trimmed.is_empty() {
            return Ok(Self(cores));
        }

        let fail = |reason: String| InjectorError::CpuSetParse {
            input: expr.to_string(),
            reason,
        };
        let core = |raw: &str| -> Result<usize> {
            let id = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| fail(format!("'{raw}' is not a core id: {e}")))?;
            if id >= MAX_CPU_CORES {
                return Err(fail(format!("core id {id} is beyond the {MAX_CPU_CORES} supported cores")));
            }
            Ok(id)
        };

        for item in trimmed.split(',') {
            if item.trim().is_empty() {
                return Err(fail("empty item".into()));
            }
            match item.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (core(start)?, core(end)?);
                    if start > end {
                        return Err(fail(format!("range {start}-{end} is descending")));
                    }
                    cores.extend(start..=end);
                }
                None => {
                    let _ = cores.insert(core(item)?);
                }
            }
        }

        Ok(Self(cores))
    }

    /// Number of cores in the set.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no cores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `core` belongs to the set.
    #[must_use]
    pub fn contains(&self, core: usize) -> bool {
        self.0.contains(&core)
    }

    /// Returns the cores present in either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Returns the cores of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// Returns the lowest `count` cores of the set.
    #[must_use]
    pub fn take(&self, count: usize) -> Self {
        Self(self.0.iter().copied().take(count).collect())
    }

    /// Iterates over the cores in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Returns the cores as an ascending vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for CpuSet {
    type Err = InjectorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Formats the set back into canonical CPU-list syntax (`0-3,7`).
impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.iter().peekable();
        let mut first = true;
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(next) = end.checked_add(1).filter(|next| iter.peek() == Some(next)) {
                end = next;
                let _ = iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}
