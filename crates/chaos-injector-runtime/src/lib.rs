//! Process control for the chaos injector.
//!
//! Runs the disruptive workloads inside a bound target context:
//! supervised background commands, signalling through a process manager,
//! and CPU stress workers with their core allocation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod process;
pub mod stress;
