//! # chaos-injector-core
//!
//! Linux resource binding for the chaos injector.
//!
//! This crate attaches the injector to a target process's resources:
//! - **Cgroups**: v1 and v2 hierarchies behind one controller-keyed manager.
//! - **Network namespaces**: thread-pinned enter/exit brackets.
//! - **CPU sets**: parsing of `0-3,7` CPU-list expressions.
//! - **Disks**: block device lookup for throttling rules.
//!
//! Non-Linux builds compile, but every host operation reports
//! "not implemented".

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod cgroup;
pub mod cpuset;
pub mod disk;
pub mod namespace;
