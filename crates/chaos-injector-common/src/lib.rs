//! # chaos-injector-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire chaos injector workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives that the resource-binding
//! and process-control crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
