//! Output helpers for CLI commands.
//!
//! Reports go to stdout as JSON; logs go to stderr.

use serde::Serialize;

/// Renders a report as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints a report as pretty-printed JSON on stdout.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}
