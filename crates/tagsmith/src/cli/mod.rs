//! Command handlers.

pub mod config;
pub mod embed;
pub mod models;
pub mod resolve;
pub mod tag;
pub mod vocab;

use serde::Serialize;

/// Print a result as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
