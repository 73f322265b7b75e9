//! Environment checks run before the migration tool is launched.
//!
//! Variables loaded here end up in our own environment, so the child
//! inherits them without any extra plumbing.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::debug;

/// Load `KEY=VALUE` pairs from a dotenv file. Variables already set win.
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .with_context(|| format!("failed to load env file {}", path.display()))?;
    debug!(path = %path.display(), "loaded env file");
    Ok(())
}

/// Names from `required` that are unset or empty.
pub fn missing_vars(required: &[String]) -> Vec<&str> {
    required
        .iter()
        .map(String::as_str)
        .filter(|name| {
            std::env::var_os(name)
                .map(|v| v.is_empty())
                .unwrap_or(true)
        })
        .collect()
}

pub fn check_required(required: &[String]) -> Result<()> {
    let missing = missing_vars(required);
    if !missing.is_empty() {
        bail!(
            "missing required environment variables: {}",
            missing.join(", ")
        );
    }
    Ok(())
}

pub fn prepare(env_file: Option<&Path>, required: &[String]) -> Result<()> {
    if let Some(path) = env_file {
        load_env_file(path)?;
    }
    check_required(required)
}
