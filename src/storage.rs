use crate::model::LaunchReport;
use anyhow::{Context, Result};
use std::path::Path;

/// Write the launch report as pretty JSON, creating parent directories.
pub fn export_json(path: &Path, report: &LaunchReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
