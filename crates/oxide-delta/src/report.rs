//! Migration results and the optional JSON report.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of running a compiled delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Whether the script was non-empty or any execute directive ran.
    pub migrated: bool,
    /// Statements that would have run (dry-run only).
    pub rendered_output: Option<String>,
}

/// Timed record of a run, written to the configured log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// The run's result.
    pub result: MigrationResult,
    /// Wall-clock duration in seconds.
    pub elapsed_time: f64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Writes the report as pretty JSON, replacing any existing file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
