//! Record of the last convergence run
//!
//! Written after every `apply` (including aborted and dry runs) and read by
//! `convergent report`. Nothing here feeds back into convergence: each run
//! starts from the declared resources and the host's current state.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::RunReport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A saved run report with where it ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub saved_at: DateTime<Utc>,
    /// Host name the run converged
    pub host: String,
    /// File path prefix, when the run was staged into a directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub report: RunReport,
}

impl RunRecord {
    pub fn new(host: impl Into<String>, root: Option<PathBuf>, report: RunReport) -> Self {
        Self {
            saved_at: Utc::now(),
            host: host.into(),
            root,
            report,
        }
    }

    /// Get the state directory path (~/.local/state/convergent)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("convergent"))
    }

    fn default_path() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("last-run.json"))
    }

    /// Load the last record, `None` if no run was saved yet
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("No run record at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run record: {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run record")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write run record: {}", path.display()))?;

        log::debug!("Saved run record to {}", path.display());
        Ok(())
    }
}
