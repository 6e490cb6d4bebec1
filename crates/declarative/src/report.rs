//! Run report - the ordered record of one convergence pass

use crate::types::{Action, ApplyResult, ResourceId, ResourceKind, Timing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a resource was processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Trigger {
    /// Its slot in declaration order
    Declared,
    /// A notification from a changed resource
    Notified { by: ResourceId, timing: Timing },
}

/// Terminal status of one processed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum EntryStatus {
    /// Not evaluated (declared `nothing`, or already executed this run)
    Skipped { reason: String },
    /// Evaluated; already in the desired state
    UpToDate,
    /// Action applied by the executor
    Applied { result: ApplyResult },
    /// Dry run: the action would have been applied
    WouldApply,
    /// Query or action failed
    Failed { error: String },
}

impl EntryStatus {
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied { result } if result.is_change())
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "⊘",
            Self::UpToDate => "○",
            Self::Applied { result } if result.is_change() => "✓",
            Self::Applied { .. } => "○",
            Self::WouldApply => "~",
            Self::Failed { .. } => "✗",
        }
    }
}

/// One record in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub kind: ResourceKind,
    pub name: String,
    pub action: Action,
    pub trigger: Trigger,
    #[serde(flatten)]
    pub status: EntryStatus,
    pub changed: bool,
}

impl ReportEntry {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, self.name.clone())
    }

    /// Whether the executor was invoked for this entry
    pub fn executed(&self) -> bool {
        matches!(self.status, EntryStatus::Applied { .. })
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunOutcome {
    Running,
    Converged,
    Aborted { error: String },
}

/// Ordered log of what a convergence pass did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub outcome: RunOutcome,
    entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Open a report at run start
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            outcome: RunOutcome::Running,
            entries: Vec::new(),
        }
    }

    /// Append an entry; ignored once the report is sealed
    pub fn record(&mut self, entry: ReportEntry) {
        if self.is_sealed() {
            log::warn!("ignoring report entry for {} on a sealed report", entry.id());
            return;
        }
        self.entries.push(entry);
    }

    /// Close the report with its final outcome
    pub fn seal(&mut self, outcome: RunOutcome) {
        if self.is_sealed() {
            return;
        }
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_sealed(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Entries for one resource, in the order they were recorded
    pub fn entries_for<'a>(&'a self, id: &'a ResourceId) -> impl Iterator<Item = &'a ReportEntry> {
        self.entries
            .iter()
            .filter(move |e| e.kind == id.kind && e.name == id.name)
    }

    /// How many times the executor ran for a resource
    pub fn times_executed(&self, id: &ResourceId) -> usize {
        self.entries_for(id).filter(|e| e.executed()).count()
    }

    /// Whether any entry for the resource changed state
    pub fn changed(&self, id: &ResourceId) -> bool {
        self.entries_for(id).any(|e| e.changed)
    }

    pub fn any_changed(&self) -> bool {
        self.entries.iter().any(|e| e.changed)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Converged
            && !self
                .entries
                .iter()
                .any(|e| matches!(e.status, EntryStatus::Failed { .. }))
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for entry in &self.entries {
            summary.add_entry(entry);
        }
        summary
    }
}

/// Counts of entries by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub would_apply: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of entries processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.up_to_date + self.skipped + self.would_apply + self.failed
    }

    /// Add an entry to the summary
    pub fn add_entry(&mut self, entry: &ReportEntry) {
        match &entry.status {
            EntryStatus::Applied { result } => match result {
                ApplyResult::Created => self.created += 1,
                ApplyResult::Modified => self.modified += 1,
                ApplyResult::Removed => self.removed += 1,
                ApplyResult::NoChange => self.up_to_date += 1,
            },
            EntryStatus::UpToDate => self.up_to_date += 1,
            EntryStatus::Skipped { .. } => self.skipped += 1,
            EntryStatus::WouldApply => self.would_apply += 1,
            EntryStatus::Failed { .. } => self.failed += 1,
        }
    }
}
