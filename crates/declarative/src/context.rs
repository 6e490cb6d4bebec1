//! Collaborator traits and apply context
//!
//! The engine never touches the host itself. Current state comes from a
//! [`StateQuerier`], changes go through an [`ActionExecutor`], and progress
//! is reported to a [`ProgressCallback`]. Implementations live with the
//! caller (a real host, a staging root, an in-memory fake for tests).

use crate::report::EntryStatus;
use crate::resource::Resource;
use crate::types::{Action, ApplyResult, CurrentState, ResourceId};
use anyhow::Result;

/// Reports the current state of a resource on the host
///
/// Must be a pure read: querying twice without drift returns the same state.
pub trait StateQuerier: Send + Sync {
    fn current_state(&self, resource: &Resource) -> Result<CurrentState>;
}

/// Applies a resource's action on the host
///
/// Returns what changed. Any error (write failure, non-zero exit from the
/// package manager or a command) is reported as an action failure.
pub trait ActionExecutor: Send + Sync {
    fn apply(&self, resource: &Resource, ctx: &ApplyContext) -> Result<ApplyResult>;
}

/// Progress callback for convergence runs
pub trait ProgressCallback: Send {
    /// Called once before the first resource
    fn on_run_start(&mut self, total: usize);

    /// Called when starting to process a resource
    fn on_resource_start(&mut self, id: &ResourceId, description: &str);

    /// Called when a resource reaches a terminal status
    fn on_resource_complete(&mut self, id: &ResourceId, status: &EntryStatus);

    /// Called once after the deferred queue is drained or the run aborts
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_resource_start(&mut self, _id: &ResourceId, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _status: &EntryStatus) {}
    fn on_run_complete(&mut self) {}
}

/// Context passed to [`ActionExecutor::apply`]
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    /// Action to perform; differs from the declared action for notified
    /// resources declared with `nothing`
    pub action: Action,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl ApplyContext {
    pub fn new(action: Action, verbose: bool) -> Self {
        Self { action, verbose }
    }
}
