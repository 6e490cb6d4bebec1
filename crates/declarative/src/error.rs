//! Error types for declaring and converging resources
//!
//! Validation errors (`DuplicateResource`, `InvalidAttribute`,
//! `UnknownResource`, `NotificationCycle`) are raised before any action
//! runs. Execution errors (`StateQuery`, `ActionExecution`) abort a run
//! unless the failing resource is marked `ignore_failure`.

use crate::report::RunReport;
use crate::types::ResourceId;
use thiserror::Error;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum Error {
    /// The same kind and name was declared twice in one plan
    #[error("duplicate resource: {0} is already declared")]
    DuplicateResource(ResourceId),

    /// An attribute failed its per-kind validation
    #[error("invalid attribute `{attribute}` on {resource}: {message}")]
    InvalidAttribute {
        resource: ResourceId,
        attribute: &'static str,
        message: String,
    },

    /// A notification targets a resource that was never declared
    #[error("{notifier} notifies {target}, which is not declared")]
    UnknownResource {
        notifier: ResourceId,
        target: ResourceId,
    },

    /// The notification graph would re-trigger a resource
    #[error("notification cycle: {}", format_path(.path))]
    NotificationCycle { path: Vec<ResourceId> },

    /// The state querier could not report current state
    #[error("failed to query state of {resource}: {message}")]
    StateQuery { resource: ResourceId, message: String },

    /// The action executor failed to apply a resource
    #[error("failed to apply {resource}: {message}")]
    ActionExecution { resource: ResourceId, message: String },
}

impl Error {
    /// Whether this error belongs to the validation phase
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResource(_)
                | Self::InvalidAttribute { .. }
                | Self::UnknownResource { .. }
                | Self::NotificationCycle { .. }
        )
    }
}

fn format_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A convergence run that stopped on a fatal error
///
/// The report is sealed and lists exactly the resources attempted
/// before the failure.
#[derive(Debug, Error)]
#[error("convergence aborted after {} report entries", .report.entries().len())]
pub struct RunAborted {
    pub report: RunReport,
    #[source]
    pub error: Error,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
