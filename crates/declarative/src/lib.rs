//! # Declarative
//!
//! A desired-state applier for a single host.
//!
//! Resources declare what the host should look like; the engine queries
//! what it looks like now, applies only the actions that are required, and
//! fires notifications between resources whose state actually changed.
//!
//! ## Core Concepts
//!
//! - **Resource**: a typed declaration of desired state (package, file,
//!   command, deletion), identified by kind and name
//! - **ExecutionPlan**: resources in declaration order plus notify edges,
//!   validated before anything runs
//! - **Condition evaluation**: [`should_run`] compares desired state with
//!   the state reported by a [`StateQuerier`]
//! - **Notifier**: immediate and deferred notifications, each target run
//!   at most once per pass
//! - **Converger**: [`execute`] walks the plan and produces a [`RunReport`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     CommandSpec, ExecuteOptions, ExecutionPlan, FileSpec, Resource, ResourceId, Timing,
//!     execute_simple,
//! };
//!
//! let mut plan = ExecutionPlan::new();
//! plan.declare(
//!     Resource::file(
//!         FileSpec::new("/etc/pki/tls/certs/horizon.pem")
//!             .content(cert)
//!             .mode(0o644)
//!             .owner("root")
//!             .group("root"),
//!     )
//!     .notifies(ResourceId::command("restore-selinux-context"), Timing::Deferred),
//! )?;
//! plan.declare(
//!     Resource::command(CommandSpec::new(
//!         "restore-selinux-context",
//!         "restorecon -Rv /etc/httpd /etc/pki",
//!     ))
//!     .nothing(),
//! )?;
//!
//! let report = execute_simple(&plan, &ExecuteOptions::default(), &host, &host)?;
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`StateQuerier`]: reports current state (filesystem, package database)
//! - [`ActionExecutor`]: performs the actual change
//! - [`ProgressCallback`]: receives progress updates
//!
//! The engine itself performs no I/O.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod notifier;
pub mod planner;
pub mod report;
pub mod resource;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{ActionExecutor, ApplyContext, NoProgress, ProgressCallback, StateQuerier};
pub use diff::{
    ChangeKind, DiffSummary, ResourceDiff, action_required, compute_diffs, file_differences,
    group_by_kind, should_run,
};
pub use error::{Error, Result, RunAborted};
pub use executor::{execute, execute_simple};
pub use notifier::{Notification, Notifier};
pub use planner::{ExecutionPlan, NotificationEdge, ResourceHandle};
pub use report::{EntryStatus, ExecuteSummary, ReportEntry, RunOutcome, RunReport, Trigger};
pub use resource::{
    CommandSpec, ContentSource, DeleteSpec, FileSpec, Guard, MAX_MODE, Notify, PackageSpec,
    Resource, ResourceSpec,
};
pub use types::{
    Action, ApplyResult, CommandOutput, CurrentState, ExecuteOptions, FileMeta, ResourceId,
    ResourceKind, Timing,
};
