//! Condition evaluation and diff computation for resources

use crate::context::StateQuerier;
use crate::error::{Error, Result};
use crate::resource::{FileSpec, PackageSpec, Resource, ResourceSpec};
use crate::types::{Action, CurrentState, FileMeta, ResourceId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decide whether a resource's declared action must run
///
/// Pure: looks only at the resource and the reported state. Resources
/// declared with `nothing` never run from their declaration slot.
pub fn should_run(resource: &Resource, state: &CurrentState) -> bool {
    action_required(resource, resource.action, state)
}

/// Decide whether `action` must run for `resource` given its current state
pub fn action_required(resource: &Resource, action: Action, state: &CurrentState) -> bool {
    match (&resource.spec, state) {
        (
            ResourceSpec::Package(spec),
            CurrentState::Package {
                installed,
                candidate,
            },
        ) => package_needs_action(spec, action, installed.as_deref(), candidate.as_deref()),
        (ResourceSpec::File(spec), CurrentState::File(meta)) => {
            action == Action::Create && !file_differences(spec, meta.as_ref()).is_empty()
        }
        (ResourceSpec::Command(_), CurrentState::Command { guard_satisfied }) => {
            action == Action::Run && !guard_satisfied.unwrap_or(false)
        }
        (ResourceSpec::Delete(_), CurrentState::Path { exists }) => {
            action == Action::Delete && *exists
        }
        _ => false,
    }
}

fn package_needs_action(
    spec: &PackageSpec,
    action: Action,
    installed: Option<&str>,
    candidate: Option<&str>,
) -> bool {
    match action {
        Action::Install => match (&spec.version, installed) {
            (_, None) => true,
            (Some(wanted), Some(have)) => wanted != have,
            (None, Some(_)) => false,
        },
        Action::Upgrade => match (installed, candidate) {
            (None, _) => true,
            (Some(have), Some(latest)) => have != latest,
            (Some(_), None) => false,
        },
        Action::Remove => installed.is_some(),
        _ => false,
    }
}

/// List what differs between a desired file and its observed metadata
///
/// Owner and group are only compared when declared.
pub fn file_differences(spec: &FileSpec, meta: Option<&FileMeta>) -> Vec<String> {
    let Some(meta) = meta else {
        return vec!["absent".to_string()];
    };

    let mut diffs = Vec::new();
    if meta.content_hash != spec.content_hash() {
        diffs.push("content".to_string());
    }
    if let Some(mode) = spec.mode
        && meta.mode != mode
    {
        diffs.push(format!("mode {:04o} -> {mode:04o}", meta.mode));
    }
    if let Some(owner) = &spec.owner
        && &meta.owner != owner
    {
        diffs.push(format!("owner {} -> {owner}", meta.owner));
    }
    if let Some(group) = &spec.group
        && &meta.group != group
    {
        diffs.push(format!("group {} -> {group}", meta.group));
    }
    diffs
}

/// Kind of change a diff represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Remove,
    Run,
}

/// A diff between current and desired state of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub resource_id: ResourceId,
    /// Human-readable description
    pub description: String,
    pub change: ChangeKind,
    /// Summary of the current state
    pub current: String,
    /// Summary of the desired state
    pub desired: String,
    /// Individual attribute differences (files only)
    pub details: Vec<String>,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    pub fn from_resource(
        resource: &Resource,
        querier: &(impl StateQuerier + ?Sized),
    ) -> Result<Option<Self>> {
        let id = resource.id();
        let state = querier
            .current_state(resource)
            .map_err(|e| Error::StateQuery {
                resource: id.clone(),
                message: format!("{e:#}"),
            })?;
        Ok(Self::from_state(resource, &state))
    }

    /// Build a diff from an already queried state
    pub fn from_state(resource: &Resource, state: &CurrentState) -> Option<Self> {
        if !should_run(resource, state) {
            return None;
        }

        let (change, current, desired, details) = match (&resource.spec, state) {
            (ResourceSpec::Package(spec), CurrentState::Package { installed, candidate }) => {
                let current = installed
                    .as_ref()
                    .map_or_else(|| "not installed".to_string(), |v| format!("installed {v}"));
                let (change, desired) = match resource.action {
                    Action::Remove => (ChangeKind::Remove, "removed".to_string()),
                    Action::Upgrade => (
                        if installed.is_some() {
                            ChangeKind::Update
                        } else {
                            ChangeKind::Create
                        },
                        candidate
                            .as_ref()
                            .map_or_else(|| "latest".to_string(), |c| format!("latest ({c})")),
                    ),
                    _ => (
                        if installed.is_some() {
                            ChangeKind::Update
                        } else {
                            ChangeKind::Create
                        },
                        spec.version
                            .as_ref()
                            .map_or_else(|| "installed".to_string(), |v| format!("version {v}")),
                    ),
                };
                (change, current, desired, Vec::new())
            }
            (ResourceSpec::File(spec), CurrentState::File(meta)) => {
                let details = file_differences(spec, meta.as_ref());
                let current = meta.as_ref().map_or_else(
                    || "absent".to_string(),
                    |m| format!("{:04o} {}:{}", m.mode, m.owner, m.group),
                );
                let desired = format!(
                    "{} {}:{}",
                    spec.mode
                        .map_or_else(|| "----".to_string(), |m| format!("{m:04o}")),
                    spec.owner.as_deref().unwrap_or("-"),
                    spec.group.as_deref().unwrap_or("-"),
                );
                let change = if meta.is_some() {
                    ChangeKind::Update
                } else {
                    ChangeKind::Create
                };
                (change, current, desired, details)
            }
            (ResourceSpec::Command(spec), CurrentState::Command { guard_satisfied }) => {
                let current = match (guard_satisfied, &spec.guard) {
                    (Some(false), Some(guard)) => format!("guard not satisfied: {}", guard.command()),
                    _ => "unguarded".to_string(),
                };
                (ChangeKind::Run, current, spec.command.clone(), Vec::new())
            }
            (ResourceSpec::Delete(_), CurrentState::Path { .. }) => (
                ChangeKind::Remove,
                "exists".to_string(),
                "absent".to_string(),
                Vec::new(),
            ),
            _ => return None,
        };

        Some(Self {
            resource_id: resource.id(),
            description: resource.description(),
            change,
            current,
            desired,
            details,
        })
    }
}

/// Compute diffs for a list of resources
///
/// State queries are read-only, so they run in parallel. Returns only
/// resources whose declared action would run, in declaration order.
pub fn compute_diffs<Q>(resources: &[&Resource], querier: &Q) -> Result<Vec<ResourceDiff>>
where
    Q: StateQuerier + ?Sized,
{
    let diffs: Vec<Option<ResourceDiff>> = resources
        .par_iter()
        .map(|r| ResourceDiff::from_resource(r, querier))
        .collect::<Result<_>>()?;
    Ok(diffs.into_iter().flatten().collect())
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub removals: usize,
    pub runs: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                ChangeKind::Create => summary.creates += 1,
                ChangeKind::Update => summary.updates += 1,
                ChangeKind::Remove => summary.removals += 1,
                ChangeKind::Run => summary.runs += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.removals + self.runs
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<String, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<String, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_id.kind.to_string())
            .or_default()
            .push(diff);
    }
    groups
}
