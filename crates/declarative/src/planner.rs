//! Execution planner - builds the resource collection and notification graph

use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::types::{ResourceId, ResourceKind, Timing};
use std::collections::HashMap;

/// A directed notify edge between two declared resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEdge {
    pub source: ResourceId,
    pub target: ResourceId,
    pub timing: Timing,
}

/// Handle to a resource declared in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    index: usize,
    id: ResourceId,
}

impl ResourceHandle {
    /// Position in declaration order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }
}

/// Resources in declaration order plus their notification edges
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    notifications: Vec<NotificationEdge>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource
    ///
    /// Validates the resource's attributes and rejects a second declaration
    /// of the same kind and name. Notifications carried by the resource are
    /// subscribed here; their targets are resolved by [`Self::validate`].
    pub fn declare(&mut self, resource: Resource) -> Result<ResourceHandle> {
        resource.validate()?;

        let id = resource.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateResource(id));
        }

        for notify in &resource.notifies {
            self.subscribe(id.clone(), notify.target.clone(), notify.timing);
        }

        let index = self.resources.len();
        log::trace!("declared {id} at position {index}");
        self.index.insert(id.clone(), index);
        self.resources.push(resource);

        Ok(ResourceHandle { index, id })
    }

    /// Add a notify edge from a declared resource
    pub fn notify(&mut self, source: &ResourceHandle, target: ResourceId, timing: Timing) {
        self.subscribe(source.id.clone(), target, timing);
    }

    fn subscribe(&mut self, source: ResourceId, target: ResourceId, timing: Timing) {
        let edge = NotificationEdge {
            source,
            target,
            timing,
        };
        if !self.notifications.contains(&edge) {
            self.notifications.push(edge);
        }
    }

    /// Resolve notification targets and reject cycles
    pub fn validate(&self) -> Result<()> {
        for edge in &self.notifications {
            if !self.index.contains_key(&edge.target) {
                return Err(Error::UnknownResource {
                    notifier: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }
        }

        if let Some(path) = self.find_cycle() {
            return Err(Error::NotificationCycle { path });
        }

        Ok(())
    }

    /// Depth-first search for a cycle in the notification graph
    fn find_cycle(&self) -> Option<Vec<ResourceId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            node: usize,
            plan: &ExecutionPlan,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<ResourceId>> {
            marks[node] = Mark::InProgress;
            stack.push(node);

            let id = plan.resources[node].id();
            for edge in plan.notifications.iter().filter(|e| e.source == id) {
                let Some(&next) = plan.index.get(&edge.target) else {
                    continue;
                };
                match marks[next] {
                    Mark::InProgress => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut path: Vec<ResourceId> = stack[start..]
                            .iter()
                            .map(|&n| plan.resources[n].id())
                            .collect();
                        path.push(plan.resources[next].id());
                        return Some(path);
                    }
                    Mark::Unvisited => {
                        if let Some(path) = visit(next, plan, marks, stack) {
                            return Some(path);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.resources.len()];
        let mut stack = Vec::new();
        for node in 0..self.resources.len() {
            if marks[node] == Mark::Unvisited
                && let Some(path) = visit(node, self, &mut marks, &mut stack)
            {
                return Some(path);
            }
        }
        None
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Look up a declared resource
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    /// Notify edges in subscription order
    pub fn notifications(&self) -> &[NotificationEdge] {
        &self.notifications
    }

    /// Edges leaving a resource, in subscription order
    pub fn notifications_from<'a>(
        &'a self,
        source: &'a ResourceId,
    ) -> impl Iterator<Item = &'a NotificationEdge> + 'a {
        self.notifications.iter().filter(move |e| &e.source == source)
    }

    /// Whether any resource notifies `target`
    pub fn is_notified(&self, target: &ResourceId) -> bool {
        self.notifications.iter().any(|e| &e.target == target)
    }

    /// Resources matching a target pattern, for display
    ///
    /// Target format: "kind" or "kind.name", where name matches as a substring.
    pub fn filter_by_target(&self, target: Option<&str>) -> Vec<&Resource> {
        match target {
            None => self.resources.iter().collect(),
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.resources
                    .iter()
                    .filter(|r| matches_filter(r, kind.as_deref(), name.as_deref()))
                    .collect()
            }
        }
    }

    /// Total number of resources in the plan
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((kind, name)) if kind.parse::<ResourceKind>().is_ok() || is_alias(kind) => {
            (Some(kind.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
    }
}

fn is_alias(kind: &str) -> bool {
    matches!(kind, "packages" | "files" | "commands" | "deletes")
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &Resource, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind {
        // Allow plural aliases
        let matches_kind = match k {
            "packages" => resource.kind() == ResourceKind::Package,
            "files" => resource.kind() == ResourceKind::File,
            "commands" | "execute" => resource.kind() == ResourceKind::Command,
            "deletes" => resource.kind() == ResourceKind::Delete,
            _ => resource.kind().as_str() == k,
        };
        if !matches_kind {
            return false;
        }
    }

    if let Some(n) = name
        && !resource.name().contains(n)
    {
        return false;
    }

    true
}
