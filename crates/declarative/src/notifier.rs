//! Notification bookkeeping for a single convergence run
//!
//! Edges fire only when their source actually changed state, each edge at
//! most once per run. Deferred targets are queued in the order they were
//! first notified and run once each, no matter how many sources notified
//! them. A target that already executed this run is never queued again.

use crate::planner::NotificationEdge;
use crate::types::{ResourceId, Timing};
use std::collections::{HashSet, VecDeque};

/// A pending notified execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: ResourceId,
    /// The resource whose change caused this notification
    pub notified_by: ResourceId,
    pub timing: Timing,
}

#[derive(Debug, Default)]
pub struct Notifier {
    edges: Vec<NotificationEdge>,
    fired: HashSet<usize>,
    deferred: VecDeque<Notification>,
    queued: HashSet<ResourceId>,
    executed: HashSet<ResourceId>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a notifier preloaded with a plan's edges
    pub fn from_edges(edges: &[NotificationEdge]) -> Self {
        let mut notifier = Self::new();
        for edge in edges {
            notifier.subscribe(edge.source.clone(), edge.target.clone(), edge.timing);
        }
        notifier
    }

    pub fn subscribe(&mut self, source: ResourceId, target: ResourceId, timing: Timing) {
        let edge = NotificationEdge {
            source,
            target,
            timing,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Record that a resource's action was applied this run
    pub fn mark_executed(&mut self, id: &ResourceId) {
        self.executed.insert(id.clone());
    }

    pub fn has_executed(&self, id: &ResourceId) -> bool {
        self.executed.contains(id)
    }

    /// Fire the edges leaving `source`
    ///
    /// Does nothing unless `changed`. Deferred targets are queued; the
    /// immediate targets are returned, in subscription order, for the
    /// caller to run right away.
    pub fn fire(&mut self, source: &ResourceId, changed: bool) -> Vec<Notification> {
        if !changed {
            return Vec::new();
        }

        let mut immediate = Vec::new();
        for (i, edge) in self.edges.iter().enumerate() {
            if &edge.source != source || self.fired.contains(&i) {
                continue;
            }
            self.fired.insert(i);

            if self.executed.contains(&edge.target) {
                log::debug!(
                    "{} already executed, ignoring notification from {source}",
                    edge.target
                );
                continue;
            }

            let notification = Notification {
                target: edge.target.clone(),
                notified_by: source.clone(),
                timing: edge.timing,
            };
            match edge.timing {
                Timing::Immediate => immediate.push(notification),
                Timing::Deferred => {
                    if self.queued.insert(edge.target.clone()) {
                        log::debug!("queued {} (notified by {source})", edge.target);
                        self.deferred.push_back(notification);
                    }
                }
            }
        }
        immediate
    }

    /// Take the next deferred notification, in enqueue order
    pub fn pop_deferred(&mut self) -> Option<Notification> {
        self.deferred.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }
}
