//! Viewport intersection tracking.

use std::sync::Arc;

use crate::document::{Document, Tree};
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub intersection_ratio: f64,
    pub is_intersecting: bool,
}

pub type IntersectionCallback =
    Arc<dyn Fn(&Document, &[IntersectionEntry], &IntersectionObserver) + Send + Sync>;

/// Handle returned by [`Document::create_intersection_observer`].
#[derive(Clone)]
pub struct IntersectionObserver {
    id: u64,
    document: Document,
}

impl std::fmt::Debug for IntersectionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntersectionObserver").field("id", &self.id).finish()
    }
}

impl IntersectionObserver {
    pub(crate) fn new(id: u64, document: Document) -> Self {
        Self { id, document }
    }

    pub fn observe(&self, node: NodeId) {
        self.document
            .with_intersections(|registry| registry.observe(self.id, node));
    }

    pub fn unobserve(&self, node: NodeId) {
        self.document
            .with_intersections(|registry| registry.unobserve(self.id, node));
    }

    pub fn disconnect(&self) {
        self.document
            .with_intersections(|registry| registry.remove(self.id));
    }

    pub fn is_observing(&self, node: NodeId) -> bool {
        self.document
            .with_intersections(|registry| registry.is_observing(self.id, node))
    }
}

struct Target {
    node: NodeId,
    /// `None` until the first report.
    last_state: Option<bool>,
}

struct Registration {
    id: u64,
    threshold: f64,
    callback: IntersectionCallback,
    targets: Vec<Target>,
}

#[derive(Default)]
pub(crate) struct IntersectionRegistry {
    next_id: u64,
    observers: Vec<Registration>,
}

impl IntersectionRegistry {
    pub(crate) fn register(&mut self, threshold: f64, callback: IntersectionCallback) -> u64 {
        self.next_id += 1;
        self.observers.push(Registration {
            id: self.next_id,
            threshold: threshold.clamp(0.0, 1.0),
            callback,
            targets: Vec::new(),
        });
        self.next_id
    }

    fn observe(&mut self, id: u64, node: NodeId) {
        if let Some(obs) = self.observers.iter_mut().find(|o| o.id == id) {
            if !obs.targets.iter().any(|t| t.node == node) {
                obs.targets.push(Target {
                    node,
                    last_state: None,
                });
            }
        }
    }

    fn unobserve(&mut self, id: u64, node: NodeId) {
        if let Some(obs) = self.observers.iter_mut().find(|o| o.id == id) {
            obs.targets.retain(|t| t.node != node);
        }
    }

    fn remove(&mut self, id: u64) {
        self.observers.retain(|o| o.id != id);
    }

    fn is_observing(&self, id: u64, node: NodeId) -> bool {
        self.observers
            .iter()
            .find(|o| o.id == id)
            .is_some_and(|o| o.targets.iter().any(|t| t.node == node))
    }

    /// Compute entries for targets that are new or crossed their threshold.
    pub(crate) fn collect(&mut self, tree: &Tree) -> Vec<(u64, IntersectionCallback, Vec<IntersectionEntry>)> {
        let mut out = Vec::new();
        for obs in &mut self.observers {
            let mut entries = Vec::new();
            for target in &mut obs.targets {
                let ratio = tree.intersection_ratio(target.node);
                let intersecting = if obs.threshold <= 0.0 {
                    ratio > 0.0
                } else {
                    ratio >= obs.threshold
                };
                if target.last_state != Some(intersecting) {
                    target.last_state = Some(intersecting);
                    entries.push(IntersectionEntry {
                        target: target.node,
                        intersection_ratio: ratio,
                        is_intersecting: intersecting,
                    });
                }
            }
            if !entries.is_empty() {
                out.push((obs.id, obs.callback.clone(), entries));
            }
        }
        out
    }
}
