//! Subtree mutation observation. Records are queued when the mutation
//! happens and handed to callbacks at the next delivery checkpoint.

use std::sync::Arc;

use crate::document::{Document, Tree};
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    Attributes {
        target: NodeId,
        attribute_name: String,
    },
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeId {
        match self {
            MutationRecord::Attributes { target, .. } | MutationRecord::ChildList { target, .. } => {
                *target
            }
        }
    }

    pub(crate) fn added(target: NodeId, node: NodeId) -> Self {
        MutationRecord::ChildList {
            target,
            added: vec![node],
            removed: Vec::new(),
        }
    }

    pub(crate) fn removed(target: NodeId, node: NodeId) -> Self {
        MutationRecord::ChildList {
            target,
            added: Vec::new(),
            removed: vec![node],
        }
    }
}

pub type MutationCallback = Arc<dyn Fn(&Document, &[MutationRecord]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationObserverId(u64);

struct Registration {
    id: MutationObserverId,
    root: NodeId,
    callback: MutationCallback,
    queue: Vec<MutationRecord>,
}

#[derive(Default)]
pub(crate) struct MutationRegistry {
    next_id: u64,
    observers: Vec<Registration>,
}

impl MutationRegistry {
    pub(crate) fn register(&mut self, root: NodeId, callback: MutationCallback) -> MutationObserverId {
        self.next_id += 1;
        let id = MutationObserverId(self.next_id);
        self.observers.push(Registration {
            id,
            root,
            callback,
            queue: Vec::new(),
        });
        id
    }

    pub(crate) fn unregister(&mut self, id: MutationObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    pub(crate) fn take(&mut self, id: MutationObserverId) -> Vec<MutationRecord> {
        self.observers
            .iter_mut()
            .find(|o| o.id == id)
            .map(|o| std::mem::take(&mut o.queue))
            .unwrap_or_default()
    }

    /// Queue `record` for every observer whose root contains its target.
    pub(crate) fn enqueue(&mut self, tree: &Tree, record: &MutationRecord) -> bool {
        let mut queued = false;
        for observer in &mut self.observers {
            if tree.contains(observer.root, record.target()) {
                observer.queue.push(record.clone());
                queued = true;
            }
        }
        queued
    }

    pub(crate) fn drain_pending(&mut self) -> Vec<(MutationCallback, Vec<MutationRecord>)> {
        self.observers
            .iter_mut()
            .filter(|o| !o.queue.is_empty())
            .map(|o| (o.callback.clone(), std::mem::take(&mut o.queue)))
            .collect()
    }
}
