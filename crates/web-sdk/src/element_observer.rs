//! Tracks the set of elements under a root that satisfy a delegate's
//! predicate, reporting each element's entry and exit exactly once.

use std::sync::{Arc, Weak};

use datalayer_dom::{Document, MutationObserverId, MutationRecord, NodeId};
use parking_lot::Mutex;
use tracing::{debug, trace};

pub trait ElementObserverDelegate: Send + Sync {
    fn match_element(&self, document: &Document, element: NodeId) -> bool;

    /// Matching elements in `tree`, including `tree` itself, in document order.
    fn match_elements_in_tree(&self, document: &Document, tree: NodeId) -> Vec<NodeId>;

    fn element_matched(&self, _document: &Document, _element: NodeId) {}

    fn element_unmatched(&self, _document: &Document, _element: NodeId) {}

    fn element_attribute_changed(&self, _document: &Document, _element: NodeId, _attribute_name: &str) {}
}

#[derive(Default)]
struct ObserverState {
    started: bool,
    mutation_observer: Option<MutationObserverId>,
    /// Tracked elements in match order.
    elements: Vec<NodeId>,
}

struct Inner {
    document: Document,
    root: NodeId,
    delegate: Arc<dyn ElementObserverDelegate>,
    state: Mutex<ObserverState>,
}

#[derive(Clone)]
pub struct ElementObserver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ElementObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ElementObserver")
            .field("root", &self.inner.root)
            .field("started", &state.started)
            .field("elements", &state.elements.len())
            .finish()
    }
}

impl ElementObserver {
    pub fn new(
        document: Document,
        root: NodeId,
        delegate: Arc<dyn ElementObserverDelegate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                document,
                root,
                delegate,
                state: Mutex::new(ObserverState::default()),
            }),
        }
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    pub fn elements(&self) -> Vec<NodeId> {
        self.inner.state.lock().elements.clone()
    }

    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.started {
                return;
            }
            state.started = true;
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let id = self
                .inner
                .document
                .observe_mutations(self.inner.root, move |document, records| {
                    if let Some(inner) = weak.upgrade() {
                        inner.process_mutations(document, records);
                    }
                });
            state.mutation_observer = Some(id);
        }
        debug!(root = %self.inner.root, "element observer started");
        self.refresh();
    }

    /// Pending records are discarded; the matched set is kept.
    pub fn stop(&self) {
        let id = {
            let mut state = self.inner.state.lock();
            if !state.started {
                return;
            }
            state.started = false;
            state.mutation_observer.take()
        };
        if let Some(id) = id {
            let discarded = self.inner.document.take_records(id);
            self.inner.document.disconnect_mutations(id);
            debug!(root = %self.inner.root, discarded = discarded.len(), "element observer stopped");
        }
    }

    /// Reconcile the tracked set with the current tree.
    pub fn refresh(&self) {
        self.inner.refresh(&self.inner.document);
    }
}

impl Inner {
    fn started(&self) -> bool {
        self.state.lock().started
    }

    fn is_tracked(&self, element: NodeId) -> bool {
        self.state.lock().elements.contains(&element)
    }

    fn refresh(&self, document: &Document) {
        if !self.started() {
            return;
        }
        let matches = self.delegate.match_elements_in_tree(document, self.root);
        let stale: Vec<NodeId> = self
            .state
            .lock()
            .elements
            .iter()
            .copied()
            .filter(|e| !matches.contains(e))
            .collect();
        for element in stale {
            self.remove_element(document, element);
        }
        for element in matches {
            self.add_element(document, element);
        }
    }

    fn process_mutations(&self, document: &Document, records: &[MutationRecord]) {
        for record in records {
            if !self.started() {
                return;
            }
            match record {
                MutationRecord::Attributes {
                    target,
                    attribute_name,
                } => self.process_attribute_change(document, *target, attribute_name),
                MutationRecord::ChildList { added, removed, .. } => {
                    for node in removed {
                        self.process_removed_node(document, *node);
                    }
                    for node in added {
                        self.process_added_node(document, *node);
                    }
                }
            }
        }
    }

    fn process_attribute_change(&self, document: &Document, element: NodeId, attribute_name: &str) {
        if self.is_tracked(element) {
            if self.delegate.match_element(document, element) {
                self.delegate
                    .element_attribute_changed(document, element, attribute_name);
            } else {
                self.remove_element(document, element);
            }
        } else if self.delegate.match_element(document, element) {
            self.add_element(document, element);
        }
    }

    fn process_removed_node(&self, document: &Document, node: NodeId) {
        if !document.is_element(node) {
            return;
        }
        for element in self.delegate.match_elements_in_tree(document, node) {
            self.remove_element(document, element);
        }
    }

    fn process_added_node(&self, document: &Document, node: NodeId) {
        if !document.is_element(node) || !self.element_is_active(document, node) {
            return;
        }
        for element in self.delegate.match_elements_in_tree(document, node) {
            self.add_element(document, element);
        }
    }

    /// Connected the same way the root is, and inside it.
    fn element_is_active(&self, document: &Document, element: NodeId) -> bool {
        document.is_connected(element) == document.is_connected(self.root)
            && document.contains(self.root, element)
    }

    fn add_element(&self, document: &Document, element: NodeId) {
        if !self.element_is_active(document, element) {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.elements.contains(&element) {
                return;
            }
            state.elements.push(element);
        }
        trace!(%element, "element matched");
        self.delegate.element_matched(document, element);
    }

    fn remove_element(&self, document: &Document, element: NodeId) {
        {
            let mut state = self.state.lock();
            let Some(position) = state.elements.iter().position(|e| *e == element) else {
                return;
            };
            state.elements.remove(position);
        }
        trace!(%element, "element unmatched");
        self.delegate.element_unmatched(document, element);
    }
}
