use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{DomError, DomResult};
use crate::events::{DomEvent, DomEventType, EventListener, ListenerId, ListenerRegistry};
use crate::intersection::{
    IntersectionCallback, IntersectionEntry, IntersectionObserver, IntersectionRegistry,
};
use crate::mutation::{MutationCallback, MutationObserverId, MutationRecord, MutationRegistry};
use crate::node::{Node, NodeId, NodeKind, Rect};

pub(crate) struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    viewport: Rect,
}

impl Tree {
    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(id.index()).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(DomError::UnknownNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        let node = self.node_mut(id)?;
        if !node.is_element() {
            return Err(DomError::NotAnElement(id));
        }
        Ok(node)
    }

    fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Inclusive: a node contains itself.
    pub(crate) fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Pre-order descendants, excluding `node` itself.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .get(node)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = self.get(id) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.parent(child)?;
        if let Some(p) = self.nodes.get_mut(parent.index()) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(child.index()) {
            c.parent = None;
        }
        Some(parent)
    }

    fn text_content(&self, node: NodeId) -> String {
        let Some(n) = self.get(node) else {
            return String::new();
        };
        if let NodeKind::Text(text) = &n.kind {
            return text.clone();
        }
        self.descendants(node)
            .into_iter()
            .filter_map(|id| match self.get(id).map(|n| &n.kind) {
                Some(NodeKind::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|id| self.get(*id).and_then(Node::tag) == Some("option"))
            .collect()
    }

    fn selected_index(&self, select: NodeId) -> Option<usize> {
        let options = self.options(select);
        if options.is_empty() {
            return None;
        }
        if let Some(index) = self.get(select).and_then(|n| n.selected_index) {
            return (index < options.len()).then_some(index);
        }
        Some(
            options
                .iter()
                .position(|id| self.get(*id).is_some_and(|o| o.attribute("selected").is_some()))
                .unwrap_or(0),
        )
    }

    fn selected_option(&self, select: NodeId) -> Option<NodeId> {
        let index = self.selected_index(select)?;
        self.options(select).get(index).copied()
    }

    pub(crate) fn intersection_ratio(&self, node: NodeId) -> f64 {
        if !self.is_connected(node) {
            return 0.0;
        }
        let Some(rect) = self.get(node).and_then(|n| n.rect) else {
            return 0.0;
        };
        let area = rect.area();
        if area <= 0.0 {
            return 0.0;
        }
        rect.intersection(&self.viewport)
            .map_or(0.0, |inter| (inter.area() / area).min(1.0))
    }
}

struct Inner {
    tree: RwLock<Tree>,
    mutations: Mutex<MutationRegistry>,
    listeners: Mutex<ListenerRegistry>,
    intersections: Mutex<IntersectionRegistry>,
    pending: Notify,
}

/// In-memory document. Cloning yields another handle to the same tree.
///
/// Locks are never held while user callbacks run, so observers and
/// listeners may freely read and mutate the document they are given.
#[derive(Clone)]
pub struct Document {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.inner.tree.read().nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub const DEFAULT_VIEWPORT: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 1280.0,
        height: 800.0,
    };

    /// Creates `<html>` with an empty `<body>`.
    pub fn new() -> Self {
        let mut html = Node::element("html");
        let mut body = Node::element("body");
        html.children.push(NodeId(1));
        body.parent = Some(NodeId(0));
        let tree = Tree {
            nodes: vec![html, body],
            root: NodeId(0),
            viewport: Self::DEFAULT_VIEWPORT,
        };
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(tree),
                mutations: Mutex::new(MutationRegistry::default()),
                listeners: Mutex::new(ListenerRegistry::default()),
                intersections: Mutex::new(IntersectionRegistry::default()),
                pending: Notify::new(),
            }),
        }
    }

    pub fn root(&self) -> NodeId {
        self.inner.tree.read().root
    }

    pub fn body(&self) -> NodeId {
        NodeId(1)
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.tree.write().push(Node::element(tag))
    }

    pub fn create_text_node(&self, text: &str) -> NodeId {
        self.inner.tree.write().push(Node::text(text))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tree) -> DomResult<(T, Vec<MutationRecord>)>,
    ) -> DomResult<T> {
        let mut tree = self.inner.tree.write();
        let (out, records) = f(&mut tree)?;
        if records.is_empty() {
            return Ok(out);
        }
        let mut queued = false;
        {
            let mut registry = self.inner.mutations.lock();
            for record in &records {
                queued |= registry.enqueue(&tree, record);
            }
        }
        drop(tree);
        if queued {
            self.inner.pending.notify_one();
        }
        Ok(out)
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference`, or at the end when `reference` is `None`.
    /// A child that already has a parent is moved.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        self.mutate(|tree| {
            tree.element_mut(parent)?;
            tree.node(child)?;
            if tree.contains(child, parent) {
                return Err(DomError::HierarchyRequest { parent, child });
            }
            if let Some(reference) = reference {
                if reference == child || tree.parent(reference) != Some(parent) {
                    return Err(DomError::NotAChild {
                        parent,
                        child: reference,
                    });
                }
            }
            let mut records = Vec::new();
            if let Some(old) = tree.detach(child) {
                records.push(MutationRecord::removed(old, child));
            }
            let node = tree.node_mut(parent)?;
            let position = reference
                .and_then(|r| node.children.iter().position(|c| *c == r))
                .unwrap_or(node.children.len());
            node.children.insert(position, child);
            tree.node_mut(child)?.parent = Some(parent);
            records.push(MutationRecord::added(parent, child));
            Ok(((), records))
        })
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.mutate(|tree| {
            tree.node(parent)?;
            if tree.parent(child) != Some(parent) {
                return Err(DomError::NotAChild { parent, child });
            }
            tree.detach(child);
            Ok(((), vec![MutationRecord::removed(parent, child)]))
        })
    }

    /// Detach `node` from its parent. No-op for detached nodes.
    pub fn remove(&self, node: NodeId) -> DomResult<()> {
        match self.parent(node) {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.mutate(|tree| {
            let element = tree.element_mut(node)?;
            match element.attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => element
                    .attributes
                    .push((name.to_string(), value.to_string())),
            }
            Ok((
                (),
                vec![MutationRecord::Attributes {
                    target: node,
                    attribute_name: name.to_string(),
                }],
            ))
        })
    }

    /// Returns whether the attribute was present.
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> DomResult<bool> {
        self.mutate(|tree| {
            let element = tree.element_mut(node)?;
            let before = element.attributes.len();
            element.attributes.retain(|(n, _)| n != name);
            if element.attributes.len() == before {
                return Ok((false, Vec::new()));
            }
            Ok((
                true,
                vec![MutationRecord::Attributes {
                    target: node,
                    attribute_name: name.to_string(),
                }],
            ))
        })
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .tree
            .read()
            .get(node)
            .and_then(|n| n.attribute(name))
            .map(str::to_string)
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.inner
            .tree
            .read()
            .get(node)
            .is_some_and(|n| n.attribute(name).is_some())
    }

    pub fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.inner
            .tree
            .read()
            .get(node)
            .map(|n| n.attributes.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Lower-case tag name; `None` for text nodes and unknown ids.
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner
            .tree
            .read()
            .get(node)
            .and_then(Node::tag)
            .map(str::to_string)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.inner.tree.read().get(node).is_some_and(Node::is_element)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.read().parent(node)
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.inner.tree.read();
        tree.parent(node).filter(|p| tree.get(*p).is_some_and(Node::is_element))
    }

    pub fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .tree
            .read()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Element children only.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        tree.get(node)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| tree.get(*c).is_some_and(Node::is_element))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nearest inclusive ancestor element carrying `attribute`.
    pub fn closest_with_attribute(&self, node: NodeId, attribute: &str) -> Option<NodeId> {
        let tree = self.inner.tree.read();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = tree.get(id)?;
            if n.is_element() && n.attribute(attribute).is_some() {
                return Some(id);
            }
            current = n.parent;
        }
        None
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.tree.read().contains(ancestor, node)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.inner.tree.read().is_connected(node)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.inner.tree.read().text_content(node)
    }

    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.read().descendants(node)
    }

    pub fn descendants_with_attribute(&self, node: NodeId, attribute: &str) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        tree.descendants(node)
            .into_iter()
            .filter(|id| tree.get(*id).is_some_and(|n| n.attribute(attribute).is_some()))
            .collect()
    }

    pub fn descendants_by_tag(&self, node: NodeId, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        let tree = self.inner.tree.read();
        tree.descendants(node)
            .into_iter()
            .filter(|id| tree.get(*id).and_then(Node::tag) == Some(tag.as_str()))
            .collect()
    }

    /// First connected element whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let tree = self.inner.tree.read();
        tree.descendants(tree.root)
            .into_iter()
            .find(|n| tree.get(*n).and_then(|node| node.attribute("id")) == Some(id))
    }

    // ---- form state ----

    /// Current value: the selected option for `<select>`, otherwise the
    /// value property falling back to the `value` attribute.
    pub fn value(&self, node: NodeId) -> String {
        let tree = self.inner.tree.read();
        let Some(n) = tree.get(node) else {
            return String::new();
        };
        if n.tag() == Some("select") {
            return tree
                .selected_option(node)
                .and_then(|opt| {
                    tree.get(opt).map(|o| {
                        o.attribute("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| tree.text_content(opt))
                    })
                })
                .unwrap_or_default();
        }
        n.value
            .clone()
            .or_else(|| n.attribute("value").map(str::to_string))
            .unwrap_or_default()
    }

    pub fn set_value(&self, node: NodeId, value: &str) -> DomResult<()> {
        let mut tree = self.inner.tree.write();
        tree.element_mut(node)?.value = Some(value.to_string());
        Ok(())
    }

    pub fn checked(&self, node: NodeId) -> bool {
        self.inner
            .tree
            .read()
            .get(node)
            .is_some_and(|n| n.checked.unwrap_or_else(|| n.attribute("checked").is_some()))
    }

    pub fn set_checked(&self, node: NodeId, checked: bool) -> DomResult<()> {
        let mut tree = self.inner.tree.write();
        tree.element_mut(node)?.checked = Some(checked);
        Ok(())
    }

    pub fn selected_index(&self, node: NodeId) -> Option<usize> {
        self.inner.tree.read().selected_index(node)
    }

    pub fn set_selected_index(&self, node: NodeId, index: usize) -> DomResult<()> {
        let mut tree = self.inner.tree.write();
        tree.element_mut(node)?.selected_index = Some(index);
        Ok(())
    }

    pub fn selected_option_text(&self, node: NodeId) -> Option<String> {
        let tree = self.inner.tree.read();
        tree.selected_option(node).map(|opt| tree.text_content(opt))
    }

    /// Lower-cased `type` attribute of an input.
    pub fn input_type(&self, node: NodeId) -> Option<String> {
        self.get_attribute(node, "type").map(|t| t.to_ascii_lowercase())
    }

    // ---- mutation observers ----

    /// Observe attribute and child-list changes anywhere in `root`'s subtree.
    pub fn observe_mutations(
        &self,
        root: NodeId,
        callback: impl Fn(&Document, &[MutationRecord]) + Send + Sync + 'static,
    ) -> MutationObserverId {
        let callback: MutationCallback = Arc::new(callback);
        self.inner.mutations.lock().register(root, callback)
    }

    /// Stop observing; queued records are discarded.
    pub fn disconnect_mutations(&self, id: MutationObserverId) -> bool {
        self.inner.mutations.lock().unregister(id)
    }

    /// Take and clear records queued for `id` without delivering them.
    pub fn take_records(&self, id: MutationObserverId) -> Vec<MutationRecord> {
        self.inner.mutations.lock().take(id)
    }

    /// Deliver queued records until no observer has any left. Returns the
    /// number of records delivered.
    pub fn deliver_mutations(&self) -> usize {
        let mut delivered = 0;
        loop {
            let batches = self.inner.mutations.lock().drain_pending();
            if batches.is_empty() {
                return delivered;
            }
            for (callback, records) in batches {
                trace!(records = records.len(), "delivering mutation records");
                delivered += records.len();
                callback(self, &records);
            }
        }
    }

    /// Resolves once a mutation record has been queued or the layout has
    /// changed since the last wake.
    pub async fn changes_pending(&self) {
        self.inner.pending.notified().await;
    }

    // ---- events ----

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event_type: DomEventType,
        listener: impl Fn(&Document, &DomEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let listener: EventListener = Arc::new(listener);
        self.inner.listeners.lock().add(node, event_type, listener)
    }

    pub fn remove_event_listener(&self, node: NodeId, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(node, id)
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.inner.listeners.lock().count(node)
    }

    /// Dispatch on `target`, then bubble through its ancestors for
    /// bubbling types. Returns the number of listeners invoked.
    pub fn dispatch_event(
        &self,
        target: NodeId,
        event_type: DomEventType,
        detail: Option<Value>,
    ) -> usize {
        let path: Vec<NodeId> = {
            let tree = self.inner.tree.read();
            if tree.get(target).is_none() {
                return 0;
            }
            if event_type.bubbles() {
                let mut path = vec![target];
                let mut current = tree.parent(target);
                while let Some(id) = current {
                    path.push(id);
                    current = tree.parent(id);
                }
                path
            } else {
                vec![target]
            }
        };

        let mut invoked = 0;
        for current_target in path {
            let listeners = self.inner.listeners.lock().matching(current_target, event_type);
            if listeners.is_empty() {
                continue;
            }
            let event = DomEvent {
                event_type,
                target,
                current_target,
                detail: detail.clone(),
            };
            for listener in listeners {
                listener(self, &event);
                invoked += 1;
            }
        }
        invoked
    }

    // ---- geometry ----

    pub fn set_bounding_rect(&self, node: NodeId, rect: Rect) -> DomResult<()> {
        self.inner.tree.write().node_mut(node)?.rect = Some(rect);
        self.inner.pending.notify_one();
        Ok(())
    }

    pub fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        self.inner.tree.read().get(node).and_then(|n| n.rect)
    }

    pub fn viewport(&self) -> Rect {
        self.inner.tree.read().viewport
    }

    pub fn set_viewport(&self, viewport: Rect) {
        self.inner.tree.write().viewport = viewport;
        self.inner.pending.notify_one();
    }

    /// Move the viewport so the element's top edge sits at the viewport top.
    pub fn scroll_into_view(&self, node: NodeId) -> DomResult<()> {
        let mut tree = self.inner.tree.write();
        let rect = tree.node(node)?.rect.unwrap_or_default();
        tree.viewport.x = rect.x;
        tree.viewport.y = rect.y;
        drop(tree);
        self.inner.pending.notify_one();
        Ok(())
    }

    // ---- intersection observers ----

    pub fn create_intersection_observer(
        &self,
        threshold: f64,
        callback: impl Fn(&Document, &[IntersectionEntry], &IntersectionObserver) + Send + Sync + 'static,
    ) -> IntersectionObserver {
        let callback: IntersectionCallback = Arc::new(callback);
        let id = self.inner.intersections.lock().register(threshold, callback);
        IntersectionObserver::new(id, self.clone())
    }

    pub(crate) fn with_intersections<T>(&self, f: impl FnOnce(&mut IntersectionRegistry) -> T) -> T {
        f(&mut self.inner.intersections.lock())
    }

    /// Recompute intersections and report changes. Returns the number of
    /// entries delivered.
    pub fn update_intersections(&self) -> usize {
        let batches = {
            let tree = self.inner.tree.read();
            self.inner.intersections.lock().collect(&tree)
        };
        let mut delivered = 0;
        for (id, callback, entries) in batches {
            delivered += entries.len();
            let observer = IntersectionObserver::new(id, self.clone());
            callback(self, &entries, &observer);
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn element_with(doc: &Document, tag: &str, parent: NodeId) -> NodeId {
        let el = doc.create_element(tag);
        doc.append_child(parent, el).unwrap();
        el
    }

    #[test]
    fn test_new_document_has_body() {
        let doc = Document::new();
        assert_eq!(doc.tag_name(doc.root()).as_deref(), Some("html"));
        assert_eq!(doc.tag_name(doc.body()).as_deref(), Some("body"));
        assert_eq!(doc.parent_element(doc.body()), Some(doc.root()));
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn test_append_and_move() {
        let doc = Document::new();
        let a = element_with(&doc, "div", doc.body());
        let b = element_with(&doc, "div", doc.body());
        let c = element_with(&doc, "span", a);
        doc.append_child(b, c).unwrap();
        assert_eq!(doc.children(a), Vec::<NodeId>::new());
        assert_eq!(doc.children(b), vec![c]);
        assert_eq!(doc.parent(c), Some(b));
    }

    #[test]
    fn test_cycle_rejected() {
        let doc = Document::new();
        let a = element_with(&doc, "div", doc.body());
        let b = element_with(&doc, "div", a);
        assert_eq!(
            doc.append_child(b, a),
            Err(DomError::HierarchyRequest { parent: b, child: a })
        );
        assert_eq!(
            doc.append_child(a, a),
            Err(DomError::HierarchyRequest { parent: a, child: a })
        );
    }

    #[test]
    fn test_insert_before_orders_children() {
        let doc = Document::new();
        let list = element_with(&doc, "ul", doc.body());
        let first = element_with(&doc, "li", list);
        let second = doc.create_element("li");
        doc.insert_before(list, second, Some(first)).unwrap();
        assert_eq!(doc.children(list), vec![second, first]);
    }

    #[test]
    fn test_remove_child_errors_for_non_child() {
        let doc = Document::new();
        let a = element_with(&doc, "div", doc.body());
        let b = doc.create_element("div");
        assert!(matches!(
            doc.remove_child(a, b),
            Err(DomError::NotAChild { .. })
        ));
        doc.remove(a).unwrap();
        assert!(!doc.is_connected(a));
        doc.remove(a).unwrap();
    }

    #[test]
    fn test_closest_and_queries() {
        let doc = Document::new();
        let outer = element_with(&doc, "section", doc.body());
        doc.set_attribute(outer, "data-layer-id", "outer").unwrap();
        let inner = element_with(&doc, "div", outer);
        let link = element_with(&doc, "a", inner);
        assert_eq!(doc.closest_with_attribute(link, "data-layer-id"), Some(outer));
        assert_eq!(doc.closest_with_attribute(outer, "data-layer-id"), Some(outer));
        assert_eq!(doc.descendants_with_attribute(doc.body(), "data-layer-id"), vec![outer]);
        assert_eq!(doc.descendants_by_tag(outer, "A"), vec![link]);
    }

    #[test]
    fn test_element_by_id_requires_connection() {
        let doc = Document::new();
        let detached = doc.create_element("div");
        doc.set_attribute(detached, "id", "x").unwrap();
        assert_eq!(doc.element_by_id("x"), None);
        doc.append_child(doc.body(), detached).unwrap();
        assert_eq!(doc.element_by_id("x"), Some(detached));
    }

    #[test]
    fn test_text_content_concatenates() {
        let doc = Document::new();
        let p = element_with(&doc, "p", doc.body());
        let t1 = doc.create_text_node("Hello ");
        let b = element_with(&doc, "b", p);
        let t2 = doc.create_text_node("world");
        doc.insert_before(p, t1, Some(b)).unwrap();
        doc.append_child(b, t2).unwrap();
        assert_eq!(doc.text_content(p), "Hello world");
        assert_eq!(doc.children(p), vec![b]);
    }

    #[test]
    fn test_select_state() {
        let doc = Document::new();
        let select = element_with(&doc, "select", doc.body());
        for (value, label) in [("s", "Small"), ("l", "Large")] {
            let opt = element_with(&doc, "option", select);
            doc.set_attribute(opt, "value", value).unwrap();
            let text = doc.create_text_node(label);
            doc.append_child(opt, text).unwrap();
        }
        assert_eq!(doc.selected_index(select), Some(0));
        assert_eq!(doc.value(select), "s");
        doc.set_selected_index(select, 1).unwrap();
        assert_eq!(doc.value(select), "l");
        assert_eq!(doc.selected_option_text(select).as_deref(), Some("Large"));
    }

    #[test]
    fn test_input_value_and_checked() {
        let doc = Document::new();
        let input = element_with(&doc, "input", doc.body());
        doc.set_attribute(input, "type", "CHECKBOX").unwrap();
        doc.set_attribute(input, "value", "initial").unwrap();
        assert_eq!(doc.value(input), "initial");
        assert_eq!(doc.input_type(input).as_deref(), Some("checkbox"));
        doc.set_value(input, "typed").unwrap();
        assert_eq!(doc.value(input), "typed");
        assert!(!doc.checked(input));
        doc.set_checked(input, true).unwrap();
        assert!(doc.checked(input));
    }

    #[test]
    fn test_mutations_queued_until_delivery() {
        let doc = Document::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.observe_mutations(doc.body(), move |_, records| {
            sink.lock().extend(records.iter().cloned());
        });
        let div = element_with(&doc, "div", doc.body());
        doc.set_attribute(div, "data-x", "1").unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(doc.deliver_mutations(), 2);
        let records = seen.lock().clone();
        assert_eq!(records[0], MutationRecord::added(doc.body(), div));
        assert_eq!(
            records[1],
            MutationRecord::Attributes {
                target: div,
                attribute_name: "data-x".into()
            }
        );
    }

    #[test]
    fn test_mutations_outside_root_ignored() {
        let doc = Document::new();
        let a = element_with(&doc, "div", doc.body());
        let b = element_with(&doc, "div", doc.body());
        let id = doc.observe_mutations(a, |_, _| {});
        doc.set_attribute(b, "x", "1").unwrap();
        assert!(doc.take_records(id).is_empty());
        doc.set_attribute(a, "x", "1").unwrap();
        assert_eq!(doc.take_records(id).len(), 1);
        assert_eq!(doc.deliver_mutations(), 0);
    }

    #[test]
    fn test_callback_mutations_delivered_in_same_checkpoint() {
        let doc = Document::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        doc.observe_mutations(doc.body(), move |doc, records| {
            counter.fetch_add(1, Ordering::SeqCst);
            for record in records {
                if let MutationRecord::ChildList { added, .. } = record {
                    for node in added {
                        if !doc.has_attribute(*node, "seen") {
                            doc.set_attribute(*node, "seen", "1").unwrap();
                        }
                    }
                }
            }
        });
        element_with(&doc, "div", doc.body());
        doc.deliver_mutations();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_drops_queue() {
        let doc = Document::new();
        let id = doc.observe_mutations(doc.body(), |_, _| panic!("should not run"));
        element_with(&doc, "div", doc.body());
        assert!(doc.disconnect_mutations(id));
        assert_eq!(doc.deliver_mutations(), 0);
    }

    #[test]
    fn test_event_bubbling_and_current_target() {
        let doc = Document::new();
        let outer = element_with(&doc, "div", doc.body());
        let button = element_with(&doc, "button", outer);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.add_event_listener(outer, DomEventType::Click, move |_, ev| {
            sink.lock().push((ev.target, ev.current_target));
        });
        assert_eq!(doc.dispatch_event(button, DomEventType::Click, None), 1);
        assert_eq!(seen.lock().as_slice(), &[(button, outer)]);
    }

    #[test]
    fn test_mouseenter_does_not_bubble() {
        let doc = Document::new();
        let outer = element_with(&doc, "div", doc.body());
        let inner = element_with(&doc, "span", outer);
        doc.add_event_listener(outer, DomEventType::MouseEnter, |_, _| {});
        assert_eq!(doc.dispatch_event(inner, DomEventType::MouseEnter, None), 0);
        assert_eq!(doc.dispatch_event(outer, DomEventType::MouseEnter, None), 1);
    }

    #[test]
    fn test_remove_event_listener() {
        let doc = Document::new();
        let el = element_with(&doc, "div", doc.body());
        let id = doc.add_event_listener(el, DomEventType::Click, |_, _| {});
        assert_eq!(doc.listener_count(el), 1);
        assert!(doc.remove_event_listener(el, id));
        assert!(!doc.remove_event_listener(el, id));
        assert_eq!(doc.dispatch_event(el, DomEventType::Click, None), 0);
    }

    #[test]
    fn test_intersection_reports_changes_only() {
        let doc = Document::new();
        doc.set_viewport(Rect::new(0.0, 0.0, 100.0, 100.0));
        let el = element_with(&doc, "div", doc.body());
        doc.set_bounding_rect(el, Rect::new(0.0, 500.0, 10.0, 10.0)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = doc.create_intersection_observer(1.0, move |_, entries, _| {
            sink.lock().extend(entries.iter().map(|e| e.is_intersecting));
        });
        observer.observe(el);
        assert_eq!(doc.update_intersections(), 1);
        assert_eq!(doc.update_intersections(), 0);
        doc.scroll_into_view(el).unwrap();
        assert_eq!(doc.update_intersections(), 1);
        assert_eq!(seen.lock().as_slice(), &[false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_layout_changes_wake_pending() {
        let doc = Document::new();
        let el = element_with(&doc, "div", doc.body());
        doc.set_bounding_rect(el, Rect::new(0.0, 500.0, 10.0, 10.0)).unwrap();
        doc.changes_pending().await;

        let wait = Duration::from_millis(10);
        assert!(tokio::time::timeout(wait, doc.changes_pending()).await.is_err());
        doc.scroll_into_view(el).unwrap();
        assert!(tokio::time::timeout(wait, doc.changes_pending()).await.is_ok());
        doc.set_viewport(Rect::new(0.0, 0.0, 50.0, 50.0));
        assert!(tokio::time::timeout(wait, doc.changes_pending()).await.is_ok());
    }

    #[test]
    fn test_partial_visibility_below_threshold() {
        let doc = Document::new();
        doc.set_viewport(Rect::new(0.0, 0.0, 100.0, 100.0));
        let el = element_with(&doc, "div", doc.body());
        doc.set_bounding_rect(el, Rect::new(0.0, 90.0, 10.0, 20.0)).unwrap();
        let ratio = Arc::new(Mutex::new(None));
        let sink = ratio.clone();
        let observer = doc.create_intersection_observer(1.0, move |_, entries, _| {
            *sink.lock() = entries.first().map(|e| (e.intersection_ratio, e.is_intersecting));
        });
        observer.observe(el);
        doc.update_intersections();
        assert_eq!(*ratio.lock(), Some((0.5, false)));
        observer.unobserve(el);
        assert!(!observer.is_observing(el));
    }
}
