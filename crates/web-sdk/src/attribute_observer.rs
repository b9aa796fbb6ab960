use std::sync::Arc;

use datalayer_dom::{Document, NodeId};

use crate::element_observer::{ElementObserver, ElementObserverDelegate};

/// Callbacks for elements gaining or losing an attribute. All default to no-ops.
pub trait AttributeObserverDelegate: Send + Sync {
    fn element_matched_attribute(&self, _document: &Document, _element: NodeId, _attribute_name: &str) {}

    fn element_unmatched_attribute(&self, _document: &Document, _element: NodeId, _attribute_name: &str) {}

    fn element_attribute_value_changed(
        &self,
        _document: &Document,
        _element: NodeId,
        _attribute_name: &str,
    ) {
    }
}

struct AttributeMatcher {
    attribute_name: String,
    delegate: Arc<dyn AttributeObserverDelegate>,
}

impl ElementObserverDelegate for AttributeMatcher {
    fn match_element(&self, document: &Document, element: NodeId) -> bool {
        document.has_attribute(element, &self.attribute_name)
    }

    fn match_elements_in_tree(&self, document: &Document, tree: NodeId) -> Vec<NodeId> {
        let mut matches = Vec::new();
        if self.match_element(document, tree) {
            matches.push(tree);
        }
        matches.extend(document.descendants_with_attribute(tree, &self.attribute_name));
        matches
    }

    fn element_matched(&self, document: &Document, element: NodeId) {
        self.delegate
            .element_matched_attribute(document, element, &self.attribute_name);
    }

    fn element_unmatched(&self, document: &Document, element: NodeId) {
        self.delegate
            .element_unmatched_attribute(document, element, &self.attribute_name);
    }

    fn element_attribute_changed(&self, document: &Document, element: NodeId, attribute_name: &str) {
        if attribute_name == self.attribute_name {
            self.delegate
                .element_attribute_value_changed(document, element, attribute_name);
        }
    }
}

/// [`ElementObserver`] matching every element that carries one attribute.
#[derive(Clone, Debug)]
pub struct AttributeObserver {
    attribute_name: String,
    element_observer: ElementObserver,
}

impl AttributeObserver {
    pub fn new(
        document: Document,
        root: NodeId,
        attribute_name: &str,
        delegate: Arc<dyn AttributeObserverDelegate>,
    ) -> Self {
        let matcher = Arc::new(AttributeMatcher {
            attribute_name: attribute_name.to_string(),
            delegate,
        });
        Self {
            attribute_name: attribute_name.to_string(),
            element_observer: ElementObserver::new(document, root, matcher),
        }
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn elements(&self) -> Vec<NodeId> {
        self.element_observer.elements()
    }

    pub fn is_started(&self) -> bool {
        self.element_observer.is_started()
    }

    pub fn start(&self) {
        self.element_observer.start();
    }

    pub fn stop(&self) {
        self.element_observer.stop();
    }

    pub fn refresh(&self) {
        self.element_observer.refresh();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl AttributeObserverDelegate for Log {
        fn element_matched_attribute(&self, _: &Document, element: NodeId, name: &str) {
            self.0.lock().push(format!("+{element} {name}"));
        }

        fn element_unmatched_attribute(&self, _: &Document, element: NodeId, name: &str) {
            self.0.lock().push(format!("-{element} {name}"));
        }

        fn element_attribute_value_changed(&self, _: &Document, element: NodeId, name: &str) {
            self.0.lock().push(format!("~{element} {name}"));
        }
    }

    #[test]
    fn test_root_and_descendants_in_document_order() {
        let doc = Document::new();
        let log = Arc::new(Log::default());
        let outer = doc.create_element("div");
        doc.set_attribute(outer, "data-layer-clickable", "").unwrap();
        let inner = doc.create_element("button");
        doc.set_attribute(inner, "data-layer-clickable", "").unwrap();
        doc.append_child(outer, inner).unwrap();
        doc.append_child(doc.body(), outer).unwrap();

        let observer = AttributeObserver::new(doc.clone(), outer, "data-layer-clickable", log.clone());
        observer.start();
        assert_eq!(observer.elements(), vec![outer, inner]);
        assert_eq!(
            log.0.lock().clone(),
            vec![
                format!("+{outer} data-layer-clickable"),
                format!("+{inner} data-layer-clickable"),
            ]
        );
    }

    #[test]
    fn test_value_change_only_for_observed_attribute() {
        let doc = Document::new();
        let log = Arc::new(Log::default());
        let el = doc.create_element("div");
        doc.set_attribute(el, "data-layer-id", "a").unwrap();
        doc.append_child(doc.body(), el).unwrap();
        let observer = AttributeObserver::new(doc.clone(), doc.body(), "data-layer-id", log.clone());
        observer.start();
        log.0.lock().clear();

        doc.set_attribute(el, "class", "x").unwrap();
        doc.deliver_mutations();
        doc.set_attribute(el, "data-layer-id", "b").unwrap();
        doc.deliver_mutations();
        doc.remove_attribute(el, "data-layer-id").unwrap();
        doc.deliver_mutations();
        assert_eq!(
            log.0.lock().clone(),
            vec![format!("~{el} data-layer-id"), format!("-{el} data-layer-id")]
        );
    }
}
