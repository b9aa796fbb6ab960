use std::sync::Arc;

use datalayer_core::DataLayerStore;
use datalayer_dom::{Document, IntersectionObserver, NodeId};
use tracing::debug;

use super::{EventBuilder, EventGate};
use crate::attribute_observer::AttributeObserverDelegate;

/// Reports an element once, the first time enough of it is visible.
pub(crate) struct ImpressionBinding {
    observer: IntersectionObserver,
}

impl ImpressionBinding {
    pub(crate) fn new(
        document: &Document,
        threshold: f64,
        gate: Arc<EventGate>,
        builder: Arc<dyn EventBuilder>,
        store: Arc<DataLayerStore>,
    ) -> Self {
        let observer = document.create_intersection_observer(threshold, move |document, entries, observer| {
            for entry in entries.iter().filter(|e| e.is_intersecting) {
                observer.unobserve(entry.target);
                debug!(element = %entry.target, ratio = entry.intersection_ratio, "impression");
                gate.submit(builder.build(document, &store, entry.target));
            }
        });
        Self { observer }
    }
}

impl AttributeObserverDelegate for ImpressionBinding {
    fn element_matched_attribute(&self, _document: &Document, element: NodeId, _attribute_name: &str) {
        self.observer.observe(element);
    }

    fn element_unmatched_attribute(&self, _document: &Document, element: NodeId, _attribute_name: &str) {
        self.observer.unobserve(element);
    }
}
