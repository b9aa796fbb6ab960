//! Component registry: the owned data-layer store that observers write to
//! and the ancestry resolver reads from.

use serde_json::Value;
use tracing::debug;

use crate::event_bus::DataLayerQueue;
use crate::types::{ComponentRecord, DataLayerEntry};

/// Source of registered components, keyed by id.
pub trait ComponentSource {
    fn component(&self, id: &str) -> Option<ComponentRecord>;
}

/// A model snapshot (as handed to queue listeners) is itself a source.
impl ComponentSource for Value {
    fn component(&self, id: &str) -> Option<ComponentRecord> {
        self.get("components")?
            .get(id)
            .cloned()
            .and_then(ComponentRecord::from_value)
    }
}

impl ComponentSource for std::collections::HashMap<String, ComponentRecord> {
    fn component(&self, id: &str) -> Option<ComponentRecord> {
        self.get(id).cloned()
    }
}

/// The data layer: an append-only queue of events and data plus lookups
/// into the components registered through it.
#[derive(Default)]
pub struct DataLayerStore {
    queue: DataLayerQueue,
}

impl DataLayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event or data entry; returns the new queue length.
    pub fn add(&self, entry: impl Into<DataLayerEntry>) -> usize {
        self.queue.push(entry.into())
    }

    /// Dotted-path lookup into everything pushed so far.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.queue.get(path)
    }

    pub fn get_component(&self, id: &str) -> Option<ComponentRecord> {
        self.queue
            .get_in("components", id)
            .and_then(ComponentRecord::from_value)
    }

    /// Register (or fully replace) the component stored under `id`.
    pub fn add_component(&self, id: &str, record: ComponentRecord) {
        debug!(component_id = id, fields = record.len(), "registering component");
        self.add(DataLayerEntry::component(id, record));
    }

    pub fn queue(&self) -> &DataLayerQueue {
        &self.queue
    }

    pub fn entries(&self) -> Vec<DataLayerEntry> {
        self.queue.entries()
    }
}

impl ComponentSource for DataLayerStore {
    fn component(&self, id: &str) -> Option<ComponentRecord> {
        self.get_component(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventKind, RawEvent};
    use serde_json::json;

    #[test]
    fn test_add_and_get_component() {
        let store = DataLayerStore::new();
        let record = ComponentRecord::from_value(json!({
            "Type": "components/block",
            "Component": "x"
        }))
        .unwrap();

        store.add_component("c1", record.clone());
        assert_eq!(store.get_component("c1"), Some(record));
        assert_eq!(store.get("components.c1.Component"), Some(json!("x")));
        assert_eq!(store.get_component("missing"), None);
    }

    #[test]
    fn test_dotted_component_ids() {
        let store = DataLayerStore::new();
        store.add_component("ss.block.1", ComponentRecord::new());
        assert!(store.get_component("ss.block.1").is_some());
    }

    #[test]
    fn test_events_are_appended_not_merged() {
        let store = DataLayerStore::new();
        let len = store.add(RawEvent::new(EventKind::Click, ComponentRecord::new(), None));
        assert_eq!(len, 1);
        assert_eq!(store.get("event"), None);
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_model_snapshot_source() {
        let model = json!({"components": {"a": {"ID": "a"}, "bad": 3}});
        assert_eq!(model.component("a").unwrap().id(), Some("a"));
        assert!(model.component("bad").is_none());
        assert!(model.component("none").is_none());
    }
}
