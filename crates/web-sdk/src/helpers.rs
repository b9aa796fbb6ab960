//! Reading and writing component data carried on elements.

use datalayer_core::entities::{decode_recursive, encode_recursive};
use datalayer_core::{ComponentRecord, DataLayerError, DataLayerResult, DataLayerStore};
use datalayer_dom::{Document, NodeId};
use serde_json::Value;
use tracing::warn;

use crate::events::{DATA_LAYER_DATA, DATA_LAYER_ID};

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse a `data-layer-data` payload: JSON object, entity-decoded leaves.
pub fn parse_component_data(element: NodeId, raw: &str) -> DataLayerResult<ComponentRecord> {
    let value: Value = serde_json::from_str(raw)?;
    ComponentRecord::from_value(decode_recursive(&value)).ok_or_else(|| {
        DataLayerError::InvalidComponentData {
            element: element.to_string(),
            reason: "expected a JSON object".to_string(),
        }
    })
}

fn data_from_attributes(document: &Document, store: &DataLayerStore, element: NodeId) -> Option<ComponentRecord> {
    if let Some(id) = non_empty(document.get_attribute(element, DATA_LAYER_ID)) {
        // Elements can fire before their component is registered.
        if let Some(record) = store.get_component(&id) {
            return Some(record);
        }
    }

    let raw = non_empty(document.get_attribute(element, DATA_LAYER_DATA))?;
    match parse_component_data(element, &raw) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(%element, error = %err, "ignoring unreadable component data");
            None
        }
    }
}

/// Registered record for the element's id, else its own parsed
/// `data-layer-data`, else an empty record.
pub fn get_data_from_element(document: &Document, store: &DataLayerStore, element: NodeId) -> ComponentRecord {
    data_from_attributes(document, store, element).unwrap_or_default()
}

/// The element's `ParentID` if its data names one, else the id of the
/// nearest ancestor carrying `data-layer-id`.
pub fn get_parent_id(document: &Document, store: &DataLayerStore, element: NodeId) -> Option<String> {
    let data = get_data_from_element(document, store, element);
    if let Some(parent_id) = data.parent_id() {
        return Some(parent_id.to_string());
    }

    let parent = document.parent_element(element)?;
    let holder = document.closest_with_attribute(parent, DATA_LAYER_ID)?;
    non_empty(document.get_attribute(holder, DATA_LAYER_ID))
}

/// Apply `update` to the element's registered record, write it back to
/// `data-layer-data` and re-register it. Returns `false` when the element
/// has no id or no registered record.
pub fn update_element_data(
    document: &Document,
    store: &DataLayerStore,
    element: NodeId,
    update: impl FnOnce(&mut ComponentRecord),
) -> DataLayerResult<bool> {
    let Some(id) = non_empty(document.get_attribute(element, DATA_LAYER_ID)) else {
        return Ok(false);
    };
    let Some(mut record) = store.get_component(&id) else {
        return Ok(false);
    };

    update(&mut record);

    let encoded = serde_json::to_string(&encode_recursive(&record.clone().into_value()))?;
    document
        .set_attribute(element, DATA_LAYER_DATA, &encoded)
        .map_err(|e| DataLayerError::InvalidComponentData {
            element: element.to_string(),
            reason: e.to_string(),
        })?;
    store.add_component(&id, record);
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(doc: &Document, parent: NodeId, attrs: &[(&str, &str)]) -> NodeId {
        let el = doc.create_element("div");
        for (name, value) in attrs {
            doc.set_attribute(el, name, value).unwrap();
        }
        doc.append_child(parent, el).unwrap();
        el
    }

    #[test]
    fn test_registered_record_wins() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let el = element(&doc, doc.body(), &[("data-layer-id", "c1"), ("data-layer-data", r#"{"Title":"attr"}"#)]);
        assert_eq!(get_data_from_element(&doc, &store, el).get("Title"), Some(&json!("attr")));

        let mut record = ComponentRecord::new();
        record.insert("Title", "registered");
        store.add_component("c1", record);
        assert_eq!(get_data_from_element(&doc, &store, el).get("Title"), Some(&json!("registered")));
    }

    #[test]
    fn test_attribute_data_is_entity_decoded() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let el = element(&doc, doc.body(), &[("data-layer-data", r#"{"Title":"A &amp; B&#039;s"}"#)]);
        assert_eq!(get_data_from_element(&doc, &store, el).get("Title"), Some(&json!("A & B's")));
    }

    #[test]
    fn test_malformed_or_missing_data_is_empty() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let broken = element(&doc, doc.body(), &[("data-layer-data", "{not json")]);
        let array = element(&doc, doc.body(), &[("data-layer-data", "[1,2]")]);
        let bare = element(&doc, doc.body(), &[]);
        assert!(get_data_from_element(&doc, &store, broken).is_empty());
        assert!(get_data_from_element(&doc, &store, array).is_empty());
        assert!(get_data_from_element(&doc, &store, bare).is_empty());
        assert!(matches!(
            parse_component_data(array, "[1,2]"),
            Err(DataLayerError::InvalidComponentData { .. })
        ));
    }

    #[test]
    fn test_parent_id_from_data_then_dom() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let outer = element(&doc, doc.body(), &[("data-layer-id", "outer")]);
        let middle = element(&doc, outer, &[]);
        let inner = element(&doc, middle, &[("data-layer-id", "inner")]);
        assert_eq!(get_parent_id(&doc, &store, inner).as_deref(), Some("outer"));
        // An element's own id is never its parent.
        assert_eq!(get_parent_id(&doc, &store, outer), None);

        let explicit = element(&doc, middle, &[("data-layer-data", r#"{"ParentID":"elsewhere"}"#)]);
        assert_eq!(get_parent_id(&doc, &store, explicit).as_deref(), Some("elsewhere"));
    }

    #[test]
    fn test_empty_ancestor_id_is_no_parent() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let outer = element(&doc, doc.body(), &[("data-layer-id", "")]);
        let inner = element(&doc, outer, &[]);
        assert_eq!(get_parent_id(&doc, &store, inner), None);
    }

    #[test]
    fn test_update_element_data() {
        let doc = Document::new();
        let store = DataLayerStore::new();
        let el = element(&doc, doc.body(), &[("data-layer-id", "c1")]);
        assert!(!update_element_data(&doc, &store, el, |_| {}).unwrap());

        let mut record = ComponentRecord::new();
        record.insert("Title", "Tom & Jerry");
        store.add_component("c1", record);
        let updated = update_element_data(&doc, &store, el, |r| {
            r.insert("Position", 3);
        })
        .unwrap();
        assert!(updated);

        let stored = store.get_component("c1").unwrap();
        assert_eq!(stored.get("Position"), Some(&json!(3)));
        let attr = doc.get_attribute(el, "data-layer-data").unwrap();
        assert!(attr.contains("Tom &amp; Jerry"));
        assert_eq!(parse_component_data(el, &attr).unwrap(), stored);
    }
}
