use datalayer_core::{DataLayerStore, EventKind, RawEvent};
use datalayer_dom::{Document, NodeId};

use super::EventBuilder;
use crate::events::CHANGEABLE_KEY;
use crate::helpers::{get_data_from_element, get_parent_id};

const DEFAULT_LABEL_KEY: &str = "changedLabel";
const DEFAULT_CHECKED_KEY: &str = "Checked";

/// Component data plus the form control's new value.
pub struct ChangeEvent {
    default_value_key: String,
}

impl ChangeEvent {
    pub fn new(default_value_key: &str) -> Self {
        Self {
            default_value_key: default_value_key.to_string(),
        }
    }

    /// Value, label and checked keys for `element`.
    fn keys(&self, document: &Document, element: NodeId) -> (String, String, String) {
        match document.get_attribute(element, CHANGEABLE_KEY) {
            Some(key) => (
                key.clone(),
                format!("{key}Label"),
                format!("{key}Checked"),
            ),
            None => (
                self.default_value_key.clone(),
                DEFAULT_LABEL_KEY.to_string(),
                DEFAULT_CHECKED_KEY.to_string(),
            ),
        }
    }
}

impl EventBuilder for ChangeEvent {
    fn build(&self, document: &Document, store: &DataLayerStore, element: NodeId) -> RawEvent {
        let mut component = get_data_from_element(document, store, element);
        let parent_id = get_parent_id(document, store, element);
        let (value_key, label_key, checked_key) = self.keys(document, element);

        component.insert(value_key, document.value(element));

        if document.tag_name(element).as_deref() == Some("select") {
            if let Some(label) = document.selected_option_text(element) {
                component.insert(label_key, label);
            }
        }

        if matches!(document.input_type(element).as_deref(), Some("checkbox" | "radio")) {
            component.insert(checked_key, document.checked(element));
        }

        RawEvent::new(EventKind::Change, component, parent_id)
    }
}
