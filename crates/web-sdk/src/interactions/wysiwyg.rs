//! Links inside editor-authored content. They have no registered component,
//! so the record is assembled from the link's own attributes.

use datalayer_core::{ComponentRecord, DataLayerStore, EventKind, RawEvent};
use datalayer_dom::{Document, NodeId};
use serde_json::Value;

use super::EventBuilder;
use crate::helpers::get_parent_id;

pub const LINK_TYPE: &str = "components/link";
pub const WYSIWYG_LINK_COMPONENT: &str = "generic/link/wysiwyg";

pub struct WysiwygLinkEvent;

fn attribute_or_null(document: &Document, link: NodeId, name: &str) -> Value {
    document
        .get_attribute(link, name)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// The fixed-shape record describing one editor link.
pub fn link_record(document: &Document, link: NodeId) -> ComponentRecord {
    let mut record = ComponentRecord::new();
    record.insert("Type", LINK_TYPE);
    record.insert("Component", WYSIWYG_LINK_COMPONENT);
    record.insert("LinkHref", attribute_or_null(document, link, "href"));
    record.insert("OperatorName", attribute_or_null(document, link, "data-operatorname"));
    record.insert("LinkType", attribute_or_null(document, link, "data-linktype"));
    record.insert("EditorReferral", attribute_or_null(document, link, "data-editorreferral"));

    let text = document.text_content(link);
    if !text.is_empty() {
        record.insert("LinkTitle", text);
    } else if let Some(title) = document.get_attribute(link, "title") {
        record.insert("LinkTitle", title);
    }
    record
}

impl EventBuilder for WysiwygLinkEvent {
    fn build(&self, document: &Document, store: &DataLayerStore, element: NodeId) -> RawEvent {
        RawEvent::new(
            EventKind::Click,
            link_record(document, element),
            get_parent_id(document, store, element),
        )
    }
}
