//! JSON page scenarios: an element tree to load and a list of steps to play
//! against it.
//!
//! Step targets are the `id` attribute of an element in the page.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use datalayer_core::{ComponentRecord, DataLayerError, DataLayerResult, EventKind, RawEvent};
use datalayer_dom::{Document, DomEventType, DomResult, NodeId, Rect};
use datalayer_web_sdk::DataLayer;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub viewport: Option<RectSpec>,
    #[serde(default)]
    pub page: Vec<NodeSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RectSpec {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<RectSpec> for Rect {
    fn from(spec: RectSpec) -> Self {
        Rect::new(spec.x, spec.y, spec.width, spec.height)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Written to `data-layer-data` as JSON.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rect: Option<RectSpec>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

fn default_tag() -> String {
    "div".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    WaitMs {
        ms: u64,
    },
    PageView {
        #[serde(default)]
        data: Map<String, Value>,
    },
    Click {
        target: String,
    },
    Change {
        target: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        checked: Option<bool>,
        #[serde(default)]
        selected_index: Option<usize>,
    },
    Submit {
        target: String,
    },
    Hover {
        target: String,
    },
    Swipe {
        target: String,
        #[serde(default)]
        detail: Option<Value>,
    },
    ScrollIntoView {
        target: String,
    },
    Append {
        /// Body when absent.
        #[serde(default)]
        parent: Option<String>,
        node: NodeSpec,
    },
    Remove {
        target: String,
    },
    SetAttribute {
        target: String,
        name: String,
        value: String,
    },
}

impl Scenario {
    pub fn from_file(path: &Path) -> DataLayerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Build the page into the document body.
    pub fn load(&self, document: &Document) -> DataLayerResult<()> {
        if let Some(viewport) = self.viewport {
            document.set_viewport(viewport.into());
        }
        for node in &self.page {
            build(document, document.body(), node).map_err(dom_error)?;
        }
        info!(elements = document.descendants(document.body()).len(), "page loaded");
        Ok(())
    }
}

fn dom_error(err: datalayer_dom::DomError) -> DataLayerError {
    DataLayerError::Scenario(err.to_string())
}

pub fn build(document: &Document, parent: NodeId, spec: &NodeSpec) -> DomResult<NodeId> {
    let element = document.create_element(&spec.tag);
    for (name, value) in &spec.attributes {
        document.set_attribute(element, name, value)?;
    }
    if let Some(data) = &spec.data {
        document.set_attribute(element, "data-layer-data", &data.to_string())?;
    }
    if let Some(rect) = spec.rect {
        document.set_bounding_rect(element, rect.into())?;
    }
    if let Some(text) = &spec.text {
        let text = document.create_text_node(text);
        document.append_child(element, text)?;
    }
    for child in &spec.children {
        build(document, element, child)?;
    }
    document.append_child(parent, element)?;
    Ok(element)
}

fn target(document: &Document, id: &str) -> DataLayerResult<NodeId> {
    document
        .element_by_id(id)
        .ok_or_else(|| DataLayerError::Scenario(format!("no element with id '{id}'")))
}

/// Play one step; mutations are flushed before returning.
pub async fn run_step(layer: &DataLayer, step: &Step) -> DataLayerResult<()> {
    let document = layer.document();
    debug!(?step, "scenario step");

    match step {
        Step::WaitMs { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        Step::PageView { data } => {
            if !data.is_empty() {
                layer.add(data.clone());
            }
            layer.add(RawEvent::new(EventKind::PageView, ComponentRecord::new(), None));
        }
        Step::Click { target: id } => {
            document.dispatch_event(target(document, id)?, DomEventType::Click, None);
        }
        Step::Change {
            target: id,
            value,
            checked,
            selected_index,
        } => {
            let element = target(document, id)?;
            if let Some(value) = value {
                document.set_value(element, value).map_err(dom_error)?;
            }
            if let Some(checked) = checked {
                document.set_checked(element, *checked).map_err(dom_error)?;
            }
            if let Some(index) = selected_index {
                document.set_selected_index(element, *index).map_err(dom_error)?;
            }
            document.dispatch_event(element, DomEventType::Change, None);
        }
        Step::Submit { target: id } => {
            document.dispatch_event(target(document, id)?, DomEventType::Submit, None);
        }
        Step::Hover { target: id } => {
            document.dispatch_event(target(document, id)?, DomEventType::MouseEnter, None);
        }
        Step::Swipe { target: id, detail } => {
            document.dispatch_event(target(document, id)?, DomEventType::Swipe, detail.clone());
        }
        Step::ScrollIntoView { target: id } => {
            document.scroll_into_view(target(document, id)?).map_err(dom_error)?;
        }
        Step::Append { parent, node } => {
            let parent = match parent {
                Some(id) => target(document, id)?,
                None => document.body(),
            };
            build(document, parent, node).map_err(dom_error)?;
        }
        Step::Remove { target: id } => {
            document.remove(target(document, id)?).map_err(dom_error)?;
        }
        Step::SetAttribute {
            target: id,
            name,
            value,
        } => {
            document
                .set_attribute(target(document, id)?, name, value)
                .map_err(dom_error)?;
        }
    }

    layer.flush();
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCENARIO: &str = r#"{
        "viewport": {"width": 1280, "height": 800},
        "page": [
            {"attributes": {"data-layer-id": "hero"},
             "data": {"Type": "components/block", "ID": "hero"},
             "children": [
                {"tag": "a", "text": "Book",
                 "attributes": {"id": "cta", "href": "/book", "data-layer-clickable": ""},
                 "data": {"Title": "Book"}}
             ]}
        ],
        "steps": [
            {"action": "wait_ms", "ms": 900},
            {"action": "click", "target": "cta"},
            {"action": "change", "target": "cta", "value": "x"},
            {"action": "append", "node": {"attributes": {"id": "late"}}}
        ]
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.page.len(), 1);
        assert_eq!(scenario.page[0].tag, "div");
        assert_eq!(scenario.steps.len(), 4);
        assert!(matches!(scenario.steps[0], Step::WaitMs { ms: 900 }));
        assert!(matches!(&scenario.steps[3], Step::Append { parent: None, .. }));
    }

    #[test]
    fn test_load_builds_tree() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let document = Document::new();
        scenario.load(&document).unwrap();

        let cta = document.element_by_id("cta").unwrap();
        assert_eq!(document.text_content(cta), "Book");
        assert_eq!(document.get_attribute(cta, "data-layer-data"), Some(json!({"Title": "Book"}).to_string()));
        let hero = document.parent_element(cta).unwrap();
        assert_eq!(document.get_attribute(hero, "data-layer-id").as_deref(), Some("hero"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_target_is_an_error() {
        let layer = DataLayer::create(Document::new(), Default::default(), Vec::new());
        let err = run_step(&layer, &Step::Click { target: "missing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DataLayerError::Scenario(_)));
    }
}
