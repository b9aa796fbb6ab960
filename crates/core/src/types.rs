//! Data-layer records: component records, raw interaction events, enriched
//! output events, and the envelopes that flow through the event queue.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// `Type` value that marks a component as a structural block.
pub const BLOCK_TYPE: &str = "components/block";

/// A registered component: string keys to JSON values. Well-known keys are
/// `Type`, `Component`, `ID` and `ParentID`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRecord(Map<String, Value>);

impl ComponentRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, accepting only objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Semantic category, e.g. `components/block`.
    pub fn component_type(&self) -> Option<&str> {
        self.str_field("Type")
    }

    /// Dotted taxonomy key, e.g. `content/blocks/carousel`.
    pub fn component_key(&self) -> Option<&str> {
        self.str_field("Component")
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("ID")
    }

    /// Back-reference to the enclosing component. Empty strings count as absent.
    pub fn parent_id(&self) -> Option<&str> {
        self.str_field("ParentID").filter(|id| !id.is_empty())
    }

    pub fn set_parent_id(&mut self, parent_id: impl Into<String>) {
        self.0
            .insert("ParentID".to_string(), Value::String(parent_id.into()));
    }

    pub fn is_block(&self) -> bool {
        self.component_type() == Some(BLOCK_TYPE)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for ComponentRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Event-type tag carried in the `event` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Click,
    Change,
    Submit,
    Hover,
    Swipe,
    Impression,
    Scroll,
    PageView,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Click => "click",
            EventKind::Change => "change",
            EventKind::Submit => "submit",
            EventKind::Hover => "hover",
            EventKind::Swipe => "swipe",
            EventKind::Impression => "impression",
            EventKind::Scroll => "scroll",
            EventKind::PageView => "page_view",
            EventKind::Custom(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "click" => EventKind::Click,
            "change" => EventKind::Change,
            "submit" => EventKind::Submit,
            "hover" => EventKind::Hover,
            "swipe" => EventKind::Swipe,
            "impression" => EventKind::Impression,
            "scroll" => EventKind::Scroll,
            "page_view" => EventKind::PageView,
            _ => EventKind::Custom(tag),
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        EventKind::from(tag.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user/DOM interaction, built fresh per firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event: EventKind,
    #[serde(default)]
    pub component: ComponentRecord,
    #[serde(rename = "ParentID", default)]
    pub parent_id: Option<String>,
}

impl RawEvent {
    pub fn new(event: EventKind, component: ComponentRecord, parent_id: Option<String>) -> Self {
        Self {
            event,
            component,
            parent_id,
        }
    }
}

/// Position of an ancestor relative to the event's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestorLabel {
    /// `Parent<n>`, nearest first, starting at 1.
    Parent(usize),
    /// The root of the chain.
    TopParent,
}

impl fmt::Display for AncestorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AncestorLabel::Parent(depth) => write!(f, "Parent{depth}"),
            AncestorLabel::TopParent => f.write_str("TopParent"),
        }
    }
}

/// Ordered ancestor chain, serialized as a JSON object in walk order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ancestry {
    entries: Vec<(AncestorLabel, ComponentRecord)>,
}

impl Ancestry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: AncestorLabel, record: ComponentRecord) {
        self.entries.push((label, record));
    }

    /// Look up an ancestor by its rendered label (`Parent1`, `TopParent`, ...).
    pub fn get(&self, label: &str) -> Option<&ComponentRecord> {
        self.entries
            .iter()
            .find(|(l, _)| l.to_string() == label)
            .map(|(_, record)| record)
    }

    pub fn top_parent(&self) -> Option<&ComponentRecord> {
        self.entries
            .iter()
            .find(|(l, _)| *l == AncestorLabel::TopParent)
            .map(|(_, record)| record)
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(l, _)| l.to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AncestorLabel, &ComponentRecord)> {
        self.entries.iter().map(|(l, r)| (l, r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Ancestry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, record) in &self.entries {
            map.serialize_entry(&label.to_string(), record)?;
        }
        map.end()
    }
}

/// Context added to an event whose parent is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    /// Nearest enclosing block; serialized as `null` when there is none.
    pub block: Option<ComponentRecord>,
    pub ancestry: Ancestry,
}

/// The output event handed to adaptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub raw: RawEvent,
    #[serde(flatten)]
    pub enrichment: Option<Enrichment>,
}

impl EnrichedEvent {
    /// An event forwarded without ancestor context.
    pub fn plain(raw: RawEvent) -> Self {
        Self {
            raw,
            enrichment: None,
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.raw.event
    }

    pub fn block(&self) -> Option<&ComponentRecord> {
        self.enrichment.as_ref().and_then(|e| e.block.as_ref())
    }

    pub fn ancestry(&self) -> Option<&Ancestry> {
        self.enrichment.as_ref().map(|e| &e.ancestry)
    }

    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_some()
    }
}

/// What `add` accepts: an event or a bag of data merged into the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataLayerEntry {
    Event(RawEvent),
    Data(Map<String, Value>),
}

impl DataLayerEntry {
    /// The `{ components: { <id>: <record> } }` registration entry.
    pub fn component(id: impl Into<String>, record: ComponentRecord) -> Self {
        let mut components = Map::new();
        components.insert(id.into(), record.into_value());
        let mut data = Map::new();
        data.insert("components".to_string(), Value::Object(components));
        DataLayerEntry::Data(data)
    }

    pub fn as_event(&self) -> Option<&RawEvent> {
        match self {
            DataLayerEntry::Event(event) => Some(event),
            DataLayerEntry::Data(_) => None,
        }
    }
}

impl From<RawEvent> for DataLayerEntry {
    fn from(event: RawEvent) -> Self {
        DataLayerEntry::Event(event)
    }
}

impl From<Map<String, Value>> for DataLayerEntry {
    fn from(data: Map<String, Value>) -> Self {
        DataLayerEntry::Data(data)
    }
}

/// What adaptors receive for each queue entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataLayerMessage {
    Event(EnrichedEvent),
    Data(Map<String, Value>),
}

impl DataLayerMessage {
    pub fn event(&self) -> Option<&EnrichedEvent> {
        match self {
            DataLayerMessage::Event(event) => Some(event),
            DataLayerMessage::Data(_) => None,
        }
    }

    pub fn event_kind(&self) -> Option<&EventKind> {
        self.event().map(EnrichedEvent::kind)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
