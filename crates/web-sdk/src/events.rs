//! Markup contract and the interaction kinds tracked from it.

use datalayer_core::EventKind;
use datalayer_dom::DomEventType;
use serde::{Deserialize, Serialize};

/// Component id; links an element to its registered record.
pub const DATA_LAYER_ID: &str = "data-layer-id";
/// HTML-entity encoded JSON object describing the component.
pub const DATA_LAYER_DATA: &str = "data-layer-data";
/// Optional custom key for the value captured by change events.
pub const CHANGEABLE_KEY: &str = "data-layer-changeable-key";

/// Which node a listener resolves component data against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// The element the listener is attached to.
    Current,
    /// The node the event was dispatched on.
    Origin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Change,
    Submit,
    Hover,
    Swipe,
    Impression,
    Scroll,
    Wysiwyg,
}

impl Interaction {
    pub const ALL: [Interaction; 8] = [
        Interaction::Click,
        Interaction::Change,
        Interaction::Submit,
        Interaction::Hover,
        Interaction::Swipe,
        Interaction::Impression,
        Interaction::Scroll,
        Interaction::Wysiwyg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Interaction::Click => "click",
            Interaction::Change => "change",
            Interaction::Submit => "submit",
            Interaction::Hover => "hover",
            Interaction::Swipe => "swipe",
            Interaction::Impression => "impression",
            Interaction::Scroll => "scroll",
            Interaction::Wysiwyg => "wysiwyg",
        }
    }

    /// Attribute that opts an element into this interaction.
    pub fn attribute(self) -> &'static str {
        match self {
            Interaction::Click => "data-layer-clickable",
            Interaction::Change => "data-layer-changeable",
            Interaction::Submit => "data-layer-submitable",
            Interaction::Hover => "data-layer-hoverable",
            Interaction::Swipe => "data-layer-swipeable",
            Interaction::Impression => "data-layer-impressionable",
            Interaction::Scroll => "data-layer-scrollable",
            Interaction::Wysiwyg => "data-layer-wysiwyg",
        }
    }

    /// Tag of the events this interaction produces. Editor links report clicks.
    pub fn event_kind(self) -> EventKind {
        match self {
            Interaction::Click | Interaction::Wysiwyg => EventKind::Click,
            Interaction::Change => EventKind::Change,
            Interaction::Submit => EventKind::Submit,
            Interaction::Hover => EventKind::Hover,
            Interaction::Swipe => EventKind::Swipe,
            Interaction::Impression => EventKind::Impression,
            Interaction::Scroll => EventKind::Scroll,
        }
    }

    /// Native event listened for; `None` for visibility-driven impressions.
    pub fn dom_event(self) -> Option<DomEventType> {
        match self {
            Interaction::Click | Interaction::Wysiwyg => Some(DomEventType::Click),
            Interaction::Change => Some(DomEventType::Change),
            Interaction::Submit => Some(DomEventType::Submit),
            Interaction::Hover => Some(DomEventType::MouseEnter),
            Interaction::Swipe => Some(DomEventType::Swipe),
            Interaction::Scroll => Some(DomEventType::Scroll),
            Interaction::Impression => None,
        }
    }

    pub fn target_mode(self) -> TargetMode {
        match self {
            Interaction::Swipe | Interaction::Impression => TargetMode::Origin,
            _ => TargetMode::Current,
        }
    }

    pub fn from_attribute(attribute: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.attribute() == attribute)
    }
}
