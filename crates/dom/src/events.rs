use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::document::Document;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEventType {
    Click,
    Change,
    Input,
    Submit,
    MouseEnter,
    Swipe,
    Scroll,
}

impl DomEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            DomEventType::Click => "click",
            DomEventType::Change => "change",
            DomEventType::Input => "input",
            DomEventType::Submit => "submit",
            DomEventType::MouseEnter => "mouseenter",
            DomEventType::Swipe => "swipe",
            DomEventType::Scroll => "scroll",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "click" => DomEventType::Click,
            "change" => DomEventType::Change,
            "input" => DomEventType::Input,
            "submit" => DomEventType::Submit,
            "mouseenter" => DomEventType::MouseEnter,
            "swipe" => DomEventType::Swipe,
            "scroll" => DomEventType::Scroll,
            _ => return None,
        })
    }

    /// `mouseenter` is the only type delivered to the target alone.
    pub fn bubbles(self) -> bool {
        !matches!(self, DomEventType::MouseEnter)
    }
}

/// Event as seen by one listener.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub event_type: DomEventType,
    /// Node the event was dispatched on.
    pub target: NodeId,
    /// Node whose listener is running.
    pub current_target: NodeId,
    pub detail: Option<Value>,
}

pub type EventListener = Arc<dyn Fn(&Document, &DomEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    event_type: DomEventType,
    listener: EventListener,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    by_node: HashMap<NodeId, Vec<Registration>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, node: NodeId, event_type: DomEventType, listener: EventListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_node.entry(node).or_default().push(Registration {
            id,
            event_type,
            listener,
        });
        id
    }

    pub(crate) fn remove(&mut self, node: NodeId, id: ListenerId) -> bool {
        let Some(list) = self.by_node.get_mut(&node) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_node.remove(&node);
        }
        removed
    }

    pub(crate) fn count(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, Vec::len)
    }

    pub(crate) fn matching(&self, node: NodeId, event_type: DomEventType) -> Vec<EventListener> {
        self.by_node
            .get(&node)
            .map(|list| {
                list.iter()
                    .filter(|r| r.event_type == event_type)
                    .map(|r| r.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
