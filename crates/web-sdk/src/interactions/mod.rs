//! Per-interaction observers: one [`InteractionStage`] per markup attribute.
//!
//! Events fired before the previous stage is ready are held by the stage's
//! [`EventGate`] and released, in firing order, once it is.

pub mod change;
pub mod impression;
pub mod wysiwyg;

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use datalayer_core::{DataLayerStore, EventKind, RawEvent};
use datalayer_dom::{Document, DomEvent, DomEventType, ListenerId, NodeId};
use parking_lot::Mutex;
use tracing::debug;

use crate::attribute_observer::{AttributeObserver, AttributeObserverDelegate};
use crate::events::{Interaction, TargetMode};
use crate::helpers::{get_data_from_element, get_parent_id};
use crate::pipeline::{InstalledStage, Stage, StageContext};
use crate::readiness::Readiness;

use change::ChangeEvent;
use impression::ImpressionBinding;
use wysiwyg::WysiwygLinkEvent;

/// Builds the raw event for an interaction on `element`.
pub trait EventBuilder: Send + Sync {
    fn build(&self, document: &Document, store: &DataLayerStore, element: NodeId) -> RawEvent;
}

/// The element's component data, tagged with a fixed event kind.
pub struct ComponentEvent {
    kind: EventKind,
}

impl ComponentEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind }
    }
}

impl EventBuilder for ComponentEvent {
    fn build(&self, document: &Document, store: &DataLayerStore, element: NodeId) -> RawEvent {
        let component = get_data_from_element(document, store, element);
        let parent_id = get_parent_id(document, store, element);
        RawEvent::new(self.kind.clone(), component, parent_id)
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    flushing: bool,
    pending: VecDeque<RawEvent>,
}

/// Holds a stage's events until the stage before it is ready.
pub struct EventGate {
    name: &'static str,
    store: Arc<DataLayerStore>,
    state: Mutex<GateState>,
}

impl EventGate {
    pub fn new(name: &'static str, store: Arc<DataLayerStore>) -> Self {
        Self {
            name,
            store,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Add the event now, or queue it behind anything not yet flushed.
    pub fn submit(&self, event: RawEvent) {
        {
            let mut state = self.state.lock();
            if !state.open || state.flushing {
                debug!(stage = self.name, event = %event.event, "storing event for later");
                state.pending.push_back(event);
                return;
            }
        }
        self.store.add(event);
    }

    /// Open the gate and flush queued events in order. Idempotent.
    pub fn open(&self) {
        {
            let mut state = self.state.lock();
            if state.open {
                return;
            }
            state.open = true;
            state.flushing = true;
            debug!(stage = self.name, pending = state.pending.len(), "flushing stored events");
        }
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        state.flushing = false;
                        return;
                    }
                }
            };
            self.store.add(next);
        }
    }

    /// Open once `previous` resolves. Opens synchronously if it already has.
    pub fn open_after(self: &Arc<Self>, previous: Readiness) {
        if previous.is_resolved() {
            self.open();
            return;
        }
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            previous.wait().await;
            gate.open();
        });
    }
}

/// Where listeners go for a matched element.
#[derive(Debug, Clone, Copy)]
enum Attach {
    /// On the element itself.
    Element(DomEventType, TargetMode),
    /// On every `<a>` inside the element.
    Links,
}

/// Adds a native listener when an element gains the stage attribute and
/// removes it when the element loses it.
struct ListenerBinding {
    attach: Attach,
    gate: Arc<EventGate>,
    builder: Arc<dyn EventBuilder>,
    store: Arc<DataLayerStore>,
    listeners: DashMap<NodeId, Vec<(NodeId, ListenerId)>>,
}

impl ListenerBinding {
    fn new(attach: Attach, gate: Arc<EventGate>, builder: Arc<dyn EventBuilder>, store: Arc<DataLayerStore>) -> Self {
        Self {
            attach,
            gate,
            builder,
            store,
            listeners: DashMap::new(),
        }
    }

    fn listen(&self, document: &Document, node: NodeId, event_type: DomEventType, mode: TargetMode) -> ListenerId {
        let gate = self.gate.clone();
        let builder = self.builder.clone();
        let store = self.store.clone();
        document.add_event_listener(node, event_type, move |document: &Document, event: &DomEvent| {
            let element = match mode {
                TargetMode::Current => event.current_target,
                TargetMode::Origin => event.target,
            };
            let raw = builder.build(document, &store, element);
            debug!(event = %raw.event, %element, parent_id = ?raw.parent_id, "interaction captured");
            gate.submit(raw);
        })
    }
}

impl AttributeObserverDelegate for ListenerBinding {
    fn element_matched_attribute(&self, document: &Document, element: NodeId, _attribute_name: &str) {
        if self.listeners.contains_key(&element) {
            return;
        }
        let attached = match self.attach {
            Attach::Element(event_type, mode) => {
                vec![(element, self.listen(document, element, event_type, mode))]
            }
            Attach::Links => document
                .descendants_by_tag(element, "a")
                .into_iter()
                .map(|link| (link, self.listen(document, link, DomEventType::Click, TargetMode::Current)))
                .collect(),
        };
        self.listeners.insert(element, attached);
    }

    fn element_unmatched_attribute(&self, document: &Document, element: NodeId, _attribute_name: &str) {
        if let Some((_, attached)) = self.listeners.remove(&element) {
            for (node, id) in attached {
                document.remove_event_listener(node, id);
            }
        }
    }
}

/// One interaction observer in the bootstrap chain.
pub struct InteractionStage {
    interaction: Interaction,
}

impl InteractionStage {
    pub fn new(interaction: Interaction) -> Self {
        Self { interaction }
    }

    pub fn click() -> Self {
        Self::new(Interaction::Click)
    }

    pub fn change() -> Self {
        Self::new(Interaction::Change)
    }

    pub fn submit() -> Self {
        Self::new(Interaction::Submit)
    }

    pub fn hover() -> Self {
        Self::new(Interaction::Hover)
    }

    pub fn swipe() -> Self {
        Self::new(Interaction::Swipe)
    }

    pub fn impression() -> Self {
        Self::new(Interaction::Impression)
    }

    pub fn scroll() -> Self {
        Self::new(Interaction::Scroll)
    }

    pub fn wysiwyg() -> Self {
        Self::new(Interaction::Wysiwyg)
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    fn delegate(&self, ctx: &StageContext, gate: Arc<EventGate>) -> Arc<dyn AttributeObserverDelegate> {
        let store = ctx.store.clone();
        match (self.interaction, self.interaction.dom_event()) {
            (Interaction::Wysiwyg, _) => Arc::new(ListenerBinding::new(
                Attach::Links,
                gate,
                Arc::new(WysiwygLinkEvent),
                store,
            )),
            (Interaction::Change, Some(event_type)) => Arc::new(ListenerBinding::new(
                Attach::Element(event_type, TargetMode::Current),
                gate,
                Arc::new(ChangeEvent::new(&ctx.config.change.default_value_key)),
                store,
            )),
            (interaction, Some(event_type)) => Arc::new(ListenerBinding::new(
                Attach::Element(event_type, interaction.target_mode()),
                gate,
                Arc::new(ComponentEvent::new(interaction.event_kind())),
                store,
            )),
            (interaction, None) => Arc::new(ImpressionBinding::new(
                &ctx.document,
                ctx.config.impression.threshold,
                gate,
                Arc::new(ComponentEvent::new(interaction.event_kind())),
                store,
            )),
        }
    }
}

impl Stage for InteractionStage {
    fn name(&self) -> &'static str {
        self.interaction.name()
    }

    fn install(&self, ctx: &StageContext, previous: Readiness) -> InstalledStage {
        let gate = Arc::new(EventGate::new(self.name(), ctx.store.clone()));
        gate.open_after(previous.clone());

        let observer = AttributeObserver::new(
            ctx.document.clone(),
            ctx.root,
            self.interaction.attribute(),
            self.delegate(ctx, gate),
        );
        observer.start();
        debug!(stage = self.name(), attribute = self.interaction.attribute(), "interaction observer started");

        InstalledStage::new(self.name(), previous, observer)
    }
}
