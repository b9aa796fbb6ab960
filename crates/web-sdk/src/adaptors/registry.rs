//! Adaptor registration and dispatch.
//!
//! The registry holds back the queue listener until every registered adaptor
//! has reported itself loaded (or one was already loaded at registration).
//! Once attached, the [`Dispatcher`] replays every past entry and then
//! forwards each new one, enriched with block and ancestry context.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use datalayer_core::{
    AncestryResolver, DataLayerEntry, DataLayerMessage, DataLayerStore, QueueListener,
};

use super::Adaptor;
use crate::metrics::DispatchMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RegistryState {
    Unregistered,
    WaitingForAdaptors(Vec<String>),
    Attached,
}

pub struct AdaptorRegistry {
    store: Arc<DataLayerStore>,
    state: Mutex<RegistryState>,
    adaptors: Mutex<Vec<Arc<dyn Adaptor>>>,
    metrics: Arc<DispatchMetrics>,
    max_depth: usize,
}

impl AdaptorRegistry {
    pub fn new(store: Arc<DataLayerStore>, max_depth: usize) -> Self {
        Self {
            store,
            state: Mutex::new(RegistryState::Unregistered),
            adaptors: Mutex::new(Vec::new()),
            metrics: Arc::new(DispatchMetrics::new()),
            max_depth,
        }
    }

    /// Register the adaptor list. Attaches immediately when the list is empty
    /// or any adaptor has already loaded; otherwise waits for every id to be
    /// reported through [`adaptor_loaded`](Self::adaptor_loaded).
    ///
    /// Returns whether the dispatcher is attached afterwards. A second call
    /// is ignored.
    pub fn register(&self, adaptors: Vec<Arc<dyn Adaptor>>) -> bool {
        for adaptor in &adaptors {
            if let Err(err) = adaptor.validate_config() {
                warn!(adaptor = adaptor.id(), error = %err, "adaptor config is invalid");
            }
        }

        let attach_now = {
            let mut state = self.state.lock();
            if *state != RegistryState::Unregistered {
                warn!("adaptors already registered, ignoring");
                return *state == RegistryState::Attached;
            }

            let ids: Vec<String> = adaptors.iter().map(|a| a.id().to_string()).collect();
            let any_loaded = adaptors.iter().any(|a| a.has_loaded());
            *self.adaptors.lock() = adaptors;

            if ids.is_empty() || any_loaded {
                true
            } else {
                info!(pending = ?ids, "waiting for adaptors to load");
                *state = RegistryState::WaitingForAdaptors(ids);
                false
            }
        };

        if attach_now {
            self.attach();
        }
        attach_now
    }

    /// Mark one adaptor as loaded; the last one triggers attachment.
    pub fn adaptor_loaded(&self, id: &str) {
        let attach_now = {
            let mut state = self.state.lock();
            match &mut *state {
                RegistryState::Unregistered => {
                    warn!(adaptor = id, "adaptor loaded before registration, ignoring");
                    false
                }
                RegistryState::Attached => {
                    debug!(adaptor = id, "adaptor loaded after attach");
                    false
                }
                RegistryState::WaitingForAdaptors(pending) => {
                    pending.retain(|pending_id| pending_id != id);
                    debug!(adaptor = id, remaining = pending.len(), "adaptor loaded");
                    pending.is_empty()
                }
            }
        };

        if attach_now {
            self.attach();
        }
    }

    /// Ids still awaited before attachment.
    pub fn pending(&self) -> Vec<String> {
        match &*self.state.lock() {
            RegistryState::WaitingForAdaptors(pending) => pending.clone(),
            _ => Vec::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        *self.state.lock() == RegistryState::Attached
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    fn attach(&self) {
        *self.state.lock() = RegistryState::Attached;

        let adaptors = self.adaptors.lock().clone();
        let count = adaptors.len();
        let dispatcher = Dispatcher::new(adaptors, self.metrics.clone(), self.max_depth);
        if self.store.queue().attach(Arc::new(dispatcher)) {
            info!(adaptors = count, "adaptors attached to data layer");
        } else {
            warn!("data layer queue already has a listener");
        }
    }
}

/// Queue listener that enriches events and fans messages out to adaptors.
pub struct Dispatcher {
    adaptors: Vec<Arc<dyn Adaptor>>,
    metrics: Arc<DispatchMetrics>,
    max_depth: usize,
}

impl Dispatcher {
    pub fn new(adaptors: Vec<Arc<dyn Adaptor>>, metrics: Arc<DispatchMetrics>, max_depth: usize) -> Self {
        Self {
            adaptors,
            metrics,
            max_depth,
        }
    }

    /// Events with a parent gain `block` and `ancestry`; data passes through.
    pub fn message(&self, model: &Value, entry: &DataLayerEntry) -> DataLayerMessage {
        match entry {
            DataLayerEntry::Event(raw) => {
                DataLayerMessage::Event(AncestryResolver::new(model, self.max_depth).enrich(raw.clone()))
            }
            DataLayerEntry::Data(data) => DataLayerMessage::Data(data.clone()),
        }
    }
}

impl QueueListener for Dispatcher {
    fn on_entry(&self, model: &Value, entry: &DataLayerEntry) {
        let message = self.message(model, entry);
        self.metrics.record_dispatch(&message);

        for adaptor in &self.adaptors {
            let id = adaptor.id();
            match catch_unwind(AssertUnwindSafe(|| adaptor.forward(model, &message))) {
                Ok(Ok(())) => self.metrics.record_forward(id),
                Ok(Err(err)) => {
                    warn!(adaptor = id, error = %err, "adaptor failed to forward message");
                    self.metrics.record_failure(id);
                }
                Err(_) => {
                    warn!(adaptor = id, "adaptor panicked while forwarding message");
                    self.metrics.record_failure(id);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::adaptors::LoadFlag;
    use anyhow::{anyhow, Result};
    use datalayer_core::{ComponentRecord, EventKind, RawEvent};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        id: String,
        loaded: LoadFlag,
        seen: Mutex<Vec<Value>>,
        fail: Option<&'static str>,
    }

    impl Recorder {
        fn new(id: &str, loaded: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                loaded: LoadFlag::new(loaded),
                ..Default::default()
            })
        }

        fn failing(id: &str, mode: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                loaded: LoadFlag::new(true),
                fail: Some(mode),
                ..Default::default()
            })
        }

        fn seen(&self) -> Vec<Value> {
            self.seen.lock().clone()
        }
    }

    impl Adaptor for Recorder {
        fn id(&self) -> &str {
            &self.id
        }

        fn forward(&self, _model: &Value, message: &DataLayerMessage) -> Result<()> {
            match self.fail {
                Some("error") => return Err(anyhow!("platform unavailable")),
                Some(_) => panic!("adaptor bug"),
                None => {}
            }
            self.seen.lock().push(message.to_value());
            Ok(())
        }

        fn has_loaded(&self) -> bool {
            self.loaded.get()
        }
    }

    fn click(parent: Option<&str>) -> RawEvent {
        RawEvent::new(
            EventKind::Click,
            ComponentRecord::from_value(json!({"Title": "Go"})).unwrap(),
            parent.map(str::to_string),
        )
    }

    fn block(id: &str) -> ComponentRecord {
        ComponentRecord::from_value(json!({"Type": "components/block", "ID": id})).unwrap()
    }

    #[test]
    fn test_attaches_when_any_adaptor_loaded() {
        let store = Arc::new(DataLayerStore::new());
        let registry = AdaptorRegistry::new(store.clone(), 32);
        let eager = Recorder::new("eager", true);
        let late = Recorder::new("late", false);

        assert!(registry.register(vec![eager.clone() as Arc<dyn Adaptor>, late.clone()]));
        assert!(registry.is_attached());
        assert!(registry.pending().is_empty());

        store.add(click(None));
        registry.adaptor_loaded("late");
        assert_eq!(eager.seen().len(), 1);
        assert_eq!(late.seen().len(), 1);
    }

    #[test]
    fn test_waits_for_every_adaptor() {
        let store = Arc::new(DataLayerStore::new());
        let registry = AdaptorRegistry::new(store.clone(), 32);
        let first = Recorder::new("first", false);
        let second = Recorder::new("second", false);

        registry.adaptor_loaded("first");
        assert!(!registry.register(vec![first.clone() as Arc<dyn Adaptor>, second.clone()]));
        assert_eq!(registry.pending(), vec!["first".to_string(), "second".to_string()]);

        store.add(click(None));
        registry.adaptor_loaded("first");
        assert!(!registry.is_attached());
        assert!(first.seen().is_empty());

        registry.adaptor_loaded("second");
        assert!(registry.is_attached());
        assert_eq!(first.seen().len(), 1);
        assert_eq!(second.seen().len(), 1);
    }

    #[test]
    fn test_empty_registration_attaches() {
        let store = Arc::new(DataLayerStore::new());
        let registry = AdaptorRegistry::new(store.clone(), 32);
        assert!(registry.register(Vec::new()));
        assert!(store.queue().has_listener());
        assert!(registry.register(vec![Recorder::new("x", false) as Arc<dyn Adaptor>]));
    }

    #[test]
    fn test_failing_adaptor_is_isolated() {
        let store = Arc::new(DataLayerStore::new());
        let registry = AdaptorRegistry::new(store.clone(), 32);
        let erring = Recorder::failing("erring", "error");
        let panicking = Recorder::failing("panicking", "panic");
        let healthy = Recorder::new("healthy", true);
        registry.register(vec![erring as Arc<dyn Adaptor>, panicking, healthy.clone()]);

        store.add(click(None));
        store.add(click(None));

        assert_eq!(healthy.seen().len(), 2);
        let metrics = registry.metrics();
        assert_eq!(metrics.adaptor("erring").failures, 2);
        assert_eq!(metrics.adaptor("panicking").failures, 2);
        assert_eq!(metrics.adaptor("healthy").forwarded, 2);
        assert_eq!(metrics.dispatched("click"), 2);
    }

    #[test]
    fn test_replays_and_enriches_past_entries() {
        let store = Arc::new(DataLayerStore::new());
        store.add_component("hero", block("hero"));
        store.add(click(Some("hero")));
        store.add(click(None));

        let registry = AdaptorRegistry::new(store.clone(), 32);
        let recorder = Recorder::new("rec", true);
        registry.register(vec![recorder.clone() as Arc<dyn Adaptor>]);

        let seen = recorder.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0]["components"]["hero"]["ID"], "hero");
        assert_eq!(seen[1]["event"], "click");
        assert_eq!(seen[1]["block"]["ID"], "hero");
        assert_eq!(seen[1]["ancestry"]["TopParent"]["ID"], "hero");
        assert!(seen[2].get("block").is_none());
    }
}
