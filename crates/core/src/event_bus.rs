//! Append-only data-layer queue with a path-lookup model.
//!
//! Every entry pushed through [`DataLayerQueue::push`] is kept for the page
//! lifetime. Data entries are folded into an abstract model that supports
//! dotted-path lookups; a single [`QueueListener`] can be attached once and
//! then sees every past and future entry, in push order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::DataLayerEntry;

/// Consumer of queue entries. Receives a snapshot of the model as of the
/// moment the entry is processed. Consecutive entries that leave the model
/// untouched share one snapshot.
pub trait QueueListener: Send + Sync {
    fn on_entry(&self, model: &Value, entry: &DataLayerEntry);
}

impl<F> QueueListener for F
where
    F: Fn(&Value, &DataLayerEntry) + Send + Sync,
{
    fn on_entry(&self, model: &Value, entry: &DataLayerEntry) {
        self(model, entry)
    }
}

pub struct DataLayerQueue {
    entries: Mutex<Vec<DataLayerEntry>>,
    model: RwLock<Arc<Value>>,
    listener: Mutex<Option<Arc<dyn QueueListener>>>,
    cursor: Mutex<usize>,
    processing: AtomicBool,
}

impl Default for DataLayerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLayerQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            model: RwLock::new(Arc::new(Value::Object(Map::new()))),
            listener: Mutex::new(None),
            cursor: Mutex::new(0),
            processing: AtomicBool::new(false),
        }
    }

    /// Append an entry and return the new queue length.
    pub fn push(&self, entry: DataLayerEntry) -> usize {
        if matches!(entry, DataLayerEntry::Data(_)) {
            let mut model = self.model.write();
            apply_entry(Arc::make_mut(&mut *model), &entry);
        }
        let len = {
            let mut entries = self.entries.lock();
            entries.push(entry);
            entries.len()
        };
        self.drain();
        len
    }

    /// Attach the listener and replay every entry pushed so far.
    /// Returns `false` if a listener is already attached.
    pub fn attach(&self, listener: Arc<dyn QueueListener>) -> bool {
        {
            let mut slot = self.listener.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(listener);
        }
        debug!(past_entries = self.len(), "queue listener attached");
        self.drain();
        true
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Look up a dotted path (`components.c1.Title`) in the model.
    pub fn get(&self, path: &str) -> Option<Value> {
        let model = self.model.read();
        let mut current: &Value = &model;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    /// Single-key lookup that tolerates dots inside `key`.
    pub fn get_in(&self, section: &str, key: &str) -> Option<Value> {
        self.model.read().get(section)?.get(key).cloned()
    }

    pub fn model(&self) -> Value {
        Value::clone(&self.model.read())
    }

    /// Shared handle to the current model.
    pub fn snapshot(&self) -> Arc<Value> {
        self.model.read().clone()
    }

    pub fn entries(&self) -> Vec<DataLayerEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Feed unprocessed entries to the listener. Pushes made by the listener
    /// itself are picked up by the outer loop rather than recursing.
    fn drain(&self) {
        let Some(listener) = self.listener.lock().clone() else {
            return;
        };

        loop {
            if self.processing.swap(true, Ordering::AcqRel) {
                return;
            }
            {
                let _guard = ProcessingGuard(&self.processing);
                while let Some(entry) = self.next_unprocessed() {
                    let model = self.snapshot();
                    listener.on_entry(&model, &entry);
                }
            }
            let len = self.len();
            if *self.cursor.lock() >= len {
                return;
            }
        }
    }

    fn next_unprocessed(&self) -> Option<DataLayerEntry> {
        let entries = self.entries.lock();
        let mut cursor = self.cursor.lock();
        let entry = entries.get(*cursor).cloned()?;
        *cursor += 1;
        Some(entry)
    }
}

/// Clears the processing flag even if the listener unwinds.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fold an entry into the model. Registered components replace their
/// previous entry wholesale; any other data is deep-merged. Events leave the
/// model untouched.
fn apply_entry(model: &mut Value, entry: &DataLayerEntry) {
    let DataLayerEntry::Data(data) = entry else {
        return;
    };
    let Some(root) = model.as_object_mut() else {
        return;
    };

    for (key, value) in data {
        match (key.as_str(), value) {
            ("components", Value::Object(components)) => {
                let slot = root
                    .entry("components".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Some(existing) = slot.as_object_mut() {
                    for (id, record) in components {
                        existing.insert(id.clone(), record.clone());
                    }
                }
            }
            _ => match root.get_mut(key) {
                Some(existing) => deep_merge(existing, value),
                None => {
                    root.insert(key.clone(), value.clone());
                }
            },
        }
    }
}

fn deep_merge(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}
