//! Adaptors forward data-layer messages to third-party analytics platforms.
//!
//! Each adaptor implements [`Adaptor`]: a unique id, a `forward` hook called
//! for every message once all adaptors are ready, and a `has_loaded` check.
//! Platform calls go through a [`Transport`] so they can be captured in
//! tests or printed by the CLI.

pub mod ga;
pub mod gtm;
pub mod registry;
pub mod tealium;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use datalayer_core::DataLayerMessage;

pub use registry::{AdaptorRegistry, Dispatcher};

pub trait Adaptor: Send + Sync {
    /// Identifier reported through `adaptor_loaded`, e.g. `"Tealium"`.
    fn id(&self) -> &str;

    /// Handle one message. `model` is the data-layer model at dispatch time.
    fn forward(&self, model: &Value, message: &DataLayerMessage) -> Result<()>;

    /// Whether the platform was already available at registration.
    fn has_loaded(&self) -> bool;

    /// Validate that the adaptor configuration is correct.
    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Delivery of a platform command (`"push"`, `"view"`, `"link"`, ...).
pub trait Transport: Send + Sync {
    fn send(&self, command: &str, payload: Value) -> Result<()>;
}

/// Records every command; used in tests and dry runs.
#[derive(Default)]
pub struct CaptureTransport {
    sent: Mutex<Vec<(String, Value)>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn count_command(&self, command: &str) -> usize {
        self.sent.lock().iter().filter(|(c, _)| c == command).count()
    }
}

impl Transport for CaptureTransport {
    fn send(&self, command: &str, payload: Value) -> Result<()> {
        self.sent.lock().push((command.to_string(), payload));
        Ok(())
    }
}

/// Load state shared by the bundled adaptors.
#[derive(Debug, Default)]
pub struct LoadFlag(AtomicBool);

impl LoadFlag {
    pub fn new(loaded: bool) -> Self {
        Self(AtomicBool::new(loaded))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Flatten nested objects into dotted keys: `{"a":{"b":1}}` → `{"a.b":1}`.
/// Arrays and scalars are kept as values.
pub fn flatten_object(value: &Value) -> Map<String, Value> {
    fn walk(prefix: &str, value: &Value, out: &mut Map<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, item) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&path, item, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    let mut out = Map::new();
    if value.is_object() {
        walk("", value, &mut out);
    }
    out
}
