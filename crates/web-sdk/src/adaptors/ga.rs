//! Google Analytics 4 (GA4) Measurement Protocol adaptor: turns data-layer
//! events into GA4 event payloads.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use datalayer_core::{DataLayerMessage, EnrichedEvent, EventKind};

use super::{flatten_object, Adaptor, LoadFlag, Transport};

/// Configuration for the GA4 adaptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaConfig {
    /// GA4 Measurement ID, e.g. "G-XXXXXXXXXX".
    pub measurement_id: String,
    /// API secret for Measurement Protocol server-side hits.
    pub api_secret: String,
    /// Enable debug mode for GA4 validation (default: false).
    pub debug_mode: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            measurement_id: String::new(),
            api_secret: String::new(),
            debug_mode: false,
        }
    }
}

/// Google Analytics 4 adaptor using the Measurement Protocol format.
pub struct GaAdaptor {
    config: GaConfig,
    client_id: String,
    transport: Arc<dyn Transport>,
    loaded: LoadFlag,
}

impl GaAdaptor {
    pub fn new(config: GaConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            client_id: Uuid::new_v4().to_string(),
            transport,
            loaded: LoadFlag::default(),
        }
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    pub fn mark_loaded(&self) {
        self.loaded.set();
    }

    /// Map an event kind to a GA4 event name following Google's recommended
    /// event naming conventions.
    fn ga4_event_name(kind: &EventKind) -> String {
        match kind {
            EventKind::PageView => "page_view".into(),
            EventKind::Click => "select_content".into(),
            EventKind::Change => "form_field_interaction".into(),
            EventKind::Submit => "generate_lead".into(),
            EventKind::Hover => "hover".into(),
            EventKind::Swipe => "swipe".into(),
            EventKind::Impression => "view_promotion".into(),
            EventKind::Scroll => "scroll".into(),
            EventKind::Custom(name) => name.clone(),
        }
    }

    /// Event parameters: the flattened component plus block and ancestry.
    fn build_params(event: &EnrichedEvent) -> Result<Value> {
        let mut params = flatten_object(&event.raw.component.clone().into_value());
        if let Some(parent_id) = &event.raw.parent_id {
            params.insert("parent_id".into(), Value::String(parent_id.clone()));
        }
        if let Some(block) = event.block() {
            for (key, value) in flatten_object(&block.clone().into_value()) {
                params.insert(format!("block.{key}"), value);
            }
        }
        if let Some(ancestry) = event.ancestry() {
            for (key, value) in flatten_object(&serde_json::to_value(ancestry)?) {
                params.insert(format!("ancestry.{key}"), value);
            }
        }
        Ok(Value::Object(params))
    }

    /// Build the Measurement Protocol payload for one event.
    pub fn transform(&self, event: &EnrichedEvent) -> Result<Value> {
        let event_name = Self::ga4_event_name(event.kind());
        let mut params = Self::build_params(event)?;

        if self.config.debug_mode {
            params["debug_mode"] = serde_json::json!(1);
        }

        // GA4 Measurement Protocol payload wraps events in a top-level object
        let payload = serde_json::json!({
            "client_id": self.client_id,
            "timestamp_micros": Utc::now().timestamp_micros().to_string(),
            "events": [{
                "name": event_name,
                "params": params,
            }],
        });

        debug!(
            event_name = %event_name,
            measurement_id = %self.config.measurement_id,
            "GA4 event transformed"
        );

        Ok(payload)
    }
}

impl Adaptor for GaAdaptor {
    fn id(&self) -> &str {
        "ga4"
    }

    fn forward(&self, _model: &Value, message: &DataLayerMessage) -> Result<()> {
        let Some(event) = message.event() else {
            return Ok(());
        };
        let payload = self.transform(event)?;
        self.transport.send("collect", payload)
    }

    fn has_loaded(&self) -> bool {
        self.loaded.get()
    }

    fn validate_config(&self) -> Result<()> {
        if self.config.measurement_id.is_empty() {
            return Err(anyhow!("GA4 measurement_id must not be empty"));
        }
        if !self.config.measurement_id.starts_with("G-") {
            return Err(anyhow!(
                "GA4 measurement_id must start with 'G-', got '{}'",
                self.config.measurement_id
            ));
        }
        if self.config.api_secret.is_empty() {
            return Err(anyhow!("GA4 api_secret must not be empty"));
        }
        Ok(())
    }
}
