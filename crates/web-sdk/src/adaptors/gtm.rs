//! Google Tag Manager adaptor: turns data-layer events into GTM dataLayer
//! pushes.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use datalayer_core::{DataLayerMessage, EnrichedEvent, EventKind};

use super::{flatten_object, Adaptor, LoadFlag, Transport};

/// Configuration for the GTM adaptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtmConfig {
    /// GTM container ID, e.g. "GTM-XXXXXXX".
    pub container_id: String,
    /// Whether to include block and ancestry context in each push (default: true).
    pub include_context: bool,
    /// Custom dataLayer variable name (default: "dataLayer").
    pub data_layer_name: String,
}

impl Default for GtmConfig {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            include_context: true,
            data_layer_name: "dataLayer".into(),
        }
    }
}

/// Google Tag Manager adaptor.
pub struct GtmAdaptor {
    config: GtmConfig,
    transport: Arc<dyn Transport>,
    loaded: LoadFlag,
}

impl GtmAdaptor {
    pub fn new(config: GtmConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            loaded: LoadFlag::default(),
        }
    }

    pub fn config(&self) -> &GtmConfig {
        &self.config
    }

    /// Called once the GTM container script is available.
    pub fn mark_loaded(&self) {
        self.loaded.set();
    }

    /// Map a data-layer event kind to a GTM event name.
    fn gtm_event_name(kind: &EventKind) -> String {
        match kind {
            EventKind::PageView => "page_view".into(),
            EventKind::Click => "dl_click".into(),
            EventKind::Change => "dl_change".into(),
            EventKind::Submit => "form_submit".into(),
            EventKind::Hover => "dl_hover".into(),
            EventKind::Swipe => "dl_swipe".into(),
            EventKind::Impression => "view_promotion".into(),
            EventKind::Scroll => "scroll".into(),
            EventKind::Custom(name) => name.clone(),
        }
    }

    /// Build the dataLayer push payload for an event.
    pub fn transform(&self, event: &EnrichedEvent) -> Result<Value> {
        let event_name = Self::gtm_event_name(event.kind());

        let mut payload = serde_json::json!({
            "event": event_name,
            "gtm.uniqueEventId": Uuid::new_v4().to_string(),
            "component": event.raw.component,
            "parent_id": event.raw.parent_id,
        });

        // Add context if configured
        if self.config.include_context {
            if let Some(block) = event.block() {
                payload["block"] = serde_json::to_value(block)?;
            }
            if let Some(ancestry) = event.ancestry() {
                for (key, value) in flatten_object(&serde_json::to_value(ancestry)?) {
                    payload[format!("ancestry.{key}")] = value;
                }
            }
        }

        debug!(
            event_name = %event_name,
            container_id = %self.config.container_id,
            "GTM dataLayer push transformed"
        );

        Ok(payload)
    }
}

impl Adaptor for GtmAdaptor {
    fn id(&self) -> &str {
        "gtm"
    }

    fn forward(&self, _model: &Value, message: &DataLayerMessage) -> Result<()> {
        let Some(event) = message.event() else {
            return Ok(());
        };
        let payload = self.transform(event)?;
        self.transport.send("push", payload)
    }

    fn has_loaded(&self) -> bool {
        self.loaded.get()
    }

    fn validate_config(&self) -> Result<()> {
        if self.config.container_id.is_empty() {
            return Err(anyhow!("GTM container_id must not be empty"));
        }
        if !self.config.container_id.starts_with("GTM-") {
            return Err(anyhow!(
                "GTM container_id must start with 'GTM-', got '{}'",
                self.config.container_id
            ));
        }
        Ok(())
    }
}
