//! Tealium iQ adaptor. Page views go to `utag.view` with the flattened model;
//! every other event goes to `utag.link` with the flattened message.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use datalayer_core::{DataLayerMessage, EventKind};

use super::{flatten_object, Adaptor, LoadFlag, Transport};

pub const TEALIUM_ID: &str = "Tealium";
const LINK_HREF: &str = "LinkHref";
const LINK_HREF_FULL: &str = "LinkHrefFull";

pub struct TealiumAdaptor {
    origin: String,
    transport: Arc<dyn Transport>,
    loaded: LoadFlag,
}

impl TealiumAdaptor {
    /// `origin` is the site origin relative links are resolved against.
    pub fn new(origin: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            origin: origin.into(),
            transport,
            loaded: LoadFlag::default(),
        }
    }

    /// Called once `utag` and `teal` are available on the page.
    pub fn mark_loaded(&self) {
        self.loaded.set();
    }

    /// Copy of `value` where every object holding a `LinkHref` also gets a
    /// `LinkHrefFull` with the link resolved against the origin. Arrays keep
    /// their shape. On any parse failure the value is returned untouched.
    pub fn with_full_links(&self, value: &Value) -> Value {
        let resolved = Url::parse(&self.origin).and_then(|base| resolve_links(value, &base));
        match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(origin = %self.origin, error = %err, "could not resolve relative links");
                value.clone()
            }
        }
    }
}

fn resolve_links(value: &Value, base: &Url) -> Result<Value, url::ParseError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_links(item, base))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            let mut full = None;
            for (key, item) in map {
                if key == LINK_HREF {
                    let href = match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    full = Some(base.join(&href)?.to_string());
                }
                out.insert(key.clone(), resolve_links(item, base)?);
            }
            if let Some(full) = full {
                out.insert(LINK_HREF_FULL.to_string(), Value::String(full));
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

impl Adaptor for TealiumAdaptor {
    fn id(&self) -> &str {
        TEALIUM_ID
    }

    fn forward(&self, model: &Value, message: &DataLayerMessage) -> Result<()> {
        // Data entries are frequent and not forwarded.
        let Some(event) = message.event() else {
            return Ok(());
        };

        if *event.kind() == EventKind::PageView {
            let mut payload = flatten_object(model);
            payload.insert("tealium_event".into(), Value::String(event.kind().to_string()));
            debug!(tealium_event = %event.kind(), "utag.view");
            return self.transport.send("view", Value::Object(payload));
        }

        let parsed = self.with_full_links(&message.to_value());
        let mut payload = flatten_object(&parsed);
        let tealium_event = payload.get("event").cloned().unwrap_or(Value::Null);
        debug!(tealium_event = %tealium_event, "utag.link");
        payload.insert("tealium_event".into(), tealium_event);
        self.transport.send("link", Value::Object(payload))
    }

    fn has_loaded(&self) -> bool {
        self.loaded.get()
    }

    fn validate_config(&self) -> Result<()> {
        Url::parse(&self.origin)
            .map(|_| ())
            .map_err(|err| anyhow!("Tealium site origin '{}' is not a valid URL: {err}", self.origin))
    }
}
