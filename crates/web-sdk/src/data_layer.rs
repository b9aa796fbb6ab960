//! The page-wide entry point: owns the store, the adaptor registry, the
//! installed observer chain and the task that delivers document mutations.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use datalayer_core::{ComponentRecord, DataLayerConfig, DataLayerEntry, DataLayerStore};
use datalayer_dom::Document;

use crate::adaptors::{Adaptor, AdaptorRegistry};
use crate::metrics::DispatchMetrics;
use crate::pipeline::{Bootstrap, Pipeline, StageContext};

pub struct DataLayer {
    document: Document,
    store: Arc<DataLayerStore>,
    registry: AdaptorRegistry,
    bootstrap: Bootstrap,
    pump: JoinHandle<()>,
}

impl DataLayer {
    /// Register `adaptors` and start the default observer chain over the
    /// document body. Requires a Tokio runtime.
    pub fn create(document: Document, config: DataLayerConfig, adaptors: Vec<Arc<dyn Adaptor>>) -> Self {
        Self::with_pipeline(document, config, adaptors, Pipeline::default_chain())
    }

    pub fn with_pipeline(
        document: Document,
        config: DataLayerConfig,
        adaptors: Vec<Arc<dyn Adaptor>>,
        pipeline: Pipeline,
    ) -> Self {
        let store = Arc::new(DataLayerStore::new());
        let config = Arc::new(config);

        let registry = AdaptorRegistry::new(store.clone(), config.ancestry.max_depth);
        registry.register(adaptors);

        let pump = tokio::spawn(pump_document(document.clone()));
        let ctx = StageContext::new(document.clone(), store.clone(), config);
        let bootstrap = pipeline.run(&ctx);

        info!(
            attached = registry.is_attached(),
            stages = bootstrap.stages().len(),
            "data layer created"
        );

        Self {
            document,
            store,
            registry,
            bootstrap,
            pump,
        }
    }

    /// Append an event or data entry; returns the queue length.
    pub fn add(&self, entry: impl Into<DataLayerEntry>) -> usize {
        self.store.add(entry)
    }

    /// Dotted-path lookup into the model, e.g. `components.hero.Title`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.get(path)
    }

    pub fn get_component(&self, id: &str) -> Option<ComponentRecord> {
        self.store.get_component(id)
    }

    pub fn add_component(&self, id: &str, record: ComponentRecord) {
        self.store.add_component(id, record);
    }

    /// Callback for an adaptor whose platform script has finished loading.
    pub fn adaptor_loaded(&self, id: &str) {
        self.registry.adaptor_loaded(id);
    }

    pub fn pending_adaptors(&self) -> Vec<String> {
        self.registry.pending()
    }

    pub fn is_attached(&self) -> bool {
        self.registry.is_attached()
    }

    /// Resolves once every stage of the chain is ready.
    pub async fn ready(&self) {
        self.bootstrap.ready().await;
    }

    pub fn is_ready(&self) -> bool {
        self.bootstrap.is_ready()
    }

    /// Deliver pending mutations and recompute intersections now, without
    /// waiting for the pump task.
    pub fn flush(&self) {
        flush_document(&self.document);
    }

    /// Stop every observer and the mutation pump.
    pub fn stop(&self) {
        self.bootstrap.stop();
        self.pump.abort();
    }

    pub fn store(&self) -> &Arc<DataLayerStore> {
        &self.store
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.registry.metrics()
    }
}

impl Drop for DataLayer {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn flush_document(document: &Document) {
    let delivered = document.deliver_mutations();
    let entries = document.update_intersections();
    if delivered > 0 || entries > 0 {
        debug!(delivered, entries, "document flushed");
    }
}

async fn pump_document(document: Document) {
    loop {
        document.changes_pending().await;
        flush_document(&document);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::adaptors::tealium::TealiumAdaptor;
    use crate::adaptors::CaptureTransport;
    use datalayer_core::{EventKind, RawEvent};
    use datalayer_dom::{DomEventType, Rect};
    use serde_json::json;

    fn component(doc: &Document, parent: datalayer_dom::NodeId, id: &str, data: Value) -> datalayer_dom::NodeId {
        let el = doc.create_element("div");
        doc.set_attribute(el, "data-layer-id", id).unwrap();
        doc.set_attribute(el, "data-layer-data", &data.to_string()).unwrap();
        doc.append_child(parent, el).unwrap();
        el
    }

    /// Let spawned gate and pump tasks run.
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_reaches_adaptor_after_ready() {
        let doc = Document::new();
        let hero = component(&doc, doc.body(), "hero", json!({"Type": "components/block", "ID": "hero"}));
        let button = component(&doc, hero, "cta", json!({"Type": "components/button", "Title": "Book"}));
        doc.set_attribute(button, "data-layer-clickable", "").unwrap();

        let transport = Arc::new(CaptureTransport::new());
        let tealium = Arc::new(TealiumAdaptor::new("https://example.com", transport.clone()));
        let layer = DataLayer::create(doc.clone(), DataLayerConfig::default(), vec![tealium as Arc<dyn Adaptor>]);
        assert_eq!(layer.pending_adaptors(), vec!["Tealium".to_string()]);

        doc.dispatch_event(button, DomEventType::Click, None);
        assert!(!layer.is_ready());
        layer.ready().await;
        settle().await;
        layer.adaptor_loaded("Tealium");

        assert_eq!(layer.get("components.cta.ParentID"), Some(json!("hero")));
        let links = transport
            .sent()
            .into_iter()
            .filter(|(command, _)| command == "link")
            .collect::<Vec<_>>();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].1["component.Title"], "Book");
        assert_eq!(links[0].1["block.ID"], "hero");
        assert_eq!(links[0].1["ancestry.TopParent.ID"], "hero");
        assert_eq!(layer.metrics().dispatched("click"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_registers_late_components() {
        let doc = Document::new();
        let layer = DataLayer::create(doc.clone(), DataLayerConfig::default(), Vec::new());
        assert!(layer.is_attached());

        component(&doc, doc.body(), "late", json!({"Title": "Later"}));
        settle().await;
        assert_eq!(layer.get_component("late").unwrap().get("Title"), Some(&json!("Later")));

        layer.stop();
        component(&doc, doc.body(), "after-stop", json!({}));
        layer.flush();
        assert!(layer.get_component("after-stop").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_produces_impression_without_flush() {
        let doc = Document::new();
        doc.set_viewport(Rect::new(0.0, 0.0, 100.0, 100.0));
        let banner = component(&doc, doc.body(), "banner", json!({"Title": "Summer sale"}));
        doc.set_attribute(banner, "data-layer-impressionable", "").unwrap();
        doc.set_bounding_rect(banner, Rect::new(0.0, 400.0, 100.0, 50.0)).unwrap();

        let layer = DataLayer::create(doc.clone(), DataLayerConfig::default(), Vec::new());
        layer.ready().await;
        settle().await;
        assert_eq!(layer.metrics().dispatched("impression"), 0);

        doc.scroll_into_view(banner).unwrap();
        settle().await;
        assert_eq!(layer.metrics().dispatched("impression"), 1);

        doc.set_viewport(Rect::new(0.0, 0.0, 100.0, 100.0));
        settle().await;
        doc.scroll_into_view(banner).unwrap();
        settle().await;
        assert_eq!(layer.metrics().dispatched("impression"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_and_lookup() {
        let layer = DataLayer::create(Document::new(), DataLayerConfig::default(), Vec::new());
        layer.add_component("page", ComponentRecord::from_value(json!({"Title": "Home"})).unwrap());
        let len = layer.add(RawEvent::new(EventKind::PageView, ComponentRecord::new(), None));
        assert_eq!(len, 2);
        assert_eq!(layer.get("components.page.Title"), Some(json!("Home")));
        assert_eq!(layer.metrics().dispatched("page_view"), 1);
    }
}
