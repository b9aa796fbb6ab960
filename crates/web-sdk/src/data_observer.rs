//! First stage of the chain: registers every `data-layer-id` element as a
//! component and resolves once declarations have settled.

use std::sync::Arc;
use std::time::Duration;

use datalayer_core::{ComponentRecord, DataLayerStore};
use datalayer_dom::{Document, NodeId};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::attribute_observer::{AttributeObserver, AttributeObserverDelegate};
use crate::events::{DATA_LAYER_DATA, DATA_LAYER_ID};
use crate::helpers::{get_parent_id, parse_component_data};
use crate::pipeline::{InstalledStage, Stage, StageContext};
use crate::readiness::Readiness;

struct ComponentDeclarations {
    store: Arc<DataLayerStore>,
    activity: mpsc::UnboundedSender<()>,
}

impl ComponentDeclarations {
    fn read_record(&self, document: &Document, element: NodeId) -> ComponentRecord {
        let Some(raw) = document.get_attribute(element, DATA_LAYER_DATA) else {
            warn!(%element, "component has no data-layer-data");
            return ComponentRecord::new();
        };
        parse_component_data(element, &raw).unwrap_or_else(|err| {
            warn!(%element, error = %err, "malformed component data");
            ComponentRecord::new()
        })
    }
}

impl AttributeObserverDelegate for ComponentDeclarations {
    fn element_matched_attribute(&self, document: &Document, element: NodeId, attribute_name: &str) {
        debug!(%element, attribute = attribute_name, "matched component element");

        // Elements without an id cannot be linked to anything.
        let Some(id) = document
            .get_attribute(element, DATA_LAYER_ID)
            .filter(|id| !id.is_empty())
        else {
            return;
        };

        let mut record = self.read_record(document, element);
        match get_parent_id(document, &self.store, element) {
            Some(parent_id) => record.set_parent_id(parent_id),
            None => {
                record.remove("ParentID");
            }
        }
        self.store.add_component(&id, record);

        let _ = self.activity.send(());
    }
}

/// Resolve after `fallback`, or once `quiet` has passed since the latest
/// activity, whichever comes first.
async fn settle(
    readiness: Readiness,
    mut activity: mpsc::UnboundedReceiver<()>,
    fallback: Duration,
    quiet: Duration,
) {
    let fallback_timer = sleep(fallback);
    tokio::pin!(fallback_timer);
    let mut quiet_deadline: Option<Instant> = None;
    let mut listening = true;

    loop {
        let quiet_timer = async {
            match quiet_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = &mut fallback_timer => {
                info!(timeout_ms = fallback.as_millis() as u64, "data observer ready: timeout");
                break;
            }
            _ = quiet_timer => {
                info!("data observer ready: activity settled");
                break;
            }
            message = activity.recv(), if listening => match message {
                Some(()) => quiet_deadline = Some(Instant::now() + quiet),
                None => listening = false,
            },
        }
    }
    readiness.resolve();
}

pub struct DataAttributeStage;

impl Stage for DataAttributeStage {
    fn name(&self) -> &'static str {
        "data"
    }

    fn install(&self, ctx: &StageContext, _previous: Readiness) -> InstalledStage {
        let readiness = Readiness::new();
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let timing = &ctx.config.data_observer;
        tokio::spawn(settle(
            readiness.clone(),
            activity_rx,
            Duration::from_millis(timing.fallback_timeout_ms),
            Duration::from_millis(timing.quiet_period_ms),
        ));

        let delegate = Arc::new(ComponentDeclarations {
            store: ctx.store.clone(),
            activity: activity_tx,
        });
        let observer = AttributeObserver::new(ctx.document.clone(), ctx.root, DATA_LAYER_ID, delegate);
        observer.start();

        InstalledStage::new(self.name(), readiness, observer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interactions::tests::context;
    use serde_json::json;

    fn component(ctx: &StageContext, parent: NodeId, id: &str, data: Option<&str>) -> NodeId {
        let el = ctx.document.create_element("div");
        ctx.document.set_attribute(el, "data-layer-id", id).unwrap();
        if let Some(data) = data {
            ctx.document.set_attribute(el, "data-layer-data", data).unwrap();
        }
        ctx.document.append_child(parent, el).unwrap();
        el
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_components_with_parent() {
        let ctx = context();
        let outer = component(&ctx, ctx.root, "a", Some(r#"{"Type":"components/block","Title":"Fish &amp; Chips"}"#));
        component(&ctx, outer, "b", Some(r#"{"Type":"components/card"}"#));
        let installed = DataAttributeStage.install(&ctx, Readiness::resolved());

        let a = ctx.store.get_component("a").unwrap();
        assert_eq!(a.get("Title"), Some(&json!("Fish & Chips")));
        assert_eq!(a.parent_id(), None);
        assert_eq!(ctx.store.get_component("b").unwrap().parent_id(), Some("a"));
        assert_eq!(installed.observer().elements().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_data_registers_empty_record() {
        let ctx = context();
        let outer = component(&ctx, ctx.root, "a", None);
        component(&ctx, outer, "b", Some("{broken"));
        component(&ctx, ctx.root, "", Some("{}"));
        let _installed = DataAttributeStage.install(&ctx, Readiness::resolved());

        assert!(ctx.store.get_component("a").unwrap().is_empty());
        let b = ctx.store.get_component("b").unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b.parent_id(), Some("a"));
        assert!(ctx.store.get_component("").is_none());
    }

    fn within(elapsed: Duration, expected_ms: u64) -> bool {
        elapsed >= Duration::from_millis(expected_ms) && elapsed < Duration::from_millis(expected_ms + 50)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_quiet_period() {
        let ctx = context();
        component(&ctx, ctx.root, "a", Some("{}"));
        let start = Instant::now();
        let installed = DataAttributeStage.install(&ctx, Readiness::resolved());
        installed.readiness().wait().await;
        assert!(within(start.elapsed(), 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_fallback_without_activity() {
        let ctx = context();
        let start = Instant::now();
        let installed = DataAttributeStage.install(&ctx, Readiness::resolved());
        installed.readiness().wait().await;
        assert!(within(start.elapsed(), 800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_activity_hits_fallback() {
        let ctx = context();
        let start = Instant::now();
        let installed = DataAttributeStage.install(&ctx, Readiness::resolved());
        let waiter = installed.readiness().clone();
        let resolved_at = tokio::spawn(async move {
            waiter.wait().await;
            Instant::now()
        });
        for i in 0..6 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            component(&ctx, ctx.root, &format!("c{i}"), Some("{}"));
            ctx.document.deliver_mutations();
        }
        let resolved_at = resolved_at.await.unwrap();
        assert!(within(resolved_at - start, 800));
    }
}
