//! Dispatch counters: messages handed to adaptors per event kind, and
//! forwards and failures per adaptor.

use dashmap::DashMap;
use serde::Serialize;

use datalayer_core::DataLayerMessage;

/// Per-adaptor aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdaptorMetrics {
    pub forwarded: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatched: DashMap<String, u64>,
    adaptors: DashMap<String, AdaptorMetrics>,
}

/// Key used for data (non-event) messages.
pub const DATA_KEY: &str = "data";

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self, message: &DataLayerMessage) {
        let key = message
            .event_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| DATA_KEY.to_string());
        *self.dispatched.entry(key).or_insert(0) += 1;
    }

    pub fn record_forward(&self, adaptor_id: &str) {
        self.adaptors.entry(adaptor_id.to_string()).or_default().forwarded += 1;
    }

    pub fn record_failure(&self, adaptor_id: &str) {
        self.adaptors.entry(adaptor_id.to_string()).or_default().failures += 1;
    }

    /// Messages dispatched for an event name, or [`DATA_KEY`].
    pub fn dispatched(&self, key: &str) -> u64 {
        self.dispatched.get(key).map(|v| *v).unwrap_or(0)
    }

    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.iter().map(|entry| *entry.value()).sum()
    }

    pub fn adaptor(&self, adaptor_id: &str) -> AdaptorMetrics {
        self.adaptors
            .get(adaptor_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Snapshot for logging at shutdown.
    pub fn summary(&self) -> serde_json::Value {
        let dispatched: serde_json::Map<String, serde_json::Value> = self
            .dispatched
            .iter()
            .map(|entry| (entry.key().clone(), serde_json::json!(*entry.value())))
            .collect();
        let adaptors: serde_json::Map<String, serde_json::Value> = self
            .adaptors
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    serde_json::to_value(entry.value()).unwrap_or_default(),
                )
            })
            .collect();
        serde_json::json!({ "dispatched": dispatched, "adaptors": adaptors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalayer_core::{ComponentRecord, EnrichedEvent, EventKind, RawEvent};

    #[test]
    fn test_counts_by_kind_and_adaptor() {
        let metrics = DispatchMetrics::new();
        let click = DataLayerMessage::Event(EnrichedEvent::plain(RawEvent::new(
            EventKind::Click,
            ComponentRecord::new(),
            None,
        )));
        metrics.record_dispatch(&click);
        metrics.record_dispatch(&click);
        metrics.record_dispatch(&DataLayerMessage::Data(serde_json::Map::new()));
        metrics.record_forward("tealium");
        metrics.record_failure("tealium");
        metrics.record_forward("gtm");

        assert_eq!(metrics.dispatched("click"), 2);
        assert_eq!(metrics.dispatched(DATA_KEY), 1);
        assert_eq!(metrics.total_dispatched(), 3);
        assert_eq!(
            metrics.adaptor("tealium"),
            AdaptorMetrics {
                forwarded: 1,
                failures: 1
            }
        );
        assert_eq!(metrics.adaptor("missing"), AdaptorMetrics::default());
        assert_eq!(metrics.summary()["adaptors"]["gtm"]["forwarded"], 1);
    }
}
