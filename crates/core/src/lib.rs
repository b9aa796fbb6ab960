//! Core data layer: records and events, the append-only queue, the component
//! registry, ancestry resolution, entity decoding, config and errors.

pub mod ancestry;
pub mod config;
pub mod entities;
pub mod error;
pub mod event_bus;
pub mod registry;
pub mod types;

pub use ancestry::AncestryResolver;
pub use config::DataLayerConfig;
pub use error::{DataLayerError, DataLayerResult};
pub use event_bus::{DataLayerQueue, QueueListener};
pub use registry::{ComponentSource, DataLayerStore};
pub use types::{
    AncestorLabel, Ancestry, ComponentRecord, DataLayerEntry, DataLayerMessage, EnrichedEvent,
    EventKind, RawEvent,
};
