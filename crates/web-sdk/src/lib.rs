//! Page-side data layer: observes the document for tracked components and
//! interactions, records them in the data layer, and forwards enriched
//! events to analytics adaptors.
//!
//! # Modules
//!
//! - [`element_observer`] / [`attribute_observer`]: subtree watchers over a
//!   dynamic set of matched elements
//! - [`data_observer`]: registers `data-layer-id` components
//! - [`interactions`]: click, change, submit, hover, swipe, impression,
//!   scroll and editor-link observers
//! - [`pipeline`]: ordered bootstrap of the observer chain
//! - [`adaptors`]: registry, dispatcher and the GTM, GA4 and Tealium adaptors
//! - [`data_layer`]: the [`DataLayer`] entry point

pub mod adaptors;
pub mod attribute_observer;
pub mod data_layer;
pub mod data_observer;
pub mod element_observer;
pub mod events;
pub mod helpers;
pub mod interactions;
pub mod metrics;
pub mod pipeline;
pub mod readiness;

pub use adaptors::ga::GaAdaptor;
pub use adaptors::gtm::GtmAdaptor;
pub use adaptors::tealium::TealiumAdaptor;
pub use adaptors::{Adaptor, AdaptorRegistry, CaptureTransport, Dispatcher, Transport};
pub use attribute_observer::{AttributeObserver, AttributeObserverDelegate};
pub use data_layer::DataLayer;
pub use element_observer::{ElementObserver, ElementObserverDelegate};
pub use events::Interaction;
pub use metrics::DispatchMetrics;
pub use pipeline::{Bootstrap, Pipeline, Stage, StageContext};
pub use readiness::Readiness;
