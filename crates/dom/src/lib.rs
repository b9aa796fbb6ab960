//! In-memory document model for the data layer.
//!
//! An arena of element and text nodes addressed by [`NodeId`], with the
//! observation primitives the data layer depends on: subtree mutation
//! observers, bubbling event listeners, and viewport intersection
//! observers. Every callback receives the [`Document`] it fired on.

pub mod document;
pub mod error;
pub mod events;
pub mod intersection;
pub mod mutation;
pub mod node;

pub use document::Document;
pub use error::{DomError, DomResult};
pub use events::{DomEvent, DomEventType, ListenerId};
pub use intersection::{IntersectionEntry, IntersectionObserver};
pub use mutation::{MutationObserverId, MutationRecord};
pub use node::{NodeId, Rect};
