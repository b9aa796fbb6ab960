//! Ancestry resolution: follows `ParentID` references through registered
//! components to find the nearest enclosing block and label the ancestor
//! chain `Parent1 … ParentN`, `TopParent`.
//!
//! A missing component ends the walk with whatever has been collected. The
//! walk is bounded by `max_depth` and stops on a revisited id; both cut-offs
//! return the partial result.

use std::collections::HashSet;

use tracing::warn;

use crate::registry::ComponentSource;
use crate::types::{AncestorLabel, Ancestry, ComponentRecord, EnrichedEvent, Enrichment, RawEvent};

pub const DEFAULT_MAX_DEPTH: usize = 32;

pub struct AncestryResolver<'a, S: ComponentSource + ?Sized> {
    source: &'a S,
    max_depth: usize,
}

impl<'a, S: ComponentSource + ?Sized> AncestryResolver<'a, S> {
    pub fn new(source: &'a S, max_depth: usize) -> Self {
        Self {
            source,
            max_depth: max_depth.max(1),
        }
    }

    /// Nearest ancestor (starting at `parent_id` itself) whose `Type` is the
    /// block type. Non-block ancestors are skipped via their own `ParentID`.
    pub fn block(&self, parent_id: &str) -> Option<ComponentRecord> {
        let mut visited = HashSet::new();
        let mut current = parent_id.to_string();

        for _ in 0..self.max_depth {
            if !visited.insert(current.clone()) {
                warn!(component_id = %current, "cycle in ParentID chain while looking for block");
                return None;
            }
            let component = self.source.component(&current)?;
            if component.component_type().is_none() {
                return None;
            }
            if component.is_block() {
                return Some(component);
            }
            current = component.parent_id()?.to_string();
        }

        warn!(start = parent_id, max_depth = self.max_depth, "block lookup exceeded max depth");
        None
    }

    /// Ancestor chain from `parent_id` upward.
    pub fn ancestry(&self, parent_id: &str) -> Ancestry {
        let mut ancestry = Ancestry::new();
        let mut visited = HashSet::new();
        let mut current = parent_id.to_string();

        for depth in 1..=self.max_depth {
            if !visited.insert(current.clone()) {
                warn!(component_id = %current, depth, "cycle in ParentID chain, returning partial ancestry");
                return ancestry;
            }
            let Some(component) = self.source.component(&current) else {
                warn!(component_id = %current, depth, "ParentID references an unregistered component");
                return ancestry;
            };

            let next = match (component.component_type(), component.parent_id()) {
                (Some(_), Some(next)) => Some(next.to_string()),
                _ => None,
            };

            match next {
                None => {
                    ancestry.push(AncestorLabel::TopParent, component);
                    return ancestry;
                }
                Some(next) => {
                    ancestry.push(AncestorLabel::Parent(depth), component);
                    current = next;
                }
            }
        }

        warn!(start = parent_id, max_depth = self.max_depth, "ancestry walk exceeded max depth, returning partial ancestry");
        ancestry
    }

    /// Add `block` and `ancestry` to an event that carries a `ParentID`;
    /// anything else is passed through unchanged.
    pub fn enrich(&self, event: RawEvent) -> EnrichedEvent {
        let Some(parent_id) = event.parent_id.clone() else {
            return EnrichedEvent::plain(event);
        };

        let block = self.block(&parent_id);
        let ancestry = self.ancestry(&parent_id);

        EnrichedEvent {
            raw: event,
            enrichment: Some(Enrichment { block, ancestry }),
        }
    }
}
