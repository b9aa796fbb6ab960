//! Ordered bootstrap of the observer chain.
//!
//! Each stage receives the readiness of the stage before it and returns
//! the readiness the next stage should wait on. The component-declaration
//! stage produces a fresh handle; interaction stages pass theirs through.

use std::sync::Arc;

use datalayer_core::{DataLayerConfig, DataLayerStore};
use datalayer_dom::{Document, NodeId};
use tracing::info;

use crate::attribute_observer::AttributeObserver;
use crate::data_observer::DataAttributeStage;
use crate::interactions::InteractionStage;
use crate::readiness::Readiness;

/// Everything a stage needs to install itself.
#[derive(Clone)]
pub struct StageContext {
    pub document: Document,
    pub root: NodeId,
    pub store: Arc<DataLayerStore>,
    pub config: Arc<DataLayerConfig>,
}

impl StageContext {
    /// Observe the document body.
    pub fn new(document: Document, store: Arc<DataLayerStore>, config: Arc<DataLayerConfig>) -> Self {
        let root = document.body();
        Self {
            document,
            root,
            store,
            config,
        }
    }
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start observing. Must not block; waiting on `previous` happens in
    /// spawned tasks.
    fn install(&self, ctx: &StageContext, previous: Readiness) -> InstalledStage;
}

/// A started stage: its observer and the readiness it hands on.
#[derive(Debug)]
pub struct InstalledStage {
    name: &'static str,
    readiness: Readiness,
    observer: AttributeObserver,
}

impl InstalledStage {
    pub fn new(name: &'static str, readiness: Readiness, observer: AttributeObserver) -> Self {
        Self {
            name,
            readiness,
            observer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn observer(&self) -> &AttributeObserver {
        &self.observer
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::default_chain()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// data → click → change → wysiwyg → impression → submit → swipe → hover.
    /// Scroll tracking is opt-in through [`Pipeline::with_stage`].
    pub fn default_chain() -> Self {
        Self::new()
            .with_stage(DataAttributeStage)
            .with_stage(InteractionStage::click())
            .with_stage(InteractionStage::change())
            .with_stage(InteractionStage::wysiwyg())
            .with_stage(InteractionStage::impression())
            .with_stage(InteractionStage::submit())
            .with_stage(InteractionStage::swipe())
            .with_stage(InteractionStage::hover())
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Install every stage in order. Requires a Tokio runtime.
    pub fn run(&self, ctx: &StageContext) -> Bootstrap {
        let mut readiness = Readiness::resolved();
        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let installed = stage.install(ctx, readiness.clone());
            readiness = installed.readiness().clone();
            stages.push(installed);
        }
        info!(stages = ?self.stage_names(), "observer chain installed");
        Bootstrap { readiness, stages }
    }
}

/// Result of [`Pipeline::run`].
#[derive(Debug)]
pub struct Bootstrap {
    readiness: Readiness,
    stages: Vec<InstalledStage>,
}

impl Bootstrap {
    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_resolved()
    }

    pub async fn ready(&self) {
        self.readiness.wait().await;
    }

    pub fn stages(&self) -> &[InstalledStage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&InstalledStage> {
        self.stages.iter().find(|s| s.name() == name)
    }

    /// Stop every observer. Readiness already reached stays reached.
    pub fn stop(&self) {
        for stage in &self.stages {
            stage.observer().stop();
        }
        info!("observer chain stopped");
    }
}
