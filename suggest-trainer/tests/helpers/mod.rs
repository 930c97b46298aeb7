//! Test Helper Utilities
//!
//! Shared corpus fixtures and store wrappers for the trainer integration tests

#![allow(dead_code)]

pub mod stores;

pub use stores::{EditDuringReadStore, FlakyRecordStore, HookStore};

use std::sync::Arc;
use suggest_common::model::{Annotation, ModelFamily, TargetId};
use suggest_common::ontology::OntologyTree;
use suggest_common::store::{CorpusStore, MemoryStore};
use suggest_trainer::config::{CorrelationBuilderConfig, ModelBuilderConfig};
use suggest_trainer::{BusyFlag, CorrelationBuilder, ModelBuilder, WorkerControl};
use tokio_util::sync::CancellationToken;

/// Suggestible property used by every fixture
pub const PROP: &str = "p:target";

/// Ontology with `v:kinase → v:protein` plus flat values `v:t0 .. v:t19`
pub fn ontology() -> OntologyTree {
    let mut tree = OntologyTree::new();
    tree.add_property(PROP, &[], true);
    tree.add_value(PROP, &[], "v:protein", None).unwrap();
    tree.add_value(PROP, &[], "v:kinase", Some("v:protein")).unwrap();
    for k in 0..20 {
        tree.add_value(PROP, &[], &format!("v:t{}", k), None).unwrap();
    }
    tree
}

/// Seed `2 * num_targets` records where target `k` is carried by exactly the
/// records holding text fingerprint `100 + k` (perfectly separable)
///
/// Returns the target ids in registration order.
pub async fn seed_separable_corpus(store: &MemoryStore, num_targets: usize) -> Vec<TargetId> {
    let targets: Vec<TargetId> = (0..num_targets)
        .map(|k| store.register_target(PROP, &format!("v:t{}", k)).unwrap())
        .collect();

    for i in 0..2 * num_targets {
        let k = i % num_targets;
        let id = i as i64 + 1;
        let text = format!("record {}", id);
        let annotations = vec![Annotation::new(PROP, format!("v:t{}", k))];
        store.put_record(id, &text, annotations).unwrap();
        store
            .set_record_fingerprint(id, &text, &[100 + k as i32, 300 + (i % 4) as i32])
            .await
            .unwrap();
    }
    targets
}

pub fn builder_config() -> ModelBuilderConfig {
    ModelBuilderConfig {
        busy_recheck_millis: 10,
        pause_every: 0,
        pause_millis: 1,
        ..Default::default()
    }
}

pub fn correlation_config() -> CorrelationBuilderConfig {
    CorrelationBuilderConfig {
        busy_recheck_millis: 10,
        pause_every: 0,
        pause_millis: 1,
        ..Default::default()
    }
}

pub fn model_builder(store: Arc<dyn CorpusStore>, shutdown: &CancellationToken) -> ModelBuilder {
    model_builder_with(store, shutdown, builder_config())
}

pub fn model_builder_with(
    store: Arc<dyn CorpusStore>,
    shutdown: &CancellationToken,
    config: ModelBuilderConfig,
) -> ModelBuilder {
    ModelBuilder::new(
        Arc::new(WorkerControl::new("model_builder", shutdown)),
        store,
        Arc::new(ontology()),
        BusyFlag::new(),
        config,
    )
}

pub fn correlation_builder(
    store: Arc<dyn CorpusStore>,
    shutdown: &CancellationToken,
) -> CorrelationBuilder {
    let peer = Arc::new(WorkerControl::new("model_builder", shutdown));
    correlation_builder_with(store, shutdown, peer, correlation_config())
}

/// Correlation builder yielding to the given model builder control
pub fn correlation_builder_with(
    store: Arc<dyn CorpusStore>,
    shutdown: &CancellationToken,
    model_builder: Arc<WorkerControl>,
    config: CorrelationBuilderConfig,
) -> CorrelationBuilder {
    CorrelationBuilder::new(
        Arc::new(WorkerControl::new("correlation_builder", shutdown)),
        model_builder,
        store,
        Arc::new(ontology()),
        BusyFlag::new(),
        config,
    )
}

/// Poll until `control` reports paused (gives up after 5s)
pub async fn wait_until_paused(control: &WorkerControl) -> bool {
    for _ in 0..500 {
        if control.is_paused() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}

/// Stored watermark of every target, in the order given
pub async fn stamps(
    store: &dyn CorpusStore,
    family: ModelFamily,
    targets: &[TargetId],
) -> Vec<Option<i64>> {
    let mut stamps = Vec::with_capacity(targets.len());
    for &target in targets {
        stamps.push(store.stored_model_watermark(family, target).await.unwrap());
    }
    stamps
}

/// Poll until `target`'s stored model carries `watermark` (gives up after 10s)
pub async fn wait_for_stamp(
    store: &dyn CorpusStore,
    family: ModelFamily,
    target: TargetId,
    watermark: i64,
) -> bool {
    for _ in 0..400 {
        if store.stored_model_watermark(family, target).await.unwrap() == Some(watermark) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    false
}
