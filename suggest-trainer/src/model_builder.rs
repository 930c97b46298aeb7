//! Text model builder
//!
//! Builds one NLP model per target from record text fingerprints:
//! - rows are the usable curated records with a non-empty fingerprint
//! - the corpus-wide fingerprint vocabulary is pruned to the configured ceiling
//! - label = "record carries the target (directly or via an ancestor)"
//!
//! Pauses unconditionally every `pause_every` targets to bound peak memory;
//! the correlation builder yields while this builder is paused.

use crate::config::ModelBuilderConfig;
use crate::corpus::CorpusSnapshot;
use crate::pruning::prune_fingerprints;
use crate::sweep::{
    run_builder_loop, ModelSweep, PausePolicy, SweepOutcome, SweepRunner, TrainingFeatures,
    TrainingSet,
};
use crate::worker::{spawn_worker, BusyFlag, Worker, WorkerControl};
use async_trait::async_trait;
use std::sync::Arc;
use suggest_common::model::{Fingerprint, ModelFamily, RecordId, TargetId};
use suggest_common::ontology::Ontology;
use suggest_common::store::CorpusStore;
use suggest_common::Result;
use tokio::task::JoinHandle;
use tracing::info;

/// Pruned text fingerprints of the fingerprinted records in a snapshot
pub struct TextFeatures {
    /// Ids of the records behind `rows`, parallel to it
    record_ids: Vec<RecordId>,
    rows: Arc<Vec<Vec<Fingerprint>>>,
}

impl TextFeatures {
    pub fn from_snapshot(snapshot: &CorpusSnapshot, max_fingerprints: usize) -> Self {
        let (record_ids, rows): (Vec<RecordId>, Vec<Vec<Fingerprint>>) = snapshot
            .records()
            .iter()
            .filter_map(|record| match &record.fingerprint {
                Some(fingerprint) if !fingerprint.is_empty() => {
                    Some((record.id, fingerprint.clone()))
                }
                _ => None,
            })
            .unzip();

        let pruned = prune_fingerprints(rows, max_fingerprints);
        if pruned.distinct_after < pruned.distinct_before {
            info!(
                before = pruned.distinct_before,
                after = pruned.distinct_after,
                "Pruned text fingerprints"
            );
        }

        Self {
            record_ids,
            rows: Arc::new(pruned.rows),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TrainingFeatures for TextFeatures {
    fn training_set(&self, snapshot: &CorpusSnapshot, target: TargetId) -> TrainingSet {
        // Rows are a subsequence of the snapshot's records, in the same order
        let mut records = snapshot.records().iter();
        let labels = self
            .record_ids
            .iter()
            .map(|id| {
                records
                    .find(|record| record.id == *id)
                    .is_some_and(|record| record.carries(target))
            })
            .collect();

        TrainingSet {
            rows: Arc::clone(&self.rows),
            labels,
        }
    }
}

/// Background worker keeping the NLP models fresh
pub struct ModelBuilder {
    control: Arc<WorkerControl>,
    store: Arc<dyn CorpusStore>,
    ontology: Arc<dyn Ontology>,
    busy: BusyFlag,
    config: ModelBuilderConfig,
}

impl ModelBuilder {
    pub fn new(
        control: Arc<WorkerControl>,
        store: Arc<dyn CorpusStore>,
        ontology: Arc<dyn Ontology>,
        busy: BusyFlag,
        config: ModelBuilderConfig,
    ) -> Self {
        Self {
            control,
            store,
            ontology,
            busy,
            config,
        }
    }

    pub fn worker_control(&self) -> &Arc<WorkerControl> {
        &self.control
    }

    /// Spawn the builder loop in the background
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        spawn_worker(self)
    }
}

#[async_trait]
impl ModelSweep for ModelBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Nlp
    }

    async fn sweep(&self, watermark: i64) -> Result<SweepOutcome> {
        let snapshot = CorpusSnapshot::load(self.store.as_ref(), self.ontology.as_ref()).await?;
        let features = TextFeatures::from_snapshot(&snapshot, self.config.max_fingerprints);
        info!(
            records = snapshot.records().len(),
            fingerprinted = features.len(),
            targets = snapshot.universe().len(),
            "NLP training corpus loaded"
        );

        SweepRunner::new(
            ModelFamily::Nlp,
            self.store.as_ref(),
            &self.control,
            self.config.schedule(),
            PausePolicy::Always,
        )
        .run(watermark, &snapshot, &features)
        .await
    }
}

#[async_trait]
impl Worker for ModelBuilder {
    fn control(&self) -> &WorkerControl {
        &self.control
    }

    async fn run(&self) {
        run_builder_loop(
            self,
            &self.control,
            self.store.as_ref(),
            &self.busy,
            &self.config.schedule(),
        )
        .await;
    }
}
