//! Correlation model builder
//!
//! Builds one model per target from annotation co-occurrence: each usable
//! curated record is a row whose features are the other targets it carries
//! (the target being modelled is always left out), labelled by whether the
//! record carries the target.
//!
//! Yields to the text model builder: at each checkpoint it pauses only while
//! that builder is itself paused.

use crate::config::CorrelationBuilderConfig;
use crate::corpus::CorpusSnapshot;
use crate::sweep::{
    run_builder_loop, ModelSweep, PausePolicy, SweepOutcome, SweepRunner, TrainingFeatures,
    TrainingSet,
};
use crate::worker::{spawn_worker, BusyFlag, Worker, WorkerControl};
use async_trait::async_trait;
use std::sync::Arc;
use suggest_common::model::{Fingerprint, ModelFamily, TargetId};
use suggest_common::ontology::Ontology;
use suggest_common::store::CorpusStore;
use suggest_common::Result;
use tokio::task::JoinHandle;
use tracing::info;

/// Co-occurring targets as features
pub struct CooccurrenceFeatures;

impl TrainingFeatures for CooccurrenceFeatures {
    fn training_set(&self, snapshot: &CorpusSnapshot, target: TargetId) -> TrainingSet {
        let mut rows = Vec::with_capacity(snapshot.records().len());
        let mut labels = Vec::with_capacity(snapshot.records().len());

        for record in snapshot.records() {
            let features: Vec<Fingerprint> = record
                .targets
                .iter()
                .filter(|&&other| other != target)
                .filter_map(|&other| Fingerprint::try_from(other).ok())
                .collect();
            rows.push(features);
            labels.push(record.carries(target));
        }

        TrainingSet {
            rows: Arc::new(rows),
            labels,
        }
    }
}

/// Background worker keeping the correlation models fresh
pub struct CorrelationBuilder {
    control: Arc<WorkerControl>,
    /// Text model builder, yielded to while it is paused
    model_builder: Arc<WorkerControl>,
    store: Arc<dyn CorpusStore>,
    ontology: Arc<dyn Ontology>,
    busy: BusyFlag,
    config: CorrelationBuilderConfig,
}

impl CorrelationBuilder {
    pub fn new(
        control: Arc<WorkerControl>,
        model_builder: Arc<WorkerControl>,
        store: Arc<dyn CorpusStore>,
        ontology: Arc<dyn Ontology>,
        busy: BusyFlag,
        config: CorrelationBuilderConfig,
    ) -> Self {
        Self {
            control,
            model_builder,
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
impl ModelSweep for CorrelationBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Correlation
    }

    async fn sweep(&self, watermark: i64) -> Result<SweepOutcome> {
        let snapshot = CorpusSnapshot::load(self.store.as_ref(), self.ontology.as_ref()).await?;
        info!(
            records = snapshot.records().len(),
            targets = snapshot.universe().len(),
            "Correlation training corpus loaded"
        );

        SweepRunner::new(
            ModelFamily::Correlation,
            self.store.as_ref(),
            &self.control,
            self.config.schedule(),
            PausePolicy::WhenPeerPaused(Arc::clone(&self.model_builder)),
        )
        .run(watermark, &snapshot, &CooccurrenceFeatures)
        .await
    }
}

#[async_trait]
impl Worker for CorrelationBuilder {
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
