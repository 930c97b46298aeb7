//! Training service wiring
//!
//! Owns the single process-wide shutdown token, the advisory busy flag and
//! exactly one instance of each worker. Components that need to signal a
//! worker get a handle from here instead of reaching for a global.

use crate::config::TrainerConfig;
use crate::correlation_builder::CorrelationBuilder;
use crate::fingerprint::FingerprintCalculator;
use crate::model_builder::ModelBuilder;
use crate::tokenizer::Tokenizer;
use crate::worker::{BusyFlag, WorkerControl, WorkerState};
use std::sync::Arc;
use suggest_common::model::ModelFamily;
use suggest_common::ontology::Ontology;
use suggest_common::store::CorpusStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct TrainingService {
    shutdown: CancellationToken,
    busy: BusyFlag,
    fingerprint: Arc<FingerprintCalculator>,
    model_builder: Arc<ModelBuilder>,
    correlation_builder: Arc<CorrelationBuilder>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TrainingService {
    /// Create the workers (not yet running)
    pub fn new(
        store: Arc<dyn CorpusStore>,
        ontology: Arc<dyn Ontology>,
        tokenizer: Arc<dyn Tokenizer>,
        config: &TrainerConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let busy = BusyFlag::new();

        let fingerprint_control = Arc::new(WorkerControl::new("fingerprint_calculator", &shutdown));
        let model_control = Arc::new(WorkerControl::new("model_builder", &shutdown));
        let correlation_control = Arc::new(WorkerControl::new("correlation_builder", &shutdown));

        let model_builder = Arc::new(ModelBuilder::new(
            Arc::clone(&model_control),
            Arc::clone(&store),
            Arc::clone(&ontology),
            busy.clone(),
            config.model_builder.clone(),
        ));

        let correlation_builder = Arc::new(CorrelationBuilder::new(
            Arc::clone(&correlation_control),
            Arc::clone(&model_control),
            Arc::clone(&store),
            ontology,
            busy.clone(),
            config.correlation_builder.clone(),
        ));

        let fingerprint = Arc::new(
            FingerprintCalculator::new(
                fingerprint_control,
                store,
                tokenizer,
                busy.clone(),
                config.fingerprint.clone(),
            )
            .with_dependent(model_control)
            .with_dependent(correlation_control),
        );

        Self {
            shutdown,
            busy,
            fingerprint,
            model_builder,
            correlation_builder,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start all workers; a second call is ignored
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Training service already started");
            return;
        }

        handles.push(Arc::clone(&self.fingerprint).start());
        handles.push(Arc::clone(&self.model_builder).start());
        handles.push(Arc::clone(&self.correlation_builder).start());
        info!(workers = handles.len(), "Training service started");
    }

    /// Stop every worker and wait for them to exit
    pub async fn shutdown(&self) {
        info!("Training service stopping");
        for control in self.worker_controls() {
            control.stop();
        }
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Training service stopped");
    }

    /// Wake the builder of `family` after its watermark was advanced
    pub fn notify_watermark_changed(&self, family: ModelFamily) {
        match family {
            ModelFamily::Nlp => self.model_builder.worker_control().bump(),
            ModelFamily::Correlation => self.correlation_builder.worker_control().bump(),
        }
    }

    /// Wake the fingerprint calculator after record text changed
    pub fn notify_records_changed(&self) {
        self.fingerprint.worker_control().bump();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Process-wide stop signal; cancelling it stops every worker
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn worker_states(&self) -> Vec<(&'static str, WorkerState)> {
        self.worker_controls()
            .iter()
            .map(|control| (control.name(), control.state()))
            .collect()
    }

    fn worker_controls(&self) -> [&Arc<WorkerControl>; 3] {
        [
            self.fingerprint.worker_control(),
            self.model_builder.worker_control(),
            self.correlation_builder.worker_control(),
        ]
    }
}
