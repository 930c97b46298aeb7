//! Text fingerprint calculator
//!
//! **States:** `IDLE → SCANNING → APPLY* → IDLE`
//!
//! Each pass asks the store for records with text but no fingerprint,
//! tokenizes the text (up to the cutoff marker), maps every block to its
//! stable integer id and persists the sorted id set. The advisory busy flag
//! is raised for the duration of the pass so the model builders hold off.
//!
//! A record that fails (store or tokenizer error) is skipped and picked up
//! again on a later pass; nothing partial is ever written. The write is
//! conditional on the text it was computed from, so a record whose text is
//! replaced mid-computation keeps no fingerprint and is rescanned.

use crate::config::FingerprintConfig;
use crate::tokenizer::Tokenizer;
use crate::worker::{spawn_worker, BusyFlag, WakeReason, Worker, WorkerControl};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use suggest_common::model::{fingerprint_set, Fingerprint, RecordId};
use suggest_common::store::CorpusStore;
use suggest_common::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Block → id mapping shared by all fingerprint computations
///
/// Ids come from the store (the table only grows); the local cache avoids a
/// store round trip for blocks already seen. New blocks are resolved under
/// the lock so one block never races to two lookups.
pub struct BlockTable {
    store: Arc<dyn CorpusStore>,
    cache: Mutex<HashMap<String, Fingerprint>>,
}

impl BlockTable {
    pub fn new(store: Arc<dyn CorpusStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn id_for(&self, block: &str) -> Result<Fingerprint> {
        let mut cache = self.cache.lock().await;
        if let Some(&id) = cache.get(block) {
            return Ok(id);
        }
        let id = self.store.block_id(block).await?;
        cache.insert(block.to_string(), id);
        Ok(id)
    }

}

/// Text before the first occurrence of `marker` (the whole text if absent)
pub fn truncate_at_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return text;
    }
    match text.find(marker) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Counts from one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub computed: usize,
    pub failed: usize,
    /// Records replaced or removed while their fingerprint was computed
    pub changed: usize,
}

impl PassSummary {
    /// The pass found something to do, so the next one should not wait
    pub fn found_work(&self) -> bool {
        self.computed > 0 || self.changed > 0
    }
}

/// Background worker computing missing text fingerprints
pub struct FingerprintCalculator {
    control: Arc<WorkerControl>,
    store: Arc<dyn CorpusStore>,
    tokenizer: Arc<dyn Tokenizer>,
    blocks: BlockTable,
    busy: BusyFlag,
    config: FingerprintConfig,
    /// Workers bumped after a pass that computed fingerprints
    dependents: Vec<Arc<WorkerControl>>,
}

impl FingerprintCalculator {
    pub fn new(
        control: Arc<WorkerControl>,
        store: Arc<dyn CorpusStore>,
        tokenizer: Arc<dyn Tokenizer>,
        busy: BusyFlag,
        config: FingerprintConfig,
    ) -> Self {
        Self {
            control,
            blocks: BlockTable::new(Arc::clone(&store)),
            store,
            tokenizer,
            busy,
            config,
            dependents: Vec::new(),
        }
    }

    /// Bump `dependent` whenever a pass computes new fingerprints
    pub fn with_dependent(mut self, dependent: Arc<WorkerControl>) -> Self {
        self.dependents.push(dependent);
        self
    }

    pub fn worker_control(&self) -> &Arc<WorkerControl> {
        &self.control
    }

    /// Spawn the calculator loop in the background
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        spawn_worker(self)
    }

    /// Compute every missing fingerprint once
    ///
    /// Stops between records if stop is requested.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let _busy = self.busy.enter();
        let pending = self.store.records_missing_fingerprint().await?;
        if !pending.is_empty() {
            debug!(pending = pending.len(), "Fingerprint pass started");
        }

        let mut summary = PassSummary::default();
        for record_id in pending {
            if self.control.is_stopped() {
                break;
            }
            match self.compute(record_id).await {
                Ok(true) => summary.computed += 1,
                Ok(false) => {
                    debug!(record_id, "Record changed during fingerprinting, will retry");
                    summary.changed += 1;
                }
                Err(e) => {
                    warn!(record_id, error = %e, "Fingerprint computation failed, will retry");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Fingerprint one record; `false` if it was replaced or removed meanwhile
    async fn compute(&self, record_id: RecordId) -> Result<bool> {
        let Some(record) = self.store.record(record_id).await? else {
            return Ok(false);
        };

        let text = truncate_at_marker(&record.text, &self.config.cutoff_marker);
        let blocks = self.tokenizer.blocks(text)?;

        let mut ids = Vec::with_capacity(blocks.len());
        for block in &blocks {
            ids.push(self.blocks.id_for(block).await?);
        }
        let fingerprint = fingerprint_set(ids);

        let stored = self
            .store
            .set_record_fingerprint(record_id, &record.text, &fingerprint)
            .await?;
        if stored {
            debug!(record_id, blocks = fingerprint.len(), "Fingerprint stored");
        }
        Ok(stored)
    }
}

#[async_trait]
impl Worker for FingerprintCalculator {
    fn control(&self) -> &WorkerControl {
        &self.control
    }

    async fn run(&self) {
        loop {
            if self.control.is_stopped() {
                break;
            }

            let found_work = match self.run_pass().await {
                Ok(summary) => {
                    if summary != PassSummary::default() {
                        info!(
                            computed = summary.computed,
                            failed = summary.failed,
                            changed = summary.changed,
                            "Fingerprint pass complete"
                        );
                    }
                    if summary.computed > 0 {
                        for dependent in &self.dependents {
                            dependent.bump();
                        }
                    }
                    summary.found_work()
                }
                Err(e) => {
                    error!(error = %e, "Fingerprint pass failed");
                    false
                }
            };

            // Rescan straight away while passes keep producing fingerprints
            if !found_work
                && self.control.wait(self.config.idle_interval()).await == WakeReason::Stopped
            {
                break;
            }
        }
    }
}
