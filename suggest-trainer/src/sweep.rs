//! Watermark-stamped model sweep shared by both model builders
//!
//! **Outer loop** ([`run_builder_loop`]):
//! 1. Hold off while the fingerprint calculator reports busy
//! 2. Read the family watermark `W`; idle if the last completed sweep was at `W`
//! 3. Sweep at `W`; an aborted sweep restarts immediately from step 1
//!
//! **Sweep** ([`SweepRunner::run`]), per target in priority order:
//! - abort on stop or when the family watermark no longer equals `W`
//! - skip targets whose stored model is already stamped `W`
//! - build a model from the family's training rows and publish it stamped
//!   `W`, or publish a blank model stamped `W` when there is no signal
//! - every N processed targets, take a cooperative pause
//!
//! Every publish is a single upsert, so an abort never leaves partial state.

use crate::config::SweepSchedule;
use crate::corpus::CorpusSnapshot;
use crate::worker::{BusyFlag, WakeReason, WorkerControl};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use suggest_common::bayes::NaiveBayesian;
use suggest_common::model::{Fingerprint, ModelFamily, TargetId};
use suggest_common::store::CorpusStore;
use suggest_common::{Error, Result};
use tracing::{debug, error, info};

/// Training rows and labels for one target
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub rows: Arc<Vec<Vec<Fingerprint>>>,
    pub labels: Vec<bool>,
}

/// How a model family turns the corpus snapshot into training rows
pub trait TrainingFeatures: Send + Sync {
    fn training_set(&self, snapshot: &CorpusSnapshot, target: TargetId) -> TrainingSet;
}

/// When to take the cooperative pause at a checkpoint
#[derive(Debug, Clone)]
pub enum PausePolicy {
    /// Pause at every checkpoint
    Always,
    /// Yield only while a higher-priority peer is itself paused
    WhenPeerPaused(Arc<WorkerControl>),
}

/// Why a sweep stopped before reaching the end of its target list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Stopped,
    WatermarkMoved,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Stopped => f.write_str("stopped"),
            AbortReason::WatermarkMoved => f.write_str("watermark moved"),
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Models built and published
    pub built: usize,
    /// Blank models published
    pub blank: usize,
    /// Targets already stamped with the sweep's watermark
    pub skipped: usize,
    pub aborted: Option<AbortReason>,
}

impl SweepOutcome {
    pub fn processed(&self) -> usize {
        self.built + self.blank
    }
}

/// Runs one sweep of a model family at a fixed watermark
pub struct SweepRunner<'a> {
    family: ModelFamily,
    store: &'a dyn CorpusStore,
    control: &'a WorkerControl,
    schedule: SweepSchedule,
    pause: PausePolicy,
}

impl<'a> SweepRunner<'a> {
    pub fn new(
        family: ModelFamily,
        store: &'a dyn CorpusStore,
        control: &'a WorkerControl,
        schedule: SweepSchedule,
        pause: PausePolicy,
    ) -> Self {
        Self {
            family,
            store,
            control,
            schedule,
            pause,
        }
    }

    /// Targets with no stored model first, then oldest stamp first, ties by id
    ///
    /// Returns each target with the watermark currently stamped on it.
    pub async fn sweep_order(&self, universe: &[TargetId]) -> Result<Vec<(TargetId, Option<i64>)>> {
        let mut order = Vec::with_capacity(universe.len());
        for &target in universe {
            let stamped = self.store.stored_model_watermark(self.family, target).await?;
            order.push((target, stamped));
        }
        order.sort_by_key(|&(target, stamped)| (stamped, target));
        Ok(order)
    }

    pub async fn run(
        &self,
        watermark: i64,
        snapshot: &CorpusSnapshot,
        features: &dyn TrainingFeatures,
    ) -> Result<SweepOutcome> {
        let order = self.sweep_order(snapshot.universe()).await?;
        let mut outcome = SweepOutcome::default();

        for (target, stamped) in order {
            if self.control.is_stopped() {
                outcome.aborted = Some(AbortReason::Stopped);
                break;
            }
            if self.store.family_watermark(self.family).await? != watermark {
                outcome.aborted = Some(AbortReason::WatermarkMoved);
                break;
            }
            if stamped == Some(watermark) {
                outcome.skipped += 1;
                continue;
            }

            let training = features.training_set(snapshot, target);
            let built = tokio::task::spawn_blocking(move || {
                NaiveBayesian::build_model(&training.rows, &training.labels)
            })
            .await
            .map_err(|e| Error::Internal(format!("model build task failed: {}", e)))?;

            match built {
                Some(model) => {
                    debug!(
                        family = %self.family,
                        target_id = target,
                        fingerprints = model.fingerprints.len(),
                        roc_auc = model.roc_auc,
                        "Model built"
                    );
                    let model = model.into_model(target, watermark, snapshot.is_explicit(target));
                    self.store.publish_model(self.family, &model).await?;
                    outcome.built += 1;
                }
                None => {
                    debug!(
                        family = %self.family,
                        target_id = target,
                        "Insufficient signal, publishing blank model"
                    );
                    self.store
                        .publish_blank_model(self.family, target, watermark)
                        .await?;
                    outcome.blank += 1;
                }
            }

            let pause_every = self.schedule.pause_every;
            if pause_every > 0 && outcome.processed() % pause_every == 0 {
                self.checkpoint().await;
            }
        }

        Ok(outcome)
    }

    async fn checkpoint(&self) {
        let should_pause = match &self.pause {
            PausePolicy::Always => true,
            PausePolicy::WhenPeerPaused(peer) => peer.is_paused(),
        };
        if should_pause {
            debug!(family = %self.family, "Cooperative pause");
            self.control.pause(self.schedule.pause_duration).await;
        }
    }
}

/// A model family's sweep at a given watermark
#[async_trait]
pub trait ModelSweep: Send + Sync {
    fn family(&self) -> ModelFamily;

    async fn sweep(&self, watermark: i64) -> Result<SweepOutcome>;
}

/// Outer loop shared by the model builders; returns once stop is requested
pub async fn run_builder_loop(
    sweeper: &dyn ModelSweep,
    control: &WorkerControl,
    store: &dyn CorpusStore,
    busy: &BusyFlag,
    schedule: &SweepSchedule,
) {
    let family = sweeper.family();
    let mut last_completed: Option<i64> = None;

    loop {
        if control.is_stopped() {
            break;
        }

        if busy.is_busy() {
            debug!(family = %family, "Fingerprinting in progress, rechecking shortly");
            if control.wait(schedule.busy_recheck).await == WakeReason::Stopped {
                break;
            }
            continue;
        }

        let watermark = match store.family_watermark(family).await {
            Ok(watermark) => watermark,
            Err(e) => {
                error!(family = %family, error = %e, "Failed to read watermark");
                if control.wait(schedule.idle_interval).await == WakeReason::Stopped {
                    break;
                }
                continue;
            }
        };

        if last_completed == Some(watermark) {
            if control.wait(schedule.idle_interval).await == WakeReason::Stopped {
                break;
            }
            continue;
        }

        info!(family = %family, watermark, "Sweep started");
        match sweeper.sweep(watermark).await {
            Ok(outcome) => {
                info!(
                    family = %family,
                    watermark,
                    built = outcome.built,
                    blank = outcome.blank,
                    skipped = outcome.skipped,
                    aborted = ?outcome.aborted,
                    "Sweep finished"
                );
                match outcome.aborted {
                    None => last_completed = Some(watermark),
                    Some(AbortReason::Stopped) => break,
                    Some(AbortReason::WatermarkMoved) => {}
                }
            }
            Err(e) => {
                error!(family = %family, watermark, error = %e, "Sweep failed");
                if control.wait(schedule.idle_interval).await == WakeReason::Stopped {
                    break;
                }
            }
        }
    }
}
