//! Store wrappers that inject events into a running sweep

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use suggest_common::model::{
    Fingerprint, Model, ModelFamily, Record, RecordId, TargetId, TargetTable,
};
use suggest_common::store::{CorpusStore, MemoryStore};
use suggest_common::{Error, Result};

/// Runs a hook right after the N-th model publish (blank or not)
pub struct HookStore {
    inner: Arc<MemoryStore>,
    trigger_after: usize,
    publishes: AtomicUsize,
    hook: Box<dyn Fn() + Send + Sync>,
}

impl HookStore {
    pub fn new(
        inner: Arc<MemoryStore>,
        trigger_after: usize,
        hook: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            trigger_after,
            publishes: AtomicUsize::new(0),
            hook: Box::new(hook),
        }
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn published(&self) {
        if self.publishes.fetch_add(1, Ordering::SeqCst) + 1 == self.trigger_after {
            (self.hook)();
        }
    }
}

#[async_trait]
impl CorpusStore for HookStore {
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.curated_record_ids().await
    }

    async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        self.inner.record(id).await
    }

    async fn annotation_targets(&self) -> Result<TargetTable> {
        self.inner.annotation_targets().await
    }

    async fn family_watermark(&self, family: ModelFamily) -> Result<i64> {
        self.inner.family_watermark(family).await
    }

    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>> {
        self.inner.stored_model_watermark(family, target).await
    }

    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>> {
        self.inner.stored_model(family, target).await
    }

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()> {
        self.inner.publish_model(family, model).await?;
        self.published();
        Ok(())
    }

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()> {
        self.inner.publish_blank_model(family, target, watermark).await?;
        self.published();
        Ok(())
    }

    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>> {
        self.inner.records_missing_fingerprint().await
    }

    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool> {
        self.inner.set_record_fingerprint(id, source_text, fingerprint).await
    }

    async fn block_id(&self, block: &str) -> Result<Fingerprint> {
        self.inner.block_id(block).await
    }
}

/// Fails every `record` fetch for the ids marked as failing
pub struct FlakyRecordStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<RecordId>>,
}

impl FlakyRecordStore {
    pub fn new(inner: Arc<MemoryStore>, failing: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            inner,
            failing: Mutex::new(failing.into_iter().collect()),
        }
    }

    pub fn heal(&self, id: RecordId) {
        self.failing.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl CorpusStore for FlakyRecordStore {
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.curated_record_ids().await
    }

    async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(Error::Internal(format!("simulated fetch failure for record {}", id)));
        }
        self.inner.record(id).await
    }

    async fn annotation_targets(&self) -> Result<TargetTable> {
        self.inner.annotation_targets().await
    }

    async fn family_watermark(&self, family: ModelFamily) -> Result<i64> {
        self.inner.family_watermark(family).await
    }

    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>> {
        self.inner.stored_model_watermark(family, target).await
    }

    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>> {
        self.inner.stored_model(family, target).await
    }

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()> {
        self.inner.publish_model(family, model).await
    }

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()> {
        self.inner.publish_blank_model(family, target, watermark).await
    }

    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>> {
        self.inner.records_missing_fingerprint().await
    }

    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool> {
        self.inner.set_record_fingerprint(id, source_text, fingerprint).await
    }

    async fn block_id(&self, block: &str) -> Result<Fingerprint> {
        self.inner.block_id(block).await
    }
}

/// Replaces a record's text once, right after the first time it is read
///
/// Mimics a curator editing the text while its fingerprint is computed.
pub struct EditDuringReadStore {
    inner: Arc<MemoryStore>,
    record: RecordId,
    replacement: String,
    edited: AtomicBool,
}

impl EditDuringReadStore {
    pub fn new(inner: Arc<MemoryStore>, record: RecordId, replacement: &str) -> Self {
        Self {
            inner,
            record,
            replacement: replacement.to_string(),
            edited: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CorpusStore for EditDuringReadStore {
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.curated_record_ids().await
    }

    async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        let record = self.inner.record(id).await?;
        if id == self.record && !self.edited.swap(true, Ordering::SeqCst) {
            let annotations = record.as_ref().map(|r| r.annotations.clone()).unwrap_or_default();
            self.inner.put_record(id, &self.replacement, annotations)?;
        }
        Ok(record)
    }

    async fn annotation_targets(&self) -> Result<TargetTable> {
        self.inner.annotation_targets().await
    }

    async fn family_watermark(&self, family: ModelFamily) -> Result<i64> {
        self.inner.family_watermark(family).await
    }

    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>> {
        self.inner.stored_model_watermark(family, target).await
    }

    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>> {
        self.inner.stored_model(family, target).await
    }

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()> {
        self.inner.publish_model(family, model).await
    }

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()> {
        self.inner.publish_blank_model(family, target, watermark).await
    }

    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>> {
        self.inner.records_missing_fingerprint().await
    }

    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool> {
        self.inner.set_record_fingerprint(id, source_text, fingerprint).await
    }

    async fn block_id(&self, block: &str) -> Result<Fingerprint> {
        self.inner.block_id(block).await
    }
}
