//! Corpus persistence contract consumed by the training workers
//!
//! The workers only read records, targets and watermarks, and write
//! fingerprints and models. Every write is a single-document upsert; no
//! operation spans several targets or records.
//!
//! The caller-side operations that change the corpus (`put_record`,
//! `register_target`, `increment_watermark`, ...) are inherent methods on the
//! concrete stores, since the workers never call them.

use crate::model::{
    Annotation, Fingerprint, Model, ModelFamily, Record, RecordId, TargetId, TargetTable,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Persistence operations used by the fingerprint calculator and model builders
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Ids of records whose annotations are curated (usable as training data)
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>>;

    async fn record(&self, id: RecordId) -> Result<Option<Record>>;

    /// Snapshot of the (property, value) → target table
    async fn annotation_targets(&self) -> Result<TargetTable>;

    /// Current watermark of a model family (only ever read by the workers)
    async fn family_watermark(&self, family: ModelFamily) -> Result<i64>;

    /// Watermark stamped on the stored model, or `None` if no model exists
    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>>;

    /// Read a published model (blank sentinels included)
    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>>;

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()>;

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()>;

    /// Records with non-empty text and no fingerprint yet
    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>>;

    /// Store `fingerprint` if the record's text is still `source_text`
    ///
    /// Returns `false` when the record was replaced or removed after the text
    /// was read; the record is then left for a later pass.
    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool>;

    /// Id of a text block, created when first seen; ids are never reused
    async fn block_id(&self, block: &str) -> Result<Fingerprint>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    curated: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<RecordId, StoredRecord>,
    targets: TargetTable,
    next_target: TargetId,
    blocks: HashMap<String, Fingerprint>,
    watermarks: HashMap<ModelFamily, i64>,
    models: HashMap<(ModelFamily, TargetId), Model>,
}

/// In-process corpus store
///
/// Holds everything behind one mutex that is never held across an await.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    /// Insert or replace a curated record; any previous fingerprint is dropped
    pub fn put_record(&self, id: RecordId, text: &str, annotations: Vec<Annotation>) -> Result<()> {
        let mut state = self.state()?;
        state.records.insert(
            id,
            StoredRecord {
                record: Record {
                    id,
                    text: text.to_string(),
                    annotations,
                    fingerprint: None,
                },
                curated: true,
            },
        );
        Ok(())
    }

    pub fn set_curated(&self, id: RecordId, curated: bool) -> Result<()> {
        let mut state = self.state()?;
        let stored = state
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;
        stored.curated = curated;
        Ok(())
    }

    /// Register a (property, value) pair as a target, returning its id
    pub fn register_target(&self, prop_uri: &str, value_uri: &str) -> Result<TargetId> {
        let mut state = self.state()?;
        if let Some(existing) = state.targets.get(prop_uri, value_uri) {
            return Ok(existing);
        }
        state.next_target += 1;
        let target = state.next_target;
        state.targets.insert(prop_uri, value_uri, target);
        Ok(target)
    }

    /// Advance a family watermark, returning the new value
    pub fn increment_watermark(&self, family: ModelFamily) -> Result<i64> {
        let mut state = self.state()?;
        let watermark = state.watermarks.entry(family).or_insert(0);
        *watermark += 1;
        Ok(*watermark)
    }

    pub fn model_count(&self, family: ModelFamily) -> Result<usize> {
        let state = self.state()?;
        Ok(state.models.keys().filter(|(f, _)| *f == family).count())
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>> {
        let state = self.state()?;
        Ok(state
            .records
            .values()
            .filter(|stored| stored.curated)
            .map(|stored| stored.record.id)
            .collect())
    }

    async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        let state = self.state()?;
        Ok(state.records.get(&id).map(|stored| stored.record.clone()))
    }

    async fn annotation_targets(&self) -> Result<TargetTable> {
        Ok(self.state()?.targets.clone())
    }

    async fn family_watermark(&self, family: ModelFamily) -> Result<i64> {
        Ok(self.state()?.watermarks.get(&family).copied().unwrap_or(0))
    }

    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>> {
        let state = self.state()?;
        Ok(state.models.get(&(family, target)).map(|m| m.watermark))
    }

    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>> {
        Ok(self.state()?.models.get(&(family, target)).cloned())
    }

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()> {
        let mut state = self.state()?;
        state.models.insert((family, model.target), model.clone());
        Ok(())
    }

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()> {
        let mut state = self.state()?;
        state
            .models
            .insert((family, target), Model::blank(target, watermark));
        Ok(())
    }

    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>> {
        let state = self.state()?;
        Ok(state
            .records
            .values()
            .filter(|stored| {
                stored.record.fingerprint.is_none() && !stored.record.text.trim().is_empty()
            })
            .map(|stored| stored.record.id)
            .collect())
    }

    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool> {
        let mut state = self.state()?;
        match state.records.get_mut(&id) {
            Some(stored) if stored.record.text == source_text => {
                stored.record.fingerprint = Some(fingerprint.to_vec());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn block_id(&self, block: &str) -> Result<Fingerprint> {
        let mut state = self.state()?;
        if let Some(&id) = state.blocks.get(block) {
            return Ok(id);
        }
        let id = Fingerprint::try_from(state.blocks.len() + 1)
            .map_err(|_| Error::Internal("text block id space exhausted".to_string()))?;
        state.blocks.insert(block.to_string(), id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_record_clears_fingerprint() {
        let store = MemoryStore::new();
        store.put_record(1, "alpha beta", vec![]).unwrap();
        assert!(store.set_record_fingerprint(1, "alpha beta", &[3, 4]).await.unwrap());
        assert_eq!(store.record(1).await.unwrap().unwrap().fingerprint, Some(vec![3, 4]));

        store.put_record(1, "alpha gamma", vec![]).unwrap();
        assert_eq!(store.record(1).await.unwrap().unwrap().fingerprint, None);
        assert_eq!(store.records_missing_fingerprint().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_fingerprint_of_replaced_text_is_rejected() {
        let store = MemoryStore::new();
        store.put_record(1, "alpha beta", vec![]).unwrap();
        store.put_record(1, "alpha gamma", vec![]).unwrap();

        assert!(!store.set_record_fingerprint(1, "alpha beta", &[3, 4]).await.unwrap());
        assert_eq!(store.record(1).await.unwrap().unwrap().fingerprint, None);
        assert_eq!(store.records_missing_fingerprint().await.unwrap(), vec![1]);
        assert!(!store.set_record_fingerprint(9, "missing", &[1]).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_fingerprint_skips_blank_text() {
        let store = MemoryStore::new();
        store.put_record(1, "   ", vec![]).unwrap();
        store.put_record(2, "text", vec![]).unwrap();
        assert_eq!(store.records_missing_fingerprint().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_block_ids_are_stable_and_positive() {
        let store = MemoryStore::new();
        let a = store.block_id("assay").await.unwrap();
        let b = store.block_id("kinase").await.unwrap();
        assert!(a > 0 && b > 0 && a != b);
        assert_eq!(store.block_id("assay").await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_curated_filter_and_targets() {
        let store = MemoryStore::new();
        store.put_record(1, "a", vec![]).unwrap();
        store.put_record(2, "b", vec![]).unwrap();
        store.set_curated(2, false).unwrap();
        assert_eq!(store.curated_record_ids().await.unwrap(), vec![1]);
        assert!(store.set_curated(9, true).is_err());

        let t1 = store.register_target("p", "v1").unwrap();
        let t2 = store.register_target("p", "v2").unwrap();
        assert_eq!(store.register_target("p", "v1").unwrap(), t1);
        let table = store.annotation_targets().await.unwrap();
        assert_eq!(table.get("p", "v2"), Some(t2));
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_watermarks_and_blank_models() {
        let store = MemoryStore::new();
        assert_eq!(store.family_watermark(ModelFamily::Nlp).await.unwrap(), 0);
        assert_eq!(store.increment_watermark(ModelFamily::Nlp).unwrap(), 1);
        assert_eq!(store.family_watermark(ModelFamily::Correlation).await.unwrap(), 0);

        assert_eq!(store.stored_model_watermark(ModelFamily::Nlp, 5).await.unwrap(), None);
        store.publish_blank_model(ModelFamily::Nlp, 5, 1).await.unwrap();
        assert_eq!(store.stored_model_watermark(ModelFamily::Nlp, 5).await.unwrap(), Some(1));
        assert_eq!(store.stored_model_watermark(ModelFamily::Correlation, 5).await.unwrap(), None);
        assert!(store.stored_model(ModelFamily::Nlp, 5).await.unwrap().unwrap().is_blank());
    }
}
