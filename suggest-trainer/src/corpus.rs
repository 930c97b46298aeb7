//! Per-sweep snapshot of the curated corpus
//!
//! Loads every usable curated record once per sweep and resolves its
//! annotations to target ids:
//! - only properties flagged suggestible take part
//! - each value is expanded to its ontology ancestors, and every
//!   (property, ancestor) pair present in the target table counts as carried
//! - a record with a suggestible annotation whose property has no ontology
//!   tree is excluded
//!
//! The target universe is the set of targets carried by at least one record.

use std::collections::BTreeSet;
use suggest_common::model::{Fingerprint, Record, RecordId, TargetId, TargetTable};
use suggest_common::ontology::Ontology;
use suggest_common::store::CorpusStore;
use suggest_common::Result;
use tracing::{debug, warn};

/// One usable record, reduced to what training needs
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRecord {
    pub id: RecordId,
    /// Text fingerprint, if computed
    pub fingerprint: Option<Vec<Fingerprint>>,
    /// Carried targets (direct and ancestor-inferred), ascending
    pub targets: Vec<TargetId>,
}

impl CorpusRecord {
    pub fn carries(&self, target: TargetId) -> bool {
        self.targets.binary_search(&target).is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    records: Vec<CorpusRecord>,
    explicit: BTreeSet<TargetId>,
    universe: Vec<TargetId>,
}

impl CorpusSnapshot {
    /// Read the curated corpus from the store
    ///
    /// Records that cannot be fetched are logged and skipped.
    pub async fn load(store: &dyn CorpusStore, ontology: &dyn Ontology) -> Result<Self> {
        let targets = store.annotation_targets().await?;
        let ids = store.curated_record_ids().await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match store.record(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(record_id = id, "Curated record vanished during snapshot"),
                Err(e) => warn!(record_id = id, error = %e, "Skipping record that failed to load"),
            }
        }

        Ok(Self::from_records(records, &targets, ontology))
    }

    pub fn from_records(
        records: impl IntoIterator<Item = Record>,
        targets: &TargetTable,
        ontology: &dyn Ontology,
    ) -> Self {
        let mut snapshot = Self::default();
        let mut universe = BTreeSet::new();

        for record in records {
            let Some((carried, explicit)) = resolve_targets(&record, targets, ontology) else {
                debug!(record_id = record.id, "No ontology tree for record annotation, excluded");
                continue;
            };
            universe.extend(carried.iter().copied());
            snapshot.explicit.extend(explicit);
            snapshot.records.push(CorpusRecord {
                id: record.id,
                fingerprint: record.fingerprint,
                targets: carried.into_iter().collect(),
            });
        }

        snapshot.universe = universe.into_iter().collect();
        snapshot
    }

    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    /// Targets observed on at least one usable record, ascending
    pub fn universe(&self) -> &[TargetId] {
        &self.universe
    }

    /// Target was applied directly (not only inferred) on some record
    pub fn is_explicit(&self, target: TargetId) -> bool {
        self.explicit.contains(&target)
    }
}

/// (carried, explicit) targets of a record, or `None` if it must be excluded
fn resolve_targets(
    record: &Record,
    targets: &TargetTable,
    ontology: &dyn Ontology,
) -> Option<(BTreeSet<TargetId>, BTreeSet<TargetId>)> {
    let mut carried = BTreeSet::new();
    let mut explicit = BTreeSet::new();

    for annotation in &record.annotations {
        if !ontology.is_suggestible(&annotation.prop_uri) {
            continue;
        }
        let closure = ontology.expand_to_ancestors(
            &annotation.prop_uri,
            &annotation.group_path,
            &annotation.value_uri,
        )?;

        if let Some(target) = targets.get(&annotation.prop_uri, &annotation.value_uri) {
            explicit.insert(target);
        }
        carried.extend(
            closure
                .iter()
                .filter_map(|value| targets.get(&annotation.prop_uri, value)),
        );
    }

    Some((carried, explicit))
}
