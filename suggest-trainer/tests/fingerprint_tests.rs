//! Integration tests for the fingerprint calculator
//!
//! Covers:
//! - Text after the cutoff marker is ignored
//! - Block ids are shared across records
//! - Failed records are skipped and retried on the next pass
//! - Text replaced mid-computation is fingerprinted afresh, never stale
//! - The busy flag is raised for the duration of a pass
//! - Dependent builders are bumped after new fingerprints are stored

mod helpers;

use helpers::{EditDuringReadStore, FlakyRecordStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use suggest_common::model::fingerprint_set;
use suggest_common::store::{CorpusStore, MemoryStore};
use suggest_common::Result;
use suggest_trainer::config::FingerprintConfig;
use suggest_trainer::fingerprint::PassSummary;
use suggest_trainer::{
    BusyFlag, FingerprintCalculator, LexicalTokenizer, Tokenizer, WakeReason, WorkerControl,
};
use tokio_util::sync::CancellationToken;

fn calculator(
    store: Arc<dyn CorpusStore>,
    tokenizer: Arc<dyn Tokenizer>,
    busy: BusyFlag,
) -> FingerprintCalculator {
    FingerprintCalculator::new(
        Arc::new(WorkerControl::new("fingerprint_calculator", &CancellationToken::new())),
        store,
        tokenizer,
        busy,
        FingerprintConfig::default(),
    )
}

fn lexical() -> Arc<dyn Tokenizer> {
    Arc::new(LexicalTokenizer::new().unwrap())
}

async fn block_ids(store: &dyn CorpusStore, blocks: &[&str]) -> Vec<i32> {
    let mut ids = Vec::new();
    for block in blocks {
        ids.push(store.block_id(block).await.unwrap());
    }
    fingerprint_set(ids)
}

#[tokio::test]
async fn test_text_after_cutoff_marker_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_record(1, "Kinase assay #ML-CUTOFF# scratch notes", vec![])
        .unwrap();
    store.put_record(2, "#ML-CUTOFF# nothing authoritative", vec![]).unwrap();

    let summary = calculator(store.clone(), lexical(), BusyFlag::new())
        .run_pass()
        .await
        .unwrap();
    assert_eq!(summary, PassSummary { computed: 2, failed: 0, changed: 0 });

    let fingerprint = store.record(1).await.unwrap().unwrap().fingerprint.unwrap();
    let expected = block_ids(&*store, &["assay", "kinase", "kinase assay"]).await;
    assert_eq!(fingerprint, expected);

    // Empty fingerprint is stored so the record is not rescanned
    assert_eq!(store.record(2).await.unwrap().unwrap().fingerprint, Some(vec![]));
    assert!(store.records_missing_fingerprint().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shared_blocks_map_to_same_id() {
    let store = Arc::new(MemoryStore::new());
    store.put_record(1, "receptor binding", vec![]).unwrap();
    store.put_record(2, "binding affinity", vec![]).unwrap();

    calculator(store.clone(), lexical(), BusyFlag::new())
        .run_pass()
        .await
        .unwrap();

    let first = store.record(1).await.unwrap().unwrap().fingerprint.unwrap();
    let second = store.record(2).await.unwrap().unwrap().fingerprint.unwrap();
    let binding = store.block_id("binding").await.unwrap();
    assert!(first.contains(&binding));
    assert!(second.contains(&binding));
    assert!(first.windows(2).all(|w| w[0] < w[1]), "Fingerprint must be sorted");
}

#[tokio::test]
async fn test_failed_record_is_retried_next_pass() {
    let inner = Arc::new(MemoryStore::new());
    for id in 1..=3 {
        inner.put_record(id, "enzyme kinetics", vec![]).unwrap();
    }
    let store = Arc::new(FlakyRecordStore::new(Arc::clone(&inner), [2]));
    let calculator = calculator(store.clone(), lexical(), BusyFlag::new());

    let summary = calculator.run_pass().await.unwrap();
    assert_eq!(summary, PassSummary { computed: 2, failed: 1, changed: 0 });
    assert_eq!(inner.records_missing_fingerprint().await.unwrap(), vec![2]);
    assert_eq!(inner.record(2).await.unwrap().unwrap().fingerprint, None);

    store.heal(2);
    let summary = calculator.run_pass().await.unwrap();
    assert_eq!(summary, PassSummary { computed: 1, failed: 0, changed: 0 });
    assert!(inner.records_missing_fingerprint().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_text_replaced_during_computation_is_recomputed() {
    let inner = Arc::new(MemoryStore::new());
    inner.put_record(1, "kinase inhibitor screen", vec![]).unwrap();
    let store = Arc::new(EditDuringReadStore::new(
        Arc::clone(&inner),
        1,
        "totally different replacement words",
    ));
    let calculator = calculator(store.clone(), lexical(), BusyFlag::new());

    let summary = calculator.run_pass().await.unwrap();
    assert_eq!(summary, PassSummary { computed: 0, failed: 0, changed: 1 });
    assert!(summary.found_work());
    assert_eq!(inner.record(1).await.unwrap().unwrap().fingerprint, None);
    assert_eq!(inner.records_missing_fingerprint().await.unwrap(), vec![1]);

    let summary = calculator.run_pass().await.unwrap();
    assert_eq!(summary, PassSummary { computed: 1, failed: 0, changed: 0 });
    let fingerprint = inner.record(1).await.unwrap().unwrap().fingerprint.unwrap();
    let kinase = inner.block_id("kinase").await.unwrap();
    assert!(!fingerprint.contains(&kinase), "Old text leaked into the fingerprint");
    assert!(fingerprint.contains(&inner.block_id("replacement").await.unwrap()));
}

/// Records whether the busy flag was raised while tokenizing
struct BusyProbe {
    busy: BusyFlag,
    saw_busy: AtomicBool,
}

impl Tokenizer for BusyProbe {
    fn blocks(&self, _text: &str) -> Result<Vec<String>> {
        if self.busy.is_busy() {
            self.saw_busy.store(true, Ordering::SeqCst);
        }
        Ok(vec!["probe".to_string()])
    }
}

#[tokio::test]
async fn test_busy_flag_raised_during_pass() {
    let store = Arc::new(MemoryStore::new());
    store.put_record(1, "text", vec![]).unwrap();

    let busy = BusyFlag::new();
    let probe = Arc::new(BusyProbe {
        busy: busy.clone(),
        saw_busy: AtomicBool::new(false),
    });
    calculator(store, probe.clone(), busy.clone())
        .run_pass()
        .await
        .unwrap();

    assert!(probe.saw_busy.load(Ordering::SeqCst));
    assert!(!busy.is_busy());
}

#[tokio::test]
async fn test_dependents_bumped_after_new_fingerprints() {
    let store = Arc::new(MemoryStore::new());
    store.put_record(1, "ligand docking", vec![]).unwrap();

    let shutdown = CancellationToken::new();
    let dependent = Arc::new(WorkerControl::new("model_builder", &shutdown));
    let calculator = Arc::new(
        FingerprintCalculator::new(
            Arc::new(WorkerControl::new("fingerprint_calculator", &shutdown)),
            store.clone(),
            lexical(),
            BusyFlag::new(),
            FingerprintConfig::default(),
        )
        .with_dependent(Arc::clone(&dependent)),
    );
    let handle = Arc::clone(&calculator).start();

    assert_eq!(dependent.wait(Duration::from_secs(10)).await, WakeReason::Bumped);
    assert!(store.records_missing_fingerprint().await.unwrap().is_empty());

    // New text wakes the idle calculator when bumped
    store.put_record(2, "ligand binding", vec![]).unwrap();
    calculator.worker_control().bump();
    assert_eq!(dependent.wait(Duration::from_secs(10)).await, WakeReason::Bumped);
    assert!(store.record(2).await.unwrap().unwrap().fingerprint.is_some());

    shutdown.cancel();
    handle.await.unwrap();
}
