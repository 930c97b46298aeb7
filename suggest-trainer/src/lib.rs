//! # Suggestion Model Trainer
//!
//! Background training engine for annotation suggestions:
//! - **FingerprintCalculator**: turns record text into sorted integer fingerprints
//! - **ModelBuilder**: per-target Naive Bayes models from text fingerprints
//! - **CorrelationBuilder**: per-target models from co-occurring annotations
//!
//! Models are stamped with their family watermark; a sweep rebuilds only the
//! targets whose stamp is stale and restarts cleanly when the watermark moves.

pub mod config;
pub mod corpus;
pub mod correlation_builder;
pub mod fingerprint;
pub mod model_builder;
pub mod pruning;
pub mod service;
pub mod sweep;
pub mod tokenizer;
pub mod worker;

pub use config::TrainerConfig;
pub use correlation_builder::CorrelationBuilder;
pub use fingerprint::FingerprintCalculator;
pub use model_builder::ModelBuilder;
pub use service::TrainingService;
pub use tokenizer::{LexicalTokenizer, Tokenizer};
pub use worker::{BusyFlag, WakeReason, WorkerControl, WorkerState};
