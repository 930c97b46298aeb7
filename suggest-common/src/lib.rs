//! # Suggestion Common Library
//!
//! Shared code for the annotation suggestion pipeline including:
//! - Record, target and model types
//! - The Laplace-smoothed Naive Bayes statistics engine
//! - The corpus persistence contract with in-memory and SQLite stores
//! - The ontology contract and a JSON-loadable schema tree
//! - Configuration loading

pub mod bayes;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod ontology;
pub mod store;

pub use bayes::{BayesianModel, NaiveBayesian};
pub use error::{Error, Result};
pub use model::{Annotation, Model, ModelFamily, Record, TargetId, TargetTable};
pub use ontology::{Ontology, OntologyTree};
pub use store::{CorpusStore, MemoryStore};
