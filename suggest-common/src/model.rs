//! Record, target and model types shared by the stores and the trainer

use crate::bayes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Identifier of a curated record
pub type RecordId = i64;

/// Identifier of a suggestion-eligible (property, value) annotation pair
pub type TargetId = i64;

/// Integer-encoded feature: a lexical block id or a co-occurring target id
pub type Fingerprint = i32;

/// Model family; each family has its own watermark and model partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Text fingerprint → annotation models
    Nlp,
    /// Other annotations present → annotation models
    Correlation,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Nlp, ModelFamily::Correlation];

    /// Stable key used for storage columns and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Nlp => "nlp",
            ModelFamily::Correlation => "corr",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nlp" => Ok(ModelFamily::Nlp),
            "corr" => Ok(ModelFamily::Correlation),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown model family: {}",
                other
            ))),
        }
    }
}

/// One annotation applied directly to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub prop_uri: String,
    pub value_uri: String,
    /// Nesting of schema groups the property sits under (outermost first)
    #[serde(default)]
    pub group_path: Vec<String>,
}

impl Annotation {
    pub fn new(prop_uri: impl Into<String>, value_uri: impl Into<String>) -> Self {
        Self {
            prop_uri: prop_uri.into(),
            value_uri: value_uri.into(),
            group_path: Vec::new(),
        }
    }

    pub fn with_group_path(mut self, group_path: Vec<String>) -> Self {
        self.group_path = group_path;
        self
    }
}

/// A curated record as seen by the training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub text: String,
    pub annotations: Vec<Annotation>,
    /// Text fingerprint; `None` until the fingerprint calculator has run
    pub fingerprint: Option<Vec<Fingerprint>>,
}

/// Forward and reverse maps between (property, value) pairs and target ids
#[derive(Debug, Clone, Default)]
pub struct TargetTable {
    forward: HashMap<(String, String), TargetId>,
    reverse: BTreeMap<TargetId, (String, String)>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prop_uri: &str, value_uri: &str, target: TargetId) {
        let key = (prop_uri.to_string(), value_uri.to_string());
        self.forward.insert(key.clone(), target);
        self.reverse.insert(target, key);
    }

    pub fn get(&self, prop_uri: &str, value_uri: &str) -> Option<TargetId> {
        self.forward
            .get(&(prop_uri.to_string(), value_uri.to_string()))
            .copied()
    }

    /// Reverse lookup: the (property, value) pair for a target
    pub fn pair(&self, target: TargetId) -> Option<(&str, &str)> {
        self.reverse
            .get(&target)
            .map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Targets in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &str, &str)> {
        self.reverse
            .iter()
            .map(|(t, (p, v))| (*t, p.as_str(), v.as_str()))
    }
}

/// A published per-target model
///
/// A blank model (no fingerprints) is the sentinel published when there was
/// insufficient signal to build anything discriminative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub target: TargetId,
    /// Family watermark the model was built against
    pub watermark: i64,
    /// Sorted ascending
    pub fingerprints: Vec<Fingerprint>,
    /// Log-odds contribution per fingerprint, parallel to `fingerprints`
    pub contributions: Vec<f64>,
    pub calibration_low: f64,
    pub calibration_high: f64,
    pub roc_auc: f64,
    /// Target was seen as a direct (not ancestor-inferred) annotation
    pub is_explicit: bool,
}

impl Model {
    pub fn blank(target: TargetId, watermark: i64) -> Self {
        Self {
            target,
            watermark,
            fingerprints: Vec::new(),
            contributions: Vec::new(),
            calibration_low: 0.0,
            calibration_high: 0.0,
            roc_auc: 0.0,
            is_explicit: false,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Sum of contributions of the fingerprints present in `fingerprints`
    pub fn raw_score(&self, fingerprints: &[Fingerprint]) -> f64 {
        bayes::raw_score(&self.fingerprints, &self.contributions, fingerprints)
    }

    /// Calibrated (0,1) score, or `None` for a blank model
    pub fn probability(&self, fingerprints: &[Fingerprint]) -> Option<f64> {
        if self.is_blank() {
            return None;
        }
        Some(bayes::scale_score(
            self.raw_score(fingerprints),
            self.calibration_low,
            self.calibration_high,
        ))
    }
}

/// Sort and deduplicate a collection of fingerprints into a set
pub fn fingerprint_set(values: impl IntoIterator<Item = Fingerprint>) -> Vec<Fingerprint> {
    let mut set: Vec<Fingerprint> = values.into_iter().collect();
    set.sort_unstable();
    set.dedup();
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_round_trips_through_storage_key() {
        for family in ModelFamily::ALL {
            assert_eq!(family.as_str().parse::<ModelFamily>().unwrap(), family);
        }
        assert!("bogus".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_target_table_forward_and_reverse() {
        let mut table = TargetTable::new();
        table.insert("p:a", "v:1", 7);
        table.insert("p:a", "v:2", 3);

        assert_eq!(table.get("p:a", "v:1"), Some(7));
        assert_eq!(table.get("p:b", "v:1"), None);
        assert_eq!(table.pair(3), Some(("p:a", "v:2")));
        let ids: Vec<TargetId> = table.iter().map(|(t, _, _)| t).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[test]
    fn test_fingerprint_set_sorts_and_dedups() {
        assert_eq!(fingerprint_set(vec![5, 1, 5, 3, 1]), vec![1, 3, 5]);
        assert!(fingerprint_set(Vec::new()).is_empty());
    }

    #[test]
    fn test_blank_model_has_no_probability() {
        let blank = Model::blank(4, 9);
        assert!(blank.is_blank());
        assert_eq!(blank.watermark, 9);
        assert_eq!(blank.probability(&[1, 2]), None);
    }

    #[test]
    fn test_raw_score_ignores_absent_fingerprints() {
        let model = Model {
            target: 1,
            watermark: 1,
            fingerprints: vec![2, 4, 8],
            contributions: vec![0.5, -1.0, 2.0],
            calibration_low: -1.0,
            calibration_high: 1.0,
            roc_auc: 0.9,
            is_explicit: true,
        };
        assert_eq!(model.raw_score(&[2, 8, 9]), 2.5);
        assert_eq!(model.raw_score(&[]), 0.0);
    }

    #[test]
    fn test_raw_score_tolerates_short_contributions() {
        let model = Model {
            fingerprints: vec![2, 4, 8],
            contributions: vec![0.5],
            ..Model::blank(1, 1)
        };
        assert_eq!(model.raw_score(&[2, 8]), 0.5);
    }
}
