//! Ontology contract: suggestibility flags and ancestor closure
//!
//! The schema tree itself is owned elsewhere; the trainer only needs to know
//! which properties take part in suggestions and which values a given value
//! implies through its ancestors.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Read-only view of the schema / ontology tree
pub trait Ontology: Send + Sync {
    /// Whether annotations on this property are eligible for suggestion models
    fn is_suggestible(&self, prop_uri: &str) -> bool;

    /// The value plus all of its ancestors, or `None` when no tree exists for
    /// the property (the record cannot be used for training)
    fn expand_to_ancestors(
        &self,
        prop_uri: &str,
        group_path: &[String],
        value_uri: &str,
    ) -> Option<Vec<String>>;
}

/// On-disk form of the schema tree
#[derive(Debug, Clone, Deserialize)]
pub struct OntologyFile {
    pub properties: Vec<PropertyTree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyTree {
    pub uri: String,
    #[serde(default)]
    pub suggestible: bool,
    #[serde(default)]
    pub group_path: Vec<String>,
    #[serde(default)]
    pub values: Vec<ValueNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueNode {
    pub uri: String,
    #[serde(default)]
    pub parent: Option<String>,
}

/// In-memory schema tree: child → parent links per (property, group path)
#[derive(Debug, Clone, Default)]
pub struct OntologyTree {
    suggestible: BTreeSet<String>,
    trees: HashMap<String, HashMap<String, Option<String>>>,
}

impl OntologyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a tree from its JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: OntologyFile = serde_json::from_str(content)?;
        let mut tree = Self::new();
        for property in file.properties {
            tree.add_property(&property.uri, &property.group_path, property.suggestible);
            for node in property.values {
                tree.add_value(
                    &property.uri,
                    &property.group_path,
                    &node.uri,
                    node.parent.as_deref(),
                )?;
            }
        }
        Ok(tree)
    }

    /// Declare a property tree (empty until values are added)
    pub fn add_property(&mut self, prop_uri: &str, group_path: &[String], suggestible: bool) {
        if suggestible {
            self.suggestible.insert(prop_uri.to_string());
        }
        self.trees.entry(tree_key(prop_uri, group_path)).or_default();
    }

    pub fn add_value(
        &mut self,
        prop_uri: &str,
        group_path: &[String],
        value_uri: &str,
        parent_uri: Option<&str>,
    ) -> Result<()> {
        let tree = self
            .trees
            .get_mut(&tree_key(prop_uri, group_path))
            .ok_or_else(|| {
                Error::InvalidInput(format!("no tree declared for property {}", prop_uri))
            })?;
        tree.insert(value_uri.to_string(), parent_uri.map(str::to_string));
        Ok(())
    }

    fn tree_for(
        &self,
        prop_uri: &str,
        group_path: &[String],
    ) -> Option<&HashMap<String, Option<String>>> {
        self.trees
            .get(&tree_key(prop_uri, group_path))
            .or_else(|| self.trees.get(&tree_key(prop_uri, &[])))
    }
}

fn tree_key(prop_uri: &str, group_path: &[String]) -> String {
    if group_path.is_empty() {
        prop_uri.to_string()
    } else {
        format!("{}::{}", prop_uri, group_path.join("::"))
    }
}

impl Ontology for OntologyTree {
    fn is_suggestible(&self, prop_uri: &str) -> bool {
        self.suggestible.contains(prop_uri)
    }

    fn expand_to_ancestors(
        &self,
        prop_uri: &str,
        group_path: &[String],
        value_uri: &str,
    ) -> Option<Vec<String>> {
        let tree = self.tree_for(prop_uri, group_path)?;
        let mut closure = vec![value_uri.to_string()];
        let mut current = value_uri;
        // A malformed tree may contain a cycle; stop at the first repeat
        while let Some(Some(parent)) = tree.get(current) {
            if closure.iter().any(|seen| seen == parent) {
                break;
            }
            closure.push(parent.clone());
            current = parent.as_str();
        }
        Some(closure)
    }
}
