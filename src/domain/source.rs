//! Hierarchical definition sources.
//!
//! A definition source exposes units (nested, named positions) and the leaf
//! definitions found at each unit. Units become tree nodes; leaves are
//! listener candidates.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainResult;

/// Separator between namespace and path segments of an identifier.
pub const IDENTIFIER_SEPARATOR: &str = "::";

/// Optional settings carried by a leaf definition.
///
/// Unset values fall back to the listener descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeafMetadata {
    pub patience: Option<f64>,
    #[serde(rename = "type")]
    pub type_mask: Option<u64>,
    pub container_id: Option<String>,
}

/// A listener candidate found below a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafDefinition {
    /// Qualified identifier, e.g. `app::checkout::payment::Validate`
    pub identifier: String,
    pub metadata: LeafMetadata,
}

/// One layered root of unit definitions.
///
/// Paths are unit names from the top level down; `["checkout", "payment"]`
/// names unit `payment` inside top-level unit `checkout`.
pub trait DefinitionSource: Send + Sync {
    /// Namespace prefix of identifiers defined by this source.
    fn namespace(&self) -> &str;

    /// Human readable location, used in log output.
    fn location(&self) -> String;

    fn has_unit(&self, path: &[String]) -> bool;

    /// Names of the units directly below `path`.
    fn child_units(&self, path: &[String]) -> DomainResult<Vec<String>>;

    /// Leaf definitions directly below `path`.
    fn leaves(&self, path: &[String]) -> DomainResult<Vec<LeafDefinition>>;
}

/// Build the qualified identifier of a leaf.
pub fn qualify(namespace: &str, path: &[String], leaf: &str) -> String {
    std::iter::once(namespace)
        .chain(path.iter().map(String::as_str))
        .chain(std::iter::once(leaf))
        .filter(|s| !s.is_empty())
        .join(IDENTIFIER_SEPARATOR)
}

#[derive(Debug, Clone, Default)]
struct MemoryUnit {
    children: Vec<String>,
    leaves: Vec<(String, LeafMetadata)>,
}

/// Definition source held in memory.
///
/// Useful where listener layouts are assembled in code rather than read from
/// disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryDefinitionSource {
    namespace: String,
    units: BTreeMap<Vec<String>, MemoryUnit>,
}

impl MemoryDefinitionSource {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            units: BTreeMap::new(),
        }
    }

    /// Declare a unit and all of its ancestors.
    pub fn unit(mut self, path: &[&str]) -> Self {
        self.ensure_unit(path);
        self
    }

    /// Add a leaf without metadata below `path`, creating the unit if needed.
    pub fn leaf(self, path: &[&str], name: &str) -> Self {
        self.leaf_with(path, name, LeafMetadata::default())
    }

    pub fn leaf_with(mut self, path: &[&str], name: &str, metadata: LeafMetadata) -> Self {
        let unit = self.ensure_unit(path);
        match unit.leaves.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = metadata,
            None => unit.leaves.push((name.to_string(), metadata)),
        }
        self
    }

    fn ensure_unit(&mut self, path: &[&str]) -> &mut MemoryUnit {
        let owned: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        for depth in 1..=owned.len() {
            let key = owned[..depth].to_vec();
            if !self.units.contains_key(&key) {
                self.units.insert(key.clone(), MemoryUnit::default());
                if depth > 1 {
                    if let Some(parent) = self.units.get_mut(&owned[..depth - 1]) {
                        parent.children.push(owned[depth - 1].clone());
                    }
                }
            }
        }
        self.units.entry(owned).or_default()
    }
}

impl DefinitionSource for MemoryDefinitionSource {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn location(&self) -> String {
        format!("memory:{}", self.namespace)
    }

    fn has_unit(&self, path: &[String]) -> bool {
        !path.is_empty() && self.units.contains_key(path)
    }

    fn child_units(&self, path: &[String]) -> DomainResult<Vec<String>> {
        Ok(self
            .units
            .get(path)
            .map(|u| u.children.clone())
            .unwrap_or_default())
    }

    fn leaves(&self, path: &[String]) -> DomainResult<Vec<LeafDefinition>> {
        Ok(self
            .units
            .get(path)
            .map(|u| {
                u.leaves
                    .iter()
                    .map(|(name, metadata)| LeafDefinition {
                        identifier: qualify(&self.namespace, path, name),
                        metadata: metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
