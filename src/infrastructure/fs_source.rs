//! Filesystem definition roots.
//!
//! Layout below a root's base path:
//!
//! ```text
//! <base>/checkout/                 top-level unit = tree name
//! <base>/checkout/payment/         child unit
//! <base>/checkout/payment/L1.toml  leaf definition `<ns>::checkout::payment::L1`
//! ```
//!
//! A leaf file may be empty or carry `patience`, `type` and `container_id`.
//! Entries whose names are not identifiers (hidden files, `README.md`,
//! `my-dir`) are ignored.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;
use walkdir::{DirEntry, WalkDir};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::source::{qualify, DefinitionSource, LeafDefinition, LeafMetadata};
use crate::infrastructure::error_ext::IoResultExt;
use crate::util::path::PathExt;

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// A directory tree acting as one definition root.
#[derive(Debug, Clone)]
pub struct FsDefinitionRoot {
    base_path: PathBuf,
    namespace: String,
}

impl FsDefinitionRoot {
    pub fn new(base_path: impl Into<PathBuf>, namespace: &str) -> Self {
        Self {
            base_path: base_path.into(),
            namespace: namespace.to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn dir_for(&self, path: &[String]) -> PathBuf {
        path.iter().fold(self.base_path.clone(), |dir, s| dir.join(s))
    }

    /// Direct entries of a unit directory, sorted by file name.
    fn entries(&self, path: &[String]) -> DomainResult<Vec<DirEntry>> {
        let dir = self.dir_for(path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                entry.map_err(|e| DomainError::InvalidDefinition {
                    path: dir.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    fn read_metadata(&self, file: &Path) -> DomainResult<LeafMetadata> {
        let content = std::fs::read_to_string(file).with_path_context(file)?;
        toml::from_str(&content).map_err(|e| DomainError::InvalidDefinition {
            path: file.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

impl DefinitionSource for FsDefinitionRoot {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn location(&self) -> String {
        self.base_path.display().to_string()
    }

    fn has_unit(&self, path: &[String]) -> bool {
        !path.is_empty() && path.iter().all(|s| is_identifier(s)) && self.dir_for(path).is_dir()
    }

    fn child_units(&self, path: &[String]) -> DomainResult<Vec<String>> {
        Ok(self
            .entries(path)?
            .into_iter()
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| is_identifier(name))
            .collect())
    }

    fn leaves(&self, path: &[String]) -> DomainResult<Vec<LeafDefinition>> {
        let mut leaves = Vec::new();
        for entry in self.entries(path)? {
            let file = entry.path();
            if !entry.file_type().is_file() || !file.is_definition_file() {
                continue;
            }
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_identifier(stem) {
                trace!(file = %file.display(), "Skipping file with invalid name");
                continue;
            }
            leaves.push(LeafDefinition {
                identifier: qualify(&self.namespace, path, stem),
                metadata: self.read_metadata(file)?,
            });
        }
        Ok(leaves)
    }
}
