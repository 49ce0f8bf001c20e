//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

/// Domain errors represent violations of the tree and dispatch rules.
/// These are independent of configuration concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("name `{0}` does not point to an observer tree")]
    NameNotFound(String),

    #[error("no valid listener for identifier: {0}")]
    NoValidListener(String),

    #[error("node `{name}` already exists below `{parent}`")]
    NodeOverwrite { parent: String, name: String },

    #[error("node does not belong to this tree")]
    UnknownNode,

    #[error("invalid definition {path}: {message}")]
    InvalidDefinition { path: PathBuf, message: String },

    #[error("failed to read definition: {path}")]
    DefinitionRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock poisoned: {0}")]
    Lock(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
