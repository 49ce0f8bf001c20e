//! Error conversion helpers for I/O on definition files
//!
//! Provides an extension trait for cleaner error handling with path context.

use std::io;
use std::path::Path;

use crate::domain::{DomainError, DomainResult};

/// Extension trait for converting `io::Result` to `DomainResult` with context.
pub trait IoResultExt<T> {
    /// Attach the path that failed to an I/O error.
    ///
    /// # Example
    /// ```ignore
    /// std::fs::read_to_string(&file).with_path_context(&file)?;
    /// ```
    fn with_path_context(self, path: &Path) -> DomainResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path_context(self, path: &Path) -> DomainResult<T> {
        self.map_err(|source| DomainError::DefinitionRead {
            path: path.to_path_buf(),
            source,
        })
    }
}
