//! Application layer: tree catalog and use cases
//!
//! This layer wires domain logic to configured definition roots.

pub mod catalog;
pub mod error;

pub use catalog::TreeCatalog;
pub use error::{ApplicationError, ApplicationResult};
