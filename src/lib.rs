//! obtree: hierarchical observer trees
//!
//! Listener definitions are laid out as a hierarchy of units below one or
//! more definition roots. [`application::TreeCatalog`] turns the hierarchy
//! below a top-level unit into an [`domain::ObserverTree`] on first request
//! and keeps it for the lifetime of the process. Every node of a tree carries
//! a [`domain::ListenerRegistry`]; [`domain::Dispatcher`] calls the
//! listeners of one node in patience order, gated by a type filter and three
//! optional filter callbacks.
//!
//! ```no_run
//! use obtree::application::TreeCatalog;
//! use obtree::config::Settings;
//! use obtree::domain::ListenerCatalog;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let catalog = TreeCatalog::from_settings(&settings, ListenerCatalog::new());
//! let tree = catalog.get("checkout")?;
//! println!("{}", tree.render());
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod util;

pub use application::{ApplicationError, ApplicationResult, TreeCatalog};
pub use config::Settings;
pub use domain::{
    DefinitionRoots, Dispatcher, DomainError, EventListener, FilterDecision, ListenerCatalog,
    ListenerDescriptor, ObserverTree,
};
pub use infrastructure::FsDefinitionRoot;
