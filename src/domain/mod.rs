//! Domain layer: observer trees, listener registries and dispatch
//!
//! This layer is independent of external concerns (no config loading, no filesystem).

pub mod arena;
pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod registry;
pub mod source;
pub mod tree_traits;

pub use arena::{NodeId, ObserverNode, ObserverTree, TreeIterator};
pub use builder::{DefinitionRoots, TreeBuilder};
pub use dispatcher::{DispatchOutcome, Dispatcher, FilterDecision};
pub use error::{DomainError, DomainResult};
pub use listener::{
    EventListener, ListenerCatalog, ListenerDescriptor, ListenerFactory, ListenerRef,
    ListenerResolver, ObjectRegistry, ResolveListener, ResolvedListener,
};
pub use registry::{ListenerEntry, ListenerRegistry};
pub use source::{DefinitionSource, LeafDefinition, LeafMetadata, MemoryDefinitionSource};
pub use tree_traits::TreeNodeConvert;
