//! Listener capability, definitions and resolution.
//!
//! Listeners are never looked up by reflection. Every listener type is
//! described once in a [`ListenerCatalog`], keyed by its qualified identifier,
//! together with a factory and its default patience and type mask. The tree
//! builder uses the catalog to decide whether a leaf definition is a listener;
//! the [`ListenerResolver`] uses it to construct instances on demand.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::error::{DomainError, DomainResult};

/// A listener attached to observer tree nodes.
pub trait EventListener: Send + Sync {
    /// Handle one event payload. `None` means no result.
    fn process(&self, payload: &Value) -> Option<Value>;

    /// Whether [`process`](Self::process) should be called at all.
    ///
    /// Objects handed out by an external registry under a listener key do
    /// not always handle events; dispatch skips those silently.
    fn can_process(&self) -> bool {
        true
    }
}

/// Shared listener instance.
pub type ListenerRef = Arc<dyn EventListener>;

/// Factory creating a listener instance.
pub type ListenerFactory = Arc<dyn Fn() -> ListenerRef + Send + Sync>;

/// A listener instance together with the identifier it was resolved from.
#[derive(Clone)]
pub struct ResolvedListener {
    pub identifier: String,
    pub instance: ListenerRef,
}

impl fmt::Debug for ResolvedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedListener")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Materializes listener instances from identifiers.
pub trait ResolveListener: Send + Sync {
    /// Fails with [`DomainError::NoValidListener`] if the identifier cannot
    /// be materialized.
    fn resolve(&self, identifier: &str) -> DomainResult<ListenerRef>;
}

/// External object registry consulted before direct construction.
pub trait ObjectRegistry: Send + Sync {
    fn has(&self, identifier: &str) -> bool;

    fn get(&self, identifier: &str) -> Option<ListenerRef>;
}

/// Static description of a listener type.
#[derive(Clone)]
pub struct ListenerDescriptor {
    /// Default patience when the definition does not set one
    pub patience: f64,
    /// Default type mask when the definition does not set one
    pub type_mask: u64,
    /// Registers the listener under this key instead of its identifier
    pub container_id: Option<String>,
    factory: Option<ListenerFactory>,
}

impl ListenerDescriptor {
    /// Descriptor for a directly constructible listener.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ListenerRef + Send + Sync + 'static,
    {
        Self {
            patience: 0.0,
            type_mask: 0,
            container_id: None,
            factory: Some(Arc::new(factory)),
        }
    }

    /// Descriptor for a listener only available from an [`ObjectRegistry`].
    pub fn external(container_id: &str) -> Self {
        Self {
            patience: 0.0,
            type_mask: 0,
            container_id: Some(container_id.to_string()),
            factory: None,
        }
    }

    pub fn with_patience(mut self, patience: f64) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_type(mut self, type_mask: u64) -> Self {
        self.type_mask = type_mask;
        self
    }

    pub fn with_container_id(mut self, container_id: &str) -> Self {
        self.container_id = Some(container_id.to_string());
        self
    }
}

impl fmt::Debug for ListenerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerDescriptor")
            .field("patience", &self.patience)
            .field("type_mask", &self.type_mask)
            .field("container_id", &self.container_id)
            .field("constructible", &self.factory.is_some())
            .finish()
    }
}

/// All known listener types, keyed by qualified identifier.
#[derive(Debug, Clone, Default)]
pub struct ListenerCatalog {
    descriptors: HashMap<String, ListenerDescriptor>,
}

impl ListenerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener type. A second call for the same identifier replaces it.
    pub fn define(&mut self, identifier: &str, descriptor: ListenerDescriptor) -> &mut Self {
        self.descriptors.insert(identifier.to_string(), descriptor);
        self
    }

    /// Descriptor of a listener type; `None` means "not a listener".
    pub fn describe(&self, identifier: &str) -> Option<&ListenerDescriptor> {
        self.descriptors.get(identifier)
    }

    pub fn is_listener(&self, identifier: &str) -> bool {
        self.descriptors.contains_key(identifier)
    }

    /// Factory of the type registered under a dispatch key.
    ///
    /// The key is either the container id or the identifier itself.
    fn factory_for(&self, key: &str) -> Option<&ListenerFactory> {
        self.descriptors
            .get(key)
            .and_then(|d| d.factory.as_ref())
            .or_else(|| {
                self.descriptors
                    .values()
                    .filter(|d| d.container_id.as_deref() == Some(key))
                    .find_map(|d| d.factory.as_ref())
            })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Resolves identifiers through an optional object registry, then by
/// constructing the listener once and caching it.
pub struct ListenerResolver {
    catalog: Arc<ListenerCatalog>,
    registry: Option<Arc<dyn ObjectRegistry>>,
    initialised: Mutex<HashMap<String, ListenerRef>>,
}

impl ListenerResolver {
    pub fn new(catalog: Arc<ListenerCatalog>) -> Self {
        Self {
            catalog,
            registry: None,
            initialised: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn ObjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn catalog(&self) -> &ListenerCatalog {
        &self.catalog
    }

    /// Drop a cached instance so the next resolve constructs a fresh one.
    pub fn evict(&self, identifier: &str) -> DomainResult<bool> {
        let mut cache = self.lock_cache()?;
        Ok(cache.remove(identifier).is_some())
    }

    fn lock_cache(&self) -> DomainResult<std::sync::MutexGuard<'_, HashMap<String, ListenerRef>>> {
        self.initialised
            .lock()
            .map_err(|e| DomainError::Lock(format!("listener cache: {}", e)))
    }
}

impl ResolveListener for ListenerResolver {
    #[instrument(level = "trace", skip(self))]
    fn resolve(&self, identifier: &str) -> DomainResult<ListenerRef> {
        if let Some(registry) = &self.registry {
            if registry.has(identifier) {
                if let Some(listener) = registry.get(identifier) {
                    return Ok(listener);
                }
            }
        }

        if let Some(listener) = self.lock_cache()?.get(identifier) {
            return Ok(Arc::clone(listener));
        }

        let factory = self
            .catalog
            .factory_for(identifier)
            .ok_or_else(|| DomainError::NoValidListener(identifier.to_string()))?;
        debug!(identifier, "Constructing listener");
        // constructed unlocked; a concurrent construction of the same
        // identifier loses to whichever instance was cached first
        let listener = factory();
        let mut cache = self.lock_cache()?;
        Ok(Arc::clone(cache.entry(identifier.to_string()).or_insert(listener)))
    }
}
