//! Process-wide cache of observer trees.
//!
//! Each tree name is built at most once. Concurrent first requests for the
//! same name wait on a per-name build lock, so every caller receives the same
//! `Arc<ObserverTree>`. A failed build leaves no entry behind.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::{RootSettings, Settings};
use crate::domain::{
    DefinitionRoots, Dispatcher, DomainError, ListenerCatalog, ListenerResolver, ObjectRegistry,
    ObserverTree, TreeBuilder,
};
use crate::infrastructure::FsDefinitionRoot;

/// Builds observer trees on first use and keeps them for the process lifetime.
pub struct TreeCatalog {
    roots: DefinitionRoots,
    listeners: Arc<ListenerCatalog>,
    ignores: HashSet<String>,
    resolver: ListenerResolver,
    trees: RwLock<HashMap<String, Arc<ObserverTree>>>,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TreeCatalog {
    pub fn new(roots: DefinitionRoots, listeners: ListenerCatalog) -> Self {
        let listeners = Arc::new(listeners);
        Self {
            roots,
            resolver: ListenerResolver::new(Arc::clone(&listeners)),
            listeners,
            ignores: HashSet::new(),
            trees: RwLock::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Catalog over the filesystem roots named in `settings`.
    ///
    /// Roots apply in the order `extends`, `primary`, `overrides`.
    pub fn from_settings(settings: &Settings, listeners: ListenerCatalog) -> Self {
        let fs_root = |r: &RootSettings| Arc::new(FsDefinitionRoot::new(&r.path, &r.namespace));

        let mut roots = DefinitionRoots::new(fs_root(&settings.primary));
        for root in &settings.extends {
            roots = roots.extend(fs_root(root));
        }
        for root in &settings.overrides {
            roots = roots.override_with(fs_root(root));
        }

        Self::new(roots, listeners).with_ignores(settings.ignores.iter().cloned())
    }

    pub fn with_ignores<I, S>(mut self, ignores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignores.extend(ignores.into_iter().map(Into::into));
        self
    }

    /// Consult `registry` before constructing listeners directly.
    pub fn with_object_registry(mut self, registry: Arc<dyn ObjectRegistry>) -> Self {
        self.resolver = ListenerResolver::new(Arc::clone(&self.listeners)).with_registry(registry);
        self
    }

    /// Root of the tree named `tree_name`, building it on first request.
    #[instrument(level = "debug", skip(self))]
    pub fn get(&self, tree_name: &str) -> ApplicationResult<Arc<ObserverTree>> {
        if let Some(tree) = self.cached(tree_name)? {
            return Ok(tree);
        }

        let build_lock = self.build_lock(tree_name)?;
        let _guard = build_lock
            .lock()
            .map_err(|e| lock_error("build lock", e))?;

        // another caller may have finished the build while we waited
        let result = match self.cached(tree_name)? {
            Some(tree) => Ok(tree),
            None => self.build(tree_name),
        };
        self.release_build_lock(tree_name, &build_lock)?;
        result
    }

    fn build(&self, tree_name: &str) -> ApplicationResult<Arc<ObserverTree>> {
        let tree = TreeBuilder::new(&self.roots, &self.listeners)
            .with_ignores(self.ignores.iter().cloned())
            .build(tree_name)?;

        let mut trees = self.trees.write().map_err(|e| lock_error("tree cache", e))?;
        let tree = trees
            .entry(tree_name.to_string())
            .or_insert_with(|| Arc::new(tree));
        debug!(tree = tree_name, "Cached observer tree");
        Ok(Arc::clone(tree))
    }

    /// Dispatcher resolving listeners through this catalog's resolver.
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.resolver)
    }

    pub fn resolver(&self) -> &ListenerResolver {
        &self.resolver
    }

    pub fn is_built(&self, tree_name: &str) -> ApplicationResult<bool> {
        Ok(self.cached(tree_name)?.is_some())
    }

    /// Names of all trees built so far, sorted.
    pub fn built_trees(&self) -> ApplicationResult<Vec<String>> {
        let trees = self.trees.read().map_err(|e| lock_error("tree cache", e))?;
        let mut names: Vec<_> = trees.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn cached(&self, tree_name: &str) -> ApplicationResult<Option<Arc<ObserverTree>>> {
        let trees = self.trees.read().map_err(|e| lock_error("tree cache", e))?;
        Ok(trees.get(tree_name).cloned())
    }

    fn build_lock(&self, tree_name: &str) -> ApplicationResult<Arc<Mutex<()>>> {
        let mut locks = self
            .build_locks
            .lock()
            .map_err(|e| lock_error("build locks", e))?;
        Ok(Arc::clone(locks.entry(tree_name.to_string()).or_default()))
    }

    /// Drop the build lock of `tree_name` unless a newer one replaced it.
    fn release_build_lock(&self, tree_name: &str, lock: &Arc<Mutex<()>>) -> ApplicationResult<()> {
        let mut locks = self
            .build_locks
            .lock()
            .map_err(|e| lock_error("build locks", e))?;
        if locks.get(tree_name).is_some_and(|l| Arc::ptr_eq(l, lock)) {
            locks.remove(tree_name);
        }
        Ok(())
    }
}

fn lock_error(what: &str, e: impl std::fmt::Display) -> ApplicationError {
    DomainError::Lock(format!("{}: {}", what, e)).into()
}
