//! Tree builder walking layered definition roots into one observer tree.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace};

use crate::domain::arena::{NodeId, ObserverTree};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::listener::ListenerCatalog;
use crate::domain::source::{DefinitionSource, LeafDefinition};

/// Ordered set of definition roots with one designated primary root.
///
/// Roots are applied in order; a later root overrides registrations of an
/// earlier one. Only names present in the primary root are valid tree names.
#[derive(Clone)]
pub struct DefinitionRoots {
    roots: Vec<Arc<dyn DefinitionSource>>,
    primary: usize,
}

impl DefinitionRoots {
    pub fn new(primary: Arc<dyn DefinitionSource>) -> Self {
        Self {
            roots: vec![primary],
            primary: 0,
        }
    }

    /// Add a root applied before the primary one, after earlier extensions.
    pub fn extend(mut self, root: Arc<dyn DefinitionSource>) -> Self {
        self.roots.insert(self.primary, root);
        self.primary += 1;
        self
    }

    /// Add a root applied after all roots added so far.
    pub fn override_with(mut self, root: Arc<dyn DefinitionSource>) -> Self {
        self.roots.push(root);
        self
    }

    pub fn primary(&self) -> &Arc<dyn DefinitionSource> {
        &self.roots[self.primary]
    }

    /// Roots in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DefinitionSource>> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Constructs observer trees from definition roots.
pub struct TreeBuilder<'a> {
    roots: &'a DefinitionRoots,
    catalog: &'a ListenerCatalog,
    ignores: HashSet<String>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(roots: &'a DefinitionRoots, catalog: &'a ListenerCatalog) -> Self {
        Self {
            roots,
            catalog,
            ignores: HashSet::new(),
        }
    }

    /// Qualified identifiers never registered, even if defined.
    pub fn with_ignores<I, S>(mut self, ignores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignores.extend(ignores.into_iter().map(Into::into));
        self
    }

    /// Build the tree named `tree_name`.
    #[instrument(level = "debug", skip(self))]
    pub fn build(&self, tree_name: &str) -> DomainResult<ObserverTree> {
        let top = vec![tree_name.to_string()];
        if !self.roots.primary().has_unit(&top) {
            return Err(DomainError::NameNotFound(tree_name.to_string()));
        }

        let mut tree = ObserverTree::new(tree_name);
        let root = tree.root();
        for source in self.roots.iter() {
            if !source.has_unit(&top) {
                trace!(location = %source.location(), "Root does not define tree");
                continue;
            }
            debug!(location = %source.location(), "Applying definition root");
            let mut path = top.clone();
            self.process_unit(source.as_ref(), &mut path, &mut tree, root)?;
        }

        info!(tree = tree_name, nodes = tree.len(), "Built observer tree");
        Ok(tree)
    }

    fn process_unit(
        &self,
        source: &dyn DefinitionSource,
        path: &mut Vec<String>,
        tree: &mut ObserverTree,
        node: NodeId,
    ) -> DomainResult<()> {
        for leaf in source.leaves(path)? {
            self.process_leaf(&leaf, tree, node)?;
        }

        for child_name in source.child_units(path)? {
            let child = tree.child_or_create(node, &child_name)?;
            path.push(child_name);
            self.process_unit(source, path, tree, child)?;
            path.pop();
        }
        Ok(())
    }

    fn process_leaf(
        &self,
        leaf: &LeafDefinition,
        tree: &ObserverTree,
        node: NodeId,
    ) -> DomainResult<()> {
        if self.ignores.contains(&leaf.identifier) {
            debug!(identifier = %leaf.identifier, "Ignoring listener");
            return Ok(());
        }

        let Some(descriptor) = self.catalog.describe(&leaf.identifier) else {
            trace!(identifier = %leaf.identifier, "Not a listener, skipping");
            return Ok(());
        };

        let key = leaf
            .metadata
            .container_id
            .as_deref()
            .or(descriptor.container_id.as_deref())
            .unwrap_or(&leaf.identifier);
        let type_mask = leaf.metadata.type_mask.unwrap_or(descriptor.type_mask);
        let patience = leaf.metadata.patience.unwrap_or(descriptor.patience);

        tree.register_listener(node, key, type_mask, patience)
    }
}
