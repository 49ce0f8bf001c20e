use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use generational_arena::{Arena, Index};
use tracing::{debug, instrument};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::registry::{ListenerEntry, ListenerRegistry};

/// Handle of a node inside an [`ObserverTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Index);

/// Tree node: a named position in the hierarchy plus its listeners.
#[derive(Debug)]
pub struct ObserverNode {
    /// Name, unique among siblings
    pub name: String,
    /// Parent node, None for the root
    pub parent: Option<NodeId>,
    /// Children in creation order
    pub children: Vec<NodeId>,
    listeners: RwLock<ListenerRegistry>,
}

impl ObserverNode {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            listeners: RwLock::new(ListenerRegistry::new()),
        }
    }

    fn read_listeners(&self) -> DomainResult<RwLockReadGuard<'_, ListenerRegistry>> {
        self.listeners
            .read()
            .map_err(|e| DomainError::Lock(format!("listeners of `{}`: {}", self.name, e)))
    }

    fn write_listeners(&self) -> DomainResult<RwLockWriteGuard<'_, ListenerRegistry>> {
        self.listeners
            .write()
            .map_err(|e| DomainError::Lock(format!("listeners of `{}`: {}", self.name, e)))
    }
}

/// Arena-based observer tree.
///
/// The structure is fixed once built; listener registries stay mutable
/// through `&self` so a shared tree can still gain and lose listeners.
#[derive(Debug)]
pub struct ObserverTree {
    arena: Arena<ObserverNode>,
    root: NodeId,
}

impl ObserverTree {
    /// Create a tree consisting of a single root node.
    pub fn new(root_name: &str) -> Self {
        let mut arena = Arena::new();
        let root = NodeId(arena.insert(ObserverNode::new(root_name, None)));
        Self { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Name of the tree, which is the name of its root node.
    pub fn name(&self) -> &str {
        &self.arena[self.root.0].name
    }

    pub fn get_node(&self, id: NodeId) -> Option<&ObserverNode> {
        self.arena.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> DomainResult<&ObserverNode> {
        self.get_node(id).ok_or(DomainError::UnknownNode)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Create a new child below `parent`.
    ///
    /// Fails with [`DomainError::NodeOverwrite`] if `parent` already has a
    /// child of that name.
    #[instrument(level = "trace", skip(self))]
    pub fn create_child(&mut self, parent: NodeId, name: &str) -> DomainResult<NodeId> {
        if self.has_child(parent, name) {
            return Err(DomainError::NodeOverwrite {
                parent: self.node(parent)?.name.clone(),
                name: name.to_string(),
            });
        }
        self.node(parent)?;

        let id = NodeId(self.arena.insert(ObserverNode::new(name, Some(parent))));
        if let Some(node) = self.arena.get_mut(parent.0) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Existing child of that name, or a newly created one.
    pub fn child_or_create(&mut self, parent: NodeId, name: &str) -> DomainResult<NodeId> {
        match self.child(parent, name) {
            Some(id) => Ok(id),
            None => {
                debug!(parent = %self.node(parent)?.name, name, "Creating node");
                self.create_child(parent, name)
            }
        }
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get_node(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.get_node(c).is_some_and(|n| n.name == name))
    }

    pub fn has_child(&self, parent: NodeId, name: &str) -> bool {
        self.child(parent, name).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.parent
    }

    /// Names from the root down to `id`, both included.
    pub fn path(&self, id: NodeId) -> DomainResult<Vec<String>> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(idx) = current {
            let node = self.node(idx)?;
            path.push(node.name.clone());
            current = node.parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Look up a node by the names below the root.
    ///
    /// An empty slice yields the root.
    pub fn find(&self, segments: &[&str]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(self.root, |current, name| self.child(current, name))
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn depth(&self) -> usize {
        self.calculate_depth(self.root)
    }

    fn calculate_depth(&self, id: NodeId) -> usize {
        if let Some(node) = self.get_node(id) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Register or update a listener on a node.
    pub fn register_listener(
        &self,
        id: NodeId,
        identifier: &str,
        type_mask: u64,
        patience: f64,
    ) -> DomainResult<()> {
        let node = self.node(id)?;
        node.write_listeners()?
            .register(identifier, type_mask, patience);
        debug!(node = %node.name, identifier, type_mask, patience, "Registered listener");
        Ok(())
    }

    /// Remove a listener from a node. Unknown identifiers are ignored.
    pub fn unregister_listener(&self, id: NodeId, identifier: &str) -> DomainResult<()> {
        let node = self.node(id)?;
        if node.write_listeners()?.unregister(identifier).is_some() {
            debug!(node = %node.name, identifier, "Unregistered listener");
        }
        Ok(())
    }

    /// Sorted snapshot of a node's listeners; see [`ListenerRegistry::entries`].
    pub fn listeners(&self, id: NodeId) -> DomainResult<Vec<ListenerEntry>> {
        Ok(self.node(id)?.read_listeners()?.entries())
    }

    /// Read access to a node's registry.
    pub fn registry(&self, id: NodeId) -> DomainResult<RwLockReadGuard<'_, ListenerRegistry>> {
        self.node(id)?.read_listeners()
    }

    /// Render the whole tree, starting at the root.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(self.root, "", &mut out);
        out
    }

    /// Render the subtree below `id`, with `id` unindented.
    pub fn render_node(&self, id: NodeId) -> DomainResult<String> {
        self.node(id)?;
        let mut out = String::new();
        self.render_into(id, "", &mut out);
        Ok(out)
    }

    fn render_into(&self, id: NodeId, indent: &str, out: &mut String) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        out.push_str(&format!("{}--{}--\n", indent, node.name));
        // a poisoned registry still renders its node line
        if let Ok(listeners) = node.read_listeners() {
            for entry in listeners.iter() {
                out.push_str(&format!("{}    {}\n", indent, entry));
            }
        }
        let child_indent = format!("{}  ", indent);
        for &child in &node.children {
            self.render_into(child, &child_indent, out);
        }
    }
}

impl fmt::Display for ObserverTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Pre-order traversal yielding parents before their children.
pub struct TreeIterator<'a> {
    tree: &'a ObserverTree,
    stack: Vec<NodeId>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a ObserverTree) -> Self {
        Self {
            tree,
            stack: vec![tree.root],
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (NodeId, &'a ObserverNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current, node));
            }
        }
        None
    }
}
