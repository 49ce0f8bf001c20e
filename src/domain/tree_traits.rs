//! Box-drawing view of observer trees via `termtree`.

use termtree::Tree;

use crate::domain::arena::{NodeId, ObserverTree};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeNodeConvert for ObserverTree {
    fn to_tree_string(&self) -> Tree<String> {
        subtree(self, self.root())
    }
}

/// Node label followed by its listeners as leaves, then child nodes.
pub fn subtree(tree: &ObserverTree, id: NodeId) -> Tree<String> {
    let Some(node) = tree.get_node(id) else {
        return Tree::new("Empty tree".to_string());
    };

    let mut out = Tree::new(node.name.clone());
    if let Ok(listeners) = tree.registry(id) {
        for entry in listeners.iter() {
            out.push(Tree::new(format!("[{}]", entry)));
        }
    }
    for &child in &node.children {
        out.push(subtree(tree, child));
    }
    out
}
