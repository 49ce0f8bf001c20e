//! Per-node listener storage.

use std::fmt;

/// One listener registered on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerEntry {
    /// Key used to resolve the listener instance
    pub identifier: String,
    /// Lower patience is called first
    pub patience: f64,
    /// Bitmask for coarse type filtering, 0 matches any filter
    pub type_mask: u64,
}

impl ListenerEntry {
    /// Whether this entry passes the dispatch type gate.
    ///
    /// `None` and `Some(0)` match every entry.
    pub fn matches_type(&self, type_filter: Option<u64>) -> bool {
        match type_filter {
            None | Some(0) => true,
            Some(filter) => self.type_mask & filter != 0,
        }
    }
}

impl fmt::Display for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {{ patience: {}, type: {} }}",
            self.identifier, self.patience, self.type_mask
        )
    }
}

/// Listener identifiers with their patience and type mask.
///
/// Entries are kept in registration order. Re-registering an identifier
/// overwrites its values in place, so its position among equal patience
/// entries does not change.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a listener.
    pub fn register(&mut self, identifier: &str, type_mask: u64, patience: f64) {
        match self.entries.iter_mut().find(|e| e.identifier == identifier) {
            Some(entry) => {
                entry.patience = patience;
                entry.type_mask = type_mask;
            }
            None => self.entries.push(ListenerEntry {
                identifier: identifier.to_string(),
                patience,
                type_mask,
            }),
        }
    }

    /// Remove a listener. Absent identifiers are ignored.
    pub fn unregister(&mut self, identifier: &str) -> Option<ListenerEntry> {
        let pos = self.entries.iter().position(|e| e.identifier == identifier)?;
        Some(self.entries.remove(pos))
    }

    /// Snapshot of all entries sorted ascending by patience.
    ///
    /// The sort is stable: equal patience keeps registration order.
    pub fn entries(&self) -> Vec<ListenerEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.patience.total_cmp(&b.patience));
        sorted
    }

    pub fn get(&self, identifier: &str) -> Option<&ListenerEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ListenerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
