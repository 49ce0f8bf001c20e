//! Filterable, priority ordered listener dispatch.
//!
//! For every entry of a node's registry, in patience order:
//!
//! 1. entries whose type mask misses the type filter are skipped silently
//! 2. the pre-init filter sees the entry metadata, before resolution
//! 3. the listener is resolved
//! 4. the pre-call filter sees the resolved listener
//! 5. the listener processes the payload
//! 6. the post-call filter sees the result
//!
//! Any filter may return [`FilterDecision::Break`] to end the dispatch.
//! Pre-init and pre-call filters may return [`FilterDecision::SkipEntry`] to
//! move on to the next entry.

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::domain::arena::{NodeId, ObserverTree};
use crate::domain::error::DomainResult;
use crate::domain::listener::{ResolveListener, ResolvedListener};
use crate::domain::registry::ListenerEntry;

/// What a filter wants the dispatch loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterDecision {
    /// Stop the whole dispatch
    Break,
    /// Skip the current entry only
    SkipEntry,
    /// Carry on with the current entry
    #[default]
    Proceed,
}

pub type PreInitFilter<'a> = Box<dyn FnMut(&ListenerEntry) -> FilterDecision + 'a>;
pub type PreCallFilter<'a> = Box<dyn FnMut(&ResolvedListener) -> FilterDecision + 'a>;
pub type PostCallFilter<'a> =
    Box<dyn FnMut(Option<&Value>, &ResolvedListener) -> FilterDecision + 'a>;

/// Summary of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Number of listeners whose `process` ran
    pub invoked: usize,
    /// Whether a filter ended the dispatch early
    pub stopped: bool,
}

/// One configured dispatch: resolver, type filter and filter hooks.
pub struct Dispatcher<'a> {
    resolver: &'a dyn ResolveListener,
    type_filter: Option<u64>,
    pre_init: Option<PreInitFilter<'a>>,
    pre_call: Option<PreCallFilter<'a>>,
    post_call: Option<PostCallFilter<'a>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(resolver: &'a dyn ResolveListener) -> Self {
        Self {
            resolver,
            type_filter: None,
            pre_init: None,
            pre_call: None,
            post_call: None,
        }
    }

    /// Only call listeners whose type mask shares a bit with `filter`.
    /// A filter of 0 matches everything.
    pub fn type_filter(mut self, filter: u64) -> Self {
        self.type_filter = Some(filter);
        self
    }

    pub fn pre_init<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&ListenerEntry) -> FilterDecision + 'a,
    {
        self.pre_init = Some(Box::new(filter));
        self
    }

    pub fn pre_call<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&ResolvedListener) -> FilterDecision + 'a,
    {
        self.pre_call = Some(Box::new(filter));
        self
    }

    pub fn post_call<F>(mut self, filter: F) -> Self
    where
        F: FnMut(Option<&Value>, &ResolvedListener) -> FilterDecision + 'a,
    {
        self.post_call = Some(Box::new(filter));
        self
    }

    /// Dispatch `payload` to the listeners of `node`.
    ///
    /// The entries are snapshotted before the first listener runs, so
    /// listeners may register or unregister on the same node.
    pub fn dispatch(
        &mut self,
        tree: &ObserverTree,
        node: NodeId,
        payload: &Value,
    ) -> DomainResult<DispatchOutcome> {
        let entries = tree.listeners(node)?;
        debug!(
            node = %tree.node(node)?.name,
            listener_count = entries.len(),
            "Dispatching event"
        );
        self.dispatch_entries(&entries, payload)
    }

    /// Dispatch `payload` over already sorted entries.
    ///
    /// Fails only if a listener cannot be resolved; that aborts the
    /// remaining entries.
    pub fn dispatch_entries(
        &mut self,
        entries: &[ListenerEntry],
        payload: &Value,
    ) -> DomainResult<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        for entry in entries {
            if !entry.matches_type(self.type_filter) {
                continue;
            }

            if let Some(filter) = self.pre_init.as_mut() {
                match filter(entry) {
                    FilterDecision::Break => return Ok(stopped(outcome, &entry.identifier)),
                    FilterDecision::SkipEntry => continue,
                    FilterDecision::Proceed => {}
                }
            }

            let listener = ResolvedListener {
                identifier: entry.identifier.clone(),
                instance: self.resolver.resolve(&entry.identifier)?,
            };

            if let Some(filter) = self.pre_call.as_mut() {
                match filter(&listener) {
                    FilterDecision::Break => return Ok(stopped(outcome, &entry.identifier)),
                    FilterDecision::SkipEntry => continue,
                    FilterDecision::Proceed => {}
                }
            }

            if !listener.instance.can_process() {
                warn!(identifier = %entry.identifier, "Resolved listener cannot process events");
                continue;
            }

            trace!(identifier = %entry.identifier, patience = entry.patience, "Calling listener");
            let result = listener.instance.process(payload);
            outcome.invoked += 1;

            if let Some(filter) = self.post_call.as_mut() {
                if filter(result.as_ref(), &listener) == FilterDecision::Break {
                    return Ok(stopped(outcome, &entry.identifier));
                }
            }
        }

        Ok(outcome)
    }
}

fn stopped(mut outcome: DispatchOutcome, identifier: &str) -> DispatchOutcome {
    debug!(identifier, invoked = outcome.invoked, "Dispatch stopped by filter");
    outcome.stopped = true;
    outcome
}
