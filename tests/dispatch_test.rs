//! Tests for prioritized, filterable dispatch on observer tree nodes

use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};
use serde_json::{json, Value};

use obtree::domain::{
    Dispatcher, DomainError, DomainResult, EventListener, FilterDecision, ListenerRef, NodeId,
    ObserverTree, ResolveListener,
};

type Trace = Arc<Mutex<Vec<String>>>;

struct Echo {
    name: String,
    trace: Trace,
}

impl EventListener for Echo {
    fn process(&self, payload: &Value) -> Option<Value> {
        self.trace.lock().unwrap().push(format!("process:{}", self.name));
        Some(json!({ "by": self.name, "seen": payload.clone() }))
    }
}

/// Resolver that records every resolution and knows every identifier.
struct TracingResolver {
    trace: Trace,
}

impl ResolveListener for TracingResolver {
    fn resolve(&self, identifier: &str) -> DomainResult<ListenerRef> {
        self.trace
            .lock()
            .unwrap()
            .push(format!("resolve:{identifier}"));
        if identifier == "missing" {
            return Err(DomainError::NoValidListener(identifier.to_string()));
        }
        Ok(Arc::new(Echo {
            name: identifier.to_string(),
            trace: Arc::clone(&self.trace),
        }))
    }
}

struct Fixture {
    tree: ObserverTree,
    payment: NodeId,
    trace: Trace,
    resolver: TracingResolver,
}

impl Fixture {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.trace.lock().unwrap())
    }

    fn processed(&self) -> Vec<String> {
        self.take()
            .into_iter()
            .filter_map(|t| t.strip_prefix("process:").map(str::to_string))
            .collect()
    }
}

#[fixture]
fn fx() -> Fixture {
    let mut tree = ObserverTree::new("checkout");
    let payment = tree.create_child(tree.root(), "payment").unwrap();
    let trace = Trace::default();
    Fixture {
        tree,
        payment,
        resolver: TracingResolver {
            trace: Arc::clone(&trace),
        },
        trace,
    }
}

#[rstest]
fn given_distinct_patience_when_dispatching_then_ascending_order(fx: Fixture) {
    // Arrange
    fx.tree.register_listener(fx.payment, "c", 0, 3.0).unwrap();
    fx.tree.register_listener(fx.payment, "a", 0, -1.0).unwrap();
    fx.tree.register_listener(fx.payment, "b", 0, 0.5).unwrap();

    // Act
    let outcome = Dispatcher::new(&fx.resolver)
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.processed(), vec!["a", "b", "c"]);
    assert_eq!(outcome.invoked, 3);
    assert!(!outcome.stopped);
}

#[rstest]
fn given_equal_patience_when_dispatching_then_registration_order(fx: Fixture) {
    // Arrange
    for id in ["first", "second", "third"] {
        fx.tree.register_listener(fx.payment, id, 0, 1.0).unwrap();
    }

    // Act
    Dispatcher::new(&fx.resolver)
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.processed(), vec!["first", "second", "third"]);
}

#[rstest]
fn given_reregistered_identifier_when_dispatching_then_single_entry_with_latest_values(
    fx: Fixture,
) {
    // Arrange
    fx.tree.register_listener(fx.payment, "a", 1, 10.0).unwrap();
    fx.tree.register_listener(fx.payment, "b", 1, 5.0).unwrap();
    fx.tree.register_listener(fx.payment, "a", 2, 0.0).unwrap();

    // Act
    Dispatcher::new(&fx.resolver)
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.processed(), vec!["a", "b"]);
    let entries = fx.tree.listeners(fx.payment).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].type_mask, 2);
}

#[rstest]
fn given_unregistered_identifier_when_dispatching_then_never_resolved(fx: Fixture) {
    // Arrange
    fx.tree.register_listener(fx.payment, "a", 0, 1.0).unwrap();
    fx.tree.register_listener(fx.payment, "b", 0, 2.0).unwrap();
    fx.tree.unregister_listener(fx.payment, "a").unwrap();

    // Act
    Dispatcher::new(&fx.resolver)
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.take(), vec!["resolve:b", "process:b"]);
}

#[rstest]
#[case::no_filter(None, vec!["one", "two", "three"])]
#[case::zero_matches_all(Some(0), vec!["one", "two", "three"])]
#[case::single_bit(Some(0b01), vec!["one", "three"])]
#[case::other_bit(Some(0b10), vec!["two", "three"])]
#[case::no_overlap(Some(0b100), vec![])]
fn given_type_filter_when_dispatching_then_only_overlapping_masks(
    fx: Fixture,
    #[case] filter: Option<u64>,
    #[case] expected: Vec<&str>,
) {
    // Arrange
    fx.tree.register_listener(fx.payment, "one", 0b01, 1.0).unwrap();
    fx.tree.register_listener(fx.payment, "two", 0b10, 2.0).unwrap();
    fx.tree.register_listener(fx.payment, "three", 0b11, 3.0).unwrap();
    let seen = Mutex::new(Vec::new());

    // Act
    let mut dispatcher = Dispatcher::new(&fx.resolver).pre_init(|entry| {
        seen.lock().unwrap().push(entry.identifier.clone());
        FilterDecision::Proceed
    });
    if let Some(filter) = filter {
        dispatcher = dispatcher.type_filter(filter);
    }
    dispatcher
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();
    drop(dispatcher);

    // Assert
    assert_eq!(fx.processed(), expected);
    assert_eq!(seen.into_inner().unwrap(), expected);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn given_pre_init_break_on_kth_entry_when_dispatching_then_only_earlier_entries_processed(
    fx: Fixture,
    #[case] k: usize,
) {
    // Arrange
    let ids = ["a", "b", "c"];
    for (i, id) in ids.iter().enumerate() {
        fx.tree.register_listener(fx.payment, id, 0, i as f64).unwrap();
    }
    let stop_at = ids[k - 1];

    // Act
    let outcome = Dispatcher::new(&fx.resolver)
        .pre_init(|entry| {
            if entry.identifier == stop_at {
                FilterDecision::Break
            } else {
                FilterDecision::Proceed
            }
        })
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    let expected: Vec<String> = ids[..k - 1]
        .iter()
        .flat_map(|id| [format!("resolve:{id}"), format!("process:{id}")])
        .collect();
    assert_eq!(fx.take(), expected);
    assert_eq!(outcome.invoked, k - 1);
    assert!(outcome.stopped);
}

#[rstest]
fn given_skip_entry_from_pre_init_when_dispatching_then_exactly_one_entry_skipped(fx: Fixture) {
    // Arrange
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        fx.tree.register_listener(fx.payment, id, 0, i as f64).unwrap();
    }

    // Act
    Dispatcher::new(&fx.resolver)
        .pre_init(|entry| {
            if entry.identifier == "b" {
                FilterDecision::SkipEntry
            } else {
                FilterDecision::Proceed
            }
        })
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(
        fx.take(),
        vec!["resolve:a", "process:a", "resolve:c", "process:c"]
    );
}

#[rstest]
fn given_skip_entry_from_pre_call_when_dispatching_then_resolved_but_not_processed(fx: Fixture) {
    // Arrange
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        fx.tree.register_listener(fx.payment, id, 0, i as f64).unwrap();
    }

    // Act
    Dispatcher::new(&fx.resolver)
        .pre_call(|listener| {
            if listener.identifier == "b" {
                FilterDecision::SkipEntry
            } else {
                FilterDecision::Proceed
            }
        })
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(
        fx.take(),
        vec!["resolve:a", "process:a", "resolve:b", "resolve:c", "process:c"]
    );
}

#[rstest]
fn given_pre_call_break_on_l2_when_dispatching_then_l2_not_processed_and_l1_untouched(
    fx: Fixture,
) {
    // Arrange
    fx.tree.register_listener(fx.payment, "L2", 0, 0.0).unwrap();
    fx.tree.register_listener(fx.payment, "L1", 0, 5.0).unwrap();

    // Act
    let outcome = Dispatcher::new(&fx.resolver)
        .pre_call(|listener| {
            if listener.identifier == "L2" {
                FilterDecision::Break
            } else {
                FilterDecision::Proceed
            }
        })
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.take(), vec!["resolve:L2"]);
    assert_eq!(outcome.invoked, 0);
    assert!(outcome.stopped);
}

#[rstest]
fn given_post_call_filter_when_dispatching_then_sees_each_result(fx: Fixture) {
    // Arrange
    fx.tree.register_listener(fx.payment, "a", 0, 1.0).unwrap();
    fx.tree.register_listener(fx.payment, "b", 0, 2.0).unwrap();
    let results = Mutex::new(Vec::new());

    // Act
    let outcome = Dispatcher::new(&fx.resolver)
        .post_call(|result, listener| {
            results
                .lock()
                .unwrap()
                .push((listener.identifier.clone(), result.cloned()));
            FilterDecision::Break
        })
        .dispatch(&fx.tree, fx.payment, &json!({"amount": 7}))
        .unwrap();

    // Assert
    let results = results.into_inner().unwrap();
    assert_eq!(
        results,
        vec![(
            "a".to_string(),
            Some(json!({"by": "a", "seen": {"amount": 7}}))
        )]
    );
    assert_eq!(outcome.invoked, 1);
    assert!(outcome.stopped);
}

#[rstest]
fn given_unresolvable_entry_when_dispatching_then_error_and_rest_untouched(fx: Fixture) {
    // Arrange
    fx.tree.register_listener(fx.payment, "a", 0, 1.0).unwrap();
    fx.tree.register_listener(fx.payment, "missing", 0, 2.0).unwrap();
    fx.tree.register_listener(fx.payment, "c", 0, 3.0).unwrap();

    // Act
    let result = Dispatcher::new(&fx.resolver).dispatch(&fx.tree, fx.payment, &json!(null));

    // Assert
    assert!(matches!(result, Err(DomainError::NoValidListener(ref id)) if id == "missing"));
    assert_eq!(
        fx.take(),
        vec!["resolve:a", "process:a", "resolve:missing"]
    );
}

#[rstest]
fn given_listeners_on_other_nodes_when_dispatching_then_only_target_node_called(fx: Fixture) {
    // Arrange
    fx.tree
        .register_listener(fx.tree.root(), "root_listener", 0, 0.0)
        .unwrap();
    fx.tree.register_listener(fx.payment, "a", 0, 1.0).unwrap();

    // Act
    Dispatcher::new(&fx.resolver)
        .dispatch(&fx.tree, fx.payment, &json!(null))
        .unwrap();

    // Assert
    assert_eq!(fx.processed(), vec!["a"]);
}

/// Listener that swaps `late` for `added` on its own node while running.
struct Rewire {
    tree: Arc<ObserverTree>,
    node: NodeId,
    trace: Trace,
}

impl EventListener for Rewire {
    fn process(&self, _payload: &Value) -> Option<Value> {
        self.trace.lock().unwrap().push("process:rewire".to_string());
        self.tree.unregister_listener(self.node, "late").unwrap();
        self.tree.register_listener(self.node, "added", 0, 0.5).unwrap();
        None
    }
}

struct RewireResolver {
    tree: Arc<ObserverTree>,
    node: NodeId,
    trace: Trace,
}

impl ResolveListener for RewireResolver {
    fn resolve(&self, identifier: &str) -> DomainResult<ListenerRef> {
        let trace = Arc::clone(&self.trace);
        if identifier == "rewire" {
            return Ok(Arc::new(Rewire {
                tree: Arc::clone(&self.tree),
                node: self.node,
                trace,
            }));
        }
        Ok(Arc::new(Echo {
            name: identifier.to_string(),
            trace,
        }))
    }
}

#[test]
fn given_listener_mutating_its_node_when_dispatching_then_snapshot_used_and_change_seen_next() {
    // Arrange
    let mut tree = ObserverTree::new("checkout");
    let payment = tree.create_child(tree.root(), "payment").unwrap();
    tree.register_listener(payment, "rewire", 0, 1.0).unwrap();
    tree.register_listener(payment, "late", 0, 2.0).unwrap();
    let tree = Arc::new(tree);
    let trace = Trace::default();
    let resolver = RewireResolver {
        tree: Arc::clone(&tree),
        node: payment,
        trace: Arc::clone(&trace),
    };

    // Act
    let first = Dispatcher::new(&resolver)
        .dispatch(&tree, payment, &json!(null))
        .unwrap();
    let first_trace = std::mem::take(&mut *trace.lock().unwrap());
    let second = Dispatcher::new(&resolver)
        .dispatch(&tree, payment, &json!(null))
        .unwrap();
    let second_trace = std::mem::take(&mut *trace.lock().unwrap());

    // Assert
    assert_eq!(first.invoked, 2);
    assert_eq!(first_trace, vec!["process:rewire", "process:late"]);
    assert_eq!(second.invoked, 2);
    assert_eq!(second_trace, vec!["process:added", "process:rewire"]);
    let ids: Vec<_> = tree
        .listeners(payment)
        .unwrap()
        .into_iter()
        .map(|e| e.identifier)
        .collect();
    assert_eq!(ids, vec!["added", "rewire"]);
}
