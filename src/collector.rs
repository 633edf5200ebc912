//! MST edge sink.
//!
//! Nodes announce adopted edges as they commit them; a single passive
//! collector task serializes the announcements into a set keyed by the
//! normalized undirected edge and resolves with the finished tree when
//! the terminating node reports halt.
//!
//! Both endpoints of an edge may announce it independently during a
//! merge, so insertion must be idempotent.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::Weight;
use crate::topology::{ordered, NodeId};

/// Notifications flowing from nodes into the collector.
#[derive(Debug)]
pub enum CollectorEvent {
    /// An edge was committed to the spanning tree.
    EdgeAdopted { a: NodeId, b: NodeId, weight: Weight },
    /// The terminating node observed that no outgoing edge remains.
    Halt { from: NodeId },
}

/// Cheaply cloneable handle nodes use to notify the collector.
#[derive(Clone)]
pub struct CollectorHandle {
    tx: mpsc::UnboundedSender<CollectorEvent>,
}

impl CollectorHandle {
    pub fn edge_adopted(&self, a: NodeId, b: NodeId, weight: Weight) {
        let _ = self.tx.send(CollectorEvent::EdgeAdopted { a, b, weight });
    }

    pub fn halt(&self, from: NodeId) {
        let _ = self.tx.send(CollectorEvent::Halt { from });
    }
}

/// A bare handle/receiver pair for exercising nodes without a
/// collector task.
#[cfg(test)]
pub(crate) fn test_channel() -> (CollectorHandle, mpsc::UnboundedReceiver<CollectorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CollectorHandle { tx }, rx)
}

/// The collector task state.
pub struct Collector {
    rx: mpsc::UnboundedReceiver<CollectorEvent>,
    edges: BTreeMap<(NodeId, NodeId), Weight>,
    active: bool,
}

impl Collector {
    pub fn new() -> (Self, CollectorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Collector {
                rx,
                edges: BTreeMap::new(),
                active: true,
            },
            CollectorHandle { tx },
        )
    }

    /// Consume events until halt, then resolve with the collected tree.
    pub async fn run(mut self) -> SpanningTree {
        while self.active {
            let Some(event) = self.rx.recv().await else {
                // Every handle dropped without a halt; publish what we have.
                tracing::warn!("collector channel closed before halt");
                break;
            };
            self.observe(event);
        }
        self.finish()
    }

    fn observe(&mut self, event: CollectorEvent) {
        match event {
            CollectorEvent::EdgeAdopted { a, b, weight } => match self.edges.entry(ordered(a, b)) {
                Entry::Vacant(slot) => {
                    tracing::debug!(a = %a, b = %b, weight, "edge adopted");
                    slot.insert(weight);
                }
                Entry::Occupied(_) => {
                    tracing::trace!(a = %a, b = %b, "duplicate adoption ignored");
                }
            },
            CollectorEvent::Halt { from } => {
                tracing::info!(node = %from, edges = self.edges.len(), "halt observed");
                self.active = false;
            }
        }
    }

    fn finish(self) -> SpanningTree {
        SpanningTree {
            edges: self
                .edges
                .into_iter()
                .map(|((a, b), weight)| TreeEdge { a, b, weight })
                .collect(),
        }
    }
}

/// One undirected edge of the finished tree, endpoints normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEdge {
    pub a: NodeId,
    pub b: NodeId,
    pub weight: Weight,
}

/// The spanning tree published at halt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanningTree {
    edges: Vec<TreeEdge>,
}

impl SpanningTree {
    pub fn edges(&self) -> &[TreeEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn total_weight(&self) -> Weight {
        self.edges.iter().map(|e| e.weight).sum()
    }

    pub fn contains(&self, a: NodeId, b: NodeId) -> bool {
        let key = ordered(a, b);
        self.edges.iter().any(|e| (e.a, e.b) == key)
    }

    /// An empty tree, for the single-node graph.
    pub(crate) fn empty() -> Self {
        SpanningTree { edges: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_adoptions_collapse_to_one_edge() {
        let (collector, handle) = Collector::new();
        let task = tokio::spawn(collector.run());

        let a = NodeId::new(0);
        let b = NodeId::new(1);
        handle.edge_adopted(a, b, 42);
        handle.edge_adopted(b, a, 42);
        handle.halt(a);

        let tree = task.await.expect("collector task");
        assert_eq!(tree.len(), 1);
        assert!(tree.contains(a, b));
        assert_eq!(tree.total_weight(), 42);
    }

    #[tokio::test]
    async fn events_after_halt_are_not_observed() {
        let (collector, handle) = Collector::new();
        handle.edge_adopted(NodeId::new(0), NodeId::new(1), 5);
        handle.halt(NodeId::new(0));
        handle.edge_adopted(NodeId::new(1), NodeId::new(2), 6);

        let tree = collector.run().await;
        assert_eq!(tree.len(), 1);
    }

    #[tokio::test]
    async fn dropping_every_handle_resolves_without_halt() {
        let (collector, handle) = Collector::new();
        handle.edge_adopted(NodeId::new(0), NodeId::new(1), 5);
        drop(handle);

        let tree = collector.run().await;
        assert_eq!(tree.len(), 1);
    }
}
