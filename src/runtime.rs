//! Run orchestration.
//!
//! Validates the topology, spawns the collector and one task per node,
//! and drives the run to completion: when the collector observes halt,
//! every node is shut down and its final state gathered, then the
//! result is audited against the invariants the protocol guarantees at
//! termination.

use std::collections::BTreeMap;

use tokio::task::JoinSet;

use crate::collector::{Collector, SpanningTree};
use crate::error::{ProtocolError, RunError};
use crate::node::{Node, NodeSnapshot};
use crate::protocol::EdgeStatus;
use crate::topology::{DisjointSet, NodeId, Topology};
use crate::transport::{mesh, senders, Envelope, Links};

/// Everything a finished run produces.
#[derive(Debug)]
pub struct RunReport {
    /// The minimum spanning tree announced by the collector.
    pub tree: SpanningTree,
    /// Final state of every node, keyed by identifier.
    pub nodes: BTreeMap<NodeId, NodeSnapshot>,
}

/// Execute the distributed algorithm over `topology`.
///
/// The topology must be connected with distinct positive weights;
/// validation failures are reported before anything is spawned.
pub async fn run(topology: &Topology) -> Result<RunReport, RunError> {
    topology.validate()?;
    let node_count = topology.node_count();

    // A single node spans itself; there is no edge to wake across.
    if node_count == 1 {
        tracing::info!("single-node graph, nothing to span");
        return Ok(RunReport {
            tree: SpanningTree::empty(),
            nodes: BTreeMap::new(),
        });
    }

    let (collector, handle) = Collector::new();
    let mut collector_task = tokio::spawn(collector.run());

    let endpoints = mesh(topology.node_ids());
    let txs = senders(&endpoints);
    let mut tasks: JoinSet<Result<NodeSnapshot, ProtocolError>> = JoinSet::new();
    for (id, endpoint) in endpoints {
        let neighbors = topology.neighbors(id);
        let links = Links::new(id, endpoint.sender, &txs, &neighbors);
        let node = Node::new(id, neighbors, links, endpoint.inbox, handle.clone());
        tasks.spawn(node.run());
    }
    // The runtime's own copy must not keep the collector alive forever.
    drop(handle);

    tracing::info!(
        nodes = node_count,
        edges = topology.edge_count(),
        "run started"
    );

    let mut snapshots: BTreeMap<NodeId, NodeSnapshot> = BTreeMap::new();
    let tree = loop {
        tokio::select! {
            finished = &mut collector_task => {
                match finished {
                    Ok(tree) => break tree,
                    Err(err) => {
                        tasks.abort_all();
                        return Err(RunError::CollectorPanicked(err.to_string()));
                    }
                }
            }
            Some(joined) = tasks.join_next() => {
                match joined {
                    // A node only returns before shutdown if something
                    // went wrong; an Ok snapshot here means its inbox
                    // closed, which is harmless during teardown.
                    Ok(Ok(snapshot)) => {
                        snapshots.insert(snapshot.id, snapshot);
                    }
                    Ok(Err(err)) => {
                        tracing::error!(error = %err, "protocol invariant violated");
                        tasks.abort_all();
                        collector_task.abort();
                        return Err(err.into());
                    }
                    Err(err) => {
                        tasks.abort_all();
                        collector_task.abort();
                        return Err(RunError::NodePanicked(err.to_string()));
                    }
                }
            }
        }
    };

    // Halt observed: stop the actors and gather their final state.
    for tx in txs.values() {
        let _ = tx.send(Envelope::Shutdown);
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(snapshot)) => {
                snapshots.insert(snapshot.id, snapshot);
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(err) => return Err(RunError::NodePanicked(err.to_string())),
        }
    }

    audit(topology, &tree, &snapshots)?;

    let sent: u64 = snapshots.values().map(|s| s.stats.sent).sum();
    let postponed: u64 = snapshots.values().map(|s| s.stats.postponed).sum();
    tracing::info!(
        edges = tree.len(),
        weight = tree.total_weight(),
        sent,
        postponed,
        "run complete"
    );

    Ok(RunReport {
        tree,
        nodes: snapshots,
    })
}

/// Check the invariants that must hold once halt has been observed.
fn audit(
    topology: &Topology,
    tree: &SpanningTree,
    nodes: &BTreeMap<NodeId, NodeSnapshot>,
) -> Result<(), ProtocolError> {
    let node_count = topology.node_count();
    if tree.len() != node_count as usize - 1 {
        return Err(ProtocolError::IncompleteTree {
            found: tree.len(),
            nodes: node_count,
        });
    }

    let mut components = DisjointSet::new(node_count as usize);
    for edge in tree.edges() {
        if !components.union(edge.a.index(), edge.b.index()) {
            return Err(ProtocolError::NotSpanning);
        }
        let branch_on = |node: NodeId, peer: NodeId| {
            nodes
                .get(&node)
                .map(|s| s.status.get(&peer) == Some(&EdgeStatus::Branch))
                .unwrap_or(false)
        };
        if !branch_on(edge.a, edge.b) && !branch_on(edge.b, edge.a) {
            return Err(ProtocolError::AdoptedEdgeNotBranch {
                a: edge.a,
                b: edge.b,
            });
        }
    }

    for (&id, snapshot) in nodes {
        if let Some(peer) = snapshot.test_edge {
            tracing::error!(node = %id, peer = %peer, "probe left outstanding");
            return Err(ProtocolError::UnfinishedProbe { node: id });
        }
        if snapshot.find_count != 0 {
            return Err(ProtocolError::UnfinishedWave {
                node: id,
                pending: snapshot.find_count,
            });
        }
        for (&peer, &status) in &snapshot.status {
            if status != EdgeStatus::Basic {
                continue;
            }
            let opposite_branch = nodes
                .get(&peer)
                .map(|p| p.status.get(&id) == Some(&EdgeStatus::Branch))
                .unwrap_or(false);
            if opposite_branch {
                return Err(ProtocolError::DanglingBasic { node: id, peer });
            }
        }
    }
    Ok(())
}
