//! The per-node state machine.
//!
//! Each graph vertex runs as an independent actor: it wakes once,
//! adopts its cheapest incident edge, and then consumes its inbox until
//! the runtime shuts it down. Fragments grow by absorbing lower-level
//! fragments and by symmetric merges between equal-level fragments;
//! the minimum outgoing edge of a fragment is found by a broadcast
//! (`Initiate`) / convergecast (`Report`) wave over the branch edges.
//!
//! A node that cannot yet answer a message postpones it: the message is
//! re-enqueued at the tail of its own inbox, so it is retried only
//! after strictly newer arrivals have been processed. The level
//! ordering of fragments guarantees some node can always make
//! progress, which makes postponement safe for liveness.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::collector::CollectorHandle;
use crate::error::ProtocolError;
use crate::protocol::{EdgeStatus, Message, NodeState, Weight, INFINITY};
use crate::topology::NodeId;
use crate::transport::{Envelope, Links};

/// Message traffic counters, reported in the final snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub sent: u64,
    pub received: u64,
    pub postponed: u64,
}

/// Final state of a node, returned when the runtime shuts it down.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub state: NodeState,
    pub level: u32,
    pub fragment: Option<Weight>,
    pub status: BTreeMap<NodeId, EdgeStatus>,
    pub best_weight: Weight,
    pub test_edge: Option<NodeId>,
    pub find_count: u32,
    pub stats: NodeStats,
}

/// One vertex of the graph, owning all of its mutable state.
pub struct Node {
    id: NodeId,
    /// Incident edge weights, keyed by neighbor.
    weights: BTreeMap<NodeId, Weight>,
    /// Channel classification per incident edge.
    status: BTreeMap<NodeId, EdgeStatus>,
    state: NodeState,
    level: u32,
    /// Fragment name: the weight of the core edge that created the
    /// fragment. Unset until the first `Initiate`.
    fragment: Option<Weight>,
    /// Edge toward the sender of the most recent `Initiate`.
    in_branch: Option<NodeId>,
    /// Best outgoing edge known for this node's subtree.
    best_edge: Option<NodeId>,
    best_weight: Weight,
    /// Edge currently being probed with `Test`.
    test_edge: Option<NodeId>,
    /// Outstanding child reports in the current find wave.
    find_count: u32,
    links: Links,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    collector: CollectorHandle,
    stats: NodeStats,
}

impl Node {
    pub fn new(
        id: NodeId,
        weights: BTreeMap<NodeId, Weight>,
        links: Links,
        inbox: mpsc::UnboundedReceiver<Envelope>,
        collector: CollectorHandle,
    ) -> Self {
        let status = weights.keys().map(|&peer| (peer, EdgeStatus::Basic)).collect();
        Node {
            id,
            weights,
            status,
            state: NodeState::Sleeping,
            level: 0,
            fragment: None,
            in_branch: None,
            best_edge: None,
            best_weight: INFINITY,
            test_edge: None,
            find_count: 0,
            links,
            inbox,
            collector,
            stats: NodeStats::default(),
        }
    }

    /// Wake up, then consume the inbox until shutdown.
    pub async fn run(mut self) -> Result<NodeSnapshot, ProtocolError> {
        self.wakeup()?;
        loop {
            let Some(envelope) = self.inbox.recv().await else {
                break;
            };
            match envelope {
                Envelope::Shutdown => break,
                Envelope::Deliver { from, msg } => {
                    self.stats.received += 1;
                    tracing::trace!(node = %self.id, from = %from, msg = msg.kind(), "recv");
                    let postponed_before = self.stats.postponed;
                    self.handle(from, msg)?;
                    if self.stats.postponed > postponed_before {
                        // The requeued message can only become
                        // answerable once other traffic has been
                        // processed; let it land first.
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
        Ok(self.snapshot())
    }

    /// Dispatch one received message.
    fn handle(&mut self, from: NodeId, msg: Message) -> Result<(), ProtocolError> {
        match msg {
            Message::Connect { level } => self.on_connect(from, level),
            Message::Initiate {
                level,
                fragment,
                state,
            } => self.on_initiate(from, level, fragment, state),
            Message::Test { level, fragment } => self.on_test(from, level, fragment),
            Message::Accept => self.on_accept(from),
            Message::Reject => self.on_reject(from),
            Message::Report { best } => self.on_report(from, best),
            Message::ChangeRoot => self.change_root(),
        }
    }

    /// Adopt the minimum incident edge and propose merging across it.
    ///
    /// Every singleton is a level-0 fragment; with distinct weights the
    /// cheapest incident edge of any node is always in the tree, so it
    /// is committed immediately.
    fn wakeup(&mut self) -> Result<(), ProtocolError> {
        if self.state != NodeState::Sleeping {
            return Ok(());
        }
        let Some((peer, weight)) = self
            .weights
            .iter()
            .min_by_key(|&(_, &w)| w)
            .map(|(&p, &w)| (p, w))
        else {
            // No incident edges: nothing to wake across. The driver
            // never starts an isolated node, but stay inert if asked.
            return Ok(());
        };
        self.status.insert(peer, EdgeStatus::Branch);
        self.collector.edge_adopted(self.id, peer, weight);
        self.level = 0;
        self.state = NodeState::Found;
        self.find_count = 0;
        tracing::info!(node = %self.id, edge = %peer, weight, "awake, adopted minimum incident edge");
        self.send(peer, Message::Connect { level: 0 })
    }

    fn on_connect(&mut self, from: NodeId, their_level: u32) -> Result<(), ProtocolError> {
        self.wakeup()?;
        if their_level < self.level {
            // Absorb the lower-level fragment outright; it inherits our
            // identity and, mid-find, joins the wave.
            self.status.insert(from, EdgeStatus::Branch);
            self.collector
                .edge_adopted(self.id, from, self.weight_to(from)?);
            let fragment = self.fragment.ok_or(ProtocolError::MissingFragment {
                node: self.id,
                level: self.level,
            })?;
            tracing::debug!(node = %self.id, from = %from, level = self.level, "absorbing fragment");
            self.send(
                from,
                Message::Initiate {
                    level: self.level,
                    fragment,
                    state: self.state,
                },
            )?;
            if self.state == NodeState::Find {
                self.find_count += 1;
            }
            Ok(())
        } else if self.status_of(from) == EdgeStatus::Basic {
            // Equal or higher level but the edge is unclassified: we
            // cannot tell yet whether their fragment is ours. Wait for
            // our own level or the edge's classification to change.
            self.postpone(from, Message::Connect { level: their_level });
            Ok(())
        } else {
            // Both sides proposed across this edge: symmetric merge.
            // The connecting edge names the new fragment and the level
            // rises by one.
            let weight = self.weight_to(from)?;
            tracing::debug!(node = %self.id, from = %from, new_level = self.level + 1, "merging fragments");
            self.send(
                from,
                Message::Initiate {
                    level: self.level + 1,
                    fragment: weight,
                    state: NodeState::Find,
                },
            )
        }
    }

    fn on_initiate(
        &mut self,
        from: NodeId,
        level: u32,
        fragment: Weight,
        state: NodeState,
    ) -> Result<(), ProtocolError> {
        self.level = level;
        self.fragment = Some(fragment);
        self.state = state;
        self.in_branch = Some(from);
        self.best_edge = None;
        self.best_weight = INFINITY;

        let children: Vec<NodeId> = self
            .status
            .iter()
            .filter(|&(&peer, &status)| peer != from && status == EdgeStatus::Branch)
            .map(|(&peer, _)| peer)
            .collect();
        for child in children {
            self.send(
                child,
                Message::Initiate {
                    level,
                    fragment,
                    state,
                },
            )?;
            if state == NodeState::Find {
                self.find_count += 1;
            }
        }
        if state == NodeState::Find {
            self.probe_next()?;
        }
        Ok(())
    }

    fn on_test(
        &mut self,
        from: NodeId,
        their_level: u32,
        their_fragment: Weight,
    ) -> Result<(), ProtocolError> {
        self.wakeup()?;
        if self.level < their_level {
            // Answering now could wrongly reject; once our level rises
            // we can answer correctly.
            self.postpone(
                from,
                Message::Test {
                    level: their_level,
                    fragment: their_fragment,
                },
            );
            return Ok(());
        }
        let fragment = self.fragment.ok_or(ProtocolError::MissingFragment {
            node: self.id,
            level: self.level,
        })?;
        if fragment != their_fragment {
            // Different fragment: the probed edge leaves theirs. The
            // channel stays unclassified; it may yet become our own
            // minimum outgoing edge.
            self.send(from, Message::Accept)
        } else {
            if self.status_of(from) == EdgeStatus::Basic {
                self.status.insert(from, EdgeStatus::Reject);
            }
            if self.test_edge != Some(from) {
                self.send(from, Message::Reject)
            } else {
                // We were probing the same edge; skip the redundant
                // reject and move to the next candidate.
                self.probe_next()
            }
        }
    }

    fn on_accept(&mut self, from: NodeId) -> Result<(), ProtocolError> {
        self.test_edge = None;
        let weight = self.weight_to(from)?;
        if weight < self.best_weight {
            self.best_edge = Some(from);
            self.best_weight = weight;
        }
        self.try_report()
    }

    fn on_reject(&mut self, from: NodeId) -> Result<(), ProtocolError> {
        if self.status_of(from) == EdgeStatus::Basic {
            self.status.insert(from, EdgeStatus::Reject);
        }
        self.probe_next()
    }

    fn on_report(&mut self, from: NodeId, their_best: Weight) -> Result<(), ProtocolError> {
        if Some(from) != self.in_branch {
            // Child report: reports only ride branch edges.
            if self.status_of(from) != EdgeStatus::Branch {
                return Err(ProtocolError::ReportOnNonBranch {
                    node: self.id,
                    from,
                });
            }
            self.find_count = self
                .find_count
                .checked_sub(1)
                .ok_or(ProtocolError::FindCountUnderflow { node: self.id })?;
            if their_best < self.best_weight {
                self.best_edge = Some(from);
                self.best_weight = their_best;
            }
            self.try_report()
        } else if self.state == NodeState::Find {
            // Our own subtree is not finished; the core comparison must
            // wait for our own result.
            self.postpone(from, Message::Report { best: their_best });
            Ok(())
        } else if their_best > self.best_weight {
            // Our side holds the fragment's minimum outgoing edge.
            self.change_root()
        } else if their_best == INFINITY {
            // Both roots agree no outgoing edge exists: the tree is
            // complete.
            tracing::info!(node = %self.id, "no outgoing edge remains, halting");
            self.collector.halt(self.id);
            Ok(())
        } else {
            // The other side holds the better edge and drives the merge.
            Ok(())
        }
    }

    /// Probe the cheapest unclassified edge, or finish this node's part
    /// of the find wave.
    fn probe_next(&mut self) -> Result<(), ProtocolError> {
        let candidate = self
            .weights
            .iter()
            .filter(|(peer, _)| self.status.get(*peer).copied() == Some(EdgeStatus::Basic))
            .min_by_key(|&(_, &w)| w)
            .map(|(&peer, _)| peer);
        match candidate {
            Some(peer) => {
                self.test_edge = Some(peer);
                let fragment = self.fragment.ok_or(ProtocolError::MissingFragment {
                    node: self.id,
                    level: self.level,
                })?;
                self.send(
                    peer,
                    Message::Test {
                        level: self.level,
                        fragment,
                    },
                )
            }
            None => {
                self.test_edge = None;
                self.try_report()
            }
        }
    }

    /// Report up once nothing local is outstanding.
    fn try_report(&mut self) -> Result<(), ProtocolError> {
        if self.find_count == 0 && self.test_edge.is_none() {
            self.state = NodeState::Found;
            let parent = self.in_branch.ok_or(ProtocolError::NoInBranch { node: self.id })?;
            self.send(
                parent,
                Message::Report {
                    best: self.best_weight,
                },
            )?;
        }
        Ok(())
    }

    /// Walk toward the fragment's minimum outgoing edge; the node
    /// adjacent to it issues the connect.
    fn change_root(&mut self) -> Result<(), ProtocolError> {
        let best = self.best_edge.ok_or(ProtocolError::NoBestEdge { node: self.id })?;
        if self.status_of(best) == EdgeStatus::Branch {
            self.send(best, Message::ChangeRoot)
        } else {
            self.send(best, Message::Connect { level: self.level })?;
            self.status.insert(best, EdgeStatus::Branch);
            self.collector
                .edge_adopted(self.id, best, self.weight_to(best)?);
            tracing::debug!(node = %self.id, edge = %best, "adopted minimum outgoing edge");
            Ok(())
        }
    }

    fn send(&mut self, to: NodeId, msg: Message) -> Result<(), ProtocolError> {
        self.stats.sent += 1;
        tracing::trace!(node = %self.id, to = %to, msg = msg.kind(), "send");
        self.links.send(to, msg)
    }

    fn postpone(&mut self, from: NodeId, msg: Message) {
        self.stats.postponed += 1;
        tracing::trace!(node = %self.id, from = %from, msg = msg.kind(), "postpone");
        self.links.requeue(from, msg);
    }

    fn weight_to(&self, peer: NodeId) -> Result<Weight, ProtocolError> {
        self.weights
            .get(&peer)
            .copied()
            .ok_or(ProtocolError::UnknownNeighbor {
                node: self.id,
                peer,
            })
    }

    fn status_of(&self, peer: NodeId) -> EdgeStatus {
        self.status.get(&peer).copied().unwrap_or(EdgeStatus::Basic)
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            state: self.state,
            level: self.level,
            fragment: self.fragment,
            status: self.status.clone(),
            best_weight: self.best_weight,
            test_edge: self.test_edge,
            find_count: self.find_count,
            stats: self.stats,
        }
    }
}
