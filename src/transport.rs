//! Message delivery fabric between node inboxes.
//!
//! Every node owns one unbounded mpsc inbox; its neighbors hold the
//! sending side. The channel is reliable and loss-free, and enqueue
//! order per sender is preserved, which gives exactly the
//! per-directed-edge FIFO guarantee the protocol needs. No ordering
//! holds across distinct senders.
//!
//! Delivery is the only synchronization between nodes: nothing else is
//! shared.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::protocol::{Message, Weight};
use crate::topology::NodeId;

/// A message in flight, tagged with the edge it arrived on.
#[derive(Debug)]
pub enum Envelope {
    /// Protocol traffic from a neighbor.
    Deliver { from: NodeId, msg: Message },
    /// Runtime request to stop consuming and report final state.
    Shutdown,
}

/// Both halves of one node's inbox.
pub struct Endpoint {
    pub sender: mpsc::UnboundedSender<Envelope>,
    pub inbox: mpsc::UnboundedReceiver<Envelope>,
}

/// Create one inbox per node.
///
/// The runtime clones the senders into per-node [`Links`] (and keeps a
/// copy for shutdown); each receiver is moved into its node task.
pub fn mesh<I>(ids: I) -> BTreeMap<NodeId, Endpoint>
where
    I: IntoIterator<Item = NodeId>,
{
    ids.into_iter()
        .map(|id| {
            let (sender, inbox) = mpsc::unbounded_channel();
            (id, Endpoint { sender, inbox })
        })
        .collect()
}

/// The sender of every endpoint, for building [`Links`].
pub fn senders(endpoints: &BTreeMap<NodeId, Endpoint>) -> BTreeMap<NodeId, mpsc::UnboundedSender<Envelope>> {
    endpoints
        .iter()
        .map(|(&id, endpoint)| (id, endpoint.sender.clone()))
        .collect()
}

/// A node's outgoing half: one sender per incident edge, plus its own
/// inbox sender for postponement.
pub struct Links {
    id: NodeId,
    own: mpsc::UnboundedSender<Envelope>,
    peers: BTreeMap<NodeId, mpsc::UnboundedSender<Envelope>>,
}

impl Links {
    /// Restrict the full sender map to `id`'s incident edges.
    pub fn new(
        id: NodeId,
        own: mpsc::UnboundedSender<Envelope>,
        senders: &BTreeMap<NodeId, mpsc::UnboundedSender<Envelope>>,
        neighbors: &BTreeMap<NodeId, Weight>,
    ) -> Self {
        let peers = senders
            .iter()
            .filter(|(peer, _)| neighbors.contains_key(*peer))
            .map(|(&peer, tx)| (peer, tx.clone()))
            .collect();
        Links { id, own, peers }
    }

    /// Send along the edge to `to`. Erring on an unknown peer is a
    /// protocol bug; a closed inbox only happens while the run drains
    /// after halt and the message is dead-lettered.
    pub fn send(&self, to: NodeId, msg: Message) -> Result<(), ProtocolError> {
        let tx = self
            .peers
            .get(&to)
            .ok_or(ProtocolError::UnknownNeighbor {
                node: self.id,
                peer: to,
            })?;
        if tx.send(Envelope::Deliver { from: self.id, msg }).is_err() {
            tracing::trace!(node = %self.id, to = %to, "peer inbox closed, message dropped");
        }
        Ok(())
    }

    /// Re-enqueue a received message at the tail of our own inbox so it
    /// is re-examined only after strictly newer arrivals.
    pub fn requeue(&self, from: NodeId, msg: Message) {
        let _ = self.own.send(Envelope::Deliver { from, msg });
    }
}
