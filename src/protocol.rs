//! Protocol messages exchanged between nodes.
//!
//! Defines the wire format for fragment negotiation: seven message
//! variants, the per-edge channel classification, and the node
//! computation states. The set is closed; dispatch is exhaustive over
//! exactly these variants.

use serde::{Deserialize, Serialize};

/// Edge weight. Weights are strictly positive and globally distinct;
/// after the first merge a fragment is named by the weight of the edge
/// that created it.
pub type Weight = u64;

/// Sentinel weight meaning "no outgoing edge known".
pub const INFINITY: Weight = Weight::MAX;

/// Classification a node holds for each incident edge.
///
/// `Basic` may move to `Branch` or `Reject`; neither of those ever
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    /// Not yet classified.
    Basic,
    /// Committed to the spanning tree.
    Branch,
    /// Proven to lead back into the node's own fragment.
    Reject,
}

/// Computation state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Initial, before local wakeup.
    Sleeping,
    /// Participating in a find-minimum-outgoing-edge wave.
    Find,
    /// Not currently searching.
    Found,
}

/// Messages exchanged between neighboring nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Propose joining fragments across the edge this arrives on.
    Connect { level: u32 },
    /// Adopt a new fragment identity and, when `state` is `Find`,
    /// start searching for the minimum outgoing edge.
    Initiate {
        level: u32,
        fragment: Weight,
        state: NodeState,
    },
    /// Probe whether the receiver belongs to a different fragment.
    Test { level: u32, fragment: Weight },
    /// Answer to `Test`: the edge leaves the sender's fragment.
    Accept,
    /// Answer to `Test`: both endpoints share a fragment.
    Reject,
    /// Convergecast of the best outgoing weight found in a subtree.
    Report { best: Weight },
    /// Walk toward the endpoint adjacent to the fragment's minimum
    /// outgoing edge so it can issue the connect.
    ChangeRoot,
}

impl Message {
    /// Short variant name for trace output.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Connect { .. } => "connect",
            Message::Initiate { .. } => "initiate",
            Message::Test { .. } => "test",
            Message::Accept => "accept",
            Message::Reject => "reject",
            Message::Report { .. } => "report",
            Message::ChangeRoot => "change-root",
        }
    }
}
