//! Error taxonomy.
//!
//! `TopologyError` covers malformed input and is always detected before
//! any node task spawns. `ProtocolError` marks a broken protocol
//! invariant inside a running node; it indicates an implementation bug
//! and aborts the run rather than being recovered from.

use thiserror::Error;

use crate::protocol::Weight;
use crate::topology::NodeId;

/// Rejected graph input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("graph has no nodes")]
    Empty,

    #[error("edge {a}-{b} has an endpoint out of range for {nodes} nodes")]
    EndpointOutOfRange { a: u32, b: u32, nodes: u32 },

    #[error("self-loop on node {node}")]
    SelfLoop { node: u32 },

    #[error("edge {a}-{b} has zero weight; weights must be strictly positive")]
    ZeroWeight { a: u32, b: u32 },

    #[error("edge {a}-{b} declared twice")]
    DuplicateEdge { a: u32, b: u32 },

    #[error("weight {weight} on edge {a}-{b} collides with an earlier edge")]
    DuplicateWeight { a: u32, b: u32, weight: Weight },

    #[error("graph is disconnected: node {node} is unreachable")]
    Disconnected { node: u32 },
}

/// A broken invariant of the distributed protocol.
///
/// None of these can occur on well-formed input with a correct
/// implementation; each carries enough context to locate the faulty
/// node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("node {node}: message references {peer}, which is not a neighbor")]
    UnknownNeighbor { node: NodeId, peer: NodeId },

    #[error("node {node}: report received on non-branch edge from {from}")]
    ReportOnNonBranch { node: NodeId, from: NodeId },

    #[error("node {node}: report count underflow")]
    FindCountUnderflow { node: NodeId },

    #[error("node {node}: fragment name missing at level {level}")]
    MissingFragment { node: NodeId, level: u32 },

    #[error("node {node}: change-root with no best edge recorded")]
    NoBestEdge { node: NodeId },

    #[error("node {node}: report wave finished with no inbound branch")]
    NoInBranch { node: NodeId },

    #[error("spanning tree incomplete: {found} edges collected for {nodes} nodes")]
    IncompleteTree { found: usize, nodes: u32 },

    #[error("collected edges contain a cycle; result is not a spanning tree")]
    NotSpanning,

    #[error("adopted edge {a}-{b} is not a branch on either endpoint")]
    AdoptedEdgeNotBranch { a: NodeId, b: NodeId },

    #[error("node {node}: edge to {peer} left unclassified opposite a branch")]
    DanglingBasic { node: NodeId, peer: NodeId },

    #[error("node {node}: probe still outstanding at termination")]
    UnfinishedProbe { node: NodeId },

    #[error("node {node}: {pending} child reports still outstanding at termination")]
    UnfinishedWave { node: NodeId, pending: u32 },
}

/// Invalid configuration value, naming the offending key.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failure of a full distributed run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("node task panicked: {0}")]
    NodePanicked(String),

    #[error("collector task panicked: {0}")]
    CollectorPanicked(String),
}
