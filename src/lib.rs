//! Distributed minimum spanning tree construction.
//!
//! Every vertex of a connected weighted graph runs as an independent
//! actor that knows only its incident edges and communicates solely by
//! asynchronous messages along them. Fragments of the eventual tree
//! grow by absorbing lower-level fragments and by symmetric merges
//! between equal-level ones, until a single fragment spans the graph
//! and one node reports halt.
//!
//! ```no_run
//! # async fn demo() -> Result<(), minspan::error::RunError> {
//! let topology = minspan::topology::complete(6)?;
//! let report = minspan::runtime::run(&topology).await?;
//! assert_eq!(report.tree.len(), 5);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod node;
pub mod protocol;
pub mod runtime;
pub mod topology;
pub mod transport;

// Re-exports for convenience.
pub use collector::{Collector, CollectorHandle, SpanningTree, TreeEdge};
pub use config::{OutputFormat, RunConfig, TopologyKind};
pub use error::{ProtocolError, RunError, TopologyError};
pub use node::{Node, NodeSnapshot, NodeStats};
pub use protocol::{EdgeStatus, Message, NodeState, Weight, INFINITY};
pub use runtime::{run, RunReport};
pub use topology::{NodeId, Topology};
