//! Weighted graph input.
//!
//! A [`Topology`] is the full edge list handed to the runtime: node
//! count plus a map from normalized undirected edge to weight. All
//! structural rules (no self-loops, strictly positive and globally
//! distinct weights, no duplicate edges) are enforced at insertion;
//! connectivity is checked by [`Topology::validate`] before a run.
//!
//! The named builders ([`linear`], [`complete`], [`grid`]) cover the
//! operator-facing layouts, and [`Topology::kruskal`] provides a
//! centralized reference answer for cross-checking distributed runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::protocol::Weight;

/// A unique identifier for a graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A connected weighted undirected graph.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: u32,
    edges: BTreeMap<(NodeId, NodeId), Weight>,
    weights: BTreeSet<Weight>,
}

impl Topology {
    /// An edgeless graph over `nodes` vertices.
    pub fn new(nodes: u32) -> Self {
        Topology {
            nodes,
            edges: BTreeMap::new(),
            weights: BTreeSet::new(),
        }
    }

    /// Build a topology from an edge list, enforcing all insertion rules.
    pub fn from_edges<I>(nodes: u32, edges: I) -> Result<Self, TopologyError>
    where
        I: IntoIterator<Item = (u32, u32, Weight)>,
    {
        let mut topology = Topology::new(nodes);
        for (a, b, weight) in edges {
            topology.add_edge(a, b, weight)?;
        }
        Ok(topology)
    }

    /// Insert the undirected edge `{a, b}`.
    pub fn add_edge(&mut self, a: u32, b: u32, weight: Weight) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLoop { node: a });
        }
        if a >= self.nodes || b >= self.nodes {
            return Err(TopologyError::EndpointOutOfRange {
                a,
                b,
                nodes: self.nodes,
            });
        }
        if weight == 0 {
            return Err(TopologyError::ZeroWeight { a, b });
        }
        if !self.weights.insert(weight) {
            return Err(TopologyError::DuplicateWeight { a, b, weight });
        }
        let key = ordered(NodeId(a), NodeId(b));
        if self.edges.insert(key, weight).is_some() {
            return Err(TopologyError::DuplicateEdge { a, b });
        }
        Ok(())
    }

    pub fn node_count(&self) -> u32 {
        self.nodes
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes).map(NodeId)
    }

    /// Edges in normalized `(low, high)` order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, Weight)> + '_ {
        self.edges.iter().map(|(&(a, b), &w)| (a, b, w))
    }

    /// Weight of `{a, b}`, if the edge exists.
    pub fn weight(&self, a: NodeId, b: NodeId) -> Option<Weight> {
        self.edges.get(&ordered(a, b)).copied()
    }

    /// The weighted neighbor map a single node is initialized with.
    pub fn neighbors(&self, id: NodeId) -> BTreeMap<NodeId, Weight> {
        let mut out = BTreeMap::new();
        for (&(a, b), &w) in &self.edges {
            if a == id {
                out.insert(b, w);
            } else if b == id {
                out.insert(a, w);
            }
        }
        out
    }

    /// Check the graph is non-empty and connected.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes == 0 {
            return Err(TopologyError::Empty);
        }
        let mut components = DisjointSet::new(self.nodes as usize);
        for (&(a, b), _) in &self.edges {
            components.union(a.index(), b.index());
        }
        let root = components.find(0);
        for node in 1..self.nodes {
            if components.find(node as usize) != root {
                return Err(TopologyError::Disconnected { node });
            }
        }
        Ok(())
    }

    /// Centralized minimum spanning tree, for cross-checking.
    ///
    /// Sorts edges by weight and unions greedily. With distinct weights
    /// the answer is unique, so any correct distributed run must
    /// produce exactly this edge set.
    pub fn kruskal(&self) -> Vec<(NodeId, NodeId, Weight)> {
        let mut edges: Vec<_> = self.edges().collect();
        edges.sort_by_key(|&(_, _, w)| w);

        let mut components = DisjointSet::new(self.nodes as usize);
        let mut tree = Vec::new();
        for (a, b, w) in edges {
            if components.union(a.index(), b.index()) {
                tree.push((a, b, w));
            }
        }
        tree
    }
}

#[inline]
pub(crate) fn ordered(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Union-find over vertex indices, used by the connectivity check, the
/// Kruskal reference, and the post-run audit.
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub(crate) fn new(len: usize) -> Self {
        DisjointSet {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression.
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    /// Merge the sets containing `x` and `y`; false if already joined.
    pub(crate) fn union(&mut self, x: usize, y: usize) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return false;
        }
        if self.rank[root_x] < self.rank[root_y] {
            self.parent[root_x] = root_y;
        } else if self.rank[root_x] > self.rank[root_y] {
            self.parent[root_y] = root_x;
        } else {
            self.parent[root_y] = root_x;
            self.rank[root_x] += 1;
        }
        true
    }
}

/// Path graph `0-1-...-(n-1)` with weights `1, 2, ...`.
pub fn linear(n: u32) -> Result<Topology, TopologyError> {
    Topology::from_edges(n, (0..n.saturating_sub(1)).map(|i| (i, i + 1, (i + 1) as Weight)))
}

/// Complete graph with weights assigned in lexicographic edge order.
pub fn complete(n: u32) -> Result<Topology, TopologyError> {
    let mut topology = Topology::new(n);
    let mut weight: Weight = 0;
    for a in 0..n {
        for b in (a + 1)..n {
            weight += 1;
            topology.add_edge(a, b, weight)?;
        }
    }
    Ok(topology)
}

/// Four-neighborhood grid over `n` nodes laid out row-major with
/// `ceil(sqrt(n))` columns, with a random distinct weight per edge.
///
/// Weights are a shuffled permutation of `1..=edge_count` drawn from a
/// seeded generator, so runs are reproducible given the seed.
pub fn grid(n: u32, seed: u64) -> Result<Topology, TopologyError> {
    let side = (n as f64).sqrt().ceil() as u32;
    let mut pairs = Vec::new();
    for node in 0..n {
        let col = node % side;
        if col + 1 < side && node + 1 < n {
            pairs.push((node, node + 1));
        }
        if node + side < n {
            pairs.push((node, node + side));
        }
    }

    let mut weights: Vec<Weight> = (1..=pairs.len() as Weight).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    weights.shuffle(&mut rng);

    Topology::from_edges(
        n,
        pairs
            .into_iter()
            .zip(weights)
            .map(|((a, b), w)| (a, b, w)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_rejects_self_loop() {
        let mut t = Topology::new(3);
        assert_eq!(
            t.add_edge(1, 1, 5),
            Err(TopologyError::SelfLoop { node: 1 })
        );
    }

    #[test]
    fn add_edge_rejects_out_of_range_endpoint() {
        let mut t = Topology::new(2);
        assert_eq!(
            t.add_edge(0, 7, 5),
            Err(TopologyError::EndpointOutOfRange { a: 0, b: 7, nodes: 2 })
        );
    }

    #[test]
    fn add_edge_rejects_zero_weight() {
        let mut t = Topology::new(2);
        assert_eq!(t.add_edge(0, 1, 0), Err(TopologyError::ZeroWeight { a: 0, b: 1 }));
    }

    #[test]
    fn add_edge_rejects_duplicate_weight() {
        let mut t = Topology::new(3);
        t.add_edge(0, 1, 5).expect("first edge");
        assert_eq!(
            t.add_edge(1, 2, 5),
            Err(TopologyError::DuplicateWeight { a: 1, b: 2, weight: 5 })
        );
    }

    #[test]
    fn add_edge_rejects_duplicate_edge() {
        let mut t = Topology::new(3);
        t.add_edge(0, 1, 5).expect("first edge");
        assert_eq!(
            t.add_edge(1, 0, 6),
            Err(TopologyError::DuplicateEdge { a: 1, b: 0 })
        );
    }

    #[test]
    fn validate_rejects_empty_graph() {
        assert_eq!(Topology::new(0).validate(), Err(TopologyError::Empty));
    }

    #[test]
    fn validate_rejects_disconnected_graph() {
        // Two components: {0,1} and {2,3}.
        let t = Topology::from_edges(4, [(0, 1, 1), (2, 3, 2)]).expect("edges");
        assert_eq!(t.validate(), Err(TopologyError::Disconnected { node: 2 }));
    }

    #[test]
    fn validate_accepts_single_node() {
        assert!(Topology::new(1).validate().is_ok());
    }

    #[test]
    fn neighbors_sees_both_directions() {
        let t = linear(3).expect("linear");
        let mid = t.neighbors(NodeId::new(1));
        assert_eq!(mid.len(), 2);
        assert_eq!(mid.get(&NodeId::new(0)), Some(&1));
        assert_eq!(mid.get(&NodeId::new(2)), Some(&2));
    }

    #[test]
    fn complete_assigns_lexicographic_weights() {
        let t = complete(4).expect("complete");
        assert_eq!(t.weight(NodeId::new(0), NodeId::new(1)), Some(1));
        assert_eq!(t.weight(NodeId::new(0), NodeId::new(3)), Some(3));
        assert_eq!(t.weight(NodeId::new(1), NodeId::new(2)), Some(4));
        assert_eq!(t.weight(NodeId::new(2), NodeId::new(3)), Some(6));
    }

    #[test]
    fn grid_three_by_three_has_twelve_edges() {
        let t = grid(9, 7).expect("grid");
        assert_eq!(t.edge_count(), 12);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn grid_is_reproducible_for_a_seed() {
        let a: Vec<_> = grid(9, 11).expect("grid").edges().collect();
        let b: Vec<_> = grid(9, 11).expect("grid").edges().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn grid_handles_non_square_counts() {
        for n in [2, 5, 7, 10, 12] {
            let t = grid(n, 3).expect("grid");
            assert!(t.validate().is_ok(), "grid({n}) should be connected");
        }
    }

    #[test]
    fn kruskal_on_a_path_keeps_every_edge() {
        let t = linear(4).expect("linear");
        let tree = t.kruskal();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.iter().map(|&(_, _, w)| w).sum::<Weight>(), 6);
    }

    #[test]
    fn kruskal_on_k4_picks_the_star_at_node_zero() {
        let t = complete(4).expect("complete");
        let tree = t.kruskal();
        assert_eq!(tree.len(), 3);
        assert!(tree
            .iter()
            .all(|&(a, _, _)| a == NodeId::new(0)));
        assert_eq!(tree.iter().map(|&(_, _, w)| w).sum::<Weight>(), 6);
    }
}
