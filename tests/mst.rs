//! End-to-end runs over the named and randomized topologies, checked
//! against the centralized Kruskal reference.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use minspan::protocol::{EdgeStatus, NodeState, INFINITY};
use minspan::topology::{self, NodeId, Topology};
use minspan::{runtime, SpanningTree};

fn edge_set(tree: &SpanningTree) -> BTreeSet<(u32, u32, u64)> {
    tree.edges()
        .iter()
        .map(|e| (e.a.raw(), e.b.raw(), e.weight))
        .collect()
}

fn kruskal_set(topology: &Topology) -> BTreeSet<(u32, u32, u64)> {
    topology
        .kruskal()
        .into_iter()
        .map(|(a, b, w)| (a.raw(), b.raw(), w))
        .collect()
}

#[tokio::test]
async fn linear_four_nodes_keeps_every_edge() {
    let topology = topology::linear(4).expect("linear");
    let report = runtime::run(&topology).await.expect("run");

    assert_eq!(
        edge_set(&report.tree),
        BTreeSet::from([(0, 1, 1), (1, 2, 2), (2, 3, 3)])
    );
    assert_eq!(report.tree.total_weight(), 6);

    // Every tree edge ends classified as a branch on both sides.
    for edge in report.tree.edges() {
        for (node, peer) in [(edge.a, edge.b), (edge.b, edge.a)] {
            let snapshot = report.nodes.get(&node).expect("snapshot");
            assert_eq!(
                snapshot.status.get(&peer),
                Some(&EdgeStatus::Branch),
                "{node} should hold a branch toward {peer}"
            );
        }
    }
}

#[tokio::test]
async fn complete_four_nodes_picks_the_cheap_star() {
    let topology = topology::complete(4).expect("complete");
    let report = runtime::run(&topology).await.expect("run");

    assert_eq!(
        edge_set(&report.tree),
        BTreeSet::from([(0, 1, 1), (0, 2, 2), (0, 3, 3)])
    );
    assert_eq!(report.tree.total_weight(), 6);
}

#[tokio::test]
async fn complete_four_nodes_with_reversed_weights() {
    let topology = Topology::from_edges(
        4,
        [
            (0, 1, 6),
            (0, 2, 5),
            (0, 3, 4),
            (1, 2, 3),
            (1, 3, 2),
            (2, 3, 1),
        ],
    )
    .expect("edges");
    let report = runtime::run(&topology).await.expect("run");

    assert_eq!(
        edge_set(&report.tree),
        BTreeSet::from([(2, 3, 1), (1, 3, 2), (0, 3, 4)])
    );
    assert_eq!(edge_set(&report.tree), kruskal_set(&topology));
}

#[tokio::test]
async fn grid_three_by_three_matches_the_reference() {
    let topology = topology::grid(9, 5).expect("grid");
    assert_eq!(topology.edge_count(), 12);

    let report = runtime::run(&topology).await.expect("run");
    assert_eq!(report.tree.len(), 8);
    assert_eq!(edge_set(&report.tree), kruskal_set(&topology));
}

#[tokio::test]
async fn two_nodes_adopt_their_single_edge() {
    let topology = Topology::from_edges(2, [(0, 1, 42)]).expect("edges");
    let report = runtime::run(&topology).await.expect("run");

    assert_eq!(edge_set(&report.tree), BTreeSet::from([(0, 1, 42)]));
    for snapshot in report.nodes.values() {
        assert_eq!(snapshot.state, NodeState::Found);
        assert_eq!(snapshot.best_weight, INFINITY);
    }
}

#[tokio::test]
async fn star_spokes_all_join_one_fragment() {
    let topology = Topology::from_edges(
        6,
        (1..=5u32).map(|leaf| (0, leaf, 9 + leaf as u64)),
    )
    .expect("edges");
    let report = runtime::run(&topology).await.expect("run");

    assert_eq!(
        edge_set(&report.tree),
        BTreeSet::from([
            (0, 1, 10),
            (0, 2, 11),
            (0, 3, 12),
            (0, 4, 13),
            (0, 5, 14),
        ])
    );

    // The only symmetric merge crosses the cheapest spoke, so every
    // node ends up agreeing on that weight as the fragment name.
    for snapshot in report.nodes.values() {
        assert_eq!(snapshot.fragment, Some(10));
        assert_eq!(snapshot.level, 1);
        assert_eq!(snapshot.state, NodeState::Found);
    }
}

#[tokio::test]
async fn repeated_runs_agree_on_the_tree() {
    let topology = topology::complete(6).expect("complete");
    let first = runtime::run(&topology).await.expect("first run");
    let second = runtime::run(&topology).await.expect("second run");
    assert_eq!(edge_set(&first.tree), edge_set(&second.tree));
}

#[tokio::test]
async fn relabeling_nodes_relabels_the_tree() {
    let topology = topology::complete(5).expect("complete");
    let baseline = runtime::run(&topology).await.expect("baseline run");

    // Rotate every identifier by two and rebuild the same graph.
    let n = topology.node_count();
    let relabel = |id: u32| (id + 2) % n;
    let permuted = Topology::from_edges(
        n,
        topology
            .edges()
            .map(|(a, b, w)| (relabel(a.raw()), relabel(b.raw()), w)),
    )
    .expect("permuted edges");
    let report = runtime::run(&permuted).await.expect("permuted run");

    let mapped_back: BTreeSet<(u32, u32, u64)> = report
        .tree
        .edges()
        .iter()
        .map(|e| {
            let a = (e.a.raw() + n - 2) % n;
            let b = (e.b.raw() + n - 2) % n;
            (a.min(b), a.max(b), e.weight)
        })
        .collect();
    assert_eq!(mapped_back, edge_set(&baseline.tree));
}

/// Random spanning tree plus extra chords, with a shuffled weight
/// permutation so weights stay distinct.
fn random_connected(n: u32, extra: usize, rng: &mut StdRng) -> Topology {
    let mut pairs: BTreeSet<(u32, u32)> = BTreeSet::new();
    for node in 1..n {
        let parent = rng.gen_range(0..node);
        pairs.insert((parent, node));
    }
    for _ in 0..extra * 4 {
        if pairs.len() >= (n as usize * (n as usize - 1)) / 2 {
            break;
        }
        let a = rng.gen_range(0..n);
        let b = rng.gen_range(0..n);
        if a != b {
            pairs.insert((a.min(b), a.max(b)));
        }
    }

    let mut weights: Vec<u64> = (1..=pairs.len() as u64).collect();
    weights.shuffle(rng);
    Topology::from_edges(
        n,
        pairs.into_iter().zip(weights).map(|((a, b), w)| (a, b, w)),
    )
    .expect("random edges")
}

#[tokio::test]
async fn random_graphs_match_the_kruskal_reference() {
    for seed in 0..12u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = rng.gen_range(2..=12);
        let extra = rng.gen_range(0..=10);
        let topology = random_connected(n, extra, &mut rng);

        let report = runtime::run(&topology).await.expect("run");
        assert_eq!(
            edge_set(&report.tree),
            kruskal_set(&topology),
            "seed {seed} diverged from the reference"
        );

        // Nothing may be left outstanding once halt was observed.
        for snapshot in report.nodes.values() {
            assert_eq!(snapshot.test_edge, None);
            assert_eq!(snapshot.find_count, 0);
        }
    }
}

#[tokio::test]
async fn adopted_edges_are_incident_and_branch_somewhere() {
    let topology = topology::grid(12, 3).expect("grid");
    let report = runtime::run(&topology).await.expect("run");

    let snapshots: &BTreeMap<NodeId, _> = &report.nodes;
    for edge in report.tree.edges() {
        assert_eq!(topology.weight(edge.a, edge.b), Some(edge.weight));
        let branch = |node: NodeId, peer: NodeId| {
            snapshots
                .get(&node)
                .map(|s: &minspan::NodeSnapshot| s.status.get(&peer) == Some(&EdgeStatus::Branch))
                .unwrap_or(false)
        };
        assert!(branch(edge.a, edge.b) || branch(edge.b, edge.a));
    }
}
