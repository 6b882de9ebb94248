//! Per-layer structural fingerprints of a network.

use itertools::Itertools;

use crate::{Network, Vertex};

/// The structural fingerprint of a [`Network`].
///
/// Entry `k` describes how layer `k` feeds into layer `k + 1`: for every vertex of layer `k` that reaches at least one vertex
/// which is itself expanded at depth `k + 1`, it records the pair `(out-degree at k, sorted out-degrees of those successors)`.
/// The pairs within a layer are sorted, so labels and layer-internal order are irrelevant, but the order of the layers is not.
/// Two derivatives are equal only if they agree layer by layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Derivative(Vec<Vec<(usize, Vec<usize>)>>);
impl Derivative {
    /// Computes the derivative of a network.
    pub fn of<V: Vertex>(network: &Network<V>) -> Self {
        Self(network.layers().iter().tuple_windows().map(|(current, next)| {
            let mut layer: Vec<_> = current.values().filter_map(|values| {
                let mut num: Vec<usize> = values.iter().filter_map(|j| next.get(j).map(Vec::len)).collect();
                if num.is_empty() { return None; }
                num.sort_unstable();
                Some((values.len(), num))
            }).collect();
            layer.sort();
            layer
        }).collect())
    }
    /// Returns the number of layer fingerprints (one less than the network depth).
    pub fn depth(&self) -> usize { self.0.len() }
    /// Returns the per-layer fingerprints.
    pub fn layers(&self) -> &[Vec<(usize, Vec<usize>)>] { &self.0 }
}

#[cfg(test)]
use crate::{labeled, Graph, Traversal};

#[test]
fn test_star_derivative() {
    let star = labeled(&[("h", "a"), ("h", "b"), ("h", "c")]);
    let d = Network::one_way(&star, &"h".to_string(), None, &[]).derive();
    assert_eq!(d.layers(), &[vec![(3, vec![0, 0, 0])], vec![]]);
    assert_eq!(d.depth(), 2);

    let d = Network::cycle_aware(&star, &"a".to_string(), None).derive();
    assert_eq!(d.layers(), &[vec![(1, vec![2])]]);

    assert_eq!(Derivative::of(&Network::<usize>::default()), Derivative::default());
}
#[test]
fn test_derivative_order() {
    let path = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3)]);
    let end = Network::cycle_aware(&path, &0, None).derive();
    let inner = Network::cycle_aware(&path, &1, None).derive();
    assert_ne!(end, inner);
    assert_eq!(end, Network::cycle_aware(&path, &3, None).derive());
    assert_eq!(inner, Network::cycle_aware(&path, &2, None).derive());

    // a triangle and a square look alike from any vertex: this is a heuristic fingerprint
    let tri = Graph::from_edges(vec![(0, 1), (1, 2), (2, 0)]);
    let square = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    assert_eq!(Network::cycle_aware(&tri, &0, None).derive(), Network::cycle_aware(&square, &0, None).derive());
}
#[test]
fn test_relabel_invariance() {
    use rand::SeedableRng;
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(0x5eed);
    for _ in 0..8 {
        let g = crate::random::random_graph(10, 0.35, &mut rng);
        let (h, mapping) = crate::random::random_relabeling(&g, &mut rng).unwrap();
        for v in g.vertices() {
            let w = &mapping[v];
            assert_eq!(Network::one_way(&g, v, None, &[]).derive(), Network::one_way(&h, w, None, &[]).derive());
            for &t in &[Traversal::CycleAware, Traversal::ReversalAware] {
                assert_eq!(t.build(&g, v, None).derive(), t.build(&h, w, None).derive());
            }
        }
    }
}
