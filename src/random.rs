//! Random inputs for exercising the search: Erdős–Rényi graphs and uniformly random relabelings.

use indexmap::IndexMap;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{Graph, RelabelError, Vertex};

/// Generates a random undirected graph on vertices `v0..v{n-1}`, with every edge present independently with probability `p`.
///
/// Every vertex is present, including isolated ones, and the adjacency lists are symmetric without loops.
///
/// # Panics
/// Panics if `p` is not in `[0, 1]`.
pub fn random_graph<R: Rng + ?Sized>(n: usize, p: f64, rng: &mut R) -> Graph<String> {
    assert!((0.0..=1.0).contains(&p), "edge probability {} is not in [0, 1]", p);
    let labels: Vec<String> = (0..n).map(|i| format!("v{}", i)).collect();
    let mut adj = vec![vec![]; n];
    for (i, j) in (0..n).tuple_combinations() {
        if rng.random_bool(p) {
            adj[i].push(labels[j].clone());
            adj[j].push(labels[i].clone());
        }
    }
    labels.into_iter().zip(adj).collect()
}

/// Relabels a graph by a uniformly random permutation of its vertices.
/// Returns the relabeled graph and the mapping used (old label to new label).
///
/// Fails with [`RelabelError::Unmapped`] if some neighbor entry is not itself a vertex of the graph.
pub fn random_relabeling<V: Vertex, R: Rng + ?Sized>(graph: &Graph<V>, rng: &mut R) -> Result<(Graph<V>, IndexMap<V, V>), RelabelError> {
    let mut targets: Vec<V> = graph.vertices().cloned().collect();
    targets.shuffle(rng);
    let mapping: IndexMap<V, V> = graph.vertices().cloned().zip(targets).collect();
    let permuted = graph.relabel(|v| mapping.get(v).cloned())?;
    Ok((permuted, mapping))
}

#[cfg(test)]
use rand::SeedableRng;

#[test]
fn test_random_graph() {
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(1);
    let g = random_graph(12, 0.4, &mut rng);
    assert_eq!(g.order(), 12);
    assert_eq!(g.first_vertex(), Some(&"v0".to_string()));
    for (v, adj) in g.adjacencies() {
        assert!(!adj.contains(v));
        for u in adj {
            assert!(g.neighbors(u).unwrap().contains(v));
        }
    }
    assert_eq!(random_graph(6, 0.0, &mut rng).degree_sequence(), vec![0; 6]);
    assert_eq!(random_graph(6, 1.0, &mut rng).degree_sequence(), vec![5; 6]);
    assert!(random_graph(0, 0.5, &mut rng).is_empty());

    let again = random_graph(12, 0.4, &mut rand_pcg::Pcg64Mcg::seed_from_u64(1));
    assert_eq!(g, again);
}
#[test]
fn test_random_relabeling() {
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(5);
    let g = random_graph(10, 0.5, &mut rng);
    let (h, mapping) = random_relabeling(&g, &mut rng).unwrap();
    assert_eq!(mapping.len(), 10);
    assert_eq!(h.degree_sequence(), g.degree_sequence());
    for (v, adj) in g.adjacencies() {
        let expected: Vec<String> = adj.iter().map(|u| mapping[u].clone()).collect();
        assert_eq!(h.neighbors(&mapping[v]).unwrap(), expected.as_slice());
    }

    let dangling: Graph<usize> = vec![(0, vec![1])].into_iter().collect();
    assert_eq!(random_relabeling(&dangling, &mut rng).map(|_| ()), Err(RelabelError::Unmapped));
}
