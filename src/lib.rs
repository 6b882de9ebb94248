#![forbid(unsafe_code)]

//! Isonet is a crate for heuristic graph isomorphism testing over labeled adjacency lists.
//!
//! Instead of backtracking over vertex permutations, Isonet roots a layered breadth-first expansion (a [`Network`]) at each vertex
//! and reduces it to a [`Derivative`], a per-layer degree fingerprint that does not depend on vertex labels.
//! Vertices of two graphs with equal derivatives are structurally indistinguishable at the examined depth, which gives every vertex
//! of the first graph a set of candidate images in the second (its [`Orbits`] entry).
//! A [`Witness`] bijection is then assembled from the orbits by seeded random choice and neighbor-by-neighbor propagation.
//!
//! This trades completeness for speed: equal derivatives do not prove isomorphism, and a failed search does not prove its absence.
//! Callers who need a certificate should check the witness with [`Witness::preserves_edges`].
//!
//! ```
//! use isonet::{Graph, GraphPair};
//! use rand::SeedableRng;
//!
//! let square: Graph<String> = Graph::from_edges(vec![("a", "b"), ("b", "c"), ("c", "d"), ("d", "a")].into_iter()
//!     .map(|(a, b)| (a.to_string(), b.to_string())));
//! let pair = GraphPair::mirrored(square);
//! assert!(pair.test_isomorphism(2));
//!
//! let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(7);
//! let witness = pair.find_isomorphism(2, &mut rng).unwrap();
//! assert!(witness.preserves_edges(&pair));
//! ```

use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::hash::Hash;

use indexmap::IndexMap;
use thiserror::Error;

mod derivative;
mod network;
mod pair;
mod witness;
pub mod random;

pub use derivative::Derivative;
pub use network::{EdgeSet, Layer, Network, ParseTraversalError, Traversal};
pub use pair::{GraphPair, Orbits, SearchOptions};
pub use witness::Witness;

/// Trait for anything usable as a vertex label.
///
/// This is implemented automatically for every type meeting the bounds.
/// [`Ord`] is required so that candidate sets iterate in a label-determined order, which keeps seeded searches reproducible;
/// [`Send`] and [`Sync`] allow orbit evaluation to fan out over threads.
pub trait Vertex: Clone + Ord + Hash + Debug + Send + Sync {}
impl<T: Clone + Ord + Hash + Debug + Send + Sync> Vertex for T {}

/// Vertex labels which can be relabeled into a disjoint copy of themselves.
///
/// This is what allows [`GraphPair::mirrored`] to pair a graph with a relabeled copy of itself for automorphism search.
pub trait Mirror: Vertex {
    /// Returns the label this vertex takes in the mirrored copy.
    fn mirrored(&self) -> Self;
}
impl Mirror for String {
    fn mirrored(&self) -> String { format!("{}~", self) }
}
/// Tagged labels: the flag is flipped, so a graph labeled `(v, false)` mirrors into `(v, true)`.
/// This is how non-string labels (such as integers) get a disjoint copy.
impl<T: Vertex> Mirror for (T, bool) {
    fn mirrored(&self) -> Self { (self.0.clone(), !self.1) }
}

/// Error type for adding an edge to a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphEdgeError {
    /// One of the endpoints is not a vertex of the graph.
    #[error("edge endpoint is not a vertex of the graph")]
    UnknownVertex,
}

/// Error type for relabeling a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelabelError {
    /// Some vertex (or neighbor entry) had no new label.
    #[error("relabeling does not cover every vertex")]
    Unmapped,
    /// Two vertices were given the same new label.
    #[error("relabeling maps two vertices to the same label")]
    NotInjective,
}

/// Error type for the isomorphism search.
///
/// None of these are fatal; they are ordinary results describing why no witness was produced.
/// Note that a shallow search depth can both merge and separate vertices incorrectly, which is not detected here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsoError<V> {
    /// The graphs have different numbers of vertices.
    #[error("graphs differ in order ({left} vs {right} vertices)")]
    SizeMismatch {
        /// Order of the first graph.
        left: usize,
        /// Order of the second graph.
        right: usize,
    },
    /// A vertex of the first graph matched nothing in the second graph.
    #[error("vertex {0:?} has no structurally compatible counterpart")]
    NoCandidate(V),
    /// The orbits handed to the witness builder do not describe the graph pair.
    #[error("inconsistent orbits: {0}")]
    InconsistentOrbit(String),
    /// Propagation ran out of consistent images for a vertex.
    #[error("no consistent image left for vertex {0:?}")]
    UnresolvedVertex(V),
}

/// A graph stored as an adjacency list per vertex.
///
/// Vertices are kept in insertion order, and each vertex has an ordered list of neighbors.
/// Duplicate neighbor entries (multi-edges) and a vertex listing itself (loops) are both allowed and count toward the degree.
/// Nothing requires the lists to be symmetric, so directed graphs are representable, but the undirected constructors keep them symmetric.
///
/// This type implements [`Eq`] to test equivalence as a labeled graph with ordered neighbor lists (not isomorphic equivalence).
/// To compare adjacency as sets, use [`Self::same_adjacency`].
#[derive(PartialEq, Eq, Clone)]
pub struct Graph<V: Vertex>(IndexMap<V, Vec<V>>);
impl<V: Vertex> Graph<V> {
    /// Returns a new, empty graph.
    pub fn new() -> Self { Self(IndexMap::new()) }
    /// Returns a graph with the given vertices and no edges.
    pub fn with_vertices(vertices: impl IntoIterator<Item = V>) -> Self {
        Self(vertices.into_iter().map(|v| (v, vec![])).collect())
    }
    /// Builds an undirected graph from a list of edges, adding vertices in order of first appearance.
    pub fn from_edges(edges: impl IntoIterator<Item = (V, V)>) -> Self {
        let mut g = Self::new();
        for (a, b) in edges {
            g.add_vertex(a.clone());
            g.add_vertex(b.clone());
            g.0[&a].push(b.clone());
            if a != b { g.0[&b].push(a); }
        }
        g
    }

    /// Returns the graph order, the number of vertices.
    pub fn order(&self) -> usize { self.0.len() }
    /// Checks if this is an empty graph (no vertices).
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    /// Checks if the given vertex is in the graph.
    pub fn contains(&self, vert: &V) -> bool { self.0.contains_key(vert) }

    /// Adds a new (disconnected) vertex to the graph.
    /// Returns `false` (and does nothing) if the vertex already existed.
    pub fn add_vertex(&mut self, vert: V) -> bool {
        if self.0.contains_key(&vert) { return false; }
        self.0.insert(vert, vec![]);
        true
    }
    /// Adds a directed edge `a -> b`.
    /// Note that this will create a duplicate (multi) edge if such an edge already existed.
    pub fn add_directed_edge(&mut self, a: &V, b: &V) -> Result<(), GraphEdgeError> {
        if !self.contains(b) { return Err(GraphEdgeError::UnknownVertex); }
        self.0.get_mut(a).ok_or(GraphEdgeError::UnknownVertex)?.push(b.clone());
        Ok(())
    }
    /// Adds an undirected edge `a <-> b`.
    /// If `a != b`, this is equivalent to creating two directed edges.
    /// If `a == b`, this is equivalent to creating one directed edge.
    pub fn add_undirected_edge(&mut self, a: &V, b: &V) -> Result<(), GraphEdgeError> {
        if !self.contains(a) { return Err(GraphEdgeError::UnknownVertex); }
        if a != b { self.add_directed_edge(b, a)?; }
        self.add_directed_edge(a, b)
    }

    /// Gets the neighbor list of a vertex, or `None` if it is not in the graph.
    pub fn neighbors(&self, vert: &V) -> Option<&[V]> { self.0.get(vert).map(Vec::as_slice) }
    /// Gets the degree (length of the neighbor list) of a vertex, or `None` if it is not in the graph.
    pub fn degree(&self, vert: &V) -> Option<usize> { self.0.get(vert).map(Vec::len) }
    /// Iterates through all the vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> { self.0.keys() }
    /// Iterates through all the vertices in insertion order, along with their neighbor lists.
    pub fn adjacencies(&self) -> impl Iterator<Item = (&V, &[V])> { self.0.iter().map(|(v, n)| (v, n.as_slice())) }
    /// Returns the first inserted vertex, if any.
    pub fn first_vertex(&self) -> Option<&V> { self.0.keys().next() }
    /// Returns the vertex at the given insertion index.
    pub fn vertex(&self, index: usize) -> Option<&V> { self.0.get_index(index).map(|(v, _)| v) }
    /// Returns the insertion index of a vertex.
    pub fn index_of(&self, vert: &V) -> Option<usize> { self.0.get_index_of(vert) }

    /// Returns the sorted list of vertex degrees.
    pub fn degree_sequence(&self) -> Vec<usize> {
        let mut res: Vec<_> = self.0.values().map(Vec::len).collect();
        res.sort_unstable();
        res
    }

    /// Returns a copy of this graph with every label (keys and neighbor entries) passed through `rename`.
    /// Vertex order and neighbor order are preserved.
    /// Fails if `rename` returns `None` for some label, or if two vertices receive the same label.
    pub fn relabel(&self, mut rename: impl FnMut(&V) -> Option<V>) -> Result<Self, RelabelError> {
        let mut res = IndexMap::with_capacity(self.order());
        for (v, adj) in self.0.iter() {
            let key = rename(v).ok_or(RelabelError::Unmapped)?;
            let adj = adj.iter().map(|u| rename(u).ok_or(RelabelError::Unmapped)).collect::<Result<Vec<_>, _>>()?;
            if res.insert(key, adj).is_some() { return Err(RelabelError::NotInjective); }
        }
        Ok(Self(res))
    }

    /// Checks if both graphs have the same vertices and the same neighbor *sets*.
    /// Unlike [`Eq`], this ignores vertex order, neighbor order, and duplicate neighbor entries.
    pub fn same_adjacency(&self, other: &Self) -> bool {
        if self.order() != other.order() { return false; }
        self.0.iter().all(|(v, adj)| match other.0.get(v) {
            Some(other_adj) => adj.iter().collect::<BTreeSet<_>>() == other_adj.iter().collect::<BTreeSet<_>>(),
            None => false,
        })
    }
}
impl<V: Vertex> Default for Graph<V> {
    fn default() -> Self {
        Self::new()
    }
}
impl<V: Vertex> FromIterator<(V, Vec<V>)> for Graph<V> {
    /// Collects adjacency lists; a repeated vertex keeps its first position and the last list given.
    fn from_iter<I: IntoIterator<Item = (V, Vec<V>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl<V: Vertex> Debug for Graph<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut adj = self.0.iter();
        match adj.next() {
            None => write!(f, "{{}}"),
            Some((v, n)) => {
                write!(f, "{{{:?}: {:?}", v, n)?;
                for (v, n) in adj {
                    write!(f, ", {:?}: {:?}", v, n)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn labeled(edges: &[(&str, &str)]) -> Graph<String> {
    Graph::from_edges(edges.iter().map(|&(a, b)| (a.to_string(), b.to_string())))
}

#[test]
fn test_graph_building() {
    let mut g = Graph::with_vertices(0..4);
    assert_eq!(g.order(), 4);
    assert!(!g.is_empty());
    assert!(Graph::<usize>::new().is_empty());
    assert!(!g.add_vertex(2));
    assert!(g.add_vertex(7));
    for &(a, b) in &[(0, 1), (1, 2), (2, 3), (3, 0)] {
        g.add_undirected_edge(&a, &b).unwrap();
    }
    g.add_undirected_edge(&7, &7).unwrap();
    assert_eq!(g.neighbors(&0).unwrap(), &[1, 3]);
    assert_eq!(g.neighbors(&7).unwrap(), &[7]);
    assert_eq!(g.degree(&1), Some(2));
    assert_eq!(g.degree(&9), None);
    assert_eq!(g.add_undirected_edge(&0, &9), Err(GraphEdgeError::UnknownVertex));
    assert_eq!(g.add_directed_edge(&9, &0), Err(GraphEdgeError::UnknownVertex));
    assert_eq!(g.degree_sequence(), vec![1, 2, 2, 2, 2]);
    assert_eq!(g.first_vertex(), Some(&0));
    assert_eq!(g.vertex(4), Some(&7));
    assert_eq!(g.index_of(&3), Some(3));

    let h = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    assert_eq!(h.vertices().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_eq!(h.neighbors(&1).unwrap(), &[0, 2]);
    assert_eq!(format!("{:?}", Graph::from_edges(vec![(0, 1)])), "{0: [1], 1: [0]}");
}
#[test]
fn test_relabel() {
    let g = Graph::from_edges(vec![(0, 1), (1, 2), (2, 0), (2, 3)]);
    let shifted = g.relabel(|v| Some((v + 1) % 4)).unwrap();
    assert_eq!(shifted.neighbors(&3).unwrap(), &[2, 1, 0]);
    assert_eq!(shifted.degree_sequence(), g.degree_sequence());
    assert_eq!(g.relabel(|v| if *v == 3 { None } else { Some(*v) }), Err(RelabelError::Unmapped));
    assert_eq!(g.relabel(|v| Some(v / 2)), Err(RelabelError::NotInjective));
}
#[test]
fn test_same_adjacency() {
    let a = labeled(&[("a", "b"), ("b", "c")]);
    let mut b: Graph<String> = vec![
        ("c".to_string(), vec!["b".to_string()]),
        ("b".to_string(), vec!["c".to_string(), "a".to_string(), "a".to_string()]),
        ("a".to_string(), vec!["b".to_string()]),
    ].into_iter().collect();
    assert_ne!(a, b);
    assert!(a.same_adjacency(&b));
    b.add_vertex("d".to_string());
    assert!(!a.same_adjacency(&b));
    assert!(!a.same_adjacency(&labeled(&[("a", "b"), ("a", "c")])));
}
#[test]
fn test_mirror() {
    let g = labeled(&[("a", "b")]);
    let m = g.relabel(|v| Some(v.mirrored())).unwrap();
    assert_eq!(m.neighbors(&"a~".to_string()).unwrap(), &["b~".to_string()]);
    assert!(!m.contains(&"a".to_string()));

    let g = Graph::from_edges(vec![((0, false), (1, false))]);
    let m = g.relabel(|v| Some(v.mirrored())).unwrap();
    assert_eq!(m.neighbors(&(0, true)).unwrap(), &[(1, true)]);
    assert_eq!((3, true).mirrored(), (3, false));
}
