//! Layered breadth-first expansions ("networks") rooted at a vertex.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::str::FromStr;

use indexmap::IndexMap;
use log::trace;
use thiserror::Error;

use crate::{Derivative, Graph, Vertex};

/// One depth of a [`Network`]: each frontier vertex mapped to the neighbors it expands into.
pub type Layer<V> = IndexMap<V, Vec<V>>;

/// An ordered sequence of [`Layer`]s, one per breadth-first depth.
///
/// The keys of layer `k` are the (distinct) vertices discovered at depth `k`, and the values are the neighbors each one reaches at depth `k + 1`.
/// Which neighbors are kept depends on the [`Traversal`] that built the network.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct Network<V: Vertex>(Vec<Layer<V>>);
impl<V: Vertex> Network<V> {
    /// Returns the number of layers.
    pub fn depth(&self) -> usize { self.0.len() }
    /// Checks if the network has no layers.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    /// Gets the layer at the given depth.
    pub fn layer(&self, depth: usize) -> Option<&Layer<V>> { self.0.get(depth) }
    /// Returns all the layers, shallowest first.
    pub fn layers(&self) -> &[Layer<V>] { &self.0 }
    /// Computes the [`Derivative`] (structural fingerprint) of this network.
    pub fn derive(&self) -> Derivative { Derivative::of(self) }

    /// Plain breadth-first layering rooted at `start`.
    ///
    /// The frontier at depth 0 is just `start`; frontier vertices which are not in the graph are dropped.
    /// Each layer maps a frontier vertex to its neighbor list minus anything in `exclude`,
    /// and the next frontier is every value of the layer concatenated (not deduplicated, though repeated frontier entries collapse into one key).
    /// `start` itself is excluded too, so the layering never walks back into its root, unless `start` has a loop.
    /// Always produces exactly `max_depth` layers, which defaults to `order - 1`.
    pub fn one_way(graph: &Graph<V>, start: &V, max_depth: Option<usize>, exclude: &[V]) -> Self {
        let depth = max_depth.unwrap_or_else(|| full_depth(graph));
        let looped = graph.neighbors(start).map_or(false, |n| n.contains(start));
        let blocked = |v: &V| exclude.contains(v) || (!looped && v == start);

        let mut layers = Vec::with_capacity(depth);
        let mut frontier = vec![start.clone()];
        for _ in 0..depth {
            let mut layer = Layer::new();
            for v in frontier.iter() {
                if layer.contains_key(v) { continue }
                if let Some(adj) = graph.neighbors(v) {
                    layer.insert(v.clone(), adj.iter().filter(|u| !blocked(*u)).cloned().collect());
                }
            }
            frontier = layer.values().flatten().cloned().collect();
            layers.push(layer);
        }
        Self(layers)
    }

    /// Layering describing how the two fixed vertices `u` and `v` connect to each other.
    ///
    /// The first half expands forward from `u` and the second half is an expansion from `v`, reversed and with its edges flipped,
    /// so that the whole network reads as paths leading from `u` toward `v`.
    /// Each half excludes the other endpoint (and, through [`Self::one_way`], its own root), so traversal never passes back through either of them.
    pub fn two_way(graph: &Graph<V>, u: &V, v: &V) -> Self {
        let depth = full_depth(graph);
        let half = (depth + 1) / 2;
        let back = if half % 2 == 0 { half } else { half - 1 };
        let mut layers = Self::one_way(graph, u, Some(half), &[v.clone()]).0;
        for layer in Self::one_way(graph, v, Some(back), &[u.clone()]).0.into_iter().rev() {
            let mut flipped = Layer::new();
            for (key, values) in layer {
                for value in values {
                    flipped.entry(value).or_insert_with(Vec::new).push(key.clone());
                }
            }
            layers.push(flipped);
        }
        Self(layers)
    }

    /// Breadth-first layering which never walks an (undirected) edge twice.
    ///
    /// An edge is kept in a layer only if it was not traversed by any shallower layer, so a parent edge is never rediscovered as a forward edge.
    /// Edges first seen at the same depth from both ends are kept on both sides.
    /// Frontier vertices left with nothing to expand are dropped from their layer.
    /// Stops at the first depth which traverses no new edge, or after `max_depth` layers (default `order - 1`).
    pub fn cycle_aware(graph: &Graph<V>, start: &V, max_depth: Option<usize>) -> Self {
        let depth = max_depth.unwrap_or_else(|| full_depth(graph));
        let mut seen = EdgeSet::new();
        let mut layers = vec![];
        let mut frontier = vec![start.clone()];
        for _ in 0..depth {
            let mut layer = Layer::new();
            let mut fresh = EdgeSet::new();
            for key in frontier.iter() {
                if layer.contains_key(key) { continue }
                let adj = match graph.neighbors(key) { Some(x) => x, None => continue };
                let values: Vec<V> = adj.iter().filter(|v| !seen.contains(key, v)).cloned().collect();
                for value in values.iter() { fresh.insert(key, value); }
                if !values.is_empty() { layer.insert(key.clone(), values); }
            }
            if !seen.absorb(fresh) { break } // fixed point: no new edges
            frontier = layer.values().flatten().cloned().collect();
            layers.push(layer);
        }
        trace!("cycle-aware network from {:?} has {} layers", start, layers.len());
        Self(layers)
    }

    /// Breadth-first layering which also refuses to walk back up the network built so far.
    ///
    /// Like [`Self::cycle_aware`], but edges are tracked by direction, and a neighbor is also skipped if it can already reach
    /// the frontier vertex through the edges of the shallower layers (found by walking those edges in reverse).
    /// On undirected graphs the two mostly agree; on directed adjacency this stops a directed cycle from being re-entered at its origin.
    /// Stops at the first empty layer, or after `max_depth` layers (default `order - 1`).
    pub fn reversal_aware(graph: &Graph<V>, start: &V, max_depth: Option<usize>) -> Self {
        let depth = max_depth.unwrap_or_else(|| full_depth(graph));
        let mut seen: HashSet<(V, V)> = HashSet::new();
        let mut inverse: HashMap<V, Vec<V>> = HashMap::new();
        let mut layers = vec![];
        let mut frontier = vec![start.clone()];
        for _ in 0..depth {
            let mut layer = Layer::new();
            for key in frontier.iter() {
                if layer.contains_key(key) { continue }
                let adj = match graph.neighbors(key) { Some(x) => x, None => continue };
                let above = ancestors(&inverse, key);
                let values: Vec<V> = adj.iter().filter(|v| !above.contains(*v) && !seen.contains(&(key.clone(), (*v).clone()))).cloned().collect();
                if !values.is_empty() { layer.insert(key.clone(), values); }
            }
            if layer.is_empty() { break }
            for (key, values) in layer.iter() {
                for value in values {
                    seen.insert((key.clone(), value.clone()));
                    inverse.entry(value.clone()).or_insert_with(Vec::new).push(key.clone());
                }
            }
            frontier = layer.values().flatten().cloned().collect();
            layers.push(layer);
        }
        trace!("reversal-aware network from {:?} has {} layers", start, layers.len());
        Self(layers)
    }
}
impl<V: Vertex> Debug for Network<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

fn full_depth<V: Vertex>(graph: &Graph<V>) -> usize { graph.order().saturating_sub(1) }

/// Every vertex which can reach `key` along the edges recorded in `inverse` (child -> parents).
fn ancestors<'a, V: Vertex>(inverse: &'a HashMap<V, Vec<V>>, key: &V) -> HashSet<&'a V> {
    let mut found = HashSet::new();
    let mut stack: Vec<&V> = inverse.get(key).into_iter().flatten().collect();
    while let Some(v) = stack.pop() {
        if found.insert(v) {
            stack.extend(inverse.get(v).into_iter().flatten());
        }
    }
    found
}

/// A set of undirected edges, keyed by the unordered vertex pair.
#[derive(Clone, Debug)]
pub struct EdgeSet<V: Vertex>(HashSet<(V, V)>);
impl<V: Vertex> EdgeSet<V> {
    /// Returns a new, empty edge set.
    pub fn new() -> Self { Self(HashSet::new()) }
    /// Returns the number of distinct edges.
    pub fn len(&self) -> usize { self.0.len() }
    /// Checks if the set has no edges.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    /// Checks if the edge `a -- b` (in either direction) is in the set.
    pub fn contains(&self, a: &V, b: &V) -> bool {
        let (x, y) = if a <= b { (a, b) } else { (b, a) };
        self.0.contains(&(x.clone(), y.clone()))
    }
    /// Adds the edge `a -- b`, returning `false` if it (or its reverse) was already present.
    pub fn insert(&mut self, a: &V, b: &V) -> bool {
        let key = if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
        self.0.insert(key)
    }
    /// Moves every edge of `other` into this set, returning `true` if anything new was added.
    pub fn absorb(&mut self, other: Self) -> bool {
        let before = self.len();
        self.0.extend(other.0);
        self.len() != before
    }
}
impl<V: Vertex> Default for EdgeSet<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// The traversal policy used to build the single-root networks compared during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Traversal {
    /// [`Network::one_way`] with no exclusions.
    OneWay,
    /// [`Network::cycle_aware`].
    #[default]
    CycleAware,
    /// [`Network::reversal_aware`].
    ReversalAware,
}
impl Traversal {
    /// Builds the network rooted at `start` under this policy.
    pub fn build<V: Vertex>(self, graph: &Graph<V>, start: &V, max_depth: Option<usize>) -> Network<V> {
        match self {
            Traversal::OneWay => Network::one_way(graph, start, max_depth, &[]),
            Traversal::CycleAware => Network::cycle_aware(graph, start, max_depth),
            Traversal::ReversalAware => Network::reversal_aware(graph, start, max_depth),
        }
    }
}

/// Error type for parsing a [`Traversal`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown traversal {0:?} (expected one-way, cycle-aware or reversal-aware)")]
pub struct ParseTraversalError(String);

impl FromStr for Traversal {
    type Err = ParseTraversalError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-way" => Ok(Traversal::OneWay),
            "cycle-aware" => Ok(Traversal::CycleAware),
            "reversal-aware" => Ok(Traversal::ReversalAware),
            _ => Err(ParseTraversalError(s.to_string())),
        }
    }
}

#[cfg(test)]
use crate::labeled;

#[cfg(test)]
fn keys<V: Vertex>(layer: &Layer<V>) -> Vec<V> { layer.keys().cloned().collect() }

#[test]
fn test_one_way() {
    let g = Graph::from_edges(vec![(0, 1), (0, 2), (0, 3)]);
    let net = Network::one_way(&g, &0, None, &[]);
    assert_eq!(net.depth(), 3);
    assert_eq!(net.layer(0).unwrap()[&0], vec![1, 2, 3]);
    assert_eq!(keys(net.layer(1).unwrap()), vec![1, 2, 3]);
    assert_eq!(net.layer(1).unwrap()[&2], Vec::<usize>::new()); // never back into the root
    assert!(net.layer(2).unwrap().is_empty());

    let square = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    let net = Network::one_way(&square, &0, None, &[]);
    assert_eq!(net.layer(1).unwrap()[&1], vec![2]);
    assert_eq!(net.layer(1).unwrap()[&3], vec![2]);
    assert_eq!(keys(net.layer(2).unwrap()), vec![2]); // repeated frontier entries collapse
    assert_eq!(net.layer(2).unwrap()[&2], vec![1, 3]);

    let net = Network::one_way(&g, &0, Some(2), &[0]);
    assert_eq!(net.depth(), 2);
    assert_eq!(net.layer(1).unwrap()[&3], Vec::<usize>::new());

    assert!(Network::one_way(&g, &0, Some(0), &[]).is_empty());
}
#[test]
fn test_one_way_loop_and_missing() {
    let mut g = Graph::with_vertices(vec!['a', 'b']);
    g.add_undirected_edge(&'a', &'a').unwrap();
    g.add_undirected_edge(&'a', &'b').unwrap();
    let net = Network::one_way(&g, &'a', Some(2), &[]);
    assert_eq!(net.layer(0).unwrap()[&'a'], vec!['a', 'b']); // a looped root stays reachable
    assert_eq!(net.layer(1).unwrap()[&'a'], vec!['a', 'b']);
    assert_eq!(net.layer(1).unwrap()[&'b'], vec!['a']);

    g.add_vertex('c');
    g.add_undirected_edge(&'b', &'c').unwrap();
    let net = Network::one_way(&g, &'b', Some(2), &[]);
    assert_eq!(net.layer(0).unwrap()[&'b'], vec!['a', 'c']);
    assert_eq!(net.layer(1).unwrap()[&'a'], vec!['a']);
    assert_eq!(net.layer(1).unwrap()[&'c'], Vec::<char>::new());

    let g: Graph<char> = vec![('a', vec!['b', 'x']), ('b', vec!['a'])].into_iter().collect();
    let net = Network::one_way(&g, &'a', Some(2), &[]);
    assert_eq!(keys(net.layer(1).unwrap()), vec!['b']);

    let net = Network::one_way(&g, &'x', Some(3), &[]);
    assert_eq!(net.depth(), 3);
    assert!(net.layers().iter().all(|l| l.is_empty()));
}
#[test]
fn test_two_way() {
    let g = labeled(&[("p0", "p1"), ("p1", "p2"), ("p2", "p3")]);
    let s = |x: &str| x.to_string();
    let net = Network::two_way(&g, &s("p0"), &s("p3"));
    assert_eq!(net.depth(), 4);
    assert_eq!(net.layer(0).unwrap()[&s("p0")], vec![s("p1")]);
    assert_eq!(net.layer(1).unwrap()[&s("p1")], vec![s("p2")]);
    assert_eq!(net.layer(2).unwrap()[&s("p1")], vec![s("p2")]);
    assert_eq!(net.layer(3).unwrap()[&s("p2")], vec![s("p3")]);

    let net = Network::two_way(&g, &s("p0"), &s("p1"));
    assert_eq!(net.layer(0).unwrap()[&s("p0")], Vec::<String>::new());
    assert!(net.layer(1).unwrap().is_empty());
    assert_eq!(net.layer(3).unwrap()[&s("p2")], vec![s("p1")]);
}
#[test]
fn test_cycle_aware() {
    let g = Graph::from_edges(vec![(0, 1), (1, 2), (2, 0)]);
    let net = Network::cycle_aware(&g, &0, None);
    assert_eq!(net.depth(), 2);
    assert_eq!(net.layer(0).unwrap()[&0], vec![1, 2]);
    assert_eq!(net.layer(1).unwrap()[&1], vec![2]);
    assert_eq!(net.layer(1).unwrap()[&2], vec![1]);

    let square = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    let net = Network::cycle_aware(&square, &0, None);
    assert_eq!(net.depth(), 2);
    assert_eq!(keys(net.layer(1).unwrap()), vec![1, 3]);

    let path = Graph::from_edges(vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    assert_eq!(Network::cycle_aware(&path, &0, None).depth(), 4);
    assert_eq!(Network::cycle_aware(&path, &0, Some(2)).depth(), 2);
    assert_eq!(Network::cycle_aware(&path, &2, None).depth(), 2);

    assert!(Network::cycle_aware(&Graph::with_vertices(0..3), &1, None).is_empty());
}
#[test]
fn test_reversal_aware() {
    let mut g = Graph::with_vertices(vec!['a', 'b', 'c']);
    for &(x, y) in &[('a', 'b'), ('b', 'c'), ('c', 'a')] {
        g.add_directed_edge(&x, &y).unwrap();
    }
    let cyc = Network::cycle_aware(&g, &'a', Some(5));
    assert_eq!(cyc.depth(), 3);
    assert_eq!(cyc.layer(2).unwrap()[&'c'], vec!['a']);
    let rev = Network::reversal_aware(&g, &'a', Some(5));
    assert_eq!(rev.depth(), 2);
    assert_eq!(rev.layer(1).unwrap()[&'b'], vec!['c']);

    let tri = Graph::from_edges(vec![(0, 1), (1, 2), (2, 0)]);
    assert_eq!(Network::reversal_aware(&tri, &0, None), Network::cycle_aware(&tri, &0, None));
}
#[test]
fn test_edge_set() {
    let mut s = EdgeSet::new();
    assert!(s.is_empty());
    assert!(s.insert(&3, &1));
    assert!(!s.insert(&1, &3));
    assert!(s.contains(&1, &3) && s.contains(&3, &1));
    assert!(!s.contains(&1, &2));

    let mut t = EdgeSet::new();
    t.insert(&1, &3);
    assert!(!s.absorb(t.clone()));
    t.insert(&2, &2);
    assert!(s.absorb(t));
    assert_eq!(s.len(), 2);
}
#[test]
fn test_traversal_parse() {
    assert_eq!("one-way".parse::<Traversal>(), Ok(Traversal::OneWay));
    assert_eq!("reversal-aware".parse::<Traversal>(), Ok(Traversal::ReversalAware));
    assert!("sideways".parse::<Traversal>().is_err());
    assert_eq!(Traversal::default(), Traversal::CycleAware);
}
