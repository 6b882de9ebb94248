//! Pairing two graphs for isomorphism testing and orbit refinement.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use log::debug;
use rand::Rng;
use rayon::prelude::*;
use superslice::Ext;

use crate::{Derivative, Graph, IsoError, Mirror, Network, Traversal, Vertex, Witness};

/// Knobs for a search over a [`GraphPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// How single-root networks are built.
    pub traversal: Traversal,
    /// Number of layers used for "full depth" comparisons. `None` uses `order - 1`, which covers every reachable depth.
    /// Lowering this bounds the cost of a search at the price of weaker fingerprints.
    pub max_depth: Option<usize>,
    /// Whether [`GraphPair::find_orbits`] may evaluate vertices on the rayon thread pool.
    /// Results are identical either way.
    pub parallel: bool,
}
impl Default for SearchOptions {
    fn default() -> Self {
        Self { traversal: Traversal::default(), max_depth: None, parallel: true }
    }
}

/// The candidate images of every vertex of the first graph of a [`GraphPair`].
///
/// Entries are listed in the insertion order of the first graph.
/// Each candidate set holds the vertices of the second graph which were structurally indistinguishable from the entry's vertex;
/// a size-1 set is a forced image, but it is still a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orbits<V: Vertex>(Vec<(V, BTreeSet<V>)>);
impl<V: Vertex> Orbits<V> {
    /// Returns the number of entries.
    pub fn len(&self) -> usize { self.0.len() }
    /// Checks if there are no entries.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    /// Iterates through the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&V, &BTreeSet<V>)> { self.0.iter().map(|(v, c)| (v, c)) }
    /// Gets the entry at the given position.
    pub fn get(&self, index: usize) -> Option<(&V, &BTreeSet<V>)> { self.0.get(index).map(|(v, c)| (v, c)) }
    /// Gets the candidate set of a vertex of the first graph.
    pub fn candidates(&self, vert: &V) -> Option<&BTreeSet<V>> { self.0.iter().find(|(v, _)| v == vert).map(|(_, c)| c) }
    /// Checks if every vertex has exactly one candidate, in which case the orbits already are a bijection.
    pub fn is_discrete(&self) -> bool { self.0.iter().all(|(_, c)| c.len() == 1) }
    /// Returns the number of entries with more than one candidate.
    pub fn ambiguous(&self) -> usize { self.0.iter().filter(|(_, c)| c.len() > 1).count() }
}
impl<V: Vertex> FromIterator<(V, BTreeSet<V>)> for Orbits<V> {
    fn from_iter<I: IntoIterator<Item = (V, BTreeSet<V>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lazily computed derivatives of every vertex of one graph, safe to fill from several threads.
struct DerivativeCache<'a, V: Vertex> {
    graph: &'a Graph<V>,
    vertices: Vec<&'a V>,
    traversal: Traversal,
    depth: Option<usize>,
    slots: Vec<OnceLock<Derivative>>,
}
impl<'a, V: Vertex> DerivativeCache<'a, V> {
    fn new(graph: &'a Graph<V>, traversal: Traversal, depth: Option<usize>) -> Self {
        let vertices: Vec<_> = graph.vertices().collect();
        let slots = vertices.iter().map(|_| OnceLock::new()).collect();
        Self { graph, vertices, traversal, depth, slots }
    }
    fn get(&self, index: usize) -> &Derivative {
        self.slots[index].get_or_init(|| self.traversal.build(self.graph, self.vertices[index], self.depth).derive())
    }
}

/// A pair of graphs to compare.
///
/// The pair owns both graphs and never modifies them; every search works on its own copies of whatever it needs to shuffle.
#[derive(Debug, Clone)]
pub struct GraphPair<V: Vertex> {
    graph1: Graph<V>,
    graph2: Graph<V>,
    options: SearchOptions,
    by_degree: Vec<(usize, usize)>, // (degree, index) over graph2, sorted
}
impl<V: Vertex> GraphPair<V> {
    /// Pairs two graphs, using the default [`SearchOptions`].
    pub fn new(graph1: Graph<V>, graph2: Graph<V>) -> Self {
        let mut by_degree: Vec<_> = graph2.adjacencies().enumerate().map(|(i, (_, adj))| (adj.len(), i)).collect();
        by_degree.sort_unstable();
        Self { graph1, graph2, options: Default::default(), by_degree }
    }
    /// Replaces the search options.
    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
    /// Returns the first graph.
    pub fn graph1(&self) -> &Graph<V> { &self.graph1 }
    /// Returns the second graph.
    pub fn graph2(&self) -> &Graph<V> { &self.graph2 }
    /// Returns the search options.
    pub fn options(&self) -> &SearchOptions { &self.options }

    fn network(&self, graph: &Graph<V>, vert: &V, depth: Option<usize>) -> Network<V> {
        self.options.traversal.build(graph, vert, depth)
    }
    /// Indices (into graph2) of the vertices with the given degree, in insertion order.
    fn same_degree(&self, degree: usize) -> impl Iterator<Item = usize> + '_ {
        self.by_degree[self.by_degree.equal_range_by_key(&degree, |&(d, _)| d)].iter().map(|&(_, i)| i)
    }
    fn check_order(&self) -> Result<(), IsoError<V>> {
        let (left, right) = (self.graph1.order(), self.graph2.order());
        if left != right {
            debug!("graph orders differ: {} vs {}", left, right);
            return Err(IsoError::SizeMismatch { left, right });
        }
        Ok(())
    }
    /// The first vertex of graph1 whose degree occurs a different number of times in graph2.
    fn degree_mismatch(&self) -> Option<&V> {
        let mut counts: HashMap<usize, isize> = HashMap::new();
        for (_, adj) in self.graph2.adjacencies() { *counts.entry(adj.len()).or_default() -= 1; }
        for (_, adj) in self.graph1.adjacencies() { *counts.entry(adj.len()).or_default() += 1; }
        let res = self.graph1.adjacencies().find(|(_, adj)| counts[&adj.len()] != 0).map(|(v, _)| v);
        if let Some(v) = res { debug!("degree sequences differ at {:?}", v); }
        res
    }

    /// Compares the neighborhoods of `v1` (in graph1) and `v2` (in graph2) up to `depth` layers.
    ///
    /// The vertices must have the same degree; after that, their networks are built with the configured [`Traversal`] and their derivatives compared.
    /// `None` compares at full depth. Vertices missing from their graph never match.
    pub fn test_pair(&self, v1: &V, v2: &V, depth: Option<usize>) -> bool {
        match (self.graph1.degree(v1), self.graph2.degree(v2)) {
            (Some(a), Some(b)) if a == b => (),
            _ => return false,
        }
        self.network(&self.graph1, v1, depth).derive() == self.network(&self.graph2, v2, depth).derive()
    }

    /// Compares how `u1` and `v1` are connected in graph1 with how `u2` and `v2` are connected in graph2, using [`Network::two_way`].
    pub fn test_connection(&self, u1: &V, v1: &V, u2: &V, v2: &V) -> bool {
        if !(self.graph1.contains(u1) && self.graph1.contains(v1) && self.graph2.contains(u2) && self.graph2.contains(v2)) { return false; }
        Network::two_way(&self.graph1, u1, v1).derive() == Network::two_way(&self.graph2, u2, v2).derive()
    }

    /// Graph2 indices compatible with `v1`: same degree, equal derivative at the prefilter depth (skipped if `depth == 0`),
    /// and equal derivative at full depth. Stops at the first hit if `first` is set.
    fn compatible(&self, v1: &V, depth: usize, shallow: &DerivativeCache<V>, full: &DerivativeCache<V>, first: bool) -> Vec<usize> {
        let degree = match self.graph1.degree(v1) { Some(x) => x, None => return vec![] };
        let mut candidates: Vec<usize> = self.same_degree(degree).collect();
        if candidates.is_empty() { return candidates; }
        if depth != 0 {
            let d1 = self.network(&self.graph1, v1, Some(depth)).derive();
            candidates.retain(|&i| *shallow.get(i) == d1);
            if candidates.is_empty() { return candidates; }
        }
        let d1 = self.network(&self.graph1, v1, self.options.max_depth).derive();
        if first {
            return candidates.into_iter().find(|&i| *full.get(i) == d1).into_iter().collect();
        }
        candidates.retain(|&i| *full.get(i) == d1);
        candidates
    }

    /// Tests whether the graphs look isomorphic.
    ///
    /// Graphs with different orders or degree sequences are rejected before any traversal.
    /// Otherwise, the first vertex of graph1 is compared against the vertices of graph2, first at `depth` layers (a cheap prefilter;
    /// `0` disables it) and then at full depth, and the graphs are reported isomorphic as soon as one vertex matches.
    ///
    /// This is a heuristic: `true` means the chosen root has a structural twin, which does not prove isomorphism,
    /// and only one root is ever tried.
    pub fn test_isomorphism(&self, depth: usize) -> bool {
        if self.check_order().is_err() || self.degree_mismatch().is_some() { return false; }
        let v1 = match self.graph1.first_vertex() { Some(x) => x, None => return true };
        let shallow = DerivativeCache::new(&self.graph2, self.options.traversal, Some(depth));
        let full = DerivativeCache::new(&self.graph2, self.options.traversal, self.options.max_depth);
        let found = !self.compatible(v1, depth, &shallow, &full, true).is_empty();
        debug!("root {:?} {} a structural twin", v1, if found { "has" } else { "has no" });
        found
    }

    /// Computes the candidate images of every vertex of graph1.
    ///
    /// A vertex's candidates are the vertices of graph2 with the same degree whose derivatives agree with it at `depth` layers
    /// (a prefilter; `0` disables it) and at full depth.
    /// Raising `depth` can only remove candidates.
    ///
    /// Fails with [`IsoError::SizeMismatch`] if the orders differ, or with [`IsoError::NoCandidate`] for the first vertex
    /// (in insertion order) left without candidates; mismatched degree sequences are caught before any traversal.
    pub fn find_orbits(&self, depth: usize) -> Result<Orbits<V>, IsoError<V>> {
        self.check_order()?;
        if let Some(v) = self.degree_mismatch() { return Err(IsoError::NoCandidate(v.clone())); }

        let shallow = DerivativeCache::new(&self.graph2, self.options.traversal, Some(depth));
        let full = DerivativeCache::new(&self.graph2, self.options.traversal, self.options.max_depth);
        let find = |v1: &V| -> Result<(V, BTreeSet<V>), IsoError<V>> {
            let found: BTreeSet<V> = self.compatible(v1, depth, &shallow, &full, false).into_iter()
                .filter_map(|i| self.graph2.vertex(i).cloned()).collect();
            if found.is_empty() { return Err(IsoError::NoCandidate(v1.clone())); }
            Ok((v1.clone(), found))
        };
        let entries: Vec<_> = if self.options.parallel {
            self.graph1.vertices().collect::<Vec<_>>().into_par_iter().map(find).collect()
        } else {
            self.graph1.vertices().map(find).collect()
        };
        let orbits: Orbits<V> = entries.into_iter().collect::<Result<_, _>>()?;
        debug!("found orbits for {} vertices, {} ambiguous", orbits.len(), orbits.ambiguous());
        Ok(orbits)
    }

    /// Computes the orbits and builds a witness from them in one step.
    pub fn find_isomorphism<R: Rng + ?Sized>(&self, depth: usize, rng: &mut R) -> Result<Witness<V>, IsoError<V>> {
        let orbits = self.find_orbits(depth)?;
        self.build_witness(&orbits, rng)
    }
}
impl<V: Mirror> GraphPair<V> {
    /// Pairs a graph with a relabeled copy of itself (see [`Mirror`]), for exploring its automorphisms.
    ///
    /// Only label types implementing [`Mirror`] qualify: `String` and `(V, bool)` tags.
    /// The mirrored labels must not already occur in `graph1`; otherwise pair the graphs explicitly with [`Self::new`].
    pub fn mirrored(graph1: Graph<V>) -> Self {
        let graph2 = graph1.adjacencies().map(|(v, adj)| (v.mirrored(), adj.iter().map(Mirror::mirrored).collect())).collect();
        Self::new(graph1, graph2)
    }
}

#[cfg(test)]
use crate::labeled;

#[cfg(test)]
fn s(x: &str) -> String { x.to_string() }

#[cfg(test)]
fn set(xs: &[&str]) -> BTreeSet<String> { xs.iter().map(|x| x.to_string()).collect() }

#[test]
fn test_square_rotation() {
    let square = labeled(&[("v0", "v1"), ("v1", "v2"), ("v2", "v3"), ("v3", "v0")]);
    let rotated = square.relabel(|v| Some(format!("v{}", (v[1..].parse::<usize>().unwrap() + 1) % 4))).unwrap();
    let pair = GraphPair::new(square, rotated);
    assert!(pair.test_isomorphism(2));
    assert!(pair.test_pair(&s("v0"), &s("v2"), None));
    let orbits = pair.find_orbits(2).unwrap();
    assert_eq!(orbits.len(), 4);
    assert_eq!(orbits.ambiguous(), 4);
    assert_eq!(orbits.candidates(&s("v1")), Some(&set(&["v0", "v1", "v2", "v3"])));
}
#[test]
fn test_star_vs_path() {
    let star = labeled(&[("h", "a"), ("h", "b"), ("h", "c")]);
    let path = labeled(&[("p0", "p1"), ("p1", "p2"), ("p2", "p3")]);
    let pair = GraphPair::new(star.clone(), path.clone());
    assert!(!pair.test_isomorphism(2));
    assert!(!pair.test_isomorphism(0));
    assert_eq!(pair.find_orbits(2), Err(IsoError::NoCandidate(s("h"))));
    assert!(!GraphPair::new(path, star).test_isomorphism(2));
}
#[test]
fn test_size_mismatch() {
    let small = labeled(&[("a", "b")]);
    let big = labeled(&[("a", "b"), ("b", "c")]);
    let pair = GraphPair::new(small, big);
    assert!(!pair.test_isomorphism(2));
    assert_eq!(pair.find_orbits(2), Err(IsoError::SizeMismatch { left: 2, right: 3 }));

    let empty = GraphPair::new(Graph::<usize>::new(), Graph::new());
    assert!(empty.test_isomorphism(2));
    assert!(empty.find_orbits(2).unwrap().is_empty());
}
#[test]
fn test_same_degrees_not_isomorphic() {
    // a hexagon and two triangles share a degree sequence, and the heuristic tells them apart only through deep layers
    let hexagon = labeled(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "f"), ("f", "a")]);
    let triangles = labeled(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "e"), ("e", "f"), ("f", "d")]);
    let pair = GraphPair::new(hexagon, triangles);
    assert!(!pair.test_isomorphism(0));
    assert_eq!(pair.find_orbits(2), Err(IsoError::NoCandidate(s("a"))));
}
#[test]
fn test_disjoint_triangles() {
    let g = labeled(&[("a0", "a1"), ("a1", "a2"), ("a2", "a0"), ("b0", "b1"), ("b1", "b2"), ("b2", "b0")]);
    let swapped = g.relabel(|v| Some(match v.as_str() { "a0" => s("b0"), "b0" => s("a0"), x => s(x) })).unwrap();
    let pair = GraphPair::new(g.clone(), swapped);
    assert!(pair.test_isomorphism(2));
    let orbits = pair.find_orbits(2).unwrap();
    assert!(orbits.iter().all(|(_, c)| c.len() == 6));
    assert!(GraphPair::mirrored(g).test_isomorphism(2));
}
#[test]
fn test_orbits_shrink_with_depth() {
    use rand::SeedableRng;
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(42);
    for &traversal in &[Traversal::OneWay, Traversal::CycleAware, Traversal::ReversalAware] {
        let g = crate::random::random_graph(12, 0.3, &mut rng);
        let (h, _) = crate::random::random_relabeling(&g, &mut rng).unwrap();
        let pair = GraphPair::new(g, h).with_options(SearchOptions { traversal, ..Default::default() });
        let shallow = pair.find_orbits(1).unwrap();
        let deep = pair.find_orbits(4).unwrap();
        for ((v, a), (w, b)) in shallow.iter().zip(deep.iter()) {
            assert_eq!(v, w);
            assert!(b.is_subset(a));
        }
        let unfiltered = pair.find_orbits(0).unwrap();
        for ((_, a), (_, b)) in unfiltered.iter().zip(shallow.iter()) {
            assert!(b.is_subset(a));
        }
    }
}
#[test]
fn test_permuted_graphs_match() {
    use rand::SeedableRng;
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(7);
    for &p in &[0.2, 0.5, 0.8] {
        let g = crate::random::random_graph(15, p, &mut rng);
        let (h, mapping) = crate::random::random_relabeling(&g, &mut rng).unwrap();
        let pair = GraphPair::new(g, h);
        assert!(pair.test_isomorphism(2));
        let orbits = pair.find_orbits(2).unwrap();
        for (v, candidates) in orbits.iter() {
            assert!(candidates.contains(&mapping[v])); // the true image always survives
        }
        assert!(pair.test_pair(orbits.get(0).unwrap().0, &mapping[orbits.get(0).unwrap().0], Some(3)));
    }
}
#[test]
fn test_parallel_matches_sequential() {
    use rand::SeedableRng;
    let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(99);
    let g = crate::random::random_graph(20, 0.25, &mut rng);
    let (h, _) = crate::random::random_relabeling(&g, &mut rng).unwrap();
    let parallel = GraphPair::new(g.clone(), h.clone());
    let sequential = GraphPair::new(g, h).with_options(SearchOptions { parallel: false, ..Default::default() });
    assert!(parallel.options().parallel && !sequential.options().parallel);
    assert_eq!(parallel.find_orbits(2), sequential.find_orbits(2));
}
#[test]
fn test_mirrored_tagged_labels() {
    let g = Graph::from_edges(vec![(0, 1), (1, 2), (2, 0), (2, 3)].into_iter().map(|(a, b)| ((a, false), (b, false))));
    let pair = GraphPair::mirrored(g);
    assert!(pair.graph2().contains(&(3, true)));
    assert!(pair.test_isomorphism(2));
    let orbits = pair.find_orbits(2).unwrap();
    assert_eq!(orbits.candidates(&(2, false)), Some(&vec![(2, true)].into_iter().collect()));
    assert_eq!(orbits.candidates(&(0, false)), Some(&vec![(0, true), (1, true)].into_iter().collect()));
}
#[test]
fn test_connection() {
    let path = labeled(&[("p0", "p1"), ("p1", "p2"), ("p2", "p3")]);
    let pair = GraphPair::mirrored(path);
    assert!(pair.test_connection(&s("p0"), &s("p3"), &s("p0~"), &s("p3~")));
    assert!(pair.test_connection(&s("p0"), &s("p3"), &s("p3~"), &s("p0~")));
    assert!(!pair.test_connection(&s("p0"), &s("p3"), &s("p0~"), &s("p1~")));
    assert!(!pair.test_connection(&s("p0"), &s("p3"), &s("p0"), &s("p3")));
}
