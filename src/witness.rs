//! Turning orbits into a concrete vertex bijection.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use itertools::Itertools;
use log::{debug, trace};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::{Graph, GraphPair, IsoError, Orbits, RelabelError, Vertex};

/// A vertex bijection between the two graphs of a [`GraphPair`]: `domain()[i]` (in graph1) maps to `image()[i]` (in graph2).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Witness<V: Vertex> {
    domain: Vec<V>,
    image: Vec<V>,
}
impl<V: Vertex> Witness<V> {
    /// Returns the vertices of graph1, in orbit order.
    pub fn domain(&self) -> &[V] { &self.domain }
    /// Returns the image of each domain vertex.
    pub fn image(&self) -> &[V] { &self.image }
    /// Returns the number of mapped vertices.
    pub fn len(&self) -> usize { self.domain.len() }
    /// Checks if the witness maps nothing (as for a pair of empty graphs).
    pub fn is_empty(&self) -> bool { self.domain.is_empty() }
    /// Iterates over the `(vertex, image)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&V, &V)> { self.domain.iter().zip(self.image.iter()) }
    /// Gets the image of a vertex.
    pub fn get(&self, vert: &V) -> Option<&V> { self.iter().find(|(v, _)| *v == vert).map(|(_, w)| w) }
    /// Checks if every vertex maps to itself.
    pub fn is_identity(&self) -> bool { self.iter().all(|(v, w)| v == w) }

    /// Relabels a graph (normally graph1) through this witness.
    pub fn apply(&self, graph: &Graph<V>) -> Result<Graph<V>, RelabelError> {
        let lookup: HashMap<&V, &V> = self.iter().collect();
        graph.relabel(|v| lookup.get(v).map(|w| (*w).clone()))
    }
    /// Checks the witness for real: relabeling graph1 must reproduce graph2, compared as adjacency sets.
    pub fn preserves_edges(&self, pair: &GraphPair<V>) -> bool {
        match self.apply(pair.graph1()) {
            Ok(g) => g.same_adjacency(pair.graph2()),
            Err(_) => false,
        }
    }
}
impl<V: Vertex> fmt::Display for Witness<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.iter().map(|(v, w)| format!("{:?} -> {:?}", v, w)).join(", "))
    }
}

/// Where a domain vertex stands while a witness is being built.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot<'a, V> {
    Resolved(V),
    Candidates(&'a BTreeSet<V>),
}

struct Builder<'a, V: Vertex> {
    pair: &'a GraphPair<V>,
    domain: Vec<&'a V>,
    index: HashMap<&'a V, usize>,
    slots: Vec<Slot<'a, V>>,
    used: HashSet<V>,
    open: usize,
}
impl<'a, V: Vertex> Builder<'a, V> {
    fn new(pair: &'a GraphPair<V>, orbits: &'a Orbits<V>) -> Result<Self, IsoError<V>> {
        let (g1, g2) = (pair.graph1(), pair.graph2());
        if orbits.len() != g1.order() {
            return Err(IsoError::InconsistentOrbit(format!("{} entries for {} vertices", orbits.len(), g1.order())));
        }
        let mut res = Builder { pair, domain: vec![], index: HashMap::new(), slots: vec![], used: HashSet::new(), open: 0 };
        for (i, (v, candidates)) in orbits.iter().enumerate() {
            if !g1.contains(v) { return Err(IsoError::InconsistentOrbit(format!("{:?} is not in the first graph", v))); }
            if res.index.insert(v, i).is_some() { return Err(IsoError::InconsistentOrbit(format!("{:?} is listed twice", v))); }
            if let Some(w) = candidates.iter().find(|w| !g2.contains(w)) {
                return Err(IsoError::InconsistentOrbit(format!("candidate {:?} is not in the second graph", w)));
            }
            let slot = match candidates.len() {
                0 => return Err(IsoError::InconsistentOrbit(format!("{:?} has no candidates", v))),
                1 => {
                    let w = candidates.iter().next().cloned().ok_or_else(|| IsoError::NoCandidate(v.clone()))?;
                    if !res.used.insert(w.clone()) {
                        return Err(IsoError::InconsistentOrbit(format!("{:?} is the only candidate of two vertices", w)));
                    }
                    Slot::Resolved(w)
                }
                _ => {
                    res.open += 1;
                    Slot::Candidates(candidates)
                }
            };
            res.domain.push(v);
            res.slots.push(slot);
        }
        Ok(res)
    }

    fn resolved(&self, i: usize) -> Option<&V> {
        match &self.slots[i] {
            Slot::Resolved(w) => Some(w),
            Slot::Candidates(_) => None,
        }
    }
    fn candidates(&self, i: usize) -> Option<&'a BTreeSet<V>> {
        match self.slots[i] {
            Slot::Resolved(_) => None,
            Slot::Candidates(c) => Some(c),
        }
    }
    fn assign(&mut self, i: usize, w: V) {
        trace!("{:?} -> {:?}", self.domain[i], w);
        self.used.insert(w.clone());
        self.slots[i] = Slot::Resolved(w);
        self.open -= 1;
    }
    /// Checks that `w` is a usable image for open domain index `i`: unused, a candidate, and adjacent to the images of `i`'s resolved neighbors.
    fn admits(&self, i: usize, w: &V) -> bool {
        if self.used.contains(w) || !self.candidates(i).map_or(false, |c| c.contains(w)) { return false; }
        let adj2 = self.pair.graph2().neighbors(w).unwrap_or(&[]);
        self.pair.graph1().neighbors(self.domain[i]).unwrap_or(&[]).iter()
            .filter_map(|n| self.index.get(n).and_then(|&k| self.resolved(k)))
            .all(|img| adj2.contains(img))
    }

    /// Picks and assigns the next seed, returning its index, or `None` if nothing is left open.
    fn seed<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<usize>, IsoError<V>> {
        let open: Vec<(usize, &'a BTreeSet<V>)> = (0..self.slots.len()).filter_map(|i| self.candidates(i).map(|c| (i, c))).collect();
        let (i, candidates) = match open.iter().copied().find(|(_, c)| c.len() == 2).or_else(|| open.first().copied()) {
            Some(x) => x,
            None => return Ok(None),
        };
        let options: Vec<&V> = candidates.iter().filter(|w| self.admits(i, w)).collect();
        let w = match options.choose(rng) {
            Some(w) => (*w).clone(),
            None => return Err(IsoError::UnresolvedVertex(self.domain[i].clone())),
        };
        debug!("seeding {:?} -> {:?} ({} of {} candidates available)", self.domain[i], w, options.len(), candidates.len());
        self.assign(i, w);
        Ok(Some(i))
    }

    /// Assigns every open graph1-neighbor of resolved index `i` to a graph2-neighbor of its image.
    fn propagate<R: Rng + ?Sized>(&mut self, i: usize, rng: &mut R, queue: &mut VecDeque<usize>) -> Result<(), IsoError<V>> {
        if self.open == 0 { return Ok(()); }
        let (g1, g2) = (self.pair.graph1(), self.pair.graph2());
        let image = match self.resolved(i) { Some(w) => w.clone(), None => return Ok(()) };
        let mut adj1: Vec<&V> = g1.neighbors(self.domain[i]).unwrap_or(&[]).iter().collect();
        let mut adj2: Vec<&V> = g2.neighbors(&image).unwrap_or(&[]).iter().collect();
        adj1.shuffle(rng);
        adj2.shuffle(rng);

        for v in adj1 {
            let k = match self.index.get(v) { Some(&k) => k, None => continue };
            if self.resolved(k).is_some() { continue }
            match adj2.iter().find(|w| self.admits(k, w)) {
                Some(w) => {
                    self.assign(k, (*w).clone());
                    queue.push_back(k);
                }
                None => return Err(IsoError::UnresolvedVertex(v.clone())),
            }
        }
        Ok(())
    }

    fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<Witness<V>, IsoError<V>> {
        let mut queue: VecDeque<usize> = (0..self.slots.len()).filter(|&i| self.resolved(i).is_some()).collect();
        while self.open > 0 {
            while let Some(i) = queue.pop_front() {
                self.propagate(i, rng, &mut queue)?;
            }
            match self.seed(rng)? {
                Some(i) => queue.push_back(i),
                None => break,
            }
        }

        let mut image = Vec::with_capacity(self.slots.len());
        for (v, slot) in self.domain.iter().zip(self.slots) {
            match slot {
                Slot::Resolved(w) => image.push(w),
                Slot::Candidates(_) => return Err(IsoError::UnresolvedVertex((*v).clone())),
            }
        }
        Ok(Witness { domain: self.domain.into_iter().cloned().collect(), image })
    }
}

impl<V: Vertex> GraphPair<V> {
    /// Builds one concrete bijection out of the given orbits.
    ///
    /// Vertices with a single candidate are fixed up front. The rest are degrees of freedom: a seed is picked
    /// (the first vertex with exactly two candidates, otherwise the first open one), given a uniformly random image,
    /// and the choice is propagated outward: each open neighbor of a resolved vertex takes the first (in shuffled order) neighbor of its image
    /// which is unused, is one of its candidates, and is adjacent to the images of its resolved neighbors.
    /// When propagation dies out with vertices still open (another component), a new seed is picked the same way.
    ///
    /// All randomness comes from `rng`, so a seeded generator reproduces the result exactly; different seeds may give different
    /// (equally valid) witnesses when the graphs have non-trivial automorphisms.
    /// Propagation is greedy and can paint itself into a corner, reported as [`IsoError::UnresolvedVertex`];
    /// trying again with more randomness is a reasonable response.
    pub fn build_witness<R: Rng + ?Sized>(&self, orbits: &Orbits<V>, rng: &mut R) -> Result<Witness<V>, IsoError<V>> {
        Builder::new(self, orbits)?.run(rng)
    }
}

#[cfg(test)]
use rand::SeedableRng;
#[cfg(test)]
use rand_pcg::Pcg64Mcg;
#[cfg(test)]
use crate::labeled;

#[cfg(test)]
fn s(x: &str) -> String { x.to_string() }

#[cfg(test)]
fn set(xs: &[&str]) -> BTreeSet<String> { xs.iter().map(|x| x.to_string()).collect() }

/// Retries with fresh seeds until a witness comes out, checking every one of them.
#[cfg(test)]
fn witnesses(pair: &GraphPair<String>, depth: usize, seeds: std::ops::Range<u64>) -> Vec<Witness<String>> {
    let orbits = pair.find_orbits(depth).unwrap();
    let res: Vec<_> = seeds.filter_map(|seed| pair.build_witness(&orbits, &mut Pcg64Mcg::seed_from_u64(seed)).ok()).collect();
    for w in res.iter() {
        assert_eq!(w.len(), pair.graph1().order());
        assert!(w.preserves_edges(pair), "bad witness {}", w);
    }
    res
}

#[test]
fn test_square_witness() {
    let _ = env_logger::builder().is_test(true).try_init();
    let square = labeled(&[("v0", "v1"), ("v1", "v2"), ("v2", "v3"), ("v3", "v0")]);
    let rotated = square.relabel(|v| Some(format!("v{}", (v[1..].parse::<usize>().unwrap() + 1) % 4))).unwrap();
    let pair = GraphPair::new(square, rotated);
    let found = witnesses(&pair, 2, 0..16);
    assert_eq!(found.len(), 16); // every choice on a cycle extends to a symmetry
    for w in found {
        // consecutive vertices stay consecutive, so the witness is a rotation (possibly reflected)
        let pos = |v: &String| v[1..].parse::<i32>().unwrap();
        let step = (pos(w.get(&s("v1")).unwrap()) - pos(w.get(&s("v0")).unwrap())).rem_euclid(4);
        assert!(step == 1 || step == 3);
        for k in 0..4 {
            let a = pos(w.get(&format!("v{}", k)).unwrap());
            let b = pos(w.get(&format!("v{}", (k + 1) % 4)).unwrap());
            assert_eq!((b - a).rem_euclid(4), step);
        }
    }
}
#[test]
fn test_disjoint_triangles_witnesses() {
    let g = labeled(&[("a0", "a1"), ("a1", "a2"), ("a2", "a0"), ("b0", "b1"), ("b1", "b2"), ("b2", "b0")]);
    let swapped = g.relabel(|v| Some(match v.as_str() { "a1" => s("b1"), "b1" => s("a1"), x => s(x) })).unwrap();
    let pair = GraphPair::new(g, swapped);
    let found = witnesses(&pair, 2, 0..24);
    assert_eq!(found.len(), 24);
    let distinct: HashSet<Vec<String>> = found.into_iter().map(|w| w.image().to_vec()).collect();
    assert!(distinct.len() > 1);
}
#[test]
fn test_grid_automorphisms() {
    let mut edges = vec![];
    for &(a, b) in &[(0, 1), (1, 2), (3, 4), (4, 5), (6, 7), (7, 8), (0, 3), (3, 6), (1, 4), (4, 7), (2, 5), (5, 8)] {
        edges.push((format!("g{}", a), format!("g{}", b)));
    }
    let pair = GraphPair::mirrored(Graph::from_edges(edges));
    assert!(pair.test_isomorphism(2));
    let orbits = pair.find_orbits(2).unwrap();
    assert_eq!(orbits.candidates(&s("g4")), Some(&set(&["g4~"])));
    assert_eq!(orbits.candidates(&s("g0")), Some(&set(&["g0~", "g2~", "g6~", "g8~"])));
    // greedy propagation from the center only succeeds when it happens to respect the square's symmetry
    assert!(!witnesses(&pair, 2, 0..64).is_empty());
}
#[test]
fn test_complete_graph_fallback_seed() {
    let k4 = labeled(&[("a", "b"), ("a", "c"), ("a", "d"), ("b", "c"), ("b", "d"), ("c", "d")]);
    let pair = GraphPair::mirrored(k4);
    let orbits = pair.find_orbits(2).unwrap();
    assert!(orbits.iter().all(|(_, c)| c.len() == 4));
    assert_eq!(witnesses(&pair, 2, 0..8).len(), 8);
}
#[test]
fn test_discrete_orbits_skip_randomness() {
    let path = labeled(&[("a", "b"), ("b", "c")]);
    let pair = GraphPair::mirrored(path);
    let orbits: Orbits<String> = vec![(s("a"), set(&["c~"])), (s("b"), set(&["b~"])), (s("c"), set(&["a~"]))].into_iter().collect();
    assert!(orbits.is_discrete());
    let one = pair.build_witness(&orbits, &mut Pcg64Mcg::seed_from_u64(1)).unwrap();
    let two = pair.build_witness(&orbits, &mut Pcg64Mcg::seed_from_u64(2)).unwrap();
    assert_eq!(one, two);
    assert_eq!(one.image(), &[s("c~"), s("b~"), s("a~")]);
    assert_eq!(one.to_string(), "\"a\" -> \"c~\", \"b\" -> \"b~\", \"c\" -> \"a~\"");
    assert!(one.preserves_edges(&pair));
    assert!(!one.is_identity());
}
#[test]
fn test_seeded_runs_repeat() {
    let g = labeled(&[("a0", "a1"), ("a1", "a2"), ("a2", "a0"), ("b0", "b1"), ("b1", "b2"), ("b2", "b0")]);
    let pair = GraphPair::mirrored(g);
    let orbits = pair.find_orbits(2).unwrap();
    for seed in 0..8 {
        let one = pair.build_witness(&orbits, &mut Pcg64Mcg::seed_from_u64(seed)).unwrap();
        let two = pair.build_witness(&orbits, &mut Pcg64Mcg::seed_from_u64(seed)).unwrap();
        assert_eq!(one, two);
    }
}
#[test]
fn test_malformed_orbits() {
    let path = labeled(&[("a", "b"), ("b", "c")]);
    let pair = GraphPair::mirrored(path);
    let mut rng = Pcg64Mcg::seed_from_u64(0);
    let check = |entries: Vec<(&str, &[&str])>, rng: &mut Pcg64Mcg| {
        let orbits: Orbits<String> = entries.into_iter().map(|(v, c)| (s(v), set(c))).collect();
        pair.build_witness(&orbits, rng)
    };
    let inconsistent = |r: Result<Witness<String>, IsoError<String>>| matches!(r, Err(IsoError::InconsistentOrbit(_)));

    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &["b~"])], &mut rng)));
    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &["b~"]), ("x", &["c~"])], &mut rng)));
    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &["b~"]), ("a", &["c~"])], &mut rng)));
    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &[]), ("c", &["c~"])], &mut rng)));
    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &["b~", "z"]), ("c", &["c~"])], &mut rng)));
    assert!(inconsistent(check(vec![("a", &["a~"]), ("b", &["a~"]), ("c", &["c~", "b~"])], &mut rng)));

    // b must land next to a's image, but none of b's candidates are there
    assert_eq!(check(vec![("a", &["a~"]), ("b", &["a~", "c~"]), ("c", &["b~", "c~"])], &mut rng), Err(IsoError::UnresolvedVertex(s("b"))));
}
#[test]
fn test_random_round_trip() {
    let mut rng = Pcg64Mcg::seed_from_u64(2024);
    for &(n, p) in &[(10, 0.3), (16, 0.5), (24, 0.5), (12, 0.8)] {
        let g = crate::random::random_graph(n, p, &mut rng);
        let (h, _) = crate::random::random_relabeling(&g, &mut rng).unwrap();
        let pair = GraphPair::new(g.clone(), h.clone());
        assert!(pair.test_isomorphism(2));
        let found = witnesses(&pair, 2, 0..32);
        assert!(!found.is_empty());
        assert_eq!(found[0].apply(&g).map(|x| x.same_adjacency(&h)), Ok(true));
    }
}
#[test]
fn test_multigraph_round_trip() {
    // doubled edges and a loop all count toward degrees, and the labeling is rigid
    let g = labeled(&[("a", "b"), ("a", "b"), ("b", "c"), ("c", "d"), ("d", "a"), ("d", "a"), ("c", "c"), ("d", "e")]);
    assert_eq!(g.degree_sequence(), vec![1, 3, 3, 4, 4]);
    for &traversal in &[crate::Traversal::OneWay, crate::Traversal::CycleAware, crate::Traversal::ReversalAware] {
        let pair = GraphPair::mirrored(g.clone()).with_options(crate::SearchOptions { traversal, ..Default::default() });
        assert!(pair.test_isomorphism(2));
        let orbits = pair.find_orbits(2).unwrap();
        for (v, candidates) in orbits.iter() {
            assert!(candidates.contains(&format!("{}~", v)));
            assert!(candidates.iter().all(|w| pair.graph2().degree(w) == g.degree(v)));
        }
        let found = witnesses(&pair, 2, 0..16);
        assert!(!found.is_empty());
        for w in found {
            assert!(w.iter().all(|(v, img)| *img == format!("{}~", v)));
        }
    }
}
#[test]
fn test_empty_pair() {
    let pair = GraphPair::new(Graph::<String>::new(), Graph::new());
    let w = pair.find_isomorphism(2, &mut Pcg64Mcg::seed_from_u64(3)).unwrap();
    assert!(w.is_empty() && w.is_identity() && w.preserves_edges(&pair));
}
