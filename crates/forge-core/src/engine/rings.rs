use super::config::RingClosureConfig;
use super::cancel::CancellationToken;
use super::context::Counters;
use super::error::EngineError;
use crate::core::chem::bond::BondType;
use crate::core::fragspace::FragmentSpace;
use crate::core::models::attachment_point::ApClass;
use crate::core::models::graph::Graph;
use crate::core::models::ids::VertexId;
use crate::core::models::ring::Ring;
use itertools::Itertools;
use std::collections::BTreeSet;
use tracing::debug;

/// A ring closure that can be realized in a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub path: Vec<VertexId>,
    pub bond_type: BondType,
}

impl Chord {
    fn ends(&self) -> [VertexId; 2] {
        [self.path[0], self.path[self.path.len() - 1]]
    }

    fn shares_end_with(&self, other: &Chord) -> bool {
        let [a, b] = self.ends();
        other.ends().iter().any(|&e| e == a || e == b)
    }
}

fn parent_class(graph: &Graph, rcv: VertexId) -> Option<ApClass> {
    let edge = graph.parent_edge(rcv)?;
    graph.ap(edge.src)?.class.clone()
}

/// Every pair of unused ring-closing attractors that may be joined: their
/// parent AP classes are ring-closure compatible and the tree path between
/// them has an acceptable length.
pub fn candidate_chords(graph: &Graph, space: &FragmentSpace, config: &RingClosureConfig) -> Vec<Chord> {
    let rcvs: Vec<(VertexId, ApClass)> = graph
        .unused_ring_closing_vertices()
        .into_iter()
        .filter_map(|v| parent_class(graph, v).map(|c| (v, c)))
        .collect();
    let mut chords = Vec::new();
    for ((a, class_a), (b, class_b)) in rcvs.iter().tuple_combinations() {
        if !space.ring_closure_compatible(class_a, class_b) {
            continue;
        }
        let Some(path) = graph.path_between(*a, *b) else {
            continue;
        };
        if path.len() < config.min_ring_path || path.len() > config.max_ring_path {
            continue;
        }
        chords.push(Chord {
            path,
            bond_type: space.bond_type_for(class_a),
        });
    }
    chords
}

/// Graphs obtained by closing different sets of compatible rings on `graph`.
/// Each alternative is a deep copy with a fresh id and a distinct ring set;
/// larger ring sets come first. An empty result means no ring can be closed.
pub fn cyclic_alternatives(
    graph: &Graph,
    space: &FragmentSpace,
    config: &RingClosureConfig,
    counters: &Counters,
    token: &CancellationToken,
) -> Result<Vec<Graph>, EngineError> {
    let chords = candidate_chords(graph, space, config);
    if chords.is_empty() || config.max_alternatives == 0 {
        return Ok(Vec::new());
    }
    debug!(graph = %graph.id(), chords = chords.len(), "Expanding cyclic alternatives");

    // No set of disjoint chords can use more than half of the attractors.
    let ends: BTreeSet<VertexId> = chords.iter().flat_map(Chord::ends).collect();
    let largest = (ends.len() / 2).min(chords.len());

    let mut sets = Vec::new();
    for size in (1..=largest).rev() {
        let mut search = SetSearch {
            chords: &chords,
            size,
            limit: config.max_alternatives,
            token,
            chosen: Vec::with_capacity(size),
            found: &mut sets,
        };
        search.extend(0)?;
        if sets.len() >= config.max_alternatives {
            break;
        }
    }

    let mut alternatives = Vec::with_capacity(sets.len());
    for set in sets {
        let mut alternative = graph.clone_with_id(counters.next_graph_id());
        for chord in set.into_iter().map(|i| &chords[i]) {
            alternative
                .add_ring(Ring::new(chord.path.clone(), chord.bond_type))
                .map_err(|e| EngineError::build("ring closure", e))?;
        }
        alternatives.push(alternative);
    }
    Ok(alternatives)
}

/// Depth-first enumeration of pairwise disjoint chord sets of one size, in
/// lexicographic order of chord indices.
struct SetSearch<'a> {
    chords: &'a [Chord],
    size: usize,
    limit: usize,
    token: &'a CancellationToken,
    chosen: Vec<usize>,
    found: &'a mut Vec<Vec<usize>>,
}

impl SetSearch<'_> {
    fn extend(&mut self, from: usize) -> Result<(), EngineError> {
        self.token.check()?;
        let chords = self.chords;
        if self.chosen.len() == self.size {
            self.found.push(self.chosen.clone());
            return Ok(());
        }
        let missing = self.size - self.chosen.len();
        for next in from..chords.len() {
            if self.found.len() >= self.limit || chords.len() - next < missing {
                break;
            }
            if self.chosen.iter().any(|&i| chords[i].shares_end_with(&chords[next])) {
                continue;
            }
            self.chosen.push(next);
            self.extend(next + 1)?;
            self.chosen.pop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fragspace::{BuildingBlock, CompatibilityRules};
    use crate::core::models::attachment_point::{ApRef, AttachmentPoint};
    use crate::core::models::ids::GraphId;
    use crate::core::models::vertex::{BuildingBlockType, Vertex};
    use std::collections::{HashMap, HashSet};

    fn class(s: &str) -> ApClass {
        s.parse().unwrap()
    }

    fn vertex(bb_type: BuildingBlockType, classes: &[&str]) -> Vertex {
        let mut v = Vertex::new(VertexId(0), bb_type);
        for (i, c) in classes.iter().enumerate() {
            v.aps.push(AttachmentPoint::new(VertexId(0), i, Some(class(c))));
        }
        v
    }

    fn space() -> FragmentSpace {
        let rules = CompatibilityRules {
            ring_closures: HashMap::from([(class("r:0"), vec![class("r:0")])]),
            ..Default::default()
        };
        let rca = BuildingBlock {
            name: "rca".into(),
            vertex: vertex(BuildingBlockType::RingClosingAttractor, &["rc:0"]),
        };
        FragmentSpace::from_parts(vec![], vec![rca], vec![], rules).unwrap()
    }

    /// A chain of `n` links with an attractor hanging from every link.
    fn chain_with_attractors(n: usize) -> Graph {
        let mut g = Graph::new(GraphId(1));
        let mut prev = g.add_vertex(vertex(BuildingBlockType::Scaffold, &["l:0", "r:0"]));
        let mut prev_ap = 0;
        let mut links = vec![prev];
        for _ in 1..n {
            let v = vertex(BuildingBlockType::Fragment, &["l:1", "l:0", "r:0"]);
            prev = g
                .append_vertex_on_ap(ApRef::new(prev, prev_ap), v, 0, BondType::Single)
                .unwrap();
            prev_ap = 1;
            links.push(prev);
        }
        for (i, link) in links.into_iter().enumerate() {
            let ap = if i == 0 { 1 } else { 2 };
            let rca = vertex(BuildingBlockType::RingClosingAttractor, &["rc:0"]);
            g.append_vertex_on_ap(ApRef::new(link, ap), rca, 0, BondType::Single)
                .unwrap();
        }
        g
    }

    fn config(min: usize, max: usize, limit: usize) -> RingClosureConfig {
        RingClosureConfig {
            min_ring_path: min,
            max_ring_path: max,
            max_alternatives: limit,
        }
    }

    #[test]
    fn chords_respect_path_length_bounds() {
        let g = chain_with_attractors(3);
        // Attractors on neighbouring links are 4 vertices apart, on the
        // chain ends 5.
        assert_eq!(candidate_chords(&g, &space(), &config(4, 12, 10)).len(), 3);
        assert_eq!(candidate_chords(&g, &space(), &config(5, 12, 10)).len(), 1);
        assert!(candidate_chords(&g, &space(), &config(6, 12, 10)).is_empty());
    }

    #[test]
    fn alternatives_have_distinct_disjoint_ring_sets() {
        let g = chain_with_attractors(4);
        let counters = Counters::new();
        let alternatives = cyclic_alternatives(&g, &space(), &config(4, 12, 100), &counters, &CancellationToken::new())
            .unwrap();
        let chords = candidate_chords(&g, &space(), &config(4, 12, 100)).len();
        assert_eq!(chords, 6);
        assert!(alternatives.len() <= 1 << chords);

        let signatures: HashSet<_> = alternatives.iter().map(Graph::ring_signature).collect();
        assert_eq!(signatures.len(), alternatives.len());
        // Two disjoint rings first, then every single ring.
        assert_eq!(alternatives[0].rings().len(), 2);
        assert_eq!(alternatives.last().unwrap().rings().len(), 1);
        assert_eq!(alternatives.len(), 3 + 6);

        let ids: HashSet<_> = alternatives.iter().map(Graph::id).collect();
        assert_eq!(ids.len(), alternatives.len());
        assert!(!ids.contains(&g.id()));
        assert!(g.rings().is_empty());
    }

    #[test]
    fn alternatives_are_truncated() {
        let g = chain_with_attractors(4);
        let alternatives =
            cyclic_alternatives(&g, &space(), &config(4, 12, 2), &Counters::new(), &CancellationToken::new())
                .unwrap();
        assert_eq!(alternatives.len(), 2);
    }

    #[test]
    fn incompatible_classes_close_nothing() {
        let g = chain_with_attractors(3);
        let space = FragmentSpace::default();
        assert!(
            cyclic_alternatives(&g, &space, &config(1, 12, 10), &Counters::new(), &CancellationToken::new())
                .unwrap()
                .is_empty()
        );
    }

    /// A scaffold with `arms` ring-closing APs, each holding an attractor.
    fn star_with_attractors(arms: usize) -> Graph {
        let mut g = Graph::new(GraphId(1));
        let classes = vec!["r:0"; arms];
        let hub = g.add_vertex(vertex(BuildingBlockType::Scaffold, &classes));
        for ap in 0..arms {
            let rca = vertex(BuildingBlockType::RingClosingAttractor, &["rc:0"]);
            g.append_vertex_on_ap(ApRef::new(hub, ap), rca, 0, BondType::Single)
                .unwrap();
        }
        g
    }

    #[test]
    fn many_attractors_expand_quickly_to_the_limit() {
        let g = star_with_attractors(10);
        let config = config(2, 20, 50);
        assert_eq!(candidate_chords(&g, &space(), &config).len(), 45);

        let alternatives =
            cyclic_alternatives(&g, &space(), &config, &Counters::new(), &CancellationToken::new())
                .unwrap();
        assert_eq!(alternatives.len(), 50);
        assert!(alternatives.iter().all(|a| a.rings().len() == 5));
        let signatures: HashSet<_> = alternatives.iter().map(Graph::ring_signature).collect();
        assert_eq!(signatures.len(), 50);
    }

    #[test]
    fn cancelled_search_returns_cancelled() {
        let g = star_with_attractors(10);
        let token = CancellationToken::new();
        token.cancel();
        let result = cyclic_alternatives(&g, &space(), &config(2, 20, 50), &Counters::new(), &token);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
