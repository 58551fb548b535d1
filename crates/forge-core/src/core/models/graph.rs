use super::attachment_point::{ApClass, ApRef, AttachmentPoint};
use super::edge::Edge;
use super::ids::{GraphId, VertexId};
use super::ring::Ring;
use super::symmetry::{self, SymmetricSet};
use super::vertex::Vertex;
use crate::core::chem::bond::BondType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Vertex {0} not found in graph")]
    UnknownVertex(VertexId),
    #[error("Attachment point {0} does not exist")]
    UnknownAp(ApRef),
    #[error("Attachment point {0} is already in use")]
    ApInUse(ApRef),
    #[error("Attachment point {ap} is referenced by {count} edges")]
    ApNotExclusive { ap: ApRef, count: usize },
    #[error("Attachment point {0} is flagged as used but no edge references it")]
    DanglingApFlag(ApRef),
    #[error("Vertex {0} is not a ring-closing attractor")]
    NotRingClosing(VertexId),
    #[error("Vertex {0} already closes a ring")]
    AlreadyInRing(VertexId),
    #[error("Ring path {0:?} does not follow the graph")]
    InvalidRingPath(Vec<VertexId>),
    #[error("Vertex {0} is not a leaf and cannot be removed")]
    NotALeaf(VertexId),
}

/// The attachment-point graph of a candidate: building blocks (vertices)
/// bonded through attachment points (edges), plus declared ring closures.
///
/// Edges form a spanning tree rooted at the first vertex. Rings never add
/// edges; they record which pairs of ring-closing attractors are to be
/// turned into a bond when the structure is assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    id: GraphId,
    vertices: Vec<Vertex>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    rings: Vec<Ring>,
    #[serde(default)]
    symmetric_sets: Vec<SymmetricSet>,
}

impl Graph {
    pub fn new(id: GraphId) -> Self {
        Self {
            id,
            vertices: Vec::new(),
            edges: Vec::new(),
            rings: Vec::new(),
            symmetric_sets: Vec::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn symmetric_sets(&self) -> &[SymmetricSet] {
        &self.symmetric_sets
    }

    pub fn root(&self) -> Option<&Vertex> {
        self.vertices.first()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.id == id)
    }

    fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.iter_mut().find(|v| v.id == id)
    }

    pub fn ap(&self, ap: ApRef) -> Option<&AttachmentPoint> {
        self.vertex(ap.vertex)?.ap(ap.ap)
    }

    fn ap_mut(&mut self, ap: ApRef) -> Option<&mut AttachmentPoint> {
        self.vertex_mut(ap.vertex)?.ap_mut(ap.ap)
    }

    pub fn next_vertex_id(&self) -> VertexId {
        self.vertices
            .iter()
            .map(|v| v.id.0 + 1)
            .max()
            .map_or(VertexId(0), VertexId)
    }

    /// Adds a disconnected vertex, renumbering it with a fresh id.
    pub fn add_vertex(&mut self, mut vertex: Vertex) -> VertexId {
        let id = self.next_vertex_id();
        vertex.set_id(id);
        self.vertices.push(vertex);
        id
    }

    /// Adds `vertex` to the graph and bonds its `child_ap` to the free AP
    /// `parent` of a vertex already in the graph.
    pub fn append_vertex_on_ap(
        &mut self,
        parent: ApRef,
        vertex: Vertex,
        child_ap: usize,
        bond_type: BondType,
    ) -> Result<VertexId, GraphError> {
        let parent_point = self.ap(parent).ok_or(GraphError::UnknownAp(parent))?;
        if parent_point.in_use {
            return Err(GraphError::ApInUse(parent));
        }
        match vertex.ap(child_ap) {
            None => return Err(GraphError::UnknownAp(ApRef::new(vertex.id, child_ap))),
            Some(ap) if ap.in_use => return Err(GraphError::ApInUse(ApRef::new(vertex.id, child_ap))),
            Some(_) => {}
        }

        let id = self.add_vertex(vertex);
        let child = ApRef::new(id, child_ap);
        for end in [parent, child] {
            if let Some(ap) = self.ap_mut(end) {
                ap.in_use = true;
            }
        }
        self.edges.push(Edge::new(parent, child, bond_type));
        Ok(id)
    }

    /// Records a ring closure. Both ends must be free-standing ring-closing
    /// attractors and the inner path must match the tree path between them.
    pub fn add_ring(&mut self, ring: Ring) -> Result<(), GraphError> {
        let (head, tail) = match (ring.head(), ring.tail()) {
            (Some(h), Some(t)) if h != t => (h, t),
            _ => return Err(GraphError::InvalidRingPath(ring.vertices.clone())),
        };
        for end in [head, tail] {
            let vertex = self.vertex(end).ok_or(GraphError::UnknownVertex(end))?;
            if !vertex.is_ring_closing() {
                return Err(GraphError::NotRingClosing(end));
            }
            if self.rings.iter().any(|r| r.head() == Some(end) || r.tail() == Some(end)) {
                return Err(GraphError::AlreadyInRing(end));
            }
        }
        match self.path_between(head, tail) {
            Some(path) if path == ring.vertices => {}
            _ => return Err(GraphError::InvalidRingPath(ring.vertices.clone())),
        }
        self.rings.push(ring);
        Ok(())
    }

    /// Registers a symmetric set, merging it with any set it overlaps.
    pub fn add_symmetric_set(&mut self, set: SymmetricSet) {
        symmetry::register(&mut self.symmetric_sets, set);
    }

    pub fn symmetric_set_of(&self, vertex: VertexId) -> Option<&SymmetricSet> {
        self.symmetric_sets.iter().find(|s| s.contains(vertex))
    }

    /// All free APs, in vertex then AP order.
    pub fn free_aps(&self) -> Vec<ApRef> {
        self.vertices
            .iter()
            .flat_map(|v| v.free_aps().map(move |ap| ApRef::new(v.id, ap.index)))
            .collect()
    }

    pub fn neighbors(&self, vertex: VertexId) -> Vec<VertexId> {
        self.edges
            .iter()
            .filter_map(|e| e.other_end(vertex))
            .collect()
    }

    /// The edge that connects `vertex` to its parent in the spanning tree.
    pub fn parent_edge(&self, vertex: VertexId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.trg.vertex == vertex)
    }

    pub fn child_edges(&self, vertex: VertexId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.src.vertex == vertex)
    }

    /// Shortest path of vertices from `from` to `to`, both included.
    pub fn path_between(&self, from: VertexId, to: VertexId) -> Option<Vec<VertexId>> {
        self.vertex(from)?;
        self.vertex(to)?;
        let mut previous: HashMap<VertexId, VertexId> = HashMap::new();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut step = to;
                while let Some(&p) = previous.get(&step) {
                    path.push(p);
                    step = p;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.neighbors(current) {
                if seen.insert(next) {
                    previous.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    pub fn is_connected(&self) -> bool {
        let Some(root) = self.root() else {
            return true;
        };
        let mut seen = HashSet::from([root.id]);
        let mut stack = vec![root.id];
        while let Some(v) = stack.pop() {
            for n in self.neighbors(v) {
                if seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        seen.len() == self.vertices.len()
    }

    pub fn is_tree(&self) -> bool {
        self.vertices.is_empty() || (self.edges.len() + 1 == self.vertices.len() && self.is_connected())
    }

    /// Verifies that every AP is used by at most one edge and that AP usage
    /// flags agree with the edges.
    pub fn check_ap_exclusivity(&self) -> Result<(), GraphError> {
        let mut usage: HashMap<ApRef, usize> = HashMap::new();
        for edge in &self.edges {
            for end in [edge.src, edge.trg] {
                if self.ap(end).is_none() {
                    return Err(GraphError::UnknownAp(end));
                }
                *usage.entry(end).or_default() += 1;
            }
        }
        if let Some((&ap, &count)) = usage.iter().find(|&(_, &count)| count > 1) {
            return Err(GraphError::ApNotExclusive { ap, count });
        }
        for vertex in &self.vertices {
            for ap in &vertex.aps {
                let r = ApRef::new(vertex.id, ap.index);
                if ap.in_use != usage.contains_key(&r) {
                    return Err(GraphError::DanglingApFlag(r));
                }
            }
        }
        Ok(())
    }

    /// Whether any free AP has a class for which `requires_cap` holds.
    pub fn needs_capping_groups<F>(&self, requires_cap: F) -> bool
    where
        F: Fn(&ApClass) -> bool,
    {
        self.free_aps().into_iter().any(|r| {
            self.ap(r)
                .and_then(|ap| ap.class.as_ref())
                .is_some_and(&requires_cap)
        })
    }

    pub fn ring_closing_vertices(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .filter(|v| v.is_ring_closing())
            .map(|v| v.id)
            .collect()
    }

    pub fn unused_ring_closing_vertices(&self) -> Vec<VertexId> {
        self.ring_closing_vertices()
            .into_iter()
            .filter(|&v| !self.rings.iter().any(|r| r.head() == Some(v) || r.tail() == Some(v)))
            .collect()
    }

    /// Removes a vertex with at most one edge and returns the AP it was
    /// bonded to, which becomes free again.
    pub fn remove_leaf_vertex(&mut self, vertex: VertexId) -> Result<Option<ApRef>, GraphError> {
        self.vertex(vertex).ok_or(GraphError::UnknownVertex(vertex))?;
        let touching: Vec<usize> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.touches(vertex))
            .map(|(i, _)| i)
            .collect();
        if touching.len() > 1 || self.rings.iter().any(|r| r.contains(vertex)) {
            return Err(GraphError::NotALeaf(vertex));
        }

        let freed = touching.first().map(|&i| {
            let edge = self.edges.remove(i);
            if edge.src.vertex == vertex { edge.trg } else { edge.src }
        });
        if let Some(ap) = freed.and_then(|r| self.ap_mut(r)) {
            ap.in_use = false;
        }
        self.vertices.retain(|v| v.id != vertex);
        for set in &mut self.symmetric_sets {
            set.remove(vertex);
        }
        self.symmetric_sets.retain(|s| s.len() > 1);
        Ok(freed)
    }

    /// Removes every ring-closing attractor not involved in a ring and
    /// caps the AP it occupied when `cap_for` provides a capping group for
    /// that AP's class (`(vertex, cap AP index, bond type)`).
    pub fn replace_unused_rcvs_with_caps<F>(&mut self, cap_for: F) -> Result<usize, GraphError>
    where
        F: Fn(&ApClass) -> Option<(Vertex, usize, BondType)>,
    {
        let unused = self.unused_ring_closing_vertices();
        for &rcv in &unused {
            let Some(freed) = self.remove_leaf_vertex(rcv)? else {
                continue;
            };
            let cap = self
                .ap(freed)
                .and_then(|ap| ap.class.as_ref())
                .and_then(&cap_for);
            if let Some((cap, cap_ap, bond_type)) = cap {
                self.append_vertex_on_ap(freed, cap, cap_ap, bond_type)?;
            }
        }
        Ok(unused.len())
    }

    /// Deep copy carrying a new graph id.
    pub fn clone_with_id(&self, id: GraphId) -> Graph {
        let mut copy = self.clone();
        copy.id = id;
        copy
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.vertices.iter().map(Vertex::heavy_atom_count).sum()
    }

    /// Set of closed attractor pairs; two graphs with the same tree and the
    /// same signature are the same cyclic alternative.
    pub fn ring_signature(&self) -> BTreeSet<(VertexId, VertexId)> {
        self.rings.iter().filter_map(Ring::closing_pair).collect()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Graph {} [", self.id)?;
        for (i, v) in self.vertices.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", v.id, v.bb_type)?;
            if let Some(lib) = v.library_index {
                write!(f, "#{lib}")?;
            }
        }
        write!(f, "] edges={} rings={}", self.edges.len(), self.rings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::vertex::BuildingBlockType;

    fn block(bb_type: BuildingBlockType, classes: &[&str]) -> Vertex {
        let mut v = Vertex::new(VertexId(0), bb_type);
        for (i, c) in classes.iter().enumerate() {
            v.aps.push(AttachmentPoint::new(VertexId(0), i, Some(c.parse().unwrap())));
        }
        v
    }

    fn rcv() -> Vertex {
        block(BuildingBlockType::RingClosingAttractor, &["rca:0"])
    }

    /// scaffold(3 APs) with a chain on AP 0 and AP 1: s - f1 - rcv, s - f2 - rcv
    fn ring_ready_graph() -> Graph {
        let mut g = Graph::new(GraphId(1));
        let s = g.add_vertex(block(BuildingBlockType::Scaffold, &["a:0", "a:0", "a:0"]));
        let f1 = g
            .append_vertex_on_ap(ApRef::new(s, 0), block(BuildingBlockType::Fragment, &["a:1", "b:0"]), 0, BondType::Single)
            .unwrap();
        let f2 = g
            .append_vertex_on_ap(ApRef::new(s, 1), block(BuildingBlockType::Fragment, &["a:1", "b:0"]), 0, BondType::Single)
            .unwrap();
        g.append_vertex_on_ap(ApRef::new(f1, 1), rcv(), 0, BondType::Single).unwrap();
        g.append_vertex_on_ap(ApRef::new(f2, 1), rcv(), 0, BondType::Single).unwrap();
        g
    }

    #[test]
    fn append_marks_both_aps_and_rejects_reuse() {
        let mut g = Graph::new(GraphId(1));
        let s = g.add_vertex(block(BuildingBlockType::Scaffold, &["a:0"]));
        let f = g
            .append_vertex_on_ap(ApRef::new(s, 0), block(BuildingBlockType::Fragment, &["a:1"]), 0, BondType::Single)
            .unwrap();
        assert!(g.ap(ApRef::new(s, 0)).unwrap().in_use);
        assert!(g.ap(ApRef::new(f, 0)).unwrap().in_use);
        let err = g
            .append_vertex_on_ap(ApRef::new(s, 0), block(BuildingBlockType::Fragment, &["a:1"]), 0, BondType::Single)
            .unwrap_err();
        assert_eq!(err, GraphError::ApInUse(ApRef::new(s, 0)));
        assert_eq!(g.vertices().len(), 2);
        assert!(g.check_ap_exclusivity().is_ok());
        assert!(g.is_tree());
    }

    #[test]
    fn clone_is_independent_of_original() {
        let g = ring_ready_graph();
        let mut copy = g.clone_with_id(GraphId(2));
        let free = copy.free_aps()[0];
        copy.append_vertex_on_ap(free, block(BuildingBlockType::Cap, &["cap:0"]), 0, BondType::Single)
            .unwrap();
        assert_eq!(g.vertices().len(), 5);
        assert_eq!(copy.vertices().len(), 6);
        assert_eq!(g.id(), GraphId(1));
        assert!(g.ap(free).unwrap().is_free());
    }

    #[test]
    fn ring_requires_attractor_ends_and_tree_path() {
        let mut g = ring_ready_graph();
        let rcvs = g.ring_closing_vertices();
        assert_eq!(rcvs.len(), 2);
        let path = g.path_between(rcvs[0], rcvs[1]).unwrap();
        assert_eq!(path.len(), 5);

        let bad = Ring::new(vec![rcvs[0], rcvs[1]], BondType::Single);
        assert!(matches!(g.add_ring(bad), Err(GraphError::InvalidRingPath(_))));

        g.add_ring(Ring::new(path.clone(), BondType::Single)).unwrap();
        assert_eq!(
            g.add_ring(Ring::new(path, BondType::Single)),
            Err(GraphError::AlreadyInRing(rcvs[0]))
        );
        assert!(g.unused_ring_closing_vertices().is_empty());
    }

    #[test]
    fn unused_attractors_are_replaced_with_caps() {
        let mut g = ring_ready_graph();
        let cap = |class: &ApClass| {
            (class.rule == "b").then(|| (block(BuildingBlockType::Cap, &["cap:0"]), 0, BondType::Single))
        };
        assert_eq!(g.replace_unused_rcvs_with_caps(cap).unwrap(), 2);
        assert!(g.ring_closing_vertices().is_empty());
        assert_eq!(
            g.vertices().iter().filter(|v| v.bb_type == BuildingBlockType::Cap).count(),
            2
        );
        assert!(g.check_ap_exclusivity().is_ok());
        assert!(g.is_tree());
    }

    #[test]
    fn removing_an_inner_vertex_is_refused() {
        let mut g = ring_ready_graph();
        let root = g.root().unwrap().id;
        assert_eq!(g.remove_leaf_vertex(root), Err(GraphError::NotALeaf(root)));
    }

    #[test]
    fn capping_need_follows_free_ap_classes() {
        let g = ring_ready_graph();
        assert!(g.needs_capping_groups(|c| c.rule == "a"));
        assert!(!g.needs_capping_groups(|c| c.rule == "b"));
    }

    #[test]
    fn exclusivity_check_detects_inconsistent_flags() {
        let mut g = ring_ready_graph();
        let free = g.free_aps()[0];
        g.ap_mut(free).unwrap().in_use = true;
        assert_eq!(g.check_ap_exclusivity(), Err(GraphError::DanglingApFlag(free)));
    }
}
