use super::geometry::{centroid, rotation_from_axis_angle, rotation_to_align};
use super::{AssemblyError, StructureAssembler};
use crate::core::chem::element;
use crate::core::chem::structure::{Atom, ChemicalStructure};
use crate::core::models::attachment_point::ApRef;
use crate::core::models::graph::Graph;
use crate::core::models::ids::VertexId;
use crate::core::models::vertex::Vertex;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::f64::consts::TAU;
use tracing::trace;

/// Distance used for attachment points that declare no direction.
const DEFAULT_BOND_LENGTH: f64 = 1.5;

/// Assembles structures by walking the spanning tree of the graph from its
/// root, placing every building block relative to its parent.
#[derive(Debug, Clone)]
pub struct TreeAssembler {
    rng: StdRng,
}

struct Placement {
    offset: usize,
    pose: Isometry3<f64>,
}

impl TreeAssembler {
    /// Creates an assembler whose random torsions are reproducible.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    fn substructure(vertex: &Vertex) -> Result<&ChemicalStructure, AssemblyError> {
        vertex
            .substructure
            .as_ref()
            .ok_or(AssemblyError::MissingSubstructure(vertex.id))
    }

    fn source_atom(vertex: &Vertex, ap: usize) -> Result<usize, AssemblyError> {
        vertex
            .ap(ap)
            .and_then(|p| p.source_atom)
            .ok_or(AssemblyError::MissingSourceAtom(ApRef::new(vertex.id, ap)))
    }

    /// Unit vector pointing from the block's centre towards `point`.
    fn outward(point: &Point3<f64>, block: &ChemicalStructure) -> Vector3<f64> {
        let positions: Vec<Point3<f64>> = block.atoms().iter().map(|a| a.position).collect();
        let v = centroid(&positions).map_or_else(Vector3::zeros, |c| point - c);
        if v.norm() < 1e-6 { Vector3::x() } else { v.normalize() }
    }

    /// Source atom position and the point where the partner atom should sit,
    /// both in the block's own frame.
    fn ap_geometry(vertex: &Vertex, ap: usize) -> Result<(Point3<f64>, Point3<f64>), AssemblyError> {
        let block = Self::substructure(vertex)?;
        let atom = Self::source_atom(vertex, ap)?;
        let src = block
            .atom(atom)
            .map(|a| a.position)
            .ok_or(AssemblyError::MissingSourceAtom(ApRef::new(vertex.id, ap)))?;
        let dir = match vertex.ap(ap).and_then(|p| p.direction) {
            Some([x, y, z]) => Point3::new(x, y, z),
            None => src + Self::outward(&src, block) * DEFAULT_BOND_LENGTH,
        };
        Ok((src, dir))
    }

    /// Pose that puts the child's AP atom on the parent's AP direction point,
    /// with the child's AP axis pointing back at the parent atom.
    fn child_pose(
        &mut self,
        parent: &Vertex,
        parent_pose: &Isometry3<f64>,
        parent_ap: usize,
        child: &Vertex,
        child_ap: usize,
    ) -> Result<Isometry3<f64>, AssemblyError> {
        let (p_src, p_dir) = Self::ap_geometry(parent, parent_ap)?;
        let (p_src, p_dir) = (parent_pose * p_src, parent_pose * p_dir);
        let (c_src, c_dir) = Self::ap_geometry(child, child_ap)?;

        let target_axis = p_src - p_dir;
        let child_axis = c_dir - c_src;
        let rotation = if target_axis.norm() < 1e-6 || child_axis.norm() < 1e-6 {
            nalgebra::Rotation3::identity()
        } else {
            let torsion = rotation_from_axis_angle(&target_axis, self.rng.gen_range(0.0..TAU));
            torsion * rotation_to_align(&child_axis, &target_axis)
        };
        let translation = p_dir.coords - rotation * c_src.coords;
        Ok(Isometry3::from_parts(
            Translation3::from(translation),
            UnitQuaternion::from_rotation_matrix(&rotation),
        ))
    }

    fn place(out: &mut ChemicalStructure, vertex: &Vertex, pose: &Isometry3<f64>) -> Result<usize, AssemblyError> {
        let block = Self::substructure(vertex)?;
        let offset = out.atom_count();
        for atom in block.atoms() {
            let mut copy: Atom = atom.clone();
            copy.position = pose * atom.position;
            copy.vertex_id = Some(vertex.id);
            out.add_atom(copy);
        }
        for bond in block.bonds() {
            out.add_bond(bond.atom1 + offset, bond.atom2 + offset, bond.bond_type);
        }
        Ok(offset)
    }

    fn atom_of(graph: &Graph, placed: &HashMap<VertexId, Placement>, ap: ApRef) -> Result<usize, AssemblyError> {
        let vertex = graph.vertex(ap.vertex).ok_or(AssemblyError::Disconnected(ap.vertex))?;
        let placement = placed.get(&ap.vertex).ok_or(AssemblyError::Disconnected(ap.vertex))?;
        Ok(placement.offset + Self::source_atom(vertex, ap.ap)?)
    }
}

impl StructureAssembler for TreeAssembler {
    fn assemble(&mut self, graph: &Graph, align: bool) -> Result<ChemicalStructure, AssemblyError> {
        let root = graph.root().ok_or(AssemblyError::EmptyGraph)?;
        let mut out = ChemicalStructure::new(&format!("graph_{}", graph.id()));
        let mut placed: HashMap<VertexId, Placement> = HashMap::new();

        let offset = Self::place(&mut out, root, &Isometry3::identity())?;
        placed.insert(
            root.id,
            Placement {
                offset,
                pose: Isometry3::identity(),
            },
        );

        let mut queue = VecDeque::from([root.id]);
        while let Some(current) = queue.pop_front() {
            for edge in graph.edges().iter().filter(|e| e.touches(current)) {
                let (mine, theirs) = if edge.src.vertex == current {
                    (edge.src, edge.trg)
                } else {
                    (edge.trg, edge.src)
                };
                if placed.contains_key(&theirs.vertex) {
                    continue;
                }
                let parent = graph.vertex(current).ok_or(AssemblyError::Disconnected(current))?;
                let child = graph
                    .vertex(theirs.vertex)
                    .ok_or(AssemblyError::Disconnected(theirs.vertex))?;
                let pose = if align {
                    let parent_pose = placed[&current].pose;
                    self.child_pose(parent, &parent_pose, mine.ap, child, theirs.ap)?
                } else {
                    Isometry3::identity()
                };
                let offset = Self::place(&mut out, child, &pose)?;
                placed.insert(child.id, Placement { offset, pose });
                queue.push_back(child.id);
            }
        }
        if let Some(missing) = graph.vertices().iter().find(|v| !placed.contains_key(&v.id)) {
            return Err(AssemblyError::Disconnected(missing.id));
        }

        for edge in graph.edges().iter().filter(|e| e.bond_type.is_chemical()) {
            let a = Self::atom_of(graph, &placed, edge.src)?;
            let b = Self::atom_of(graph, &placed, edge.trg)?;
            out.add_bond(a, b, edge.bond_type);
        }

        // Each ring becomes a bond between the atoms holding its two attractors.
        for ring in graph.rings().iter().filter(|r| r.bond_type.is_chemical()) {
            let mut ends = Vec::with_capacity(2);
            for rcv in [ring.head(), ring.tail()].into_iter().flatten() {
                let edge = graph
                    .parent_edge(rcv)
                    .or_else(|| graph.edges().iter().find(|e| e.touches(rcv)))
                    .ok_or(AssemblyError::DetachedRingClosure(rcv))?;
                let holder = if edge.trg.vertex == rcv { edge.src } else { edge.trg };
                ends.push(Self::atom_of(graph, &placed, holder)?);
            }
            if let [a, b] = ends[..] {
                out.add_bond(a, b, ring.bond_type);
            }
        }

        let (structure, _) = out.retain_atoms(|a| !element::is_ring_closure_pseudo_atom(&a.symbol));
        trace!(graph = %graph.id(), atoms = structure.atom_count(), "Structure assembled");
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::bond::BondType;
    use crate::core::models::attachment_point::AttachmentPoint;
    use crate::core::models::ids::GraphId;
    use crate::core::models::ring::Ring;
    use crate::core::models::vertex::BuildingBlockType;

    /// A one-atom block whose APs sit on its only atom.
    fn block(bb_type: BuildingBlockType, symbol: &str, dirs: &[[f64; 3]]) -> Vertex {
        let mut v = Vertex::new(VertexId(0), bb_type);
        let mut s = ChemicalStructure::new(symbol);
        s.add_atom(Atom::new(symbol, Point3::origin()));
        for (i, d) in dirs.iter().enumerate() {
            let mut ap = AttachmentPoint::new(VertexId(0), i, Some("x:0".parse().unwrap()));
            ap.source_atom = Some(0);
            ap.direction = Some(*d);
            v.aps.push(ap);
        }
        v.substructure = Some(s);
        v
    }

    fn carbon(n_aps: usize) -> Vertex {
        let dirs = [[1.5, 0.0, 0.0], [-1.5, 0.0, 0.0], [0.0, 1.5, 0.0], [0.0, -1.5, 0.0]];
        block(BuildingBlockType::Fragment, "C", &dirs[..n_aps])
    }

    #[test]
    fn aligned_child_sits_on_parent_direction() {
        let mut g = Graph::new(GraphId(1));
        let root = g.add_vertex(carbon(1));
        g.append_vertex_on_ap(ApRef::new(root, 0), carbon(1), 0, BondType::Single)
            .unwrap();
        let s = TreeAssembler::new(7).assemble(&g, true).unwrap();
        assert_eq!(s.atom_count(), 2);
        assert_eq!(s.bond_count(), 1);
        assert!((s.distance(0, 1).unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(s.atoms()[1].vertex_id, Some(VertexId(1)));
    }

    #[test]
    fn unaligned_assembly_keeps_block_coordinates() {
        let mut g = Graph::new(GraphId(1));
        let root = g.add_vertex(carbon(1));
        g.append_vertex_on_ap(ApRef::new(root, 0), carbon(1), 0, BondType::Double)
            .unwrap();
        let s = TreeAssembler::new(7).assemble(&g, false).unwrap();
        assert_eq!(s.distance(0, 1), Some(0.0));
        assert_eq!(s.bonds()[0].bond_type, BondType::Double);
    }

    #[test]
    fn rings_become_bonds_and_attractors_disappear() {
        // C1 - C0 - C2, with an attractor on each outer carbon.
        let mut g = Graph::new(GraphId(1));
        let c0 = g.add_vertex(carbon(2));
        let c1 = g
            .append_vertex_on_ap(ApRef::new(c0, 0), carbon(2), 0, BondType::Single)
            .unwrap();
        let c2 = g
            .append_vertex_on_ap(ApRef::new(c0, 1), carbon(2), 0, BondType::Single)
            .unwrap();
        let rca = || block(BuildingBlockType::RingClosingAttractor, "ATP", &[[1.0, 0.0, 0.0]]);
        let r1 = g.append_vertex_on_ap(ApRef::new(c1, 1), rca(), 0, BondType::Single).unwrap();
        let r2 = g.append_vertex_on_ap(ApRef::new(c2, 1), rca(), 0, BondType::Single).unwrap();
        let path = g.path_between(r1, r2).unwrap();
        g.add_ring(Ring::new(path, BondType::Single)).unwrap();

        let s = TreeAssembler::new(1).assemble(&g, true).unwrap();
        assert_eq!(s.atom_count(), 3);
        assert!(s.atoms().iter().all(|a| a.symbol == "C"));
        assert_eq!(s.bond_count(), 3);
        assert_eq!(s.cycle_count(), 1);
    }

    #[test]
    fn missing_substructure_is_reported() {
        let mut g = Graph::new(GraphId(1));
        let id = g.add_vertex(Vertex::new(VertexId(0), BuildingBlockType::Scaffold));
        assert!(matches!(
            TreeAssembler::new(0).assemble(&g, false),
            Err(AssemblyError::MissingSubstructure(v)) if v == id
        ));
    }

    #[test]
    fn empty_graph_is_rejected() {
        assert!(matches!(
            TreeAssembler::new(0).assemble(&Graph::new(GraphId(1)), true),
            Err(AssemblyError::EmptyGraph)
        ));
    }
}
