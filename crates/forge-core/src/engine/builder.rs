use super::cancel::CancellationToken;
use super::context::RunContext;
use super::enumerator::Combination;
use super::error::EngineError;
use super::rings::cyclic_alternatives;
use super::scheduler::BatchTask;
use super::storage::StoredGraph;
use super::tasks::fitness::{FitnessTask, candidate_name};
use super::validation::{ValidationPayload, check_consistency};
use crate::core::models::candidate::Candidate;
use crate::core::models::graph::Graph;
use crate::core::models::ids::{GraphId, TaskId};
use crate::core::models::symmetry::SymmetricSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Applies one combination to a private copy of a root graph and carries
/// the result through validation, ring closure, storage and scoring.
pub struct GraphBuildingTask {
    id: TaskId,
    level: usize,
    root_id: GraphId,
    graph: Graph,
    combination: Combination,
    ctx: Arc<RunContext>,
}

impl GraphBuildingTask {
    pub fn new(ctx: Arc<RunContext>, root: &Graph, level: usize, combination: Combination) -> Self {
        Self {
            id: ctx.counters.next_task_id(),
            level,
            root_id: root.id(),
            graph: root.clone_with_id(ctx.counters.next_graph_id()),
            combination,
            ctx,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Attaches every building block of the combination and registers the
    /// symmetric sets they form. Returns the number of vertices added.
    pub fn attach(&mut self) -> Result<usize, EngineError> {
        let context = || format!("combination {:?}", self.combination.pointer);
        let mut groups: BTreeMap<usize, SymmetricSet> = BTreeMap::new();
        let mut added = 0;
        for attachment in &self.combination.attachments {
            let choice = attachment.choice;
            if !choice.bb_type.attaches() {
                continue;
            }
            let vertex = self.ctx.space.new_vertex(choice.bb_type, choice.library_index)?;
            let bond_type = self
                .graph
                .ap(attachment.parent)
                .and_then(|ap| ap.class.as_ref())
                .map(|class| self.ctx.space.bond_type_for(class))
                .unwrap_or_default();
            let id = self
                .graph
                .append_vertex_on_ap(attachment.parent, vertex, choice.ap, bond_type)
                .map_err(|e| EngineError::build(context(), e))?;
            groups.entry(attachment.symmetry_group).or_default().insert(id);
            added += 1;
        }
        for set in groups.into_values().filter(|s| s.len() > 1) {
            self.graph.add_symmetric_set(set);
        }
        Ok(added)
    }

    fn store(&self, graph: &Graph, accepted: bool) -> Result<(), EngineError> {
        self.ctx.storage.store(&StoredGraph {
            graph: graph.clone(),
            level: self.level,
            parent_graph: Some(self.root_id),
            combination: self.combination.pointer.clone(),
            accepted,
        })?;
        Ok(())
    }

    /// Turns a final graph into a candidate. The graph is stored as built;
    /// the candidate gets a copy whose leftover ring-closing attractors have
    /// become capping groups, with its structure assembled unless
    /// validation already produced it.
    fn finalize(&self, graph: &Graph, payload: Option<ValidationPayload>) -> Result<Candidate, EngineError> {
        self.store(graph, true)?;

        let space = &self.ctx.space;
        let mut capped = graph.clone();
        let removed = capped
            .replace_unused_rcvs_with_caps(|class| space.cap_for(class))
            .map_err(|e| EngineError::build(format!("capping graph {}", graph.id()), e))?;
        let align = self.ctx.options.align_structures;
        let (structure, smiles, uid) = match payload {
            Some(p) if removed == 0 && !align => (p.structure, p.smiles, p.uid),
            _ => {
                let structure = self.ctx.assemble(&capped, align)?;
                let (smiles, uid) = self.ctx.describe(&structure);
                (structure, smiles, uid)
            }
        };

        let mut candidate = Candidate::new(String::new(), capped);
        candidate.structure = Some(structure);
        candidate.smiles = smiles;
        candidate.uid = uid;
        candidate.level = Some(self.level);
        candidate.parent_graph = Some(self.root_id);
        Ok(candidate)
    }

    /// Candidate recording why a cyclic alternative could not be finalized.
    fn failed_alternative(&self, graph: Graph, error: &EngineError) -> Candidate {
        let mut candidate = Candidate::new(candidate_name(self.ctx.counters.next_candidate_index()), graph);
        candidate.set_error(error.to_string());
        candidate.level = Some(self.level);
        candidate.parent_graph = Some(self.root_id);
        candidate
    }

    fn score(&self, candidate: Candidate, token: &CancellationToken) -> Result<Candidate, EngineError> {
        if self.ctx.fitness().is_some() {
            return FitnessTask::new(&self.ctx, candidate).run_with_token(&self.ctx, token);
        }
        let mut candidate = candidate;
        candidate.name = candidate_name(self.ctx.counters.next_candidate_index());
        Ok(candidate)
    }

    /// Builds the graph and returns the candidates it produced: none for
    /// rejected graphs and intermediates, one for an acyclic molecule, one
    /// per buildable cyclic alternative otherwise.
    #[instrument(skip_all, name = "graph_building_task", fields(task = %self.id, graph = %self.graph.id()))]
    pub fn run(mut self, token: &CancellationToken) -> Result<Vec<Candidate>, EngineError> {
        token.check()?;
        let added = self.attach()?;
        debug!(added, "Building blocks attached");

        token.check()?;
        let Some(payload) = check_consistency(&self.graph, &self.ctx)? else {
            self.store(&self.graph, false)?;
            return Ok(Vec::new());
        };

        let space = Arc::clone(&self.ctx.space);
        if self.graph.needs_capping_groups(|class| space.requires_cap(class)) {
            debug!("Graph still needs capping groups; stored for the next level");
            self.store(&self.graph, true)?;
            return Ok(Vec::new());
        }

        let alternatives = if space.has_ring_closures() {
            cyclic_alternatives(&self.graph, &space, &self.ctx.options.rings, &self.ctx.counters, token)?
        } else {
            Vec::new()
        };

        if alternatives.is_empty() {
            let candidate = self.finalize(&self.graph, Some(payload))?;
            return Ok(vec![self.score(candidate, token)?]);
        }

        debug!(alternatives = alternatives.len(), "Cyclic alternatives found");
        let mut candidates = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            token.check()?;
            let candidate = match self.finalize(&alternative, None) {
                Ok(c) => c,
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    let error = e.in_context(format!("cyclic graph {}", alternative.id()));
                    warn!(%error, "Cyclic alternative failed");
                    candidates.push(self.failed_alternative(alternative, &error));
                    continue;
                }
            };
            candidates.push(self.score(candidate, token)?);
        }
        Ok(candidates)
    }
}

impl BatchTask for GraphBuildingTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn execute(self: Box<Self>, token: &CancellationToken) -> Result<Vec<Candidate>, EngineError> {
        self.run(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::bond::BondType;
    use crate::core::chem::structure::{Atom, ChemicalStructure};
    use crate::core::fragspace::{BuildingBlock, CompatibilityRules, FragmentChoice, FragmentSpace};
    use crate::core::models::attachment_point::{ApClass, ApRef, AttachmentPoint};
    use crate::core::models::ids::VertexId;
    use crate::core::models::vertex::{BuildingBlockType, Vertex};
    use crate::engine::enumerator::{Attachment, CombinationEnumerator};
    use nalgebra::Point3;
    use std::collections::HashMap;

    fn class(s: &str) -> ApClass {
        s.parse().unwrap()
    }

    /// A heavy atom with `hydrogens` H atoms and one AP per class, all on
    /// the heavy atom.
    fn block(name: &str, bb_type: BuildingBlockType, symbol: &str, hydrogens: usize, classes: &[&str]) -> BuildingBlock {
        let mut s = ChemicalStructure::new(name);
        s.add_atom(Atom::new(symbol, Point3::origin()));
        for i in 0..hydrogens {
            let h = s.add_atom(Atom::new("H", Point3::new(-1.0, i as f64, 0.0)));
            s.add_bond(0, h, BondType::Single);
        }
        let mut vertex = Vertex::new(VertexId(0), bb_type);
        for (i, c) in classes.iter().enumerate() {
            let mut ap = AttachmentPoint::new(VertexId(0), i, Some(class(c)));
            ap.source_atom = Some(0);
            ap.direction = Some([1.5, i as f64, 0.0]);
            vertex.aps.push(ap);
        }
        vertex.substructure = Some(s);
        BuildingBlock {
            name: name.into(),
            vertex,
        }
    }

    fn space(capped: bool) -> FragmentSpace {
        let mut rules = CompatibilityRules {
            compatibility: HashMap::from([
                (class("c:0"), vec![class("f:0")]),
                (class("n:0"), vec![class("f:0")]),
            ]),
            ..Default::default()
        };
        if capped {
            rules.capping = HashMap::from([(class("n:0"), class("h:0"))]);
        }
        FragmentSpace::from_parts(
            vec![block("methylene", BuildingBlockType::Scaffold, "C", 2, &["c:0", "c:0"])],
            vec![
                block("hydroxyl", BuildingBlockType::Fragment, "O", 1, &["f:0"]),
                block("carbon", BuildingBlockType::Fragment, "C", 4, &["f:0"]),
                block("amine", BuildingBlockType::Fragment, "N", 1, &["f:0", "n:0"]),
            ],
            vec![block("H", BuildingBlockType::Cap, "H", 0, &["h:0"])],
            rules,
        )
        .unwrap()
    }

    fn root(space: &FragmentSpace) -> Graph {
        let mut g = Graph::new(GraphId(1));
        g.add_vertex(space.new_vertex(BuildingBlockType::Scaffold, 0).unwrap());
        g
    }

    fn context(space: FragmentSpace, dir: &std::path::Path) -> Arc<RunContext> {
        Arc::new(RunContext::new(Arc::new(space), dir))
    }

    fn attachment(ap: usize, bb_type: BuildingBlockType, library_index: usize, group: usize) -> Attachment {
        Attachment {
            parent: ApRef::new(VertexId(0), ap),
            choice: FragmentChoice {
                bb_type,
                library_index,
                ap: 0,
            },
            symmetry_group: group,
        }
    }

    fn combination(attachments: Vec<Attachment>) -> Combination {
        Combination {
            pointer: vec![0; attachments.len()],
            attachments,
        }
    }

    #[test]
    fn empty_slots_attach_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let ctx = context(space, dir.path());
        let mut task = GraphBuildingTask::new(
            ctx,
            &root,
            1,
            combination(vec![
                attachment(0, BuildingBlockType::Fragment, 0, 0),
                attachment(1, BuildingBlockType::None, 0, 1),
            ]),
        );
        assert_eq!(task.attach().unwrap(), 1);
        assert_eq!(task.graph().vertices().len(), 2);
        assert!(task.graph().symmetric_sets().is_empty());
        assert_ne!(task.graph().id(), root.id());
        assert_eq!(root.vertices().len(), 1);
    }

    #[test]
    fn same_symmetry_group_forms_one_set() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let mut task = GraphBuildingTask::new(
            context(space, dir.path()),
            &root,
            1,
            combination(vec![
                attachment(0, BuildingBlockType::Fragment, 0, 3),
                attachment(1, BuildingBlockType::Fragment, 0, 3),
            ]),
        );
        assert_eq!(task.attach().unwrap(), 2);
        let sets = task.graph().symmetric_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
    }

    #[test]
    fn finished_molecule_becomes_a_stored_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let ctx = context(space, dir.path());
        let task = GraphBuildingTask::new(
            Arc::clone(&ctx),
            &root,
            1,
            combination(vec![
                attachment(0, BuildingBlockType::Fragment, 0, 0),
                attachment(1, BuildingBlockType::Fragment, 0, 1),
            ]),
        );
        let graph_id = task.graph().id();
        let candidates = task.run(&CancellationToken::new()).unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.name, "M00000001");
        assert_eq!(c.smiles, "OCO");
        assert_eq!(c.level, Some(1));
        assert_eq!(c.parent_graph, Some(root.id()));
        assert!(!c.has_fitness());

        let stored = ctx.storage.load_level(1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].graph.id(), graph_id);
        assert!(stored[0].accepted);
    }

    #[test]
    fn rejected_graph_is_stored_but_not_scored() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let ctx = context(space, dir.path());
        // A fully saturated carbon cannot take one more bond.
        let task = GraphBuildingTask::new(
            Arc::clone(&ctx),
            &root,
            1,
            combination(vec![attachment(0, BuildingBlockType::Fragment, 1, 0)]),
        );
        assert!(task.run(&CancellationToken::new()).unwrap().is_empty());
        let stored = ctx.storage.load_level(1).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].accepted);
    }

    #[test]
    fn graph_needing_caps_is_an_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(true);
        let root = root(&space);
        let ctx = context(space, dir.path());
        let task = GraphBuildingTask::new(
            Arc::clone(&ctx),
            &root,
            1,
            combination(vec![attachment(0, BuildingBlockType::Fragment, 2, 0)]),
        );
        assert!(task.run(&CancellationToken::new()).unwrap().is_empty());
        let stored = ctx.storage.load_level(1).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].accepted);
        assert_eq!(stored[0].combination, vec![0]);
    }

    #[test]
    fn enumerated_combinations_build_without_setup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let ctx = context(space.clone(), dir.path());
        let token = CancellationToken::new();
        let mut produced = 0;
        for combination in CombinationEnumerator::new(&root, &space).unwrap() {
            let task = GraphBuildingTask::new(Arc::clone(&ctx), &root, 1, combination);
            produced += task.run(&token).unwrap().len();
        }
        assert!(produced > 0);
        assert_eq!(ctx.storage.count_level(1).unwrap(), 15);
    }

    #[test]
    fn cancelled_token_stops_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let space = space(false);
        let root = root(&space);
        let task = GraphBuildingTask::new(
            context(space, dir.path()),
            &root,
            1,
            combination(vec![attachment(0, BuildingBlockType::Fragment, 0, 0)]),
        );
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(task.run(&token), Err(EngineError::Cancelled)));
    }

    /// A methine scaffold holding three carbon arms, each with a free
    /// ring-closing AP. With `bare_caps`, leftover attractors are replaced
    /// by a cap that has no structure and cannot be assembled.
    fn ring_space(bare_caps: bool) -> FragmentSpace {
        let mut rules = CompatibilityRules {
            compatibility: HashMap::from([
                (class("c:0"), vec![class("f:0")]),
                (class("r:0"), vec![class("rc:0")]),
            ]),
            ring_closures: HashMap::from([(class("r:0"), vec![class("r:0")])]),
            ..Default::default()
        };
        let mut caps = Vec::new();
        if bare_caps {
            rules.capping = HashMap::from([(class("r:0"), class("h:0"))]);
            let mut vertex = Vertex::new(VertexId(0), BuildingBlockType::Cap);
            vertex.aps.push(AttachmentPoint::new(VertexId(0), 0, Some(class("h:0"))));
            caps.push(BuildingBlock {
                name: "bare".into(),
                vertex,
            });
        }
        FragmentSpace::from_parts(
            vec![block("methine", BuildingBlockType::Scaffold, "C", 1, &["c:0", "c:0", "c:0"])],
            vec![
                block("arm", BuildingBlockType::Fragment, "C", 2, &["f:0", "r:0"]),
                block("rca", BuildingBlockType::RingClosingAttractor, "ATP", 0, &["rc:0"]),
            ],
            caps,
            rules,
        )
        .unwrap()
    }

    fn armed_root(space: &FragmentSpace) -> (Graph, Vec<VertexId>) {
        let mut g = root(space);
        let arms = (0..3)
            .map(|ap| {
                let arm = space.new_vertex(BuildingBlockType::Fragment, 0).unwrap();
                g.append_vertex_on_ap(ApRef::new(VertexId(0), ap), arm, 0, BondType::Single)
                    .unwrap()
            })
            .collect();
        (g, arms)
    }

    fn attractors_on(arms: &[VertexId]) -> Combination {
        combination(
            arms.iter()
                .enumerate()
                .map(|(group, &arm)| Attachment {
                    parent: ApRef::new(arm, 1),
                    choice: FragmentChoice {
                        bb_type: BuildingBlockType::RingClosingAttractor,
                        library_index: 1,
                        ap: 0,
                    },
                    symmetry_group: group,
                })
                .collect(),
        )
    }

    #[test]
    fn ring_closures_yield_one_candidate_per_alternative() {
        let dir = tempfile::tempdir().unwrap();
        let space = ring_space(false);
        let (root, arms) = armed_root(&space);
        let ctx = context(space, dir.path());
        let task = GraphBuildingTask::new(Arc::clone(&ctx), &root, 2, attractors_on(&arms));

        let candidates = task.run(&CancellationToken::new()).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["M00000001", "M00000002", "M00000003"]);
        for c in &candidates {
            assert!(c.error().is_none());
            assert_eq!(c.graph.rings().len(), 1);
            assert!(c.graph.unused_ring_closing_vertices().is_empty());
            assert_eq!(c.structure.as_ref().unwrap().formula(), "C4H7");
        }
        let signatures: std::collections::HashSet<_> =
            candidates.iter().map(|c| c.graph.ring_signature()).collect();
        assert_eq!(signatures.len(), 3);
    }

    #[test]
    fn stored_cyclic_graphs_keep_their_free_attractors() {
        let dir = tempfile::tempdir().unwrap();
        let space = ring_space(false);
        let (root, arms) = armed_root(&space);
        let ctx = context(space, dir.path());
        let task = GraphBuildingTask::new(Arc::clone(&ctx), &root, 2, attractors_on(&arms));
        let candidates = task.run(&CancellationToken::new()).unwrap();

        let stored = ctx.storage.load_level(2).unwrap();
        assert_eq!(stored.len(), 3);
        for record in &stored {
            assert!(record.accepted);
            assert_eq!(record.graph.rings().len(), 1);
            assert_eq!(record.graph.unused_ring_closing_vertices().len(), 1);
            assert_eq!(record.graph.vertices().len(), 7);
        }
        assert!(candidates.iter().all(|c| c.graph.vertices().len() == 6));
    }

    #[test]
    fn failed_alternatives_become_error_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let space = ring_space(true);
        let (root, arms) = armed_root(&space);
        let ctx = context(space, dir.path());
        let task = GraphBuildingTask::new(Arc::clone(&ctx), &root, 2, attractors_on(&arms));

        let candidates = task.run(&CancellationToken::new()).unwrap();
        assert_eq!(candidates.len(), 3);
        for c in &candidates {
            let error = c.error().unwrap();
            assert!(error.contains("cyclic graph"), "{error}");
            assert!(!c.has_fitness());
            assert_eq!(c.level, Some(2));
            assert_eq!(c.parent_graph, Some(root.id()));
        }
        assert_eq!(ctx.storage.count_level(2).unwrap(), 3);
    }
}
