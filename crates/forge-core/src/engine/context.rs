use super::cancel::CancellationToken;
use super::config::BuildOptions;
use super::storage::LevelStorage;
use super::tasks::fitness::FitnessSettings;
use crate::core::assembly::{
    AssemblyError, CanonicalIdentifier, DepictionRenderer, MolecularIdentifier, StructureAssembler,
    SvgDepiction, TreeAssembler,
};
use crate::core::chem::structure::ChemicalStructure;
use crate::core::fragspace::FragmentSpace;
use crate::core::models::candidate::{NO_SMILES, UNDEFINED_UID};
use crate::core::models::graph::Graph;
use crate::core::models::ids::{GraphId, TaskId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Values of the run-wide counters, as saved in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CounterSnapshot {
    pub graph_id: u64,
    pub candidate: u64,
    pub task: u64,
}

/// Run-scoped id allocation. Every counter hands out unique, increasing
/// values under concurrent use.
#[derive(Debug, Default)]
pub struct Counters {
    graph_id: AtomicU64,
    candidate: AtomicU64,
    task: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CounterSnapshot) -> Self {
        Self {
            graph_id: AtomicU64::new(snapshot.graph_id),
            candidate: AtomicU64::new(snapshot.candidate),
            task: AtomicU64::new(snapshot.task),
        }
    }

    pub fn next_graph_id(&self) -> GraphId {
        GraphId(self.graph_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Global candidate index, used to name output files.
    pub fn next_candidate_index(&self) -> u64 {
        self.candidate.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.task.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Makes sure ids already present in loaded graphs are never reissued.
    pub fn observe_graph_id(&self, id: GraphId) {
        self.graph_id.fetch_max(id.0, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            graph_id: self.graph_id.load(Ordering::SeqCst),
            candidate: self.candidate.load(Ordering::SeqCst),
            task: self.task.load(Ordering::SeqCst),
        }
    }
}

/// Everything the tasks of one run share.
pub struct RunContext {
    pub space: Arc<FragmentSpace>,
    pub counters: Counters,
    pub options: BuildOptions,
    pub storage: LevelStorage,
    pub token: CancellationToken,
    pub work_dir: PathBuf,
    assembler: Mutex<Box<dyn StructureAssembler>>,
    identifier: Arc<dyn MolecularIdentifier>,
    renderer: Arc<dyn DepictionRenderer>,
    fitness: Option<FitnessSettings>,
}

impl RunContext {
    pub fn new(space: Arc<FragmentSpace>, work_dir: &Path) -> Self {
        Self {
            space,
            counters: Counters::new(),
            options: BuildOptions::default(),
            storage: LevelStorage::new(work_dir),
            token: CancellationToken::new(),
            work_dir: work_dir.to_path_buf(),
            assembler: Mutex::new(Box::new(TreeAssembler::from_entropy())),
            identifier: Arc::new(CanonicalIdentifier),
            renderer: Arc::new(SvgDepiction),
            fitness: None,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_assembler(mut self, assembler: Box<dyn StructureAssembler>) -> Self {
        self.assembler = Mutex::new(assembler);
        self
    }

    pub fn with_identifier(mut self, identifier: Arc<dyn MolecularIdentifier>) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DepictionRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_fitness(mut self, fitness: FitnessSettings) -> Self {
        self.fitness = Some(fitness);
        self
    }

    pub fn fitness(&self) -> Option<&FitnessSettings> {
        self.fitness.as_ref()
    }

    pub fn renderer(&self) -> &dyn DepictionRenderer {
        self.renderer.as_ref()
    }

    /// Runs the shared assembler; only one assembly is in flight at a time.
    pub fn assemble(&self, graph: &Graph, align: bool) -> Result<ChemicalStructure, AssemblyError> {
        let mut assembler = self
            .assembler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        assembler.assemble(graph, align)
    }

    /// SMILES and unique key of a structure, with the conventional
    /// placeholders when the identifier cannot produce them.
    pub fn describe(&self, structure: &ChemicalStructure) -> (String, String) {
        let smiles = self.identifier.smiles(structure).unwrap_or_else(|e| {
            debug!(error = %e, "No SMILES for structure '{}'", structure.title);
            NO_SMILES.to_string()
        });
        let uid = self.identifier.unique_key(structure).unwrap_or_else(|e| {
            debug!(error = %e, "No unique key for structure '{}'", structure.title);
            UNDEFINED_UID.to_string()
        });
        (smiles, uid)
    }
}
