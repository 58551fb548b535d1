use crate::core::assembly::tree_builder::TreeAssembler;
use crate::core::chem::tags;
use crate::core::fitness::patterns::SimplePatternMatcher;
use crate::core::fragspace::FragmentSpace;
use crate::core::io::graph_json;
use crate::core::io::sdf::SdfFile;
use crate::core::io::traits::ChemicalFile;
use crate::core::models::candidate::Candidate;
use crate::core::models::graph::Graph;
use crate::core::models::ids::GraphId;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::EvaluationConfig;
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::{BatchTask, TaskBatchManager};
use crate::engine::storage::StorageError;
use crate::engine::tasks::fitness::{FitnessJob, FitnessSettings};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// What to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationInput {
    /// A JSON graph, assembled into a structure before scoring.
    Graph(PathBuf),
    /// The first structure of an SD file, scored as it is.
    Structure(PathBuf),
}

impl EvaluationInput {
    /// Picks the kind of input from the file extension: `.json` is a graph,
    /// anything else a structure file.
    pub fn from_path(path: PathBuf) -> Self {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json { Self::Graph(path) } else { Self::Structure(path) }
    }
}

#[instrument(skip_all, name = "evaluate_workflow")]
pub fn run(
    config: &EvaluationConfig,
    input: &EvaluationInput,
    reporter: &ProgressReporter,
) -> Result<Candidate, EngineError> {
    run_with_token(config, input, reporter, &CancellationToken::new())
}

/// Scores a single graph or structure and writes its output file to the
/// work directory. Fatal fitness failures are returned as errors; a
/// recoverable one leaves its message on the returned candidate.
pub fn run_with_token(
    config: &EvaluationConfig,
    input: &EvaluationInput,
    reporter: &ProgressReporter,
    token: &CancellationToken,
) -> Result<Candidate, EngineError> {
    // === Phase 0: Preparation ===
    reporter.phase("Preparation");
    fs::create_dir_all(&config.work_dir).map_err(|source| StorageError::Io {
        path: config.work_dir.display().to_string(),
        source,
    })?;
    let space = match &config.fragment_space_path {
        Some(path) => FragmentSpace::load(path)?,
        None => FragmentSpace::default(),
    };
    let assembler = match config.random_seed {
        Some(seed) => TreeAssembler::new(seed),
        None => TreeAssembler::from_entropy(),
    };
    let settings = FitnessSettings::from_config(&config.fitness, Arc::new(SimplePatternMatcher))?;
    let mut ctx = RunContext::new(Arc::new(space), &config.work_dir)
        .with_token(token.clone())
        .with_assembler(Box::new(assembler))
        .with_fitness(settings);
    ctx.options.align_structures = config.align_structures;
    let ctx = Arc::new(ctx);

    let candidate = load_candidate(&ctx, input)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Fitness ===
    reporter.phase("Fitness evaluation");
    let manager = TaskBatchManager::new(token, Duration::from_secs(5));
    let job: Box<dyn BatchTask> = Box::new(FitnessJob::new(Arc::clone(&ctx), candidate));
    let mut scored = manager.execute_tasks(vec![job], 1, reporter)?;
    let candidate = scored
        .pop()
        .ok_or_else(|| EngineError::Internal("fitness evaluation produced no candidate".to_string()))?;
    reporter.report(Progress::CandidateRecorded {
        name: candidate.name.clone(),
        fitness: candidate.fitness(),
    });
    reporter.report(Progress::PhaseFinish);

    info!(
        candidate = %candidate.name,
        fitness = ?candidate.fitness(),
        error = ?candidate.error(),
        "Evaluation complete."
    );
    Ok(candidate)
}

fn load_candidate(ctx: &RunContext, input: &EvaluationInput) -> Result<Candidate, EngineError> {
    match input {
        EvaluationInput::Graph(path) => {
            let mut graph = graph_json::read_from_path(path)
                .map_err(|e| EngineError::Configuration(format!("input graph '{}': {e}", path.display())))?;
            let space = &ctx.space;
            let capped = graph
                .replace_unused_rcvs_with_caps(|class| space.cap_for(class))
                .map_err(|e| EngineError::build("capping input graph", e))?;
            if capped > 0 {
                info!(capped, "Unused ring-closing attractors replaced by capping groups.");
            }
            let structure = ctx.assemble(&graph, ctx.options.align_structures)?;
            let (smiles, uid) = ctx.describe(&structure);
            let mut candidate = Candidate::new(String::new(), graph);
            candidate.structure = Some(structure);
            candidate.smiles = smiles;
            candidate.uid = uid;
            Ok(candidate)
        }
        EvaluationInput::Structure(path) => {
            let structure = SdfFile::read_from_path(path)
                .map_err(|e| EngineError::Configuration(format!("input structure '{}': {e}", path.display())))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    EngineError::Configuration(format!("input structure '{}' is empty", path.display()))
                })?;
            // Structures written by an exploration carry their graph.
            let graph = structure
                .property(tags::GRAPH)
                .and_then(|json| graph_json::from_str(json).ok())
                .unwrap_or_else(|| Graph::new(GraphId(0)));
            let (smiles, uid) = ctx.describe(&structure);
            let mut candidate = Candidate::new(String::new(), graph);
            candidate.structure = Some(structure);
            candidate.smiles = smiles;
            candidate.uid = uid;
            Ok(candidate)
        }
    }
}
