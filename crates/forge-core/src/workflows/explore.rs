use crate::core::assembly::tree_builder::TreeAssembler;
use crate::core::fitness::patterns::SimplePatternMatcher;
use crate::core::fragspace::FragmentSpace;
use crate::core::io::graph_json;
use crate::core::models::candidate::Candidate;
use crate::core::models::graph::Graph;
use crate::core::models::ids::GraphId;
use crate::core::models::vertex::BuildingBlockType;
use crate::engine::builder::GraphBuildingTask;
use crate::engine::cancel::CancellationToken;
use crate::engine::checkpoint::{Checkpoint, CheckpointError};
use crate::engine::config::ExplorationConfig;
use crate::engine::context::{Counters, RunContext};
use crate::engine::enumerator::{CombinationEnumerator, CombinationPointer};
use crate::engine::error::{BatchError, EngineError};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::{BatchTask, TaskBatchManager};
use crate::engine::storage::{StorageError, StoredGraph};
use crate::engine::tasks::fitness::FitnessSettings;
use std::fs;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What an exploration run achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplorationSummary {
    /// Highest level whose graphs were all built.
    pub levels_completed: usize,
    /// Graph-building tasks run in this session.
    pub graphs_built: usize,
    /// Candidates recorded in this session.
    pub candidates: usize,
    /// Candidates of this session that carry an error instead of a fitness.
    pub failed: usize,
    /// Fittest candidate recorded in the work directory so far.
    pub best: Option<(String, f64)>,
}

impl ExplorationSummary {
    fn record(&mut self, candidates: &[Candidate]) {
        self.candidates += candidates.len();
        self.failed += candidates.iter().filter(|c| c.error().is_some()).count();
    }
}

/// Where to pick up the enumeration of a level.
#[derive(Debug, Clone, Default)]
struct ResumePoint {
    level: usize,
    root_index: usize,
    root_graph: Option<GraphId>,
    pointer: CombinationPointer,
}

#[instrument(skip_all, name = "explore_workflow")]
pub fn run(config: &ExplorationConfig, reporter: &ProgressReporter) -> Result<ExplorationSummary, EngineError> {
    run_with_token(config, reporter, &CancellationToken::new())
}

/// Like [`run`], stopping at the next safe point once `token` is cancelled.
/// The checkpoint written before stopping lets a later run resume.
pub fn run_with_token(
    config: &ExplorationConfig,
    reporter: &ProgressReporter,
    token: &CancellationToken,
) -> Result<ExplorationSummary, EngineError> {
    // === Phase 0: Preparation ===
    reporter.phase("Preparation");
    let work_dir = &config.work_dir;
    fs::create_dir_all(work_dir).map_err(|source| StorageError::Io {
        path: work_dir.display().to_string(),
        source,
    })?;

    let checkpoint = Checkpoint::load(work_dir)?;
    match (&checkpoint, config.resume) {
        (Some(_), false) => {
            return Err(EngineError::Configuration(format!(
                "'{}' already holds a checkpoint; resume the run or choose another work directory",
                Checkpoint::path(work_dir).display()
            )));
        }
        (None, true) => info!("No checkpoint found; starting a new exploration."),
        _ => {}
    }

    let space = Arc::new(FragmentSpace::load(&config.fragment_space_path)?);
    info!(
        scaffolds = space.library(BuildingBlockType::Scaffold).len(),
        fragments = space.library(BuildingBlockType::Fragment).len(),
        caps = space.library(BuildingBlockType::Cap).len(),
        "Fragment space loaded."
    );

    let counters = checkpoint
        .as_ref()
        .map_or_else(Counters::new, |cp| Counters::from_snapshot(cp.counters));
    let assembler = match config.random_seed {
        Some(seed) => TreeAssembler::new(seed),
        None => TreeAssembler::from_entropy(),
    };
    let mut ctx = RunContext::new(Arc::clone(&space), work_dir)
        .with_options(config.build)
        .with_counters(counters)
        .with_token(token.clone())
        .with_assembler(Box::new(assembler));
    if let Some(fitness) = &config.fitness {
        ctx = ctx.with_fitness(FitnessSettings::from_config(fitness, Arc::new(SimplePatternMatcher))?);
    } else {
        info!("No fitness provider configured; candidates are built but not scored.");
    }
    let ctx = Arc::new(ctx);

    let mut summary = ExplorationSummary::default();
    let resume = match checkpoint {
        Some(cp) if cp.completed => {
            info!(level = cp.level, "Checkpoint marks the exploration as completed.");
            summary.levels_completed = cp.level;
            summary.best = best_recorded(&ctx)?;
            reporter.report(Progress::PhaseFinish);
            return Ok(summary);
        }
        Some(cp) => {
            info!(level = cp.level, root = cp.root_index, "Resuming exploration from checkpoint.");
            ResumePoint {
                level: cp.level,
                root_index: cp.root_index,
                root_graph: cp.root_graph,
                pointer: cp.next_combination,
            }
        }
        None => {
            let roots = create_roots(config, &ctx)?;
            info!(roots = roots, "Root graphs stored at level 0.");
            ResumePoint {
                level: 1,
                ..Default::default()
            }
        }
    };
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Level-by-level expansion ===
    let manager = TaskBatchManager::new(token, config.termination_timeout);
    let mut resume = Some(resume);
    let mut level = resume.as_ref().map_or(1, |r| r.level);
    while level <= config.max_level {
        let roots = ctx.storage.load_level(level - 1)?;
        if roots.is_empty() {
            info!(level, "No graphs to expand; exploration ends.");
            break;
        }
        reporter.phase(format!("Level {level}"));
        info!(level, roots = roots.len(), "Expanding level.");

        let start = resume.take().filter(|r| r.level == level).unwrap_or_default();
        for (root_index, root) in roots.iter().enumerate().skip(start.root_index) {
            let pointer = if root_index == start.root_index {
                check_root(&start, level, root_index, &root.graph)?;
                discard_unfinished(&ctx, level, &root.graph, &start.pointer)?;
                start.pointer.clone()
            } else {
                Vec::new()
            };
            expand_root(config, &ctx, &manager, reporter, level, root_index, &root.graph, pointer, &mut summary)?;
        }

        reporter.report(Progress::PhaseFinish);
        level += 1;
        save_checkpoint(&ctx, level, 0, None, Vec::new(), false)?;
    }

    // === Phase 2: Wrap up ===
    summary.levels_completed = level - 1;
    save_checkpoint(&ctx, summary.levels_completed, 0, None, Vec::new(), true)?;
    summary.best = best_recorded(&ctx)?;
    info!(
        levels = summary.levels_completed,
        graphs = summary.graphs_built,
        candidates = summary.candidates,
        "Exploration complete."
    );
    Ok(summary)
}

/// Stores the level-0 graphs: the supplied root graphs, or one graph per
/// scaffold of the fragment space.
fn create_roots(config: &ExplorationConfig, ctx: &RunContext) -> Result<usize, EngineError> {
    let mut roots = Vec::new();
    if config.root_graphs.is_empty() {
        for index in 0..ctx.space.library(BuildingBlockType::Scaffold).len() {
            let mut graph = Graph::new(ctx.counters.next_graph_id());
            graph.add_vertex(ctx.space.new_vertex(BuildingBlockType::Scaffold, index)?);
            roots.push(graph);
        }
    } else {
        for path in &config.root_graphs {
            let graph = graph_json::read_from_path(path).map_err(|e| {
                EngineError::Configuration(format!("root graph '{}': {e}", path.display()))
            })?;
            ctx.counters.observe_graph_id(graph.id());
            roots.push(graph);
        }
    }
    if roots.is_empty() {
        return Err(EngineError::Configuration(
            "nothing to explore: no root graphs and no scaffolds".to_string(),
        ));
    }
    for graph in &roots {
        ctx.storage.store(&StoredGraph {
            graph: graph.clone(),
            level: 0,
            parent_graph: None,
            combination: Vec::new(),
            accepted: true,
        })?;
    }
    save_checkpoint(ctx, 1, 0, None, Vec::new(), false)?;
    Ok(roots.len())
}

/// A checkpoint that names a root must still find that root at its index.
fn check_root(start: &ResumePoint, level: usize, index: usize, root: &Graph) -> Result<(), EngineError> {
    match start.root_graph {
        Some(expected) if expected != root.id() => Err(CheckpointError::Mismatch {
            level,
            index,
            expected,
            found: Some(root.id()),
        }
        .into()),
        _ => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_root(
    config: &ExplorationConfig,
    ctx: &Arc<RunContext>,
    manager: &TaskBatchManager,
    reporter: &ProgressReporter,
    level: usize,
    root_index: usize,
    root: &Graph,
    pointer: CombinationPointer,
    summary: &mut ExplorationSummary,
) -> Result<(), EngineError> {
    let mut enumerator = CombinationEnumerator::new(root, &ctx.space)?;
    if !pointer.is_empty() {
        enumerator = enumerator.starting_at(pointer)?;
    }

    loop {
        ctx.token.check()?;
        let batch_start = enumerator.pointer().map(<[usize]>::to_vec);
        let tasks: Vec<Box<dyn BatchTask>> = enumerator
            .by_ref()
            .take(config.batch_size)
            .map(|c| Box::new(GraphBuildingTask::new(Arc::clone(ctx), root, level, c)) as Box<dyn BatchTask>)
            .collect();
        if tasks.is_empty() {
            break;
        }
        summary.graphs_built += tasks.len();

        match manager.execute_tasks(tasks, config.num_parallel_tasks, reporter) {
            Ok(candidates) => {
                record(ctx, reporter, &candidates, summary)?;
                match enumerator.pointer() {
                    Some(next) => save_checkpoint(ctx, level, root_index, Some(root), next.to_vec(), false)?,
                    None => save_checkpoint(ctx, level, root_index + 1, None, Vec::new(), false)?,
                }
            }
            Err(err) => {
                // The interrupted batch is rebuilt in full on resume, so
                // nothing it produced is kept.
                let batch_start = batch_start.unwrap_or_default();
                for candidate in err.completed() {
                    for file in [&candidate.output_file, &candidate.image_file].into_iter().flatten() {
                        let _ = fs::remove_file(file);
                    }
                }
                discard_unfinished(ctx, level, root, &batch_start)?;
                save_checkpoint(ctx, level, root_index, Some(root), batch_start, false)?;
                if let BatchError::Stopped { completed, total } = &err {
                    warn!(completed = completed.len(), total, "Exploration stopped; checkpoint saved.");
                }
                return Err(err.into());
            }
        }
    }
    Ok(())
}

/// Removes what a batch that never completed left in the archive: graphs
/// built from combinations at or after `from`, their summary rows and the
/// files those rows point at.
fn discard_unfinished(ctx: &RunContext, level: usize, root: &Graph, from: &[usize]) -> Result<(), EngineError> {
    let graphs = ctx.storage.discard_from(level, root.id(), from)?;
    if graphs.is_empty() {
        return Ok(());
    }
    let rows = ctx.storage.remove_candidates(&graphs)?;
    for file in rows.iter().filter_map(|r| r.output_file.as_deref()) {
        let _ = fs::remove_file(file);
    }
    warn!(
        level,
        root = %root.id(),
        graphs = graphs.len(),
        rows = rows.len(),
        "Discarded the output of an unfinished batch."
    );
    Ok(())
}

fn record(
    ctx: &RunContext,
    reporter: &ProgressReporter,
    candidates: &[Candidate],
    summary: &mut ExplorationSummary,
) -> Result<(), EngineError> {
    ctx.storage.append_candidates(candidates)?;
    for candidate in candidates {
        reporter.report(Progress::CandidateRecorded {
            name: candidate.name.clone(),
            fitness: candidate.fitness(),
        });
    }
    summary.record(candidates);
    Ok(())
}

fn save_checkpoint(
    ctx: &RunContext,
    level: usize,
    root_index: usize,
    root: Option<&Graph>,
    next_combination: CombinationPointer,
    completed: bool,
) -> Result<(), EngineError> {
    Checkpoint {
        level,
        root_index,
        root_graph: root.map(Graph::id),
        next_combination,
        completed,
        counters: ctx.counters.snapshot(),
    }
    .save(&ctx.work_dir)?;
    Ok(())
}

fn best_recorded(ctx: &RunContext) -> Result<Option<(String, f64)>, EngineError> {
    Ok(ctx
        .storage
        .read_candidates()?
        .into_iter()
        .filter_map(|r| r.fitness.map(|f| (r.name, f)))
        .max_by(|a, b| a.1.total_cmp(&b.1)))
}
