use super::external::{ExternalFitness, ExternalOutcome, ExternalRequest};
use crate::core::chem::structure::{Atom, ChemicalStructure};
use crate::core::chem::tags;
use crate::core::fitness::FitnessProvider;
use crate::core::fitness::patterns::PatternMatcher;
use crate::core::io::graph_json;
use crate::core::io::sdf::SdfFile;
use crate::core::io::traits::ChemicalFile;
use crate::core::models::candidate::Candidate;
use crate::core::models::ids::TaskId;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::{FitnessConfig, FitnessProviderConfig};
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::scheduler::BatchTask;
use crate::engine::storage::StorageError;
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Error message recorded when the internal provider yields NaN.
pub const NAN_FITNESS_MESSAGE: &str = "#InternalFitness: NaN value";

#[derive(Debug)]
pub enum FitnessMethod {
    Internal(FitnessProvider),
    External(ExternalFitness),
}

/// Ready-to-use fitness evaluation of a run.
#[derive(Debug)]
pub struct FitnessSettings {
    pub method: FitnessMethod,
    pub fitness_required: bool,
    pub make_pictures: bool,
}

impl FitnessSettings {
    /// Prepares the configured provider. Expression variables without a
    /// descriptor, or unknown descriptors, are configuration errors.
    pub fn from_config(config: &FitnessConfig, matcher: Arc<dyn PatternMatcher>) -> Result<Self, EngineError> {
        let method = match &config.provider {
            FitnessProviderConfig::Internal {
                expression,
                descriptors,
            } => FitnessMethod::Internal(
                FitnessProvider::new(descriptors, expression, matcher)
                    .map_err(|e| EngineError::Configuration(format!("fitness provider: {e}")))?,
            ),
            FitnessProviderConfig::External {
                interpreter,
                script,
                uid_registry,
            } => {
                if !script.is_file() {
                    return Err(EngineError::Configuration(format!(
                        "fitness provider script '{}' not found",
                        script.display()
                    )));
                }
                FitnessMethod::External(ExternalFitness::new(
                    interpreter.clone(),
                    script.clone(),
                    uid_registry.clone(),
                ))
            }
        };
        Ok(Self {
            method,
            fitness_required: config.fitness_required,
            make_pictures: config.make_pictures,
        })
    }
}

/// Files written for one candidate, named after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFiles {
    pub input: PathBuf,
    pub output: PathBuf,
    pub image: PathBuf,
}

impl CandidateFiles {
    pub fn new(work_dir: &Path, name: &str) -> Self {
        Self {
            input: work_dir.join(format!("{name}_inp.sdf")),
            output: work_dir.join(format!("{name}_out.sdf")),
            image: work_dir.join(format!("{name}.svg")),
        }
    }
}

/// Name of the candidate with the given global index.
pub fn candidate_name(index: u64) -> String {
    format!("M{index:08}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitnessTaskState {
    Created,
    StructureReady,
    Scored,
    Failed,
}

/// Computes and records the fitness of a single candidate.
#[derive(Debug)]
pub struct FitnessTask {
    id: TaskId,
    candidate: Candidate,
    files: CandidateFiles,
    state: FitnessTaskState,
}

fn sdf_error(path: &Path) -> impl FnOnce(crate::core::io::sdf::SdfError) -> EngineError {
    let path = path.display().to_string();
    move |source| StorageError::Sdf { path, source }.into()
}

/// Stand-in structure for candidates whose provider output was lost.
fn placeholder(title: &str) -> ChemicalStructure {
    let mut s = ChemicalStructure::new(title);
    s.add_atom(Atom::new("H", Point3::origin()));
    s
}

impl FitnessTask {
    /// Takes the next global candidate index, which names the candidate and
    /// its files.
    pub fn new(ctx: &RunContext, mut candidate: Candidate) -> Self {
        candidate.name = candidate_name(ctx.counters.next_candidate_index());
        let files = CandidateFiles::new(&ctx.work_dir, &candidate.name);
        Self {
            id: ctx.counters.next_task_id(),
            candidate,
            files,
            state: FitnessTaskState::Created,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> FitnessTaskState {
        self.state
    }

    pub fn files(&self) -> &CandidateFiles {
        &self.files
    }

    /// Runs the evaluation to completion.
    ///
    /// The returned candidate carries either a fitness or an error message.
    /// Errors are returned only for failures that must end the run: a fatal
    /// descriptor problem, a crashing external provider, a missing fitness
    /// when one is required, cancellation, or I/O failures.
    pub fn run(self, ctx: &RunContext) -> Result<Candidate, EngineError> {
        let token = ctx.token.clone();
        self.run_with_token(ctx, &token)
    }

    /// Like [`FitnessTask::run`], observing `token` instead of the run-wide
    /// token, so that a batch can be stopped on its own.
    #[instrument(skip_all, name = "fitness_task", fields(task = %self.id, candidate = %self.candidate.name))]
    pub fn run_with_token(mut self, ctx: &RunContext, token: &CancellationToken) -> Result<Candidate, EngineError> {
        match self.evaluate(ctx, token) {
            Ok(()) => {
                self.state = FitnessTaskState::Scored;
                Ok(self.candidate)
            }
            Err(e) => {
                self.state = FitnessTaskState::Failed;
                Err(e)
            }
        }
    }

    fn evaluate(&mut self, ctx: &RunContext, token: &CancellationToken) -> Result<(), EngineError> {
        token.check()?;
        let settings = ctx
            .fitness()
            .ok_or_else(|| EngineError::Internal("fitness task started without a fitness provider".to_string()))?;

        let mut structure = match self.candidate.structure.take() {
            Some(s) => s,
            None => ctx.assemble(&self.candidate.graph, ctx.options.align_structures)?,
        };
        self.decorate(&mut structure)?;
        self.state = FitnessTaskState::StructureReady;
        token.check()?;

        let structure = match &settings.method {
            FitnessMethod::Internal(provider) => self.score_internally(provider, structure)?,
            FitnessMethod::External(external) => {
                self.score_externally(external, settings.fitness_required, structure, &ctx.work_dir, token)?
            }
        };

        SdfFile::write_one_to_path(&structure, &self.files.output).map_err(sdf_error(&self.files.output))?;
        self.candidate.output_file = Some(self.files.output.clone());

        if settings.make_pictures && self.candidate.has_fitness() {
            match ctx.renderer().render(&structure, &self.files.image) {
                Ok(()) => self.candidate.image_file = Some(self.files.image.clone()),
                Err(e) => warn!(error = %e, "Could not depict candidate"),
            }
        }
        self.candidate.structure = Some(structure);

        match (self.candidate.fitness(), self.candidate.error()) {
            (Some(fitness), _) => info!(fitness, uid = %self.candidate.uid, "Candidate scored"),
            (None, error) => info!(error = error.unwrap_or(""), "Candidate recorded without fitness"),
        }
        Ok(())
    }

    /// Title and provenance tags of the structure handed to the provider.
    fn decorate(&self, structure: &mut ChemicalStructure) -> Result<(), EngineError> {
        let c = &self.candidate;
        structure.title = c.name.clone();
        structure.set_property(tags::UID, &c.uid);
        structure.set_property(tags::SMILES, &c.smiles);
        if let Some(parent) = c.parent_graph {
            structure.set_property(tags::PARENT_GRAPH, parent);
        }
        if let Some(level) = c.level {
            structure.set_property(tags::GRAPH_LEVEL, level);
        }
        let json = graph_json::to_string(&c.graph)
            .map_err(|e| EngineError::Internal(format!("cannot serialize graph {}: {e}", c.graph_id())))?;
        structure.set_property(tags::GRAPH, json);
        Ok(())
    }

    fn record_error(&mut self, structure: &mut ChemicalStructure, message: String) {
        warn!(message = %message, "Candidate has no fitness");
        structure.remove_property(tags::FITNESS);
        structure.set_property(tags::ERROR, &message);
        self.candidate.set_error(message);
    }

    fn score_internally(
        &mut self,
        provider: &FitnessProvider,
        mut structure: ChemicalStructure,
    ) -> Result<ChemicalStructure, EngineError> {
        match provider.fitness(&mut structure) {
            Ok(value) if value.is_nan() => self.record_error(&mut structure, NAN_FITNESS_MESSAGE.to_string()),
            Ok(value) => self.candidate.set_fitness(value),
            Err(e) if e.is_recoverable() => self.record_error(&mut structure, format!("#InternalFitness: {e}")),
            Err(e) => return Err(e.into()),
        }
        Ok(structure)
    }

    fn score_externally(
        &mut self,
        external: &ExternalFitness,
        fitness_required: bool,
        structure: ChemicalStructure,
        work_dir: &Path,
        token: &CancellationToken,
    ) -> Result<ChemicalStructure, EngineError> {
        SdfFile::write_one_to_path(&structure, &self.files.input).map_err(sdf_error(&self.files.input))?;
        let request = ExternalRequest {
            input: &self.files.input,
            output: &self.files.output,
            work_dir,
            task: self.id,
        };
        match external.run(&request, token)? {
            ExternalOutcome::Structure(mut returned) => {
                self.absorb(&mut returned, &structure, fitness_required)?;
                Ok(returned)
            }
            ExternalOutcome::Unreadable { backup, .. } => {
                let see = backup.as_deref().unwrap_or(&self.files.output);
                let mut stand_in = placeholder(&self.candidate.name);
                self.record_error(
                    &mut stand_in,
                    format!("#FTask: Unable to retrieve data. See {}", see.display()),
                );
                Ok(stand_in)
            }
        }
    }

    /// Reads the provider's verdict from the tags of the returned structure.
    fn absorb(
        &mut self,
        returned: &mut ChemicalStructure,
        sent: &ChemicalStructure,
        fitness_required: bool,
    ) -> Result<(), EngineError> {
        for (key, value) in sent.properties() {
            if returned.property(key).is_none() {
                returned.set_property(key, value);
            }
        }
        returned.title = self.candidate.name.clone();
        if let Some(uid) = returned.property(tags::UID) {
            self.candidate.uid = uid.trim().to_string();
        }

        if let Some(message) = returned.property(tags::ERROR).map(|m| m.trim().to_string()) {
            debug!(message = %message, "Provider reported an error");
            self.candidate.set_error(message);
            return Ok(());
        }
        let problem = match returned.property(tags::FITNESS).map(str::trim) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if !value.is_nan() => {
                    self.candidate.set_fitness(value);
                    return Ok(());
                }
                _ => format!("#FTask: Fitness value '{raw}' is not a number"),
            },
            None => format!(
                "#FTask: Neither {} nor {} tag in '{}'",
                tags::FITNESS,
                tags::ERROR,
                self.files.output.display()
            ),
        };
        if fitness_required {
            return Err(EngineError::ExternalProcess(problem));
        }
        self.record_error(returned, problem);
        Ok(())
    }
}

/// A [`FitnessTask`] bundled with its run context for the batch scheduler.
pub struct FitnessJob {
    task: FitnessTask,
    ctx: Arc<RunContext>,
}

impl FitnessJob {
    pub fn new(ctx: Arc<RunContext>, candidate: Candidate) -> Self {
        Self {
            task: FitnessTask::new(&ctx, candidate),
            ctx,
        }
    }
}

impl BatchTask for FitnessJob {
    fn id(&self) -> TaskId {
        self.task.id()
    }

    fn execute(self: Box<Self>, token: &CancellationToken) -> Result<Vec<Candidate>, EngineError> {
        let Self { task, ctx } = *self;
        task.run_with_token(&ctx, token).map(|c| vec![c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::bond::BondType;
    use crate::core::fitness::DescriptorSpec;
    use crate::core::fitness::patterns::SimplePatternMatcher;
    use crate::core::fragspace::FragmentSpace;
    use crate::core::models::graph::Graph;
    use crate::core::models::ids::GraphId;
    use crate::engine::config::FitnessConfigBuilder;

    fn water() -> ChemicalStructure {
        let mut s = ChemicalStructure::new("water");
        let o = s.add_atom(Atom::new("O", Point3::origin()));
        for x in [-0.8, 0.8] {
            let h = s.add_atom(Atom::new("H", Point3::new(x, 0.6, 0.0)));
            s.add_bond(o, h, BondType::Single);
        }
        s
    }

    fn spec(variable: &str, descriptor: &str) -> DescriptorSpec {
        DescriptorSpec {
            variable: variable.into(),
            descriptor: descriptor.into(),
            pattern: None,
            result_index: None,
        }
    }

    fn context(dir: &Path, expression: &str, pictures: bool) -> RunContext {
        let config = FitnessConfigBuilder::new()
            .internal(expression, vec![spec("heavy", "nHeavyAtoms"), spec("atoms", "nAtoms")])
            .make_pictures(pictures)
            .build()
            .unwrap();
        let settings = FitnessSettings::from_config(&config, Arc::new(SimplePatternMatcher)).unwrap();
        RunContext::new(Arc::new(FragmentSpace::default()), dir).with_fitness(settings)
    }

    fn candidate() -> Candidate {
        let mut c = Candidate::new("pending", Graph::new(GraphId(9)));
        c.structure = Some(water());
        c.level = Some(1);
        c.parent_graph = Some(GraphId(2));
        c
    }

    #[test]
    fn internal_fitness_is_recorded_with_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "atoms * 2 + heavy", true);
        let task = FitnessTask::new(&ctx, candidate());
        assert_eq!(task.state(), FitnessTaskState::Created);
        let scored = task.run(&ctx).unwrap();

        assert_eq!(scored.name, "M00000001");
        assert_eq!(scored.fitness(), Some(7.0));
        let output = scored.output_file.clone().unwrap();
        assert_eq!(output, dir.path().join("M00000001_out.sdf"));
        let written = SdfFile::read_from_path(&output).unwrap().remove(0);
        assert_eq!(written.title, "M00000001");
        assert_eq!(written.property(tags::FITNESS), Some("7"));
        assert_eq!(written.property(tags::PARENT_GRAPH), Some("2"));
        assert!(written.property(tags::GRAPH).is_some());
        assert!(scored.image_file.unwrap().is_file());
    }

    #[test]
    fn nan_fitness_becomes_an_error_tag() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "(heavy - 1) / (heavy - 1)", true);
        let scored = FitnessTask::new(&ctx, candidate()).run(&ctx).unwrap();
        assert!(scored.fitness().is_none());
        assert_eq!(scored.error(), Some(NAN_FITNESS_MESSAGE));
        let written = SdfFile::read_from_path(scored.output_file.unwrap()).unwrap().remove(0);
        assert!(written.property(tags::FITNESS).is_none());
        assert_eq!(written.property(tags::ERROR), Some(NAN_FITNESS_MESSAGE));
        assert!(scored.image_file.is_none());
    }

    #[test]
    fn candidate_names_are_padded() {
        assert_eq!(candidate_name(42), "M00000042");
        let files = CandidateFiles::new(Path::new("/w"), "M00000042");
        assert_eq!(files.input, Path::new("/w/M00000042_inp.sdf"));
        assert_eq!(files.image, Path::new("/w/M00000042.svg"));
    }

    #[test]
    fn unknown_expression_variable_is_a_configuration_error() {
        let config = FitnessConfigBuilder::new()
            .internal("missing + 1", vec![spec("heavy", "nHeavyAtoms")])
            .build()
            .unwrap();
        assert!(matches!(
            FitnessSettings::from_config(&config, Arc::new(SimplePatternMatcher)),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn missing_external_script_is_a_configuration_error() {
        let config = FitnessConfigBuilder::new()
            .external("sh", PathBuf::from("/nonexistent/score.sh"), None)
            .build()
            .unwrap();
        assert!(matches!(
            FitnessSettings::from_config(&config, Arc::new(SimplePatternMatcher)),
            Err(EngineError::Configuration(_))
        ));
    }
}
