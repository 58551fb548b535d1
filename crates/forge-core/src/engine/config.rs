use crate::core::fitness::DescriptorSpec;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Bounds on the ring closures tried when expanding cyclic alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingClosureConfig {
    /// Minimum number of vertices on the path joining two attractors,
    /// attractors included.
    pub min_ring_path: usize,
    pub max_ring_path: usize,
    /// Upper bound on the cyclic alternatives generated from one graph.
    pub max_alternatives: usize,
}

impl Default for RingClosureConfig {
    fn default() -> Self {
        Self {
            min_ring_path: 4,
            max_ring_path: 12,
            max_alternatives: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GraphConstraints {
    pub max_heavy_atoms: Option<usize>,
    pub max_molecular_weight: Option<f64>,
}

/// Options shared by every graph-building task of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BuildOptions {
    /// Roto-translate building blocks along attachment-point directions.
    pub align_structures: bool,
    pub rings: RingClosureConfig,
    pub constraints: GraphConstraints,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitnessProviderConfig {
    Internal {
        expression: String,
        descriptors: Vec<DescriptorSpec>,
    },
    External {
        interpreter: String,
        script: PathBuf,
        uid_registry: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitnessConfig {
    pub provider: FitnessProviderConfig,
    /// When set, a missing or unparsable fitness from the external provider
    /// ends the run instead of being recorded on the candidate.
    pub fitness_required: bool,
    pub make_pictures: bool,
}

#[derive(Default)]
pub struct FitnessConfigBuilder {
    provider: Option<FitnessProviderConfig>,
    fitness_required: Option<bool>,
    make_pictures: Option<bool>,
}

impl FitnessConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn internal(mut self, expression: impl Into<String>, descriptors: Vec<DescriptorSpec>) -> Self {
        self.provider = Some(FitnessProviderConfig::Internal {
            expression: expression.into(),
            descriptors,
        });
        self
    }
    pub fn external(mut self, interpreter: impl Into<String>, script: PathBuf, uid_registry: Option<PathBuf>) -> Self {
        self.provider = Some(FitnessProviderConfig::External {
            interpreter: interpreter.into(),
            script,
            uid_registry,
        });
        self
    }
    pub fn fitness_required(mut self, required: bool) -> Self {
        self.fitness_required = Some(required);
        self
    }
    pub fn make_pictures(mut self, enabled: bool) -> Self {
        self.make_pictures = Some(enabled);
        self
    }

    pub fn build(self) -> Result<FitnessConfig, ConfigError> {
        let provider = self
            .provider
            .ok_or(ConfigError::MissingParameter("fitness_provider"))?;
        if let FitnessProviderConfig::Internal { expression, .. } = &provider {
            if expression.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    parameter: "expression",
                    reason: "the fitness expression is empty".to_string(),
                });
            }
        }
        Ok(FitnessConfig {
            provider,
            fitness_required: self.fitness_required.unwrap_or(true),
            make_pictures: self.make_pictures.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationConfig {
    pub fragment_space_path: PathBuf,
    pub work_dir: PathBuf,
    /// JSON graphs to start from; one root per scaffold when empty.
    pub root_graphs: Vec<PathBuf>,
    /// Candidates are only scored when a fitness provider is configured.
    pub fitness: Option<FitnessConfig>,
    pub max_level: usize,
    pub num_parallel_tasks: usize,
    pub batch_size: usize,
    pub build: BuildOptions,
    pub random_seed: Option<u64>,
    pub termination_timeout: Duration,
    pub resume: bool,
}

impl ExplorationConfig {
    pub fn submits_fitness(&self) -> bool {
        self.fitness.is_some()
    }
}

#[derive(Default)]
pub struct ExplorationConfigBuilder {
    fragment_space_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    root_graphs: Vec<PathBuf>,
    fitness: Option<FitnessConfig>,
    max_level: Option<usize>,
    num_parallel_tasks: Option<usize>,
    batch_size: Option<usize>,
    build: BuildOptions,
    random_seed: Option<u64>,
    termination_timeout: Option<Duration>,
    resume: bool,
}

impl ExplorationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment_space_path(mut self, path: PathBuf) -> Self {
        self.fragment_space_path = Some(path);
        self
    }
    pub fn work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = Some(path);
        self
    }
    pub fn root_graphs(mut self, paths: Vec<PathBuf>) -> Self {
        self.root_graphs = paths;
        self
    }
    pub fn fitness(mut self, fitness: FitnessConfig) -> Self {
        self.fitness = Some(fitness);
        self
    }
    pub fn max_level(mut self, level: usize) -> Self {
        self.max_level = Some(level);
        self
    }
    pub fn num_parallel_tasks(mut self, n: usize) -> Self {
        self.num_parallel_tasks = Some(n);
        self
    }
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }
    pub fn align_structures(mut self, align: bool) -> Self {
        self.build.align_structures = align;
        self
    }
    pub fn ring_closures(mut self, rings: RingClosureConfig) -> Self {
        self.build.rings = rings;
        self
    }
    pub fn constraints(mut self, constraints: GraphConstraints) -> Self {
        self.build.constraints = constraints;
        self
    }
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
    pub fn termination_timeout(mut self, timeout: Duration) -> Self {
        self.termination_timeout = Some(timeout);
        self
    }
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn build(self) -> Result<ExplorationConfig, ConfigError> {
        let rings = self.build.rings;
        if rings.min_ring_path > rings.max_ring_path {
            return Err(ConfigError::InvalidValue {
                parameter: "max_ring_path",
                reason: format!(
                    "{} is smaller than min_ring_path {}",
                    rings.max_ring_path, rings.min_ring_path
                ),
            });
        }
        let num_parallel_tasks = self.num_parallel_tasks.unwrap_or(1);
        let batch_size = self.batch_size.unwrap_or(num_parallel_tasks * 4);
        if num_parallel_tasks == 0 || batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "num_parallel_tasks",
                reason: "worker count and batch size must be positive".to_string(),
            });
        }
        Ok(ExplorationConfig {
            fragment_space_path: self
                .fragment_space_path
                .ok_or(ConfigError::MissingParameter("fragment_space_path"))?,
            work_dir: self
                .work_dir
                .ok_or(ConfigError::MissingParameter("work_dir"))?,
            root_graphs: self.root_graphs,
            fitness: self.fitness,
            max_level: self
                .max_level
                .ok_or(ConfigError::MissingParameter("max_level"))?,
            num_parallel_tasks,
            batch_size,
            build: self.build,
            random_seed: self.random_seed,
            termination_timeout: self.termination_timeout.unwrap_or(Duration::from_secs(30)),
            resume: self.resume,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    /// Needed only to cap unused ring-closing attractors of graph inputs.
    pub fragment_space_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub fitness: FitnessConfig,
    pub align_structures: bool,
    pub random_seed: Option<u64>,
}

#[derive(Default)]
pub struct EvaluationConfigBuilder {
    fragment_space_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    fitness: Option<FitnessConfig>,
    align_structures: bool,
    random_seed: Option<u64>,
}

impl EvaluationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment_space_path(mut self, path: PathBuf) -> Self {
        self.fragment_space_path = Some(path);
        self
    }
    pub fn work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = Some(path);
        self
    }
    pub fn fitness(mut self, fitness: FitnessConfig) -> Self {
        self.fitness = Some(fitness);
        self
    }
    pub fn align_structures(mut self, align: bool) -> Self {
        self.align_structures = align;
        self
    }
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<EvaluationConfig, ConfigError> {
        Ok(EvaluationConfig {
            fragment_space_path: self.fragment_space_path,
            work_dir: self
                .work_dir
                .ok_or(ConfigError::MissingParameter("work_dir"))?,
            fitness: self
                .fitness
                .ok_or(ConfigError::MissingParameter("fitness"))?,
            align_structures: self.align_structures,
            random_seed: self.random_seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exploration_builder_requires_paths_and_level() {
        let err = ExplorationConfigBuilder::new()
            .work_dir("out".into())
            .max_level(2)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("fragment_space_path"));

        let config = ExplorationConfigBuilder::new()
            .fragment_space_path("space.toml".into())
            .work_dir("out".into())
            .max_level(2)
            .num_parallel_tasks(3)
            .build()
            .unwrap();
        assert_eq!(config.batch_size, 12);
        assert!(!config.submits_fitness());
        assert_eq!(config.build.rings, RingClosureConfig::default());
    }

    #[test]
    fn inverted_ring_bounds_are_rejected() {
        let err = ExplorationConfigBuilder::new()
            .fragment_space_path("space.toml".into())
            .work_dir("out".into())
            .max_level(1)
            .ring_closures(RingClosureConfig {
                min_ring_path: 8,
                max_ring_path: 4,
                max_alternatives: 1,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { parameter: "max_ring_path", .. }));
    }

    #[test]
    fn fitness_builder_defaults() {
        assert_eq!(
            FitnessConfigBuilder::new().build().unwrap_err(),
            ConfigError::MissingParameter("fitness_provider")
        );
        let config = FitnessConfigBuilder::new()
            .internal("${MW}", vec![])
            .build()
            .unwrap();
        assert!(config.fitness_required);
        assert!(!config.make_pictures);
    }
}
