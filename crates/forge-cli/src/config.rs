use crate::cli::{EvaluateArgs, ExploreArgs};
use crate::error::{CliError, Result};
use fragforge::core::fitness::DescriptorSpec;
use fragforge::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialExploration {
    max_level: Option<usize>,
    parallel_tasks: Option<usize>,
    batch_size: Option<usize>,
    align_structures: Option<bool>,
    random_seed: Option<u64>,
    termination_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialRings {
    min_path: Option<usize>,
    max_path: Option<usize>,
    max_alternatives: Option<usize>,
}

impl PartialRings {
    fn merge(self) -> core_config::RingClosureConfig {
        let defaults = core_config::RingClosureConfig::default();
        core_config::RingClosureConfig {
            min_ring_path: self.min_path.unwrap_or(defaults.min_ring_path),
            max_ring_path: self.max_path.unwrap_or(defaults.max_ring_path),
            max_alternatives: self.max_alternatives.unwrap_or(defaults.max_alternatives),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialConstraints {
    max_heavy_atoms: Option<usize>,
    max_molecular_weight: Option<f64>,
}

impl From<PartialConstraints> for core_config::GraphConstraints {
    fn from(p: PartialConstraints) -> Self {
        Self {
            max_heavy_atoms: p.max_heavy_atoms,
            max_molecular_weight: p.max_molecular_weight,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
enum PartialFitnessProvider {
    Internal {
        expression: String,
        #[serde(default)]
        descriptors: Vec<DescriptorSpec>,
    },
    #[serde(rename_all = "kebab-case")]
    External {
        #[serde(default = "default_interpreter")]
        interpreter: String,
        script: PathBuf,
        uid_registry: Option<PathBuf>,
    },
}

fn default_interpreter() -> String {
    "sh".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialFitness {
    provider: PartialFitnessProvider,
    required: Option<bool>,
    make_pictures: Option<bool>,
}

impl PartialFitness {
    fn merge(self, base_dir: &Path) -> Result<core_config::FitnessConfig> {
        let builder = match self.provider {
            PartialFitnessProvider::Internal {
                expression,
                descriptors,
            } => core_config::FitnessConfigBuilder::new().internal(expression, descriptors),
            PartialFitnessProvider::External {
                interpreter,
                script,
                uid_registry,
            } => core_config::FitnessConfigBuilder::new().external(
                interpreter,
                resolve(base_dir, script),
                uid_registry.map(|p| resolve(base_dir, p)),
            ),
        };
        let builder = match self.required {
            Some(required) => builder.fitness_required(required),
            None => builder,
        };
        let builder = match self.make_pictures {
            Some(enabled) => builder.make_pictures(enabled),
            None => builder,
        };
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }
}

/// The TOML run file shared by `explore` and `evaluate`. Relative paths are
/// resolved against the directory holding the file.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRunConfig {
    fragment_space: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    #[serde(default)]
    root_graphs: Vec<PathBuf>,
    exploration: Option<PartialExploration>,
    rings: Option<PartialRings>,
    constraints: Option<PartialConstraints>,
    fitness: Option<PartialFitness>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run file from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn merge_for_exploration(
        self,
        args: &ExploreArgs,
        threads: Option<usize>,
    ) -> Result<core_config::ExplorationConfig> {
        let mut config = self.apply_set_values(&args.set_values)?;
        let base_dir = std::mem::take(&mut config.base_dir);
        let exploration = config.exploration.take().unwrap_or_default();

        let fragment_space = config
            .fragment_space
            .take()
            .ok_or_else(|| CliError::Config("`fragment-space` is required for exploration".to_string()))?;
        let work_dir = args
            .work_dir
            .clone()
            .or_else(|| config.work_dir.take().map(|p| resolve(&base_dir, p)))
            .ok_or_else(|| CliError::Config("`work-dir` is required".to_string()))?;
        let max_level = args
            .max_level
            .or(exploration.max_level)
            .ok_or_else(|| CliError::Config("`exploration.max-level` is required".to_string()))?;

        let mut builder = core_config::ExplorationConfigBuilder::new()
            .fragment_space_path(resolve(&base_dir, fragment_space))
            .work_dir(work_dir)
            .root_graphs(
                config
                    .root_graphs
                    .into_iter()
                    .map(|p| resolve(&base_dir, p))
                    .collect(),
            )
            .max_level(max_level)
            .align_structures(exploration.align_structures.unwrap_or(false))
            .ring_closures(config.rings.unwrap_or_default().merge())
            .constraints(config.constraints.unwrap_or_default().into())
            .resume(args.resume);

        if let Some(n) = threads.or(exploration.parallel_tasks) {
            builder = builder.num_parallel_tasks(n);
        }
        if let Some(n) = exploration.batch_size {
            builder = builder.batch_size(n);
        }
        if let Some(seed) = exploration.random_seed {
            builder = builder.random_seed(seed);
        }
        if let Some(secs) = exploration.termination_timeout_secs {
            builder = builder.termination_timeout(Duration::from_secs(secs));
        }
        if let Some(fitness) = config.fitness {
            builder = builder.fitness(fitness.merge(&base_dir)?);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    pub fn merge_for_evaluation(self, args: &EvaluateArgs) -> Result<core_config::EvaluationConfig> {
        let mut config = self.apply_set_values(&args.set_values)?;
        let base_dir = std::mem::take(&mut config.base_dir);
        let exploration = config.exploration.take().unwrap_or_default();

        let fitness = config
            .fitness
            .take()
            .ok_or_else(|| CliError::Config("`[fitness]` is required for evaluation".to_string()))?;
        let work_dir = args
            .work_dir
            .clone()
            .or_else(|| config.work_dir.take().map(|p| resolve(&base_dir, p)))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut builder = core_config::EvaluationConfigBuilder::new()
            .work_dir(work_dir)
            .fitness(fitness.merge(&base_dir)?)
            .align_structures(exploration.align_structures.unwrap_or(false));
        if let Some(path) = config.fragment_space {
            builder = builder.fragment_space_path(resolve(&base_dir, path));
        }
        if let Some(seed) = exploration.random_seed {
            builder = builder.random_seed(seed);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(mut self, set_values: &[String]) -> Result<Self> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!("Invalid --set format: '{}'. Expected KEY=VALUE.", kv_pair))
            })?;

            match key {
                "work-dir" => self.work_dir = Some(PathBuf::from(value)),
                "fragment-space" => self.fragment_space = Some(PathBuf::from(value)),
                "exploration.max-level" => self.exploration().max_level = Some(parse(key, value)?),
                "exploration.parallel-tasks" => self.exploration().parallel_tasks = Some(parse(key, value)?),
                "exploration.batch-size" => self.exploration().batch_size = Some(parse(key, value)?),
                "exploration.align-structures" => self.exploration().align_structures = Some(parse(key, value)?),
                "exploration.random-seed" => self.exploration().random_seed = Some(parse(key, value)?),
                "exploration.termination-timeout-secs" => {
                    self.exploration().termination_timeout_secs = Some(parse(key, value)?)
                }
                "rings.min-path" => self.rings().min_path = Some(parse(key, value)?),
                "rings.max-path" => self.rings().max_path = Some(parse(key, value)?),
                "rings.max-alternatives" => self.rings().max_alternatives = Some(parse(key, value)?),
                "constraints.max-heavy-atoms" => self.constraints().max_heavy_atoms = Some(parse(key, value)?),
                "constraints.max-molecular-weight" => {
                    self.constraints().max_molecular_weight = Some(parse(key, value)?)
                }
                "fitness.required" | "fitness.make-pictures" => {
                    let fitness = self.fitness.as_mut().ok_or_else(|| {
                        CliError::Config(format!("'{}' needs a [fitness] section in the run file", key))
                    })?;
                    if key == "fitness.required" {
                        fitness.required = Some(parse(key, value)?);
                    } else {
                        fitness.make_pictures = Some(parse(key, value)?);
                    }
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(self)
    }

    fn exploration(&mut self) -> &mut PartialExploration {
        self.exploration.get_or_insert_with(Default::default)
    }

    fn rings(&mut self) -> &mut PartialRings {
        self.rings.get_or_insert_with(Default::default)
    }

    fn constraints(&mut self) -> &mut PartialConstraints {
        self.constraints.get_or_insert_with(Default::default)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use fragforge::engine::config::FitnessProviderConfig;
    use std::fs;
    use tempfile::tempdir;

    const RUN_FILE: &str = r#"
        fragment-space = "space.toml"
        work-dir = "run"

        [exploration]
        max-level = 3
        parallel-tasks = 2
        random-seed = 11

        [rings]
        max-path = 8

        [constraints]
        max-heavy-atoms = 30

        [fitness]
        required = false

        [fitness.provider]
        type = "internal"
        expression = "${MW} / 100"
        descriptors = [{ variable = "MW", descriptor = "MW" }]
    "#;

    fn write_run_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn explore_args(cli_args: &[&str]) -> (ExploreArgs, Option<usize>) {
        let cli = Cli::parse_from(cli_args);
        match cli.command {
            Commands::Explore(args) => (args, cli.threads),
            _ => panic!("expected the explore subcommand"),
        }
    }

    #[test]
    fn run_file_is_merged_with_defaults() {
        let (dir, path) = write_run_file(RUN_FILE);
        let (args, threads) = explore_args(&["fragforge", "explore", "-c", path.to_str().unwrap()]);

        let config = PartialRunConfig::from_file(&path)
            .unwrap()
            .merge_for_exploration(&args, threads)
            .unwrap();

        assert_eq!(config.fragment_space_path, dir.path().join("space.toml"));
        assert_eq!(config.work_dir, dir.path().join("run"));
        assert_eq!(config.max_level, 3);
        assert_eq!(config.num_parallel_tasks, 2);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.random_seed, Some(11));
        assert_eq!(config.build.rings.max_ring_path, 8);
        assert_eq!(config.build.rings.min_ring_path, 4);
        assert_eq!(config.build.constraints.max_heavy_atoms, Some(30));
        assert!(!config.resume);

        let fitness = config.fitness.unwrap();
        assert!(!fitness.fitness_required);
        match fitness.provider {
            FitnessProviderConfig::Internal { expression, descriptors } => {
                assert_eq!(expression, "${MW} / 100");
                assert_eq!(descriptors[0].descriptor, "MW");
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn command_line_overrides_the_run_file() {
        let (_dir, path) = write_run_file(RUN_FILE);
        let (args, threads) = explore_args(&[
            "fragforge",
            "-j",
            "6",
            "explore",
            "-c",
            path.to_str().unwrap(),
            "--resume",
            "--max-level",
            "5",
            "-S",
            "exploration.batch-size=3",
            "-S",
            "rings.max-alternatives=2",
        ]);

        let config = PartialRunConfig::from_file(&path)
            .unwrap()
            .merge_for_exploration(&args, threads)
            .unwrap();

        assert_eq!(config.max_level, 5);
        assert_eq!(config.num_parallel_tasks, 6);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.build.rings.max_alternatives, 2);
        assert!(config.resume);
    }

    #[test]
    fn invalid_set_values_are_rejected() {
        let (_dir, path) = write_run_file(RUN_FILE);
        for bad in ["exploration.batch-size", "exploration.batch-size=many", "colour=blue"] {
            let (args, threads) = explore_args(&["fragforge", "explore", "-c", path.to_str().unwrap(), "-S", bad]);
            let result = PartialRunConfig::from_file(&path)
                .unwrap()
                .merge_for_exploration(&args, threads);
            assert!(matches!(result, Err(CliError::Config(_))), "{bad} was accepted");
        }
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let (_dir, path) = write_run_file("fragment-space = \"s.toml\"\nmax-levels = 2\n");
        assert!(matches!(
            PartialRunConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn exploration_needs_a_max_level() {
        let (_dir, path) = write_run_file("fragment-space = \"s.toml\"\nwork-dir = \"out\"\n");
        let (args, threads) = explore_args(&["fragforge", "explore", "-c", path.to_str().unwrap()]);
        let result = PartialRunConfig::from_file(&path)
            .unwrap()
            .merge_for_exploration(&args, threads);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("max-level")));
    }

    #[test]
    fn evaluation_resolves_the_external_script() {
        let (dir, path) = write_run_file(
            r#"
            work-dir = "eval"

            [fitness.provider]
            type = "external"
            script = "scripts/score.sh"
            "#,
        );
        let cli = Cli::parse_from([
            "fragforge",
            "evaluate",
            "-c",
            path.to_str().unwrap(),
            "-i",
            "mol.sdf",
        ]);
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected the evaluate subcommand");
        };

        let config = PartialRunConfig::from_file(&path)
            .unwrap()
            .merge_for_evaluation(&args)
            .unwrap();

        assert_eq!(config.work_dir, dir.path().join("eval"));
        assert!(config.fragment_space_path.is_none());
        assert!(config.fitness.fitness_required);
        assert_eq!(
            config.fitness.provider,
            FitnessProviderConfig::External {
                interpreter: "sh".to_string(),
                script: dir.path().join("scripts/score.sh"),
                uid_registry: None,
            }
        );
    }

    #[test]
    fn evaluation_without_fitness_is_a_config_error() {
        let (_dir, path) = write_run_file("work-dir = \"eval\"\n");
        let cli = Cli::parse_from(["fragforge", "evaluate", "-c", path.to_str().unwrap(), "-i", "g.json"]);
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected the evaluate subcommand");
        };
        let result = PartialRunConfig::from_file(&path).unwrap().merge_for_evaluation(&args);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
