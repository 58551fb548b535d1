use crate::core::io::sdf::SdfError;
use crate::core::models::candidate::Candidate;
use crate::core::models::graph::Graph;
use crate::core::models::ids::GraphId;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("JSON error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Structure file error for '{path}': {source}")]
    Sdf { path: String, source: SdfError },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.display().to_string();
    move |source| StorageError::Io { path, source }
}

/// A graph persisted at an exploration level, together with the data
/// needed to keep expanding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoredGraph {
    pub graph: Graph,
    pub level: usize,
    pub parent_graph: Option<GraphId>,
    /// Combination pointer that produced this graph.
    #[serde(default)]
    pub combination: Vec<usize>,
    /// False for graphs rejected by consistency validation; they are kept
    /// because later levels may still complete them.
    pub accepted: bool,
}

/// One row of `candidates.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub graph_id: u64,
    pub level: Option<usize>,
    pub parent_graph: Option<u64>,
    pub uid: String,
    pub smiles: String,
    pub fitness: Option<f64>,
    pub error: Option<String>,
    pub output_file: Option<String>,
}

impl From<&Candidate> for CandidateRecord {
    fn from(c: &Candidate) -> Self {
        Self {
            name: c.name.clone(),
            graph_id: c.graph_id().0,
            level: c.level,
            parent_graph: c.parent_graph.map(|g| g.0),
            uid: c.uid.clone(),
            smiles: c.smiles.clone(),
            fitness: c.fitness(),
            error: c.error().map(str::to_string),
            output_file: c.output_file.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Level-by-level graph archive under the work directory:
/// `level_NNN/graph_<id>.json` plus a `candidates.csv` summary.
#[derive(Debug, Clone)]
pub struct LevelStorage {
    root: PathBuf,
}

impl LevelStorage {
    pub const CANDIDATES_FILE: &'static str = "candidates.csv";

    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn level_dir(&self, level: usize) -> PathBuf {
        self.root.join(format!("level_{level:03}"))
    }

    pub fn graph_path(&self, level: usize, id: GraphId) -> PathBuf {
        self.level_dir(level).join(format!("graph_{}.json", id.0))
    }

    pub fn store(&self, record: &StoredGraph) -> Result<PathBuf, StorageError> {
        let dir = self.level_dir(record.level);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let path = self.graph_path(record.level, record.graph.id());
        let text = serde_json::to_string_pretty(record).map_err(|source| StorageError::Json {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(&path, text).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Every graph stored at `level`, ordered by graph id. A level that was
    /// never written is empty.
    pub fn load_level(&self, level: usize) -> Result<Vec<StoredGraph>, StorageError> {
        let dir = self.level_dir(level);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            let is_graph = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("graph_") && n.ends_with(".json"));
            if !is_graph {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(io_error(&path))?;
            let record: StoredGraph =
                serde_json::from_str(&text).map_err(|source| StorageError::Json {
                    path: path.display().to_string(),
                    source,
                })?;
            records.push(record);
        }
        records.sort_by_key(|r| r.graph.id());
        Ok(records)
    }

    pub fn count_level(&self, level: usize) -> Result<usize, StorageError> {
        Ok(self.load_level(level)?.len())
    }

    /// Deletes the graphs stored at `level` that `parent` produced from
    /// combinations at or after `from` in enumeration order, and returns
    /// their ids.
    pub fn discard_from(&self, level: usize, parent: GraphId, from: &[usize]) -> Result<Vec<GraphId>, StorageError> {
        let mut removed = Vec::new();
        for record in self.load_level(level)? {
            if record.parent_graph != Some(parent) || record.combination.as_slice() < from {
                continue;
            }
            let path = self.graph_path(level, record.graph.id());
            fs::remove_file(&path).map_err(io_error(&path))?;
            removed.push(record.graph.id());
        }
        Ok(removed)
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.root.join(Self::CANDIDATES_FILE)
    }

    /// Appends candidates to the CSV summary, writing the header only when
    /// the file is new.
    pub fn append_candidates(&self, candidates: &[Candidate]) -> Result<(), StorageError> {
        if candidates.is_empty() {
            return Ok(());
        }
        let path = self.candidates_path();
        let csv_error = |source| StorageError::Csv {
            path: path.display().to_string(),
            source,
        };
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        for candidate in candidates {
            writer
                .serialize(CandidateRecord::from(candidate))
                .map_err(csv_error)?;
        }
        writer.flush().map_err(io_error(&path))?;
        Ok(())
    }

    /// Drops the summary rows of the given graphs and returns them.
    pub fn remove_candidates(&self, graphs: &[GraphId]) -> Result<Vec<CandidateRecord>, StorageError> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .read_candidates()?
            .into_iter()
            .partition(|r| graphs.contains(&GraphId(r.graph_id)));
        if removed.is_empty() {
            return Ok(removed);
        }
        let path = self.candidates_path();
        let csv_error = |source| StorageError::Csv {
            path: path.display().to_string(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        for row in &kept {
            writer.serialize(row).map_err(csv_error)?;
        }
        writer.flush().map_err(io_error(&path))?;
        Ok(removed)
    }

    pub fn read_candidates(&self) -> Result<Vec<CandidateRecord>, StorageError> {
        let path = self.candidates_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|source| StorageError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        reader
            .deserialize()
            .collect::<Result<Vec<CandidateRecord>, _>>()
            .map_err(|source| StorageError::Csv {
                path: path.display().to_string(),
                source,
            })
    }
}
