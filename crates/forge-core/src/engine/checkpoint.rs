use super::context::CounterSnapshot;
use crate::core::models::ids::GraphId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Could not serialize checkpoint: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("TOML parsing error for '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Checkpoint expects graph {expected} as root {index} of level {level}, found {found:?}")]
    Mismatch {
        level: usize,
        index: usize,
        expected: GraphId,
        found: Option<GraphId>,
    },
}

/// Where a combinatorial exploration stands: the level being built, the
/// root graph being expanded and the next combination to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Checkpoint {
    pub level: usize,
    pub root_index: usize,
    pub root_graph: Option<GraphId>,
    /// Empty when the root has not been started yet.
    #[serde(default)]
    pub next_combination: Vec<usize>,
    pub completed: bool,
    pub counters: CounterSnapshot,
}

impl Checkpoint {
    pub const FILE_NAME: &'static str = "checkpoint.toml";

    pub fn path(work_dir: &Path) -> PathBuf {
        work_dir.join(Self::FILE_NAME)
    }

    /// Writes the checkpoint through a temporary file so that an
    /// interrupted write never leaves a truncated checkpoint behind.
    pub fn save(&self, work_dir: &Path) -> Result<(), CheckpointError> {
        let path = Self::path(work_dir);
        let tmp = path.with_extension("toml.tmp");
        let text = toml::to_string(self)?;
        fs::write(&tmp, text).map_err(|source| CheckpointError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(work_dir: &Path) -> Result<Option<Self>, CheckpointError> {
        let path = Self::path(work_dir);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text)
            .map(Some)
            .map_err(|source| CheckpointError::Parse {
                path: path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Checkpoint::load(dir.path()).unwrap(), None);

        let checkpoint = Checkpoint {
            level: 2,
            root_index: 1,
            root_graph: Some(GraphId(14)),
            next_combination: vec![3, 0, 1],
            completed: false,
            counters: CounterSnapshot {
                graph_id: 40,
                candidate: 12,
                task: 25,
            },
        };
        checkpoint.save(dir.path()).unwrap();
        assert!(!dir.path().join("checkpoint.toml.tmp").exists());
        assert_eq!(Checkpoint::load(dir.path()).unwrap(), Some(checkpoint));
    }

    #[test]
    fn corrupt_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(Checkpoint::path(dir.path()), "level = [").unwrap();
        assert!(matches!(
            Checkpoint::load(dir.path()),
            Err(CheckpointError::Parse { .. })
        ));
    }
}
