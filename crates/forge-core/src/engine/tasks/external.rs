use crate::core::chem::structure::ChemicalStructure;
use crate::core::chem::tags;
use crate::core::io::sdf::SdfFile;
use crate::core::io::traits::ChemicalFile;
use crate::core::models::ids::{TaskId, VertexId};
use crate::engine::cancel::CancellationToken;
use crate::engine::error::EngineError;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const UNREADABLE_SUFFIX: &str = "_UNREADABLE";

/// Files and identity of one call to the external fitness provider.
#[derive(Debug, Clone, Copy)]
pub struct ExternalRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub work_dir: &'a Path,
    pub task: TaskId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalOutcome {
    Structure(ChemicalStructure),
    /// The provider exited cleanly but its output could not be read. The
    /// unreadable file, if there was one, has been moved to `backup`.
    Unreadable {
        backup: Option<PathBuf>,
        reason: String,
    },
}

/// A fitness provider run as a child process:
/// `<interpreter> <script> <input> <output> <work_dir> <task_id> [uid_registry]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFitness {
    interpreter: String,
    script: PathBuf,
    uid_registry: Option<PathBuf>,
}

impl ExternalFitness {
    pub fn new(interpreter: impl Into<String>, script: PathBuf, uid_registry: Option<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script,
            uid_registry,
        }
    }

    pub fn command_args(&self, req: &ExternalRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.script.clone().into(),
            req.input.into(),
            req.output.into(),
            req.work_dir.into(),
            req.task.0.to_string().into(),
        ];
        if let Some(registry) = &self.uid_registry {
            args.push(registry.into());
        }
        args
    }

    /// Runs the provider and reads back its output.
    ///
    /// # Errors
    ///
    /// A provider that cannot be started or exits with a non-zero status is
    /// fatal ([`EngineError::ExternalProcess`]); cancelling `token` kills the
    /// child and yields [`EngineError::Cancelled`].
    pub fn run(&self, req: &ExternalRequest<'_>, token: &CancellationToken) -> Result<ExternalOutcome, EngineError> {
        token.check()?;
        let err_path = req.work_dir.join(format!("task_{}.err", req.task.0));
        let stderr = File::create(&err_path).map_err(|e| {
            EngineError::ExternalProcess(format!("cannot create '{}': {e}", err_path.display()))
        })?;

        debug!(task = %req.task, interpreter = %self.interpreter, script = %self.script.display(), "Starting external fitness provider");
        let mut child = Command::new(&self.interpreter)
            .args(self.command_args(req))
            .current_dir(req.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| {
                EngineError::ExternalProcess(format!(
                    "could not execute '{}' with '{}': {e}",
                    self.interpreter,
                    self.script.display()
                ))
            })?;

        let status = loop {
            let polled = child.try_wait().map_err(|e| {
                EngineError::ExternalProcess(format!("lost track of the fitness provider: {e}"))
            })?;
            if let Some(status) = polled {
                break status;
            }
            if token.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                debug!(task = %req.task, "External fitness provider killed");
                return Err(EngineError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        };
        self.check_status(status, req, &err_path)?;
        read_output(req.output)
    }

    fn check_status(&self, status: ExitStatus, req: &ExternalRequest<'_>, err_path: &Path) -> Result<(), EngineError> {
        let detail = fs::read_to_string(err_path).unwrap_or_default();
        if status.success() {
            if detail.trim().is_empty() {
                let _ = fs::remove_file(err_path);
            }
            return Ok(());
        }
        error!(task = %req.task, %status, stderr = detail.trim(), "External fitness provider failed");
        Err(EngineError::ExternalProcess(format!(
            "'{}' exited with {status} for '{}' (see '{}')",
            self.script.display(),
            req.input.display(),
            err_path.display()
        )))
    }
}

fn backup_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(UNREADABLE_SUFFIX);
    PathBuf::from(name)
}

/// Moves an unreadable output out of the way so later runs never pick it up.
fn set_aside(output: &Path, reason: String) -> ExternalOutcome {
    let backup = output.exists().then(|| backup_path(output)).and_then(|backup| {
        match fs::copy(output, &backup).and_then(|_| fs::remove_file(output)) {
            Ok(()) => Some(backup),
            Err(e) => {
                warn!(file = %output.display(), error = %e, "Could not back up unreadable output");
                None
            }
        }
    });
    warn!(file = %output.display(), %reason, "Unreadable output from external fitness provider");
    ExternalOutcome::Unreadable { backup, reason }
}

/// Assigns the vertex ids listed in the vertex-id tag to the atoms. The
/// error explains why the tag cannot be used.
fn apply_vertex_ids(structure: &mut ChemicalStructure) -> Result<(), String> {
    let Some(raw) = structure.property(tags::VERTEX_IDS).map(str::to_string) else {
        return Ok(());
    };
    let ids: Vec<u32> = raw
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad {} tag: {e}", tags::VERTEX_IDS))?;
    if ids.len() != structure.atom_count() {
        return Err(format!(
            "{} tag lists {} ids for {} atoms",
            tags::VERTEX_IDS,
            ids.len(),
            structure.atom_count()
        ));
    }
    for (atom, id) in structure.atoms_mut().iter_mut().zip(ids) {
        atom.vertex_id = Some(VertexId(id));
    }
    Ok(())
}

/// Reads the first structure of the provider's output. Files that cannot be
/// used are set aside rather than failing the run.
pub fn read_output(output: &Path) -> Result<ExternalOutcome, EngineError> {
    let mut structures = match SdfFile::read_from_path(output) {
        Ok(s) => s,
        Err(e) => return Ok(set_aside(output, e.to_string())),
    };
    if structures.is_empty() {
        return Ok(set_aside(output, "no structure in file".to_string()));
    }
    let mut structure = structures.swap_remove(0);
    if let Err(reason) = apply_vertex_ids(&mut structure) {
        return Ok(set_aside(output, reason));
    }
    Ok(ExternalOutcome::Structure(structure))
}
