use super::{ScfSolution, ScfSolver, SolverFailure};
use crate::model::Basis;
use crate::parameters::ScfSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// `major.minor` solver releases whose file protocol this binding speaks.
pub const COMPATIBLE_VERSIONS: [&str; 1] = ["0.1"];

pub fn check_compatible_version(version: &str) -> Result<(), SolverFailure> {
    let trimmed = version.trim().trim_start_matches('v');
    let major_minor = trimmed.splitn(3, '.').take(2).collect::<Vec<_>>().join(".");
    if COMPATIBLE_VERSIONS.contains(&major_minor.as_str()) {
        return Ok(());
    }
    Err(SolverFailure::IncompatibleVersion {
        found: version.trim().to_string(),
        supported: COMPATIBLE_VERSIONS.join(", "),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SolverCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl SolverCommand {
    fn describe(&self, subcommand: &str) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.push(subcommand.to_string());
        parts.join(" ")
    }

    fn run(&self, subcommand: &str, operands: &[&Path]) -> Result<Output, SolverFailure> {
        debug!(command = %self.describe(subcommand), "invoking solver");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(subcommand)
            .args(operands)
            .output()
            .map_err(|error| SolverFailure::Launch {
                program: self.program.display().to_string(),
                reason: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(SolverFailure::Exited {
                command: self.describe(subcommand),
                status: output.status.to_string(),
                diagnostic: diagnostic_text(&output),
            });
        }
        Ok(output)
    }
}

fn diagnostic_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    if text.is_empty() {
        "no diagnostic output".to_string()
    } else {
        text.to_string()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SolverFailure> {
    let output_error = |reason: String| SolverFailure::Output {
        path: path.display().to_string(),
        reason,
    };
    let source = fs::read_to_string(path).map_err(|error| output_error(error.to_string()))?;
    serde_json::from_str(&source).map_err(|error| output_error(error.to_string()))
}

#[derive(Debug, Serialize)]
struct ScfRequest<'a> {
    basis: &'a Basis,
    tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_bands: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ScfResponse {
    converged: bool,
    #[serde(default)]
    energies: BTreeMap<String, f64>,
    #[serde(default)]
    checkpoint: Option<PathBuf>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForcesResponse {
    forces: Vec<Vec<[f64; 3]>>,
}

/// Drives `<program> [args] scf|forces|version` through JSON files.
///
/// Each solve runs in its own `scf-*` directory under the scratch directory,
/// so a response left behind by an earlier run is never read back.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    command: SolverCommand,
    scratch_dir: PathBuf,
}

impl ProcessSolver {
    pub fn new(program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: SolverCommand {
                program: program.into(),
                args: Vec::new(),
            },
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.command.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.command.program
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn version(&self) -> Result<String, SolverFailure> {
        let output = self.command.run("version", &[])?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(SolverFailure::Internal(format!(
                "'{}' printed no version",
                self.command.describe("version")
            )));
        }
        Ok(version)
    }

    /// Queries the version and rejects solvers outside [`COMPATIBLE_VERSIONS`].
    pub fn ensure_compatible(&self) -> Result<String, SolverFailure> {
        let version = self.version()?;
        check_compatible_version(&version)?;
        Ok(version)
    }

    fn create_run_dir(&self) -> Result<PathBuf, SolverFailure> {
        let scratch_error = |error: std::io::Error| {
            SolverFailure::Internal(format!(
                "failed to prepare scratch directory '{}': {}",
                self.scratch_dir.display(),
                error
            ))
        };
        fs::create_dir_all(&self.scratch_dir).map_err(scratch_error)?;
        let run_dir = tempfile::Builder::new()
            .prefix("scf-")
            .keep(true)
            .tempdir_in(&self.scratch_dir)
            .map_err(scratch_error)?;
        Ok(run_dir.path().to_path_buf())
    }
}

fn remove_stale(path: &Path) -> Result<(), SolverFailure> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(SolverFailure::Internal(format!(
            "failed to remove stale '{}': {}",
            path.display(),
            error
        ))),
    }
}

impl ScfSolver for ProcessSolver {
    type Solution = ProcessSolution;

    fn solve(
        &mut self,
        basis: &Basis,
        settings: &ScfSettings,
    ) -> Result<ProcessSolution, SolverFailure> {
        let run_dir = self.create_run_dir()?;
        let request_path = run_dir.join("request.json");
        let response_path = run_dir.join("response.json");

        let request = ScfRequest {
            basis,
            tolerance: settings.tolerance,
            n_bands: settings.n_bands,
        };
        let payload = serde_json::to_string_pretty(&request)
            .map_err(|error| SolverFailure::Internal(format!("failed to encode request: {}", error)))?;
        fs::write(&request_path, payload).map_err(|error| {
            SolverFailure::Internal(format!(
                "failed to write '{}': {}",
                request_path.display(),
                error
            ))
        })?;

        self.command
            .run("scf", &[request_path.as_path(), response_path.as_path()])?;
        let response: ScfResponse = read_json(&response_path)?;
        if !response.converged {
            return Err(SolverFailure::NotConverged(
                response
                    .message
                    .unwrap_or_else(|| "no diagnostic reported".to_string()),
            ));
        }

        let checkpoint = response.checkpoint.map(|path| {
            if path.is_relative() {
                run_dir.join(path)
            } else {
                path
            }
        });
        Ok(ProcessSolution {
            command: self.command.clone(),
            energies: response.energies,
            checkpoint,
            forces_path: run_dir.join("forces.json"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSolution {
    command: SolverCommand,
    energies: BTreeMap<String, f64>,
    checkpoint: Option<PathBuf>,
    forces_path: PathBuf,
}

impl ProcessSolution {
    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }
}

impl ScfSolution for ProcessSolution {
    fn energies(&self) -> &BTreeMap<String, f64> {
        &self.energies
    }

    fn forces(&self) -> Result<Vec<Vec<[f64; 3]>>, SolverFailure> {
        let checkpoint = self.checkpoint.as_deref().ok_or_else(|| {
            SolverFailure::Internal("solver reported no checkpoint to compute forces from".to_string())
        })?;
        remove_stale(&self.forces_path)?;
        self.command
            .run("forces", &[checkpoint, self.forces_path.as_path()])?;
        let response: ForcesResponse = read_json(&self.forces_path)?;
        Ok(response.forces)
    }
}
