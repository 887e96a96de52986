use super::CliError;
use anyhow::Context;
use dftk_calc_core::domain::CalcError;
use dftk_calc_core::parameters::{ParameterSet, ParameterValue};
use dftk_calc_core::solver::{ProcessSolver, SolverFailure};
use dftk_calc_core::structure::{Structure, parse_extxyz};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Parameter file first, then each `--param` in command-line order.
pub(super) fn collect_parameters(
    params_file: Option<&Path>,
    assignments: &[String],
) -> Result<ParameterSet, CliError> {
    let mut parameters = match params_file {
        Some(path) => load_parameter_file(path)?,
        None => ParameterSet::empty(),
    };
    for assignment in assignments {
        let (key, value) = parse_parameter_assignment(assignment)?;
        parameters = parameters.with(&key, value);
    }
    Ok(parameters)
}

pub(super) fn load_parameter_file(path: &Path) -> Result<ParameterSet, CliError> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read parameter file '{}'", path.display()))?;
    serde_json::from_str(&source).map_err(|error| {
        CliError::Compute(CalcError::setup(
            "INPUT.PARAMS_FILE",
            format!(
                "parameter file '{}' is not a JSON object of parameter values: {}",
                path.display(),
                error
            ),
        ))
    })
}

/// Splits `key=value`. The value is read as JSON and falls back to a bare
/// string, so `xc=PBE` and `kpts=[4,4,4]` both work.
pub(super) fn parse_parameter_assignment(
    assignment: &str,
) -> Result<(String, ParameterValue), CliError> {
    let (key, raw) = assignment
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| {
            CliError::Usage(format!(
                "invalid --param '{}'; expected KEY=VALUE",
                assignment
            ))
        })?;
    let raw = raw.trim();
    let value = serde_json::from_str::<ParameterValue>(raw)
        .unwrap_or_else(|_| ParameterValue::Text(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

pub(super) fn load_structure(path: &Path) -> Result<Structure, CliError> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read structure file '{}'", path.display()))?;
    parse_extxyz(&source).map_err(|error| {
        CliError::Compute(CalcError::setup(
            "INPUT.STRUCTURE",
            format!("structure file '{}': {}", path.display(), error),
        ))
    })
}

pub(super) fn build_solver(program: &Path, args: &[String], scratch: PathBuf) -> ProcessSolver {
    ProcessSolver::new(program, scratch).with_args(args.iter().cloned())
}

pub(super) fn solver_error(failure: SolverFailure) -> CliError {
    let error = match failure {
        SolverFailure::IncompatibleVersion { .. } => {
            CalcError::setup("SETUP.SOLVER_VERSION", failure.to_string())
        }
        SolverFailure::Launch { .. } => CalcError::io_system("IO.SOLVER_LAUNCH", failure.to_string()),
        other => CalcError::computation("RUN.SOLVER", other.to_string()),
    };
    CliError::Compute(error)
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).context("failed to render command output as JSON")?;
    println!("{}", rendered);
    Ok(())
}
