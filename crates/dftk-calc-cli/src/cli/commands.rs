use super::CliError;
use super::helpers::*;
use dftk_calc_core::calculator::DftkCalculator;
use dftk_calc_core::domain::ResultRecord;
use dftk_calc_core::model::{Basis, build_basis, build_model};
use dftk_calc_core::parameters::{ParameterSet, resolve_model_parameters, resolve_scf_settings};
use dftk_calc_core::persistence::{RecordStore, read_record, render_record};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct ParameterArgs {
    /// JSON file with calculator parameters
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Parameter override KEY=VALUE; VALUE is JSON or a bare string (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    assignments: Vec<String>,
}

impl ParameterArgs {
    fn collect(&self) -> Result<ParameterSet, CliError> {
        collect_parameters(self.params.as_deref(), &self.assignments)
    }
}

#[derive(clap::Args)]
pub(super) struct SolverArgs {
    /// Solver program implementing the scf/forces/version protocol
    #[arg(long, default_value = "dftk-solver")]
    solver: PathBuf,

    /// Extra argument passed to the solver before the subcommand (repeatable)
    #[arg(long = "solver-arg", value_name = "ARG", allow_hyphen_values = true)]
    solver_args: Vec<String>,

    /// Directory for solver request and response files
    #[arg(long, default_value = "dftk-scratch")]
    scratch: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Extended-XYZ structure file
    structure: PathBuf,

    #[command(flatten)]
    parameters: ParameterArgs,

    #[command(flatten)]
    solver: SolverArgs,

    /// Also compute forces
    #[arg(long)]
    forces: bool,

    /// Record label; results are written to <DIRECTORY>/<LABEL>.json
    #[arg(long, default_value = "dftk")]
    label: String,

    /// Record directory
    #[arg(long, default_value = ".")]
    directory: PathBuf,

    /// Start from the existing record's parameters before applying overrides
    #[arg(long)]
    restart: bool,

    /// Skip the solver version compatibility check
    #[arg(long)]
    skip_version_check: bool,
}

#[derive(clap::Args)]
pub(super) struct ShowArgs {
    /// Path to a calculator record (<LABEL>.json)
    record: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct ResolveArgs {
    /// Extended-XYZ structure file
    structure: PathBuf,

    #[command(flatten)]
    parameters: ParameterArgs,
}

#[derive(clap::Args)]
pub(super) struct SolverVersionArgs {
    #[command(flatten)]
    solver: SolverArgs,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    results: &'a ResultRecord,
    record: String,
}

#[derive(Serialize)]
struct ResolveOutput {
    basis: Basis,
    tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_bands: Option<usize>,
}

pub(super) fn run_calculation_command(args: RunArgs) -> Result<i32, CliError> {
    let structure = load_structure(&args.structure)?;
    let parameters = args.parameters.collect()?;
    let store = RecordStore::new(&args.directory, args.label.as_str())?;

    let solver = build_solver(
        &args.solver.solver,
        &args.solver.solver_args,
        args.solver.scratch.clone(),
    );
    if !args.skip_version_check {
        let version = solver.ensure_compatible().map_err(solver_error)?;
        info!(%version, "solver version accepted");
    }

    let mut calculator = if args.restart {
        DftkCalculator::restart(solver, store.clone())?
    } else {
        DftkCalculator::new(solver).with_store(store.clone())
    };
    calculator.set(&parameters)?;

    calculator.get_potential_energy(&structure)?;
    if args.forces {
        calculator.get_forces(&structure)?;
    }

    print_json(&RunOutput {
        results: calculator.results(),
        record: store.path().display().to_string(),
    })?;
    Ok(0)
}

pub(super) fn run_show_command(args: ShowArgs) -> Result<i32, CliError> {
    let store = RecordStore::from_path(&args.record)?;
    let record = read_record(&store)?;
    print!("{}", render_record(&record)?);
    Ok(0)
}

pub(super) fn run_resolve_command(args: ResolveArgs) -> Result<i32, CliError> {
    let structure = load_structure(&args.structure)?;
    let mut parameters = ParameterSet::default();
    parameters.merge(&args.parameters.collect()?)?;

    let resolved = resolve_model_parameters(&parameters, Some(&structure))?;
    let settings = resolve_scf_settings(&parameters)?;
    let model = build_model(&structure, &resolved)?;
    let basis = build_basis(model, &parameters)?;

    print_json(&ResolveOutput {
        basis,
        tolerance: settings.tolerance,
        n_bands: settings.n_bands,
    })?;
    Ok(0)
}

pub(super) fn run_solver_version_command(args: SolverVersionArgs) -> Result<i32, CliError> {
    let solver = build_solver(
        &args.solver.solver,
        &args.solver.solver_args,
        args.solver.scratch.clone(),
    );
    let version = solver.ensure_compatible().map_err(solver_error)?;
    println!("{}", version);
    Ok(0)
}
