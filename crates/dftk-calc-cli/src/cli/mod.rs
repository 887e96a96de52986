mod commands;
mod helpers;

use clap::Parser;
use dftk_calc_core::domain::CalcError;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_calc_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            eprintln!("{}", diagnostic.fatal_exit_line());
            diagnostic.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("dftk-calc".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_logging(cli.verbose);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Logs go to stderr; stdout carries only command output.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "dftk-calc",
    version,
    about = "Energy and force calculator driving a DFTK-style plane-wave DFT solver"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG applies otherwise
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Calculate the energy (and optionally forces) of an extended-XYZ structure
    Run(commands::RunArgs),
    /// Print a stored calculator record
    Show(commands::ShowArgs),
    /// Build the model and basis for a structure without solving
    Resolve(commands::ResolveArgs),
    /// Query the solver version and check that it is supported
    SolverVersion(commands::SolverVersionArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_calculation_command(args),
        CliCommand::Show(args) => commands::run_show_command(args),
        CliCommand::Resolve(args) => commands::run_resolve_command(args),
        CliCommand::SolverVersion(args) => commands::run_solver_version_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(CalcError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CalcError> for CliError {
    fn from(error: CalcError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_calc_error(&self) -> CalcError {
        match self {
            Self::Usage(message) => CalcError::setup("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => CalcError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
