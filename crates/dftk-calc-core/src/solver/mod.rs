pub mod process;

pub use process::{COMPATIBLE_VERSIONS, ProcessSolution, ProcessSolver, check_compatible_version};

use crate::model::Basis;
use crate::parameters::ScfSettings;
use std::collections::BTreeMap;

/// Failure raised by the solver itself. The calculator rewraps it as a
/// computation error before it leaves the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverFailure {
    #[error("failed to launch solver '{program}': {reason}")]
    Launch { program: String, reason: String },
    #[error("solver '{command}' exited with {status}: {diagnostic}")]
    Exited {
        command: String,
        status: String,
        diagnostic: String,
    },
    #[error("unreadable solver output '{path}': {reason}")]
    Output { path: String, reason: String },
    #[error("SCF did not converge: {0}")]
    NotConverged(String),
    #[error("solver version '{found}' is not supported (compatible: {supported})")]
    IncompatibleVersion { found: String, supported: String },
    #[error("{0}")]
    Internal(String),
}

/// A converged SCF solution.
pub trait ScfSolution {
    /// Energy terms in Hartree, keyed by term name.
    fn energies(&self) -> &BTreeMap<String, f64>;

    /// Forces in Hartree/Bohr, grouped by species in basis order.
    fn forces(&self) -> Result<Vec<Vec<[f64; 3]>>, SolverFailure>;

    fn total_energy(&self) -> f64 {
        self.energies().values().sum()
    }
}

pub trait ScfSolver {
    type Solution: ScfSolution;

    fn solve(
        &mut self,
        basis: &Basis,
        settings: &ScfSettings,
    ) -> Result<Self::Solution, SolverFailure>;
}
