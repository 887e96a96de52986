pub mod basis;
pub mod pseudopotentials;

pub use basis::{Basis, KGrid, build_basis, kgrid_from_minimal_spacing, resolve_kgrid};
pub use pseudopotentials::{CoreVariant, Pseudopotential, PseudopotentialFamily, PspFunctional};

use crate::domain::CalcResult;
use crate::parameters::{ResolvedModelParameters, Smearing};
use crate::structure::{AtomGroup, Lattice, Structure, load_atoms, load_lattice};
use serde::{Deserialize, Serialize};

/// One species with its pseudopotential and the atoms it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesGroup {
    pub pseudopotential: Pseudopotential,
    #[serde(flatten)]
    pub atoms: AtomGroup,
}

/// The physical model handed to the solver, in atomic units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub lattice: Lattice,
    pub species: Vec<SpeciesGroup>,
    pub functionals: Vec<String>,
    pub temperature: f64,
    pub smearing: Smearing,
}

impl Model {
    pub fn atom_count(&self) -> usize {
        self.species
            .iter()
            .map(|group| group.atoms.atom_indices.len())
            .sum()
    }
}

pub fn build_model(structure: &Structure, resolved: &ResolvedModelParameters) -> CalcResult<Model> {
    let lattice = load_lattice(structure)?;
    let species = load_atoms(structure)?
        .into_iter()
        .map(|atoms| {
            let pseudopotential = resolved.pseudopotentials.load(atoms.atomic_number)?;
            Ok(SpeciesGroup {
                pseudopotential,
                atoms,
            })
        })
        .collect::<CalcResult<Vec<_>>>()?;

    Ok(Model {
        lattice,
        species,
        functionals: resolved.functionals.clone(),
        temperature: resolved.temperature,
        smearing: resolved.smearing,
    })
}
