pub mod cache;

pub use cache::{CacheState, CachedState, InvalidationReason};

use crate::common::units::{force_to_ev_per_angstrom, hartree_to_ev};
use crate::domain::{
    CalcError, CalcErrorCategory, CalcResult, ChangeSet, Property, ResultRecord, SystemChange,
    all_changes,
};
use crate::model::{Basis, Model, build_basis, build_model};
use crate::parameters::{ParameterSet, resolve_model_parameters, resolve_scf_settings};
use crate::persistence::{PersistedRecord, RecordStore, read_record, write_record};
use crate::solver::{ScfSolution, ScfSolver};
use crate::structure::Structure;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Reports which parts of a structure differ from the previous one.
pub trait ChangeDetector {
    /// Every change kind when there is no previous structure.
    fn detect(&self, previous: Option<&Structure>, current: &Structure) -> ChangeSet;
}

/// Bitwise comparison of numbers, positions, cell and boundary flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactChangeDetector;

impl ChangeDetector for ExactChangeDetector {
    fn detect(&self, previous: Option<&Structure>, current: &Structure) -> ChangeSet {
        let Some(previous) = previous else {
            return all_changes();
        };

        let mut changes = ChangeSet::new();
        if previous.numbers() != current.numbers() {
            changes.insert(SystemChange::Numbers);
        }
        if previous.positions() != current.positions() {
            changes.insert(SystemChange::Positions);
        }
        if previous.cell() != current.cell() {
            changes.insert(SystemChange::Cell);
        }
        if previous.pbc() != current.pbc() {
            changes.insert(SystemChange::Pbc);
        }
        changes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Energy(f64),
    Forces(Vec<[f64; 3]>),
}

/// The calculator protocol over an [`ScfSolver`].
///
/// Every input change goes through an explicit invalidation, so a cached
/// solution is only ever read for the inputs it was solved with. Results
/// restored by [`DftkCalculator::read`] are reported by `results()` but are
/// never returned as a computation until a fresh solve replaces them.
pub struct DftkCalculator<S: ScfSolver, D = ExactChangeDetector> {
    solver: S,
    detector: D,
    parameters: ParameterSet,
    structure: Option<Structure>,
    results: ResultRecord,
    cache: CacheState<S::Solution>,
    store: Option<RecordStore>,
    model_override: Option<Model>,
    basis_override: Option<Basis>,
}

impl<S: ScfSolver> DftkCalculator<S> {
    pub fn new(solver: S) -> Self {
        Self::with_detector(solver, ExactChangeDetector)
    }

    /// Restores parameters, results and structure from an existing record
    /// and keeps writing to it. The restored cache is stale.
    pub fn restart(solver: S, store: RecordStore) -> CalcResult<Self> {
        let mut calculator = Self::new(solver);
        if let Err(error) = calculator.read(&store) {
            if error.category() == CalcErrorCategory::NotFound {
                warn!(path = %store.path().display(), "no record to restart from");
            }
            return Err(error);
        }
        Ok(calculator.with_store(store))
    }
}

impl<S: ScfSolver, D: ChangeDetector> DftkCalculator<S, D> {
    pub fn with_detector(solver: S, detector: D) -> Self {
        Self {
            solver,
            detector,
            parameters: ParameterSet::default(),
            structure: None,
            results: ResultRecord::default(),
            cache: CacheState::Stale,
            store: None,
            model_override: None,
            basis_override: None,
        }
    }

    /// Attaches a record store; every successful calculation is written to it.
    pub fn with_store(mut self, store: RecordStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_parameters(mut self, changes: &ParameterSet) -> CalcResult<Self> {
        self.set(changes)?;
        Ok(self)
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    pub fn results(&self) -> &ResultRecord {
        &self.results
    }

    pub fn store(&self) -> Option<&RecordStore> {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &CacheState<S::Solution> {
        &self.cache
    }

    pub fn is_fresh(&self) -> bool {
        self.cache.is_fresh()
    }

    pub fn implemented_properties(&self) -> &'static [Property] {
        &Property::IMPLEMENTED
    }

    /// Merges parameter changes and returns the keys that changed. Any change
    /// drops the cached solution and the results derived from it.
    pub fn set(&mut self, changes: &ParameterSet) -> CalcResult<BTreeSet<String>> {
        let changed = self.parameters.merge(changes)?;
        if !changed.is_empty() {
            debug!(keys = ?changed, "parameters changed");
            self.invalidate(InvalidationReason::ParametersChanged);
        }
        Ok(changed)
    }

    pub fn reset(&mut self) {
        self.invalidate(InvalidationReason::Reset);
    }

    /// Changes of `structure` against the last calculated one. Boundary
    /// condition flags are never reported: the cell is always periodic.
    pub fn check_state(&self, structure: &Structure) -> ChangeSet {
        let mut changes = self.detector.detect(self.structure.as_ref(), structure);
        changes.remove(&SystemChange::Pbc);
        changes
    }

    pub fn set_model_override(&mut self, model: Model) {
        self.cache.invalidate(InvalidationReason::OverrideInstalled);
        self.results.clear();
        self.model_override = Some(model);
    }

    pub fn set_basis_override(&mut self, basis: Basis) {
        self.cache.invalidate(InvalidationReason::OverrideInstalled);
        self.results.clear();
        self.basis_override = Some(basis);
    }

    /// The model for the current parameters and structure. Parameters are
    /// validated even when an override is installed.
    pub fn dftk_model(&self) -> CalcResult<Model> {
        let resolved = resolve_model_parameters(&self.parameters, self.structure.as_ref())?;
        if let Some(model) = &self.model_override {
            return Ok(model.clone());
        }
        let structure = self.structure.as_ref().ok_or_else(missing_structure)?;
        build_model(structure, &resolved)
    }

    /// The basis for the current parameters. `kpts` and `ecut` are validated
    /// even when an override is installed.
    pub fn dftk_basis(&self, model: Option<Model>) -> CalcResult<Basis> {
        let model = match model {
            Some(model) => model,
            None => self.dftk_model()?,
        };
        let built = build_basis(model, &self.parameters)?;
        Ok(self.basis_override.clone().unwrap_or(built))
    }

    pub fn calculate(
        &mut self,
        structure: &Structure,
        properties: &[Property],
        changes: &ChangeSet,
    ) -> CalcResult<&ResultRecord> {
        if changes.iter().any(|change| *change != SystemChange::Pbc) {
            self.invalidate(InvalidationReason::StructureChanged);
        }
        self.structure = Some(structure.clone());

        let settings = resolve_scf_settings(&self.parameters)?;
        if !self.cache.is_fresh() {
            let basis = self.dftk_basis(None)?;
            info!(
                kgrid = %basis.kgrid,
                ecut = basis.ecut,
                tolerance = settings.tolerance,
                n_bands = ?settings.n_bands,
                "running SCF"
            );
            let solution = self.solver.solve(&basis, &settings).map_err(|failure| {
                CalcError::computation("RUN.SCF", format!("SCF failed: {}", failure))
            })?;
            let total = solution.total_energy();
            if !total.is_finite() {
                return Err(CalcError::computation(
                    "RUN.SCF",
                    format!("SCF returned a non-finite total energy ({})", total),
                ));
            }
            self.cache.commit(basis, solution);
            self.results.clear();
        }

        let state = self.cache.cached().ok_or_else(|| {
            CalcError::internal("RUN.CACHE", "no cached solution after a successful SCF")
        })?;
        let energy = hartree_to_ev(state.solution.total_energy());
        let forces = if properties.contains(&Property::Forces) {
            let grouped = state.solution.forces().map_err(|failure| {
                CalcError::computation("RUN.FORCES", format!("force evaluation failed: {}", failure))
            })?;
            let forces = scatter_forces(&state.basis, grouped)?;
            if forces.iter().flatten().any(|component| !component.is_finite()) {
                return Err(CalcError::computation(
                    "RUN.FORCES",
                    "solver returned non-finite forces",
                ));
            }
            Some(forces)
        } else {
            None
        };

        self.results.energy = Some(energy);
        if forces.is_some() {
            self.results.forces = forces;
        }
        if let Some(store) = &self.store {
            self.write(store)?;
        }
        Ok(&self.results)
    }

    /// Returns a result for `structure`. Calculates unless the cache is fresh
    /// for this structure and already holds the property.
    pub fn get_property(
        &mut self,
        property: Property,
        structure: &Structure,
    ) -> CalcResult<PropertyValue> {
        let changes = self.check_state(structure);
        if !changes.is_empty() {
            self.invalidate(InvalidationReason::StructureChanged);
        }
        if !self.cache.is_fresh() || !self.results.contains(property) {
            self.calculate(structure, &[property], &changes)?;
        }

        let value = match property {
            Property::Energy => self.results.energy.map(PropertyValue::Energy),
            Property::Forces => self.results.forces.clone().map(PropertyValue::Forces),
        };
        value.ok_or_else(|| {
            CalcError::internal(
                "RUN.RESULTS",
                format!("property '{}' missing after calculation", property),
            )
        })
    }

    pub fn get_potential_energy(&mut self, structure: &Structure) -> CalcResult<f64> {
        match self.get_property(Property::Energy, structure)? {
            PropertyValue::Energy(energy) => Ok(energy),
            PropertyValue::Forces(_) => Err(unexpected_value(Property::Energy)),
        }
    }

    pub fn get_forces(&mut self, structure: &Structure) -> CalcResult<Vec<[f64; 3]>> {
        match self.get_property(Property::Forces, structure)? {
            PropertyValue::Forces(forces) => Ok(forces),
            PropertyValue::Energy(_) => Err(unexpected_value(Property::Forces)),
        }
    }

    pub fn write(&self, store: &RecordStore) -> CalcResult<PathBuf> {
        let structure = self.structure.clone().ok_or_else(|| {
            CalcError::setup(
                "SETUP.STRUCTURE",
                "no structure to persist; calculate or read a record first",
            )
        })?;
        write_record(
            store,
            &PersistedRecord {
                parameters: self.parameters.clone(),
                results: self.results.clone(),
                structure,
            },
        )
    }

    /// Loads parameters, results and structure. The cache is left stale, so
    /// the next calculation or property request solves again.
    pub fn read(&mut self, store: &RecordStore) -> CalcResult<()> {
        let record = read_record(store)?;
        self.invalidate(InvalidationReason::RecordLoaded);
        self.parameters = record.parameters;
        self.results = record.results;
        self.structure = Some(record.structure);
        Ok(())
    }

    fn invalidate(&mut self, reason: InvalidationReason) {
        self.cache.invalidate(reason);
        self.model_override = None;
        self.basis_override = None;
        if reason != InvalidationReason::RecordLoaded {
            self.results.clear();
        }
    }
}

/// Places per-species forces back into structure order, in eV/Å.
fn scatter_forces(basis: &Basis, grouped: Vec<Vec<[f64; 3]>>) -> CalcResult<Vec<[f64; 3]>> {
    let species = &basis.model.species;
    if grouped.len() != species.len() {
        return Err(force_shape_error(format!(
            "solver returned forces for {} species, expected {}",
            grouped.len(),
            species.len()
        )));
    }

    let mut forces = vec![[0.0; 3]; basis.model.atom_count()];
    for (group, group_forces) in species.iter().zip(grouped) {
        let indices = &group.atoms.atom_indices;
        if group_forces.len() != indices.len() {
            return Err(force_shape_error(format!(
                "solver returned {} forces for {}, expected {}",
                group_forces.len(),
                group.atoms.symbol,
                indices.len()
            )));
        }
        for (&index, force) in indices.iter().zip(group_forces) {
            let slot = forces.get_mut(index).ok_or_else(|| {
                force_shape_error(format!("atom index {} outside the structure", index))
            })?;
            *slot = force_to_ev_per_angstrom(force);
        }
    }
    Ok(forces)
}

fn force_shape_error(message: String) -> CalcError {
    CalcError::computation("RUN.FORCES", message)
}

fn missing_structure() -> CalcError {
    CalcError::setup("SETUP.STRUCTURE", "no structure provided to the calculator")
}

fn unexpected_value(property: Property) -> CalcError {
    CalcError::internal(
        "RUN.RESULTS",
        format!("calculator returned the wrong value kind for '{}'", property),
    )
}

#[cfg(test)]
mod tests {
    use super::{ChangeDetector, ExactChangeDetector, scatter_forces};
    use crate::common::units::HARTREE_PER_BOHR_EV_PER_ANGSTROM;
    use crate::domain::{CalcErrorCategory, SystemChange, all_changes};
    use crate::model::{Basis, KGrid, build_model};
    use crate::parameters::{ParameterSet, resolve_model_parameters};
    use crate::structure::Structure;

    fn water_like() -> Structure {
        Structure::from_symbols(
            &["H", "O", "H"],
            vec![[0.76, 0.59, 0.0], [0.0, 0.0, 0.0], [-0.76, 0.59, 0.0]],
            [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
        )
        .expect("structure should build")
    }

    #[test]
    fn exact_detector_reports_each_change_kind() {
        let detector = ExactChangeDetector;
        let structure = water_like();
        assert_eq!(detector.detect(None, &structure), all_changes());
        assert!(detector.detect(Some(&structure), &structure).is_empty());

        let mut moved = structure.clone();
        moved
            .set_positions(vec![[0.8, 0.59, 0.0], [0.0, 0.0, 0.0], [-0.76, 0.59, 0.0]])
            .expect("positions should update");
        moved.set_pbc([true, true, false]);
        let changes = detector.detect(Some(&structure), &moved);
        assert_eq!(
            changes.into_iter().collect::<Vec<_>>(),
            vec![SystemChange::Positions, SystemChange::Pbc]
        );
    }

    #[test]
    fn forces_are_scattered_back_to_structure_order() {
        let structure = water_like();
        let resolved = resolve_model_parameters(&ParameterSet::default(), Some(&structure))
            .expect("parameters should resolve");
        let basis = Basis {
            model: build_model(&structure, &resolved).expect("model should build"),
            ecut: 10.0,
            kgrid: KGrid([1, 1, 1]),
        };

        // Species order is H (atoms 0, 2) then O (atom 1).
        let grouped = vec![
            vec![[0.01, 0.0, 0.0], [-0.01, 0.0, 0.0]],
            vec![[0.0, 0.02, 0.0]],
        ];
        let forces = scatter_forces(&basis, grouped).expect("forces should scatter");
        let scale = HARTREE_PER_BOHR_EV_PER_ANGSTROM;
        assert_eq!(forces.len(), 3);
        assert!((forces[0][0] - 0.01 * scale).abs() <= 1.0e-12);
        assert!((forces[1][1] - 0.02 * scale).abs() <= 1.0e-12);
        assert!((forces[2][0] + 0.01 * scale).abs() <= 1.0e-12);

        let error = scatter_forces(&basis, vec![vec![[0.0; 3]; 3]])
            .expect_err("wrong grouping should fail");
        assert_eq!(error.category(), CalcErrorCategory::ComputationError);
    }
}
