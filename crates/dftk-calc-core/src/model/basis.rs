use super::Model;
use crate::common::units::{ev_to_hartree, inverse_angstrom_to_inverse_bohr};
use crate::domain::{CalcError, CalcResult};
use crate::parameters::{DEFAULT_ECUT_EV, DEFAULT_KPTS_SPACING, ECUT, KPTS, ParameterSet, ParameterValue};
use crate::structure::{Lattice, norm};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Slack so a spacing that lands exactly on a grid boundary does not round up.
const GRID_ROUNDING_TOLERANCE: f64 = 1.0e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KGrid(pub [usize; 3]);

impl KGrid {
    pub fn point_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl Display for KGrid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.0[0], self.0[1], self.0[2])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basis {
    pub model: Model,
    /// Kinetic-energy cutoff in Hartree.
    pub ecut: f64,
    pub kgrid: KGrid,
}

pub fn build_basis(model: Model, parameters: &ParameterSet) -> CalcResult<Basis> {
    let kgrid = match parameters.get(KPTS) {
        Some(kpts) => resolve_kgrid(kpts, &model.lattice)?,
        None => kgrid_from_minimal_spacing(&model.lattice, DEFAULT_KPTS_SPACING)?,
    };

    let ecut_ev = match parameters.get(ECUT) {
        Some(value) => value
            .as_f64()
            .filter(|ecut| ecut.is_finite() && *ecut > 0.0)
            .ok_or_else(|| CalcError::invalid_parameter(ECUT, value))?,
        None => DEFAULT_ECUT_EV as f64,
    };

    Ok(Basis {
        model,
        ecut: ev_to_hartree(ecut_ev),
        kgrid,
    })
}

/// Interprets a `kpts` value against the lattice it will sample.
pub fn resolve_kgrid(kpts: &ParameterValue, lattice: &Lattice) -> CalcResult<KGrid> {
    if let Some(spacing) = kpts.as_f64() {
        return kgrid_from_minimal_spacing(lattice, spacing)
            .map_err(|_| CalcError::invalid_parameter(KPTS, kpts));
    }

    let Some(entries) = kpts.as_list() else {
        return Err(CalcError::invalid_parameter(KPTS, kpts));
    };

    match entries {
        [_, _, _] => {
            let mut grid = [0; 3];
            for (slot, entry) in grid.iter_mut().zip(entries) {
                *slot = entry
                    .as_integer()
                    .filter(|count| *count > 0)
                    .and_then(|count| usize::try_from(count).ok())
                    .ok_or_else(|| CalcError::invalid_parameter(KPTS, kpts))?;
            }
            Ok(KGrid(grid))
        }
        [_, _, _, shift]
            if shift
                .as_str()
                .is_some_and(|flag| flag.eq_ignore_ascii_case("gamma")) =>
        {
            Err(CalcError::unsupported(
                "UNSUPPORTED.KPOINTS",
                "shifted Monkhorst-Pack grids not supported",
            ))
        }
        _ => Err(CalcError::invalid_parameter(KPTS, kpts)),
    }
}

/// Smallest grid whose k-point spacing along each reciprocal vector is at
/// most `spacing` (in 1/Å, reciprocal vectors including 2π).
pub fn kgrid_from_minimal_spacing(lattice: &Lattice, spacing: f64) -> CalcResult<KGrid> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(CalcError::invalid_parameter(KPTS, spacing));
    }

    let spacing_bohr = inverse_angstrom_to_inverse_bohr(spacing);
    let reciprocal = lattice.reciprocal_vectors()?;
    let grid = reciprocal.map(|vector| {
        let divisions = (norm(vector) / spacing_bohr - GRID_ROUNDING_TOLERANCE).ceil();
        (divisions as usize).max(1)
    });
    Ok(KGrid(grid))
}

#[cfg(test)]
mod tests {
    use super::{KGrid, build_basis, kgrid_from_minimal_spacing, resolve_kgrid};
    use crate::domain::CalcErrorCategory;
    use crate::model::build_model;
    use crate::parameters::{ParameterSet, ParameterValue, resolve_model_parameters};
    use crate::structure::{Structure, load_lattice};

    fn cubic_silicon() -> Structure {
        Structure::from_symbols(
            &["Si", "Si"],
            vec![[0.0, 0.0, 0.0], [1.3575, 1.3575, 1.3575]],
            [[5.43, 0.0, 0.0], [0.0, 5.43, 0.0], [0.0, 0.0, 5.43]],
        )
        .expect("structure should build")
    }

    fn kpts(values: Vec<ParameterValue>) -> ParameterValue {
        ParameterValue::List(values)
    }

    #[test]
    fn default_spacing_gives_five_points_per_axis_for_silicon() {
        let structure = cubic_silicon();
        let parameters = ParameterSet::default();
        let resolved = resolve_model_parameters(&parameters, Some(&structure)).expect("resolve");
        let model = build_model(&structure, &resolved).expect("model");

        let basis = build_basis(model, &parameters).expect("basis should build");
        // 2π / 5.43 Å ≈ 1.157 1/Å, divided by 0.25 and rounded up.
        assert_eq!(basis.kgrid, KGrid([5, 5, 5]));
        assert!((basis.ecut - 14.699_728_870).abs() <= 1.0e-6);
    }

    #[test]
    fn coarser_spacing_never_adds_points() {
        let lattice = load_lattice(&cubic_silicon()).expect("lattice");
        let mut previous = usize::MAX;
        for spacing in [0.05, 0.1, 0.2, 0.25, 0.4, 0.8, 1.6, 5.0] {
            let grid = kgrid_from_minimal_spacing(&lattice, spacing).expect("grid");
            assert!(grid.point_count() <= previous);
            previous = grid.point_count();
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn explicit_grids_are_used_verbatim() {
        let lattice = load_lattice(&cubic_silicon()).expect("lattice");
        let grid = resolve_kgrid(&kpts(vec![2.into(), 3.into(), 4.0.into()]), &lattice)
            .expect("explicit grid");
        assert_eq!(grid, KGrid([2, 3, 4]));
        assert_eq!(grid.to_string(), "2x3x4");
    }

    #[test]
    fn gamma_shifted_grid_is_unsupported() {
        let lattice = load_lattice(&cubic_silicon()).expect("lattice");
        let error = resolve_kgrid(
            &kpts(vec![4.into(), 4.into(), 4.into(), "gamma".into()]),
            &lattice,
        )
        .expect_err("shifted grid should fail");

        assert_eq!(error.category(), CalcErrorCategory::UnsupportedFeature);
        assert_eq!(error.message(), "shifted Monkhorst-Pack grids not supported");
    }

    #[test]
    fn malformed_kpoint_specifications_are_invalid() {
        let lattice = load_lattice(&cubic_silicon()).expect("lattice");
        let explicit_list = kpts(vec![
            kpts(vec![0.into(), 0.into(), 0.into()]),
            kpts(vec![0.5.into(), 0.into(), 0.into()]),
        ]);
        let cases = [
            kpts(vec![4.into(), 4.into(), 4.into(), 1.into()]),
            kpts(vec![4.into(), 0.into(), 4.into()]),
            kpts(vec![4.into(), 2.5.into(), 4.into()]),
            explicit_list,
            ParameterValue::from(-0.1),
            ParameterValue::from("dense"),
        ];

        for value in cases {
            let error = resolve_kgrid(&value, &lattice).expect_err("kpts should be rejected");
            assert_eq!(error.category(), CalcErrorCategory::InvalidParameter);
            assert_eq!(error.parameter(), Some("kpts"));
        }
    }

    #[test]
    fn non_positive_cutoff_is_invalid() {
        let structure = cubic_silicon();
        let parameters = ParameterSet::default().with("ecut", 0);
        let resolved = resolve_model_parameters(&parameters, Some(&structure)).expect("resolve");
        let model = build_model(&structure, &resolved).expect("model");

        let error = build_basis(model, &parameters).expect_err("ecut 0 should fail");
        assert_eq!(error.parameter(), Some("ecut"));
    }
}
