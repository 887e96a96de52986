//! Periodic structures and their conversion into the solver's representation.
//!
//! A [`Structure`] is stored in external units: Cartesian positions and cell
//! vectors in Ångström, one cell vector per row. [`load_lattice`] and
//! [`load_atoms`] produce the solver-side view: lattice vectors in Bohr and
//! atoms grouped by species with fractional coordinates.

pub mod extxyz;

pub use extxyz::{StructureTextError, parse_extxyz, write_extxyz};

use crate::common::elements::{atomic_number_for_symbol, element_symbol};
use crate::common::units::{TWO_PI, angstrom_to_bohr};
use crate::domain::{CalcError, CalcResult};
use serde::{Deserialize, Serialize};

const SINGULAR_VOLUME: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    numbers: Vec<usize>,
    positions: Vec<[f64; 3]>,
    cell: [[f64; 3]; 3],
    pbc: [bool; 3],
}

impl Structure {
    pub fn new(
        numbers: Vec<usize>,
        positions: Vec<[f64; 3]>,
        cell: [[f64; 3]; 3],
    ) -> CalcResult<Self> {
        if numbers.len() != positions.len() {
            return Err(CalcError::setup(
                "STRUCTURE.ATOMS",
                format!(
                    "structure has {} atomic numbers but {} positions",
                    numbers.len(),
                    positions.len()
                ),
            ));
        }
        if let Some(unknown) = numbers.iter().find(|z| element_symbol(**z).is_none()) {
            return Err(CalcError::setup(
                "STRUCTURE.ELEMENT",
                format!("unknown atomic number {}", unknown),
            ));
        }

        Ok(Self {
            numbers,
            positions,
            cell,
            pbc: [true; 3],
        })
    }

    pub fn from_symbols<S: AsRef<str>>(
        symbols: &[S],
        positions: Vec<[f64; 3]>,
        cell: [[f64; 3]; 3],
    ) -> CalcResult<Self> {
        let numbers = symbols
            .iter()
            .map(|symbol| {
                atomic_number_for_symbol(symbol.as_ref()).ok_or_else(|| {
                    CalcError::setup(
                        "STRUCTURE.ELEMENT",
                        format!("unknown element symbol '{}'", symbol.as_ref()),
                    )
                })
            })
            .collect::<CalcResult<Vec<_>>>()?;
        Self::new(numbers, positions, cell)
    }

    pub fn with_pbc(mut self, pbc: [bool; 3]) -> Self {
        self.pbc = pbc;
        self
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn numbers(&self) -> &[usize] {
        &self.numbers
    }

    pub fn symbols(&self) -> Vec<&'static str> {
        // Atomic numbers are validated on construction.
        self.numbers
            .iter()
            .map(|z| element_symbol(*z).unwrap_or("X"))
            .collect()
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    pub fn cell(&self) -> &[[f64; 3]; 3] {
        &self.cell
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn set_positions(&mut self, positions: Vec<[f64; 3]>) -> CalcResult<()> {
        if positions.len() != self.numbers.len() {
            return Err(CalcError::setup(
                "STRUCTURE.ATOMS",
                format!(
                    "expected {} positions, got {}",
                    self.numbers.len(),
                    positions.len()
                ),
            ));
        }
        self.positions = positions;
        Ok(())
    }

    pub fn set_cell(&mut self, cell: [[f64; 3]; 3]) {
        self.cell = cell;
    }

    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        self.pbc = pbc;
    }
}

/// Lattice vectors in Bohr, one vector per row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub vectors: [[f64; 3]; 3],
}

impl Lattice {
    pub fn volume(&self) -> f64 {
        determinant(&self.vectors).abs()
    }

    /// Reciprocal lattice vectors (including the factor 2π), one per row.
    pub fn reciprocal_vectors(&self) -> CalcResult<[[f64; 3]; 3]> {
        let [a1, a2, a3] = self.vectors;
        let triple = dot(a1, cross(a2, a3));
        if triple.abs() <= SINGULAR_VOLUME {
            return Err(singular_cell_error());
        }

        let scale = TWO_PI / triple;
        Ok([
            cross(a2, a3).map(|c| c * scale),
            cross(a3, a1).map(|c| c * scale),
            cross(a1, a2).map(|c| c * scale),
        ])
    }
}

/// All atoms of one species, in the order they appear in the structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomGroup {
    pub atomic_number: usize,
    pub symbol: String,
    /// Fractional coordinates with respect to the lattice vectors.
    pub positions: Vec<[f64; 3]>,
    /// Index of each grouped atom in the originating structure.
    pub atom_indices: Vec<usize>,
}

pub fn load_lattice(structure: &Structure) -> CalcResult<Lattice> {
    let vectors = structure.cell().map(|row| row.map(angstrom_to_bohr));
    let lattice = Lattice { vectors };
    if lattice.volume() <= SINGULAR_VOLUME {
        return Err(singular_cell_error());
    }
    Ok(lattice)
}

pub fn load_atoms(structure: &Structure) -> CalcResult<Vec<AtomGroup>> {
    let inverse = inverse3(structure.cell()).ok_or_else(singular_cell_error)?;

    let mut groups: Vec<AtomGroup> = Vec::new();
    for (index, (&atomic_number, position)) in structure
        .numbers()
        .iter()
        .zip(structure.positions())
        .enumerate()
    {
        let fractional = row_times_matrix(*position, &inverse);
        match groups
            .iter_mut()
            .find(|group| group.atomic_number == atomic_number)
        {
            Some(group) => {
                group.positions.push(fractional);
                group.atom_indices.push(index);
            }
            None => groups.push(AtomGroup {
                atomic_number,
                symbol: element_symbol(atomic_number).unwrap_or("X").to_string(),
                positions: vec![fractional],
                atom_indices: vec![index],
            }),
        }
    }
    Ok(groups)
}

fn singular_cell_error() -> CalcError {
    CalcError::setup(
        "STRUCTURE.CELL",
        "structure cell is singular; a fully periodic cell with non-zero volume is required",
    )
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    dot(m[0], cross(m[1], m[2]))
}

fn inverse3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = determinant(m);
    if det.abs() <= SINGULAR_VOLUME {
        return None;
    }

    // Columns of the inverse are the cross products of the rows.
    let c0 = cross(m[1], m[2]);
    let c1 = cross(m[2], m[0]);
    let c2 = cross(m[0], m[1]);
    Some([
        [c0[0] / det, c1[0] / det, c2[0] / det],
        [c0[1] / det, c1[1] / det, c2[1] / det],
        [c0[2] / det, c1[2] / det, c2[2] / det],
    ])
}

fn row_times_matrix(row: [f64; 3], m: &[[f64; 3]; 3]) -> [f64; 3] {
    [
        row[0] * m[0][0] + row[1] * m[1][0] + row[2] * m[2][0],
        row[0] * m[0][1] + row[1] * m[1][1] + row[2] * m[2][1],
        row[0] * m[0][2] + row[1] * m[1][2] + row[2] * m[2][2],
    ]
}

#[cfg(test)]
mod tests {
    use super::{Structure, load_atoms, load_lattice, norm};
    use crate::common::units::{BOHR_ANGSTROM, TWO_PI};
    use crate::domain::CalcErrorCategory;

    fn rocksalt_pair() -> Structure {
        Structure::from_symbols(
            &["Na", "Cl", "Na"],
            vec![[0.0, 0.0, 0.0], [1.4, 1.4, 1.4], [2.8, 0.0, 2.8]],
            [[5.6, 0.0, 0.0], [0.0, 5.6, 0.0], [0.0, 0.0, 5.6]],
        )
        .expect("structure should build")
    }

    #[test]
    fn structure_rejects_mismatched_lengths_and_unknown_symbols() {
        let error = Structure::new(vec![14, 14], vec![[0.0; 3]], [[1.0, 0.0, 0.0]; 3])
            .expect_err("lengths differ");
        assert_eq!(error.category(), CalcErrorCategory::SetupError);

        let error = Structure::from_symbols(&["Qq"], vec![[0.0; 3]], [[1.0, 0.0, 0.0]; 3])
            .expect_err("unknown symbol");
        assert!(error.message().contains("Qq"));
    }

    #[test]
    fn lattice_is_converted_to_bohr() {
        let lattice = load_lattice(&rocksalt_pair()).expect("lattice should load");
        assert!((lattice.vectors[0][0] - 5.6 / BOHR_ANGSTROM).abs() <= 1.0e-12);
        assert_eq!(lattice.vectors[0][1], 0.0);

        let reciprocal = lattice.reciprocal_vectors().expect("reciprocal vectors");
        let expected = TWO_PI / lattice.vectors[1][1];
        assert!((norm(reciprocal[1]) - expected).abs() <= 1.0e-12);
    }

    #[test]
    fn singular_cell_is_a_setup_error() {
        let structure = Structure::from_symbols(
            &["Si"],
            vec![[0.0; 3]],
            [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        )
        .expect("structure should build");
        let error = load_lattice(&structure).expect_err("cell is singular");
        assert_eq!(error.category(), CalcErrorCategory::SetupError);
        assert_eq!(error.placeholder(), "STRUCTURE.CELL");
    }

    #[test]
    fn atoms_are_grouped_by_species_with_fractional_positions() {
        let groups = load_atoms(&rocksalt_pair()).expect("atoms should load");

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].symbol, "Na");
        assert_eq!(groups[0].atom_indices, vec![0, 2]);
        assert_eq!(groups[1].symbol, "Cl");
        assert_eq!(groups[1].atom_indices, vec![1]);

        let na_second = groups[0].positions[1];
        assert!((na_second[0] - 0.5).abs() <= 1.0e-12);
        assert!(na_second[1].abs() <= 1.0e-12);
        assert!((na_second[2] - 0.5).abs() <= 1.0e-12);
        assert!((groups[1].positions[0][2] - 0.25).abs() <= 1.0e-12);
    }
}
