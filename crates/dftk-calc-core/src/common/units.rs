//! Conversion factors between the external unit convention (eV, Å) and the
//! solver's atomic units (Hartree, Bohr).
//!
//! Values follow CODATA 2018.

pub const PI: f64 = std::f64::consts::PI;
pub const TWO_PI: f64 = 2.0 * PI;

/// Length of one Bohr radius in Ångström.
pub const BOHR_ANGSTROM: f64 = 0.529_177_210_903_f64;
/// Energy of one Hartree in electron volts.
pub const HARTREE_EV: f64 = 27.211_386_245_988_f64;
/// Force of one Hartree/Bohr in eV/Å.
pub const HARTREE_PER_BOHR_EV_PER_ANGSTROM: f64 = HARTREE_EV / BOHR_ANGSTROM;

pub fn ev_to_hartree(energy_ev: f64) -> f64 {
    energy_ev / HARTREE_EV
}

pub fn hartree_to_ev(energy_hartree: f64) -> f64 {
    energy_hartree * HARTREE_EV
}

pub fn angstrom_to_bohr(length_angstrom: f64) -> f64 {
    length_angstrom / BOHR_ANGSTROM
}

pub fn bohr_to_angstrom(length_bohr: f64) -> f64 {
    length_bohr * BOHR_ANGSTROM
}

pub fn force_to_ev_per_angstrom(force: [f64; 3]) -> [f64; 3] {
    force.map(|component| component * HARTREE_PER_BOHR_EV_PER_ANGSTROM)
}

/// Converts a reciprocal length (Å⁻¹) to Bohr⁻¹.
pub fn inverse_angstrom_to_inverse_bohr(wavenumber: f64) -> f64 {
    wavenumber * BOHR_ANGSTROM
}

#[cfg(test)]
mod tests {
    use super::{
        BOHR_ANGSTROM, HARTREE_EV, HARTREE_PER_BOHR_EV_PER_ANGSTROM, angstrom_to_bohr,
        bohr_to_angstrom, ev_to_hartree, force_to_ev_per_angstrom, hartree_to_ev,
        inverse_angstrom_to_inverse_bohr,
    };

    #[test]
    fn conversions_are_mutually_inverse() {
        for value in [0.0, 1.0, 400.0, -12.75] {
            assert!((hartree_to_ev(ev_to_hartree(value)) - value).abs() <= 1.0e-12);
            assert!((bohr_to_angstrom(angstrom_to_bohr(value)) - value).abs() <= 1.0e-12);
        }
    }

    #[test]
    fn default_cutoff_matches_known_hartree_value() {
        assert!((ev_to_hartree(400.0) - 14.699_728_870).abs() <= 1.0e-6);
        assert!((angstrom_to_bohr(BOHR_ANGSTROM) - 1.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn force_and_wavenumber_factors_are_consistent() {
        let force = force_to_ev_per_angstrom([1.0, -2.0, 0.0]);
        assert!((force[0] - HARTREE_EV / BOHR_ANGSTROM).abs() <= 1.0e-12);
        assert!((force[1] + 2.0 * HARTREE_PER_BOHR_EV_PER_ANGSTROM).abs() <= 1.0e-12);
        assert_eq!(force[2], 0.0);

        // 1 Å⁻¹ expressed per Bohr must be smaller, since 1 Bohr < 1 Å.
        assert!(inverse_angstrom_to_inverse_bohr(1.0) < 1.0);
    }
}
