use super::{
    CHARGE, DEFAULT_CHARGE, DEFAULT_PPS, DEFAULT_SCFTOL, DEFAULT_XC, FUNCTIONALS, NBANDS,
    ParameterSet, ParameterValue, PPS, SCFTOL, SMEARING, XC,
};
use crate::common::units::ev_to_hartree;
use crate::domain::{CalcError, CalcResult};
use crate::model::pseudopotentials::{CoreVariant, PseudopotentialFamily, PspFunctional};
use crate::structure::Structure;
use serde::{Deserialize, Serialize};

pub const LDA_FUNCTIONALS: [&str; 1] = ["lda_xc_teter93"];
pub const PBE_FUNCTIONALS: [&str; 2] = ["gga_x_pbe", "gga_c_pbe"];

const MAX_METHFESSEL_PAXTON_ORDER: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "kebab-case")]
pub enum Smearing {
    None,
    FermiDirac,
    Gaussian,
    MethfesselPaxton { order: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModelParameters {
    pub functionals: Vec<String>,
    pub pseudopotentials: PseudopotentialFamily,
    /// Smearing temperature in Hartree; zero without smearing.
    pub temperature: f64,
    pub smearing: Smearing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScfSettings {
    pub tolerance: f64,
    pub n_bands: Option<usize>,
}

pub fn resolve_model_parameters(
    parameters: &ParameterSet,
    structure: Option<&Structure>,
) -> CalcResult<ResolvedModelParameters> {
    if structure.is_none() {
        return Err(CalcError::setup(
            "SETUP.STRUCTURE",
            "no structure provided; a structure is required to perform a calculation",
        ));
    }

    let (psp_functional, default_functionals) = resolve_xc(parameters)?;
    let functionals = match parameters.get(FUNCTIONALS) {
        Some(value) => resolve_functionals(value)?,
        None => default_functionals.iter().map(|name| name.to_string()).collect(),
    };
    let core = resolve_core_variant(parameters)?;
    let (smearing, temperature) = match parameters.get(SMEARING) {
        Some(value) => resolve_smearing(value)?,
        None => (Smearing::None, 0.0),
    };

    let charge = match parameters.get(CHARGE) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| CalcError::invalid_parameter(CHARGE, value))?,
        None => DEFAULT_CHARGE,
    };
    if charge != 0.0 {
        return Err(CalcError::unsupported(
            "UNSUPPORTED.CHARGE",
            format!("charged systems not supported (charge = {})", charge),
        ));
    }

    Ok(ResolvedModelParameters {
        functionals,
        pseudopotentials: PseudopotentialFamily {
            functional: psp_functional,
            core,
        },
        temperature,
        smearing,
    })
}

pub fn resolve_scf_settings(parameters: &ParameterSet) -> CalcResult<ScfSettings> {
    let tolerance = match parameters.get(SCFTOL) {
        Some(value) => value
            .as_f64()
            .filter(|tolerance| tolerance.is_finite() && *tolerance > 0.0)
            .ok_or_else(|| CalcError::invalid_parameter(SCFTOL, value))?,
        None => DEFAULT_SCFTOL,
    };

    let n_bands = match parameters.get(NBANDS) {
        Some(value) => Some(
            value
                .as_integer()
                .filter(|bands| *bands > 0)
                .map(|bands| bands as usize)
                .ok_or_else(|| CalcError::invalid_parameter(NBANDS, value))?,
        ),
        None => None,
    };

    Ok(ScfSettings { tolerance, n_bands })
}

fn resolve_xc(parameters: &ParameterSet) -> CalcResult<(PspFunctional, &'static [&'static str])> {
    let xc = match parameters.get(XC) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| CalcError::invalid_parameter(XC, value))?,
        None => DEFAULT_XC,
    };

    match xc.to_ascii_lowercase().as_str() {
        "lda" => Ok((PspFunctional::Lda, &LDA_FUNCTIONALS[..])),
        "pbe" => Ok((PspFunctional::Pbe, &PBE_FUNCTIONALS[..])),
        _ => Err(CalcError::invalid_parameter(XC, ParameterValue::from(xc))),
    }
}

fn resolve_functionals(value: &ParameterValue) -> CalcResult<Vec<String>> {
    let invalid = || CalcError::invalid_parameter(FUNCTIONALS, value);
    match value {
        ParameterValue::Text(name) if !name.trim().is_empty() => Ok(vec![name.clone()]),
        ParameterValue::List(names) if !names.is_empty() => names
            .iter()
            .map(|name| {
                name.as_str()
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_string)
                    .ok_or_else(invalid)
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn resolve_core_variant(parameters: &ParameterSet) -> CalcResult<CoreVariant> {
    let pps = match parameters.get(PPS) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| CalcError::invalid_parameter(PPS, value))?,
        None => DEFAULT_PPS,
    };

    match pps {
        "hgh" => Ok(CoreVariant::FullCore),
        "hgh.k" => Ok(CoreVariant::SemiCore),
        _ => Err(CalcError::invalid_parameter(PPS, ParameterValue::from(pps))),
    }
}

/// Parses `(scheme, temperature[, order])`, temperature in eV.
fn resolve_smearing(value: &ParameterValue) -> CalcResult<(Smearing, f64)> {
    let invalid = || CalcError::invalid_parameter(SMEARING, value);
    let entries = value.as_list().ok_or_else(invalid)?;
    let (scheme, width, order) = match entries {
        [scheme, width] => (scheme, width, None),
        [scheme, width, order] => (scheme, width, Some(order)),
        _ => return Err(invalid()),
    };

    let scheme = scheme.as_str().ok_or_else(invalid)?.to_ascii_lowercase();
    let width = width
        .as_f64()
        .filter(|width| width.is_finite() && *width >= 0.0)
        .ok_or_else(invalid)?;

    let smearing = match (scheme.as_str(), order) {
        ("fermi-dirac", None) => Smearing::FermiDirac,
        ("gaussian", None) => Smearing::Gaussian,
        ("methfessel-paxton", order) => {
            let order = match order {
                Some(order) => order.as_integer().filter(|o| *o >= 0).ok_or_else(invalid)?,
                None => 1,
            };
            match order {
                0 => Smearing::Gaussian,
                1 | 2 => Smearing::MethfesselPaxton { order: order as u8 },
                _ => {
                    return Err(CalcError::unsupported(
                        "UNSUPPORTED.SMEARING",
                        format!(
                            "Methfessel-Paxton smearing of order {} not supported (maximum order {})",
                            order, MAX_METHFESSEL_PAXTON_ORDER
                        ),
                    ));
                }
            }
        }
        _ => return Err(invalid()),
    };

    Ok((smearing, ev_to_hartree(width)))
}
