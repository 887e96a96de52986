use crate::common::elements::element_symbol;
use crate::domain::{CalcError, CalcResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const HGH_FAMILY: &str = "hgh";

/// Full-core HGH tables cover hydrogen through radon.
const FULLCORE_MAX_ATOMIC_NUMBER: usize = 86;

/// Elements with a semi-core HGH table.
const SEMICORE_ATOMIC_NUMBERS: [usize; 43] = [
    3, 4, 11, 12, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 37, 38, 39, 40, 41, 42, 43,
    44, 45, 46, 47, 48, 49, 55, 56, 57, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PspFunctional {
    Lda,
    Pbe,
}

impl PspFunctional {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lda => "lda",
            Self::Pbe => "pbe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreVariant {
    FullCore,
    SemiCore,
}

impl CoreVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullCore => "fullcore",
            Self::SemiCore => "semicore",
        }
    }

    pub fn is_available_for(self, atomic_number: usize) -> bool {
        match self {
            Self::FullCore => (1..=FULLCORE_MAX_ATOMIC_NUMBER).contains(&atomic_number),
            Self::SemiCore => SEMICORE_ATOMIC_NUMBERS.contains(&atomic_number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PseudopotentialFamily {
    pub functional: PspFunctional,
    pub core: CoreVariant,
}

impl PseudopotentialFamily {
    pub fn load(&self, atomic_number: usize) -> CalcResult<Pseudopotential> {
        let symbol = element_symbol(atomic_number).ok_or_else(|| {
            CalcError::setup(
                "SETUP.PSEUDOPOTENTIAL",
                format!("unknown atomic number {}", atomic_number),
            )
        })?;

        if !self.core.is_available_for(atomic_number) {
            return Err(CalcError::setup(
                "SETUP.PSEUDOPOTENTIAL",
                format!("no pseudopotential for element '{}' in family {}", symbol, self),
            ));
        }

        Ok(Pseudopotential {
            family: HGH_FAMILY.to_string(),
            functional: self.functional,
            core: self.core,
            element: symbol.to_string(),
        })
    }
}

impl Display for PseudopotentialFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            HGH_FAMILY,
            self.functional.as_str(),
            self.core.as_str()
        )
    }
}

/// Descriptor the solver uses to locate a pseudopotential table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pseudopotential {
    pub family: String,
    pub functional: PspFunctional,
    pub core: CoreVariant,
    pub element: String,
}
