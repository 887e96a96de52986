pub mod errors;

pub use errors::{CalcError, CalcErrorCategory, CalcResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Energy,
    Forces,
}

impl Property {
    pub const IMPLEMENTED: [Property; 2] = [Property::Energy, Property::Forces];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Forces => "forces",
        }
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for Property {
    type Err = CalcError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "energy" => Ok(Self::Energy),
            "forces" => Ok(Self::Forces),
            other => Err(CalcError::unsupported(
                "INPUT.PROPERTY",
                format!(
                    "property '{}' is not implemented; available properties: energy, forces",
                    other
                ),
            )),
        }
    }
}

/// One aspect of a structure that differs from the one last calculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemChange {
    Positions,
    Numbers,
    Cell,
    Pbc,
}

impl SystemChange {
    pub const ALL: [SystemChange; 4] = [
        SystemChange::Positions,
        SystemChange::Numbers,
        SystemChange::Cell,
        SystemChange::Pbc,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positions => "positions",
            Self::Numbers => "numbers",
            Self::Cell => "cell",
            Self::Pbc => "pbc",
        }
    }
}

impl Display for SystemChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

pub type ChangeSet = BTreeSet<SystemChange>;

pub fn all_changes() -> ChangeSet {
    SystemChange::ALL.into_iter().collect()
}

/// Computed properties in external units (eV, eV/Å).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forces: Option<Vec<[f64; 3]>>,
}

impl ResultRecord {
    pub fn contains(&self, property: Property) -> bool {
        match property {
            Property::Energy => self.energy.is_some(),
            Property::Forces => self.forces.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_none() && self.forces.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
