//! Calculator adapter around a DFTK-style plane-wave DFT solver.
//!
//! Parameters are resolved into a [`model::Model`] and [`model::Basis`],
//! solved through a [`solver::ScfSolver`], cached by the
//! [`calculator::DftkCalculator`] and persisted as JSON records.

pub mod calculator;
pub mod common;
pub mod domain;
pub mod model;
pub mod parameters;
pub mod persistence;
pub mod solver;
pub mod structure;

pub use calculator::{ChangeDetector, DftkCalculator, ExactChangeDetector, PropertyValue};
pub use domain::{CalcError, CalcErrorCategory, CalcResult, Property, ResultRecord};
pub use parameters::{ParameterSet, ParameterValue};
pub use persistence::RecordStore;
pub use structure::Structure;
