pub mod resolver;

pub use resolver::{
    ResolvedModelParameters, ScfSettings, Smearing, resolve_model_parameters,
    resolve_scf_settings,
};

use crate::domain::{CalcError, CalcResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

pub const XC: &str = "xc";
pub const FUNCTIONALS: &str = "functionals";
pub const PPS: &str = "pps";
pub const KPTS: &str = "kpts";
pub const SMEARING: &str = "smearing";
pub const NBANDS: &str = "nbands";
pub const CHARGE: &str = "charge";
pub const SCFTOL: &str = "scftol";
pub const ECUT: &str = "ecut";

pub const RECOGNIZED_KEYS: [&str; 9] = [
    XC,
    FUNCTIONALS,
    PPS,
    KPTS,
    SMEARING,
    NBANDS,
    CHARGE,
    SCFTOL,
    ECUT,
];

pub const DEFAULT_XC: &str = "LDA";
pub const DEFAULT_PPS: &str = "hgh";
pub const DEFAULT_KPTS_SPACING: f64 = 0.25;
pub const DEFAULT_CHARGE: f64 = 0.0;
pub const DEFAULT_SCFTOL: f64 = 1.0e-5;
pub const DEFAULT_ECUT_EV: i64 = 400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ParameterValue>),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Integral numbers only; `4.0` is accepted, `4.5` is not.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParameterValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Value equality that treats `0` and `0.0` as the same setting.
    pub fn same_value(&self, other: &ParameterValue) -> bool {
        match (self, other) {
            (Self::List(left), Self::List(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(l, r)| l.same_value(r))
            }
            _ if self.is_number() && other.is_number() => self.as_f64() == other.as_f64(),
            _ => self == other,
        }
    }
}

impl Display for ParameterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<ParameterValue>> From<Vec<T>> for ParameterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParameterValue>> From<Option<T>> for ParameterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParameterValue>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::empty()
            .with(XC, DEFAULT_XC)
            .with(KPTS, DEFAULT_KPTS_SPACING)
            .with(CHARGE, DEFAULT_CHARGE)
            .with(PPS, DEFAULT_PPS)
            .with(SCFTOL, DEFAULT_SCFTOL)
            .with(ECUT, DEFAULT_ECUT_EV)
    }
}

impl ParameterSet {
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<ParameterValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Looks up a key; explicit nulls read as absent.
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Applies `changes` and returns the keys whose value actually changed.
    ///
    /// Every key is checked before anything is applied, so an unknown key
    /// leaves the set untouched. A null value removes the key.
    pub fn merge(&mut self, changes: &ParameterSet) -> CalcResult<BTreeSet<String>> {
        if let Some((key, value)) = changes
            .values
            .iter()
            .find(|(key, _)| !RECOGNIZED_KEYS.contains(&key.as_str()))
        {
            return Err(CalcError::invalid_parameter(
                key,
                format!("{} (unknown parameter; recognized: {})", value, RECOGNIZED_KEYS.join(", ")),
            ));
        }

        let mut changed = BTreeSet::new();
        for (key, value) in &changes.values {
            if value.is_null() {
                if self.values.remove(key).is_some_and(|old| !old.is_null()) {
                    changed.insert(key.clone());
                }
                continue;
            }

            let differs = self
                .values
                .get(key)
                .is_none_or(|current| !current.same_value(value));
            if differs {
                self.values.insert(key.clone(), value.clone());
                changed.insert(key.clone());
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::{ParameterSet, ParameterValue, RECOGNIZED_KEYS};
    use crate::domain::CalcErrorCategory;

    #[test]
    fn defaults_cover_documented_values() {
        let parameters = ParameterSet::default();
        assert_eq!(parameters.get("xc").and_then(ParameterValue::as_str), Some("LDA"));
        assert_eq!(parameters.get("pps").and_then(ParameterValue::as_str), Some("hgh"));
        assert_eq!(parameters.get("kpts").and_then(ParameterValue::as_f64), Some(0.25));
        assert_eq!(parameters.get("ecut").and_then(ParameterValue::as_f64), Some(400.0));
        assert_eq!(parameters.get("scftol").and_then(ParameterValue::as_f64), Some(1.0e-5));
        assert_eq!(parameters.get("charge").and_then(ParameterValue::as_f64), Some(0.0));
        assert!(parameters.get("smearing").is_none());
        assert!(parameters.get("nbands").is_none());
    }

    #[test]
    fn json_round_trip_preserves_value_shapes() {
        let parameters = ParameterSet::default()
            .with("kpts", vec![ParameterValue::from(4), 4.into(), 4.into(), "gamma".into()])
            .with("smearing", vec![ParameterValue::from("gaussian"), 0.01.into()])
            .with("nbands", 12);

        let json = serde_json::to_string(&parameters).expect("parameters should serialize");
        let parsed: ParameterSet = serde_json::from_str(&json).expect("parameters should parse");

        assert_eq!(parsed, parameters);
        assert_eq!(parsed.get("nbands"), Some(&ParameterValue::Integer(12)));
        assert_eq!(parsed.get("ecut"), Some(&ParameterValue::Integer(400)));
    }

    #[test]
    fn merge_reports_only_changed_keys() {
        let mut parameters = ParameterSet::default();
        let changes = ParameterSet::empty()
            .with("charge", 0)
            .with("xc", "PBE")
            .with("ecut", 400.0);

        let changed = parameters.merge(&changes).expect("merge should succeed");
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["xc".to_string()]);
        assert_eq!(parameters.get("xc").and_then(ParameterValue::as_str), Some("PBE"));

        let unchanged = parameters.merge(&changes).expect("merge should succeed");
        assert!(unchanged.is_empty());
    }

    #[test]
    fn merge_with_null_removes_keys() {
        let mut parameters = ParameterSet::default().with("nbands", 8);
        let changed = parameters
            .merge(&ParameterSet::empty().with("nbands", ParameterValue::Null))
            .expect("merge should succeed");

        assert!(changed.contains("nbands"));
        assert!(parameters.get("nbands").is_none());

        let changed = parameters
            .merge(&ParameterSet::empty().with("smearing", ParameterValue::Null))
            .expect("merge should succeed");
        assert!(changed.is_empty());
    }

    #[test]
    fn merge_rejects_unknown_keys_without_partial_update() {
        let mut parameters = ParameterSet::default();
        let before = parameters.clone();
        let error = parameters
            .merge(&ParameterSet::empty().with("xc", "PBE").with("spinpol", 1))
            .expect_err("unknown key should fail");

        assert_eq!(error.category(), CalcErrorCategory::InvalidParameter);
        assert_eq!(error.parameter(), Some("spinpol"));
        assert_eq!(parameters, before);
        assert_eq!(RECOGNIZED_KEYS.len(), 9);
    }

    #[test]
    fn numeric_accessors_distinguish_integral_values() {
        assert_eq!(ParameterValue::Float(4.0).as_integer(), Some(4));
        assert_eq!(ParameterValue::Float(4.5).as_integer(), None);
        assert_eq!(ParameterValue::from("4").as_f64(), None);
        assert!(ParameterValue::Integer(0).same_value(&ParameterValue::Float(0.0)));
        assert_eq!(ParameterValue::from(vec![1, 2]).to_string(), "[1,2]");
    }
}
