//! Per-feature record of evaluations and derived statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

use super::array::Array;

/// The fixed statistical-metric schema of a [`DataFeature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Evaluations,
    Time,
    Mean,
    Variance,
    Percentile5,
    Percentile95,
    SobolFirst,
    SobolFirstSum,
    SobolTotal,
    SobolTotalSum,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::Evaluations,
        Metric::Time,
        Metric::Mean,
        Metric::Variance,
        Metric::Percentile5,
        Metric::Percentile95,
        Metric::SobolFirst,
        Metric::SobolFirstSum,
        Metric::SobolTotal,
        Metric::SobolTotalSum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Evaluations => "evaluations",
            Metric::Time => "time",
            Metric::Mean => "mean",
            Metric::Variance => "variance",
            Metric::Percentile5 => "percentile_5",
            Metric::Percentile95 => "percentile_95",
            Metric::SobolFirst => "sobol_first",
            Metric::SobolFirstSum => "sobol_first_sum",
            Metric::SobolTotal => "sobol_total",
            Metric::SobolTotalSum => "sobol_total_sum",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DataError::UnknownAttribute(s.to_string()))
    }
}

/// A value stored under a key of a [`DataFeature`]
///
/// Stored as `{"kind": ..., "value": ...}` so empty lists keep their variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Array(Array),
    Ensemble(Vec<Array>),
    Labels(Vec<String>),
}

impl Value {
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_ensemble(&self) -> Option<&[Array]> {
        match self {
            Value::Ensemble(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Array(Array::scalar(v))
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(Array::vector(v))
    }
}

impl From<Vec<Array>> for Value {
    fn from(v: Vec<Array>) -> Self {
        Value::Ensemble(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Labels(v)
    }
}

const LABELS: &str = "labels";

/// Evaluations and statistics of one output feature.
///
/// The ten metrics of [`Metric::ALL`] are named optional fields; any other key
/// set through [`DataFeature::set`] lands in a separate attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFeature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluations: Option<Vec<Array>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Array>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_5: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_95: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sobol_first: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sobol_first_sum: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sobol_total: Option<Array>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sobol_total_sum: Option<Array>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

impl DataFeature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evaluations: None,
            time: None,
            labels: Vec::new(),
            mean: None,
            variance: None,
            percentile_5: None,
            percentile_95: None,
            sobol_first: None,
            sobol_first_sum: None,
            sobol_total: None,
            sobol_total_sum: None,
            attributes: BTreeMap::new(),
        }
    }

    fn array_slot(&self, metric: Metric) -> Option<&Option<Array>> {
        match metric {
            Metric::Evaluations => None,
            Metric::Time => Some(&self.time),
            Metric::Mean => Some(&self.mean),
            Metric::Variance => Some(&self.variance),
            Metric::Percentile5 => Some(&self.percentile_5),
            Metric::Percentile95 => Some(&self.percentile_95),
            Metric::SobolFirst => Some(&self.sobol_first),
            Metric::SobolFirstSum => Some(&self.sobol_first_sum),
            Metric::SobolTotal => Some(&self.sobol_total),
            Metric::SobolTotalSum => Some(&self.sobol_total_sum),
        }
    }

    fn array_slot_mut(&mut self, metric: Metric) -> Option<&mut Option<Array>> {
        match metric {
            Metric::Evaluations => None,
            Metric::Time => Some(&mut self.time),
            Metric::Mean => Some(&mut self.mean),
            Metric::Variance => Some(&mut self.variance),
            Metric::Percentile5 => Some(&mut self.percentile_5),
            Metric::Percentile95 => Some(&mut self.percentile_95),
            Metric::SobolFirst => Some(&mut self.sobol_first),
            Metric::SobolFirstSum => Some(&mut self.sobol_first_sum),
            Metric::SobolTotal => Some(&mut self.sobol_total),
            Metric::SobolTotalSum => Some(&mut self.sobol_total_sum),
        }
    }

    /// Whether a fixed metric currently holds a value
    pub fn is_set(&self, metric: Metric) -> bool {
        match self.array_slot(metric) {
            Some(slot) => slot.is_some(),
            None => self.evaluations.is_some(),
        }
    }

    /// Look up a metric, `labels`, or an attached attribute by name.
    ///
    /// A fixed metric that was never set yields `Ok(None)`; a key that is not
    /// part of the schema and was never attached is an error.
    pub fn get(&self, key: &str) -> Result<Option<Value>, DataError> {
        if key == LABELS {
            return Ok(Some(Value::Labels(self.labels.clone())));
        }
        if let Ok(metric) = key.parse::<Metric>() {
            return Ok(match self.array_slot(metric) {
                Some(slot) => slot.clone().map(Value::Array),
                None => self.evaluations.clone().map(Value::Ensemble),
            });
        }
        self.attributes
            .get(key)
            .cloned()
            .map(Some)
            .ok_or_else(|| DataError::UnknownAttribute(key.to_string()))
    }

    /// Store a value. Unknown keys become extra attributes.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), DataError> {
        let value = value.into();
        if key == LABELS {
            return match value {
                Value::Labels(labels) => {
                    self.labels = labels;
                    Ok(())
                }
                _ => Err(DataError::KindMismatch {
                    key: key.to_string(),
                    expected: "a list of labels",
                }),
            };
        }
        let Ok(metric) = key.parse::<Metric>() else {
            self.attributes.insert(key.to_string(), value);
            return Ok(());
        };
        match (metric, value) {
            (Metric::Evaluations, Value::Ensemble(evaluations)) => {
                self.evaluations = Some(evaluations);
                Ok(())
            }
            (Metric::Evaluations, _) => Err(DataError::KindMismatch {
                key: key.to_string(),
                expected: "a sequence of evaluations",
            }),
            (metric, Value::Array(array)) => {
                if let Some(slot) = self.array_slot_mut(metric) {
                    *slot = Some(array);
                }
                Ok(())
            }
            (_, _) => Err(DataError::KindMismatch {
                key: key.to_string(),
                expected: "an array",
            }),
        }
    }

    /// Unset a metric, clear `labels`, or detach an attribute.
    pub fn remove(&mut self, key: &str) -> Result<(), DataError> {
        if key == LABELS {
            self.labels.clear();
            return Ok(());
        }
        if let Ok(metric) = key.parse::<Metric>() {
            match self.array_slot_mut(metric) {
                Some(slot) => *slot = None,
                None => self.evaluations = None,
            }
            return Ok(());
        }
        self.attributes
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| DataError::UnknownAttribute(key.to_string()))
    }

    /// True if `key` is a populated metric or an attached attribute
    pub fn contains(&self, key: &str) -> bool {
        match key.parse::<Metric>() {
            Ok(metric) => self.is_set(metric),
            Err(_) => self.attributes.contains_key(key),
        }
    }

    /// Names of the populated fixed metrics (schema order) followed by the
    /// attached attributes.
    pub fn get_metrics(&self) -> Vec<String> {
        Metric::ALL
            .into_iter()
            .filter(|m| self.is_set(*m))
            .map(|m| m.as_str().to_string())
            .chain(self.attributes.keys().cloned())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = String> {
        self.get_metrics().into_iter()
    }

    pub fn len(&self) -> usize {
        Metric::ALL.iter().filter(|m| self.is_set(**m)).count() + self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Dimensionality of a single evaluation: the first evaluation that is not
    /// entirely `NaN` decides, and 0 is reported when there is none.
    pub fn ndim(&self) -> usize {
        self.evaluations
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|e| !e.is_all_nan())
            .map_or(0, Array::ndim)
    }

    /// True when there are evaluations and every one of them is invalid
    pub fn only_invalid(&self) -> bool {
        self.evaluations
            .as_ref()
            .is_some_and(|e| e.iter().all(Array::is_all_nan))
    }

    /// True when at least one evaluation is invalid
    pub fn has_invalid(&self) -> bool {
        self.evaluations
            .as_ref()
            .is_some_and(|e| e.iter().any(Array::is_all_nan))
    }
}

impl fmt::Display for DataFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.name)?;
        if !self.labels.is_empty() {
            writeln!(f, "labels: {}", self.labels.join(", "))?;
        }
        if let Some(evaluations) = &self.evaluations {
            let invalid = evaluations.iter().filter(|e| e.is_all_nan()).count();
            writeln!(
                f,
                "evaluations: {} ({} invalid), ndim {}",
                evaluations.len(),
                invalid,
                self.ndim()
            )?;
        }
        for metric in Metric::ALL.into_iter().skip(1) {
            if let Some(Some(array)) = self.array_slot(metric) {
                write!(f, "{metric}: shape {:?}", array.shape())?;
                match array.as_scalar() {
                    Some(v) => writeln!(f, " = {v}")?,
                    None => writeln!(f)?,
                }
            }
        }
        for (key, value) in &self.attributes {
            match value {
                Value::Array(a) => writeln!(f, "{key}: shape {:?}", a.shape())?,
                Value::Ensemble(e) => writeln!(f, "{key}: {} arrays", e.len())?,
                Value::Labels(l) => writeln!(f, "{key}: {}", l.join(", "))?,
            }
        }
        Ok(())
    }
}
