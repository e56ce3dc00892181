//! Model and feature adapters.
//!
//! A [`Model`] wraps a user callable mapping parameter values to an
//! [`Evaluation`]. A [`Feature`] derives another evaluation from the model
//! output, or reports that it has no result for that node.

use std::fmt;
use std::sync::Arc;

use crate::data::Array;
use crate::error::ModelError;

/// Output of one model or feature call
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Coordinates of the last axis of `values`; `None` for grid-less output
    pub grid: Option<Vec<f64>>,
    pub values: Array,
}

impl Evaluation {
    pub fn new(grid: Option<Vec<f64>>, values: impl Into<Array>) -> Self {
        Self {
            grid,
            values: values.into(),
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self::new(None, Array::scalar(value))
    }

    /// A time series: `values[k]` observed at `grid[k]`
    pub fn series(grid: Vec<f64>, values: Vec<f64>) -> Self {
        Self::new(Some(grid), Array::vector(values))
    }

    /// Check the shape contract: non-empty values, no grid on a scalar, and a
    /// grid as long as the last axis.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.values.is_empty() {
            return Err(ModelError::MalformedOutput("empty values".to_string()));
        }
        match (&self.grid, self.values.shape().last()) {
            (Some(_), None) => Err(ModelError::MalformedOutput(
                "scalar output cannot have a grid".to_string(),
            )),
            (Some(grid), Some(&last)) if grid.len() != last => {
                Err(ModelError::MalformedOutput(format!(
                    "grid has {} points but the last axis has {last}",
                    grid.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Values of every parameter at one design node
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValues {
    names: Arc<[String]>,
    values: Vec<f64>,
    uncertain: usize,
}

impl ParameterValues {
    /// `names` lists the uncertain parameters first, then the fixed ones;
    /// `uncertain` is the length of the first block.
    pub fn new(names: Arc<[String]>, values: Vec<f64>, uncertain: usize) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self {
            names,
            values,
            uncertain,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Values of the uncertain parameters, ordered like `uncertain_parameters`
    pub fn uncertain(&self) -> &[f64] {
        &self.values[..self.uncertain]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type ModelFn = dyn Fn(&ParameterValues) -> Result<Evaluation, ModelError> + Send + Sync;
pub type FeatureFn = dyn Fn(&Evaluation) -> Option<Evaluation> + Send + Sync;

#[derive(Clone)]
pub struct Model {
    pub name: String,
    /// Axis labels, grid axis first
    pub labels: Vec<String>,
    func: Arc<ModelFn>,
}

impl Model {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ParameterValues) -> Result<Evaluation, ModelError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            labels: Vec::new(),
            func: Arc::new(func),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn run(&self, parameters: &ParameterValues) -> Result<Evaluation, ModelError> {
        (self.func)(parameters)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Feature {
    pub name: String,
    pub labels: Vec<String>,
    func: Arc<FeatureFn>,
}

impl Feature {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Evaluation) -> Option<Evaluation> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            labels: Vec::new(),
            func: Arc::new(func),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// `None` when the feature has no result for this model output
    pub fn compute(&self, model_output: &Evaluation) -> Option<Evaluation> {
        (self.func)(model_output)
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// Ordered set of features with unique names
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `feature`, replacing one with the same name
    pub fn with(mut self, feature: Feature) -> Self {
        self.insert(feature);
        self
    }

    pub fn insert(&mut self, feature: Feature) {
        match self.features.iter().position(|f| f.name == feature.name) {
            Some(i) => self.features[i] = feature,
            None => self.features.push(feature),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = Self::new();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_shapes() {
        assert!(Evaluation::scalar(1.0).validate().is_ok());
        assert!(Evaluation::series(vec![0.0, 1.0], vec![2.0, 3.0]).validate().is_ok());
        assert!(
            Evaluation::series(vec![0.0, 1.0, 2.0], vec![2.0, 3.0])
                .validate()
                .is_err()
        );
        assert!(Evaluation::new(Some(vec![0.0]), 1.0).validate().is_err());
        assert!(Evaluation::new(None, Vec::<f64>::new()).validate().is_err());

        let matrix = Array::matrix(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert!(Evaluation::new(Some(vec![0.0, 0.5, 1.0]), matrix).validate().is_ok());
    }

    #[test]
    fn test_parameter_values_lookup() {
        let names: Arc<[String]> = vec!["kappa".to_string(), "u_env".to_string()].into();
        let values = ParameterValues::new(names, vec![-0.05, 20.0], 1);
        assert_eq!(values.get("u_env"), Some(20.0));
        assert_eq!(values.get("t_0"), None);
        assert_eq!(values.uncertain(), &[-0.05]);
    }

    #[test]
    fn test_feature_set_replaces_by_name() {
        let set: FeatureSet = [
            Feature::new("max", |_| None),
            Feature::new("min", |_| None),
            Feature::new("max", |e| Some(e.clone())),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["max", "min"]);
        let out = set.iter().next().unwrap().compute(&Evaluation::scalar(2.0));
        assert_eq!(out, Some(Evaluation::scalar(2.0)));
    }
}
