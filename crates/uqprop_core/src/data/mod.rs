//! Result container for a quantification run.
//!
//! [`Data`] maps feature names (in insertion order) to [`DataFeature`]
//! records and carries the run metadata. It round-trips through a JSON store
//! with the layout
//!
//! ```text
//! { model_name, uncertain_parameters, incomplete, method, seed, version,
//!   features: [ { name, evaluations?, time?, labels, mean?, ..., attributes? }, ... ] }
//! ```
//!
//! where every array is `{ shape, data }` and missing cells are `null`.

mod array;
mod feature;
mod store;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

pub use array::{Array, from_missing_sentinel, to_missing_sentinel};
pub use feature::{DataFeature, Metric, Value};

/// Version tag written into every store
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Evaluations, statistics and metadata of one quantification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub uncertain_parameters: Vec<String>,
    #[serde(default)]
    pub incomplete: Vec<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default, with = "store::seed_sentinel")]
    seed: Option<u64>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    features: Vec<DataFeature>,
}

fn default_version() -> String {
    VERSION.to_string()
}

impl Default for Data {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            uncertain_parameters: Vec::new(),
            incomplete: Vec::new(),
            method: String::new(),
            seed: None,
            version: default_version(),
            features: Vec::new(),
        }
    }
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store written by [`Data::save`]
    pub fn load(path: &Path) -> Result<Self, DataError> {
        store::read(path)
    }

    /// Replace the contents of `self` with a store read from `path`
    pub fn load_from(&mut self, path: &Path) -> Result<(), DataError> {
        *self = store::read(path)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        store::write(self, path)
    }

    /// Reset every field to its empty default, dropping all features
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Create an empty record for `name`, resetting it if it already exists
    pub fn add_feature(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.features[i] = DataFeature::new(name),
            None => self.features.push(DataFeature::new(name)),
        }
    }

    pub fn add_features<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.add_feature(name);
        }
    }

    pub fn get(&self, name: &str) -> Result<&DataFeature, DataError> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| DataError::FeatureNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut DataFeature, DataError> {
        self.features
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| DataError::FeatureNotFound(name.to_string()))
    }

    /// Store `feature` under its own name, replacing any record of that name
    pub fn insert(&mut self, feature: DataFeature) {
        match self.position(&feature.name) {
            Some(i) => self.features[i] = feature,
            None => self.features.push(feature),
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<DataFeature, DataError> {
        self.position(name)
            .map(|i| self.features.remove(i))
            .ok_or_else(|| DataError::FeatureNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Feature names in insertion order
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn features(&self) -> impl Iterator<Item = &DataFeature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn ndim(&self, name: &str) -> Result<usize, DataError> {
        self.get(name).map(DataFeature::ndim)
    }

    /// Record `name` as incomplete (no duplicates)
    pub fn mark_incomplete(&mut self, name: &str) {
        if !self.incomplete.iter().any(|n| n == name) {
            self.incomplete.push(name.to_string());
        }
    }

    /// Drop features whose evaluations are all invalid.
    ///
    /// Features with only some invalid evaluations stay, listed in `incomplete`.
    pub fn remove_only_invalid_features(&mut self) {
        let mut kept = Vec::with_capacity(self.features.len());
        for feature in std::mem::take(&mut self.features) {
            if feature.only_invalid() {
                tracing::warn!(
                    feature = %feature.name,
                    "feature only yields invalid evaluations, removing it"
                );
                self.mark_incomplete(&feature.name);
            } else {
                if feature.has_invalid() {
                    self.mark_incomplete(&feature.name);
                }
                kept.push(feature);
            }
        }
        self.features = kept;
    }

    /// Axis labels for `name`.
    ///
    /// Falls back to the model's labels when the feature has none and matches
    /// the model's dimensionality, otherwise to `ndim + 1` empty labels.
    pub fn get_labels(&self, name: &str) -> Result<Vec<String>, DataError> {
        let feature = self.get(name)?;
        if !feature.labels.is_empty() {
            return Ok(feature.labels.clone());
        }
        let ndim = feature.ndim();
        if let Ok(model) = self.get(&self.model_name)
            && !model.labels.is_empty()
            && model.ndim() == ndim
        {
            return Ok(model.labels.clone());
        }
        Ok(vec![String::new(); ndim + 1])
    }
}

impl<'a> IntoIterator for &'a Data {
    type Item = &'a DataFeature;
    type IntoIter = std::slice::Iter<'a, DataFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model: {}", self.model_name)?;
        writeln!(f, "method: {}", self.method)?;
        match self.seed {
            Some(seed) => writeln!(f, "seed: {seed}")?,
            None => writeln!(f, "seed: unset")?,
        }
        writeln!(
            f,
            "uncertain parameters: {}",
            self.uncertain_parameters.join(", ")
        )?;
        if !self.incomplete.is_empty() {
            writeln!(f, "incomplete: {}", self.incomplete.join(", "))?;
        }
        writeln!(f, "version: {}", self.version)?;
        for feature in &self.features {
            writeln!(f)?;
            write!(f, "{feature}")?;
        }
        Ok(())
    }
}
