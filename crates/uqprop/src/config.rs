//! YAML run files.
//!
//! ```yaml
//! model: coffee_cup_dependent
//! parameters:
//!   - name: kappa_hat
//!     value: -0.22
//!   - name: T_env
//!     value: 20
//!     distribution: { type: uniform, lower: 15, upper: 25 }
//! default_distribution: { family: normal, interval: 0.1 }
//! correlation: [[1.0, 0.5], [0.5, 1.0]]
//! quantify:
//!   method: pc
//!   polynomial_order: 4
//!   seed: 10
//! ```

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};
use uqprop_core::{
    Distribution, DistributionFamily, FeatureSet, Model, ParameterSet, QuantifyConfig,
    UncertaintyQuantification,
};

use crate::models::BuiltinModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub distribution: Option<Distribution>,
}

/// Distribution family applied to every listed parameter without one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultDistribution {
    pub family: DistributionFamily,
    pub interval: f64,
}

/// Joint normal law over a subset of the parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateNormal {
    pub names: Vec<String>,
    pub mean: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub model: BuiltinModel,
    /// The model's own parameters are used when empty
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default)]
    pub default_distribution: Option<DefaultDistribution>,
    /// Copula correlation over the uncertain parameters, in listed order
    #[serde(default)]
    pub correlation: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub multivariate_normal: Option<MultivariateNormal>,
    #[serde(default)]
    pub quantify: QuantifyConfig,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read run file {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("Failed to parse run file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_saphyr::from_str(content).map_err(|e| eyre!("{e}"))
    }

    pub fn parameters(&self) -> Result<ParameterSet> {
        let mut parameters = if self.parameters.is_empty() {
            self.model.default_parameters()?
        } else {
            ParameterSet::from_list(
                self.parameters
                    .iter()
                    .map(|p| (p.name.clone(), p.value, p.distribution)),
            )?
        };

        if let Some(default) = self.default_distribution {
            parameters.set_all_distributions(default.family.factory(default.interval))?;
        }
        if let Some(mvn) = &self.multivariate_normal {
            let names: Vec<&str> = mvn.names.iter().map(String::as_str).collect();
            parameters = parameters.with_multivariate_normal(&names, &mvn.mean, &mvn.covariance)?;
        }
        if let Some(matrix) = &self.correlation {
            parameters.set_correlation(matrix.clone())?;
        }
        Ok(parameters)
    }

    pub fn model(&self) -> Model {
        self.model.model()
    }

    pub fn features(&self) -> FeatureSet {
        self.model.features()
    }

    pub fn uncertainty_quantification(&self) -> Result<UncertaintyQuantification> {
        Ok(UncertaintyQuantification::new(self.model(), self.parameters()?)
            .with_features(self.features())
            .with_config(self.quantify.clone()))
    }
}
