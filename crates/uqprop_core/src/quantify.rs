//! Uncertainty quantification entry point.
//!
//! A run builds the design, evaluates the model and features at every node,
//! unifies ragged outputs, and fills one [`DataFeature`] per output with the
//! statistics of the configured method.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::data::{Array, Data, DataFeature};
use crate::design::{Design, GermSpace};
use crate::error::{ConfigError, Result};
use crate::evaluate::{EvaluationProgress, Evaluator, NodeResult};
use crate::interpolate::unify;
use crate::model::{Evaluation, FeatureSet, Model, ParameterValues};
use crate::parameters::ParameterSet;
use crate::statistics::{MonteCarlo, PcMethod, PolynomialChaos, StochasticMethod};

/// Stochastic method of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Polynomial chaos expansion
    #[default]
    Pc,
    /// Monte Carlo sampling
    Mc,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Pc => write!(f, "pc"),
            Method::Mc => write!(f, "mc"),
        }
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pc" => Ok(Method::Pc),
            "mc" => Ok(Method::Mc),
            _ => Err(ConfigError::InvalidSetting(format!(
                "unknown method {s:?}, expected pc or mc"
            ))),
        }
    }
}

/// Configuration of a quantification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifyConfig {
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub pc_method: PcMethod,
    /// Generate the design in independent normal space and map it through
    /// the Rosenblatt transform
    #[serde(default)]
    pub rosenblatt: bool,
    #[serde(default = "default_polynomial_order")]
    pub polynomial_order: usize,
    /// Gauss rule order; defaults to `polynomial_order + 2`
    #[serde(default)]
    pub quadrature_order: Option<usize>,
    /// Defaults to twice the number of expansion terms
    #[serde(default)]
    pub nr_collocation_nodes: Option<usize>,
    /// Samples of the fitted expansion used for percentiles
    #[serde(default = "default_nr_pc_mc_samples")]
    pub nr_pc_mc_samples: usize,
    #[serde(default = "default_nr_mc_samples")]
    pub nr_mc_samples: usize,
    /// Worker threads (defaults to CPU count)
    #[serde(default = "default_cpus", alias = "CPUs")]
    pub cpus: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Compute statistics for features with invalid evaluations
    #[serde(default = "default_true")]
    pub allow_incomplete: bool,
    #[serde(default = "default_true")]
    pub save_data: bool,
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    /// Store name without extension; defaults to the model name
    #[serde(default)]
    pub filename: Option<String>,
}

fn default_polynomial_order() -> usize {
    4
}

fn default_nr_pc_mc_samples() -> usize {
    10_000
}

fn default_nr_mc_samples() -> usize {
    1_000
}

fn default_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_true() -> bool {
    true
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("data")
}

impl Default for QuantifyConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            pc_method: PcMethod::default(),
            rosenblatt: false,
            polynomial_order: default_polynomial_order(),
            quadrature_order: None,
            nr_collocation_nodes: None,
            nr_pc_mc_samples: default_nr_pc_mc_samples(),
            nr_mc_samples: default_nr_mc_samples(),
            cpus: default_cpus(),
            seed: None,
            allow_incomplete: true,
            save_data: true,
            data_folder: default_data_folder(),
            filename: None,
        }
    }
}

impl QuantifyConfig {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_pc_method(mut self, pc_method: PcMethod) -> Self {
        self.pc_method = pc_method;
        self
    }

    pub fn with_rosenblatt(mut self, rosenblatt: bool) -> Self {
        self.rosenblatt = rosenblatt;
        self
    }

    pub fn with_polynomial_order(mut self, order: usize) -> Self {
        self.polynomial_order = order;
        self
    }

    pub fn with_quadrature_order(mut self, order: usize) -> Self {
        self.quadrature_order = Some(order);
        self
    }

    pub fn with_collocation_nodes(mut self, nodes: usize) -> Self {
        self.nr_collocation_nodes = Some(nodes);
        self
    }

    pub fn with_pc_mc_samples(mut self, samples: usize) -> Self {
        self.nr_pc_mc_samples = samples;
        self
    }

    pub fn with_mc_samples(mut self, samples: usize) -> Self {
        self.nr_mc_samples = samples;
        self
    }

    pub fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_allow_incomplete(mut self, allow: bool) -> Self {
        self.allow_incomplete = allow;
        self
    }

    pub fn with_save_data(mut self, save: bool) -> Self {
        self.save_data = save;
        self
    }

    pub fn with_data_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.data_folder = folder.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::InvalidSetting(msg.to_string()));
        if self.cpus == 0 {
            return invalid("cpus must be at least 1");
        }
        match self.method {
            Method::Mc if self.nr_mc_samples < 2 => invalid("nr_mc_samples must be at least 2"),
            Method::Pc if self.nr_pc_mc_samples == 0 => {
                invalid("nr_pc_mc_samples must be at least 1")
            }
            Method::Pc if self.nr_collocation_nodes == Some(0) => {
                invalid("nr_collocation_nodes must be at least 1")
            }
            _ => Ok(()),
        }
    }

    /// Where the store of `model_name` is written
    pub fn store_path(&self, model_name: &str) -> PathBuf {
        let name = self.filename.as_deref().unwrap_or(model_name);
        self.data_folder.join(format!("{name}.json"))
    }
}

/// A model, its parameters and features, ready to be quantified
#[derive(Debug, Clone)]
pub struct UncertaintyQuantification {
    model: Model,
    parameters: ParameterSet,
    features: FeatureSet,
    config: QuantifyConfig,
    progress: Option<EvaluationProgress>,
}

impl UncertaintyQuantification {
    pub fn new(model: Model, parameters: ParameterSet) -> Self {
        Self {
            model,
            parameters,
            features: FeatureSet::new(),
            config: QuantifyConfig::default(),
            progress: None,
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_config(mut self, config: QuantifyConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a progress handle; cancelling it aborts the run
    pub fn with_progress(mut self, progress: EvaluationProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn config(&self) -> &QuantifyConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut QuantifyConfig {
        &mut self.config
    }

    fn stochastic_method(&self, space: GermSpace) -> Box<dyn StochasticMethod> {
        let config = &self.config;
        match config.method {
            Method::Pc => {
                let mut pc = PolynomialChaos::new(space, config.polynomial_order, config.pc_method)
                    .with_samples(config.nr_pc_mc_samples);
                if let Some(order) = config.quadrature_order {
                    pc = pc.with_quadrature_order(order);
                }
                if let Some(nodes) = config.nr_collocation_nodes {
                    pc = pc.with_collocation_nodes(nodes);
                }
                Box::new(pc)
            }
            Method::Mc => Box::new(MonteCarlo::new(space, config.nr_mc_samples)),
        }
    }

    /// Run the full pipeline and return the populated [`Data`].
    ///
    /// The store is written to [`QuantifyConfig::store_path`] when `save_data`
    /// is set.
    pub fn quantify(&self) -> Result<Data> {
        let config = &self.config;
        config.validate()?;
        if self.features.names().any(|name| name == self.model.name) {
            return Err(ConfigError::InvalidSetting(format!(
                "feature {:?} has the same name as the model",
                self.model.name
            ))
            .into());
        }

        let joint = self.parameters.joint_distribution()?;
        if !joint.is_independent() && !config.rosenblatt {
            tracing::warn!("parameters are correlated, using the Rosenblatt transform");
        }
        let space = GermSpace::new(&joint, config.rosenblatt);
        let rosenblatt = space.uses_rosenblatt();
        let method = self.stochastic_method(space);

        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let design = method.design(&mut rng);
        let uncertain: Vec<String> = self
            .parameters
            .uncertain_parameters()
            .into_iter()
            .map(str::to_string)
            .collect();

        tracing::info!(
            model = %self.model.name,
            method = method.name(),
            parameters = uncertain.len(),
            nodes = design.len(),
            rosenblatt,
            "quantifying uncertainty"
        );

        let nodes = self.parameter_values(&design.nodes, &uncertain);
        let results = Evaluator::new(&self.model, &self.features, config.cpus)
            .evaluate(&nodes, self.progress.as_ref())?;

        let failed = results.iter().filter(|r| r.model.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, nodes = results.len(), "model evaluations failed");
        }

        let mut data = Data::new();
        data.model_name = self.model.name.clone();
        data.uncertain_parameters = uncertain;
        data.method = method.name().to_string();
        data.set_seed(config.seed);

        let outputs = std::iter::once((&self.model.name, &self.model.labels, None))
            .chain(self.features.iter().enumerate().map(|(i, f)| (&f.name, &f.labels, Some(i))));
        for (name, labels, slot) in outputs {
            let evaluations = collect_output(&results, slot);
            let feature = self.analyze_feature(
                &mut data,
                name,
                labels,
                evaluations,
                method.as_ref(),
                &design,
                &mut rng,
            );
            data.insert(feature);
        }

        data.remove_only_invalid_features();

        if config.save_data {
            let path = config.store_path(&self.model.name);
            data.save(&path)?;
            tracing::info!(path = %path.display(), "saved data");
        }
        Ok(data)
    }

    /// Quantify once per uncertain parameter, holding every other parameter
    /// at its nominal value.
    ///
    /// Stores land in `<data_folder>/single/<parameter>/`. A declared
    /// correlation does not apply to these runs.
    pub fn quantify_single(&self) -> Result<Vec<(String, Data)>> {
        let uncertain: Vec<String> = self
            .parameters
            .uncertain_parameters()
            .into_iter()
            .map(str::to_string)
            .collect();
        if uncertain.is_empty() {
            return Err(ConfigError::NoUncertainParameters.into());
        }
        if self.parameters.is_correlated() {
            tracing::warn!("single-parameter runs ignore the declared correlation");
        }

        let folder = self.config.data_folder.join("single");
        let mut runs = Vec::with_capacity(uncertain.len());
        for name in &uncertain {
            let mut uq = self.clone();
            uq.parameters.clear_correlation();
            for other in uncertain.iter().filter(|other| *other != name) {
                uq.parameters.clear_distribution(other)?;
            }
            tracing::info!(parameter = %name, "quantifying single parameter");
            let data = quantify_into(&uq, &folder.join(name))?;
            runs.push((name.clone(), data));
        }
        Ok(runs)
    }

    /// Uncertain values first (design order), then the fixed ones
    fn parameter_values(&self, nodes: &[Vec<f64>], uncertain: &[String]) -> Vec<ParameterValues> {
        let fixed = self.parameters.fixed_values();
        let names: Arc<[String]> = uncertain
            .iter()
            .cloned()
            .chain(fixed.iter().map(|(name, _)| name.to_string()))
            .collect();
        nodes
            .iter()
            .map(|node| {
                let values = node
                    .iter()
                    .copied()
                    .chain(fixed.iter().map(|(_, v)| *v))
                    .collect();
                ParameterValues::new(names.clone(), values, uncertain.len())
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_feature(
        &self,
        data: &mut Data,
        name: &str,
        labels: &[String],
        evaluations: Vec<Option<Evaluation>>,
        method: &dyn StochasticMethod,
        design: &Design,
        rng: &mut SmallRng,
    ) -> DataFeature {
        let total = evaluations.len();
        let unified = unify(name, evaluations);
        let valid = unified.valid_count();

        let mut feature = DataFeature::new(name);
        feature.labels = labels.to_vec();
        feature.time = unified.grid.clone().map(Array::vector);

        let incomplete = valid < total;
        if incomplete {
            data.mark_incomplete(name);
        }

        if valid == 0 {
            tracing::warn!(feature = name, "no valid evaluations");
        } else if incomplete && !self.config.allow_incomplete {
            tracing::warn!(
                feature = name,
                valid,
                total,
                "feature is incomplete, skipping statistics"
            );
        } else {
            match method.analyze(design, &unified.evaluations, rng) {
                Ok(stats) => stats.store(&mut feature),
                Err(insufficient) => {
                    tracing::warn!(feature = name, %insufficient, "statistics left unset");
                    data.mark_incomplete(name);
                }
            }
        }

        feature.evaluations = Some(
            unified
                .evaluations
                .into_iter()
                .map(|e| e.unwrap_or_else(Array::invalid))
                .collect(),
        );
        feature
    }
}

/// Evaluations of the model (`slot = None`) or of feature `slot`, in node order
fn collect_output(results: &[NodeResult], slot: Option<usize>) -> Vec<Option<Evaluation>> {
    results
        .iter()
        .map(|r| {
            let output = match slot {
                None => &r.model,
                Some(i) => &r.features[i],
            };
            output.as_ref().ok().cloned()
        })
        .collect()
}

/// Quantify and write the store under `folder`; used by drivers that run the
/// pipeline repeatedly
pub(crate) fn quantify_into(uq: &UncertaintyQuantification, folder: &Path) -> Result<Data> {
    let mut uq = uq.clone();
    uq.config.data_folder = folder.to_path_buf();
    uq.quantify()
}
