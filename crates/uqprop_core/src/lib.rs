//! Uncertainty quantification and sensitivity analysis library
//!
//! This crate propagates parameter uncertainty through a user-supplied model
//! and summarises the output with moments, percentiles and Sobol indices.
//! It supports:
//! - Scalar, time-series and n-d model outputs, including outputs whose grid
//!   changes between evaluations (adaptive models)
//! - Polynomial chaos expansions fitted by quadrature or point collocation
//! - Monte Carlo sampling over a Saltelli design
//! - Dependent parameters through a Gaussian copula and the Rosenblatt
//!   transform
//! - Parallel evaluation with progress reporting and cancellation
//! - A JSON store that round-trips every result
//!
//! # Example
//!
//! ```ignore
//! use uqprop_core::{Evaluation, Model, ParameterSet, QuantifyConfig, UncertaintyQuantification};
//!
//! let model = Model::new("sum", |p| Ok(Evaluation::scalar(p.uncertain().iter().sum())));
//! let mut parameters = ParameterSet::from_list([("a", Some(1.0), None), ("b", Some(2.0), None)])?;
//! parameters.set_all_distributions(uqprop_core::DistributionFamily::Uniform.factory(0.1))?;
//!
//! let data = UncertaintyQuantification::new(model, parameters)
//!     .with_config(QuantifyConfig::default().with_save_data(false))
//!     .quantify()?;
//! println!("{}", data);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod design;
pub mod error;
pub mod evaluate;
pub mod exploration;
pub mod interpolate;
pub mod quantify;
pub mod statistics;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod data;
pub mod model;
pub mod parameters;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use data::{Array, Data, DataFeature, Metric, Value};
pub use error::{ConfigError, DataError, ModelError, Result, UqError};
pub use evaluate::EvaluationProgress;
pub use exploration::{Exploration, ExplorationRun, McComparison, McRun};
pub use model::{Evaluation, Feature, FeatureSet, Model, ParameterValues};
pub use parameters::{Distribution, DistributionFamily, Parameter, ParameterSet};
pub use quantify::{Method, QuantifyConfig, UncertaintyQuantification};
pub use statistics::PcMethod;
