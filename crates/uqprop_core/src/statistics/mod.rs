//! Statistics engine.
//!
//! A [`StochasticMethod`] owns both ends of a run: it builds the design the
//! model is evaluated at, then turns the unified evaluations of one feature
//! into [`FeatureStatistics`]. Two methods exist:
//!
//! - [`PolynomialChaos`]: spectral projection or least-squares fit of an
//!   orthonormal polynomial expansion over the germ space
//! - [`MonteCarlo`]: sampling estimators over a Saltelli design

mod monte_carlo;
mod pce;
pub mod percentile;

use std::fmt;

use rand::rngs::SmallRng;

use crate::data::{Array, DataFeature};
use crate::design::Design;

pub use monte_carlo::MonteCarlo;
pub use pce::{PcMethod, PolynomialChaos};

/// Statistics of one feature, aligned to its unified grid
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStatistics {
    pub mean: Array,
    pub variance: Array,
    pub percentile_5: Array,
    pub percentile_95: Array,
    /// Shape `[parameters, ...feature shape]`
    pub sobol_first: Array,
    /// Shape `[parameters]`
    pub sobol_first_sum: Array,
    pub sobol_total: Array,
    pub sobol_total_sum: Array,
}

impl FeatureStatistics {
    /// Write every metric into `feature`
    pub fn store(self, feature: &mut DataFeature) {
        feature.mean = Some(self.mean);
        feature.variance = Some(self.variance);
        feature.percentile_5 = Some(self.percentile_5);
        feature.percentile_95 = Some(self.percentile_95);
        feature.sobol_first = Some(self.sobol_first);
        feature.sobol_first_sum = Some(self.sobol_first_sum);
        feature.sobol_total = Some(self.sobol_total);
        feature.sobol_total_sum = Some(self.sobol_total_sum);
    }
}

/// Too few valid evaluations to estimate anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insufficient {
    pub valid: usize,
    pub required: usize,
}

impl fmt::Display for Insufficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} valid evaluations, at least {} required",
            self.valid, self.required
        )
    }
}

pub trait StochasticMethod {
    /// Tag recorded as `Data::method`
    fn name(&self) -> &'static str;

    fn design(&self, rng: &mut SmallRng) -> Design;

    /// Statistics of one feature; `evaluations[k]` belongs to design node `k`
    /// and `None` marks an invalid evaluation
    fn analyze(
        &self,
        design: &Design,
        evaluations: &[Option<Array>],
        rng: &mut SmallRng,
    ) -> Result<FeatureStatistics, Insufficient>;
}

/// Evaluations usable for statistics: present and finite in every cell
struct ValidRows<'a> {
    shape: Vec<usize>,
    rows: Vec<(usize, &'a [f64])>,
}

impl<'a> ValidRows<'a> {
    fn new(evaluations: &'a [Option<Array>]) -> Self {
        let rows: Vec<(usize, &Array)> = evaluations
            .iter()
            .enumerate()
            .filter_map(|(k, e)| e.as_ref().filter(|a| a.is_finite()).map(|a| (k, a)))
            .collect();
        let shape = rows.first().map(|(_, a)| a.shape().to_vec()).unwrap_or_default();
        Self {
            rows: rows
                .into_iter()
                .filter(|(_, a)| a.shape() == shape.as_slice())
                .map(|(k, a)| (k, a.data()))
                .collect(),
            shape,
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn cells(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Per-cell statistics before they are shaped into arrays
struct CellStatistics {
    mean: Vec<f64>,
    variance: Vec<f64>,
    percentile_5: Vec<f64>,
    percentile_95: Vec<f64>,
    /// `[parameter][cell]`
    sobol_first: Vec<Vec<f64>>,
    sobol_total: Vec<Vec<f64>>,
}

impl CellStatistics {
    fn into_arrays(self, shape: &[usize]) -> FeatureStatistics {
        let cells = |data: Vec<f64>| {
            Array::from_shape(shape.to_vec(), data).unwrap_or_else(Array::invalid)
        };
        let per_parameter = |indices: &[Vec<f64>]| {
            let mut full_shape = vec![indices.len()];
            full_shape.extend_from_slice(shape);
            let data = indices.iter().flatten().copied().collect();
            Array::from_shape(full_shape, data).unwrap_or_else(Array::invalid)
        };

        FeatureStatistics {
            sobol_first: per_parameter(&self.sobol_first),
            sobol_first_sum: Array::vector(normalized_sums(&self.sobol_first)),
            sobol_total: per_parameter(&self.sobol_total),
            sobol_total_sum: Array::vector(normalized_sums(&self.sobol_total)),
            mean: cells(self.mean),
            variance: cells(self.variance),
            percentile_5: cells(self.percentile_5),
            percentile_95: cells(self.percentile_95),
        }
    }
}

/// Sum of each parameter's index over the grid, scaled so the parameters add
/// to one. Left unscaled when everything sums to zero.
fn normalized_sums(indices: &[Vec<f64>]) -> Vec<f64> {
    let sums: Vec<f64> = indices
        .iter()
        .map(|s| s.iter().filter(|v| v.is_finite()).sum())
        .collect();
    let total: f64 = sums.iter().sum();
    if total == 0.0 {
        return sums;
    }
    sums.into_iter().map(|s| s / total).collect()
}

/// Variances below this fraction of `1 + mean²` count as zero
const VARIANCE_FLOOR: f64 = 1e-20;

/// `part / variance`, or 0 where the output does not vary
fn sensitivity(part: f64, variance: f64, mean: f64) -> f64 {
    if variance > VARIANCE_FLOOR * (1.0 + mean * mean) {
        part / variance
    } else {
        0.0
    }
}
