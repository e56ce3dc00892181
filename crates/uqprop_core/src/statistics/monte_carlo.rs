//! Monte Carlo estimators over a Saltelli design.
//!
//! Moments and percentiles use the valid evaluations of blocks A and B.
//! Sensitivity indices use the rows `j` where A, B and every A_B^(i) are
//! valid:
//!
//! ```text
//! S_i  = mean_j( f_B (f_AB^(i) - f_A) ) / V            (Saltelli 2010)
//! ST_i = mean_j( (f_A - f_AB^(i))² ) / (2V)            (Jansen)
//! ```

use rand::rngs::SmallRng;

use crate::data::Array;
use crate::design::{Design, DesignLayout, GermSpace};

use super::percentile::{mean, percentile_pair, variance};
use super::{CellStatistics, FeatureStatistics, Insufficient, StochasticMethod, ValidRows, sensitivity};

const MIN_COMPLETE_ROWS: usize = 2;

#[derive(Debug, Clone)]
pub struct MonteCarlo {
    space: GermSpace,
    samples: usize,
}

impl MonteCarlo {
    pub fn new(space: GermSpace, samples: usize) -> Self {
        Self { space, samples }
    }
}

impl StochasticMethod for MonteCarlo {
    fn name(&self) -> &'static str {
        "monte carlo"
    }

    fn design(&self, rng: &mut SmallRng) -> Design {
        Design::saltelli(&self.space, self.samples, rng)
    }

    fn analyze(
        &self,
        design: &Design,
        evaluations: &[Option<Array>],
        _rng: &mut SmallRng,
    ) -> Result<FeatureStatistics, Insufficient> {
        let base = match design.layout {
            DesignLayout::Saltelli { base } => base,
            _ => evaluations.len() / 2,
        };
        let dim = self.space.dim();
        let head = evaluations.len().min(2 * base);

        let samples = ValidRows::new(&evaluations[..head]);
        let shape = samples.shape.clone();
        let cells = samples.cells();

        let row = |k: usize| {
            evaluations
                .get(k)
                .and_then(Option::as_ref)
                .filter(|a| a.is_finite() && a.shape() == shape.as_slice())
                .map(Array::data)
        };
        let complete: Vec<(&[f64], &[f64], Vec<&[f64]>)> = (0..base)
            .filter_map(|j| {
                let a = row(j)?;
                let b = row(base + j)?;
                let ab = (0..dim)
                    .map(|i| row((2 + i) * base + j))
                    .collect::<Option<Vec<_>>>()?;
                Some((a, b, ab))
            })
            .collect();

        if complete.len() < MIN_COMPLETE_ROWS {
            return Err(Insufficient {
                valid: complete.len(),
                required: MIN_COMPLETE_ROWS,
            });
        }

        let mut stats = CellStatistics {
            mean: Vec::with_capacity(cells),
            variance: Vec::with_capacity(cells),
            percentile_5: Vec::with_capacity(cells),
            percentile_95: Vec::with_capacity(cells),
            sobol_first: vec![vec![0.0; cells]; dim],
            sobol_total: vec![vec![0.0; cells]; dim],
        };

        for cell in 0..cells {
            let mut values: Vec<f64> = samples.rows.iter().map(|(_, v)| v[cell]).collect();
            stats.mean.push(mean(&values));
            stats.variance.push(variance(&values));
            let (p5, p95) = percentile_pair(&mut values);
            stats.percentile_5.push(p5);
            stats.percentile_95.push(p95);

            let f_a: Vec<f64> = complete.iter().map(|(a, _, _)| a[cell]).collect();
            let f_b: Vec<f64> = complete.iter().map(|(_, b, _)| b[cell]).collect();
            let pooled: Vec<f64> = f_a.iter().chain(&f_b).copied().collect();
            let v = variance(&pooled);
            let m = mean(&pooled);

            for i in 0..dim {
                let f_ab: Vec<f64> = complete.iter().map(|(_, _, ab)| ab[i][cell]).collect();
                let first = mean(
                    &(0..f_a.len())
                        .map(|j| f_b[j] * (f_ab[j] - f_a[j]))
                        .collect::<Vec<_>>(),
                );
                let total = mean(
                    &(0..f_a.len())
                        .map(|j| (f_a[j] - f_ab[j]).powi(2))
                        .collect::<Vec<_>>(),
                ) / 2.0;
                stats.sobol_first[i][cell] = sensitivity(first, v, m);
                stats.sobol_total[i][cell] = sensitivity(total, v, m);
            }
        }

        Ok(stats.into_arrays(&shape))
    }
}
