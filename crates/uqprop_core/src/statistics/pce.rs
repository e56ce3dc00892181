//! Polynomial chaos expansion.
//!
//! Each cell of a feature is approximated as `f(ξ) ≈ Σ_α c_α Ψ_α(ξ)` over the
//! orthonormal basis of the germ space. Orthonormality gives the moments and
//! Sobol indices directly from the coefficients:
//!
//! ```text
//! mean = c_0        variance = Σ_{α≠0} c_α²
//! S_i  = Σ_{α ∈ A_i} c_α² / variance   with A_i = { α : α_i > 0, α_j = 0 for j ≠ i }
//! ST_i = Σ_{α_i > 0} c_α² / variance
//! ```

use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::data::Array;
use crate::design::{Design, GermSpace, OrthonormalBasis};

use super::percentile::percentile_pair;
use super::{
    CellStatistics, FeatureStatistics, Insufficient, StochasticMethod, ValidRows, sensitivity,
};

const SVD_EPSILON: f64 = 1e-12;

/// How the expansion coefficients are fitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcMethod {
    /// Spectral projection on a tensor Gauss rule
    #[default]
    Quadrature,
    /// Least-squares regression on random germ samples
    Collocation,
}

#[derive(Debug, Clone)]
pub struct PolynomialChaos {
    space: GermSpace,
    basis: OrthonormalBasis,
    method: PcMethod,
    quadrature_order: usize,
    collocation_nodes: usize,
    /// Samples of the fitted expansion used for percentiles
    samples: usize,
}

impl PolynomialChaos {
    pub fn new(space: GermSpace, polynomial_order: usize, method: PcMethod) -> Self {
        let basis = OrthonormalBasis::new(space.germs(), polynomial_order);
        Self {
            collocation_nodes: 2 * basis.len(),
            quadrature_order: polynomial_order + 2,
            space,
            basis,
            method,
            samples: 10_000,
        }
    }

    pub fn with_quadrature_order(mut self, order: usize) -> Self {
        self.quadrature_order = order;
        self
    }

    pub fn with_collocation_nodes(mut self, nodes: usize) -> Self {
        self.collocation_nodes = nodes;
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn basis(&self) -> &OrthonormalBasis {
        &self.basis
    }

    fn required(&self) -> usize {
        match self.method {
            PcMethod::Quadrature => 1,
            PcMethod::Collocation => self.basis.len(),
        }
    }

    /// Coefficients `[term, cell]`
    fn fit(&self, design: &Design, rows: &ValidRows<'_>) -> Option<DMatrix<f64>> {
        let cells = rows.cells();
        match (self.method, &design.weights) {
            (PcMethod::Quadrature, Some(weights)) => {
                let total: f64 = rows.rows.iter().map(|(k, _)| weights[*k]).sum();
                if total <= 0.0 {
                    return None;
                }
                let mut coefficients = DMatrix::zeros(self.basis.len(), cells);
                for &(k, values) in &rows.rows {
                    let psi = self.basis.evaluate(&design.germ_nodes[k]);
                    let w = weights[k] / total;
                    for (term, &p) in psi.iter().enumerate() {
                        for (cell, &v) in values.iter().enumerate() {
                            coefficients[(term, cell)] += w * p * v;
                        }
                    }
                }
                Some(coefficients)
            }
            _ => {
                let evaluated: Vec<Vec<f64>> = rows
                    .rows
                    .iter()
                    .map(|(k, _)| self.basis.evaluate(&design.germ_nodes[*k]))
                    .collect();
                let psi = DMatrix::from_fn(rows.len(), self.basis.len(), |r, term| evaluated[r][term]);
                let targets = DMatrix::from_fn(rows.len(), cells, |r, cell| rows.rows[r].1[cell]);
                psi.svd(true, true).solve(&targets, SVD_EPSILON).ok()
            }
        }
    }

    fn percentiles(
        &self,
        coefficients: &DMatrix<f64>,
        rng: &mut SmallRng,
    ) -> (Vec<f64>, Vec<f64>) {
        let samples = self.samples.max(1);
        let mut psi = DMatrix::zeros(samples, self.basis.len());
        for s in 0..samples {
            let xi = self.space.sample(rng);
            for (term, p) in self.basis.evaluate(&xi).into_iter().enumerate() {
                psi[(s, term)] = p;
            }
        }

        (0..coefficients.ncols())
            .map(|cell| {
                let column: DVector<f64> = &psi * coefficients.column(cell);
                let mut values: Vec<f64> = column.iter().copied().collect();
                percentile_pair(&mut values)
            })
            .unzip()
    }
}

impl StochasticMethod for PolynomialChaos {
    fn name(&self) -> &'static str {
        "polynomial chaos"
    }

    fn design(&self, rng: &mut SmallRng) -> Design {
        match self.method {
            PcMethod::Quadrature => Design::quadrature(&self.space, self.quadrature_order),
            PcMethod::Collocation => Design::collocation(&self.space, self.collocation_nodes, rng),
        }
    }

    fn analyze(
        &self,
        design: &Design,
        evaluations: &[Option<Array>],
        rng: &mut SmallRng,
    ) -> Result<FeatureStatistics, Insufficient> {
        let rows = ValidRows::new(evaluations);
        let insufficient = Insufficient {
            valid: rows.len(),
            required: self.required(),
        };
        if rows.len() < insufficient.required {
            return Err(insufficient);
        }
        let coefficients = self.fit(design, &rows).ok_or(insufficient)?;

        let dim = self.space.dim();
        let indices = self.basis.indices();
        let cells = coefficients.ncols();

        let mut mean = Vec::with_capacity(cells);
        let mut variance = Vec::with_capacity(cells);
        let mut sobol_first = vec![vec![0.0; cells]; dim];
        let mut sobol_total = vec![vec![0.0; cells]; dim];

        for cell in 0..cells {
            let column = coefficients.column(cell);
            let var: f64 = column.iter().skip(1).map(|c| c * c).sum();
            let m = column[0];
            mean.push(m);
            variance.push(var);

            for i in 0..dim {
                let mut first = 0.0;
                let mut total = 0.0;
                for (alpha, c) in indices.iter().zip(column.iter()).skip(1) {
                    if alpha[i] == 0 {
                        continue;
                    }
                    let part = c * c;
                    total += part;
                    if alpha.iter().enumerate().all(|(j, &a)| j == i || a == 0) {
                        first += part;
                    }
                }
                sobol_first[i][cell] = sensitivity(first, var, m);
                sobol_total[i][cell] = sensitivity(total, var, m);
            }
        }

        let (percentile_5, percentile_95) = self.percentiles(&coefficients, rng);

        Ok(CellStatistics {
            mean,
            variance,
            percentile_5,
            percentile_95,
            sobol_first,
            sobol_total,
        }
        .into_arrays(&rows.shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Distribution, JointDistribution};
    use rand::SeedableRng;

    fn method(pc: PcMethod) -> PolynomialChaos {
        let joint = JointDistribution::independent(vec![
            Distribution::uniform(-1.0, 1.0).unwrap(),
            Distribution::uniform(-1.0, 1.0).unwrap(),
        ]);
        PolynomialChaos::new(GermSpace::new(&joint, false), 2, pc).with_samples(2000)
    }

    fn evaluate(design: &Design, f: impl Fn(&[f64]) -> f64) -> Vec<Option<Array>> {
        design
            .nodes
            .iter()
            .map(|x| Some(Array::scalar(f(x))))
            .collect()
    }

    #[test]
    fn test_quadrature_recovers_additive_model() {
        // f = x + 2y on U[-1,1]^2: Var = 1/3 + 4/3, S_x = 0.2, S_y = 0.8
        let pc = method(PcMethod::Quadrature);
        let mut rng = SmallRng::seed_from_u64(0);
        let design = pc.design(&mut rng);
        let evaluations = evaluate(&design, |x| x[0] + 2.0 * x[1]);
        let stats = pc.analyze(&design, &evaluations, &mut rng).unwrap();

        assert!(stats.mean.data()[0].abs() < 1e-12);
        assert!((stats.variance.data()[0] - 5.0 / 3.0).abs() < 1e-12);
        let first = stats.sobol_first.data();
        assert!((first[0] - 0.2).abs() < 1e-12);
        assert!((first[1] - 0.8).abs() < 1e-12);
        for (f, t) in first.iter().zip(stats.sobol_total.data()) {
            assert!((f - t).abs() < 1e-12);
        }
        assert!(stats.percentile_5.data()[0] < stats.percentile_95.data()[0]);
    }

    #[test]
    fn test_interaction_separates_first_and_total() {
        // f = x * y: all variance is interaction
        let pc = method(PcMethod::Quadrature);
        let mut rng = SmallRng::seed_from_u64(0);
        let design = pc.design(&mut rng);
        let evaluations = evaluate(&design, |x| x[0] * x[1]);
        let stats = pc.analyze(&design, &evaluations, &mut rng).unwrap();

        assert!(stats.sobol_first.data().iter().all(|s| s.abs() < 1e-12));
        assert!(stats.sobol_total.data().iter().all(|s| (s - 1.0).abs() < 1e-12));
        assert!(stats.sobol_total_sum.data().iter().all(|s| (s - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_collocation_fits_polynomial() {
        let pc = method(PcMethod::Collocation);
        let mut rng = SmallRng::seed_from_u64(5);
        let design = pc.design(&mut rng);
        assert_eq!(design.len(), 12);
        let evaluations = evaluate(&design, |x| 3.0 + x[0] * x[0]);
        let stats = pc.analyze(&design, &evaluations, &mut rng).unwrap();

        // E[x^2] = 1/3, Var[x^2] = 1/5 - 1/9
        assert!((stats.mean.data()[0] - (3.0 + 1.0 / 3.0)).abs() < 1e-9);
        assert!((stats.variance.data()[0] - (1.0 / 5.0 - 1.0 / 9.0)).abs() < 1e-9);
    }

    #[test]
    fn test_collocation_needs_one_node_per_term() {
        let pc = method(PcMethod::Collocation);
        let mut rng = SmallRng::seed_from_u64(5);
        let design = pc.design(&mut rng);
        let mut evaluations = evaluate(&design, |x| x[0]);
        for e in evaluations.iter_mut().skip(5) {
            *e = None;
        }
        assert_eq!(
            pc.analyze(&design, &evaluations, &mut rng),
            Err(Insufficient {
                valid: 5,
                required: 6
            })
        );
    }

    #[test]
    fn test_constant_output_has_zero_sensitivity() {
        let pc = method(PcMethod::Quadrature);
        let mut rng = SmallRng::seed_from_u64(0);
        let design = pc.design(&mut rng);
        let evaluations = evaluate(&design, |_| 4.0);
        let stats = pc.analyze(&design, &evaluations, &mut rng).unwrap();
        assert!(stats.sobol_first.data().iter().all(|&s| s == 0.0));
        assert_eq!(stats.sobol_first_sum.data(), &[0.0, 0.0]);
    }
}
