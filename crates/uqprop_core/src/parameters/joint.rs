//! Joint distribution of the uncertain parameters.
//!
//! Independent marginals compose as a product distribution. A declared
//! correlation matrix couples them through a Gaussian copula, whose
//! Rosenblatt transform is
//!
//! ```text
//! forward:  z (iid N(0,1))  ->  y = L z  ->  x_i = F_i^-1(Phi(y_i))
//! inverse:  x  ->  y_i = Phi^-1(F_i(x_i))  ->  z = L^-1 y
//! ```
//!
//! with `L` the lower Cholesky factor of the correlation matrix.

use nalgebra::{DMatrix, DVector};

use crate::error::ConfigError;

use super::distribution::{Distribution, normal_cdf, normal_quantile};

const SYMMETRY_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct JointDistribution {
    marginals: Vec<Distribution>,
    correlation: Option<DMatrix<f64>>,
}

impl JointDistribution {
    /// Product distribution of independent marginals
    pub fn independent(marginals: Vec<Distribution>) -> Self {
        Self {
            marginals,
            correlation: None,
        }
    }

    /// Marginals coupled through a Gaussian copula with the given correlation
    pub fn correlated(
        marginals: Vec<Distribution>,
        correlation: &[Vec<f64>],
    ) -> Result<Self, ConfigError> {
        let n = marginals.len();
        if correlation.len() != n || correlation.iter().any(|row| row.len() != n) {
            return Err(ConfigError::InvalidCorrelation(format!(
                "expected a {n}x{n} matrix for {n} uncertain parameters"
            )));
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| correlation[i][j]);
        for i in 0..n {
            if (matrix[(i, i)] - 1.0).abs() > SYMMETRY_TOLERANCE {
                return Err(ConfigError::InvalidCorrelation(format!(
                    "diagonal entry {i} is {} instead of 1",
                    matrix[(i, i)]
                )));
            }
            for j in 0..i {
                if (matrix[(i, j)] - matrix[(j, i)]).abs() > SYMMETRY_TOLERANCE {
                    return Err(ConfigError::InvalidCorrelation(format!(
                        "entries ({i}, {j}) and ({j}, {i}) differ"
                    )));
                }
            }
        }
        if matrix.clone().cholesky().is_none() {
            return Err(ConfigError::InvalidCorrelation(
                "matrix is not positive definite".to_string(),
            ));
        }
        Ok(Self {
            marginals,
            correlation: Some(matrix),
        })
    }

    pub fn dim(&self) -> usize {
        self.marginals.len()
    }

    pub fn marginals(&self) -> &[Distribution] {
        &self.marginals
    }

    pub fn is_independent(&self) -> bool {
        self.correlation.is_none()
    }

    pub fn rosenblatt(&self) -> Rosenblatt {
        let cholesky = self
            .correlation
            .as_ref()
            .and_then(|c| c.clone().cholesky())
            .map(|c| c.l());
        Rosenblatt {
            marginals: self.marginals.clone(),
            cholesky,
        }
    }
}

/// Bijection between independent standard normal space and parameter space
#[derive(Debug, Clone)]
pub struct Rosenblatt {
    marginals: Vec<Distribution>,
    cholesky: Option<DMatrix<f64>>,
}

impl Rosenblatt {
    pub fn dim(&self) -> usize {
        self.marginals.len()
    }

    /// Map a point of independent standard normal space into parameter space
    pub fn forward(&self, z: &[f64]) -> Vec<f64> {
        let y = match &self.cholesky {
            Some(l) => (l * DVector::from_column_slice(z)).as_slice().to_vec(),
            None => z.to_vec(),
        };
        self.marginals
            .iter()
            .zip(&y)
            .map(|(m, &y)| from_standard_normal(m, y))
            .collect()
    }

    /// Map a parameter-space point back to independent standard normal space
    pub fn inverse(&self, x: &[f64]) -> Vec<f64> {
        let y: Vec<f64> = self
            .marginals
            .iter()
            .zip(x)
            .map(|(m, &x)| to_standard_normal(m, x))
            .collect();
        match &self.cholesky {
            Some(l) => l
                .solve_lower_triangular(&DVector::from_vec(y.clone()))
                .map_or(y, |z| z.as_slice().to_vec()),
            None => y,
        }
    }
}

fn from_standard_normal(marginal: &Distribution, y: f64) -> f64 {
    match marginal {
        Distribution::Normal { .. } | Distribution::LogNormal { .. } => marginal.from_germ(y),
        Distribution::Uniform { .. } => marginal.inverse_cdf(normal_cdf(y)),
    }
}

fn to_standard_normal(marginal: &Distribution, x: f64) -> f64 {
    match marginal {
        Distribution::Normal { .. } | Distribution::LogNormal { .. } => marginal.to_germ(x),
        Distribution::Uniform { .. } => normal_quantile(marginal.cdf(x)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution as _, StandardNormal};

    fn coupled() -> JointDistribution {
        JointDistribution::correlated(
            vec![
                Distribution::normal(-0.22, 0.03).unwrap(),
                Distribution::uniform(18.0, 22.0).unwrap(),
                Distribution::normal(0.22, 0.03).unwrap(),
            ],
            &[
                vec![1.0, 0.0, 0.5],
                vec![0.0, 1.0, 0.0],
                vec![0.5, 0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rosenblatt_is_a_bijection() {
        let r = coupled().rosenblatt();
        for z in [[0.0, 0.0, 0.0], [1.2, -0.4, 0.7], [-2.0, 1.5, -0.3]] {
            let x = r.forward(&z);
            let back = r.inverse(&x);
            for (a, b) in z.iter().zip(&back) {
                assert!((a - b).abs() < 1e-8, "{z:?} -> {x:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_independent_forward_is_marginal_quantile() {
        let joint = JointDistribution::independent(vec![Distribution::uniform(0.0, 2.0).unwrap()]);
        let x = joint.rosenblatt().forward(&[0.0]);
        assert!((x[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlated_samples_are_correlated() {
        let joint = coupled();
        let rosenblatt = joint.rosenblatt();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);
        let samples: Vec<Vec<f64>> = (0..4000)
            .map(|_| {
                let z: Vec<f64> = (0..3).map(|_| StandardNormal.sample(&mut rng)).collect();
                rosenblatt.forward(&z)
            })
            .collect();

        let n = samples.len() as f64;
        let mean = |i: usize| samples.iter().map(|s| s[i]).sum::<f64>() / n;
        let (m0, m2) = (mean(0), mean(2));
        let cov = samples.iter().map(|s| (s[0] - m0) * (s[2] - m2)).sum::<f64>() / n;
        let sd = |i: usize, m: f64| (samples.iter().map(|s| (s[i] - m).powi(2)).sum::<f64>() / n).sqrt();
        let rho = cov / (sd(0, m0) * sd(2, m2));
        assert!((rho - 0.5).abs() < 0.06, "rho = {rho}");
    }

    #[test]
    fn test_rejects_malformed_correlation() {
        let marginals = vec![
            Distribution::normal(0.0, 1.0).unwrap(),
            Distribution::normal(0.0, 1.0).unwrap(),
        ];
        assert!(JointDistribution::correlated(marginals.clone(), &[vec![1.0]]).is_err());
        assert!(
            JointDistribution::correlated(marginals.clone(), &[vec![1.0, 0.2], vec![0.3, 1.0]])
                .is_err()
        );
        assert!(
            JointDistribution::correlated(marginals, &[vec![1.0, 1.5], vec![1.5, 1.0]]).is_err()
        );
    }
}
