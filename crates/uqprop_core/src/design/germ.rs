//! Independent germ variables and their orthonormal polynomial families.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::parameters::{Distribution, JointDistribution, Rosenblatt};

/// Reference random variable of one design dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Germ {
    /// U[-1, 1], expanded in Legendre polynomials
    Uniform,
    /// N(0, 1), expanded in probabilists' Hermite polynomials
    Normal,
}

impl Germ {
    /// Off-diagonal coefficient `b_n` (n >= 1) of the Jacobi matrix of the
    /// orthonormal family. Both germs are symmetric, so the diagonal is zero.
    fn recurrence(self, n: usize) -> f64 {
        let n = n as f64;
        match self {
            Germ::Uniform => n / (4.0 * n * n - 1.0).sqrt(),
            Germ::Normal => n.sqrt(),
        }
    }

    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            Germ::Uniform => rng.random_range(-1.0..1.0),
            Germ::Normal => StandardNormal.sample(rng),
        }
    }

    /// Values of the orthonormal polynomials `p_0 ..= p_degree` at `x`
    pub fn basis(self, x: f64, degree: usize) -> Vec<f64> {
        let mut values = Vec::with_capacity(degree + 1);
        values.push(1.0);
        if degree == 0 {
            return values;
        }
        values.push(x / self.recurrence(1));
        for n in 1..degree {
            let next = (x * values[n] - self.recurrence(n) * values[n - 1]) / self.recurrence(n + 1);
            values.push(next);
        }
        values
    }

    /// Gauss rule with `points` nodes (Golub-Welsch). Weights sum to one.
    pub fn quadrature(self, points: usize) -> (Vec<f64>, Vec<f64>) {
        if points == 0 {
            return (Vec::new(), Vec::new());
        }
        let jacobi = DMatrix::from_fn(points, points, |i, j| {
            if i + 1 == j {
                self.recurrence(j)
            } else if j + 1 == i {
                self.recurrence(i)
            } else {
                0.0
            }
        });
        let eig = jacobi.symmetric_eigen();

        let mut rule: Vec<(f64, f64)> = eig
            .eigenvalues
            .iter()
            .enumerate()
            .map(|(k, &node)| (node, eig.eigenvectors[(0, k)].powi(2)))
            .collect();
        rule.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total: f64 = rule.iter().map(|(_, w)| w).sum();
        rule.into_iter().map(|(node, w)| (node, w / total)).unzip()
    }
}

#[derive(Debug, Clone)]
enum GermMap {
    /// Each germ maps onto its own marginal
    Marginal(Vec<Distribution>),
    /// Standard normal germs pushed through the Rosenblatt transform
    Rosenblatt(Rosenblatt),
}

/// The independent space design nodes are generated in, and its map onto
/// the parameter space
#[derive(Debug, Clone)]
pub struct GermSpace {
    germs: Vec<Germ>,
    map: GermMap,
}

impl GermSpace {
    pub fn new(joint: &JointDistribution, rosenblatt: bool) -> Self {
        if rosenblatt || !joint.is_independent() {
            return Self {
                germs: vec![Germ::Normal; joint.dim()],
                map: GermMap::Rosenblatt(joint.rosenblatt()),
            };
        }
        Self {
            germs: joint.marginals().iter().map(Distribution::natural_germ).collect(),
            map: GermMap::Marginal(joint.marginals().to_vec()),
        }
    }

    pub fn germs(&self) -> &[Germ] {
        &self.germs
    }

    pub fn dim(&self) -> usize {
        self.germs.len()
    }

    pub fn uses_rosenblatt(&self) -> bool {
        matches!(self.map, GermMap::Rosenblatt(_))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.germs.iter().map(|g| g.sample(rng)).collect()
    }

    /// Map a germ point to the matching parameter values
    pub fn to_parameters(&self, xi: &[f64]) -> Vec<f64> {
        match &self.map {
            GermMap::Marginal(marginals) => marginals
                .iter()
                .zip(xi)
                .map(|(m, &x)| m.from_germ(x))
                .collect(),
            GermMap::Rosenblatt(rosenblatt) => rosenblatt.forward(xi),
        }
    }
}
