//! Multivariate orthonormal polynomial basis over a germ space.

use super::germ::Germ;

/// Total-degree basis `{ Ψ_α : |α| <= order }`, with `Ψ_0 = 1` first
#[derive(Debug, Clone)]
pub struct OrthonormalBasis {
    germs: Vec<Germ>,
    order: usize,
    indices: Vec<Vec<usize>>,
}

impl OrthonormalBasis {
    pub fn new(germs: &[Germ], order: usize) -> Self {
        Self {
            germs: germs.to_vec(),
            order,
            indices: total_degree_indices(germs.len(), order),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn indices(&self) -> &[Vec<usize>] {
        &self.indices
    }

    /// `Ψ_α(ξ)` for every multi-index, in basis order
    pub fn evaluate(&self, xi: &[f64]) -> Vec<f64> {
        let univariate: Vec<Vec<f64>> = self
            .germs
            .iter()
            .zip(xi)
            .map(|(g, &x)| g.basis(x, self.order))
            .collect();
        self.indices
            .iter()
            .map(|alpha| {
                alpha
                    .iter()
                    .enumerate()
                    .map(|(dim, &degree)| univariate[dim][degree])
                    .product()
            })
            .collect()
    }
}

/// All multi-indices of `dim` entries with total degree at most `order`,
/// graded by total degree
pub fn total_degree_indices(dim: usize, order: usize) -> Vec<Vec<usize>> {
    let mut indices = Vec::new();
    for degree in 0..=order {
        let mut current = Vec::with_capacity(dim);
        compositions(dim, degree, &mut current, &mut indices);
    }
    indices
}

fn compositions(dim: usize, remaining: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if current.len() + 1 == dim {
        current.push(remaining);
        out.push(current.clone());
        current.pop();
        return;
    }
    if dim == 0 {
        if remaining == 0 {
            out.push(Vec::new());
        }
        return;
    }
    for first in (0..=remaining).rev() {
        current.push(first);
        compositions(dim, remaining - first, current, out);
        current.pop();
    }
}
