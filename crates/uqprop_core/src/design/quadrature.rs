//! Tensor-product Gauss rules.

use super::germ::Germ;

/// Nodes and weights of a tensor-product rule
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRule {
    pub nodes: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
}

impl TensorRule {
    /// Tensor product of `points`-point Gauss rules, one per germ.
    ///
    /// Nodes are in row-major order (last dimension varies fastest).
    pub fn new(germs: &[Germ], points: usize) -> Self {
        let rules: Vec<(Vec<f64>, Vec<f64>)> = germs.iter().map(|g| g.quadrature(points)).collect();
        let shape = vec![points; germs.len()];

        let mut nodes = Vec::new();
        let mut weights = Vec::new();
        for indices in GridIndices::new(shape) {
            let mut node = Vec::with_capacity(indices.len());
            let mut weight = 1.0;
            for (dim, &k) in indices.iter().enumerate() {
                node.push(rules[dim].0[k]);
                weight *= rules[dim].1[k];
            }
            nodes.push(node);
            weights.push(weight);
        }
        Self { nodes, weights }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Iterator over all indices of a grid of the given shape
pub struct GridIndices {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl GridIndices {
    pub fn new(shape: Vec<usize>) -> Self {
        let done = shape.is_empty() || shape.contains(&0);
        Self {
            current: vec![0; shape.len()],
            shape,
            done,
        }
    }
}

impl Iterator for GridIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        // Row-major: last dimension varies fastest
        for i in (0..self.shape.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                break;
            }
            self.current[i] = 0;
            if i == 0 {
                self.done = true;
            }
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_indices_row_major() {
        let all: Vec<Vec<usize>> = GridIndices::new(vec![2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[3], vec![1, 0]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn test_empty_shape_yields_nothing() {
        assert_eq!(GridIndices::new(vec![]).count(), 0);
        assert_eq!(GridIndices::new(vec![3, 0]).count(), 0);
    }

    #[test]
    fn test_tensor_rule_integrates_product() {
        let rule = TensorRule::new(&[Germ::Uniform, Germ::Normal], 3);
        assert_eq!(rule.len(), 9);
        let total: f64 = rule.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);

        // E[x^2 y^2] = 1/3 * 1
        let integral: f64 = rule
            .nodes
            .iter()
            .zip(&rule.weights)
            .map(|(n, w)| w * n[0] * n[0] * n[1] * n[1])
            .sum();
        assert!((integral - 1.0 / 3.0).abs() < 1e-12);
    }
}
