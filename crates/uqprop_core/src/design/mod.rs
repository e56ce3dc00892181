//! Experimental designs: the ordered nodes a model is evaluated at.
//!
//! Every design is built in an independent germ space ([`GermSpace`]) and
//! mapped onto the parameter space before evaluation. The node order is part
//! of the design: results are matched back to nodes by index.

mod germ;
mod polynomial;
mod quadrature;

use rand::Rng;

pub use germ::{Germ, GermSpace};
pub use polynomial::{OrthonormalBasis, total_degree_indices};
pub use quadrature::{GridIndices, TensorRule};

/// How the nodes of a [`Design`] relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignLayout {
    /// Tensor Gauss rule; `Design::weights` is set
    Quadrature,
    /// Random germ samples for a least-squares fit
    Collocation,
    /// Saltelli blocks A, B, A_B^(0), ..., A_B^(d-1), each `base` rows
    Saltelli { base: usize },
}

#[derive(Debug, Clone)]
pub struct Design {
    /// Nodes in germ space
    pub germ_nodes: Vec<Vec<f64>>,
    /// The same nodes in parameter space, ordered like `uncertain_parameters`
    pub nodes: Vec<Vec<f64>>,
    pub weights: Option<Vec<f64>>,
    pub layout: DesignLayout,
}

impl Design {
    /// Tensor Gauss design with `order + 1` points per dimension
    pub fn quadrature(space: &GermSpace, order: usize) -> Self {
        let rule = TensorRule::new(space.germs(), order + 1);
        let nodes = map_nodes(space, &rule.nodes);
        Self {
            germ_nodes: rule.nodes,
            nodes,
            weights: Some(rule.weights),
            layout: DesignLayout::Quadrature,
        }
    }

    pub fn collocation<R: Rng + ?Sized>(space: &GermSpace, samples: usize, rng: &mut R) -> Self {
        let germ_nodes: Vec<Vec<f64>> = (0..samples).map(|_| space.sample(rng)).collect();
        let nodes = map_nodes(space, &germ_nodes);
        Self {
            germ_nodes,
            nodes,
            weights: None,
            layout: DesignLayout::Collocation,
        }
    }

    /// Saltelli design for `base` samples: `base * (d + 2)` nodes
    pub fn saltelli<R: Rng + ?Sized>(space: &GermSpace, base: usize, rng: &mut R) -> Self {
        let a: Vec<Vec<f64>> = (0..base).map(|_| space.sample(rng)).collect();
        let b: Vec<Vec<f64>> = (0..base).map(|_| space.sample(rng)).collect();

        let mut germ_nodes = Vec::with_capacity(base * (space.dim() + 2));
        germ_nodes.extend(a.iter().cloned());
        germ_nodes.extend(b.iter().cloned());
        for i in 0..space.dim() {
            germ_nodes.extend(a.iter().zip(&b).map(|(a_row, b_row)| {
                let mut row = a_row.clone();
                row[i] = b_row[i];
                row
            }));
        }

        let nodes = map_nodes(space, &germ_nodes);
        Self {
            germ_nodes,
            nodes,
            weights: None,
            layout: DesignLayout::Saltelli { base },
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn map_nodes(space: &GermSpace, germ_nodes: &[Vec<f64>]) -> Vec<Vec<f64>> {
    germ_nodes.iter().map(|xi| space.to_parameters(xi)).collect()
}
