//! Grid unification for adaptive outputs.
//!
//! When the valid evaluations of a feature disagree on their grid, 1-D series
//! on increasing grids are resampled onto a union grid that spans every
//! observed range at the finest spacing present. Anything else keeps the most
//! common shape and invalidates the rest.

use rustc_hash::FxHashMap;

use crate::data::Array;
use crate::model::Evaluation;

/// Evaluations of one feature sharing a single grid
#[derive(Debug, Clone, PartialEq)]
pub struct Unified {
    pub grid: Option<Vec<f64>>,
    /// `None` marks an invalid evaluation: failed, or non-finite in any cell
    pub evaluations: Vec<Option<Array>>,
    pub adaptive: bool,
}

impl Unified {
    pub fn valid_count(&self) -> usize {
        self.evaluations.iter().filter(|e| e.is_some()).count()
    }
}

pub fn unify(feature: &str, evaluations: Vec<Option<Evaluation>>) -> Unified {
    let evaluations: Vec<Option<Evaluation>> = evaluations
        .into_iter()
        .map(|e| e.filter(|e| e.values.is_finite()))
        .collect();

    let Some(first) = evaluations.iter().flatten().next() else {
        return Unified {
            grid: None,
            evaluations: vec![None; evaluations.len()],
            adaptive: false,
        };
    };

    let adaptive = evaluations
        .iter()
        .flatten()
        .any(|e| e.values.shape() != first.values.shape() || e.grid != first.grid);

    if !adaptive {
        let grid = first.grid.clone();
        return Unified {
            grid,
            evaluations: evaluations.into_iter().map(|e| e.map(|e| e.values)).collect(),
            adaptive,
        };
    }

    if evaluations.iter().flatten().all(is_interpolable) {
        resample(feature, evaluations)
    } else {
        keep_majority_shape(feature, evaluations)
    }
}

fn is_interpolable(e: &Evaluation) -> bool {
    let Some(grid) = &e.grid else {
        return false;
    };
    e.values.ndim() == 1
        && grid.len() >= 2
        && grid.iter().all(|t| t.is_finite())
        && grid.windows(2).all(|w| w[0] < w[1])
}

fn resample(feature: &str, evaluations: Vec<Option<Evaluation>>) -> Unified {
    let grids = evaluations.iter().flatten().filter_map(|e| e.grid.as_deref());
    let mut start = f64::INFINITY;
    let mut end = f64::NEG_INFINITY;
    let mut step = f64::INFINITY;
    for grid in grids {
        let (first, last) = (grid[0], grid[grid.len() - 1]);
        start = start.min(first);
        end = end.max(last);
        step = step.min((last - first) / (grid.len() - 1) as f64);
    }
    let points = ((end - start) / step).round() as usize + 1;
    let union = linspace(start, end, points);

    tracing::debug!(feature, points, start, end, "interpolating adaptive feature");

    let evaluations = evaluations
        .into_iter()
        .map(|e| {
            e.and_then(|e| {
                let grid = e.grid?;
                let values = interpolate(&grid, e.values.data(), &union);
                Some(Array::vector(values))
            })
        })
        .collect();

    Unified {
        grid: Some(union),
        evaluations,
        adaptive: true,
    }
}

fn keep_majority_shape(feature: &str, evaluations: Vec<Option<Evaluation>>) -> Unified {
    let mut counts: FxHashMap<&[usize], (usize, usize)> = FxHashMap::default();
    for (order, e) in evaluations.iter().flatten().enumerate() {
        counts.entry(e.values.shape()).or_insert((0, order)).0 += 1;
    }
    // Most common shape; ties go to the shape seen first
    let majority: Vec<usize> = counts
        .iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        .map(|(shape, _)| shape.to_vec())
        .unwrap_or_default();

    let mut dropped = 0;
    let mut grid = None;
    let evaluations = evaluations
        .into_iter()
        .map(|e| {
            let e = e?;
            if e.values.shape() != majority.as_slice() {
                dropped += 1;
                return None;
            }
            if grid.is_none() {
                grid = e.grid.clone();
            }
            Some(e.values)
        })
        .collect();

    tracing::warn!(
        feature,
        dropped,
        shape = ?majority,
        "adaptive feature cannot be interpolated, keeping the most common shape"
    );

    Unified {
        grid,
        evaluations,
        adaptive: true,
    }
}

fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    if points <= 1 {
        return vec![start];
    }
    let step = (end - start) / (points - 1) as f64;
    (0..points)
        .map(|i| {
            if i == points - 1 {
                end
            } else {
                start + step * i as f64
            }
        })
        .collect()
}

/// Piecewise-linear interpolation of `(xs, ys)` at `at`, extrapolating
/// linearly past either end. `xs` must be strictly increasing with >= 2 points.
pub fn interpolate(xs: &[f64], ys: &[f64], at: &[f64]) -> Vec<f64> {
    let last = xs.len() - 1;
    at.iter()
        .map(|&t| {
            let upper = xs.partition_point(|&x| x < t).clamp(1, last);
            let (x0, x1) = (xs[upper - 1], xs[upper]);
            let (y0, y1) = (ys[upper - 1], ys[upper]);
            y0 + (y1 - y0) * (t - x0) / (x1 - x0)
        })
        .collect()
}
