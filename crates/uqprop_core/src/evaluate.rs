//! Parallel, failure-isolating model evaluation.
//!
//! Every design node is an independent unit of work. A node whose model (or
//! feature) call fails, panics or returns a malformed output yields an `Err`
//! in its slot; it never aborts the batch. Results come back in node order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ModelError, Result, UqError};
use crate::model::{Evaluation, FeatureSet, Model, ParameterValues};

/// Progress tracking for an evaluation batch
#[derive(Debug, Clone)]
pub struct EvaluationProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl EvaluationProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of nodes evaluated so far
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Request cancellation; nodes not yet started are skipped
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for EvaluationProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Outcome of evaluating one design node
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub index: usize,
    pub model: std::result::Result<Evaluation, ModelError>,
    /// One slot per feature of the [`FeatureSet`], in set order
    pub features: Vec<std::result::Result<Evaluation, ModelError>>,
}

pub struct Evaluator<'a> {
    model: &'a Model,
    features: &'a FeatureSet,
    cpus: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a Model, features: &'a FeatureSet, cpus: usize) -> Self {
        Self {
            model,
            features,
            cpus: cpus.max(1),
        }
    }

    /// Evaluate every node, preserving node order in the result
    pub fn evaluate(
        &self,
        nodes: &[ParameterValues],
        progress: Option<&EvaluationProgress>,
    ) -> Result<Vec<NodeResult>> {
        if let Some(p) = progress {
            p.reset(nodes.len());
        }

        let run = |(index, node): (usize, &ParameterValues)| -> Option<NodeResult> {
            if progress.is_some_and(EvaluationProgress::is_cancelled) {
                return None;
            }
            let result = self.evaluate_node(index, node);
            if let Some(p) = progress {
                p.increment();
            }
            Some(result)
        };

        #[cfg(feature = "parallel")]
        let results: Vec<Option<NodeResult>> = {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.cpus)
                .build()
                .map_err(|e| UqError::ThreadPool(e.to_string()))?;
            pool.install(|| nodes.par_iter().enumerate().map(run).collect())
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<Option<NodeResult>> = nodes.iter().enumerate().map(run).collect();

        if progress.is_some_and(EvaluationProgress::is_cancelled) {
            return Err(UqError::Cancelled);
        }
        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(UqError::Cancelled)
    }

    fn evaluate_node(&self, index: usize, node: &ParameterValues) -> NodeResult {
        let model = guarded(|| self.model.run(node)).and_then(|e| {
            e.validate()?;
            Ok(e)
        });

        let features = match &model {
            Ok(output) => self
                .features
                .iter()
                .map(|feature| {
                    guarded(|| {
                        feature.compute(output).ok_or_else(|| {
                            ModelError::failed(format!("feature {:?} has no result", feature.name))
                        })
                    })
                    .and_then(|e| {
                        e.validate()?;
                        Ok(e)
                    })
                })
                .collect(),
            Err(e) => vec![Err(e.clone()); self.features.len()],
        };

        if let Err(e) = &model {
            tracing::debug!(node = index, error = %e, "model evaluation failed");
        }
        for (feature, result) in self.features.iter().zip(&features) {
            if let (Ok(_), Err(e)) = (&model, result) {
                tracing::debug!(node = index, feature = %feature.name, error = %e, "feature evaluation failed");
            }
        }

        NodeResult {
            index,
            model,
            features,
        }
    }
}

/// Run a user callable, converting a panic into a [`ModelError`]
fn guarded<T>(f: impl FnOnce() -> std::result::Result<T, ModelError>) -> std::result::Result<T, ModelError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ModelError::Panicked(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Feature;

    fn nodes(n: usize) -> Vec<ParameterValues> {
        let names: Arc<[String]> = vec!["x".to_string()].into();
        (0..n)
            .map(|i| ParameterValues::new(names.clone(), vec![i as f64], 1))
            .collect()
    }

    fn flaky_model() -> Model {
        Model::new("flaky", |p: &ParameterValues| {
            let x = p.get("x").unwrap_or_default();
            match x as usize % 4 {
                1 => Err(ModelError::failed("odd node")),
                2 => panic!("boom"),
                3 => Ok(Evaluation::series(vec![0.0], vec![x, x])),
                _ => Ok(Evaluation::series(vec![0.0, 1.0], vec![x, 2.0 * x])),
            }
        })
    }

    #[test]
    fn test_failures_are_isolated_and_order_is_kept() {
        let model = flaky_model();
        let features = FeatureSet::new().with(Feature::new("first", |e: &Evaluation| {
            Some(Evaluation::scalar(e.values.data()[0]))
        }));
        let results = Evaluator::new(&model, &features, 3)
            .evaluate(&nodes(12), None)
            .unwrap();

        assert_eq!(results.len(), 12);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i);
            match i % 4 {
                0 => {
                    assert!(r.model.is_ok());
                    assert_eq!(r.features[0], Ok(Evaluation::scalar(i as f64)));
                }
                1 => assert!(matches!(r.model, Err(ModelError::Failed(_)))),
                2 => assert!(matches!(r.model, Err(ModelError::Panicked(_)))),
                _ => assert!(matches!(r.model, Err(ModelError::MalformedOutput(_)))),
            }
            if i % 4 != 0 {
                assert!(r.features[0].is_err());
            }
        }
    }

    #[test]
    fn test_feature_without_result_fails_only_that_feature() {
        let model = Model::new("id", |p: &ParameterValues| Ok(Evaluation::scalar(p.uncertain()[0])));
        let features = FeatureSet::new()
            .with(Feature::new("never", |_: &Evaluation| None))
            .with(Feature::new("same", |e: &Evaluation| Some(e.clone())));
        let results = Evaluator::new(&model, &features, 2)
            .evaluate(&nodes(3), None)
            .unwrap();
        for r in &results {
            assert!(r.model.is_ok());
            assert!(r.features[0].is_err());
            assert!(r.features[1].is_ok());
        }
    }

    #[test]
    fn test_progress_counts_and_cancellation() {
        let model = Model::new("id", |p: &ParameterValues| Ok(Evaluation::scalar(p.uncertain()[0])));
        let features = FeatureSet::new();
        let evaluator = Evaluator::new(&model, &features, 2);

        let progress = EvaluationProgress::default();
        evaluator.evaluate(&nodes(7), Some(&progress)).unwrap();
        assert_eq!(progress.completed(), 7);
        assert_eq!(progress.total(), 7);

        progress.cancel();
        assert!(matches!(
            evaluator.evaluate(&nodes(7), Some(&progress)),
            Err(UqError::Cancelled)
        ));
    }
}
