//! End-to-end quantification tests
//!
//! These tests verify:
//! - Exact polynomial chaos statistics on polynomial models
//! - Monte Carlo estimates and seed reproducibility
//! - Vector outputs, features and labels
//! - Failure isolation, incomplete bookkeeping and all-invalid removal
//! - Adaptive outputs, correlated parameters and configuration errors

use crate::data::{Array, Data};
use crate::error::{ConfigError, ModelError, UqError};
use crate::evaluate::EvaluationProgress;
use crate::model::{Evaluation, Feature, FeatureSet, Model};
use crate::parameters::{Distribution, Parameter, ParameterSet};
use crate::quantify::{Method, QuantifyConfig, UncertaintyQuantification};
use crate::statistics::PcMethod;

const TOL: f64 = 1e-9;

fn uniform_pair() -> ParameterSet {
    ParameterSet::new(vec![
        Parameter::uncertain("a", Distribution::uniform(-1.0, 1.0).unwrap()).unwrap(),
        Parameter::uncertain("b", Distribution::uniform(-1.0, 1.0).unwrap()).unwrap(),
        Parameter::fixed("offset", 10.0).unwrap(),
    ])
    .unwrap()
}

fn linear_model() -> Model {
    Model::new("linear", |p| {
        let a = p.get("a").ok_or_else(|| ModelError::failed("missing a"))?;
        let b = p.get("b").ok_or_else(|| ModelError::failed("missing b"))?;
        let offset = p.get("offset").ok_or_else(|| ModelError::failed("missing offset"))?;
        Ok(Evaluation::scalar(offset + a + 2.0 * b))
    })
}

fn config() -> QuantifyConfig {
    QuantifyConfig::default()
        .with_save_data(false)
        .with_seed(Some(42))
        .with_cpus(2)
        .with_polynomial_order(2)
        .with_pc_mc_samples(2_000)
}

fn scalar(data: &Data, feature: &str, metric: &str) -> f64 {
    let feature = data.get(feature).unwrap();
    feature
        .get(metric)
        .unwrap()
        .and_then(|v| v.as_array().and_then(Array::as_scalar))
        .unwrap()
}

#[test]
fn test_pc_quadrature_is_exact_for_linear_model() {
    let data = UncertaintyQuantification::new(linear_model(), uniform_pair())
        .with_config(config())
        .quantify()
        .unwrap();

    assert_eq!(data.model_name, "linear");
    assert_eq!(data.uncertain_parameters, vec!["a", "b"]);
    assert_eq!(data.method, "polynomial chaos");
    assert_eq!(data.seed(), Some(42));
    assert!(data.incomplete.is_empty());

    let model = data.get("linear").unwrap();
    // 5-point Gauss rule per dimension
    assert_eq!(model.evaluations.as_ref().unwrap().len(), 25);
    assert!((scalar(&data, "linear", "mean") - 10.0).abs() < TOL);
    assert!((scalar(&data, "linear", "variance") - 5.0 / 3.0).abs() < TOL);

    let first = model.sobol_first.as_ref().unwrap();
    assert_eq!(first.shape(), &[2]);
    assert!((first.data()[0] - 0.2).abs() < TOL);
    assert!((first.data()[1] - 0.8).abs() < TOL);
    let total_sum = model.sobol_total_sum.as_ref().unwrap();
    assert!((total_sum.data()[0] - 0.2).abs() < TOL);

    let p5 = scalar(&data, "linear", "percentile_5");
    let p95 = scalar(&data, "linear", "percentile_95");
    assert!(7.0 < p5 && p5 < 10.0 && 10.0 < p95 && p95 < 13.0);
}

#[test]
fn test_pc_collocation_matches_quadrature() {
    let data = UncertaintyQuantification::new(linear_model(), uniform_pair())
        .with_config(config().with_pc_method(PcMethod::Collocation))
        .quantify()
        .unwrap();

    // 6 terms at order 2 in two dimensions
    assert_eq!(
        data.get("linear").unwrap().evaluations.as_ref().unwrap().len(),
        12
    );
    assert!((scalar(&data, "linear", "mean") - 10.0).abs() < 1e-6);
    assert!((scalar(&data, "linear", "variance") - 5.0 / 3.0).abs() < 1e-6);
}

#[test]
fn test_mc_estimates_and_reproducibility() {
    let run = || {
        UncertaintyQuantification::new(linear_model(), uniform_pair())
            .with_config(config().with_method(Method::Mc).with_mc_samples(5_000))
            .quantify()
            .unwrap()
    };
    let data = run();

    assert_eq!(data.method, "monte carlo");
    let model = data.get("linear").unwrap();
    assert_eq!(model.evaluations.as_ref().unwrap().len(), 5_000 * 4);
    assert!((scalar(&data, "linear", "mean") - 10.0).abs() < 0.1);
    assert!((scalar(&data, "linear", "variance") - 5.0 / 3.0).abs() < 0.15);
    let first = model.sobol_first.as_ref().unwrap().data();
    assert!((first[0] - 0.2).abs() < 0.1, "{first:?}");
    assert!((first[1] - 0.8).abs() < 0.1, "{first:?}");

    assert_eq!(run(), data);
}

#[test]
fn test_series_output_with_features_and_labels() {
    let grid: Vec<f64> = (0..5).map(|i| i as f64).collect();
    let model = Model::new("decay", move |p| {
        let a = p.get("a").unwrap_or_default();
        let values = grid.iter().map(|t| (1.0 + a) * t).collect();
        Ok(Evaluation::series(grid.clone(), values))
    })
    .with_labels(["time (s)", "amount"]);

    let features = FeatureSet::new()
        .with(Feature::new("final", |e: &Evaluation| {
            e.values.data().last().copied().map(Evaluation::scalar)
        }))
        .with(
            Feature::new("doubled", |e: &Evaluation| {
                Some(Evaluation::new(e.grid.clone(), e.values.map(|v| 2.0 * v)))
            })
            .with_labels(["time (s)", "twice the amount"]),
        );

    let data = UncertaintyQuantification::new(model, uniform_pair())
        .with_features(features)
        .with_config(config())
        .quantify()
        .unwrap();

    assert_eq!(
        data.feature_names().collect::<Vec<_>>(),
        vec!["decay", "final", "doubled"]
    );
    let decay = data.get("decay").unwrap();
    assert_eq!(decay.time, Some(Array::vector(vec![0.0, 1.0, 2.0, 3.0, 4.0])));
    assert_eq!(decay.mean.as_ref().unwrap().shape(), &[5]);
    assert_eq!(decay.sobol_first.as_ref().unwrap().shape(), &[2, 5]);
    assert_eq!(decay.ndim(), 1);

    // Only `a` matters, and t = 0 does not vary at all
    let first = decay.sobol_first.as_ref().unwrap().data();
    assert_eq!(first[0], 0.0);
    assert!((first[1] - 1.0).abs() < TOL);
    assert!(first[5..].iter().all(|s| s.abs() < TOL));
    assert!((scalar(&data, "final", "mean") - 4.0).abs() < TOL);

    assert_eq!(data.get_labels("final").unwrap(), vec![""]);
    assert_eq!(data.get_labels("decay").unwrap(), vec!["time (s)", "amount"]);
    assert_eq!(
        data.get_labels("doubled").unwrap(),
        vec!["time (s)", "twice the amount"]
    );
}

#[test]
fn test_failures_mark_features_incomplete() {
    let model = Model::new("fragile", |p| {
        let a = p.get("a").unwrap_or_default();
        if a > 0.9 {
            return Err(ModelError::failed("a out of range"));
        }
        if a < -0.9 {
            panic!("a far out of range");
        }
        Ok(Evaluation::scalar(a + p.get("b").unwrap_or_default()))
    });
    let features = FeatureSet::new().with(Feature::new("never", |_: &Evaluation| None));

    let data = UncertaintyQuantification::new(model, uniform_pair())
        .with_features(features)
        .with_config(config())
        .quantify()
        .unwrap();

    // The outermost Gauss nodes in `a` fail: 10 of 25 evaluations
    let fragile = data.get("fragile").unwrap();
    let evaluations = fragile.evaluations.as_ref().unwrap();
    assert_eq!(evaluations.len(), 25);
    assert_eq!(evaluations.iter().filter(|e| e.is_all_nan()).count(), 10);
    assert!(fragile.mean.is_some());
    assert!(data.incomplete.contains(&"fragile".to_string()));

    // A feature without a single result disappears
    assert!(!data.contains("never"));
    assert!(data.incomplete.contains(&"never".to_string()));
}

#[test]
fn test_incomplete_features_skip_statistics_when_disallowed() {
    let model = Model::new("fragile", |p| {
        let a = p.get("a").unwrap_or_default();
        if a > 0.9 {
            return Err(ModelError::failed("a out of range"));
        }
        Ok(Evaluation::scalar(a))
    });
    let data = UncertaintyQuantification::new(model, uniform_pair())
        .with_config(config().with_allow_incomplete(false))
        .quantify()
        .unwrap();

    let fragile = data.get("fragile").unwrap();
    assert!(fragile.evaluations.is_some());
    assert!(fragile.mean.is_none());
    assert!(fragile.sobol_first.is_none());
    assert_eq!(data.incomplete, vec!["fragile"]);
}

#[test]
fn test_partially_nan_evaluations_are_invalid() {
    let model = || {
        Model::new("partial", |p| {
            let a = p.get("a").unwrap_or_default();
            let second = if a > 0.5 { f64::NAN } else { a };
            Ok(Evaluation::new(None, vec![a, second]))
        })
    };

    let data = UncertaintyQuantification::new(model(), uniform_pair())
        .with_config(config())
        .quantify()
        .unwrap();

    // Gauss nodes 0.54 and 0.91 in `a` leave a NaN cell: 10 of 25 evaluations
    let partial = data.get("partial").unwrap();
    let evaluations = partial.evaluations.as_ref().unwrap();
    assert_eq!(evaluations.len(), 25);
    assert_eq!(evaluations.iter().filter(|e| e.is_all_nan()).count(), 10);
    assert!(evaluations.iter().all(|e| e.is_all_nan() || e.is_finite()));
    assert_eq!(data.incomplete, vec!["partial"]);

    let mean = partial.mean.as_ref().unwrap();
    assert_eq!(mean.shape(), &[2]);
    assert!(mean.is_finite());

    let data = UncertaintyQuantification::new(model(), uniform_pair())
        .with_config(config().with_allow_incomplete(false))
        .quantify()
        .unwrap();
    assert!(data.get("partial").unwrap().mean.is_none());
    assert_eq!(data.incomplete, vec!["partial"]);
}

#[test]
fn test_adaptive_output_is_interpolated() {
    let parameters = ParameterSet::new(vec![
        Parameter::uncertain("a", Distribution::uniform(1.0, 3.0).unwrap()).unwrap(),
        Parameter::uncertain("n", Distribution::uniform(0.0, 4.0).unwrap()).unwrap(),
    ])
    .unwrap();
    let model = Model::new("adaptive", |p| {
        let a = p.get("a").unwrap_or_default();
        let points = 5 + p.get("n").unwrap_or_default().round() as usize;
        let grid: Vec<f64> = (0..points).map(|i| i as f64 / (points - 1) as f64).collect();
        let values = grid.iter().map(|t| a * t).collect();
        Ok(Evaluation::series(grid, values))
    });

    let data = UncertaintyQuantification::new(model, parameters)
        .with_config(config())
        .quantify()
        .unwrap();

    let adaptive = data.get("adaptive").unwrap();
    let time = adaptive.time.as_ref().unwrap().data();
    assert_eq!(time.first(), Some(&0.0));
    assert_eq!(time.last(), Some(&1.0));
    let evaluations = adaptive.evaluations.as_ref().unwrap();
    assert!(evaluations.iter().all(|e| e.len() == time.len()));

    // E[a] = 2, so the mean follows 2t on the union grid
    let mean = adaptive.mean.as_ref().unwrap().data();
    for (t, m) in time.iter().zip(mean) {
        assert!((m - 2.0 * t).abs() < 1e-9, "t = {t}, mean = {m}");
    }
    assert!(data.incomplete.is_empty());
}

#[test]
fn test_correlated_parameters_use_rosenblatt() {
    let mut parameters = ParameterSet::new(vec![
        Parameter::uncertain("a", Distribution::normal(1.0, 1.0).unwrap()).unwrap(),
        Parameter::uncertain("b", Distribution::normal(2.0, 1.0).unwrap()).unwrap(),
    ])
    .unwrap();
    parameters
        .set_correlation(vec![vec![1.0, 0.8], vec![0.8, 1.0]])
        .unwrap();
    let model = Model::new("sum", |p| Ok(Evaluation::scalar(p.uncertain().iter().sum())));

    // The flag is off; the declared correlation switches the transform on
    let data = UncertaintyQuantification::new(model, parameters)
        .with_config(config().with_rosenblatt(false))
        .quantify()
        .unwrap();

    // Var(a + b) = 1 + 1 + 2 * 0.8
    assert!((scalar(&data, "sum", "mean") - 3.0).abs() < 1e-9);
    assert!((scalar(&data, "sum", "variance") - 3.6).abs() < 1e-9);
    // Indices are attributed to the independent germs: a = z1, b = 0.8 z1 + 0.6 z2
    let first = data.get("sum").unwrap().sobol_first.as_ref().unwrap().data();
    assert!((first[0] - 0.9).abs() < 1e-9);
    assert!((first[1] - 0.1).abs() < 1e-9);
}

#[test]
fn test_store_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let data = UncertaintyQuantification::new(linear_model(), uniform_pair())
        .with_config(
            config()
                .with_save_data(true)
                .with_data_folder(dir.path())
                .with_filename("run"),
        )
        .quantify()
        .unwrap();

    let loaded = Data::load(&dir.path().join("run.json")).unwrap();
    assert_eq!(loaded, data);
}

#[test]
fn test_configuration_errors() {
    let quantify = |parameters: ParameterSet, features: FeatureSet, config: QuantifyConfig| {
        UncertaintyQuantification::new(linear_model(), parameters)
            .with_features(features)
            .with_config(config)
            .quantify()
    };

    let fixed_only = ParameterSet::from_list([("a", Some(1.0), None)]).unwrap();
    assert!(matches!(
        quantify(fixed_only, FeatureSet::new(), config()),
        Err(UqError::Config(ConfigError::NoUncertainParameters))
    ));

    assert!(matches!(
        quantify(uniform_pair(), FeatureSet::new(), config().with_cpus(0)),
        Err(UqError::Config(ConfigError::InvalidSetting(_)))
    ));

    let clash = FeatureSet::new().with(Feature::new("linear", |e: &Evaluation| Some(e.clone())));
    assert!(matches!(
        quantify(uniform_pair(), clash, config()),
        Err(UqError::Config(ConfigError::InvalidSetting(_)))
    ));
}

#[test]
fn test_cancelled_run_returns_error() {
    let progress = EvaluationProgress::default();
    progress.cancel();
    let result = UncertaintyQuantification::new(linear_model(), uniform_pair())
        .with_config(config())
        .with_progress(progress)
        .quantify();
    assert!(matches!(result, Err(UqError::Cancelled)));
}

#[test]
fn test_config_defaults_from_yaml_like_json() {
    let config: QuantifyConfig =
        serde_json::from_str(r#"{ "method": "mc", "CPUs": 3, "seed": 7 }"#).unwrap();
    assert_eq!(config.method, Method::Mc);
    assert_eq!(config.cpus, 3);
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.polynomial_order, 4);
    assert_eq!(config.nr_mc_samples, 1_000);
    assert!(config.allow_incomplete);
    assert_eq!(
        config.store_path("model"),
        std::path::PathBuf::from("data").join("model.json")
    );
}

#[test]
fn test_method_from_str() {
    assert_eq!("pc".parse::<Method>().unwrap(), Method::Pc);
    assert_eq!("MC".parse::<Method>().unwrap(), Method::Mc);
    assert!(matches!(
        "sobol".parse::<Method>(),
        Err(ConfigError::InvalidSetting(_))
    ));
}

#[test]
fn test_quantify_single_holds_other_parameters() {
    let runs = UncertaintyQuantification::new(linear_model(), uniform_pair())
        .with_config(config())
        .quantify_single()
        .unwrap();

    assert_eq!(runs.len(), 2);
    let (name, a_only) = &runs[0];
    assert_eq!(name, "a");
    assert_eq!(a_only.uncertain_parameters, vec!["a"]);
    // `b` has no nominal value and is held at its mean, 0
    assert!((scalar(a_only, "linear", "mean") - 10.0).abs() < TOL);
    assert!((scalar(a_only, "linear", "variance") - 1.0 / 3.0).abs() < TOL);
    assert_eq!(a_only.get("linear").unwrap().evaluations.as_ref().unwrap().len(), 5);

    let (name, b_only) = &runs[1];
    assert_eq!(name, "b");
    assert!((scalar(b_only, "linear", "variance") - 4.0 / 3.0).abs() < TOL);
}
