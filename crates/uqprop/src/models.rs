//! Built-in demonstration models.

use serde::{Deserialize, Serialize};
use uqprop_core::{
    ConfigError, Distribution, DistributionFamily, Evaluation, Feature, FeatureSet, Model, ModelError,
    ParameterSet, ParameterValues,
};

/// Initial temperature of the coffee (°C)
const COFFEE_START: f64 = 95.0;
/// Coffee is done cooling once this close to the environment (°C)
const COFFEE_DONE: f64 = 1.0;
/// Spike detection threshold on the membrane potential (mV)
const SPIKE_THRESHOLD: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinModel {
    /// Newton cooling with independent rate and environment temperature
    CoffeeCup,
    /// Newton cooling with a rate that is the product of two correlated
    /// parameters
    CoffeeCupDependent,
    /// Newton cooling simulated until the coffee is done, so the time grid
    /// changes with the parameters
    CoffeeCupAdaptive,
    /// Izhikevich spiking neuron under a step current
    Izhikevich,
}

impl BuiltinModel {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinModel::CoffeeCup => "coffee_cup",
            BuiltinModel::CoffeeCupDependent => "coffee_cup_dependent",
            BuiltinModel::CoffeeCupAdaptive => "coffee_cup_adaptive",
            BuiltinModel::Izhikevich => "izhikevich",
        }
    }

    pub fn model(self) -> Model {
        let cooling_labels = ["Time (s)", "Temperature (C)"];
        match self {
            BuiltinModel::CoffeeCup => Model::new(self.name(), coffee_cup).with_labels(cooling_labels),
            BuiltinModel::CoffeeCupDependent => {
                Model::new(self.name(), coffee_cup_dependent).with_labels(cooling_labels)
            }
            BuiltinModel::CoffeeCupAdaptive => {
                Model::new(self.name(), coffee_cup_adaptive).with_labels(cooling_labels)
            }
            BuiltinModel::Izhikevich => Model::new(self.name(), izhikevich)
                .with_labels(["Time (ms)", "Membrane potential (mV)"]),
        }
    }

    pub fn features(self) -> FeatureSet {
        match self {
            BuiltinModel::Izhikevich => FeatureSet::new()
                .with(
                    Feature::new("spike_count", spike_count).with_labels(["Number of spikes"]),
                )
                .with(
                    Feature::new("first_spike_time", first_spike_time)
                        .with_labels(["Time (ms)"]),
                ),
            _ => FeatureSet::new(),
        }
    }

    /// Parameters used when a run file lists none
    pub fn default_parameters(self) -> Result<ParameterSet, ConfigError> {
        match self {
            BuiltinModel::CoffeeCup | BuiltinModel::CoffeeCupAdaptive => ParameterSet::from_list([
                ("kappa", None, Some(Distribution::uniform(0.025, 0.075)?)),
                ("T_env", None, Some(Distribution::uniform(15.0, 25.0)?)),
            ]),
            BuiltinModel::CoffeeCupDependent => ParameterSet::from_list([
                ("kappa_hat", Some(-0.22), None),
                ("T_env", Some(20.0), None),
                ("alpha", Some(0.22), None),
            ])?
            .with_multivariate_normal(
                &["kappa_hat", "T_env", "alpha"],
                &[-0.22, 20.0, 0.22],
                &[
                    vec![0.001, 0.0, 0.0005],
                    vec![0.0, 1.0, 0.0],
                    vec![0.0005, 0.0, 0.001],
                ],
            ),
            BuiltinModel::Izhikevich => {
                let mut parameters = ParameterSet::from_list([
                    ("a", Some(0.02), None),
                    ("b", Some(0.2), None),
                    ("c", Some(-65.0), None),
                    ("d", Some(8.0), None),
                ])?;
                parameters.set_all_distributions(DistributionFamily::Uniform.factory(0.5))?;
                Ok(parameters)
            }
        }
    }
}

fn parameter(p: &ParameterValues, name: &str) -> Result<f64, ModelError> {
    p.get(name)
        .ok_or_else(|| ModelError::failed(format!("missing parameter {name:?}")))
}

fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    let step = (end - start) / (points - 1) as f64;
    (0..points).map(|i| start + step * i as f64).collect()
}

fn cooling(time: &[f64], rate: f64, t_env: f64) -> Vec<f64> {
    time.iter()
        .map(|t| t_env + (COFFEE_START - t_env) * (-rate * t).exp())
        .collect()
}

fn coffee_cup(p: &ParameterValues) -> Result<Evaluation, ModelError> {
    let kappa = parameter(p, "kappa")?;
    let t_env = parameter(p, "T_env")?;
    let time = linspace(0.0, 200.0, 150);
    let temperature = cooling(&time, kappa, t_env);
    Ok(Evaluation::series(time, temperature))
}

fn coffee_cup_dependent(p: &ParameterValues) -> Result<Evaluation, ModelError> {
    let kappa_hat = parameter(p, "kappa_hat")?;
    let t_env = parameter(p, "T_env")?;
    let alpha = parameter(p, "alpha")?;
    let time = linspace(0.0, 200.0, 150);
    let temperature = cooling(&time, -alpha * kappa_hat, t_env);
    Ok(Evaluation::series(time, temperature))
}

fn coffee_cup_adaptive(p: &ParameterValues) -> Result<Evaluation, ModelError> {
    let kappa = parameter(p, "kappa")?;
    let t_env = parameter(p, "T_env")?;
    if kappa <= 0.0 || t_env + COFFEE_DONE >= COFFEE_START {
        return Err(ModelError::failed("the coffee never cools down"));
    }
    let end = ((COFFEE_START - t_env) / COFFEE_DONE).ln() / kappa;
    let time: Vec<f64> = (0..=end.floor() as usize).map(|t| t as f64).collect();
    if time.len() < 2 {
        return Err(ModelError::failed("the coffee is already cold"));
    }
    let temperature = cooling(&time, kappa, t_env);
    Ok(Evaluation::series(time, temperature))
}

/// Forward Euler integration of the Izhikevich neuron over 100 ms with a
/// 10 µA step current switched on at 10 ms.
fn izhikevich(p: &ParameterValues) -> Result<Evaluation, ModelError> {
    let a = parameter(p, "a")?;
    let b = parameter(p, "b")?;
    let c = parameter(p, "c")?;
    let d = parameter(p, "d")?;

    const DT: f64 = 0.25;
    const STEPS: usize = 400;
    let time: Vec<f64> = (0..=STEPS).map(|i| i as f64 * DT).collect();

    let mut v = -70.0;
    let mut u = b * v;
    let mut voltage = Vec::with_capacity(time.len());
    for &t in &time {
        let current = if t >= 10.0 { 10.0 } else { 0.0 };
        if v >= 30.0 {
            voltage.push(30.0);
            v = c;
            u += d;
        } else {
            voltage.push(v);
        }
        let dv = 0.04 * v * v + 5.0 * v + 140.0 - u + current;
        let du = a * (b * v - u);
        v += DT * dv;
        u += DT * du;
        if !v.is_finite() {
            return Err(ModelError::failed("membrane potential diverged"));
        }
    }
    Ok(Evaluation::series(time, voltage))
}

/// Grid indices where the potential crosses the threshold upward
fn spike_onsets(output: &Evaluation) -> Vec<usize> {
    output
        .values
        .data()
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] < SPIKE_THRESHOLD && w[1] >= SPIKE_THRESHOLD)
        .map(|(i, _)| i + 1)
        .collect()
}

fn spike_count(output: &Evaluation) -> Option<Evaluation> {
    Some(Evaluation::scalar(spike_onsets(output).len() as f64))
}

/// `None` when the neuron never fires
fn first_spike_time(output: &Evaluation) -> Option<Evaluation> {
    let first = *spike_onsets(output).first()?;
    let time = output.grid.as_ref()?.get(first)?;
    Some(Evaluation::scalar(*time))
}
