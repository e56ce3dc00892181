//! Repeated quantification under varying settings.
//!
//! [`Exploration`] reruns one configured [`UncertaintyQuantification`]
//! sequentially: once per distribution family and interval, or once per Monte
//! Carlo sample count against a polynomial chaos reference.

use std::time::{Duration, Instant};

use crate::data::{Array, Data};
use crate::error::Result;
use crate::parameters::DistributionFamily;
use crate::quantify::{Method, UncertaintyQuantification, quantify_into};

/// One configuration of [`Exploration::explore_parameters`]
#[derive(Debug, Clone)]
pub struct ExplorationRun {
    pub family: DistributionFamily,
    pub interval: f64,
    /// All parameters uncertain at once
    pub data: Data,
    /// One run per uncertain parameter, in parameter order
    pub single: Vec<(String, Data)>,
}

/// One Monte Carlo run of [`Exploration::compare_mc`]
#[derive(Debug, Clone)]
pub struct McRun {
    pub samples: usize,
    pub elapsed: Duration,
    pub data: Data,
    /// `variance_mc / variance_pc` per feature present in both runs
    pub variance_ratio: Vec<(String, Array)>,
}

#[derive(Debug, Clone)]
pub struct McComparison {
    pub pc_elapsed: Duration,
    pub pc: Data,
    pub runs: Vec<McRun>,
}

#[derive(Debug, Clone)]
pub struct Exploration {
    base: UncertaintyQuantification,
}

impl Exploration {
    pub fn new(base: UncertaintyQuantification) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &UncertaintyQuantification {
        &self.base
    }

    /// Quantify once per `(family, interval)`, replacing every parameter's
    /// distribution with `family` around its fixed value. Each configuration
    /// also runs every uncertain parameter on its own.
    ///
    /// Stores land in `<data_folder>/<family>_<interval>/`, the single-parameter
    /// runs in its `single/<parameter>/` subfolders.
    pub fn explore_parameters(
        &self,
        configurations: &[(DistributionFamily, Vec<f64>)],
    ) -> Result<Vec<ExplorationRun>> {
        let folder = &self.base.config().data_folder;
        let mut runs = Vec::new();

        for (family, intervals) in configurations {
            for &interval in intervals {
                tracing::info!(%family, interval, "exploring distribution");
                let mut uq = self.base.clone();
                uq.parameters_mut()
                    .replace_all_distributions(family.factory(interval))?;
                uq.config_mut().data_folder = folder.join(format!("{family}_{interval}"));

                let single = uq.quantify_single()?;
                let data = uq.quantify()?;
                runs.push(ExplorationRun {
                    family: *family,
                    interval,
                    data,
                    single,
                });
            }
        }
        Ok(runs)
    }

    /// Run polynomial chaos once as the reference, then Monte Carlo once per
    /// sample count, timing each run.
    ///
    /// The reference is stored in `<data_folder>/pc/`, the Monte Carlo runs in
    /// `<data_folder>/mc_<samples>/`.
    pub fn compare_mc(&self, sample_counts: &[usize]) -> Result<McComparison> {
        let folder = &self.base.config().data_folder;

        let mut pc_uq = self.base.clone();
        pc_uq.config_mut().method = Method::Pc;
        let start = Instant::now();
        let pc = quantify_into(&pc_uq, &folder.join("pc"))?;
        let pc_elapsed = start.elapsed();
        tracing::info!(elapsed = ?pc_elapsed, "polynomial chaos reference done");

        let mut runs = Vec::with_capacity(sample_counts.len());
        for &samples in sample_counts {
            let mut mc_uq = self.base.clone();
            mc_uq.config_mut().method = Method::Mc;
            mc_uq.config_mut().nr_mc_samples = samples;

            let start = Instant::now();
            let data = quantify_into(&mc_uq, &folder.join(format!("mc_{samples}")))?;
            let elapsed = start.elapsed();
            tracing::info!(samples, elapsed = ?elapsed, "monte carlo run done");

            runs.push(McRun {
                samples,
                elapsed,
                variance_ratio: variance_ratios(&data, &pc),
                data,
            });
        }

        Ok(McComparison {
            pc_elapsed,
            pc,
            runs,
        })
    }
}

/// Cell-wise `mc / pc` variance for features with matching variance shapes.
/// Cells where the reference variance is zero are NaN.
fn variance_ratios(mc: &Data, pc: &Data) -> Vec<(String, Array)> {
    mc.features()
        .filter_map(|feature| {
            let mc_var = feature.variance.as_ref()?;
            let pc_var = pc.get(&feature.name).ok()?.variance.as_ref()?;
            if mc_var.shape() != pc_var.shape() {
                tracing::warn!(
                    feature = %feature.name,
                    "variance shapes differ between methods, skipping ratio"
                );
                return None;
            }
            let ratio = mc_var
                .data()
                .iter()
                .zip(pc_var.data())
                .map(|(m, p)| if *p == 0.0 { f64::NAN } else { m / p })
                .collect();
            let ratio = Array::from_shape(mc_var.shape().to_vec(), ratio)?;
            Some((feature.name.clone(), ratio))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFeature;

    fn data_with_variance(name: &str, variance: Array) -> Data {
        let mut data = Data::new();
        let mut feature = DataFeature::new(name);
        feature.variance = Some(variance);
        data.insert(feature);
        data
    }

    #[test]
    fn test_variance_ratio_per_cell() {
        let mc = data_with_variance("f", Array::vector(vec![2.0, 3.0]));
        let pc = data_with_variance("f", Array::vector(vec![1.0, 0.0]));
        let ratios = variance_ratios(&mc, &pc);
        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios[0].0, "f");
        assert_eq!(ratios[0].1.data()[0], 2.0);
        assert!(ratios[0].1.data()[1].is_nan());
    }

    #[test]
    fn test_variance_ratio_skips_mismatched_and_missing() {
        let mut mc = data_with_variance("f", Array::vector(vec![2.0, 3.0]));
        mc.insert(DataFeature::new("g"));
        let pc = data_with_variance("f", Array::scalar(1.0));
        assert!(variance_ratios(&mc, &pc).is_empty());
    }
}
