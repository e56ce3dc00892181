//! Univariate parameter distributions and the interval-based factories used
//! to attach them to nominal values.

use std::f64::consts::SQRT_2;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};

use crate::design::Germ;
use crate::error::ConfigError;

/// Standard normal CDF
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Standard normal quantile
pub fn normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Uniform { lower: f64, upper: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// `exp(N(mu, sigma))`
    LogNormal { mu: f64, sigma: f64 },
}

impl Distribution {
    pub fn uniform(lower: f64, upper: f64) -> Result<Self, ConfigError> {
        let d = Distribution::Uniform { lower, upper };
        d.validate()?;
        Ok(d)
    }

    pub fn normal(mean: f64, std_dev: f64) -> Result<Self, ConfigError> {
        let d = Distribution::Normal { mean, std_dev };
        d.validate()?;
        Ok(d)
    }

    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self, ConfigError> {
        let d = Distribution::LogNormal { mu, sigma };
        d.validate()?;
        Ok(d)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Distribution::Uniform { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                    return Err(ConfigError::InvalidDistribution {
                        family: "uniform",
                        first: lower,
                        second: upper,
                        reason: "bounds must be finite with lower < upper",
                    });
                }
            }
            Distribution::Normal { mean, std_dev } => {
                if !(mean.is_finite() && std_dev.is_finite() && std_dev > 0.0) {
                    return Err(ConfigError::InvalidDistribution {
                        family: "normal",
                        first: mean,
                        second: std_dev,
                        reason: "std_dev must be positive and finite",
                    });
                }
            }
            Distribution::LogNormal { mu, sigma } => {
                if !(mu.is_finite() && sigma.is_finite() && sigma > 0.0) {
                    return Err(ConfigError::InvalidDistribution {
                        family: "log-normal",
                        first: mu,
                        second: sigma,
                        reason: "sigma must be positive and finite",
                    });
                }
            }
        }
        Ok(())
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Uniform { lower, upper } => 0.5 * (lower + upper),
            Distribution::Normal { mean, .. } => mean,
            Distribution::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        match *self {
            Distribution::Uniform { lower, upper } => ((x - lower) / (upper - lower)).clamp(0.0, 1.0),
            Distribution::Normal { mean, std_dev } => normal_cdf((x - mean) / std_dev),
            Distribution::LogNormal { mu, sigma } => {
                if x <= 0.0 {
                    0.0
                } else {
                    normal_cdf((x.ln() - mu) / sigma)
                }
            }
        }
    }

    pub fn inverse_cdf(&self, p: f64) -> f64 {
        match *self {
            Distribution::Uniform { lower, upper } => lower + p.clamp(0.0, 1.0) * (upper - lower),
            Distribution::Normal { mean, std_dev } => mean + std_dev * normal_quantile(p),
            Distribution::LogNormal { mu, sigma } => (mu + sigma * normal_quantile(p)).exp(),
        }
    }

    /// The independent germ this marginal is expanded in when no
    /// Rosenblatt transform is used
    pub fn natural_germ(&self) -> Germ {
        match self {
            Distribution::Uniform { .. } => Germ::Uniform,
            Distribution::Normal { .. } | Distribution::LogNormal { .. } => Germ::Normal,
        }
    }

    /// Map a point of the natural germ onto this distribution
    pub fn from_germ(&self, xi: f64) -> f64 {
        match *self {
            Distribution::Uniform { lower, upper } => 0.5 * (lower + upper) + 0.5 * (upper - lower) * xi,
            Distribution::Normal { mean, std_dev } => mean + std_dev * xi,
            Distribution::LogNormal { mu, sigma } => (mu + sigma * xi).exp(),
        }
    }

    /// Inverse of [`Distribution::from_germ`]
    pub fn to_germ(&self, x: f64) -> f64 {
        match *self {
            Distribution::Uniform { lower, upper } => (2.0 * x - lower - upper) / (upper - lower),
            Distribution::Normal { mean, std_dev } => (x - mean) / std_dev,
            Distribution::LogNormal { mu, sigma } => (x.ln() - mu) / sigma,
        }
    }
}

/// Distribution family used to derive a distribution from a nominal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFamily {
    /// `U(v - |i·v|/2, v + |i·v|/2)`
    Uniform,
    /// `N(v, |i·v|)`
    Normal,
}

impl DistributionFamily {
    pub fn name(self) -> &'static str {
        match self {
            DistributionFamily::Uniform => "uniform",
            DistributionFamily::Normal => "normal",
        }
    }

    /// Build the distribution of width `interval` (relative) around `nominal`
    pub fn around(self, interval: f64, nominal: f64) -> Result<Distribution, ConfigError> {
        match self {
            DistributionFamily::Uniform => {
                let half = (interval / 2.0 * nominal).abs();
                Distribution::uniform(nominal - half, nominal + half)
            }
            DistributionFamily::Normal => Distribution::normal(nominal, (interval * nominal).abs()),
        }
    }

    /// A reusable factory closure for [`crate::parameters::ParameterSet::set_all_distributions`]
    pub fn factory(self, interval: f64) -> impl Fn(f64) -> Result<Distribution, ConfigError> {
        move |nominal| self.around(interval, nominal)
    }
}

impl fmt::Display for DistributionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistributionFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(DistributionFamily::Uniform),
            "normal" => Ok(DistributionFamily::Normal),
            _ => Err(ConfigError::UnknownDistributionFamily(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_interval_around_nominal() {
        let d = DistributionFamily::Uniform.around(0.5, -0.05).unwrap();
        match d {
            Distribution::Uniform { lower, upper } => {
                assert!((lower + 0.0625).abs() < 1e-12);
                assert!((upper + 0.0375).abs() < 1e-12);
            }
            _ => panic!("expected uniform"),
        }
    }

    #[test]
    fn test_normal_interval_around_nominal() {
        let d = DistributionFamily::Normal.around(0.1, 20.0).unwrap();
        assert_eq!(
            d,
            Distribution::Normal {
                mean: 20.0,
                std_dev: 2.0
            }
        );
    }

    #[test]
    fn test_zero_nominal_is_rejected() {
        assert!(DistributionFamily::Uniform.around(0.5, 0.0).is_err());
    }

    #[test]
    fn test_cdf_and_inverse_agree() {
        let dists = [
            Distribution::uniform(1.0, 3.0).unwrap(),
            Distribution::normal(2.0, 0.5).unwrap(),
            Distribution::log_normal(0.1, 0.3).unwrap(),
        ];
        for d in dists {
            for p in [0.05, 0.25, 0.5, 0.75, 0.95] {
                let x = d.inverse_cdf(p);
                assert!((d.cdf(x) - p).abs() < 1e-9, "{d:?} at {p}");
            }
        }
    }

    #[test]
    fn test_germ_map_round_trip() {
        let d = Distribution::uniform(10.0, 30.0).unwrap();
        assert_eq!(d.from_germ(-1.0), 10.0);
        assert_eq!(d.from_germ(1.0), 30.0);
        assert!((d.to_germ(d.from_germ(0.3)) - 0.3).abs() < 1e-12);

        let d = Distribution::log_normal(0.0, 0.5).unwrap();
        assert!((d.to_germ(d.from_germ(-1.2)) + 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!(
            "Uniform".parse::<DistributionFamily>().unwrap(),
            DistributionFamily::Uniform
        );
        assert!("beta".parse::<DistributionFamily>().is_err());
    }
}
