//! Model parameters and their probability laws.
//!
//! A [`ParameterSet`] holds every named input of a model. Parameters with a
//! [`Distribution`] are *uncertain*; their order in the set is the order of
//! every design node coordinate and of every sensitivity index. The rest are
//! held at their fixed value.

mod distribution;
mod joint;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use distribution::{Distribution, DistributionFamily, normal_cdf, normal_quantile};
pub use joint::{JointDistribution, Rosenblatt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Nominal value; used as-is when the parameter has no distribution
    #[serde(default)]
    pub fixed_value: Option<f64>,
    #[serde(default)]
    pub distribution: Option<Distribution>,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        fixed_value: Option<f64>,
        distribution: Option<Distribution>,
    ) -> Result<Self, ConfigError> {
        let parameter = Self {
            name: name.into(),
            fixed_value,
            distribution,
        };
        parameter.validate()?;
        Ok(parameter)
    }

    pub fn fixed(name: impl Into<String>, value: f64) -> Result<Self, ConfigError> {
        Self::new(name, Some(value), None)
    }

    pub fn uncertain(name: impl Into<String>, distribution: Distribution) -> Result<Self, ConfigError> {
        Self::new(name, None, Some(distribution))
    }

    pub fn is_uncertain(&self) -> bool {
        self.distribution.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |reason| ConfigError::MalformedParameter {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(malformed("name is empty"));
        }
        if let Some(value) = self.fixed_value
            && !value.is_finite()
        {
            return Err(malformed("fixed value is not finite"));
        }
        match &self.distribution {
            Some(distribution) => distribution.validate(),
            None if self.fixed_value.is_none() => {
                Err(malformed("needs a fixed value or a distribution"))
            }
            None => Ok(()),
        }
    }
}

/// Gaussian-copula correlation between a named subset of uncertain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub names: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
    #[serde(default)]
    correlation: Option<Correlation>,
}

impl ParameterSet {
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, ConfigError> {
        let mut set = Self::default();
        for parameter in parameters {
            set.push(parameter)?;
        }
        Ok(set)
    }

    /// Build from `(name, fixed_value, distribution)` triples
    pub fn from_list<I, S>(list: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, Option<f64>, Option<Distribution>)>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for (name, fixed_value, distribution) in list {
            set.push(Parameter::new(name, fixed_value, distribution)?)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, parameter: Parameter) -> Result<(), ConfigError> {
        parameter.validate()?;
        if self.contains(&parameter.name) {
            return Err(ConfigError::DuplicateParameter(parameter.name));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Parameter, ConfigError> {
        self.parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownParameter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Give every parameter without a distribution the one `factory` derives
    /// from its fixed value
    pub fn set_all_distributions<F>(&mut self, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(f64) -> Result<Distribution, ConfigError>,
    {
        for parameter in &mut self.parameters {
            if parameter.distribution.is_some() {
                continue;
            }
            if let Some(value) = parameter.fixed_value {
                parameter.distribution = Some(factory(value)?);
            }
        }
        Ok(())
    }

    /// Like [`ParameterSet::set_all_distributions`], but also replaces the
    /// distributions of parameters that already have one
    pub fn replace_all_distributions<F>(&mut self, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(f64) -> Result<Distribution, ConfigError>,
    {
        for parameter in &mut self.parameters {
            if let Some(value) = parameter.fixed_value {
                parameter.distribution = Some(factory(value)?);
            }
        }
        Ok(())
    }

    pub fn set_distribution(
        &mut self,
        name: &str,
        distribution: Distribution,
    ) -> Result<(), ConfigError> {
        distribution.validate()?;
        self.get_mut(name)?.distribution = Some(distribution);
        Ok(())
    }

    /// Drop the distribution of `name`, fixing it at its nominal value, or at
    /// the distribution's mean when it has none
    pub fn clear_distribution(&mut self, name: &str) -> Result<(), ConfigError> {
        let parameter = self.get_mut(name)?;
        if let Some(distribution) = parameter.distribution.take() {
            parameter.fixed_value.get_or_insert(distribution.mean());
        }
        Ok(())
    }

    /// Correlate all current uncertain parameters, in order
    pub fn set_correlation(&mut self, matrix: Vec<Vec<f64>>) -> Result<(), ConfigError> {
        let names = self
            .uncertain_parameters()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.set_correlation_between(names, matrix)
    }

    /// Correlate the named uncertain parameters; the others stay independent
    pub fn set_correlation_between(
        &mut self,
        names: Vec<String>,
        matrix: Vec<Vec<f64>>,
    ) -> Result<(), ConfigError> {
        for name in &names {
            if !self.contains(name) {
                return Err(ConfigError::UnknownParameter(name.clone()));
            }
        }
        let correlation = Correlation { names, matrix };
        // Reject malformed matrices now rather than at design time
        let marginals = vec![Distribution::Normal { mean: 0.0, std_dev: 1.0 }; correlation.names.len()];
        JointDistribution::correlated(marginals, &correlation.matrix)?;
        self.correlation = Some(correlation);
        Ok(())
    }

    pub fn clear_correlation(&mut self) {
        self.correlation = None;
    }

    pub fn correlation(&self) -> Option<&Correlation> {
        self.correlation.as_ref()
    }

    /// Give the named parameters a joint normal law with the given mean vector
    /// and covariance matrix
    pub fn with_multivariate_normal(
        mut self,
        names: &[&str],
        mean: &[f64],
        covariance: &[Vec<f64>],
    ) -> Result<Self, ConfigError> {
        let n = names.len();
        if mean.len() != n || covariance.len() != n || covariance.iter().any(|r| r.len() != n) {
            return Err(ConfigError::InvalidCorrelation(format!(
                "mean and covariance must match {n} parameters"
            )));
        }
        let std_devs: Vec<f64> = (0..n).map(|i| covariance[i][i].sqrt()).collect();
        for (i, name) in names.iter().enumerate() {
            self.set_distribution(name, Distribution::normal(mean[i], std_devs[i])?)?;
        }
        let matrix = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| covariance[i][j] / (std_devs[i] * std_devs[j]))
                    .collect()
            })
            .collect();
        self.set_correlation_between(names.iter().map(|s| s.to_string()).collect(), matrix)?;
        Ok(self)
    }

    /// Names of the parameters with a distribution, in set order
    pub fn uncertain_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.is_uncertain())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// `(name, value)` of every parameter held constant
    pub fn fixed_values(&self) -> Vec<(&str, f64)> {
        self.parameters
            .iter()
            .filter(|p| !p.is_uncertain())
            .filter_map(|p| p.fixed_value.map(|v| (p.name.as_str(), v)))
            .collect()
    }

    pub fn is_correlated(&self) -> bool {
        self.correlation.is_some()
    }

    /// Joint law of the uncertain parameters.
    ///
    /// Parameters outside a declared correlation are independent of everything
    /// else, so their rows of the copula matrix are identity rows.
    pub fn joint_distribution(&self) -> Result<JointDistribution, ConfigError> {
        let uncertain: Vec<&Parameter> = self.parameters.iter().filter(|p| p.is_uncertain()).collect();
        if uncertain.is_empty() {
            return Err(ConfigError::NoUncertainParameters);
        }
        let marginals: Vec<Distribution> = uncertain.iter().filter_map(|p| p.distribution).collect();

        let Some(correlation) = &self.correlation else {
            return Ok(JointDistribution::independent(marginals));
        };

        let position = |name: &str| {
            uncertain
                .iter()
                .position(|p| p.name == name)
                .ok_or_else(|| {
                    ConfigError::InvalidCorrelation(format!(
                        "correlated parameter {name:?} has no distribution"
                    ))
                })
        };
        let slots = correlation
            .names
            .iter()
            .map(|name| position(name))
            .collect::<Result<Vec<_>, _>>()?;

        let n = marginals.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        for (a, &i) in slots.iter().enumerate() {
            for (b, &j) in slots.iter().enumerate() {
                matrix[i][j] = correlation.matrix[a][b];
            }
        }
        JointDistribution::correlated(marginals, &matrix)
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coffee() -> ParameterSet {
        ParameterSet::from_list([
            ("kappa", Some(-0.05), None),
            ("u_env", Some(20.0), None),
            ("t_0", Some(95.0), None),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_name_fails() {
        let err = ParameterSet::from_list([("a", Some(1.0), None), ("a", Some(2.0), None)]);
        assert_eq!(err, Err(ConfigError::DuplicateParameter("a".to_string())));
    }

    #[test]
    fn test_parameter_without_value_or_distribution_is_malformed() {
        let err = ParameterSet::from_list([("a", None, None)]).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedParameter { .. }));
    }

    #[test]
    fn test_set_all_distributions_only_fills_missing() {
        let mut set = coffee();
        set.set_distribution("t_0", Distribution::normal(95.0, 1.0).unwrap())
            .unwrap();
        set.set_all_distributions(DistributionFamily::Uniform.factory(0.1))
            .unwrap();

        assert_eq!(set.uncertain_parameters(), vec!["kappa", "u_env", "t_0"]);
        assert_eq!(
            set.get("t_0").unwrap().distribution,
            Some(Distribution::Normal {
                mean: 95.0,
                std_dev: 1.0
            })
        );
        assert_eq!(
            set.get("u_env").unwrap().distribution,
            Some(Distribution::Uniform {
                lower: 19.0,
                upper: 21.0
            })
        );
    }

    #[test]
    fn test_clear_distribution_fixes_parameter() {
        let mut set = ParameterSet::from_list([
            ("kappa", Some(-0.05), Some(Distribution::uniform(-0.06, -0.02).unwrap())),
            ("u_env", None, Some(Distribution::uniform(18.0, 22.0).unwrap())),
        ])
        .unwrap();
        set.clear_distribution("kappa").unwrap();
        set.clear_distribution("u_env").unwrap();
        assert_eq!(set.fixed_values(), vec![("kappa", -0.05), ("u_env", 20.0)]);
        assert!(set.uncertain_parameters().is_empty());
        assert!(set.clear_distribution("missing").is_err());
    }

    #[test]
    fn test_fixed_values_exclude_uncertain() {
        let mut set = coffee();
        set.set_distribution("kappa", Distribution::uniform(-0.06, -0.04).unwrap())
            .unwrap();
        assert_eq!(set.fixed_values(), vec![("u_env", 20.0), ("t_0", 95.0)]);
    }

    #[test]
    fn test_no_uncertain_parameters() {
        assert_eq!(
            coffee().joint_distribution().unwrap_err(),
            ConfigError::NoUncertainParameters
        );
    }

    #[test]
    fn test_multivariate_normal_embeds_block() {
        let set = coffee()
            .with_multivariate_normal(
                &["kappa", "t_0"],
                &[-0.22, 0.22],
                &[vec![0.001, 0.0005], vec![0.0005, 0.001]],
            )
            .unwrap();
        let mut set = set;
        set.set_distribution("u_env", Distribution::uniform(18.0, 22.0).unwrap())
            .unwrap();

        let joint = set.joint_distribution().unwrap();
        assert_eq!(joint.dim(), 3);
        assert!(!joint.is_independent());
        let Distribution::Normal { std_dev, .. } = joint.marginals()[0] else {
            panic!("expected normal marginal");
        };
        assert!((std_dev - 0.001f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_with_unknown_name_fails() {
        let mut set = coffee();
        let err = set.set_correlation_between(vec!["nope".into()], vec![vec![1.0]]);
        assert_eq!(err, Err(ConfigError::UnknownParameter("nope".into())));
    }
}
