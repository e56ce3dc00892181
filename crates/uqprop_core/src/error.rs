use std::fmt;

/// Errors raised while setting up a quantification run.
///
/// These are fatal: they surface immediately and are never recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    DuplicateParameter(String),
    MalformedParameter {
        name: String,
        reason: &'static str,
    },
    InvalidDistribution {
        family: &'static str,
        first: f64,
        second: f64,
        reason: &'static str,
    },
    InvalidCorrelation(String),
    UnknownParameter(String),
    UnknownDistributionFamily(String),
    NoUncertainParameters,
    InvalidSetting(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DuplicateParameter(name) => {
                write!(f, "parameter {name:?} is defined more than once")
            }
            ConfigError::MalformedParameter { name, reason } => {
                write!(f, "malformed parameter {name:?}: {reason}")
            }
            ConfigError::InvalidDistribution {
                family,
                first,
                second,
                reason,
            } => write!(f, "invalid {family} distribution ({first}, {second}): {reason}"),
            ConfigError::InvalidCorrelation(msg) => write!(f, "invalid correlation: {msg}"),
            ConfigError::UnknownParameter(name) => write!(f, "unknown parameter {name:?}"),
            ConfigError::UnknownDistributionFamily(name) => {
                write!(f, "unknown distribution family {name:?}")
            }
            ConfigError::NoUncertainParameters => {
                write!(f, "no parameter has a distribution")
            }
            ConfigError::InvalidSetting(msg) => write!(f, "invalid setting: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors related to the result container and its persisted store
#[derive(Debug)]
pub enum DataError {
    FeatureNotFound(String),
    /// Lookup of a key that is neither a known metric nor an attached attribute
    UnknownAttribute(String),
    KindMismatch {
        key: String,
        expected: &'static str,
    },
    Io(std::io::Error),
    Corrupt(String),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::FeatureNotFound(name) => write!(f, "feature {name:?} not found"),
            DataError::UnknownAttribute(key) => write!(f, "no attribute {key:?}"),
            DataError::KindMismatch { key, expected } => {
                write!(f, "{key:?} expects {expected}")
            }
            DataError::Io(e) => write!(f, "store I/O error: {e}"),
            DataError::Corrupt(msg) => write!(f, "corrupt store: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DataError {
    fn from(e: std::io::Error) -> Self {
        DataError::Io(e)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        DataError::Corrupt(e.to_string())
    }
}

/// Failure reported by a model or feature callable
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    Failed(String),
    MalformedOutput(String),
    Panicked(String),
}

impl ModelError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ModelError::Failed(msg.into())
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Failed(msg) => write!(f, "evaluation failed: {msg}"),
            ModelError::MalformedOutput(msg) => write!(f, "malformed output: {msg}"),
            ModelError::Panicked(msg) => write!(f, "evaluation panicked: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

#[derive(Debug)]
pub enum UqError {
    Config(ConfigError),
    Data(DataError),
    /// The worker pool could not be built
    ThreadPool(String),
    /// The run was cancelled through its progress handle
    Cancelled,
}

impl fmt::Display for UqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UqError::Config(e) => write!(f, "configuration error: {e}"),
            UqError::Data(e) => write!(f, "{e}"),
            UqError::ThreadPool(msg) => write!(f, "worker pool error: {msg}"),
            UqError::Cancelled => write!(f, "quantification cancelled"),
        }
    }
}

impl std::error::Error for UqError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UqError::Config(e) => Some(e),
            UqError::Data(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for UqError {
    fn from(e: ConfigError) -> Self {
        UqError::Config(e)
    }
}

impl From<DataError> for UqError {
    fn from(e: DataError) -> Self {
        UqError::Data(e)
    }
}

pub type Result<T> = std::result::Result<T, UqError>;
