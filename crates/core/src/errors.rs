use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal problems with rule tables or application configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("could not read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("could not parse rule tables: {0}")]
    ParseRules(#[from] toml::de::Error),
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("rule table `{table}` row {row}: column `{column}` is missing or empty")]
    MissingColumn { table: &'static str, row: usize, column: &'static str },
    #[error("rule table `{table}` row {row}: unsupported value `{value}` for `{column}`")]
    InvalidValue { table: &'static str, row: usize, column: &'static str, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Recoverable data problems met while aggregating records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    YearOutOfRange { year: i32, min_year: i32, max_year: i32 },
    InvalidVehicleCode { code: String, reason: String },
    ConflictingPrefixMaker { prefix: String, makers: Vec<String> },
    MissingPartIdentifier { maker: String, description: String },
}

/// Rule table entries that could not be applied as written. The rule set keeps a
/// single deterministic resolution and reports the conflict for offline review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConflict {
    DuplicateMapping { table: &'static str, source: String, kept: String, dropped: String },
    AbbreviationCycle { members: Vec<String> },
    EquivalenceCycle { members: Vec<String>, canonical: String },
    NonConverging { input: String },
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("input failure: {0}")]
    Input(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The input could not be processed. Check it and try again.",
            Self::ServiceUnavailable { .. } => {
                "The index store is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "The rule tables or configuration are invalid.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "input",
            Self::ServiceUnavailable { .. } => "persistence",
            Self::Internal { .. } => "config_validation",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Input(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(error) => {
                Self::Internal { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
