pub mod aggregate;
pub mod config;
pub mod domain;
pub mod errors;
pub mod index;
pub mod normalize;
pub mod rules;
pub mod scoring;
pub mod vin;

pub use aggregate::{build, BuildParams, BuildStats, IndexFragment, RecordAggregator};
pub use config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::{
    AggregateKey, BackoffLevel, HistoricalRecord, Prediction, ScoringQuery, SkuYearRange,
    VehicleIdentity, VinPrefixFrequency, YearOverlap,
};
pub use errors::{
    ApplicationError, ConfigurationError, DataQualityWarning, InterfaceError, RuleConflict,
};
pub use index::{FrequencyIndex, SkuEntry};
pub use normalize::{normalize, normalize_maker, normalize_series};
pub use rules::{NormalizationRuleSet, RuleSetDiagnostics, RuleTables};
pub use scoring::{ScoringEngine, ScoringParams};
