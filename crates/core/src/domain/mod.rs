pub mod prediction;
pub mod record;

pub use prediction::{BackoffLevel, Prediction, ScoringQuery, YearOverlap};
pub use record::{
    AggregateKey, HistoricalRecord, SkuYearRange, VehicleIdentity, VinPrefixFrequency,
};
