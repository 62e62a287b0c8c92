use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One historical part transaction as produced by upstream data collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub maker: String,
    pub series: String,
    pub description: String,
    /// Recomputed by the aggregator from `description`; upstream values are ignored.
    #[serde(default)]
    pub normalized_description: Option<String>,
    pub part_identifier: String,
    pub model_year: i32,
    #[serde(default)]
    pub vehicle_code: Option<String>,
}

impl HistoricalRecord {
    pub fn new(
        maker: impl Into<String>,
        series: impl Into<String>,
        description: impl Into<String>,
        part_identifier: impl Into<String>,
        model_year: i32,
    ) -> Self {
        Self {
            maker: maker.into(),
            series: series.into(),
            description: description.into(),
            normalized_description: None,
            part_identifier: part_identifier.into(),
            model_year,
            vehicle_code: None,
        }
    }

    pub fn with_vehicle_code(mut self, code: impl Into<String>) -> Self {
        self.vehicle_code = Some(code.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub maker: String,
    pub series: String,
    pub normalized_description: String,
    pub part_identifier: String,
}

impl AggregateKey {
    pub fn new(
        maker: impl Into<String>,
        series: impl Into<String>,
        normalized_description: impl Into<String>,
        part_identifier: impl Into<String>,
    ) -> Self {
        Self {
            maker: maker.into(),
            series: series.into(),
            normalized_description: normalized_description.into(),
            part_identifier: part_identifier.into(),
        }
    }
}

/// Observation count and model-year envelope of one aggregate cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuYearRange {
    pub count: u32,
    pub start_year: i32,
    pub end_year: i32,
}

impl SkuYearRange {
    pub fn single(year: i32) -> Self {
        Self { count: 1, start_year: year, end_year: year }
    }

    pub fn observe(&mut self, year: i32) {
        self.count += 1;
        self.start_year = self.start_year.min(year);
        self.end_year = self.end_year.max(year);
    }

    pub fn merge(&mut self, other: &SkuYearRange) {
        self.count += other.count;
        self.start_year = self.start_year.min(other.start_year);
        self.end_year = self.end_year.max(other.end_year);
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start_year..=self.end_year).contains(&year)
    }
}

/// Frequency of one 11-character vehicle-code prefix with its maker association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VinPrefixFrequency {
    pub prefix: String,
    pub count: u32,
    /// Majority maker; ties resolve to the lexicographically smallest name.
    pub maker: String,
    pub maker_counts: BTreeMap<String, u32>,
    pub series_counts: BTreeMap<String, u32>,
}

impl VinPrefixFrequency {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            count: 0,
            maker: String::new(),
            maker_counts: BTreeMap::new(),
            series_counts: BTreeMap::new(),
        }
    }

    pub fn observe(&mut self, maker: &str, series: &str) {
        self.count += 1;
        *self.maker_counts.entry(maker.to_owned()).or_insert(0) += 1;
        if !series.is_empty() {
            *self.series_counts.entry(series.to_owned()).or_insert(0) += 1;
        }
        self.maker = majority(&self.maker_counts).unwrap_or_default();
    }

    pub fn merge(&mut self, other: &VinPrefixFrequency) {
        self.count += other.count;
        for (maker, count) in &other.maker_counts {
            *self.maker_counts.entry(maker.clone()).or_insert(0) += count;
        }
        for (series, count) in &other.series_counts {
            *self.series_counts.entry(series.clone()).or_insert(0) += count;
        }
        self.maker = majority(&self.maker_counts).unwrap_or_default();
    }

    /// A prefix observed with more than one maker.
    pub fn is_conflicted(&self) -> bool {
        self.maker_counts.len() > 1
    }

    pub fn majority_series(&self) -> Option<String> {
        majority(&self.series_counts)
    }
}

/// Vehicle attributes implied by a vehicle code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleIdentity {
    pub prefix: String,
    /// Majority maker of the prefix, absent when the prefix was never observed.
    pub maker: Option<String>,
    pub series: Option<String>,
    /// Decoded from position 10 of the code.
    pub model_year: Option<i32>,
    pub prefix_count: u32,
    pub conflicted: bool,
}

impl VehicleIdentity {
    /// Maker and series may stand in for missing query fields only when the
    /// prefix was observed with a single maker.
    pub fn is_reliable(&self) -> bool {
        self.maker.is_some() && !self.conflicted
    }
}

fn majority(counts: &BTreeMap<String, u32>) -> Option<String> {
    // BTreeMap iterates in key order, so the first maximum is the smallest name.
    let mut best: Option<(&String, u32)> = None;
    for (name, count) in counts {
        if best.map_or(true, |(_, best_count)| *count > best_count) {
            best = Some((name, *count));
        }
    }
    best.map(|(name, _)| name.clone())
}
