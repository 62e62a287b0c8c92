use std::collections::BTreeMap;

use crate::domain::{AggregateKey, HistoricalRecord, SkuYearRange, VinPrefixFrequency};
use crate::errors::DataQualityWarning;
use crate::normalize::{normalize, normalize_maker, normalize_series};
use crate::rules::NormalizationRuleSet;
use crate::vin::{self, CodeValidation};

/// Warnings kept verbatim per build; the rest are only counted.
pub const MAX_WARNING_SAMPLES: usize = 100;

const MISSING_PART_MARKERS: [&str; 3] = ["", "none", "unknown"];

/// Inclusive model-year interval accepted into year-bounded aggregates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YearWindow {
    pub min_year: i32,
    pub max_year: i32,
}

impl YearWindow {
    pub fn contains(&self, year: i32) -> bool {
        (self.min_year..=self.max_year).contains(&year)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub total_records: usize,
    pub excluded_by_year: usize,
    pub invalid_vehicle_codes: usize,
    pub check_digit_mismatches: usize,
    pub missing_part_identifier: usize,
}

impl Tally {
    fn add(&mut self, other: &Tally) {
        self.total_records += other.total_records;
        self.excluded_by_year += other.excluded_by_year;
        self.invalid_vehicle_codes += other.invalid_vehicle_codes;
        self.check_digit_mismatches += other.check_digit_mismatches;
        self.missing_part_identifier += other.missing_part_identifier;
    }
}

/// Partial index over one shard of records. Cells, prefixes and tallies merge by
/// summing counts and widening year envelopes, so any grouping of fragments
/// reduces to the same index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexFragment {
    pub(crate) cells: BTreeMap<AggregateKey, SkuYearRange>,
    pub(crate) prefixes: BTreeMap<String, VinPrefixFrequency>,
    pub(crate) tally: Tally,
    pub(crate) warnings: Vec<DataQualityWarning>,
}

impl IndexFragment {
    pub fn absorb(
        &mut self,
        record: &HistoricalRecord,
        rules: &NormalizationRuleSet,
        window: YearWindow,
    ) {
        self.tally.total_records += 1;
        let maker = normalize_maker(&record.maker);
        let series = normalize_series(&record.series, rules);

        if let Some(raw) = record.vehicle_code.as_deref().filter(|code| !code.trim().is_empty()) {
            match vin::validate(raw) {
                CodeValidation::Valid(code) => {
                    if !vin::check_digit_ok(&code) {
                        self.tally.check_digit_mismatches += 1;
                    }
                    let prefix = code[..vin::PREFIX_LENGTH].to_owned();
                    self.prefixes
                        .entry(prefix.clone())
                        .or_insert_with(|| VinPrefixFrequency::new(prefix))
                        .observe(&maker, &series);
                }
                CodeValidation::Invalid(reason) => {
                    self.tally.invalid_vehicle_codes += 1;
                    self.warn(DataQualityWarning::InvalidVehicleCode {
                        code: raw.trim().to_owned(),
                        reason: reason.as_str().to_owned(),
                    });
                }
            }
        }

        if !window.contains(record.model_year) {
            self.tally.excluded_by_year += 1;
            self.warn(DataQualityWarning::YearOutOfRange {
                year: record.model_year,
                min_year: window.min_year,
                max_year: window.max_year,
            });
            return;
        }

        let part_identifier = record.part_identifier.trim();
        if MISSING_PART_MARKERS.contains(&part_identifier.to_lowercase().as_str()) {
            self.tally.missing_part_identifier += 1;
            self.warn(DataQualityWarning::MissingPartIdentifier {
                maker,
                description: record.description.clone(),
            });
            return;
        }

        let key = AggregateKey::new(
            maker,
            series,
            normalize(&record.description, rules),
            part_identifier,
        );
        match self.cells.get_mut(&key) {
            Some(range) => range.observe(record.model_year),
            None => {
                self.cells.insert(key, SkuYearRange::single(record.model_year));
            }
        }
    }

    pub fn merge(mut self, other: IndexFragment) -> IndexFragment {
        for (key, range) in other.cells {
            match self.cells.get_mut(&key) {
                Some(existing) => existing.merge(&range),
                None => {
                    self.cells.insert(key, range);
                }
            }
        }
        for (prefix, frequency) in other.prefixes {
            match self.prefixes.get_mut(&prefix) {
                Some(existing) => existing.merge(&frequency),
                None => {
                    self.prefixes.insert(prefix, frequency);
                }
            }
        }
        self.tally.add(&other.tally);
        let room = MAX_WARNING_SAMPLES.saturating_sub(self.warnings.len());
        self.warnings.extend(other.warnings.into_iter().take(room));
        self
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    fn warn(&mut self, warning: DataQualityWarning) {
        tracing::debug!(event_name = "index.build.data_quality", warning = ?warning);
        if self.warnings.len() < MAX_WARNING_SAMPLES {
            self.warnings.push(warning);
        }
    }
}
