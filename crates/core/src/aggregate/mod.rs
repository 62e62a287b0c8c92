//! Offline build of a [`FrequencyIndex`] from historical records.
//!
//! Records are partitioned by a hash of the normalized maker, each shard folds
//! into an [`IndexFragment`] on the rayon pool, and fragments reduce into one
//! index. Every build starts from nothing; there is no incremental merge with a
//! previous index.

mod fragment;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::HistoricalRecord;
use crate::errors::DataQualityWarning;
use crate::index::FrequencyIndex;
use crate::normalize::normalize_maker;
use crate::rules::NormalizationRuleSet;

pub use fragment::{IndexFragment, Tally, YearWindow, MAX_WARNING_SAMPLES};

pub const DEFAULT_MIN_YEAR: i32 = 1990;
pub const DEFAULT_FUTURE_YEAR_HORIZON: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildParams {
    pub min_year: i32,
    pub future_year_horizon: i32,
    pub shards: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            future_year_horizon: DEFAULT_FUTURE_YEAR_HORIZON,
            shards: 8,
        }
    }
}

impl BuildParams {
    pub fn window(&self, as_of_year: i32) -> YearWindow {
        YearWindow {
            min_year: self.min_year,
            max_year: as_of_year.saturating_add(self.future_year_horizon),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub total_records: usize,
    pub excluded_by_year: usize,
    pub invalid_vehicle_codes: usize,
    pub distinct_keys: usize,
    pub distinct_prefixes: usize,
    pub check_digit_mismatches: usize,
    pub missing_part_identifier: usize,
    pub conflicting_prefixes: Vec<String>,
    pub rule_conflicts: usize,
    pub ruleset_fingerprint: String,
    pub as_of_year: i32,
    pub min_year: i32,
    pub max_year: i32,
    /// First warnings met, capped at [`MAX_WARNING_SAMPLES`].
    pub warnings: Vec<DataQualityWarning>,
}

pub struct RecordAggregator<'a> {
    rules: &'a NormalizationRuleSet,
    params: BuildParams,
}

impl<'a> RecordAggregator<'a> {
    pub fn new(rules: &'a NormalizationRuleSet, params: BuildParams) -> Self {
        Self { rules, params }
    }

    pub fn build(
        &self,
        records: &[HistoricalRecord],
        as_of_year: i32,
    ) -> (FrequencyIndex, BuildStats) {
        let window = self.params.window(as_of_year);
        let shard_count = self.params.shards.max(1);

        let mut shards: Vec<Vec<&HistoricalRecord>> = vec![Vec::new(); shard_count];
        for record in records {
            shards[shard_of(&record.maker, shard_count)].push(record);
        }

        let fragment = shards
            .par_iter()
            .map(|shard| {
                let mut fragment = IndexFragment::default();
                for record in shard {
                    fragment.absorb(record, self.rules, window);
                }
                fragment
            })
            .reduce(IndexFragment::default, IndexFragment::merge);

        self.finish(fragment, window, as_of_year)
    }

    fn finish(
        &self,
        fragment: IndexFragment,
        window: YearWindow,
        as_of_year: i32,
    ) -> (FrequencyIndex, BuildStats) {
        let IndexFragment { cells, prefixes, tally, mut warnings } = fragment;

        let conflicting_prefixes: Vec<String> = prefixes
            .values()
            .filter(|frequency| frequency.is_conflicted())
            .map(|frequency| frequency.prefix.clone())
            .collect();
        for prefix in &conflicting_prefixes {
            let makers = prefixes
                .get(prefix)
                .map(|frequency| frequency.maker_counts.keys().cloned().collect())
                .unwrap_or_default();
            let warning = DataQualityWarning::ConflictingPrefixMaker { prefix: prefix.clone(), makers };
            tracing::debug!(event_name = "index.build.data_quality", warning = ?warning);
            if warnings.len() < MAX_WARNING_SAMPLES {
                warnings.push(warning);
            }
        }

        let index = FrequencyIndex::from_parts(cells, prefixes);
        let stats = BuildStats {
            total_records: tally.total_records,
            excluded_by_year: tally.excluded_by_year,
            invalid_vehicle_codes: tally.invalid_vehicle_codes,
            distinct_keys: index.distinct_keys(),
            distinct_prefixes: index.distinct_prefixes(),
            check_digit_mismatches: tally.check_digit_mismatches,
            missing_part_identifier: tally.missing_part_identifier,
            conflicting_prefixes,
            rule_conflicts: self.rules.diagnostics().conflicts.len(),
            ruleset_fingerprint: self.rules.fingerprint().to_owned(),
            as_of_year,
            min_year: window.min_year,
            max_year: window.max_year,
            warnings,
        };

        tracing::info!(
            event_name = "index.build.completed",
            total_records = stats.total_records,
            excluded_by_year = stats.excluded_by_year,
            invalid_vehicle_codes = stats.invalid_vehicle_codes,
            missing_part_identifier = stats.missing_part_identifier,
            distinct_keys = stats.distinct_keys,
            distinct_prefixes = stats.distinct_prefixes,
            conflicting_prefixes = stats.conflicting_prefixes.len(),
            check_digit_mismatches = stats.check_digit_mismatches,
            as_of_year,
            "frequency index built"
        );
        (index, stats)
    }
}

/// Builds with default parameters.
pub fn build(
    records: &[HistoricalRecord],
    rules: &NormalizationRuleSet,
    as_of_year: i32,
) -> (FrequencyIndex, BuildStats) {
    RecordAggregator::new(rules, BuildParams::default()).build(records, as_of_year)
}

fn shard_of(maker: &str, shard_count: usize) -> usize {
    let digest = blake3::hash(normalize_maker(maker).as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(head) % shard_count as u64) as usize
}
