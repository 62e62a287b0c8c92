//! Read-only frequency tables produced by a build.
//!
//! Cells are stored at exact [`AggregateKey`] granularity. Lookups go through
//! three precomputed views keyed by the description's match key, one per
//! back-off level. Nothing here mutates after [`FrequencyIndex::from_parts`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::domain::{
    AggregateKey, BackoffLevel, SkuYearRange, VehicleIdentity, VinPrefixFrequency,
};
use crate::vin;

/// Distinct tokens of a normalized description in sorted order.
pub fn match_key(normalized_description: &str) -> String {
    let tokens: BTreeSet<&str> = normalized_description.split_whitespace().collect();
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

/// One candidate SKU at one lookup level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkuEntry {
    pub part_identifier: String,
    pub range: SkuYearRange,
    /// Most frequent contributing description; ties resolve to the smallest.
    pub description: String,
    /// Distinct (maker, series) pairs the observations came from.
    pub contexts: Vec<(String, String)>,
}

impl SkuEntry {
    pub fn has_context(&self, maker: &str, series: Option<&str>) -> bool {
        self.contexts.iter().any(|(context_maker, context_series)| {
            context_maker == maker && series.map_or(true, |series| context_series == series)
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyIndex {
    cells: BTreeMap<AggregateKey, SkuYearRange>,
    prefixes: BTreeMap<String, VinPrefixFrequency>,
    global_frequency: HashMap<String, u32>,
    specific: HashMap<(String, String, String), Vec<SkuEntry>>,
    medium: HashMap<(String, String), Vec<SkuEntry>>,
    coarse: HashMap<String, Vec<SkuEntry>>,
}

impl FrequencyIndex {
    pub fn from_parts(
        cells: BTreeMap<AggregateKey, SkuYearRange>,
        prefixes: BTreeMap<String, VinPrefixFrequency>,
    ) -> Self {
        let mut global_frequency = HashMap::new();
        let mut specific = ViewBuilder::default();
        let mut medium = ViewBuilder::default();
        let mut coarse = ViewBuilder::default();

        for (key, range) in &cells {
            *global_frequency.entry(key.part_identifier.clone()).or_insert(0) += range.count;
            let description_key = match_key(&key.normalized_description);
            specific.add((key.maker.clone(), key.series.clone(), description_key.clone()), key, range);
            medium.add((key.maker.clone(), description_key.clone()), key, range);
            coarse.add(description_key, key, range);
        }

        Self {
            cells,
            prefixes,
            global_frequency,
            specific: specific.finish(),
            medium: medium.finish(),
            coarse: coarse.finish(),
        }
    }

    /// Candidates at (maker, series, description), most observed first.
    pub fn lookup_skus(&self, maker: &str, series: &str, normalized_description: &str) -> &[SkuEntry] {
        let key = (maker.to_owned(), series.to_owned(), match_key(normalized_description));
        self.specific.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn lookup_skus_by_maker(&self, maker: &str, normalized_description: &str) -> &[SkuEntry] {
        let key = (maker.to_owned(), match_key(normalized_description));
        self.medium.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn lookup_skus_by_description(&self, normalized_description: &str) -> &[SkuEntry] {
        self.coarse.get(&match_key(normalized_description)).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn lookup_level(
        &self,
        level: BackoffLevel,
        maker: &str,
        series: &str,
        normalized_description: &str,
    ) -> &[SkuEntry] {
        match level {
            BackoffLevel::Specific => self.lookup_skus(maker, series, normalized_description),
            BackoffLevel::Medium => self.lookup_skus_by_maker(maker, normalized_description),
            BackoffLevel::Coarse => self.lookup_skus_by_description(normalized_description),
        }
    }

    pub fn lookup_vin_prefix(&self, prefix11: &str) -> Option<&VinPrefixFrequency> {
        self.prefixes.get(prefix11)
    }

    /// Maker and series the code's prefix was most often observed with, plus the
    /// model year the code encodes. Codes that fail validation identify nothing.
    pub fn identify_vehicle(&self, code: &str) -> Option<VehicleIdentity> {
        let code = vin::validate(code).valid()?;
        let prefix = code[..vin::PREFIX_LENGTH].to_owned();
        let model_year = vin::decode_model_year(&code);
        let identity = match self.prefixes.get(&prefix) {
            Some(frequency) => VehicleIdentity {
                maker: Some(frequency.maker.clone()),
                series: frequency.majority_series(),
                prefix_count: frequency.count,
                conflicted: frequency.is_conflicted(),
                prefix,
                model_year,
            },
            None => VehicleIdentity {
                prefix,
                maker: None,
                series: None,
                model_year,
                prefix_count: 0,
                conflicted: false,
            },
        };
        Some(identity)
    }

    /// Observations of a SKU across every in-range record.
    pub fn global_frequency(&self, part_identifier: &str) -> u32 {
        self.global_frequency.get(part_identifier).copied().unwrap_or(0)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&AggregateKey, &SkuYearRange)> {
        self.cells.iter()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &VinPrefixFrequency> {
        self.prefixes.values()
    }

    pub fn distinct_keys(&self) -> usize {
        self.cells.len()
    }

    pub fn distinct_prefixes(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.prefixes.is_empty()
    }
}

#[derive(Default)]
struct Accumulator {
    range: Option<SkuYearRange>,
    descriptions: BTreeMap<String, u32>,
    contexts: BTreeSet<(String, String)>,
}

struct ViewBuilder<K> {
    groups: HashMap<K, BTreeMap<String, Accumulator>>,
}

impl<K> Default for ViewBuilder<K> {
    fn default() -> Self {
        Self { groups: HashMap::new() }
    }
}

impl<K: std::hash::Hash + Eq> ViewBuilder<K> {
    fn add(&mut self, view_key: K, key: &AggregateKey, range: &SkuYearRange) {
        let accumulator = self
            .groups
            .entry(view_key)
            .or_default()
            .entry(key.part_identifier.clone())
            .or_default();
        match accumulator.range.as_mut() {
            Some(existing) => existing.merge(range),
            None => accumulator.range = Some(*range),
        }
        *accumulator.descriptions.entry(key.normalized_description.clone()).or_insert(0) +=
            range.count;
        accumulator.contexts.insert((key.maker.clone(), key.series.clone()));
    }

    fn finish(self) -> HashMap<K, Vec<SkuEntry>> {
        self.groups
            .into_iter()
            .map(|(view_key, parts)| {
                let mut entries: Vec<SkuEntry> = parts
                    .into_iter()
                    .filter_map(|(part_identifier, accumulator)| {
                        Some(SkuEntry {
                            part_identifier,
                            range: accumulator.range?,
                            description: dominant(&accumulator.descriptions),
                            contexts: accumulator.contexts.into_iter().collect(),
                        })
                    })
                    .collect();
                entries.sort_by(|left, right| {
                    right
                        .range
                        .count
                        .cmp(&left.range.count)
                        .then_with(|| left.part_identifier.cmp(&right.part_identifier))
                });
                (view_key, entries)
            })
            .collect()
    }
}

fn dominant(descriptions: &BTreeMap<String, u32>) -> String {
    let mut best: Option<(&String, u32)> = None;
    for (description, count) in descriptions {
        if best.map_or(true, |(_, best_count)| *count > best_count) {
            best = Some((description, *count));
        }
    }
    best.map(|(description, _)| description.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{match_key, FrequencyIndex};
    use crate::domain::{
        AggregateKey, BackoffLevel, SkuYearRange, VehicleIdentity, VinPrefixFrequency,
    };

    fn cell(
        maker: &str,
        series: &str,
        description: &str,
        part: &str,
        count: u32,
        years: (i32, i32),
    ) -> (AggregateKey, SkuYearRange) {
        (
            AggregateKey::new(maker, series, description, part),
            SkuYearRange { count, start_year: years.0, end_year: years.1 },
        )
    }

    fn sample() -> FrequencyIndex {
        let cells: BTreeMap<_, _> = [
            cell("mazda", "CX-30", "faro delantero izquierdo", "ABC123", 4, (2019, 2021)),
            cell("mazda", "CX-30", "faro izquierdo delantero", "ABC123", 1, (2022, 2022)),
            cell("mazda", "CX-30", "faro delantero izquierdo", "ABC999", 2, (2020, 2020)),
            cell("mazda", "MAZDA 3", "faro delantero izquierdo", "M3-001", 6, (2014, 2018)),
            cell("ford", "FOCUS", "faro delantero izquierdo", "F-77", 3, (2012, 2015)),
        ]
        .into_iter()
        .collect();
        let mut prefix = VinPrefixFrequency::new("3MVDM2W7ANL");
        prefix.observe("mazda", "CX-30");
        let prefixes = [(prefix.prefix.clone(), prefix)].into_iter().collect();
        FrequencyIndex::from_parts(cells, prefixes)
    }

    #[test]
    fn match_key_ignores_token_order_and_repeats() {
        assert_eq!(match_key("faro izquierdo delantero faro"), "delantero faro izquierdo");
        assert_eq!(match_key(""), "");
    }

    #[test]
    fn specific_lookup_merges_descriptions_sharing_a_match_key() {
        let index = sample();
        let entries = index.lookup_skus("mazda", "CX-30", "izquierdo faro delantero");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].part_identifier, "ABC123");
        assert_eq!(entries[0].range, SkuYearRange { count: 5, start_year: 2019, end_year: 2022 });
        assert_eq!(entries[0].description, "faro delantero izquierdo");
        assert_eq!(entries[1].part_identifier, "ABC999");
    }

    #[test]
    fn coarser_levels_widen_the_candidate_set() {
        let index = sample();

        let by_maker = index.lookup_level(BackoffLevel::Medium, "mazda", "", "faro delantero izquierdo");
        assert_eq!(by_maker.len(), 3);
        assert_eq!(by_maker[0].part_identifier, "M3-001");

        let coarse = index.lookup_skus_by_description("faro delantero izquierdo");
        assert_eq!(coarse.len(), 4);
        assert!(coarse.iter().any(|entry| entry.has_context("ford", Some("FOCUS"))));
        assert!(index.lookup_skus("mazda", "CX-5", "faro delantero izquierdo").is_empty());
    }

    #[test]
    fn global_frequency_sums_every_context() {
        let index = sample();

        assert_eq!(index.global_frequency("ABC123"), 5);
        assert_eq!(index.global_frequency("unknown"), 0);
        assert_eq!(index.distinct_keys(), 5);
        assert_eq!(index.lookup_vin_prefix("3MVDM2W7ANL").map(|entry| entry.count), Some(1));
        assert!(index.lookup_vin_prefix("3MVDM2WLANL").is_none());
    }

    #[test]
    fn vehicle_identity_comes_from_the_prefix_and_the_year_code() {
        let index = sample();

        let identity = index.identify_vehicle("3mvdm2w7anl000001");
        assert_eq!(
            identity,
            Some(VehicleIdentity {
                prefix: "3MVDM2W7ANL".to_string(),
                maker: Some("mazda".to_string()),
                series: Some("CX-30".to_string()),
                model_year: Some(2022),
                prefix_count: 1,
                conflicted: false,
            })
        );
        assert!(identity.is_some_and(|identity| identity.is_reliable()));
    }

    #[test]
    fn unseen_prefix_still_decodes_the_model_year() {
        let identity = sample().identify_vehicle("3MVDM2WLANL000002");

        assert_eq!(identity.as_ref().and_then(|identity| identity.maker.clone()), None);
        assert_eq!(identity.as_ref().and_then(|identity| identity.model_year), Some(2022));
        assert_eq!(identity.as_ref().map(|identity| identity.prefix_count), Some(0));
        assert!(!identity.is_some_and(|identity| identity.is_reliable()));
        assert_eq!(sample().identify_vehicle("SHORT"), None);
    }

    #[test]
    fn conflicted_prefix_keeps_majority_but_is_not_reliable() {
        let mut prefix = VinPrefixFrequency::new("3MVDM2W7ANL");
        prefix.observe("mazda", "CX-30");
        prefix.observe("mazda", "CX-30");
        prefix.observe("ford", "FOCUS");
        let index = FrequencyIndex::from_parts(
            BTreeMap::new(),
            [(prefix.prefix.clone(), prefix)].into_iter().collect(),
        );

        let identity = index.identify_vehicle("3MVDM2W7ANL000001");
        assert_eq!(identity.as_ref().and_then(|identity| identity.maker.as_deref()), Some("mazda"));
        assert_eq!(identity.as_ref().map(|identity| identity.prefix_count), Some(3));
        assert_eq!(identity.as_ref().map(|identity| identity.conflicted), Some(true));
        assert!(!identity.is_some_and(|identity| identity.is_reliable()));
    }
}
