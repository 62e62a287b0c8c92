use std::collections::BTreeMap;

use crate::domain::BackoffLevel;
use crate::index::{FrequencyIndex, SkuEntry};

/// A SKU with its back-off weighted observation count.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate<'a> {
    /// Entry from the most specific level the SKU appeared at.
    pub entry: &'a SkuEntry,
    pub evidence: f64,
    pub level: BackoffLevel,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Retrieval<'a> {
    /// Most specific level with at least one candidate.
    pub level: BackoffLevel,
    /// Coarsest level merged in.
    pub deepest: BackoffLevel,
    pub candidates: Vec<Candidate<'a>>,
}

impl Retrieval<'_> {
    pub fn total_evidence(&self) -> f64 {
        self.candidates.iter().map(|candidate| candidate.evidence).sum()
    }
}

/// Inputs of the level progression, already normalized.
#[derive(Clone, Copy, Debug)]
pub struct BackoffQuery<'q> {
    pub maker: &'q str,
    pub series: &'q str,
    pub description: &'q str,
}

/// Walks specific, medium, coarse. Starts at the first level with candidates and
/// keeps adding coarser levels, each weighted by a further factor of
/// `backoff_weight`, while the merged evidence stays below `min_evidence`.
pub fn retrieve<'a>(
    index: &'a FrequencyIndex,
    query: BackoffQuery<'_>,
    min_evidence: f64,
    backoff_weight: f64,
) -> Option<Retrieval<'a>> {
    let mut level = BackoffLevel::Specific;
    let mut entries = lookup(index, level, query);
    while entries.is_empty() {
        level = level.coarser()?;
        entries = lookup(index, level, query);
    }

    let start = level;
    let mut merged: BTreeMap<&'a str, Candidate<'a>> = BTreeMap::new();
    let mut weight = 1.0;
    loop {
        for entry in entries {
            let evidence = weight * f64::from(entry.range.count);
            merged
                .entry(entry.part_identifier.as_str())
                .and_modify(|candidate| candidate.evidence += evidence)
                .or_insert(Candidate { entry, evidence, level });
        }

        let total: f64 = merged.values().map(|candidate| candidate.evidence).sum();
        let Some(next) = level.coarser() else {
            break;
        };
        if total >= min_evidence {
            break;
        }
        level = next;
        weight *= backoff_weight;
        entries = lookup(index, level, query);
    }

    Some(Retrieval { level: start, deepest: level, candidates: merged.into_values().collect() })
}

fn lookup<'a>(index: &'a FrequencyIndex, level: BackoffLevel, query: BackoffQuery<'_>) -> &'a [SkuEntry] {
    index.lookup_level(level, query.maker, query.series, query.description)
}
