//! Query-time ranking over a built [`FrequencyIndex`].
//!
//! Scoring is pure in-memory computation over a shared, immutable index. Any
//! number of engines may borrow the same index concurrently.

pub mod backoff;
pub mod confidence;
pub mod similarity;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::{Prediction, ScoringQuery, VinPrefixFrequency};
use crate::index::FrequencyIndex;
use crate::normalize::{normalize_maker, series_key};
use crate::vin;

use backoff::{BackoffQuery, Candidate};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Laplace smoothing constant added to every candidate count.
    pub alpha: f64,
    /// Probability multiplier for candidates consistent with the vehicle-code prefix.
    pub vin_boost: f64,
    /// Candidates kept for similarity re-ranking.
    pub top_k: usize,
    /// Weight of probability against similarity in the combined score.
    pub lambda: f64,
    pub min_evidence: f64,
    pub backoff_weight: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            vin_boost: 1.3,
            top_k: 10,
            lambda: 0.7,
            min_evidence: 3.0,
            backoff_weight: 0.5,
        }
    }
}

pub struct ScoringEngine<'a> {
    index: &'a FrequencyIndex,
    params: ScoringParams,
}

struct Ranked<'a> {
    candidate: Candidate<'a>,
    probability: f64,
    similarity: f64,
    combined: f64,
    evidence_z: f64,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(index: &'a FrequencyIndex, params: ScoringParams) -> Self {
        Self { index, params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Ranked predictions, best first. No candidate at any level yields an empty list.
    pub fn score(&self, query: &ScoringQuery) -> Vec<Prediction> {
        let maker = normalize_maker(&query.maker);
        let series = series_key(&query.series);
        let description = query.normalized_description.split_whitespace().collect::<Vec<_>>().join(" ");

        let Some(retrieval) = backoff::retrieve(
            self.index,
            BackoffQuery { maker: &maker, series: &series, description: &description },
            self.params.min_evidence,
            self.params.backoff_weight,
        ) else {
            tracing::debug!(
                event_name = "scoring.empty_result",
                maker = maker.as_str(),
                series = series.as_str(),
                description = description.as_str(),
                "no candidates at any back-off level"
            );
            return Vec::new();
        };

        let level = retrieval.level;
        let candidates = retrieval.candidates;
        let evidence: Vec<f64> = candidates.iter().map(|candidate| candidate.evidence).collect();
        let evidence_z = confidence::z_scores(&evidence);

        let mut probabilities = self.smoothed(&candidates);
        if let Some(prefix) = self.consistent_prefix(query.vehicle_code.as_deref()) {
            self.apply_vin_boost(&candidates, &mut probabilities, prefix);
        }

        let mut ranked: Vec<Ranked<'_>> = candidates
            .into_iter()
            .zip(probabilities)
            .zip(evidence_z)
            .map(|((candidate, probability), evidence_z)| Ranked {
                candidate,
                probability,
                similarity: 0.0,
                combined: 0.0,
                evidence_z,
            })
            .collect();

        ranked.sort_by(|left, right| {
            descending(left.probability, right.probability).then_with(|| tie_break(left, right))
        });
        ranked.truncate(self.params.top_k.max(1));

        for entry in &mut ranked {
            entry.similarity =
                similarity::trigram_similarity(&description, &entry.candidate.entry.description);
            entry.combined = self.params.lambda * entry.probability
                + (1.0 - self.params.lambda) * entry.similarity;
        }
        ranked.sort_by(|left, right| {
            descending(left.combined, right.combined).then_with(|| tie_break(left, right))
        });

        let query_year = query
            .model_year
            .or_else(|| query.vehicle_code.as_deref().and_then(vin::decode_model_year));
        let best = ranked.first().map(|entry| entry.combined).unwrap_or(0.0);
        let runner_up = ranked.get(1).map(|entry| entry.combined);

        let predictions: Vec<Prediction> = ranked
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let margin = match (position, runner_up) {
                    (0, Some(second)) => entry.combined - second,
                    (0, None) => entry.combined,
                    _ => entry.combined - best,
                };
                let range = entry.candidate.entry.range;
                let year_overlap = confidence::year_overlap(&range, query_year);
                Prediction {
                    part_identifier: entry.candidate.entry.part_identifier.clone(),
                    probability: entry.probability,
                    similarity_score: entry.similarity,
                    combined_score: entry.combined,
                    confidence: confidence::calibrate(margin, entry.evidence_z, year_overlap),
                    year_overlap,
                    evidence_count: entry.candidate.evidence,
                    start_year: range.start_year,
                    end_year: range.end_year,
                    global_frequency: self
                        .index
                        .global_frequency(&entry.candidate.entry.part_identifier),
                    level: entry.candidate.level,
                    matched_description: entry.candidate.entry.description.clone(),
                }
            })
            .collect();

        tracing::debug!(
            event_name = "scoring.completed",
            level = level.as_str(),
            deepest = retrieval.deepest.as_str(),
            candidates = predictions.len(),
            "query scored"
        );
        predictions
    }

    fn smoothed(&self, candidates: &[Candidate<'_>]) -> Vec<f64> {
        let adjusted: Vec<f64> =
            candidates.iter().map(|candidate| candidate.evidence + self.params.alpha).collect();
        normalized(adjusted)
    }

    /// Prefix usable for the boost: known, valid, and tied to a single maker.
    fn consistent_prefix(&self, vehicle_code: Option<&str>) -> Option<&'a VinPrefixFrequency> {
        let prefix = vin::prefix11(vehicle_code?)?;
        let frequency = self.index.lookup_vin_prefix(&prefix)?;
        if frequency.is_conflicted() {
            tracing::debug!(
                event_name = "scoring.vin_prefix_conflicted",
                prefix = prefix.as_str(),
                "conflicting prefix ignored for boost"
            );
            return None;
        }
        Some(frequency)
    }

    fn apply_vin_boost(
        &self,
        candidates: &[Candidate<'_>],
        probabilities: &mut Vec<f64>,
        prefix: &VinPrefixFrequency,
    ) {
        let series = prefix.majority_series();
        let mut boosted = false;
        for (candidate, probability) in candidates.iter().zip(probabilities.iter_mut()) {
            if candidate.entry.has_context(&prefix.maker, series.as_deref()) {
                *probability *= self.params.vin_boost;
                boosted = true;
            }
        }
        if boosted {
            *probabilities = normalized(std::mem::take(probabilities));
        }
    }
}

fn normalized(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        let uniform = 1.0 / values.len().max(1) as f64;
        return vec![uniform; values.len()];
    }
    values.into_iter().map(|value| value / total).collect()
}

fn descending(left: f64, right: f64) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}

/// Higher evidence first, then part identifier for a stable order.
fn tie_break(left: &Ranked<'_>, right: &Ranked<'_>) -> Ordering {
    descending(left.candidate.evidence, right.candidate.evidence).then_with(|| {
        left.candidate.entry.part_identifier.cmp(&right.candidate.entry.part_identifier)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{ScoringEngine, ScoringParams};
    use crate::domain::{AggregateKey, BackoffLevel, ScoringQuery, SkuYearRange, VinPrefixFrequency, YearOverlap};
    use crate::index::FrequencyIndex;

    fn index(prefix_makers: &[(&str, &str)]) -> FrequencyIndex {
        let cells: BTreeMap<_, _> = [
            ("mazda", "CX-30", "faro delantero izquierdo", "ABC123", 6, (2019, 2022)),
            ("mazda", "CX-30", "faro delantero izquierdo", "ABC777", 5, (2019, 2022)),
            ("mazda", "CX-30", "faro izquierdo delantero", "ZZ-001", 1, (2020, 2020)),
            ("ford", "FOCUS", "faro delantero izquierdo", "F-100", 9, (2012, 2016)),
        ]
        .into_iter()
        .map(|(maker, series, description, part, count, (start, end))| {
            (
                AggregateKey::new(maker, series, description, part),
                SkuYearRange { count, start_year: start, end_year: end },
            )
        })
        .collect();

        let mut prefix = VinPrefixFrequency::new("3MVDM2W7ANL");
        for (maker, series) in prefix_makers {
            prefix.observe(maker, series);
        }
        let prefixes = if prefix_makers.is_empty() {
            BTreeMap::new()
        } else {
            [(prefix.prefix.clone(), prefix)].into_iter().collect()
        };
        FrequencyIndex::from_parts(cells, prefixes)
    }

    fn query() -> ScoringQuery {
        ScoringQuery::new("Mazda", "cx-30", "faro delantero izquierdo")
    }

    #[test]
    fn probabilities_sum_to_one_and_ranking_is_deterministic() {
        let index = index(&[]);
        let predictions = ScoringEngine::new(&index, ScoringParams::default()).score(&query());

        let parts: Vec<&str> =
            predictions.iter().map(|prediction| prediction.part_identifier.as_str()).collect();
        assert_eq!(parts, vec!["ABC123", "ABC777", "ZZ-001"]);
        let total: f64 = predictions.iter().map(|prediction| prediction.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(predictions.iter().all(|prediction| prediction.level == BackoffLevel::Specific));
        assert_eq!(predictions[0].year_overlap, YearOverlap::Unknown);
        assert_eq!(predictions[0].global_frequency, 6);
    }

    #[test]
    fn zero_weight_backoff_candidate_keeps_smoothed_probability() {
        let index = index(&[]);
        let params = ScoringParams { min_evidence: 100.0, backoff_weight: 0.0, ..ScoringParams::default() };
        let predictions = ScoringEngine::new(&index, params).score(&query());

        let ford = predictions
            .iter()
            .find(|prediction| prediction.part_identifier == "F-100")
            .expect("coarse candidate merged");
        assert_eq!(ford.evidence_count, 0.0);
        assert!(ford.probability > 0.0);
        let total: f64 = predictions.iter().map(|prediction| prediction.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn consistent_vehicle_prefix_boosts_matching_context() {
        let index = index(&[("mazda", "CX-30")]);
        let engine = ScoringEngine::new(&index, ScoringParams { min_evidence: 100.0, ..ScoringParams::default() });

        let plain = engine.score(&query());
        let boosted = engine.score(&query().with_vehicle_code("3MVDM2W7ANL000001"));

        let share = |predictions: &[crate::domain::Prediction], part: &str| {
            predictions
                .iter()
                .find(|prediction| prediction.part_identifier == part)
                .map(|prediction| prediction.probability)
                .unwrap_or(0.0)
        };
        assert!(share(&boosted, "ABC123") > share(&plain, "ABC123"));
        assert!(share(&boosted, "F-100") < share(&plain, "F-100"));
    }

    #[test]
    fn conflicted_or_unparseable_prefix_skips_the_boost() {
        let conflicted = index(&[("mazda", "CX-30"), ("ford", "FOCUS")]);
        let engine = ScoringEngine::new(&conflicted, ScoringParams::default());

        let probabilities = |query: &ScoringQuery| {
            engine
                .score(query)
                .into_iter()
                .map(|prediction| (prediction.part_identifier, prediction.probability))
                .collect::<Vec<_>>()
        };
        let plain = probabilities(&query());
        assert_eq!(probabilities(&query().with_vehicle_code("3MVDM2W7ANL000001")), plain);
        assert_eq!(probabilities(&query().with_vehicle_code("not-a-code")), plain);
    }

    #[test]
    fn unknown_description_is_an_empty_result() {
        let index = index(&[]);
        let predictions = ScoringEngine::new(&index, ScoringParams::default())
            .score(&ScoringQuery::new("mazda", "CX-30", "capo"));

        assert!(predictions.is_empty());
    }

    #[test]
    fn year_outside_envelope_lowers_confidence() {
        let index = index(&[]);
        let engine = ScoringEngine::new(&index, ScoringParams::default());

        let inside = engine.score(&query().with_model_year(2020));
        let outside = engine.score(&query().with_model_year(2010));

        assert_eq!(inside[0].part_identifier, outside[0].part_identifier);
        assert_eq!(inside[0].year_overlap, YearOverlap::Within);
        assert_eq!(outside[0].year_overlap, YearOverlap::Outside);
        assert!(outside[0].confidence < inside[0].confidence);
    }

    #[test]
    fn vehicle_code_year_fills_a_missing_query_year() {
        let index = index(&[]);
        let engine = ScoringEngine::new(&index, ScoringParams::default());

        let predictions = engine.score(&query().with_vehicle_code("3MVDM2W7ALL000001"));
        assert_eq!(predictions[0].year_overlap, YearOverlap::Within);
    }
}
