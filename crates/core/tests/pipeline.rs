use proptest::prelude::*;
use skucast_core::{
    build, normalize, normalize_series, AggregateKey, HistoricalRecord, NormalizationRuleSet,
    RuleTables, ScoringEngine, ScoringParams, ScoringQuery, YearOverlap,
};

const RULES: &str = r#"
stoplist = ["con"]

[[phrase_abbreviations]]
from = "del izq"
to = "delantero izquierdo"

[[token_abbreviations]]
from = "del"
to = "delantero"

[[token_abbreviations]]
from = "izq"
to = "izquierdo"

[[token_abbreviations]]
from = "der"
to = "derecho"
tier = "medium"

[[token_abbreviations]]
from = "tra"
to = "trasero"
tier = "low"

[[equivalences]]
canonical = "faro"
aliases = ["farol", "optica"]

[[noun_genders]]
noun = "aleta"
gender = "femenino"

[[series_aliases]]
canonical = "CX30"
variants = ["CX 30", "CX-30"]
"#;

fn rules() -> NormalizationRuleSet {
    let tables = RuleTables::from_toml_str(RULES).expect("rule tables parse");
    NormalizationRuleSet::resolve(&tables)
}

fn mazda(description: &str, part: &str, year: i32) -> HistoricalRecord {
    HistoricalRecord::new("mazda", "cx30", description, part, year)
}

#[test]
fn repeated_records_fold_into_one_cell() {
    let rules = rules();
    let records = vec![
        mazda("farol delantero izquierdo", "ABC123", 2019),
        mazda("farol delantero izquierdo", "ABC123", 2021),
    ];

    let (index, stats) = build(&records, &rules, 2024);

    let cells: Vec<_> = index.cells().collect();
    assert_eq!(cells.len(), 1);
    let (key, range) = cells[0];
    assert_eq!(key, &AggregateKey::new("mazda", "CX30", "faro delantero izquierdo", "ABC123"));
    assert_eq!((range.count, range.start_year, range.end_year), (2, 2019, 2021));
    assert_eq!(stats.distinct_keys, 1);
    assert_eq!(stats.excluded_by_year, 0);
}

#[test]
fn series_spacing_variants_share_a_bucket() {
    let rules = rules();

    assert_eq!(normalize_series("CX  30", &rules), "CX30");
    assert_eq!(normalize_series("cx30", &rules), "CX30");
    assert_eq!(normalize_series(" cx-30 ", &rules), "CX30");
}

#[test]
fn prefixes_split_on_first_eleven_positions_only() {
    let rules = rules();
    let records = vec![
        mazda("faro", "A", 2020).with_vehicle_code("3MVDM2W7ANL000001"),
        mazda("faro", "A", 2020).with_vehicle_code("3MVDM2WLANL000002"),
        mazda("faro", "A", 2020).with_vehicle_code("3MVDM2W7ANL987654"),
    ];

    let (index, stats) = build(&records, &rules, 2024);

    assert_eq!(stats.distinct_prefixes, 2);
    assert_eq!(index.lookup_vin_prefix("3MVDM2W7ANL").map(|prefix| prefix.count), Some(2));
    assert_eq!(index.lookup_vin_prefix("3MVDM2WLANL").map(|prefix| prefix.count), Some(1));
}

#[test]
fn query_year_outside_envelope_lowers_confidence() {
    let rules = rules();
    let records = vec![
        mazda("farol del izq", "ABC123", 2019),
        mazda("farol del izq", "ABC123", 2021),
        mazda("optica delantera izq", "ABC123", 2020),
        mazda("farol del izq", "XYZ900", 2015),
    ];
    let (index, _) = build(&records, &rules, 2024);
    let engine = ScoringEngine::new(&index, ScoringParams::default());
    let description = normalize("Farol Del. Izq.", &rules);
    assert_eq!(description, "faro delantero izquierdo");

    let inside = engine.score(&ScoringQuery::new("Mazda", "CX30", &description).with_model_year(2020));
    let outside = engine.score(&ScoringQuery::new("Mazda", "CX30", &description).with_model_year(2005));

    assert_eq!(inside[0].part_identifier, "ABC123");
    assert_eq!(outside[0].part_identifier, "ABC123");
    assert_eq!(inside[0].year_overlap, YearOverlap::Within);
    assert_eq!(outside[0].year_overlap, YearOverlap::Outside);
    assert!(outside[0].confidence < inside[0].confidence);
}

#[test]
fn smoothing_gives_every_candidate_mass_and_sums_to_one() {
    let rules = rules();
    let records = vec![
        mazda("espejo derecho", "E-1", 2018),
        mazda("espejo derecho", "E-1", 2019),
        mazda("espejo derecho", "E-2", 2019),
        HistoricalRecord::new("kia", "rio", "espejo derecho", "K-5", 2017),
    ];
    let (index, _) = build(&records, &rules, 2024);
    let params = ScoringParams { min_evidence: 50.0, backoff_weight: 0.0, ..ScoringParams::default() };

    let predictions =
        ScoringEngine::new(&index, params).score(&ScoringQuery::new("mazda", "CX30", "espejo derecho"));

    assert_eq!(predictions.len(), 3);
    assert!(predictions.iter().all(|prediction| prediction.probability > 0.0));
    let unseen = predictions.iter().find(|prediction| prediction.part_identifier == "K-5");
    assert_eq!(unseen.map(|prediction| prediction.evidence_count), Some(0.0));
    let total: f64 = predictions.iter().map(|prediction| prediction.probability).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn more_evidence_never_means_less_confidence() {
    let rules = rules();
    let mut records = Vec::new();
    for year in 2015..2022 {
        records.push(mazda("aleta trasera", "STRONG", year));
    }
    records.push(mazda("aleta trasera", "WEAK", 2018));
    records.push(mazda("aleta trasera", "WEAK", 2019));
    let (index, _) = build(&records, &rules, 2024);

    let predictions = ScoringEngine::new(&index, ScoringParams::default())
        .score(&ScoringQuery::new("mazda", "CX30", "aleta trasera"));

    assert_eq!(predictions.len(), 2);
    let strong = &predictions[0];
    let weak = &predictions[1];
    assert_eq!(strong.part_identifier, "STRONG");
    assert_eq!(strong.similarity_score, weak.similarity_score);
    assert!(strong.evidence_count > weak.evidence_count);
    assert!(strong.confidence >= weak.confidence);
}

#[test]
fn low_tier_abbreviation_stays_literal_through_the_pipeline() {
    let rules = rules();

    assert_eq!(rules.diagnostics().dropped_low_tier, 1);
    assert_eq!(normalize("aleta tra der", &rules), "aleta tra derecha");
}

#[test]
fn build_stats_serialize_for_operators() {
    let rules = rules();
    let records = vec![
        mazda("faro", "A", 1980),
        mazda("faro", "A", 2020).with_vehicle_code("SHORT"),
    ];
    let (_, stats) = build(&records, &rules, 2024);

    let json = serde_json::to_value(&stats).expect("stats serialize");
    assert_eq!(json["excluded_by_year"], 1);
    assert_eq!(json["invalid_vehicle_codes"], 1);
    assert_eq!(json["warnings"][0]["kind"], "year_out_of_range");
    assert_eq!(json["ruleset_fingerprint"], rules.fingerprint());
}

fn any_record() -> impl Strategy<Value = HistoricalRecord> {
    (
        prop::sample::select(vec!["mazda", "kia", "Ford"]),
        prop::sample::select(vec!["cx30", "CX 30", "rio"]),
        prop::sample::select(vec!["farol del izq", "espejo der", "aleta trasera"]),
        prop::sample::select(vec!["P-1", "P-2", "P-3"]),
        1950..2060i32,
    )
        .prop_map(|(maker, series, description, part, year)| {
            HistoricalRecord::new(maker, series, description, part, year)
        })
}

proptest! {
    #[test]
    fn every_envelope_stays_inside_the_year_window(
        records in prop::collection::vec(any_record(), 0..40),
        as_of_year in 2000..2030i32,
    ) {
        let rules = rules();
        let (index, stats) = build(&records, &rules, as_of_year);

        for (_, range) in index.cells() {
            prop_assert!(1990 <= range.start_year);
            prop_assert!(range.start_year <= range.end_year);
            prop_assert!(range.end_year <= as_of_year + 2);
        }
        let counted: u32 = index.cells().map(|(_, range)| range.count).sum();
        prop_assert_eq!(counted as usize + stats.excluded_by_year, stats.total_records);
    }
}
