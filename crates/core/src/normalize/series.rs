use crate::rules::NormalizationRuleSet;

/// Uppercase, trim and collapse internal whitespace runs.
pub fn series_key(series: &str) -> String {
    series.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Canonical series bucket; names without an alias keep their normalized form.
pub fn normalize_series(series: &str, rules: &NormalizationRuleSet) -> String {
    let key = series_key(series);
    match rules.series_alias(&key) {
        Some(canonical) => canonical.to_owned(),
        None => key,
    }
}
