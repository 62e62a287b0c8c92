//! Description normalization.
//!
//! A pass is the fixed stage sequence fold, phrase abbreviations, token
//! abbreviations, equivalences, adjective agreement and cleanup. Every stage is a
//! pure function of its input tokens and the immutable rule set, so the outcome of
//! [`normalize`] depends only on the sequence of pass outputs. Passes repeat until
//! the text stops changing. A sequence that loops settles on the smallest text of
//! the loop, and one that neither stops nor loops within [`MAX_PASSES`] yields the
//! folded input. Each of the three outcomes is a fixed point of [`normalize`].

pub(crate) mod agreement;
mod phrase;
mod series;

use deunicode::deunicode;

use crate::rules::NormalizationRuleSet;

pub use phrase::PhraseTable;
pub use series::{normalize_series, series_key};

pub const MAX_PASSES: usize = 8;

pub fn normalize(text: &str, rules: &NormalizationRuleSet) -> String {
    let (normalized, converged) = settle(text, rules);
    if !converged {
        tracing::debug!(
            event_name = "normalize.non_converging",
            input = text,
            output = normalized.as_str(),
            "normalization did not reach a fixed point"
        );
    }
    normalized
}

/// Accent-stripped, lowercased, whitespace-collapsed maker name.
pub fn normalize_maker(maker: &str) -> String {
    deunicode(maker).to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stage 1 output joined with single spaces. Rule table keys are stored folded.
pub fn fold(text: &str) -> String {
    fold_tokens(text).join(" ")
}

pub(crate) fn fold_tokens(text: &str) -> Vec<String> {
    let folded: String = deunicode(text)
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '-' { ch } else { ' ' })
        .collect();
    folded.split_whitespace().map(str::to_owned).collect()
}

/// Runs passes until a fixed point, reporting whether one was reached within
/// [`MAX_PASSES`]. Only pass outputs are remembered; the raw input never takes
/// part in loop detection.
pub(crate) fn settle(text: &str, rules: &NormalizationRuleSet) -> (String, bool) {
    let mut seen: Vec<String> = Vec::with_capacity(MAX_PASSES);
    let mut current = run_pass(text, rules);
    for _ in 1..MAX_PASSES {
        let next = run_pass(&current, rules);
        if next == current {
            return (current, true);
        }
        if let Some(start) = seen.iter().position(|output| *output == next) {
            let smallest = seen[start..].iter().chain([&current]).min().cloned();
            return (smallest.unwrap_or(current), false);
        }
        seen.push(current);
        current = next;
    }
    (fold(text), false)
}

fn run_pass(text: &str, rules: &NormalizationRuleSet) -> String {
    let tokens = fold_tokens(text);
    let tokens = rules.phrases().rewrite(tokens);
    let tokens = expand_tokens(tokens, rules);
    let tokens = rules.equivalences().rewrite(tokens);
    let tokens = agreement::agree(tokens, rules.noun_genders(), rules.stoplist());
    cleanup(tokens)
}

fn expand_tokens(tokens: Vec<String>, rules: &NormalizationRuleSet) -> Vec<String> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        match rules.token_expansion(&token) {
            Some(target) => expanded.extend(target.iter().cloned()),
            None => expanded.push(token),
        }
    }
    expanded
}

fn cleanup(tokens: Vec<String>) -> String {
    tokens
        .iter()
        .map(|token| collapse_hyphens(token))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_hyphens(token: &str) -> String {
    let mut collapsed = String::with_capacity(token.len());
    for ch in token.chars() {
        if ch == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(ch);
    }
    collapsed.trim_matches('-').to_owned()
}
