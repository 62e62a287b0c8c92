use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use super::{Abbreviation, AbbreviationTier, Gender, RuleTables};
use crate::errors::RuleConflict;
use crate::normalize::agreement::{BUILTIN_NOUNS, DEFAULT_STOPLIST};
use crate::normalize::{fold, fold_tokens, series_key, settle, PhraseTable};

/// Immutable lookup structures shared by every normalization call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizationRuleSet {
    phrases: PhraseTable,
    tokens: HashMap<String, Vec<String>>,
    equivalences: PhraseTable,
    genders: HashMap<String, Gender>,
    stoplist: HashSet<String>,
    series_aliases: HashMap<String, String>,
    fingerprint: String,
    diagnostics: RuleSetDiagnostics,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuleSetDiagnostics {
    pub conflicts: Vec<RuleConflict>,
    pub dropped_low_tier: usize,
}

impl Default for NormalizationRuleSet {
    fn default() -> Self {
        Self::resolve(&RuleTables::default())
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    target: String,
    tier: AbbreviationTier,
}

impl NormalizationRuleSet {
    /// Resolves validated tables into one deterministic rule set. Conflicts never
    /// fail resolution; each one is recorded in [`RuleSetDiagnostics`].
    pub fn resolve(tables: &RuleTables) -> Self {
        let mut diagnostics = RuleSetDiagnostics::default();

        let mut phrase_candidates = BTreeMap::new();
        collect_abbreviations(
            "phrase_abbreviations",
            &tables.phrase_abbreviations,
            &mut phrase_candidates,
            &mut diagnostics,
        );
        let mut token_candidates = BTreeMap::new();
        collect_abbreviations(
            "token_abbreviations",
            &tables.token_abbreviations,
            &mut token_candidates,
            &mut diagnostics,
        );
        let (multi_token, single_token): (BTreeMap<_, _>, BTreeMap<_, _>) =
            token_candidates.into_iter().partition(|(source, _)| source.contains(' '));
        for (source, candidate) in multi_token {
            offer("token_abbreviations", &mut phrase_candidates, source, candidate, &mut diagnostics);
        }

        let mut phrases = PhraseTable::default();
        for (source, candidate) in phrase_candidates {
            phrases.insert(split(&source), split(&candidate.target));
        }

        let token_targets: BTreeMap<String, String> =
            single_token.into_iter().map(|(source, candidate)| (source, candidate.target)).collect();
        let tokens = close_token_map(&token_targets, &mut diagnostics);

        let mut equivalence_candidates = BTreeMap::new();
        for group in &tables.equivalences {
            let canonical = fold(&group.canonical);
            for alias in &group.aliases {
                let alias = fold(alias);
                if alias.is_empty() || alias == canonical {
                    continue;
                }
                let candidate =
                    Candidate { target: canonical.clone(), tier: AbbreviationTier::High };
                offer("equivalences", &mut equivalence_candidates, alias, candidate, &mut diagnostics);
            }
        }
        let equivalence_targets: BTreeMap<String, String> = equivalence_candidates
            .into_iter()
            .map(|(alias, candidate)| (alias, candidate.target))
            .collect();
        let mut equivalences = PhraseTable::default();
        for (alias, canonical) in close_equivalences(&equivalence_targets, &mut diagnostics) {
            equivalences.insert(split(&alias), split(&canonical));
        }

        let mut rules = Self {
            phrases,
            tokens,
            equivalences,
            genders: resolve_genders(tables, &mut diagnostics),
            stoplist: DEFAULT_STOPLIST
                .iter()
                .map(|word| (*word).to_owned())
                .chain(tables.stoplist.iter().flat_map(|word| fold_tokens(word)))
                .collect(),
            series_aliases: resolve_series_aliases(tables, &mut diagnostics),
            fingerprint: String::new(),
            diagnostics: RuleSetDiagnostics::default(),
        };
        rules.drop_overlapping_targets(&mut diagnostics);
        rules.drop_non_converging(&mut diagnostics);
        rules.fingerprint = rules.compute_fingerprint();
        rules.diagnostics = diagnostics;

        for conflict in &rules.diagnostics.conflicts {
            tracing::warn!(
                event_name = "rules.conflict",
                conflict = ?conflict,
                "rule table conflict resolved deterministically"
            );
        }
        tracing::info!(
            event_name = "rules.resolved",
            phrases = rules.phrases.len(),
            tokens = rules.tokens.len(),
            equivalences = rules.equivalences.len(),
            nouns = rules.genders.len(),
            series_aliases = rules.series_aliases.len(),
            conflicts = rules.diagnostics.conflicts.len(),
            dropped_low_tier = rules.diagnostics.dropped_low_tier,
            fingerprint = rules.fingerprint.as_str(),
            "rule set resolved"
        );
        rules
    }

    pub fn diagnostics(&self) -> &RuleSetDiagnostics {
        &self.diagnostics
    }

    /// blake3 digest of the resolved tables, stable across table row order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn series_alias(&self, key: &str) -> Option<&str> {
        self.series_aliases.get(key).map(String::as_str)
    }

    pub(crate) fn phrases(&self) -> &PhraseTable {
        &self.phrases
    }

    pub(crate) fn equivalences(&self) -> &PhraseTable {
        &self.equivalences
    }

    pub(crate) fn token_expansion(&self, token: &str) -> Option<&[String]> {
        self.tokens.get(token).map(Vec::as_slice)
    }

    pub(crate) fn noun_genders(&self) -> &HashMap<String, Gender> {
        &self.genders
    }

    pub(crate) fn stoplist(&self) -> &HashSet<String> {
        &self.stoplist
    }

    /// Removes phrase and equivalence entries whose target, alone or joined with
    /// neighbouring words, can form a source of the same table again on the next
    /// pass. Phrase targets are compared after token expansion, since the token
    /// stage runs right after phrases.
    fn drop_overlapping_targets(&mut self, diagnostics: &mut RuleSetDiagnostics) {
        let phrase_offenders = overlapping_entries(&self.phrases, |target| self.expand(target));
        let equivalence_offenders =
            overlapping_entries(&self.equivalences, |target| target.to_vec());

        for source in phrase_offenders {
            self.phrases.remove(&source);
            diagnostics.conflicts.push(RuleConflict::NonConverging { input: source.join(" ") });
        }
        for source in equivalence_offenders {
            self.equivalences.remove(&source);
            diagnostics.conflicts.push(RuleConflict::NonConverging { input: source.join(" ") });
        }
    }

    fn expand(&self, words: &[String]) -> Vec<String> {
        words
            .iter()
            .flat_map(|word| match self.tokens.get(word) {
                Some(target) => target.clone(),
                None => vec![word.clone()],
            })
            .collect()
    }

    /// Removes rule sources whose own normalization never settles. Each round
    /// removes at least one source, so the loop terminates.
    fn drop_non_converging(&mut self, diagnostics: &mut RuleSetDiagnostics) {
        let mut sources: BTreeSet<String> = self
            .phrases
            .entries()
            .chain(self.equivalences.entries())
            .map(|(source, _)| source.join(" "))
            .chain(self.tokens.keys().cloned())
            .collect();

        loop {
            let offenders: Vec<String> =
                sources.iter().filter(|source| !settle(source, self).1).cloned().collect();
            if offenders.is_empty() {
                return;
            }
            for offender in offenders {
                let words = split(&offender);
                self.phrases.remove(&words);
                self.equivalences.remove(&words);
                self.tokens.remove(&offender);
                sources.remove(&offender);
                diagnostics.conflicts.push(RuleConflict::NonConverging { input: offender });
            }
        }
    }

    fn compute_fingerprint(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.extend(
            self.phrases
                .entries()
                .map(|(source, target)| format!("phrase\t{}\t{}", source.join(" "), target.join(" "))),
        );
        lines.extend(
            self.tokens.iter().map(|(source, target)| format!("token\t{source}\t{}", target.join(" "))),
        );
        lines.extend(self.equivalences.entries().map(|(source, target)| {
            format!("equivalence\t{}\t{}", source.join(" "), target.join(" "))
        }));
        lines.extend(self.genders.iter().map(|(noun, gender)| {
            let gender = match gender {
                Gender::Masculine => "m",
                Gender::Feminine => "f",
            };
            format!("gender\t{noun}\t{gender}")
        }));
        lines.extend(self.stoplist.iter().map(|word| format!("stop\t{word}")));
        lines.extend(
            self.series_aliases
                .iter()
                .map(|(variant, canonical)| format!("series\t{variant}\t{canonical}")),
        );
        lines.sort();

        let mut hasher = blake3::Hasher::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn split(text: &str) -> Vec<String> {
    text.split(' ').filter(|word| !word.is_empty()).map(str::to_owned).collect()
}

/// Sources, in sorted order, of the entries whose effective target can rebuild
/// any source of the same table.
fn overlapping_entries(
    table: &PhraseTable,
    effective_target: impl Fn(&[String]) -> Vec<String>,
) -> Vec<Vec<String>> {
    let sources: Vec<&[String]> = table.entries().map(|(source, _)| source).collect();
    let mut offenders: Vec<Vec<String>> = table
        .entries()
        .filter(|(source, target)| source != target)
        .filter(|(_, target)| {
            let target = effective_target(*target);
            sources.iter().any(|source| rebuilds(&target, source))
        })
        .map(|(source, _)| source.to_vec())
        .collect();
    offenders.sort();
    offenders
}

/// True when `source` can match over text that contains `target`: inside it,
/// around it, or straddling either edge of it.
fn rebuilds(target: &[String], source: &[String]) -> bool {
    if target.is_empty() || source.is_empty() {
        return false;
    }
    if contains(target, source) || contains(source, target) {
        return true;
    }
    let widest = target.len().min(source.len());
    (1..widest).any(|width| {
        target[target.len() - width..] == source[..width]
            || target[..width] == source[source.len() - width..]
    })
}

fn contains(haystack: &[String], needle: &[String]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|window| window == needle)
}

fn collect_abbreviations(
    table: &'static str,
    rows: &[Abbreviation],
    candidates: &mut BTreeMap<String, Candidate>,
    diagnostics: &mut RuleSetDiagnostics,
) {
    for row in rows {
        if !row.tier.is_automatic() {
            diagnostics.dropped_low_tier += 1;
            continue;
        }
        let source = fold(&row.from);
        if source.is_empty() {
            continue;
        }
        let candidate = Candidate { target: fold(&row.to), tier: row.tier };
        offer(table, candidates, source, candidate, diagnostics);
    }
}

/// Higher tier wins; equal tiers keep the row seen first.
fn offer(
    table: &'static str,
    candidates: &mut BTreeMap<String, Candidate>,
    source: String,
    candidate: Candidate,
    diagnostics: &mut RuleSetDiagnostics,
) {
    let Some(existing) = candidates.get_mut(&source) else {
        candidates.insert(source, candidate);
        return;
    };
    if existing.target == candidate.target {
        if candidate.tier.rank() > existing.tier.rank() {
            existing.tier = candidate.tier;
        }
        return;
    }

    let (kept, dropped) = if candidate.tier.rank() > existing.tier.rank() {
        let dropped = std::mem::replace(existing, candidate);
        (existing.target.clone(), dropped.target)
    } else {
        (existing.target.clone(), candidate.target)
    };
    diagnostics.conflicts.push(RuleConflict::DuplicateMapping { table, source, kept, dropped });
}

/// Rewrites every token target until it is a fixed point of the map. Sources
/// caught in a cycle are left unmapped.
fn close_token_map(
    raw: &BTreeMap<String, String>,
    diagnostics: &mut RuleSetDiagnostics,
) -> HashMap<String, Vec<String>> {
    let mut closed = HashMap::new();
    let mut reported = BTreeSet::new();
    let limit = raw.len() + 1;

    for (source, target) in raw {
        let mut visited = vec![source.clone()];
        let mut current = target.clone();
        let mut settled = None;
        for _ in 0..limit {
            let next = current
                .split(' ')
                .filter(|word| !word.is_empty())
                .map(|word| raw.get(word).map(String::as_str).unwrap_or(word))
                .collect::<Vec<_>>()
                .join(" ");
            if next == current {
                settled = Some(current);
                break;
            }
            visited.push(current);
            current = next;
        }

        match settled {
            Some(target) if target == *source => {}
            Some(target) => {
                closed.insert(source.clone(), split(&target));
            }
            None => {
                let members: BTreeSet<String> =
                    visited.into_iter().filter(|member| raw.contains_key(member)).collect();
                let members: Vec<String> = members.into_iter().collect();
                if reported.insert(members.clone()) {
                    diagnostics.conflicts.push(RuleConflict::AbbreviationCycle { members });
                }
            }
        }
    }
    closed
}

/// Follows alias chains to their end. A chain that loops settles on the
/// lexicographically smallest member of the loop.
fn close_equivalences(
    raw: &BTreeMap<String, String>,
    diagnostics: &mut RuleSetDiagnostics,
) -> BTreeMap<String, String> {
    let mut closed = BTreeMap::new();
    let mut reported = BTreeSet::new();

    for alias in raw.keys() {
        let mut path: Vec<&str> = vec![alias.as_str()];
        let mut current = alias.as_str();
        let canonical = loop {
            let Some(next) = raw.get(current) else {
                break current.to_owned();
            };
            if let Some(start) = path.iter().position(|seen| *seen == next.as_str()) {
                let members: BTreeSet<String> =
                    path[start..].iter().map(|member| (*member).to_owned()).collect();
                let members: Vec<String> = members.into_iter().collect();
                let canonical = members.first().cloned().unwrap_or_else(|| next.clone());
                if reported.insert(members.clone()) {
                    diagnostics.conflicts.push(RuleConflict::EquivalenceCycle {
                        members,
                        canonical: canonical.clone(),
                    });
                }
                break canonical;
            }
            path.push(next.as_str());
            current = next.as_str();
        };
        if canonical != *alias {
            closed.insert(alias.clone(), canonical);
        }
    }
    closed
}

fn resolve_genders(
    tables: &RuleTables,
    diagnostics: &mut RuleSetDiagnostics,
) -> HashMap<String, Gender> {
    let mut from_tables: BTreeMap<String, Gender> = BTreeMap::new();
    for row in &tables.noun_genders {
        let noun = fold(&row.noun);
        if noun.is_empty() {
            continue;
        }
        match from_tables.get(&noun) {
            None => {
                from_tables.insert(noun, row.gender);
            }
            Some(existing) if *existing == row.gender => {}
            Some(existing) => diagnostics.conflicts.push(RuleConflict::DuplicateMapping {
                table: "noun_genders",
                source: noun,
                kept: format!("{existing:?}").to_lowercase(),
                dropped: format!("{:?}", row.gender).to_lowercase(),
            }),
        }
    }

    let mut genders: HashMap<String, Gender> =
        BUILTIN_NOUNS.iter().map(|(noun, gender)| ((*noun).to_owned(), *gender)).collect();
    genders.extend(from_tables);
    genders
}

fn resolve_series_aliases(
    tables: &RuleTables,
    diagnostics: &mut RuleSetDiagnostics,
) -> HashMap<String, String> {
    let mut aliases: BTreeMap<String, String> = BTreeMap::new();
    let mut claim = |variant: String, canonical: &str, diagnostics: &mut RuleSetDiagnostics| {
        if variant.is_empty() {
            return;
        }
        match aliases.get(&variant) {
            None => {
                aliases.insert(variant, canonical.to_owned());
            }
            Some(existing) if existing == canonical => {}
            Some(existing) => diagnostics.conflicts.push(RuleConflict::DuplicateMapping {
                table: "series_aliases",
                source: variant.clone(),
                kept: existing.clone(),
                dropped: canonical.to_owned(),
            }),
        }
    };

    for row in &tables.series_aliases {
        let canonical = series_key(&row.canonical);
        claim(canonical.clone(), &canonical, diagnostics);
        for variant in &row.variants {
            claim(series_key(variant), &canonical, diagnostics);
        }
    }
    aliases.into_iter().collect()
}
