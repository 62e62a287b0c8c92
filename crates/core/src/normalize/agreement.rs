use std::collections::{HashMap, HashSet};

use crate::rules::Gender;

/// Positional adjectives whose ending follows the gender of the nearby noun.
const ADJECTIVE_STEMS: [&str; 4] = ["delanter", "traser", "izquierd", "derech"];

const SEARCH_WINDOW: usize = 5;

pub(crate) const BUILTIN_NOUNS: [(&str, Gender); 14] = [
    ("paragolpes", Gender::Masculine),
    ("faro", Gender::Masculine),
    ("espejo", Gender::Masculine),
    ("guardabarros", Gender::Masculine),
    ("capo", Gender::Masculine),
    ("stop", Gender::Masculine),
    ("parabrisas", Gender::Masculine),
    ("puerta", Gender::Feminine),
    ("luz", Gender::Feminine),
    ("tapa", Gender::Feminine),
    ("farola", Gender::Feminine),
    ("moldura", Gender::Feminine),
    ("rejilla", Gender::Feminine),
    ("manija", Gender::Feminine),
];

pub(crate) const DEFAULT_STOPLIST: [&str; 17] = [
    "de", "del", "la", "el", "los", "las", "con", "para", "por", "y", "en", "sin", "a", "al",
    "un", "una", "o",
];

pub(crate) fn agree(
    tokens: Vec<String>,
    genders: &HashMap<String, Gender>,
    stoplist: &HashSet<String>,
) -> Vec<String> {
    let mut agreed = tokens.clone();
    for (index, token) in tokens.iter().enumerate() {
        let Some((stem, plural)) = parse_adjective(token) else {
            continue;
        };
        let Some(gender) = nearest_noun_gender(&tokens, index, genders, stoplist) else {
            continue;
        };
        let ending = match gender {
            Gender::Masculine => "o",
            Gender::Feminine => "a",
        };
        agreed[index] = format!("{stem}{ending}{}", if plural { "s" } else { "" });
    }
    agreed
}

pub(crate) fn is_adjective(token: &str) -> bool {
    parse_adjective(token).is_some()
}

fn parse_adjective(token: &str) -> Option<(&'static str, bool)> {
    ADJECTIVE_STEMS.iter().find_map(|stem| match token.strip_prefix(stem)? {
        "o" | "a" => Some((*stem, false)),
        "os" | "as" => Some((*stem, true)),
        _ => None,
    })
}

/// Preceding tokens are searched first, then following ones.
fn nearest_noun_gender(
    tokens: &[String],
    index: usize,
    genders: &HashMap<String, Gender>,
    stoplist: &HashSet<String>,
) -> Option<Gender> {
    let preceding = tokens[..index].iter().rev().take(SEARCH_WINDOW);
    let following = tokens[index + 1..].iter().take(SEARCH_WINDOW);
    preceding
        .chain(following)
        .filter(|token| !stoplist.contains(token.as_str()) && !is_adjective(token))
        .find_map(|token| noun_gender(token, genders))
}

/// Plural nouns are looked up through their singular form; the token itself is
/// never rewritten.
fn noun_gender(token: &str, genders: &HashMap<String, Gender>) -> Option<Gender> {
    genders
        .get(token)
        .or_else(|| token.strip_suffix("es").and_then(|singular| genders.get(singular)))
        .or_else(|| token.strip_suffix('s').and_then(|singular| genders.get(singular)))
        .copied()
}
