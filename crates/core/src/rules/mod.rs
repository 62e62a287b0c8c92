//! Rule tables consumed by the normalizer.
//!
//! Tables arrive as one TOML document curated outside this crate. Loading only
//! validates shape; [`NormalizationRuleSet::resolve`] turns the validated rows
//! into the immutable lookup structures used at normalization time.

mod resolve;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

pub use resolve::{NormalizationRuleSet, RuleSetDiagnostics};

/// Confidence tier of an abbreviation row. Only `High` and `Medium` rows are
/// applied automatically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbbreviationTier {
    #[default]
    High,
    Medium,
    Low,
}

impl AbbreviationTier {
    pub fn is_automatic(self) -> bool {
        !matches!(self, Self::Low)
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "alta" => Some(Self::High),
            "medium" | "media" => Some(Self::Medium),
            "low" | "baja" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Masculine,
    Feminine,
}

impl Gender {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "m" | "masculine" | "masculino" | "male" => Some(Self::Masculine),
            "f" | "feminine" | "femenino" | "female" => Some(Self::Feminine),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Abbreviation {
    pub from: String,
    pub to: String,
    pub tier: AbbreviationTier,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivalenceGroup {
    pub canonical: String,
    pub aliases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NounGender {
    pub noun: String,
    pub gender: Gender,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesAlias {
    pub canonical: String,
    pub variants: Vec<String>,
}

/// Validated, still unresolved rule tables in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleTables {
    pub phrase_abbreviations: Vec<Abbreviation>,
    pub token_abbreviations: Vec<Abbreviation>,
    pub equivalences: Vec<EquivalenceGroup>,
    pub noun_genders: Vec<NounGender>,
    pub series_aliases: Vec<SeriesAlias>,
    pub stoplist: Vec<String>,
}

impl RuleTables {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigurationError::ReadFile { path: path.to_path_buf(), source })?;
        let file = toml::from_str::<RuleTablesFile>(&raw)
            .map_err(|source| ConfigurationError::ParseFile { path: path.to_path_buf(), source })?;
        file.validate()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigurationError> {
        toml::from_str::<RuleTablesFile>(raw)?.validate()
    }

    pub fn with_phrase_abbreviation(mut self, from: &str, to: &str) -> Self {
        self.phrase_abbreviations.push(Abbreviation {
            from: from.to_owned(),
            to: to.to_owned(),
            tier: AbbreviationTier::High,
        });
        self
    }

    pub fn with_token_abbreviation(self, from: &str, to: &str) -> Self {
        self.with_tiered_token_abbreviation(from, to, AbbreviationTier::High)
    }

    pub fn with_tiered_token_abbreviation(
        mut self,
        from: &str,
        to: &str,
        tier: AbbreviationTier,
    ) -> Self {
        self.token_abbreviations.push(Abbreviation { from: from.to_owned(), to: to.to_owned(), tier });
        self
    }

    pub fn with_equivalence(mut self, canonical: &str, aliases: &[&str]) -> Self {
        self.equivalences.push(EquivalenceGroup {
            canonical: canonical.to_owned(),
            aliases: aliases.iter().map(|alias| (*alias).to_owned()).collect(),
        });
        self
    }

    pub fn with_noun_gender(mut self, noun: &str, gender: Gender) -> Self {
        self.noun_genders.push(NounGender { noun: noun.to_owned(), gender });
        self
    }

    pub fn with_series_alias(mut self, canonical: &str, variants: &[&str]) -> Self {
        self.series_aliases.push(SeriesAlias {
            canonical: canonical.to_owned(),
            variants: variants.iter().map(|variant| (*variant).to_owned()).collect(),
        });
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct RuleTablesFile {
    #[serde(default)]
    phrase_abbreviations: Vec<AbbreviationRow>,
    #[serde(default)]
    token_abbreviations: Vec<AbbreviationRow>,
    #[serde(default)]
    equivalences: Vec<GroupRow>,
    #[serde(default)]
    noun_genders: Vec<GenderRow>,
    #[serde(default)]
    series_aliases: Vec<SeriesRow>,
    #[serde(default)]
    stoplist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AbbreviationRow {
    from: Option<String>,
    to: Option<String>,
    tier: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupRow {
    canonical: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenderRow {
    noun: Option<String>,
    gender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SeriesRow {
    canonical: Option<String>,
    #[serde(default)]
    variants: Vec<String>,
}

impl RuleTablesFile {
    fn validate(self) -> Result<RuleTables, ConfigurationError> {
        Ok(RuleTables {
            phrase_abbreviations: validate_abbreviations(
                "phrase_abbreviations",
                self.phrase_abbreviations,
            )?,
            token_abbreviations: validate_abbreviations(
                "token_abbreviations",
                self.token_abbreviations,
            )?,
            equivalences: self
                .equivalences
                .into_iter()
                .enumerate()
                .map(|(index, row)| {
                    Ok(EquivalenceGroup {
                        canonical: required("equivalences", index + 1, "canonical", row.canonical)?,
                        aliases: non_empty(row.aliases),
                    })
                })
                .collect::<Result<_, ConfigurationError>>()?,
            noun_genders: self
                .noun_genders
                .into_iter()
                .enumerate()
                .map(|(index, row)| {
                    let noun = required("noun_genders", index + 1, "noun", row.noun)?;
                    let value = required("noun_genders", index + 1, "gender", row.gender)?;
                    let gender =
                        Gender::parse(&value).ok_or_else(|| ConfigurationError::InvalidValue {
                            table: "noun_genders",
                            row: index + 1,
                            column: "gender",
                            value,
                        })?;
                    Ok(NounGender { noun, gender })
                })
                .collect::<Result<_, ConfigurationError>>()?,
            series_aliases: self
                .series_aliases
                .into_iter()
                .enumerate()
                .map(|(index, row)| {
                    Ok(SeriesAlias {
                        canonical: required("series_aliases", index + 1, "canonical", row.canonical)?,
                        variants: non_empty(row.variants),
                    })
                })
                .collect::<Result<_, ConfigurationError>>()?,
            stoplist: non_empty(self.stoplist),
        })
    }
}

fn validate_abbreviations(
    table: &'static str,
    rows: Vec<AbbreviationRow>,
) -> Result<Vec<Abbreviation>, ConfigurationError> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let from = required(table, index + 1, "from", row.from)?;
            let to = required(table, index + 1, "to", row.to)?;
            let tier = match row.tier {
                None => AbbreviationTier::default(),
                Some(value) => AbbreviationTier::parse(&value).ok_or_else(|| {
                    ConfigurationError::InvalidValue { table, row: index + 1, column: "tier", value }
                })?,
            };
            Ok(Abbreviation { from, to, tier })
        })
        .collect()
}

fn required(
    table: &'static str,
    row: usize,
    column: &'static str,
    value: Option<String>,
) -> Result<String, ConfigurationError> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigurationError::MissingColumn { table, row, column })
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}
