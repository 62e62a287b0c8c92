use serde::{Deserialize, Serialize};

/// Scoring input. `normalized_description` and `series` are expected to come from
/// the same rule set the index was built with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringQuery {
    pub maker: String,
    pub series: String,
    pub normalized_description: String,
    #[serde(default)]
    pub vehicle_code: Option<String>,
    #[serde(default)]
    pub model_year: Option<i32>,
}

impl ScoringQuery {
    pub fn new(
        maker: impl Into<String>,
        series: impl Into<String>,
        normalized_description: impl Into<String>,
    ) -> Self {
        Self {
            maker: maker.into(),
            series: series.into(),
            normalized_description: normalized_description.into(),
            vehicle_code: None,
            model_year: None,
        }
    }

    pub fn with_vehicle_code(mut self, code: impl Into<String>) -> Self {
        self.vehicle_code = Some(code.into());
        self
    }

    pub fn with_model_year(mut self, year: i32) -> Self {
        self.model_year = Some(year);
        self
    }
}

/// Most to least specific aggregation level used for candidate retrieval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffLevel {
    /// (maker, series, description)
    Specific,
    /// (maker, description)
    Medium,
    /// (description)
    Coarse,
}

impl BackoffLevel {
    pub fn coarser(self) -> Option<Self> {
        match self {
            Self::Specific => Some(Self::Medium),
            Self::Medium => Some(Self::Coarse),
            Self::Coarse => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::Medium => "medium",
            Self::Coarse => "coarse",
        }
    }
}

/// Where the query year sits relative to a candidate's observed envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearOverlap {
    Within,
    Outside,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub part_identifier: String,
    pub probability: f64,
    pub similarity_score: f64,
    pub combined_score: f64,
    /// Calibrated confidence in 0.0..=1.0
    pub confidence: f64,
    pub year_overlap: YearOverlap,
    /// Back-off weighted observation count behind the candidate.
    pub evidence_count: f64,
    pub start_year: i32,
    pub end_year: i32,
    pub global_frequency: u32,
    pub level: BackoffLevel,
    pub matched_description: String,
}
