use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw image bytes held between download and base64 encoding. Never persisted.
pub type RawImage = Vec<u8>;

/// One photo descriptor returned by the photo library search.
/// Base URLs are transient; they expire roughly an hour after the search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub filename: String,
    pub base_url: String,
    #[serde(default)]
    pub media_metadata: Option<MediaMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

impl MediaItem {
    /// Full-resolution download URL. Without the `=d` suffix the base URL
    /// serves a scaled-down preview.
    pub fn download_url(&self) -> String {
        format!("{}=d", self.base_url)
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.media_metadata.as_ref().and_then(|m| m.creation_time)
    }
}

/// Date restriction for a photo search: a single day or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateQuery {
    On(NaiveDate),
    Between(NaiveDate, NaiveDate),
}

impl std::fmt::Display for DateQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateQuery::On(day) => write!(f, "{}", day),
            DateQuery::Between(start, end) => write!(f, "{}..{}", start, end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingDegree {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ProcessingDegree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingDegree::Low => "low",
            ProcessingDegree::Medium => "medium",
            ProcessingDegree::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Nutritional estimate for one food item in a photo. The snake_case field
/// names are an external contract: the model's output schema and the fixture
/// JSON both use them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysis {
    pub readable_name: String,
    pub protein_g: u32,
    pub fat_g: u32,
    pub carbohydrate_g: u32,
    pub fibre_g: u32,
    pub total_mass_g: u32,
    pub total_kcal: u32,
    pub total_health_score: u8,
    pub processing_degree: ProcessingDegree,
    pub components: Vec<String>,
}

impl FoodAnalysis {
    /// Range checks the unsigned field types cannot express on their own.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.total_health_score) {
            return Err(format!(
                "total_health_score {} outside 1..=10 for '{}'",
                self.total_health_score, self.readable_name
            ));
        }
        Ok(())
    }
}

/// One analysis call's worth of results, one entry per detected food item.
/// An empty list is a valid outcome (no food in the photos) and is not the
/// same thing as a refusal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysisResult {
    pub foods: Vec<FoodAnalysis>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The structured response needed more tokens than the configured budget.
    #[error("response truncated at {max_tokens} output tokens; raise FROODS_MAX_OUTPUT_TOKENS or send fewer images per call")]
    LengthLimit { max_tokens: u32 },
    #[error("vision API error ({status}): {detail}")]
    Api {
        status: reqwest::StatusCode,
        detail: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

/// Terminal state of one `analyze` call. Exactly one variant per call;
/// callers pattern-match instead of catching exceptions.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Success(FoodAnalysisResult),
    Refusal(String),
    Failed(AnalysisError),
}

/// Actual-vs-expected record for one mismatched field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldDiff {
    Numeric {
        actual: i64,
        expected: i64,
        difference: i64,
    },
    Text {
        actual: String,
        expected: String,
    },
    Components {
        actual: Vec<String>,
        expected: Vec<String>,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Field name -> diff, ordered so reports print deterministically.
pub type Differences = BTreeMap<&'static str, FieldDiff>;
