//! Values flowing into and out of [`CandidateResolver`](crate::CandidateResolver).
//!
//! All of these are request-scoped and serialize in the camelCase shape the
//! itinerary layer consumes.

use serde::{Deserialize, Serialize};

/// A place mention pulled out of fetched content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub query: String,
    pub source_canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Extractor confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Position in the source media (e.g. a video), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<u64>,
}

impl Candidate {
    pub fn new(query: impl Into<String>, source_canonical_url: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source_canonical_url: source_canonical_url.into(),
            evidence: None,
            confidence: None,
            timestamp_seconds: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Where the trip is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Destination {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            country: Some(country.into()),
        }
    }

    /// City and country, if both are present and non-blank.
    pub fn parts(&self) -> Option<(&str, &str)> {
        let city = self.city.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let country = self.country.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((city, country))
    }
}

/// A change for the itinerary layer to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    #[serde(rename = "add_place")]
    AddPlace(AddPlaceOperation),
}

impl Operation {
    pub fn place_id(&self) -> &str {
        match self {
            Operation::AddPlace(op) => &op.place_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPlaceOperation {
    pub place_id: String,
    /// The mention as written in the source.
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Left unscheduled; always serialized as `null`.
    pub date: Option<String>,
}

/// Links a committed place back to the content that suggested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub place_id: String,
    pub source_canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<u64>,
}

/// One concrete choice offered for an ambiguous mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationOption {
    pub place_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Machine-actionable form of a clarification, for rendering choice buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClarification {
    pub query: String,
    pub source_canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub options: Vec<ClarificationOption>,
}

/// Everything one resolution pass produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub operations: Vec<Operation>,
    pub attributions: Vec<Attribution>,
    /// User-facing questions, at most five.
    pub clarifications: Vec<String>,
    pub pending_clarifications: Vec<PendingClarification>,
    pub dropped_count: usize,
}
