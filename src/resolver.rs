//! Turning extracted place mentions into itinerary operations.
//!
//! Every candidate is committed (an operation, or an extra attribution on one),
//! asked about, or dropped. A failed search both drops the candidate and asks for a
//! map link. Only a failed destination geocode fails the whole batch.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::model::{
    AddPlaceOperation, Attribution, Candidate, ClarificationOption, Destination, Operation,
    PendingClarification, ResolveOutcome,
};
use crate::places::{Coordinates, Geocoder, PlaceSearch, PlaceSearchResult};
use crate::score::score;

/// Prefix on place resource names, stripped to get the bare id.
const PLACE_RESOURCE_PREFIX: &str = "places/";

/// Input for one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub destination: Destination,
    pub candidates: Vec<Candidate>,
    /// Overrides the configured operation cap.
    pub max_operations: Option<usize>,
}

/// Resolves candidates against a geocoder and a place search, sequentially.
pub struct CandidateResolver {
    geocoder: Arc<dyn Geocoder>,
    search: Arc<dyn PlaceSearch>,
    config: ResolverConfig,
}

/// A search result with its match score.
#[derive(Debug, Clone)]
struct Scored {
    result: PlaceSearchResult,
    score: f64,
}

/// What happened to one candidate.
#[derive(Debug)]
enum Decision {
    Dropped(&'static str),
    SearchFailed,
    NotFound,
    Ambiguous(Vec<Scored>),
    Accepted(Scored),
}

/// State threaded through the candidate loop.
#[derive(Debug, Default)]
struct Accumulator {
    operations: Vec<Operation>,
    committed: HashSet<String>,
    attributions: Vec<Attribution>,
    clarifications: Vec<String>,
    pending: Vec<PendingClarification>,
    dropped: usize,
}

impl CandidateResolver {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        search: Arc<dyn PlaceSearch>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            geocoder,
            search,
            config,
        }
    }

    /// Resolve every candidate in `request`.
    pub async fn resolve(&self, request: ResolveRequest) -> ResolveOutcome {
        let total = request.candidates.len();
        let max_operations = request
            .max_operations
            .unwrap_or(self.config.max_operations);

        let Some((city, country)) = request.destination.parts() else {
            return short_circuit(
                "Which city and country is this trip to? I need the destination before I \
                 can add places from this link."
                    .to_string(),
                total,
            );
        };

        let center = match self.geocoder.geocode(city, country).await {
            Ok(center) => center,
            Err(e) => {
                warn!(city, country, error = %e, "destination geocode failed");
                return short_circuit(
                    format!(
                        "I couldn't look up {}, {} right now. Please try again, or paste \
                         direct map links for the places you want to add.",
                        city, country
                    ),
                    total,
                );
            }
        };

        let mut acc = Accumulator::default();
        let mut candidates = request.candidates.into_iter();
        let considered = candidates.by_ref().take(self.config.max_candidates);

        for candidate in considered {
            if acc.operations.len() >= max_operations {
                acc.dropped += 1;
                continue;
            }
            let decision = self.decide(&candidate, center).await;
            acc = self.apply(acc, candidate, decision, city);
        }
        acc.dropped += candidates.count();

        let outcome = self.finish(acc);
        info!(
            candidates = total,
            operations = outcome.operations.len(),
            clarifications = outcome.clarifications.len(),
            dropped = outcome.dropped_count,
            "candidates resolved"
        );
        outcome
    }

    async fn decide(&self, candidate: &Candidate, center: Coordinates) -> Decision {
        if let Some(reason) = self.reject_reason(candidate) {
            return Decision::Dropped(reason);
        }

        let results = match self
            .search
            .search_text(candidate.query.trim(), center, self.config.search_radius_m)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(query = %candidate.query, error = %e, "place search failed");
                return Decision::SearchFailed;
            }
        };

        let mut ranked: Vec<Scored> = results
            .into_iter()
            .take(self.config.max_results)
            .map(|result| Scored {
                score: score(&candidate.query, &result.name),
                result,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        match ranked.len() {
            0 => Decision::NotFound,
            1 => Decision::Accepted(ranked.remove(0)),
            _ if self.is_confident(&ranked) => Decision::Accepted(ranked.remove(0)),
            _ => Decision::Ambiguous(ranked),
        }
    }

    fn reject_reason(&self, candidate: &Candidate) -> Option<&'static str> {
        let query = candidate.query.trim();
        if query.chars().count() < 2 {
            return Some("query too short");
        }
        if looks_like_url(query) {
            return Some("query is a URL");
        }
        if candidate
            .confidence
            .is_some_and(|c| c < self.config.min_confidence)
        {
            return Some("low confidence");
        }
        None
    }

    /// Top score high enough and clearly ahead of the runner-up.
    fn is_confident(&self, ranked: &[Scored]) -> bool {
        match ranked {
            [top, runner_up, ..] => {
                top.score >= self.config.accept_score
                    && top.score - runner_up.score >= self.config.accept_margin - f64::EPSILON
            }
            _ => false,
        }
    }

    fn apply(
        &self,
        mut acc: Accumulator,
        candidate: Candidate,
        decision: Decision,
        city: &str,
    ) -> Accumulator {
        match decision {
            Decision::Dropped(reason) => {
                debug!(query = %candidate.query, reason, "candidate dropped");
                acc.dropped += 1;
            }
            Decision::SearchFailed => {
                acc.dropped += 1;
                acc.clarifications.push(format!(
                    "I couldn't search for \"{}\" right now. Could you paste a direct map link for it?",
                    candidate.query.trim()
                ));
            }
            Decision::NotFound => acc.clarifications.push(format!(
                "I couldn't find \"{}\" near {}. Could you paste a direct map link for it?",
                candidate.query.trim(),
                city
            )),
            Decision::Ambiguous(ranked) => {
                let options: Vec<ClarificationOption> = ranked
                    .into_iter()
                    .take(self.config.max_options)
                    .map(|scored| ClarificationOption {
                        place_id: normalize_place_id(&scored.result.place_id).to_string(),
                        name: scored.result.name,
                        address: scored.result.address,
                    })
                    .collect();
                debug!(query = %candidate.query, options = options.len(), "candidate ambiguous");

                acc.clarifications
                    .push(ambiguity_question(candidate.query.trim(), &options));

                if acc.pending.is_empty() {
                    acc.pending.push(PendingClarification {
                        query: candidate.query,
                        source_canonical_url: candidate.source_canonical_url,
                        evidence: candidate.evidence,
                        options,
                    });
                }
            }
            Decision::Accepted(scored) => {
                let place_id = normalize_place_id(&scored.result.place_id).to_string();
                debug!(query = %candidate.query, %place_id, score = scored.score, "candidate accepted");

                if acc.committed.insert(place_id.clone()) {
                    acc.operations.push(Operation::AddPlace(AddPlaceOperation {
                        place_id: place_id.clone(),
                        query: candidate.query,
                        name: Some(scored.result.name),
                        date: None,
                    }));
                }

                acc.attributions.push(Attribution {
                    place_id,
                    source_canonical_url: candidate.source_canonical_url,
                    snippet: candidate.evidence,
                    timestamp_seconds: candidate.timestamp_seconds,
                });
            }
        }
        acc
    }

    fn finish(&self, mut acc: Accumulator) -> ResolveOutcome {
        acc.clarifications.truncate(self.config.max_clarifications);
        ResolveOutcome {
            operations: acc.operations,
            attributions: acc.attributions,
            clarifications: acc.clarifications,
            pending_clarifications: acc.pending,
            dropped_count: acc.dropped,
        }
    }
}

fn short_circuit(question: String, dropped: usize) -> ResolveOutcome {
    ResolveOutcome {
        clarifications: vec![question],
        dropped_count: dropped,
        ..ResolveOutcome::default()
    }
}

/// Strip a leading `places/` resource prefix.
pub fn normalize_place_id(place_id: &str) -> &str {
    place_id
        .strip_prefix(PLACE_RESOURCE_PREFIX)
        .unwrap_or(place_id)
}

fn looks_like_url(query: &str) -> bool {
    let lower = query.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
}

fn ambiguity_question(query: &str, options: &[ClarificationOption]) -> String {
    let listed: Vec<String> = options
        .iter()
        .enumerate()
        .map(|(i, option)| match &option.address {
            Some(address) => format!("{}) {} ({})", i + 1, option.name, address),
            None => format!("{}) {}", i + 1, option.name),
        })
        .collect();
    format!(
        "\"{}\" could be several places: {}. Which one did you mean?",
        query,
        listed.join("; ")
    )
}
