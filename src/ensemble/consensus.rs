//! Weighted-vote fusion of validated provider analyses.
//!
//! - Categorical fields: each provider casts its priority weight for its
//!   value; the highest summed weight wins. Ties go to the value seen first
//!   in provider order (the registry orders providers by descending weight).
//! - Confidence: `Σ(confidence × weight) / Σ(weight)` over contributors only.
//! - `action_required`: strict majority by head count among providers that
//!   supplied it.
//! - `suggested_actions`: union, de-duplicated, first-seen order.
//! - Summary: the longest one.
//!
//! Weights are scaled by the largest one before summing, so finite weights
//! never overflow. One contributor is passed through with only
//! `summary`, `action_required` and `suggested_actions` normalized.

use tracing::debug;
use uuid::Uuid;

use super::types::{Analysis, ConsensusResult, ProviderResult};
use crate::error::ConsensusError;

/// Summary used when no contributor supplied one.
pub const NO_SUMMARY: &str = "No summary available";

/// Split a round's results and fuse the successful ones.
pub fn build_consensus(
    correlation_id: Uuid,
    results: Vec<ProviderResult>,
) -> Result<ConsensusResult, ConsensusError> {
    let (contributions, excluded): (Vec<_>, Vec<_>) =
        results.into_iter().partition(ProviderResult::is_success);

    let analysis = fuse(&contributions)?;
    debug!(
        correlation_id = %correlation_id,
        contributors = contributions.len(),
        excluded = excluded.len(),
        category = %analysis.category,
        confidence = analysis.confidence,
        "Consensus reached"
    );

    Ok(ConsensusResult {
        correlation_id,
        providers_used: contributions.len(),
        analysis,
        contributions,
        excluded,
    })
}

/// Fuse the analyses of successful results. Failed results are ignored.
pub fn fuse(results: &[ProviderResult]) -> Result<Analysis, ConsensusError> {
    let votes: Vec<(&Analysis, f64)> = results
        .iter()
        .filter_map(|r| r.analysis().map(|a| (a, r.priority_weight)))
        .collect();

    match votes.as_slice() {
        [] => Err(ConsensusError::NoResults),
        [(only, _)] => Ok(Analysis {
            summary: Some(only.summary.clone().unwrap_or_else(|| NO_SUMMARY.to_string())),
            action_required: Some(only.action_required.unwrap_or(false)),
            suggested_actions: dedup_actions(only.suggested_actions.iter()),
            ..(*only).clone()
        }),
        _ => Ok(fuse_many(&scale_weights(votes))),
    }
}

/// Divide every weight by the largest one; all weights become 1.0 when
/// that is not a positive finite number.
fn scale_weights(votes: Vec<(&Analysis, f64)>) -> Vec<(&Analysis, f64)> {
    let max = votes.iter().map(|(_, w)| *w).fold(0.0, f64::max);
    votes
        .into_iter()
        .map(|(a, w)| {
            let scaled = if max.is_finite() && max > 0.0 { w / max } else { 1.0 };
            (a, scaled)
        })
        .collect()
}

fn fuse_many(votes: &[(&Analysis, f64)]) -> Analysis {
    // `votes` is non-empty, so every vote below has a winner.
    let category = weighted_vote(votes.iter().map(|(a, w)| (a.category, *w)));
    let priority = weighted_vote(votes.iter().map(|(a, w)| (a.priority, *w)));
    let sentiment = weighted_vote(votes.iter().map(|(a, w)| (a.sentiment, *w)));

    Analysis {
        category: category.unwrap_or(votes[0].0.category),
        priority: priority.unwrap_or(votes[0].0.priority),
        sentiment: sentiment.unwrap_or(votes[0].0.sentiment),
        confidence: round3(weighted_confidence(votes)),
        summary: Some(longest_summary(votes)),
        action_required: Some(majority_action_required(votes)),
        suggested_actions: dedup_actions(votes.iter().flat_map(|(a, _)| a.suggested_actions.iter())),
    }
}

/// Highest summed weight wins; ties resolve to the first-seen value.
pub fn weighted_vote<T: Copy + PartialEq>(votes: impl IntoIterator<Item = (T, f64)>) -> Option<T> {
    let mut tally: Vec<(T, f64)> = Vec::new();
    for (value, weight) in votes {
        match tally.iter_mut().find(|(v, _)| *v == value) {
            Some((_, total)) => *total += weight,
            None => tally.push((value, weight)),
        }
    }

    let mut best: Option<(T, f64)> = None;
    for (value, total) in tally {
        if best.is_none_or(|(_, top)| total > top) {
            best = Some((value, total));
        }
    }
    best.map(|(value, _)| value)
}

fn weighted_confidence(votes: &[(&Analysis, f64)]) -> f64 {
    let (weighted, total) = votes
        .iter()
        .fold((0.0, 0.0), |(sum, weights), (a, w)| (sum + a.confidence * w, weights + w));
    // Result stays in [min, max] of the inputs, modulo float error.
    let lo = votes.iter().map(|(a, _)| a.confidence).fold(f64::INFINITY, f64::min);
    let hi = votes.iter().map(|(a, _)| a.confidence).fold(f64::NEG_INFINITY, f64::max);
    (weighted / total).clamp(lo, hi)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn majority_action_required(votes: &[(&Analysis, f64)]) -> bool {
    let supplied: Vec<bool> = votes.iter().filter_map(|(a, _)| a.action_required).collect();
    let yes = supplied.iter().filter(|b| **b).count();
    yes * 2 > supplied.len()
}

fn longest_summary(votes: &[(&Analysis, f64)]) -> String {
    let mut best: Option<&str> = None;
    for summary in votes.iter().filter_map(|(a, _)| a.summary.as_deref()) {
        if best.is_none_or(|b| summary.chars().count() > b.chars().count()) {
            best = Some(summary);
        }
    }
    best.unwrap_or(NO_SUMMARY).to_string()
}

fn dedup_actions<'a>(actions: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for action in actions {
        let action = action.trim();
        if !action.is_empty() && !seen.iter().any(|s| s == action) {
            seen.push(action.to_string());
        }
    }
    seen
}
