//! Not-found gate.

use crate::config::RetrievalConfig;
use crate::retrieval::RetrievalResult;

/// Whether retrieved evidence is strong enough to generate an answer.
///
/// Insufficient when nothing was retrieved or the best score is below
/// `threshold`. A NaN score never passes.
pub fn is_sufficient(result: &RetrievalResult, threshold: f32) -> bool {
    match result.top_score() {
        Some(score) => score >= threshold,
        None => false,
    }
}

/// [`is_sufficient`] against the threshold for the result's score scale.
pub fn is_sufficient_for(result: &RetrievalResult, config: &RetrievalConfig) -> bool {
    is_sufficient(result, config.threshold_for(result.score_kind))
}
