//! Top-k ranking of classifier probabilities.

use std::num::NonZeroUsize;

use skinsight_core::Prediction;

use crate::error::RankingError;
use crate::labels::LabelRegistry;

/// Pair probabilities with labels, convert to percentages, and keep the top `k`.
///
/// Sorted by descending confidence; equal confidences keep registry order.
/// `top_k` larger than the registry is clamped.
pub fn rank(
    probabilities: &[f32],
    labels: &LabelRegistry,
    top_k: NonZeroUsize,
) -> Result<Vec<Prediction>, RankingError> {
    if probabilities.len() != labels.len() {
        return Err(RankingError::LabelMismatch {
            expected: labels.len(),
            actual: probabilities.len(),
        });
    }

    let mut ranked: Vec<Prediction> = labels
        .iter()
        .zip(probabilities)
        .map(|(name, &p)| Prediction {
            name: name.to_string(),
            // `+ 0.0` folds -0.0 into 0.0 so the stable sort sees one zero.
            confidence: f64::from(p) * 100.0 + 0.0,
        })
        .collect();

    // Stable sort: ties stay in registry order.
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked.truncate(top_k.get());
    Ok(ranked)
}
