use serde::{Deserialize, Serialize};

/// Named signal weights derived from the user's rating history.
/// Weights aim for a sum of at most 1.0; the user-preference residual
/// absorbs rounding rather than the sum being enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureWeights {
    pub genre: f64,
    pub rating: f64,
    pub popularity: f64,
    pub user_preference: f64,
}

impl FeatureWeights {
    /// Fixed split for users with no interaction history
    pub fn cold_start() -> Self {
        Self {
            genre: 0.3,
            rating: 0.3,
            popularity: 0.2,
            user_preference: 0.2,
        }
    }

    pub fn sum(&self) -> f64 {
        self.genre + self.rating + self.popularity + self.user_preference
    }

    /// Name of the dominant weight, for templated explanations
    pub fn dominant(&self) -> &'static str {
        let pairs = [
            ("genre match", self.genre),
            ("rating quality", self.rating),
            ("popularity", self.popularity),
            ("user preference", self.user_preference),
        ];
        pairs
            .iter()
            .fold(("user preference", f64::MIN), |best, &(name, w)| {
                if w > best.1 {
                    (name, w)
                } else {
                    best
                }
            })
            .0
    }
}

/// Direction of a local feature deviation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

/// One local deviation-from-corpus explanation: how a single observed
/// feature of the target item pushed the score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalExplanation {
    pub feature: String,
    pub observed_value: String,
    pub impact: f64,
    pub direction: Direction,
}

/// Latent-dimension contributions from a factorized artifact.
/// Present only when both a trained factorized model and a user/item row
/// mapping exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingContributions {
    /// Indices of the top dimensions by absolute contribution, largest first
    pub top_dimensions: Vec<usize>,
    /// Signed contributions for those dimensions
    pub top_values: Vec<f64>,
    /// Raw inner-product prediction score
    pub prediction_score: f64,
}

/// Composite per-request explanation. Built fresh for every explain call,
/// never persisted. Any extractor may be absent; `combined_score` sums only
/// the signals that are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributionRecord {
    pub feature_weights: Option<FeatureWeights>,
    pub local_explanations: Vec<LocalExplanation>,
    pub embedding_contributions: Option<EmbeddingContributions>,
    pub combined_score: f64,
}

impl AttributionRecord {
    /// Weighted combination: 0.4 * weight sum + 0.3 * impact sum +
    /// 0.3 * embedding prediction. Absent terms are omitted, not zero-filled.
    pub fn combine(
        feature_weights: Option<FeatureWeights>,
        local_explanations: Vec<LocalExplanation>,
        embedding_contributions: Option<EmbeddingContributions>,
    ) -> Self {
        let mut combined_score = 0.0;
        if let Some(weights) = &feature_weights {
            combined_score += 0.4 * weights.sum();
        }
        if !local_explanations.is_empty() {
            let impact_sum: f64 = local_explanations.iter().map(|e| e.impact).sum();
            combined_score += 0.3 * impact_sum;
        }
        if let Some(emb) = &embedding_contributions {
            combined_score += 0.3 * emb.prediction_score;
        }

        Self {
            feature_weights,
            local_explanations,
            embedding_contributions,
            combined_score,
        }
    }
}
