use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persisted scorer state: a closed tagged union of the two trained modes.
///
/// `item_order` is the row order of the embedding/score tables at build time.
/// Ids in it may later disappear from the catalog; consumers skip stale ids
/// rather than fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TrainedArtifact {
    /// Latent-vector model: prediction is the user/item inner product
    Factorized {
        /// Row i holds the latent vector for `user_order[i]`
        user_embeddings: Vec<Vec<f32>>,
        /// Row i holds the latent vector for `item_order[i]`
        item_embeddings: Vec<Vec<f32>>,
        user_order: Vec<i64>,
        item_order: Vec<i64>,
        trained_at: DateTime<Utc>,
    },
    /// Precomputed quality scores, used when factorization is not possible
    Heuristic {
        /// JSON object keys are strings; the internally-tagged enum buffers
        /// content, so integer keys must be parsed back explicitly on decode.
        #[serde(deserialize_with = "scores_from_string_keys")]
        scores: HashMap<i64, f64>,
        item_order: Vec<i64>,
        trained_at: DateTime<Utc>,
    },
}

fn scores_from_string_keys<'de, D>(deserializer: D) -> Result<HashMap<i64, f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, f64>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            k.parse::<i64>()
                .map(|k| (k, v))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

impl TrainedArtifact {
    pub fn mode(&self) -> &'static str {
        match self {
            TrainedArtifact::Factorized { .. } => "factorized",
            TrainedArtifact::Heuristic { .. } => "heuristic",
        }
    }

    pub fn item_order(&self) -> &[i64] {
        match self {
            TrainedArtifact::Factorized { item_order, .. } => item_order,
            TrainedArtifact::Heuristic { item_order, .. } => item_order,
        }
    }

    /// Row index of a user in the factorized tables, if this artifact has one
    pub fn user_index(&self, user_id: i64) -> Option<usize> {
        match self {
            TrainedArtifact::Factorized { user_order, .. } => {
                user_order.iter().position(|&u| u == user_id)
            }
            TrainedArtifact::Heuristic { .. } => None,
        }
    }

    /// Row index of an item in the factorized tables, if this artifact has one
    pub fn item_index(&self, item_id: i64) -> Option<usize> {
        match self {
            TrainedArtifact::Factorized { item_order, .. } => {
                item_order.iter().position(|&i| i == item_id)
            }
            TrainedArtifact::Heuristic { .. } => None,
        }
    }

    /// User and item latent vectors for the given row indices.
    /// `None` unless both rows exist with matching dimensions.
    pub fn latent_pair(&self, user_idx: usize, item_idx: usize) -> Option<(&[f32], &[f32])> {
        match self {
            TrainedArtifact::Factorized {
                user_embeddings,
                item_embeddings,
                ..
            } => {
                let user = user_embeddings.get(user_idx)?;
                let item = item_embeddings.get(item_idx)?;
                if user.len() != item.len() {
                    return None;
                }
                Some((user.as_slice(), item.as_slice()))
            }
            TrainedArtifact::Heuristic { .. } => None,
        }
    }
}
