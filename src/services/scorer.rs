/// Scorer chain
///
/// Single ranking entry point over an ordered set of strategies: the trained
/// factorized model, a content-similarity fallback, and a popularity
/// fallback. Each stage returns `Some(ranking)` or `None`; the chain iterates
/// until one succeeds. Every stage is total — internal failures degrade to
/// the next stage, never to the caller.
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::EntityStore,
    models::{Movie, TrainedArtifact},
};

use super::similarity::TfidfVectorizer;
use super::trainer::ArtifactHandle;

pub struct ScorerChain {
    store: Arc<dyn EntityStore>,
    artifacts: Arc<ArtifactHandle>,
    liked_threshold: i32,
}

impl ScorerChain {
    pub fn new(
        store: Arc<dyn EntityStore>,
        artifacts: Arc<ArtifactHandle>,
        liked_threshold: i32,
    ) -> Self {
        Self {
            store,
            artifacts,
            liked_threshold,
        }
    }

    /// Top-k ranked movies for a user. Always returns between 0 and k items,
    /// with no duplicates; fewer than k is acceptable after stale-id skips.
    pub async fn top_n(&self, user_id: i64, k: usize) -> Vec<Movie> {
        if k == 0 {
            return Vec::new();
        }

        let artifact = self.artifacts.current().await;

        if let Some(artifact) = &artifact {
            if let Some(ranked) = self.factorized_stage(artifact, user_id, k).await {
                tracing::debug!(user_id, returned = ranked.len(), stage = "factorized", "Ranked");
                return ranked;
            }
        }

        if let Some(ranked) = self.content_stage(user_id, k).await {
            tracing::debug!(user_id, returned = ranked.len(), stage = "content", "Ranked");
            return ranked;
        }

        let ranked = self.popularity_stage(k).await;
        tracing::debug!(user_id, returned = ranked.len(), stage = "popularity", "Ranked");
        ranked
    }

    /// Inner-product ranking from the factorized artifact. Inapplicable when
    /// the mode is heuristic or the user is unknown to the trained model.
    async fn factorized_stage(
        &self,
        artifact: &TrainedArtifact,
        user_id: i64,
        k: usize,
    ) -> Option<Vec<Movie>> {
        let user_idx = artifact.user_index(user_id)?;
        let item_order = artifact.item_order();

        let liked: HashSet<i64> = match self.store.list_ratings(user_id).await {
            Ok(ratings) => ratings
                .iter()
                .filter(|r| r.value >= self.liked_threshold)
                .map(|r| r.movie_id)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Factorized stage failed to read ratings");
                return None;
            }
        };

        let mut scored: Vec<(usize, f32)> = (0..item_order.len())
            .filter_map(|item_idx| {
                let (user, item) = artifact.latent_pair(user_idx, item_idx)?;
                let score: f32 = user.iter().zip(item).map(|(u, i)| u * i).sum();
                Some((item_idx, score))
            })
            .collect();

        if scored.is_empty() {
            return None;
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        // Map rows back to catalog entries, skipping the user's liked items
        // and ids deleted since the artifact was built. Fewer than k after
        // skipping is fine.
        let mut ranked = Vec::with_capacity(k);
        for (item_idx, _) in scored {
            if ranked.len() == k {
                break;
            }
            if liked.contains(&item_order[item_idx]) {
                continue;
            }
            match self.store.get_movie(item_order[item_idx]).await {
                Ok(Some(movie)) => ranked.push(movie),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Factorized stage store read failed");
                    return None;
                }
            }
        }
        Some(ranked)
    }

    /// Similarity-to-liked-items ranking weighted by quality.
    /// Requires at least one interaction and at least one liked item.
    async fn content_stage(&self, user_id: i64, k: usize) -> Option<Vec<Movie>> {
        let ratings = match self.store.list_ratings(user_id).await {
            Ok(ratings) => ratings,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Content stage failed to read ratings");
                return None;
            }
        };
        if ratings.is_empty() {
            return None;
        }

        let liked_ids: Vec<i64> = ratings
            .iter()
            .filter(|r| r.value >= self.liked_threshold)
            .map(|r| r.movie_id)
            .collect();
        if liked_ids.is_empty() {
            return None;
        }

        let movies = match self.store.list_movies().await {
            Ok(movies) => movies,
            Err(e) => {
                tracing::warn!(error = %e, "Content stage failed to read catalog");
                return None;
            }
        };
        let max_pop = self.store.max_popularity().await.unwrap_or(1.0);

        let texts: Vec<String> = movies.iter().map(Movie::text).collect();
        let vectorizer = TfidfVectorizer::fit(&texts);
        let rows: Vec<_> = texts.iter().map(|t| vectorizer.transform(t)).collect();

        let liked_rows: Vec<usize> = movies
            .iter()
            .enumerate()
            .filter(|(_, m)| liked_ids.contains(&m.id))
            .map(|(i, _)| i)
            .collect();
        if liked_rows.is_empty() {
            return None;
        }

        // Candidates exclude the liked items themselves
        let mut scored: Vec<(usize, f64)> = movies
            .iter()
            .enumerate()
            .filter(|(_, m)| !liked_ids.contains(&m.id))
            .map(|(i, m)| {
                let mean_sim: f64 = liked_rows
                    .iter()
                    .map(|&liked| rows[i].cosine(&rows[liked]))
                    .sum::<f64>()
                    / liked_rows.len() as f64;
                (i, mean_sim * m.quality_score(max_pop))
            })
            .collect();

        if scored.is_empty() {
            return None;
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        Some(scored.into_iter().take(k).map(|(i, _)| movies[i].clone()).collect())
    }

    /// Quality-ranked catalog without personalization, used as the
    /// under-threshold fallback list
    pub async fn popular(&self, k: usize) -> Vec<Movie> {
        if k == 0 {
            return Vec::new();
        }
        self.popularity_stage(k).await
    }

    /// Cold-start ranking: the whole catalog by quality score, descending
    async fn popularity_stage(&self, k: usize) -> Vec<Movie> {
        let movies = match self.store.list_movies().await {
            Ok(movies) => movies,
            Err(e) => {
                tracing::warn!(error = %e, "Popularity stage failed to read catalog");
                return Vec::new();
            }
        };
        let max_pop = self.store.max_popularity().await.unwrap_or(1.0);

        let mut scored: Vec<(f64, Movie)> = movies
            .into_iter()
            .map(|m| (m.quality_score(max_pop), m))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.id.cmp(&b.1.id))
        });
        scored.into_iter().take(k).map(|(_, m)| m).collect()
    }
}
