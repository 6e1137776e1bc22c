/// Offline training pass
///
/// Produces the [`TrainedArtifact`] the scorer chain consumes. When rated
/// interactions exist, runs a deterministic SGD matrix factorization over
/// (user, item, value) triples; otherwise falls back to a heuristic artifact
/// of precomputed quality scores. Training is orchestration-level code with a
/// predict contract, not a tuned recommender.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;

use crate::{
    db::EntityStore,
    error::{AppError, AppResult},
    models::{Movie, Rating, TrainedArtifact},
};

use super::artifact::ArtifactStore;

const RNG_SEED: u64 = 42;
const LEARNING_RATE: f32 = 0.05;
const REGULARIZATION: f32 = 0.01;

pub struct Trainer {
    store: Arc<dyn EntityStore>,
    embedding_dim: usize,
}

impl Trainer {
    pub fn new(store: Arc<dyn EntityStore>, embedding_dim: usize) -> Self {
        Self {
            store,
            embedding_dim,
        }
    }

    /// Run a training pass over the current catalog/interaction snapshot.
    ///
    /// Deterministic for a fixed snapshot: seeded initialization and a stable
    /// triple order make repeated runs produce identical artifacts.
    pub async fn train(&self, epochs: usize) -> AppResult<TrainedArtifact> {
        let movies = self.store.list_movies().await?;
        if movies.is_empty() {
            return Err(AppError::Internal(
                "Cannot train on an empty catalog".to_string(),
            ));
        }

        let ratings = self.store.list_all_ratings().await?;
        let attributed: Vec<&Rating> = ratings.iter().filter(|r| r.user_id.is_some()).collect();

        if attributed.is_empty() {
            tracing::info!("No attributed ratings, building heuristic artifact");
            return self.heuristic(&movies).await;
        }

        tracing::info!(
            ratings = attributed.len(),
            items = movies.len(),
            epochs,
            "Training factorized scorer"
        );
        Ok(self.factorize(&movies, &attributed, epochs))
    }

    async fn heuristic(&self, movies: &[Movie]) -> AppResult<TrainedArtifact> {
        let max_pop = self.store.max_popularity().await?;
        let scores = movies
            .iter()
            .map(|m| (m.id, m.quality_score(max_pop)))
            .collect();
        Ok(TrainedArtifact::Heuristic {
            scores,
            item_order: movies.iter().map(|m| m.id).collect(),
            trained_at: Utc::now(),
        })
    }

    fn factorize(&self, movies: &[Movie], ratings: &[&Rating], epochs: usize) -> TrainedArtifact {
        let item_order: Vec<i64> = movies.iter().map(|m| m.id).collect();

        let mut user_order: Vec<i64> = ratings.iter().filter_map(|r| r.user_id).collect();
        user_order.sort_unstable();
        user_order.dedup();

        let mut rng = StdRng::seed_from_u64(RNG_SEED);
        let scale = 1.0 / (self.embedding_dim as f32).sqrt();
        let init = |rows: usize, rng: &mut StdRng| -> Vec<Vec<f32>> {
            (0..rows)
                .map(|_| (0..self.embedding_dim).map(|_| rng.gen_range(-scale..scale)).collect())
                .collect()
        };
        let mut user_embeddings = init(user_order.len(), &mut rng);
        let mut item_embeddings = init(item_order.len(), &mut rng);

        // Triples in stable (rating id) order; ratings for items no longer
        // in the catalog are skipped
        let triples: Vec<(usize, usize, f32)> = ratings
            .iter()
            .filter_map(|r| {
                let user_idx = user_order.binary_search(&r.user_id?).ok()?;
                let item_idx = item_order.iter().position(|&i| i == r.movie_id)?;
                Some((user_idx, item_idx, r.value as f32))
            })
            .collect();

        for _ in 0..epochs {
            for &(user_idx, item_idx, value) in &triples {
                let prediction: f32 = user_embeddings[user_idx]
                    .iter()
                    .zip(&item_embeddings[item_idx])
                    .map(|(u, i)| u * i)
                    .sum();
                let error = value - prediction;

                for d in 0..self.embedding_dim {
                    let user_d = user_embeddings[user_idx][d];
                    let item_d = item_embeddings[item_idx][d];
                    user_embeddings[user_idx][d] +=
                        LEARNING_RATE * (error * item_d - REGULARIZATION * user_d);
                    item_embeddings[item_idx][d] +=
                        LEARNING_RATE * (error * user_d - REGULARIZATION * item_d);
                }
            }
        }

        TrainedArtifact::Factorized {
            user_embeddings,
            item_embeddings,
            user_order,
            item_order,
            trained_at: Utc::now(),
        }
    }
}

/// Process-scoped handle to the current trained artifact
///
/// Read-mostly: requests read an immutable snapshot; rebuilds train off-lock
/// and swap the reference. Concurrent rebuild requests collapse to one
/// in-flight training pass, with other callers keeping the stale snapshot.
pub struct ArtifactHandle {
    trainer: Trainer,
    artifact_store: ArtifactStore,
    snapshot: RwLock<Option<Arc<TrainedArtifact>>>,
    training: AtomicBool,
    bootstrap_epochs: usize,
}

impl ArtifactHandle {
    pub fn new(trainer: Trainer, artifact_store: ArtifactStore, bootstrap_epochs: usize) -> Self {
        Self {
            trainer,
            artifact_store,
            snapshot: RwLock::new(None),
            training: AtomicBool::new(false),
            bootstrap_epochs,
        }
    }

    /// Current artifact, loading persisted state on first use and falling back
    /// to a short training pass when nothing is persisted. Never blocks on a
    /// rebuild already in flight; absence is an acceptable answer.
    pub async fn current(&self) -> Option<Arc<TrainedArtifact>> {
        if let Some(artifact) = self.snapshot.read().await.clone() {
            return Some(artifact);
        }

        if self.training.swap(true, Ordering::SeqCst) {
            // Another caller is already loading/training
            return None;
        }

        let artifact = self.load_or_bootstrap().await;
        if let Some(artifact) = &artifact {
            *self.snapshot.write().await = Some(artifact.clone());
        }
        self.training.store(false, Ordering::SeqCst);
        artifact
    }

    async fn load_or_bootstrap(&self) -> Option<Arc<TrainedArtifact>> {
        match self.artifact_store.load().await {
            Ok(Some(artifact)) => return Some(Arc::new(artifact)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Persisted artifact unreadable, retraining");
            }
        }

        // First use: a short pass keeps startup latency bounded
        match self.trainer.train(self.bootstrap_epochs).await {
            Ok(artifact) => {
                if let Err(e) = self.artifact_store.save(&artifact).await {
                    tracing::warn!(error = %e, "Failed to persist bootstrap artifact");
                }
                Some(Arc::new(artifact))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bootstrap training failed");
                None
            }
        }
    }

    /// Full retrain: build a fresh artifact, persist it, swap it in
    pub async fn retrain(&self, epochs: usize) -> AppResult<()> {
        if self.training.swap(true, Ordering::SeqCst) {
            tracing::info!("Retrain already in flight, skipping");
            return Ok(());
        }

        let outcome = match self.trainer.train(epochs).await {
            Ok(artifact) => match self.artifact_store.save(&artifact).await {
                Ok(()) => {
                    *self.snapshot.write().await = Some(Arc::new(artifact));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        self.training.store(false, Ordering::SeqCst);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::MovieFields;

    fn fields(title: &str, vote: f64, popularity: f64) -> MovieFields {
        MovieFields {
            title: title.to_string(),
            overview: String::new(),
            year: "2020".to_string(),
            poster: None,
            popularity,
            vote,
        }
    }

    async fn seeded_store(with_ratings: bool) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let a = store.insert_movie(None, fields("A", 9.0, 10.0)).await;
        let b = store.insert_movie(None, fields("B", 5.0, 50.0)).await;
        store.insert_movie(None, fields("C", 2.0, 5.0)).await;
        if with_ratings {
            store.create_rating(Some(1), a.id, 5).await.unwrap();
            store.create_rating(Some(1), b.id, 2).await.unwrap();
            store.create_rating(Some(2), b.id, 4).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_no_ratings_yields_heuristic() {
        let store = seeded_store(false).await;
        let trainer = Trainer::new(store, 8);
        let artifact = trainer.train(4).await.unwrap();
        assert_eq!(artifact.mode(), "heuristic");
        assert_eq!(artifact.item_order().len(), 3);
    }

    #[tokio::test]
    async fn test_ratings_yield_factorized() {
        let store = seeded_store(true).await;
        let trainer = Trainer::new(store, 8);
        let artifact = trainer.train(4).await.unwrap();
        assert_eq!(artifact.mode(), "factorized");
        assert_eq!(artifact.user_index(1), Some(0));
        assert_eq!(artifact.user_index(2), Some(1));
        assert_eq!(artifact.user_index(99), None);
    }

    #[tokio::test]
    async fn test_training_is_deterministic() {
        let store = seeded_store(true).await;
        let trainer = Trainer::new(store, 8);
        let first = trainer.train(4).await.unwrap();
        let second = trainer.train(4).await.unwrap();

        match (&first, &second) {
            (
                TrainedArtifact::Factorized {
                    user_embeddings: u1,
                    item_embeddings: i1,
                    ..
                },
                TrainedArtifact::Factorized {
                    user_embeddings: u2,
                    item_embeddings: i2,
                    ..
                },
            ) => {
                assert_eq!(u1, u2);
                assert_eq!(i1, i2);
            }
            _ => panic!("expected factorized artifacts"),
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_cannot_train() {
        let store = Arc::new(MemoryStore::new());
        let trainer = Trainer::new(store, 8);
        assert!(trainer.train(4).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_bootstraps_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(true).await;
        let handle = ArtifactHandle::new(
            Trainer::new(store, 8),
            ArtifactStore::new(dir.path()),
            4,
        );

        let artifact = handle.current().await.expect("bootstrap should train");
        assert_eq!(artifact.mode(), "factorized");

        // Persisted blob survives for a fresh handle
        let reloaded = ArtifactStore::new(dir.path()).load().await.unwrap();
        assert!(reloaded.is_some());
    }

    #[tokio::test]
    async fn test_handle_retrains_over_corrupt_blob() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("scorer.json"), b"garbage")
            .await
            .unwrap();

        let store = seeded_store(false).await;
        let handle = ArtifactHandle::new(
            Trainer::new(store, 8),
            ArtifactStore::new(dir.path()),
            4,
        );

        let artifact = handle.current().await.expect("corrupt blob should retrain");
        assert_eq!(artifact.mode(), "heuristic");
    }
}
