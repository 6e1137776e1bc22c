use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{Movie, MovieFields, Rating},
};

use super::EntityStore;

/// In-memory entity store
///
/// Backing implementation of [`EntityStore`] for a single process: movies and
/// ratings in maps behind a lock, with monotonically assigned ids. Ratings
/// are append-only, matching the store contract.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    movies: HashMap<i64, Movie>,
    ratings: Vec<Rating>,
    next_movie_id: i64,
    next_rating_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a movie directly, assigning a store id. Used for seeding
    /// catalogs outside the TMDB upsert path.
    pub async fn insert_movie(&self, tmdb_id: Option<i64>, fields: MovieFields) -> Movie {
        let mut inner = self.inner.write().await;
        inner.next_movie_id += 1;
        let movie = Movie {
            id: inner.next_movie_id,
            tmdb_id,
            title: fields.title,
            overview: fields.overview,
            year: fields.year,
            poster: fields.poster,
            popularity: fields.popularity,
            vote: fields.vote,
        };
        inner.movies.insert(movie.id, movie.clone());
        movie
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn get_movie(&self, id: i64) -> AppResult<Option<Movie>> {
        let inner = self.inner.read().await;
        Ok(inner.movies.get(&id).cloned())
    }

    async fn get_movie_by_tmdb(&self, tmdb_id: i64) -> AppResult<Option<Movie>> {
        let inner = self.inner.read().await;
        Ok(inner
            .movies
            .values()
            .find(|m| m.tmdb_id == Some(tmdb_id))
            .cloned())
    }

    async fn list_movies(&self) -> AppResult<Vec<Movie>> {
        let inner = self.inner.read().await;
        let mut movies: Vec<Movie> = inner.movies.values().cloned().collect();
        // Stable order so index builds and scoring passes are deterministic
        movies.sort_by_key(|m| m.id);
        Ok(movies)
    }

    async fn upsert_movie(&self, tmdb_id: i64, fields: MovieFields) -> AppResult<Movie> {
        let mut inner = self.inner.write().await;
        let existing_id = inner
            .movies
            .values()
            .find(|m| m.tmdb_id == Some(tmdb_id))
            .map(|m| m.id);

        let id = match existing_id {
            Some(id) => id,
            None => {
                inner.next_movie_id += 1;
                inner.next_movie_id
            }
        };

        let movie = Movie {
            id,
            tmdb_id: Some(tmdb_id),
            title: fields.title,
            overview: fields.overview,
            year: fields.year,
            poster: fields.poster,
            popularity: fields.popularity,
            vote: fields.vote,
        };
        inner.movies.insert(id, movie.clone());
        Ok(movie)
    }

    async fn create_rating(
        &self,
        user_id: Option<i64>,
        movie_id: i64,
        value: i32,
    ) -> AppResult<Rating> {
        let mut inner = self.inner.write().await;
        inner.next_rating_id += 1;
        let rating = Rating {
            id: inner.next_rating_id,
            user_id,
            movie_id,
            value,
            created_at: Utc::now(),
        };
        inner.ratings.push(rating.clone());
        Ok(rating)
    }

    async fn list_ratings(&self, user_id: i64) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        let mut ratings: Vec<Rating> = inner
            .ratings
            .iter()
            .filter(|r| r.user_id == Some(user_id))
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(ratings)
    }

    async fn list_all_ratings(&self) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        let mut ratings = inner.ratings.clone();
        ratings.sort_by_key(|r| r.id);
        Ok(ratings)
    }

    async fn max_popularity(&self) -> AppResult<f64> {
        let inner = self.inner.read().await;
        Ok(inner
            .movies
            .values()
            .map(|m| m.popularity)
            .fold(0.0, f64::max))
    }

    async fn avg_popularity(&self) -> AppResult<f64> {
        let inner = self.inner.read().await;
        if inner.movies.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = inner.movies.values().map(|m| m.popularity).sum();
        Ok(sum / inner.movies.len() as f64)
    }

    async fn avg_vote(&self) -> AppResult<f64> {
        let inner = self.inner.read().await;
        if inner.movies.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = inner.movies.values().map(|m| m.vote).sum();
        Ok(sum / inner.movies.len() as f64)
    }
}
