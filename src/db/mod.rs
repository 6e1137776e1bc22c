/// Catalog & interaction store boundary
///
/// The pipeline consumes catalog/interaction data through this read/write
/// interface and owns none of it. Items are immutable once ingested except
/// for upsert-by-TMDB-id; interactions are append-only.
use crate::{
    error::AppResult,
    models::{Movie, MovieFields, Rating},
};

pub mod memory;

pub use memory::MemoryStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_movie(&self, id: i64) -> AppResult<Option<Movie>>;

    async fn get_movie_by_tmdb(&self, tmdb_id: i64) -> AppResult<Option<Movie>>;

    async fn list_movies(&self) -> AppResult<Vec<Movie>>;

    /// Insert or update a movie keyed by its TMDB id
    async fn upsert_movie(&self, tmdb_id: i64, fields: MovieFields) -> AppResult<Movie>;

    /// Append an interaction. `user_id` is `None` for anonymous ratings.
    async fn create_rating(&self, user_id: Option<i64>, movie_id: i64, value: i32)
        -> AppResult<Rating>;

    /// All interactions for a user, most recent first
    async fn list_ratings(&self, user_id: i64) -> AppResult<Vec<Rating>>;

    /// Every interaction in the store, oldest first (training input)
    async fn list_all_ratings(&self) -> AppResult<Vec<Rating>>;

    async fn max_popularity(&self) -> AppResult<f64>;

    async fn avg_popularity(&self) -> AppResult<f64>;

    async fn avg_vote(&self) -> AppResult<f64>;
}
