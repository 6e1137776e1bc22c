/// External metadata providers
///
/// The catalog can be provisioned on demand from an upstream movie database.
/// Handlers depend on the trait so tests can stub responses without a
/// network.
use crate::error::AppResult;
use crate::models::TmdbMovie;

pub mod tmdb;

pub use tmdb::TmdbProvider;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch a discovery page of popular movies
    async fn discover(&self, page: u32) -> AppResult<Vec<TmdbMovie>>;

    /// Fetch a single movie by its upstream id
    async fn detail(&self, tmdb_id: i64) -> AppResult<TmdbMovie>;

    /// Fetch the weekly trending list
    async fn trending(&self) -> AppResult<Vec<TmdbMovie>>;
}
