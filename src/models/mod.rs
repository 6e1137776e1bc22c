use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod artifact;
pub mod attribution;

pub use artifact::TrainedArtifact;
pub use attribution::{AttributionRecord, EmbeddingContributions, FeatureWeights, LocalExplanation};

/// Identifier for a movie, either our store id or the TMDB id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovieId {
    /// Store-assigned id
    Local(i64),
    /// TMDB id, for titles not (yet) in the catalog
    Tmdb(i64),
}

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovieId::Local(id) => write!(f, "{}", id),
            MovieId::Tmdb(id) => write!(f, "tmdb:{}", id),
        }
    }
}

/// A catalog item. Immutable once ingested, except for upsert by TMDB id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub tmdb_id: Option<i64>,
    pub title: String,
    /// Concatenated descriptive text used for similarity (title + overview)
    pub overview: String,
    pub year: String,
    pub poster: Option<String>,
    pub popularity: f64,
    /// 0-10 scale
    pub vote: f64,
}

impl Movie {
    /// Text used by the similarity index and content fallback.
    /// Always non-null; empty overview yields the title alone.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.overview)
    }

    /// Blended quality score: `0.6 * normalized vote + 0.4 * normalized popularity`.
    ///
    /// `max_popularity` is floored at 1.0 so an empty or zero-popularity
    /// catalog never divides by zero.
    pub fn quality_score(&self, max_popularity: f64) -> f64 {
        let max_pop = max_popularity.max(1.0);
        0.6 * (self.vote / 10.0) + 0.4 * (self.popularity / max_pop)
    }
}

/// An append-only user interaction. Anonymous ratings carry no user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub id: i64,
    pub user_id: Option<i64>,
    pub movie_id: i64,
    /// 1-5 scale
    pub value: i32,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// A movie record as returned by the TMDB discover/trending/detail endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbMovie {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: f64,
}

/// Base URL for TMDB poster images
pub const TMDB_IMG: &str = "https://image.tmdb.org/t/p/w342";

impl TmdbMovie {
    /// Release year, taken from the first four characters of the release date
    pub fn year(&self) -> String {
        self.release_date
            .as_deref()
            .map(|d| d.chars().take(4).collect())
            .unwrap_or_default()
    }

    /// Full poster URL, if TMDB provided a poster path
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_deref()
            .map(|p| format!("{}{}", TMDB_IMG, p))
    }

    /// Fields used when upserting this record into the catalog
    pub fn into_fields(self) -> MovieFields {
        MovieFields {
            title: self.title.clone(),
            overview: self.overview.clone(),
            year: self.year(),
            poster: self.poster_url(),
            popularity: self.popularity,
            vote: self.vote_average,
        }
    }
}

/// Upsertable movie fields (everything except identifiers)
#[derive(Debug, Clone, Default)]
pub struct MovieFields {
    pub title: String,
    pub overview: String,
    pub year: String,
    pub poster: Option<String>,
    pub popularity: f64,
    pub vote: f64,
}

/// A similar-catalog-item hit with quality context, as returned by the
/// similarity index context queries
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimilarMovie {
    pub movie_id: i64,
    pub title: String,
    pub vote: f64,
    pub similarity: f64,
}
