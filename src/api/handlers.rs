use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{AttributionRecord, Movie, Rating, SimilarMovie};
use crate::services::attribution::simple_explain;
use crate::services::narrative::{self, NarrativeKind};

use super::AppState;

/// Neighbours attached to explanation responses
const CONTEXT_SIZE: usize = 5;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationsParams {
    pub user_id: i64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub id: i64,
    pub tmdb_id: Option<i64>,
    pub title: String,
    pub overview: String,
    pub year: String,
    pub poster: Option<String>,
    pub popularity: f64,
    pub vote: f64,
}

impl From<&Movie> for MovieResponse {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            tmdb_id: movie.tmdb_id,
            title: movie.title.clone(),
            overview: movie.overview.clone(),
            year: movie.year.clone(),
            poster: movie.poster.clone(),
            popularity: movie.popularity,
            vote: movie.vote,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub status: &'static str,
    pub ratings_count: usize,
    /// How many more ratings unlock personalization; zero once personalized
    pub ratings_needed: usize,
    pub recommendations: Vec<MovieResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub user_id: Option<i64>,
    pub movie_id: Option<i64>,
    pub tmdb_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExplanationResponse {
    pub movie: MovieResponse,
    pub attribution: AttributionRecord,
    pub similar: Vec<SimilarMovie>,
}

#[derive(Debug, Serialize)]
pub struct NaturalExplanationResponse {
    pub movie: MovieResponse,
    pub explanation: String,
    pub explanation_kind: NarrativeKind,
    pub attribution: AttributionRecord,
    pub similar: Vec<SimilarMovie>,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub user_id: Option<i64>,
    pub movie_id: Option<i64>,
    pub tmdb_id: Option<i64>,
    #[serde(default = "default_rating_value")]
    pub value: i32,
}

fn default_rating_value() -> i32 {
    3
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub rating: Rating,
    pub movie: MovieResponse,
    /// True when the movie was fetched from TMDB and added to the catalog
    /// as part of this request
    pub provisioned: bool,
}

#[derive(Debug, Serialize)]
pub struct TrendingMovieResponse {
    pub tmdb_id: i64,
    pub title: String,
    pub overview: String,
    pub year: String,
    pub poster: Option<String>,
    pub popularity: f64,
    pub vote: f64,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Top-N recommendations for a user. Below the minimum rating count a
/// structured insufficient-data response carries the popularity ranking
/// instead of an error.
pub async fn recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationsParams>,
) -> AppResult<Json<RecommendationsResponse>> {
    let ratings_count = state.store.list_ratings(params.user_id).await?.len();
    let min_ratings = state.config.min_ratings;

    if ratings_count < min_ratings {
        let popular = state.scorer.popular(params.limit).await;
        tracing::info!(
            user_id = params.user_id,
            ratings_count,
            "Below personalization threshold, returning popular titles"
        );
        return Ok(Json(RecommendationsResponse {
            status: "insufficient_ratings",
            ratings_count,
            ratings_needed: min_ratings - ratings_count,
            recommendations: popular.iter().map(MovieResponse::from).collect(),
        }));
    }

    let ranked = state.scorer.top_n(params.user_id, params.limit).await;
    Ok(Json(RecommendationsResponse {
        status: "personalized",
        ratings_count,
        ratings_needed: 0,
        recommendations: ranked.iter().map(MovieResponse::from).collect(),
    }))
}

/// Attribution record for a movie, looked up by internal or TMDB id
pub async fn explanation(
    State(state): State<AppState>,
    Query(params): Query<ExplainParams>,
) -> AppResult<Json<ExplanationResponse>> {
    let (movie, in_catalog) = resolve_movie(&state, &params).await?;
    let attribution = build_attribution(&state, params.user_id, &movie, in_catalog).await;
    let similar = similar_context(&state, &movie, in_catalog).await;

    Ok(Json(ExplanationResponse {
        movie: MovieResponse::from(&movie),
        attribution,
        similar,
    }))
}

/// Natural-language explanation: attribution plus similarity context fed
/// through the narrative synthesizer
pub async fn natural_explanation(
    State(state): State<AppState>,
    Query(params): Query<ExplainParams>,
) -> AppResult<Json<NaturalExplanationResponse>> {
    let (movie, in_catalog) = resolve_movie(&state, &params).await?;
    let attribution = build_attribution(&state, params.user_id, &movie, in_catalog).await;
    let similar = similar_context(&state, &movie, in_catalog).await;

    let summary = match params.user_id {
        Some(user_id) => narrative::user_summary(&liked_titles(&state, user_id).await),
        None => narrative::user_summary(&[]),
    };

    let explanation = state
        .narrative
        .explain(&movie, &summary, &attribution, &similar)
        .await;

    Ok(Json(NaturalExplanationResponse {
        movie: MovieResponse::from(&movie),
        explanation: explanation.text,
        explanation_kind: explanation.kind,
        attribution,
        similar,
    }))
}

/// Record a rating. Movies known only by TMDB id are fetched from the
/// provider and added to the catalog first.
pub async fn rate(
    State(state): State<AppState>,
    Json(request): Json<RateRequest>,
) -> AppResult<(StatusCode, Json<RateResponse>)> {
    if !(1..=5).contains(&request.value) {
        return Err(AppError::InvalidInput(format!(
            "Rating value must be between 1 and 5, got {}",
            request.value
        )));
    }

    let mut provisioned = false;
    let movie = if let Some(movie_id) = request.movie_id {
        state
            .store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", movie_id)))?
    } else if let Some(tmdb_id) = request.tmdb_id {
        match state.store.get_movie_by_tmdb(tmdb_id).await? {
            Some(movie) => movie,
            None => {
                let record = state.metadata.detail(tmdb_id).await?;
                let movie = state.store.upsert_movie(tmdb_id, record.into_fields()).await?;
                provisioned = true;
                tracing::info!(tmdb_id, movie_id = movie.id, "Provisioned movie from TMDB");

                // New catalog entry, refresh the index off the request path
                let similarity = state.similarity.clone();
                tokio::spawn(async move { similarity.rebuild().await });

                movie
            }
        }
    } else {
        return Err(AppError::InvalidInput(
            "Either movie_id or tmdb_id is required".to_string(),
        ));
    };

    let rating = state
        .store
        .create_rating(request.user_id, movie.id, request.value)
        .await?;

    // Fold the new interaction into the scorer in the background.
    // Concurrent submissions collapse to one training pass.
    let artifacts = state.artifacts.clone();
    let epochs = state.config.train_epochs;
    tokio::spawn(async move {
        if let Err(e) = artifacts.retrain(epochs).await {
            tracing::warn!(error = %e, "Background retrain failed");
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(RateResponse {
            rating,
            movie: MovieResponse::from(&movie),
            provisioned,
        }),
    ))
}

/// Weekly trending titles, passed through from TMDB
pub async fn trending(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<TrendingMovieResponse>>> {
    let movies = state.metadata.trending().await?;
    let trending = movies
        .into_iter()
        .map(|m| TrendingMovieResponse {
            tmdb_id: m.id,
            title: m.title.clone(),
            overview: m.overview.clone(),
            year: m.year(),
            poster: m.poster_url(),
            popularity: m.popularity,
            vote: m.vote_average,
        })
        .collect();
    Ok(Json(trending))
}

// Helpers

/// Looks up the target movie. Titles absent from the catalog but known to
/// TMDB come back as transient records with id 0, flagged not-in-catalog.
async fn resolve_movie(state: &AppState, params: &ExplainParams) -> AppResult<(Movie, bool)> {
    if let Some(movie_id) = params.movie_id {
        let movie = state
            .store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", movie_id)))?;
        return Ok((movie, true));
    }

    if let Some(tmdb_id) = params.tmdb_id {
        if let Some(movie) = state.store.get_movie_by_tmdb(tmdb_id).await? {
            return Ok((movie, true));
        }

        let record = state.metadata.detail(tmdb_id).await?;
        let fields = record.into_fields();
        let movie = Movie {
            id: 0,
            tmdb_id: Some(tmdb_id),
            title: fields.title,
            overview: fields.overview,
            year: fields.year,
            poster: fields.poster,
            popularity: fields.popularity,
            vote: fields.vote,
        };
        return Ok((movie, false));
    }

    Err(AppError::InvalidInput(
        "Either movie_id or tmdb_id is required".to_string(),
    ))
}

/// Full attribution for catalog movies with a known user; otherwise the
/// simple quality/popularity weight split, since no local history applies
async fn build_attribution(
    state: &AppState,
    user_id: Option<i64>,
    movie: &Movie,
    in_catalog: bool,
) -> AttributionRecord {
    if in_catalog {
        if let Some(user_id) = user_id {
            let artifact = state.artifacts.current().await;
            return state.explainer.explain(user_id, movie, artifact.as_deref()).await;
        }
    }

    let max_popularity = state.store.max_popularity().await.unwrap_or(1.0);
    let (combined_score, local_explanations) =
        simple_explain(movie.vote, movie.popularity, max_popularity);
    AttributionRecord {
        feature_weights: None,
        local_explanations,
        embedding_contributions: None,
        combined_score,
    }
}

async fn similar_context(state: &AppState, movie: &Movie, in_catalog: bool) -> Vec<SimilarMovie> {
    if in_catalog {
        state.similarity.context_for_movie(movie.id, CONTEXT_SIZE).await
    } else {
        state.similarity.context_for_text(&movie.text(), CONTEXT_SIZE).await
    }
}

/// Titles and values of the user's most recent liked ratings, for the
/// prompt's history summary
async fn liked_titles(state: &AppState, user_id: i64) -> Vec<(String, i32)> {
    let ratings = match state.store.list_ratings(user_id).await {
        Ok(ratings) => ratings,
        Err(e) => {
            tracing::warn!(error = %e, user_id, "Failed to read ratings for summary");
            return Vec::new();
        }
    };

    let mut liked = Vec::new();
    for rating in ratings
        .iter()
        .filter(|r| r.value >= state.config.liked_threshold)
        .take(state.config.liked_history)
    {
        if let Ok(Some(movie)) = state.store.get_movie(rating.movie_id).await {
            liked.push((movie.title, rating.value));
        }
    }
    liked
}
