use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use marquee_api::api::{create_router, AppState};
use marquee_api::db::MemoryStore;
use marquee_api::error::{AppError, AppResult};
use marquee_api::models::{MovieFields, TmdbMovie};
use marquee_api::services::generation::{GenerationError, GenerationOptions, GenerationService};
use marquee_api::services::providers::MetadataProvider;
use marquee_api::Config;

/// Canned metadata provider: a fixed detail lookup table plus a fixed
/// trending list, no network.
struct StubProvider {
    details: HashMap<i64, TmdbMovie>,
    trending: Vec<TmdbMovie>,
}

impl StubProvider {
    fn empty() -> Self {
        Self {
            details: HashMap::new(),
            trending: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for StubProvider {
    async fn discover(&self, _page: u32) -> AppResult<Vec<TmdbMovie>> {
        Ok(Vec::new())
    }

    async fn detail(&self, tmdb_id: i64) -> AppResult<TmdbMovie> {
        self.details
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| AppError::Upstream(format!("TMDB returned status 404 for {}", tmdb_id)))
    }

    async fn trending(&self) -> AppResult<Vec<TmdbMovie>> {
        Ok(self.trending.clone())
    }
}

/// Generator that always fails, forcing the template ladder
struct FailingGenerator;

#[async_trait::async_trait]
impl GenerationService for FailingGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Timeout)
    }
}

/// Generator that echoes a fixed sentence
struct FixedGenerator(&'static str);

#[async_trait::async_trait]
impl GenerationService for FixedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        Ok(self.0.to_string())
    }
}

fn tmdb_movie(id: i64, title: &str, vote: f64, popularity: f64) -> TmdbMovie {
    TmdbMovie {
        id,
        title: title.to_string(),
        overview: format!("{} overview", title),
        release_date: Some("2021-06-01".to_string()),
        poster_path: None,
        popularity,
        vote_average: vote,
    }
}

fn fields(title: &str, overview: &str, vote: f64, popularity: f64) -> MovieFields {
    MovieFields {
        title: title.to_string(),
        overview: overview.to_string(),
        year: "2020".to_string(),
        poster: None,
        popularity,
        vote,
    }
}

/// Three movies: two space titles that overlap in text, one unrelated.
/// Quality order with max popularity 50: B > A > C.
async fn seed_catalog(store: &MemoryStore) {
    store
        .insert_movie(
            None,
            fields(
                "Star Voyage",
                "galactic space adventure with heroic astronauts",
                9.0,
                10.0,
            ),
        )
        .await;
    store
        .insert_movie(
            None,
            fields(
                "Deep Space",
                "space adventure exploring distant galaxies",
                5.0,
                50.0,
            ),
        )
        .await;
    store
        .insert_movie(None, fields("Pastry Hour", "baking bread and pastry", 2.0, 5.0))
        .await;
}

struct TestContext {
    server: TestServer,
    store: Arc<MemoryStore>,
    // Holds the artifact directory for the lifetime of the test
    _model_dir: TempDir,
}

fn build_context(provider: StubProvider, generator: Arc<dyn GenerationService>) -> TestContext {
    let model_dir = TempDir::new().unwrap();
    let config = Config {
        model_dir: model_dir.path().to_string_lossy().into_owned(),
        ..Config::default()
    };

    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), Arc::new(provider), generator, config);
    let server = TestServer::new(create_router(state)).unwrap();

    TestContext {
        server,
        store,
        _model_dir: model_dir,
    }
}

fn create_test_context() -> TestContext {
    build_context(StubProvider::empty(), Arc::new(FixedGenerator("A fine pick.")))
}

#[tokio::test]
async fn test_health_check() {
    let ctx = create_test_context();
    let response = ctx.server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_recommendations_below_threshold_returns_popular() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx.server.get("/api/v1/recommendations?user_id=1").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "insufficient_ratings");
    assert_eq!(body["ratings_count"], 0);
    assert_eq!(body["ratings_needed"], 5);

    // Quality-ranked fallback: Deep Space (popularity) ahead of Star Voyage
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 3);
    assert_eq!(recs[0]["title"], "Deep Space");
    assert_eq!(recs[1]["title"], "Star Voyage");
    assert_eq!(recs[2]["title"], "Pastry Hour");
}

#[tokio::test]
async fn test_recommendations_personalized_after_enough_ratings() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    // Five ratings crosses the personalization gate
    for (movie_id, value) in [(1, 5), (2, 4), (3, 2), (1, 5), (2, 4)] {
        let response = ctx
            .server
            .post("/api/v1/ratings")
            .json(&json!({ "user_id": 7, "movie_id": movie_id, "value": value }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }

    let response = ctx.server.get("/api/v1/recommendations?user_id=7").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "personalized");
    assert_eq!(body["ratings_count"], 5);
    assert_eq!(body["ratings_needed"], 0);
    assert!(!body["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rating_defaults_to_midpoint_value() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .post("/api/v1/ratings")
        .json(&json!({ "user_id": 1, "movie_id": 1 }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["rating"]["value"], 3);
}

#[tokio::test]
async fn test_rating_value_out_of_range_rejected() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .post("/api/v1/ratings")
        .json(&json!({ "user_id": 1, "movie_id": 1, "value": 9 }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rating_by_tmdb_id_provisions_movie() {
    let mut provider = StubProvider::empty();
    provider
        .details
        .insert(550, tmdb_movie(550, "Fight Club", 8.4, 61.0));
    let ctx = build_context(provider, Arc::new(FixedGenerator("Fine.")));

    let response = ctx
        .server
        .post("/api/v1/ratings")
        .json(&json!({ "user_id": 1, "tmdb_id": 550, "value": 5 }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["provisioned"], true);
    assert_eq!(body["movie"]["tmdb_id"], 550);
    assert_eq!(body["movie"]["title"], "Fight Club");

    // Second rating finds the movie in the catalog
    let response = ctx
        .server
        .post("/api/v1/ratings")
        .json(&json!({ "user_id": 1, "tmdb_id": 550, "value": 4 }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["provisioned"], false);
}

#[tokio::test]
async fn test_rating_unknown_movie_is_not_found() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .post("/api/v1/ratings")
        .json(&json!({ "user_id": 1, "movie_id": 999, "value": 4 }))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_explanation_unknown_movie_is_not_found() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx.server.get("/api/v1/explanations?movie_id=999").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_explanation_without_target_is_rejected() {
    let ctx = create_test_context();

    let response = ctx.server.get("/api/v1/explanations").await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_explanation_for_catalog_movie() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .get("/api/v1/explanations?movie_id=1&user_id=1")
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["movie"]["title"], "Star Voyage");
    // No history yields the fixed cold-start split
    assert_eq!(body["attribution"]["feature_weights"]["genre"], 0.3);
    assert!(body["attribution"]["combined_score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_explanation_by_external_id_uses_simple_split() {
    let mut provider = StubProvider::empty();
    provider
        .details
        .insert(550, tmdb_movie(550, "Fight Club", 8.4, 61.0));
    let ctx = build_context(provider, Arc::new(FixedGenerator("Fine.")));
    seed_catalog(&ctx.store).await;

    let response = ctx.server.get("/api/v1/explanations?tmdb_id=550").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["movie"]["title"], "Fight Club");
    assert!(body["attribution"]["feature_weights"].is_null());
    let reasons = body["attribution"]["local_explanations"].as_array().unwrap();
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0]["feature"], "TMDB rating");
}

#[tokio::test]
async fn test_natural_explanation_uses_generated_text() {
    let ctx = create_test_context();
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .get("/api/v1/explanations/natural?movie_id=1&user_id=1")
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["explanation_kind"], "generated");
    assert_eq!(body["explanation"], "A fine pick.");
}

#[tokio::test]
async fn test_natural_explanation_generation_failure_falls_to_template() {
    let ctx = build_context(StubProvider::empty(), Arc::new(FailingGenerator));
    seed_catalog(&ctx.store).await;

    let response = ctx
        .server
        .get("/api/v1/explanations/natural?movie_id=1&user_id=1")
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["explanation_kind"], "similarity_template");
    // The most text-similar title is the other space movie
    let text = body["explanation"].as_str().unwrap();
    assert!(text.contains("Deep Space"), "unexpected template text: {}", text);
}

#[tokio::test]
async fn test_trending_passthrough() {
    let mut provider = StubProvider::empty();
    provider.trending = vec![
        tmdb_movie(100, "Trending One", 7.0, 80.0),
        tmdb_movie(200, "Trending Two", 6.5, 70.0),
    ];
    let ctx = build_context(provider, Arc::new(FixedGenerator("Fine.")));

    let response = ctx.server.get("/api/v1/trending").await;
    response.assert_status_ok();

    let body: Vec<serde_json::Value> = response.json();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["tmdb_id"], 100);
    assert_eq!(body[0]["title"], "Trending One");
    assert_eq!(body[0]["year"], "2021");
}

#[tokio::test]
async fn test_trending_upstream_failure_is_bad_gateway() {
    struct DownProvider;

    #[async_trait::async_trait]
    impl MetadataProvider for DownProvider {
        async fn discover(&self, _page: u32) -> AppResult<Vec<TmdbMovie>> {
            Err(AppError::Upstream("TMDB unreachable".to_string()))
        }
        async fn detail(&self, _tmdb_id: i64) -> AppResult<TmdbMovie> {
            Err(AppError::Upstream("TMDB unreachable".to_string()))
        }
        async fn trending(&self) -> AppResult<Vec<TmdbMovie>> {
            Err(AppError::Upstream("TMDB unreachable".to_string()))
        }
    }

    let model_dir = TempDir::new().unwrap();
    let config = Config {
        model_dir: model_dir.path().to_string_lossy().into_owned(),
        ..Config::default()
    };
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(DownProvider),
        Arc::new(FixedGenerator("Fine.")),
        config,
    );
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server.get("/api/v1/trending").await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_request_id_roundtrip() {
    let ctx = create_test_context();

    let response = ctx.server.get("/health").await;
    assert!(response.headers().contains_key("x-request-id"));

    let id = uuid::Uuid::new_v4().to_string();
    let response = ctx
        .server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_str(&id).unwrap(),
        )
        .await;
    assert_eq!(
        response.headers().get("x-request-id").unwrap().to_str().unwrap(),
        id
    );
}
