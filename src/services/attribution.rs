/// Attribution engine
///
/// Produces the composite per-request explanation record by running three
/// independent signal extractors — history-derived feature weights, local
/// deviation from the corpus average, and latent-embedding contributions —
/// and merging whatever subset succeeded. A failed or empty extractor is an
/// absent signal, not an error: the record is always returned with the
/// remaining signals and a best-effort combined score.
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::EntityStore,
    models::{
        attribution::Direction, AttributionRecord, EmbeddingContributions, FeatureWeights,
        LocalExplanation, Movie, Rating, TrainedArtifact,
    },
};

/// Number of liked movies sampled for the history-match deviation
const HISTORY_SAMPLE: usize = 5;
/// Popularity deviations are capped so outliers cannot dominate
const POPULARITY_IMPACT_CAP: f64 = 0.3;
/// Word-overlap weight ceiling
const GENRE_WEIGHT_CAP: f64 = 0.5;

pub struct Explainer {
    store: Arc<dyn EntityStore>,
    liked_threshold: i32,
}

impl Explainer {
    pub fn new(store: Arc<dyn EntityStore>, liked_threshold: i32) -> Self {
        Self {
            store,
            liked_threshold,
        }
    }

    /// Build the attribution record for one (user, movie) pair
    pub async fn explain(
        &self,
        user_id: i64,
        movie: &Movie,
        artifact: Option<&TrainedArtifact>,
    ) -> AttributionRecord {
        let ratings = self.store.list_ratings(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, user_id, "Attribution failed to read ratings");
            Vec::new()
        });
        let liked = self.liked_movies(&ratings).await;

        let feature_weights = self.history_weights(&ratings, &liked, movie);
        let local_explanations = self.local_deviations(&ratings, &liked, movie).await;
        let embedding_contributions =
            artifact.and_then(|a| embedding_contributions(a, user_id, movie.id));

        AttributionRecord::combine(feature_weights, local_explanations, embedding_contributions)
    }

    async fn liked_movies(&self, ratings: &[Rating]) -> Vec<Movie> {
        let mut liked = Vec::new();
        for rating in ratings.iter().filter(|r| r.value >= self.liked_threshold) {
            if let Ok(Some(movie)) = self.store.get_movie(rating.movie_id).await {
                liked.push(movie);
            }
        }
        liked
    }

    /// Feature weights from the user's rating history.
    /// No history yields the fixed cold-start split.
    fn history_weights(
        &self,
        ratings: &[Rating],
        liked: &[Movie],
        movie: &Movie,
    ) -> Option<FeatureWeights> {
        if ratings.is_empty() {
            return Some(FeatureWeights::cold_start());
        }

        let genre = if liked.is_empty() {
            0.0
        } else {
            let matches = liked
                .iter()
                .filter(|l| significant_overlap(&movie.overview, &l.overview) > 2)
                .count();
            (matches as f64 / liked.len() as f64).min(GENRE_WEIGHT_CAP)
        };

        let avg_rating =
            ratings.iter().map(|r| r.value as f64).sum::<f64>() / ratings.len() as f64;
        let rating = if avg_rating >= 4.0 { 0.3 } else { 0.2 };
        let popularity = 0.2;
        // Residual collaborative component, floored at zero
        let user_preference = (1.0 - (genre + rating + popularity)).max(0.0);

        Some(FeatureWeights {
            genre,
            rating,
            popularity,
            user_preference,
        })
    }

    /// Local deviations of the target against the corpus average.
    /// Empty when the item carries no usable fields and no history applies.
    async fn local_deviations(
        &self,
        ratings: &[Rating],
        liked: &[Movie],
        movie: &Movie,
    ) -> Vec<LocalExplanation> {
        let mut explanations = Vec::new();

        if movie.vote > 0.0 {
            let avg_vote = match self.store.avg_vote().await {
                Ok(avg) if avg > 0.0 => avg,
                _ => 5.0,
            };
            let impact = (movie.vote - avg_vote) / 10.0;
            explanations.push(LocalExplanation {
                feature: "Movie Quality".to_string(),
                observed_value: format!("{}/10", movie.vote),
                impact,
                direction: direction_of(impact),
            });
        }

        if movie.popularity > 0.0 {
            let avg_pop = match self.store.avg_popularity().await {
                Ok(avg) if avg > 0.0 => avg,
                _ => 1.0,
            };
            let raw = (movie.popularity - avg_pop) / avg_pop;
            explanations.push(LocalExplanation {
                feature: "Popularity".to_string(),
                observed_value: format!("{:.1}", movie.popularity),
                impact: raw.min(POPULARITY_IMPACT_CAP),
                direction: direction_of(raw),
            });
        }

        if !ratings.is_empty() && !liked.is_empty() {
            let movie_words = word_set(&movie.overview);
            let sample = &liked[..liked.len().min(HISTORY_SAMPLE)];
            let avg_overlap = sample
                .iter()
                .map(|l| word_set(&l.overview).intersection(&movie_words).count() as f64)
                .sum::<f64>()
                / sample.len() as f64;
            explanations.push(LocalExplanation {
                feature: "User History Match".to_string(),
                observed_value: format!("{} liked movies", liked.len()),
                impact: (avg_overlap / 10.0).min(0.5),
                direction: Direction::Positive,
            });
        }

        explanations
    }
}

fn direction_of(impact: f64) -> Direction {
    if impact > 0.0 {
        Direction::Positive
    } else {
        Direction::Negative
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Count of shared words longer than four characters
fn significant_overlap(a: &str, b: &str) -> usize {
    let a_words = word_set(a);
    let b_words = word_set(b);
    a_words
        .intersection(&b_words)
        .filter(|w| w.len() > 4)
        .count()
}

/// Latent-dimension contributions from a factorized artifact.
/// `None` on a missing user/item mapping or dimension mismatch — an absent
/// signal, not a failure.
pub fn embedding_contributions(
    artifact: &TrainedArtifact,
    user_id: i64,
    movie_id: i64,
) -> Option<EmbeddingContributions> {
    let user_idx = artifact.user_index(user_id)?;
    let item_idx = artifact.item_index(movie_id)?;
    let (user, item) = artifact.latent_pair(user_idx, item_idx)?;

    let contributions: Vec<f64> = user
        .iter()
        .zip(item)
        .map(|(u, i)| (*u as f64) * (*i as f64))
        .collect();

    let mut order: Vec<usize> = (0..contributions.len()).collect();
    order.sort_by(|&a, &b| {
        contributions[b]
            .abs()
            .partial_cmp(&contributions[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(5);

    Some(EmbeddingContributions {
        top_values: order.iter().map(|&d| contributions[d]).collect(),
        top_dimensions: order,
        prediction_score: contributions.iter().sum(),
    })
}

/// Quality/popularity weight split for items outside the catalog,
/// where no user history or trained state applies
pub fn simple_explain(vote: f64, popularity: f64, max_popularity: f64) -> (f64, Vec<LocalExplanation>) {
    let vote01 = vote / 10.0;
    let pop01 = popularity / max_popularity.max(1.0);
    let score = 0.6 * vote01 + 0.4 * pop01;
    let reasons = vec![
        LocalExplanation {
            feature: "TMDB rating".to_string(),
            observed_value: format!("{}/10", vote),
            impact: 0.6 * vote01,
            direction: direction_of(vote01),
        },
        LocalExplanation {
            feature: "Popularity".to_string(),
            observed_value: format!("{:.1}", popularity),
            impact: 0.4 * pop01,
            direction: direction_of(pop01),
        },
    ];
    (score, reasons)
}
