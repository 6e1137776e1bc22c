/// Similarity index over catalog text
///
/// Fits a TF-IDF vector space over every movie's title + overview and answers
/// nearest-neighbour queries by exact cosine scan. The fitted state lives in
/// an immutable snapshot behind a lock; rebuilding constructs a fresh snapshot
/// and swaps the reference, so concurrent readers never observe a partially
/// built index. Search operations never surface errors — any internal failure
/// degrades to an empty result.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    db::EntityStore,
    models::{Movie, SimilarMovie},
};

/// Sparse L2-normalized term vector, sorted by term index
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector(Vec<(u32, f32)>);

impl SparseVector {
    /// Dot product of two normalized sparse vectors = cosine similarity
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut dot = 0.0f64;
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].0.cmp(&other.0[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += self.0[i].1 as f64 * other.0[j].1 as f64;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// TF-IDF vectorizer fitted over a document corpus
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

impl TfidfVectorizer {
    /// Fit vocabulary and smoothed inverse document frequencies
    pub fn fit(corpus: &[String]) -> Self {
        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();

        for doc in corpus {
            let mut seen: Vec<u32> = Vec::new();
            for token in tokenize(doc) {
                let next_id = vocabulary.len() as u32;
                let term_id = *vocabulary.entry(token).or_insert(next_id);
                if term_id as usize >= doc_freq.len() {
                    doc_freq.push(0);
                }
                if !seen.contains(&term_id) {
                    seen.push(term_id);
                    doc_freq[term_id as usize] += 1;
                }
            }
        }

        let n_docs = corpus.len() as f32;
        let idf = doc_freq
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        Self { vocabulary, idf }
    }

    /// Transform a document into a normalized sparse TF-IDF vector.
    /// Out-of-vocabulary terms are dropped; empty text yields an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&term_id) = self.vocabulary.get(&token) {
                *counts.entry(term_id).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(term_id, tf)| (term_id, tf * self.idf[term_id as usize]))
            .collect();
        entries.sort_by_key(|&(term_id, _)| term_id);

        let norm: f32 = entries.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for entry in entries.iter_mut() {
                entry.1 /= norm;
            }
        }

        SparseVector(entries)
    }
}

/// A fully built, immutable index snapshot.
/// `ids[i]` is the movie whose text produced row `i`.
struct IndexSnapshot {
    vectorizer: TfidfVectorizer,
    rows: Vec<SparseVector>,
    ids: Vec<i64>,
}

impl IndexSnapshot {
    fn build(movies: &[Movie]) -> Option<Self> {
        if movies.is_empty() {
            return None;
        }
        let texts: Vec<String> = movies.iter().map(Movie::text).collect();
        let vectorizer = TfidfVectorizer::fit(&texts);
        let rows = texts.iter().map(|t| vectorizer.transform(t)).collect();
        let ids = movies.iter().map(|m| m.id).collect();
        Some(Self {
            vectorizer,
            rows,
            ids,
        })
    }

    /// Top-k rows by cosine similarity, highest first, k clamped to row count
    fn search(&self, query: &str, k: usize) -> Vec<(i64, f64)> {
        let query_vec = self.vectorizer.transform(query);
        if query_vec.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(i64, f64)> = self
            .rows
            .iter()
            .zip(self.ids.iter())
            .map(|(row, &id)| (id, query_vec.cosine(row)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k.min(self.ids.len()));
        scored
    }
}

/// Shared, rebuildable similarity index
pub struct SimilarityIndex {
    store: Arc<dyn EntityStore>,
    liked_threshold: i32,
    liked_history: usize,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuilding: AtomicBool,
}

impl SimilarityIndex {
    pub fn new(store: Arc<dyn EntityStore>, liked_threshold: i32, liked_history: usize) -> Self {
        Self {
            store,
            liked_threshold,
            liked_history,
            snapshot: RwLock::new(None),
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Rebuild from the current catalog and swap the snapshot in.
    ///
    /// Idempotent; concurrent rebuild requests collapse to one in-flight
    /// build, with other callers keeping the stale snapshot. An empty catalog
    /// leaves the index unbuilt.
    pub async fn rebuild(&self) {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return;
        }

        let movies = match self.store.list_movies().await {
            Ok(movies) => movies,
            Err(e) => {
                tracing::warn!(error = %e, "Similarity index rebuild failed to read catalog");
                self.rebuilding.store(false, Ordering::SeqCst);
                return;
            }
        };

        match IndexSnapshot::build(&movies) {
            Some(built) => {
                tracing::info!(indexed = built.ids.len(), "Similarity index rebuilt");
                *self.snapshot.write().await = Some(Arc::new(built));
            }
            None => {
                tracing::warn!("No movies in catalog, similarity index left unbuilt");
            }
        }

        self.rebuilding.store(false, Ordering::SeqCst);
    }

    /// Current snapshot, lazily attempting exactly one rebuild when unbuilt
    async fn current(&self) -> Option<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.snapshot.read().await.clone() {
            return Some(snapshot);
        }
        self.rebuild().await;
        self.snapshot.read().await.clone()
    }

    /// Top-k `(movie_id, similarity)` pairs for a text query, highest first.
    /// Returns an empty list for an unbuilt index or degenerate query.
    pub async fn search(&self, query: &str, k: usize) -> Vec<(i64, f64)> {
        match self.current().await {
            Some(snapshot) => snapshot.search(query, k),
            None => Vec::new(),
        }
    }

    /// Neighbours of a catalog movie using its own text as the query.
    /// The movie itself is excluded from the results.
    pub async fn context_for_movie(&self, movie_id: i64, k: usize) -> Vec<SimilarMovie> {
        let movie = match self.store.get_movie(movie_id).await {
            Ok(Some(movie)) => movie,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, movie_id, "Context lookup failed");
                return Vec::new();
            }
        };

        // One extra hit so self-exclusion still yields k neighbours
        let hits = self.search(&movie.text(), k + 1).await;
        let hits: Vec<(i64, f64)> = hits.into_iter().filter(|&(id, _)| id != movie_id).take(k).collect();
        self.enrich(hits).await
    }

    /// Neighbours of free text, for titles not (yet) in the catalog
    pub async fn context_for_text(&self, text: &str, k: usize) -> Vec<SimilarMovie> {
        let hits = self.search(text, k).await;
        self.enrich(hits).await
    }

    /// Neighbours of a user's taste, built from the text of their most
    /// recent liked interactions. Empty when no interaction qualifies.
    pub async fn context_for_user(&self, user_id: i64, k: usize) -> Vec<SimilarMovie> {
        let ratings = match self.store.list_ratings(user_id).await {
            Ok(ratings) => ratings,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "User context lookup failed");
                return Vec::new();
            }
        };

        let mut query_parts: Vec<String> = Vec::new();
        for rating in ratings
            .iter()
            .filter(|r| r.value >= self.liked_threshold)
            .take(self.liked_history)
        {
            if let Ok(Some(movie)) = self.store.get_movie(rating.movie_id).await {
                query_parts.push(movie.text());
            }
        }

        if query_parts.is_empty() {
            return Vec::new();
        }

        let hits = self.search(&query_parts.join(" "), k).await;
        self.enrich(hits).await
    }

    async fn enrich(&self, hits: Vec<(i64, f64)>) -> Vec<SimilarMovie> {
        let mut context = Vec::with_capacity(hits.len());
        for (movie_id, similarity) in hits {
            if let Ok(Some(movie)) = self.store.get_movie(movie_id).await {
                context.push(SimilarMovie {
                    movie_id,
                    title: movie.title,
                    vote: movie.vote,
                    similarity,
                });
            }
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::MovieFields;

    fn fields(title: &str, overview: &str, vote: f64) -> MovieFields {
        MovieFields {
            title: title.to_string(),
            overview: overview.to_string(),
            year: "2020".to_string(),
            poster: None,
            popularity: 1.0,
            vote,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_movie(None, fields("Space Odyssey", "astronauts travel deep space mission", 8.0))
            .await;
        store
            .insert_movie(None, fields("Mars Station", "astronauts stranded on mars space base", 7.0))
            .await;
        store
            .insert_movie(None, fields("Baking Show", "amateur bakers compete with cakes", 6.0))
            .await;
        store
    }

    #[test]
    fn test_tfidf_empty_text_is_empty_vector() {
        let vectorizer = TfidfVectorizer::fit(&["hello world".to_string()]);
        assert!(vectorizer.transform("").is_empty());
    }

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let corpus = vec!["space mission space".to_string(), "baking cakes".to_string()];
        let vectorizer = TfidfVectorizer::fit(&corpus);
        let v = vectorizer.transform(&corpus[0]);
        assert!((v.cosine(&v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_sorted_and_bounded() {
        let store = seeded_store().await;
        let index = SimilarityIndex::new(store, 4, 5);

        let hits = index.search("astronauts in space", 2).await;
        assert!(hits.len() <= 2);
        for window in hits.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
        for &(_, sim) in &hits {
            assert!((0.0..=1.0 + 1e-9).contains(&sim));
        }
    }

    #[tokio::test]
    async fn test_k_clamped_to_catalog_size() {
        let store = seeded_store().await;
        let index = SimilarityIndex::new(store, 4, 5);
        let hits = index.search("space", 50).await;
        assert!(hits.len() <= 3);
    }

    #[tokio::test]
    async fn test_context_for_movie_excludes_self() {
        let store = seeded_store().await;
        let index = SimilarityIndex::new(store.clone(), 4, 5);

        let movies = store.list_movies().await.unwrap();
        let target = &movies[0];
        let context = index.context_for_movie(target.id, 2).await;
        assert!(!context.is_empty());
        assert!(context.iter().all(|c| c.movie_id != target.id));
        // The other space movie should outrank the baking show
        assert_eq!(context[0].title, "Mars Station");
    }

    #[tokio::test]
    async fn test_context_for_user_requires_liked_history() {
        let store = seeded_store().await;
        let index = SimilarityIndex::new(store.clone(), 4, 5);

        assert!(index.context_for_user(1, 3).await.is_empty());

        let movies = store.list_movies().await.unwrap();
        store.create_rating(Some(1), movies[0].id, 3).await.unwrap();
        // Below the liked threshold, still no context
        assert!(index.context_for_user(1, 3).await.is_empty());

        store.create_rating(Some(1), movies[0].id, 5).await.unwrap();
        assert!(!index.context_for_user(1, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_returns_empty_not_error() {
        let store = Arc::new(MemoryStore::new());
        let index = SimilarityIndex::new(store.clone(), 4, 5);
        assert!(index.search("anything", 5).await.is_empty());

        // Catalog populated later: the lazy rebuild picks it up
        store
            .insert_movie(None, fields("Space Odyssey", "space mission", 8.0))
            .await;
        assert!(!index.search("space", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_idempotent() {
        let store = seeded_store().await;
        let index = SimilarityIndex::new(store, 4, 5);

        index.rebuild().await;
        let first = index.search("space astronauts", 3).await;
        index.rebuild().await;
        let second = index.search("space astronauts", 3).await;
        assert_eq!(first, second);
    }
}
