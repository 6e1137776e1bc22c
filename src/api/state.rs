use std::sync::Arc;

use crate::config::Config;
use crate::db::EntityStore;
use crate::services::artifact::ArtifactStore;
use crate::services::generation::{GenerationOptions, GenerationService};
use crate::services::providers::MetadataProvider;
use crate::services::trainer::{ArtifactHandle, Trainer};
use crate::services::{Explainer, NarrativeSynthesizer, ScorerChain, SimilarityIndex};

/// Shared application state: the store and provider seams plus the
/// pipeline services wired over them
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub similarity: Arc<SimilarityIndex>,
    pub scorer: Arc<ScorerChain>,
    pub artifacts: Arc<ArtifactHandle>,
    pub explainer: Arc<Explainer>,
    pub narrative: Arc<NarrativeSynthesizer>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the pipeline over the given collaborators. The scorer artifact
    /// and similarity index start empty and build lazily on first use.
    pub fn new(
        store: Arc<dyn EntityStore>,
        metadata: Arc<dyn MetadataProvider>,
        generator: Arc<dyn GenerationService>,
        config: Config,
    ) -> Self {
        let similarity = Arc::new(SimilarityIndex::new(
            store.clone(),
            config.liked_threshold,
            config.liked_history,
        ));

        let trainer = Trainer::new(store.clone(), config.embedding_dim);
        let artifact_store = ArtifactStore::new(&config.model_dir);
        let artifacts = Arc::new(ArtifactHandle::new(
            trainer,
            artifact_store,
            config.bootstrap_epochs,
        ));

        let scorer = Arc::new(ScorerChain::new(
            store.clone(),
            artifacts.clone(),
            config.liked_threshold,
        ));

        let explainer = Arc::new(Explainer::new(store.clone(), config.liked_threshold));

        let options = GenerationOptions {
            target_words: config.generation_target_words,
            soft_cap_words: config.generation_soft_cap_words,
            temperature: config.generation_temperature,
            timeout: std::time::Duration::from_secs(config.generation_timeout_secs),
        };
        let narrative = Arc::new(NarrativeSynthesizer::new(generator, options));

        Self {
            store,
            metadata,
            similarity,
            scorer,
            artifacts,
            explainer,
            narrative,
            config: Arc::new(config),
        }
    }
}
