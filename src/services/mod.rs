pub mod artifact;
pub mod attribution;
pub mod generation;
pub mod narrative;
pub mod providers;
pub mod scorer;
pub mod similarity;
pub mod trainer;

pub use artifact::ArtifactStore;
pub use attribution::Explainer;
pub use narrative::NarrativeSynthesizer;
pub use scorer::ScorerChain;
pub use similarity::SimilarityIndex;
