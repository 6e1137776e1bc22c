use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDB API key
    #[serde(default)]
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Hard timeout for a single TMDB request, in seconds
    #[serde(default = "default_tmdb_timeout_secs")]
    pub tmdb_timeout_secs: u64,

    /// Ollama base URL for natural-language explanations
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Ollama model name
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Directory where trained scorer artifacts are persisted
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Rating at or above which an interaction counts as "liked" (1-5 scale)
    #[serde(default = "default_liked_threshold")]
    pub liked_threshold: i32,

    /// How many recent liked interactions feed user-preference queries
    #[serde(default = "default_liked_history")]
    pub liked_history: usize,

    /// Minimum rating count before personalized recommendations are returned
    #[serde(default = "default_min_ratings")]
    pub min_ratings: usize,

    /// Latent dimension for the factorized scorer
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Epochs for a full training pass
    #[serde(default = "default_train_epochs")]
    pub train_epochs: usize,

    /// Epochs for the short first-use training pass
    #[serde(default = "default_bootstrap_epochs")]
    pub bootstrap_epochs: usize,

    /// Hard timeout for a single generation call, in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Word count generated explanations are truncated toward
    #[serde(default = "default_generation_target_words")]
    pub generation_target_words: usize,

    /// Word count above which generated explanations are truncated
    #[serde(default = "default_generation_soft_cap_words")]
    pub generation_soft_cap_words: usize,

    /// Sampling temperature for generation
    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f64,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_liked_threshold() -> i32 {
    4
}

fn default_liked_history() -> usize {
    5
}

fn default_min_ratings() -> usize {
    5
}

fn default_embedding_dim() -> usize {
    16
}

fn default_train_epochs() -> usize {
    8
}

fn default_bootstrap_epochs() -> usize {
    4
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_tmdb_timeout_secs() -> u64 {
    10
}

fn default_generation_target_words() -> usize {
    40
}

fn default_generation_soft_cap_words() -> usize {
    45
}

fn default_generation_temperature() -> f64 {
    0.7
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmdb_api_key: String::new(),
            tmdb_api_url: default_tmdb_api_url(),
            tmdb_timeout_secs: default_tmdb_timeout_secs(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            model_dir: default_model_dir(),
            host: default_host(),
            port: default_port(),
            liked_threshold: default_liked_threshold(),
            liked_history: default_liked_history(),
            min_ratings: default_min_ratings(),
            embedding_dim: default_embedding_dim(),
            train_epochs: default_train_epochs(),
            bootstrap_epochs: default_bootstrap_epochs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            generation_target_words: default_generation_target_words(),
            generation_soft_cap_words: default_generation_soft_cap_words(),
            generation_temperature: default_generation_temperature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.liked_threshold, 4);
        assert_eq!(config.liked_history, 5);
        assert_eq!(config.min_ratings, 5);
        assert_eq!(config.port, 3000);
        assert_eq!(config.tmdb_api_url, "https://api.themoviedb.org/3");
        assert_eq!(config.tmdb_timeout_secs, 10);
        assert_eq!(config.generation_target_words, 40);
        assert_eq!(config.generation_soft_cap_words, 45);
        assert!((config.generation_temperature - 0.7).abs() < f64::EPSILON);
    }
}
