/// Narrative synthesizer
///
/// Turns an attribution record plus similarity context into bounded-length
/// prose. One generation attempt under a timeout; the result is normalized to
/// a target word count. Any failure falls through a three-tier ladder —
/// generated → similarity-templated → numeric-templated — that always ends in
/// a non-empty explanation string.
use std::sync::Arc;

use serde::Serialize;

use crate::models::{AttributionRecord, Movie, SimilarMovie};

use super::generation::{GenerationOptions, GenerationService};

/// Which tier of the ladder produced the explanation
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKind {
    Generated,
    SimilarityTemplate,
    NumericTemplate,
}

#[derive(Debug, Clone, Serialize)]
pub struct NarrativeExplanation {
    pub text: String,
    pub kind: NarrativeKind,
}

/// Characters of the overview embedded in the prompt
const OVERVIEW_PROMPT_CHARS: usize = 200;

pub struct NarrativeSynthesizer {
    generator: Arc<dyn GenerationService>,
    options: GenerationOptions,
}

impl NarrativeSynthesizer {
    pub fn new(generator: Arc<dyn GenerationService>, options: GenerationOptions) -> Self {
        Self { generator, options }
    }

    /// Produce an explanation for the recommendation, degrading through the
    /// ladder on any generation failure. Always returns non-empty text.
    pub async fn explain(
        &self,
        movie: &Movie,
        user_summary: &str,
        attribution: &AttributionRecord,
        similar: &[SimilarMovie],
    ) -> NarrativeExplanation {
        let prompt = self.build_prompt(movie, user_summary, attribution, similar);

        match self.generator.generate(&prompt, &self.options).await {
            Ok(text) => NarrativeExplanation {
                text: self.postprocess(text),
                kind: NarrativeKind::Generated,
            },
            Err(e) => {
                tracing::warn!(error = %e, movie = %movie.title, "Generation failed, using template");
                self.templated(movie, attribution, similar)
            }
        }
    }

    fn build_prompt(
        &self,
        movie: &Movie,
        user_summary: &str,
        attribution: &AttributionRecord,
        similar: &[SimilarMovie],
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(format!(
            "Movie: '{}' (Rating: {}/10, Popularity: {:.1}).",
            movie.title, movie.vote, movie.popularity
        ));

        let overview = truncate_chars(&movie.overview, OVERVIEW_PROMPT_CHARS);
        parts.push(format!(
            "Overview: {}.",
            if overview.is_empty() { "N/A" } else { &overview }
        ));

        parts.push(user_summary.to_string());

        if !similar.is_empty() {
            let titles: Vec<String> = similar
                .iter()
                .map(|s| format!("{} ({}/10)", s.title, s.vote))
                .collect();
            parts.push(format!("Similar movies: {}.", titles.join(", ")));
        }

        if let Some(weights) = &attribution.feature_weights {
            parts.push(format!(
                "Feature importance: Genre ({:.3}), Rating ({:.3}), Popularity ({:.3}), User preference ({:.3}).",
                weights.genre, weights.rating, weights.popularity, weights.user_preference
            ));
        }

        if !attribution.local_explanations.is_empty() {
            let factors: Vec<String> = attribution
                .local_explanations
                .iter()
                .take(2)
                .map(|e| format!("{} ({:.3})", e.feature, e.impact))
                .collect();
            parts.push(format!("Key factors: {}.", factors.join(", ")));
        }

        parts.push(format!(
            "Explain in {} words why this movie is recommended. Be conversational and personal. End with proper punctuation.",
            self.options.target_words
        ));
        parts.join(" ")
    }

    /// Normalize generated text to the target word count and guarantee
    /// terminal punctuation
    fn postprocess(&self, text: String) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut text = if words.len() > self.options.soft_cap_words {
            let mut truncated = words[..self.options.target_words].join(" ");
            // Prefer ending on a sentence boundary in the trailing third
            match truncated.rfind('.') {
                Some(idx) if idx as f64 > truncated.len() as f64 * 0.7 => {
                    truncated.truncate(idx + 1);
                    truncated
                }
                _ => {
                    truncated.push_str("...");
                    truncated
                }
            }
        } else {
            words.join(" ")
        };

        if !text.ends_with(['.', '!', '?']) {
            text.push('.');
        }
        text
    }

    /// Ladder tiers two and three
    fn templated(
        &self,
        movie: &Movie,
        attribution: &AttributionRecord,
        similar: &[SimilarMovie],
    ) -> NarrativeExplanation {
        if let Some(top) = similar.first() {
            let mut text = format!("This movie is similar to {} ({}/10).", top.title, top.vote);
            if let Some(weights) = &attribution.feature_weights {
                text.push_str(&format!(
                    " Recommended primarily based on {}.",
                    weights.dominant()
                ));
            }
            return NarrativeExplanation {
                text,
                kind: NarrativeKind::SimilarityTemplate,
            };
        }

        let mut text = format!(
            "Rated {}/10 with popularity {:.1}.",
            movie.vote, movie.popularity
        );
        if attribution.combined_score != 0.0 {
            text.push_str(&format!(
                " Confidence score: {:.2}.",
                attribution.combined_score
            ));
        }
        NarrativeExplanation {
            text,
            kind: NarrativeKind::NumericTemplate,
        }
    }
}

/// Build the user-history summary line embedded in prompts
pub fn user_summary(liked: &[(String, i32)]) -> String {
    if liked.is_empty() {
        return "New user with no rating history.".to_string();
    }
    let titles: Vec<String> = liked
        .iter()
        .take(3)
        .map(|(title, value)| format!("{} ({}/5)", title, value))
        .collect();
    format!("User liked: {}.", titles.join(", "))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
