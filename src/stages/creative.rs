//! Creative stage: proposes 10-12 new ad concepts from a brief derived from
//! the metrics snapshot.
//!
//! Runs concurrently with the insight branch and never reads hypotheses or
//! evaluations. Generation is deterministic for a given brief and seed; the
//! batch always covers all four messaging angles and carries at least one
//! Facebook-specific and one Instagram-specific framing.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::contract::validate::{normalized_headline, validate_ideas, IDEA_RANGE};
use crate::contract::{CreativeAngle, CreativeIdea, MetricsSnapshot, PlatformFit};
use crate::error::SchemaError;
use crate::llm::{extract_json, GenerationRequest, Message, ModelInvoker};
use crate::prompts::CREATIVE_SYSTEM_PROMPT;

use super::MODEL_ATTEMPTS;

/// Fallback themes when the snapshot yields no usable message keywords.
const FALLBACK_KEYWORDS: [&str; 4] = ["comfort", "breathable", "seamless", "cooling"];

/// Stopwords excluded from keyword extraction.
const STOPWORDS: [&str; 18] = [
    "the", "and", "for", "with", "your", "you", "our", "that", "this", "from", "are", "was",
    "has", "have", "get", "now", "all", "day",
];

/// Condensed view of the snapshot handed to the creative stage.
///
/// Carries only what ideation needs; the stage never sees the raw snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CreativeBrief {
    /// Dominant message themes extracted from creative rows.
    pub keywords: Vec<String>,
    /// Messages of the current top performers, for tone reference.
    pub top_messages: Vec<String>,
    /// Creative types that are underperforming.
    pub weak_creative_types: Vec<String>,
}

impl CreativeBrief {
    /// Builds a brief from the snapshot.
    ///
    /// Keywords come from a frequency count over all creative messages
    /// (lowercased, punctuation stripped, stopwords removed, length > 3),
    /// capped at twelve. Falls back to a fixed theme list when nothing
    /// usable is found.
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let strip = Regex::new(r"[^a-zA-Z0-9\s]").expect("valid regex");

        let messages: Vec<&str> = snapshot
            .low_ctr_creatives
            .iter()
            .chain(snapshot.top_creatives.iter())
            .map(|c| c.creative_message.as_str())
            .filter(|m| !m.trim().is_empty())
            .collect();

        let mut counts: std::collections::BTreeMap<String, usize> =
            std::collections::BTreeMap::new();
        for message in &messages {
            let cleaned = strip.replace_all(&message.to_ascii_lowercase(), " ").into_owned();
            for token in cleaned.split_whitespace() {
                if token.len() > 3 && !STOPWORDS.contains(&token) {
                    *counts.entry(token.to_string()).or_insert(0) += 1;
                }
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut keywords: Vec<String> = ranked.into_iter().take(12).map(|(w, _)| w).collect();
        // A sparse pool cannot fill a full batch; pad with the fixed themes.
        if keywords.len() < FALLBACK_KEYWORDS.len() {
            for fallback in FALLBACK_KEYWORDS {
                if !keywords.iter().any(|k| k == fallback) {
                    keywords.push(fallback.to_string());
                }
            }
        }

        let top_messages = snapshot
            .top_creatives
            .iter()
            .map(|c| c.creative_message.clone())
            .filter(|m| !m.trim().is_empty())
            .take(5)
            .collect();

        let mut weak_types: Vec<String> = snapshot
            .low_ctr_creatives
            .iter()
            .map(|c| c.creative_type.clone())
            .filter(|t| !t.trim().is_empty())
            .collect();
        weak_types.sort();
        weak_types.dedup();

        Self {
            keywords,
            top_messages,
            weak_creative_types: weak_types,
        }
    }
}

/// Configuration for the creative stage.
#[derive(Debug, Clone)]
pub struct CreativeConfig {
    /// Seed for deterministic template shuffling.
    pub seed: u64,
    /// Resample attempts when a generated headline collides.
    pub max_rewrites: usize,
    /// Model to use on the LLM path.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Maximum tokens for the response.
    pub max_tokens: u32,
}

impl Default for CreativeConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_rewrites: 8,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2500,
        }
    }
}

/// Creative stage.
pub struct CreativeStage {
    invoker: Option<Arc<dyn ModelInvoker>>,
    config: CreativeConfig,
}

impl std::fmt::Debug for CreativeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreativeStage")
            .field("config", &self.config)
            .field("model_backed", &self.invoker.is_some())
            .finish()
    }
}

/// Wire shape of the creative model output.
#[derive(Debug, Deserialize)]
struct IdeasEnvelope {
    ideas: Vec<CreativeIdea>,
}

impl CreativeStage {
    /// Creates a deterministic creative stage with no model attached.
    pub fn offline() -> Self {
        Self {
            invoker: None,
            config: CreativeConfig::default(),
        }
    }

    /// Creates a deterministic creative stage with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            invoker: None,
            config: CreativeConfig {
                seed,
                ..CreativeConfig::default()
            },
        }
    }

    /// Creates a model-backed creative stage.
    pub fn with_invoker(invoker: Arc<dyn ModelInvoker>, config: CreativeConfig) -> Self {
        Self {
            invoker: Some(invoker),
            config,
        }
    }

    /// Generates 10-12 creative ideas from the brief.
    pub async fn generate(&self, brief: &CreativeBrief) -> Result<Vec<CreativeIdea>, SchemaError> {
        if let Some(invoker) = &self.invoker {
            for attempt in 0..MODEL_ATTEMPTS {
                match self.attempt_generate(invoker.as_ref(), brief).await {
                    Ok(ideas) => return Ok(ideas),
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            error = %e,
                            "creative model attempt failed"
                        );
                    }
                }
            }
            tracing::warn!("creative model path exhausted; using template generator");
        }

        let ideas = self.template_ideas(brief);
        validate_ideas(&ideas)?;
        Ok(ideas)
    }

    /// Single model attempt: prompt, parse, validate.
    async fn attempt_generate(
        &self,
        invoker: &dyn ModelInvoker,
        brief: &CreativeBrief,
    ) -> Result<Vec<CreativeIdea>, SchemaError> {
        let payload = json!(brief);
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(CREATIVE_SYSTEM_PROMPT),
                Message::user(format!("Creative brief JSON:\n{payload}")),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = invoker
            .invoke(request)
            .await
            .map_err(|e| SchemaError::Parse(e.to_string()))?;
        let content = response
            .first_content()
            .ok_or_else(|| SchemaError::Parse("empty model response".to_string()))?;
        let json = extract_json(content).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let envelope: IdeasEnvelope = serde_json::from_str(&json)?;

        let mut ideas = envelope.ideas;
        for (i, idea) in ideas.iter_mut().enumerate() {
            idea.id = format!("c{}", i + 1);
        }
        validate_ideas(&ideas)?;
        Ok(ideas)
    }

    /// Deterministic template-based ideation.
    ///
    /// Shuffles (template, keyword) pairs with a seeded generator, then fills
    /// the batch while cycling angles and platforms so coverage holds by
    /// construction. Colliding headlines get a bounded number of resamples
    /// before the pair is skipped.
    fn template_ideas(&self, brief: &CreativeBrief) -> Vec<CreativeIdea> {
        let (_, max) = IDEA_RANGE;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut pairs: Vec<(usize, &str)> = Vec::new();
        for template_idx in 0..HEADLINE_TEMPLATES.len() {
            for keyword in &brief.keywords {
                pairs.push((template_idx, keyword.as_str()));
            }
        }
        pairs.shuffle(&mut rng);

        let platforms = [PlatformFit::Facebook, PlatformFit::Instagram, PlatformFit::Both];
        let mut seen: HashSet<String> = HashSet::new();
        let mut ideas: Vec<CreativeIdea> = Vec::new();
        let mut cursor = 0usize;

        while ideas.len() < max && cursor < pairs.len() {
            let angle = CreativeAngle::ALL[ideas.len() % CreativeAngle::ALL.len()];
            let platform = platforms[ideas.len() % platforms.len()];

            let mut attempt = 0usize;
            let mut placed = false;
            while attempt <= self.config.max_rewrites && cursor < pairs.len() {
                let (template_idx, keyword) = pairs[cursor];
                cursor += 1;
                let headline = fill(HEADLINE_TEMPLATES[template_idx], keyword, angle);
                let key = normalized_headline(&headline);
                if seen.insert(key) {
                    ideas.push(CreativeIdea {
                        id: format!("c{}", ideas.len() + 1),
                        headline,
                        hook: hook_for(platform, keyword),
                        cta: CTAS[ideas.len() % CTAS.len()].to_string(),
                        image_idea: image_for(platform, keyword),
                        angle,
                        platform_fit: platform,
                    });
                    placed = true;
                    break;
                }
                attempt += 1;
            }
            if !placed {
                break;
            }
        }

        ideas
    }
}

const HEADLINE_TEMPLATES: [&str; 6] = [
    "{kw_title} that works as hard as you do",
    "Finally, {kw} without the compromise",
    "The {kw} upgrade your day deserves",
    "Meet the new standard for {kw}",
    "Why thousands switched for {kw}",
    "{kw_title}, rebuilt from the thread up",
];

const CTAS: [&str; 4] = ["Shop now", "See the difference", "Try it risk-free", "Get yours today"];

/// Renders a headline template, nudging wording by angle so angle cycling
/// produces distinct copy even for the same keyword.
fn fill(template: &str, keyword: &str, angle: CreativeAngle) -> String {
    let kw_title = title_case(keyword);
    let base = template
        .replace("{kw_title}", &kw_title)
        .replace("{kw}", keyword);
    match angle {
        CreativeAngle::Performance => base,
        CreativeAngle::Comfort => format!("{base} - all-day ease"),
        CreativeAngle::Emotion => format!("{base} - feel the change"),
        CreativeAngle::SocialProof => format!("{base} - loved by thousands"),
    }
}

fn hook_for(platform: PlatformFit, keyword: &str) -> String {
    match platform {
        PlatformFit::Facebook => format!("Still putting up with gear that ignores {keyword}?"),
        PlatformFit::Instagram => format!("POV: you just discovered real {keyword}."),
        PlatformFit::Both => format!("Your daily routine is about to get more {keyword}."),
    }
}

fn image_for(platform: PlatformFit, keyword: &str) -> String {
    match platform {
        PlatformFit::Facebook => format!(
            "Split-screen before/after focused on {keyword}, bold overlay text"
        ),
        PlatformFit::Instagram => format!(
            "UGC-style close-up highlighting {keyword}, natural light, no text overlay"
        ),
        PlatformFit::Both => format!("Product flat lay with {keyword} callout badges"),
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::CreativeRecord;

    fn brief() -> CreativeBrief {
        CreativeBrief {
            keywords: vec![
                "comfort".to_string(),
                "breathable".to_string(),
                "seamless".to_string(),
                "cooling".to_string(),
            ],
            top_messages: vec![],
            weak_creative_types: vec![],
        }
    }

    #[tokio::test]
    async fn offline_batch_passes_contract_checks() {
        let ideas = CreativeStage::offline().generate(&brief()).await.expect("ideas");
        assert!((10..=12).contains(&ideas.len()));
        validate_ideas(&ideas).expect("contract holds");
    }

    #[tokio::test]
    async fn same_seed_gives_identical_batches() {
        let a = CreativeStage::with_seed(7).generate(&brief()).await.expect("ideas");
        let b = CreativeStage::with_seed(7).generate(&brief()).await.expect("ideas");
        let headlines_a: Vec<&str> = a.iter().map(|i| i.headline.as_str()).collect();
        let headlines_b: Vec<&str> = b.iter().map(|i| i.headline.as_str()).collect();
        assert_eq!(headlines_a, headlines_b);
    }

    #[tokio::test]
    async fn different_seeds_reorder_the_batch() {
        let a = CreativeStage::with_seed(1).generate(&brief()).await.expect("ideas");
        let b = CreativeStage::with_seed(2).generate(&brief()).await.expect("ideas");
        let headlines_a: Vec<&str> = a.iter().map(|i| i.headline.as_str()).collect();
        let headlines_b: Vec<&str> = b.iter().map(|i| i.headline.as_str()).collect();
        assert_ne!(headlines_a, headlines_b);
    }

    #[test]
    fn brief_extracts_ranked_keywords() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.top_creatives = vec![
            CreativeRecord {
                creative_message: "Breathable mesh, breathable comfort!".to_string(),
                ..Default::default()
            },
            CreativeRecord {
                creative_message: "Breathable all summer long".to_string(),
                ..Default::default()
            },
        ];
        let brief = CreativeBrief::from_snapshot(&snapshot);
        assert_eq!(brief.keywords.first().map(String::as_str), Some("breathable"));
    }

    #[test]
    fn brief_falls_back_when_messages_are_empty() {
        let brief = CreativeBrief::from_snapshot(&MetricsSnapshot::default());
        assert_eq!(brief.keywords, FALLBACK_KEYWORDS.to_vec());
    }

    #[tokio::test]
    async fn single_repeated_phrase_still_fills_a_batch() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.low_ctr_creatives = (0..5)
            .map(|i| CreativeRecord {
                ad_id: format!("ad_{i}"),
                creative_message: "cooling cooling cooling".to_string(),
                ..Default::default()
            })
            .collect();
        let brief = CreativeBrief::from_snapshot(&snapshot);
        assert!(brief.keywords.len() >= 4);

        let ideas = CreativeStage::offline().generate(&brief).await.expect("ideas");
        assert!(ideas.len() >= 10);
    }

    #[test]
    fn headlines_are_distinct_after_normalization() {
        let ideas = CreativeStage::offline().template_ideas(&brief());
        let mut seen = HashSet::new();
        for idea in &ideas {
            assert!(seen.insert(normalized_headline(&idea.headline)));
        }
    }
}
