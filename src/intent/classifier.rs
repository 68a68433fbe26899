// Two-stage intent classifier
//
// Stage one is the deterministic prefilter; stage two is a single cheap
// model call. When both fail the classifier fails open to wine_search at low
// confidence, so the identification ladder still runs and the user is never
// blocked on intent plumbing.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::prefilter::{Classification, ClassificationSource, IntentCategory, PatternPrefilter};
use crate::providers::{CompletionOptions, LlmProvider};

const CLASSIFY_PROMPT: &str = r#"Classify the user's message for a wine cellar app. Respond with only a JSON object:
{"category": "<command|confirmation|wine_search|recommendation|question>", "confidence": <0.0-1.0>}

- command: an app action (save, delete, cancel, show cellar)
- confirmation: answering yes/no to a pending prompt
- wine_search: naming or describing a specific wine to identify
- recommendation: asking what wine to buy or pair
- question: a general wine question

Message:
"#;

pub struct IntentClassifier {
    prefilter: PatternPrefilter,
    provider: Option<Arc<dyn LlmProvider>>,
    model: Option<String>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        Self {
            prefilter: PatternPrefilter::new(),
            provider,
            model: None,
            timeout,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Classify the input. Never errors: model failures fall back to
    /// wine_search at 0.5.
    pub async fn classify(&self, text: &str, cancel: &CancellationToken) -> Classification {
        if let Some(hit) = self.prefilter.classify(text) {
            tracing::debug!(
                category = hit.category.as_str(),
                confidence = hit.confidence,
                "intent resolved by prefilter"
            );
            return hit;
        }

        if let Some(provider) = &self.provider {
            match self.classify_with_llm(provider.as_ref(), text, cancel).await {
                Ok(hit) => return hit,
                Err(e) => {
                    tracing::warn!("intent LLM classification failed, falling back: {}", e);
                }
            }
        }

        Classification::new(
            IntentCategory::WineSearch,
            0.5,
            ClassificationSource::Fallback,
        )
    }

    async fn classify_with_llm(
        &self,
        provider: &dyn LlmProvider,
        text: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Classification> {
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        let opts = CompletionOptions::default()
            .with_model(model)
            .with_max_tokens(128)
            .with_temperature(0.0)
            .with_timeout(self.timeout)
            .with_cancel(cancel.clone());

        let prompt = format!("{}{}", CLASSIFY_PROMPT, text);
        let response = provider.complete(&prompt, &opts).await?;
        parse_classification(&response.content)
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    confidence: f64,
}

fn parse_classification(raw: &str) -> anyhow::Result<Classification> {
    let start = raw
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("no JSON object in classifier output"))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON object in classifier output"))?;
    let parsed: RawClassification = serde_json::from_str(&raw[start..=end])?;

    let category = match parsed.category.as_str() {
        "command" => IntentCategory::Command,
        "confirmation" => IntentCategory::Confirmation,
        "wine_search" => IntentCategory::WineSearch,
        "recommendation" => IntentCategory::Recommendation,
        "question" => IntentCategory::Question,
        other => anyhow::bail!("unknown intent category: {}", other),
    };
    Ok(Classification::new(
        category,
        parsed.confidence.clamp(0.0, 1.0),
        ClassificationSource::Llm,
    ))
}
