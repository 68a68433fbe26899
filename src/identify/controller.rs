// Tier escalation controller
//
// Walks the automatic ladder (tier1 -> tier1_5 -> tier2) until a rung's
// confidence clears a threshold, recording every attempt. Tier3 runs only
// through the explicit deeper-analysis entry point. Failed attempts count as
// confidence 0 and always escalate; a tier is never retried at its own rung.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::parser::parse_identification;
use super::prompts;
use super::types::{
    EscalationOutcome, FinalAction, FinalTier, IdentificationRequest, IdentificationResult,
    InputPayload, Tier, TierAttempt,
};
use crate::cache::{CacheKey, IdentificationCache};
use crate::config::{Config, EscalationConfig};
use crate::intent::{IntentCategory, IntentClassifier};
use crate::providers::{Capability, CompletionOptions, ErrorKind, LlmProvider};
use crate::usage::UsageHandle;

/// One rung of the ladder bound to a concrete provider.
#[derive(Clone)]
pub struct TierBinding {
    pub tier: Tier,
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
    pub timeout: Duration,
    pub thinking: bool,
}

pub struct EscalationController {
    ladder: Vec<TierBinding>,
    thresholds: EscalationConfig,
    cache: Arc<IdentificationCache>,
    usage: UsageHandle,
    classifier: Option<Arc<IntentClassifier>>,
}

impl EscalationController {
    pub fn new(
        ladder: Vec<TierBinding>,
        thresholds: EscalationConfig,
        cache: Arc<IdentificationCache>,
        usage: UsageHandle,
    ) -> Self {
        Self {
            ladder,
            thresholds,
            cache,
            usage,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Bind the configured tier ladder to constructed providers.
    pub fn bind_ladder(
        config: &Config,
        providers: &HashMap<String, Arc<dyn LlmProvider>>,
    ) -> Result<Vec<TierBinding>> {
        config
            .tiers
            .iter()
            .map(|entry| {
                let provider = providers
                    .get(&entry.provider)
                    .cloned()
                    .with_context(|| {
                        format!("tier {} references unknown provider", entry.tier)
                    })?;
                let model = entry
                    .model
                    .clone()
                    .unwrap_or_else(|| provider.default_model().to_string());
                Ok(TierBinding {
                    tier: entry.tier,
                    provider,
                    model,
                    timeout: Duration::from_secs(entry.timeout_secs),
                    thinking: entry.thinking,
                })
            })
            .collect()
    }

    /// Run the automatic escalation ladder for one request.
    pub async fn identify(
        &self,
        request: &IdentificationRequest,
        cancel: CancellationToken,
    ) -> Result<EscalationOutcome> {
        if let Some(outcome) = self.prefilter_gate(request, &cancel).await {
            self.usage.record_outcome(&outcome);
            return Ok(outcome);
        }
        if let Some(outcome) = self.cache_gate(request) {
            self.usage.record_outcome(&outcome);
            return Ok(outcome);
        }

        let mut trail: Vec<(TierAttempt, Option<IdentificationResult>)> = Vec::new();
        let mut action = FinalAction::UserChoice;

        let rungs: Vec<&TierBinding> =
            self.ladder.iter().filter(|b| b.tier.is_automatic()).collect();
        anyhow::ensure!(!rungs.is_empty(), "no automatic tiers configured");

        for (i, binding) in rungs.iter().enumerate() {
            let (attempt, result) = self.run_tier(binding, request, &cancel).await;
            self.usage.record_attempt(request.id, &attempt);
            let confidence = attempt.confidence;
            trail.push((attempt, result));

            if cancel.is_cancelled() {
                tracing::info!(request_id = %request.id, "client gone, ending ladder");
                break;
            }
            if confidence >= self.thresholds.auto_populate_threshold {
                action = FinalAction::AutoPopulate;
                break;
            }
            if confidence >= self.thresholds.suggest_threshold {
                action = FinalAction::Suggest;
                break;
            }
            if i + 1 < rungs.len() {
                tracing::info!(
                    request_id = %request.id,
                    tier = %binding.tier,
                    confidence,
                    "confidence below suggest threshold, escalating"
                );
            }
        }

        let outcome = self.finish(request, trail, action);
        self.usage.record_outcome(&outcome);
        Ok(outcome)
    }

    /// User-triggered deeper analysis: runs the tier3 rung once, outside the
    /// automatic ladder.
    pub async fn identify_deeper(
        &self,
        request: &IdentificationRequest,
        cancel: CancellationToken,
    ) -> Result<EscalationOutcome> {
        let binding = self
            .ladder
            .iter()
            .find(|b| b.tier == Tier::Tier3)
            .context("no tier3 configured for deeper analysis")?;

        let (attempt, result) = self.run_tier(binding, request, &cancel).await;
        self.usage.record_attempt(request.id, &attempt);

        let action = if attempt.confidence >= self.thresholds.auto_populate_threshold {
            FinalAction::AutoPopulate
        } else if attempt.confidence >= self.thresholds.suggest_threshold {
            FinalAction::Suggest
        } else {
            FinalAction::UserChoice
        };

        let outcome = self.finish(request, vec![(attempt, result)], action);
        self.usage.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Intent gate for text input: obvious non-search messages never reach a
    /// tier, and the caller is asked to disambiguate instead.
    async fn prefilter_gate(
        &self,
        request: &IdentificationRequest,
        cancel: &CancellationToken,
    ) -> Option<EscalationOutcome> {
        let classifier = self.classifier.as_ref()?;
        let InputPayload::Text(text) = &request.input else {
            return None;
        };

        let classification = classifier.classify(text, cancel).await;
        if classification.category == IntentCategory::WineSearch {
            return None;
        }

        tracing::info!(
            request_id = %request.id,
            category = classification.category.as_str(),
            confidence = classification.confidence,
            "input is not a wine search"
        );
        Some(EscalationOutcome::from_attempts(
            request.id,
            FinalTier::Prefilter,
            0,
            FinalAction::Disambiguate,
            None,
            Vec::new(),
        ))
    }

    /// Repeat text searches resolve from the cache at zero cost. A query-key
    /// miss falls back to the field keys the query may spell out, so results
    /// stored from parsed fields (image requests) are found too.
    fn cache_gate(&self, request: &IdentificationRequest) -> Option<EscalationOutcome> {
        let InputPayload::Text(text) = &request.input else {
            return None;
        };
        let hit = self.cache.lookup(&CacheKey::from_query(text)).or_else(|| {
            CacheKey::field_candidates(text)
                .iter()
                .find_map(|key| self.cache.lookup(key))
        })?;

        let confidence = hit.result.confidence;
        let action = if confidence >= self.thresholds.auto_populate_threshold {
            FinalAction::AutoPopulate
        } else {
            FinalAction::Suggest
        };
        tracing::info!(request_id = %request.id, confidence, "cache hit");
        Some(EscalationOutcome::from_attempts(
            request.id,
            FinalTier::Cache,
            confidence,
            action,
            Some(hit.result),
            Vec::new(),
        ))
    }

    /// Execute one rung: provider call plus parse/validate. Never errors;
    /// failures become a zero-confidence attempt so the ladder keeps moving.
    async fn run_tier(
        &self,
        binding: &TierBinding,
        request: &IdentificationRequest,
        cancel: &CancellationToken,
    ) -> (TierAttempt, Option<IdentificationResult>) {
        let opts = CompletionOptions::default()
            .with_model(binding.model.clone())
            .with_timeout(binding.timeout)
            .with_thinking(binding.thinking)
            .with_cancel(cancel.clone());

        let started = Instant::now();
        let response = match &request.input {
            InputPayload::Text(text) => {
                let prompt = prompts::text_identification(text, request.context.as_ref());
                binding.provider.complete(&prompt, &opts).await
            }
            InputPayload::Image { bytes, mime_type } => {
                if !binding.provider.supports(Capability::Vision) {
                    let attempt = self.failed_attempt(
                        binding,
                        ErrorKind::InvalidRequest,
                        started.elapsed().as_millis() as u64,
                        0.0,
                        0,
                        0,
                    );
                    tracing::warn!(
                        tier = %binding.tier,
                        provider = binding.provider.name(),
                        "tier provider does not accept images"
                    );
                    return (attempt, None);
                }
                let prompt = prompts::image_identification(request.context.as_ref());
                binding
                    .provider
                    .complete_with_image(&prompt, bytes, mime_type, &opts)
                    .await
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return (
                    self.failed_attempt(binding, err.kind, latency_ms, 0.0, 0, 0),
                    None,
                );
            }
        };

        match parse_identification(&response.content) {
            Ok(parsed) => {
                let result = parsed.into_result();
                let attempt = TierAttempt {
                    tier: binding.tier,
                    provider: binding.provider.name().to_string(),
                    model: response.model,
                    confidence: result.confidence,
                    latency_ms,
                    cost_usd: response.cost_usd,
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                    succeeded: true,
                    error_kind: None,
                };
                (attempt, Some(result))
            }
            // The vendor call was paid for even though the payload was
            // unusable; keep its cost on the trail.
            Err(err) => (
                self.failed_attempt(
                    binding,
                    err.kind,
                    latency_ms,
                    response.cost_usd,
                    response.input_tokens,
                    response.output_tokens,
                ),
                None,
            ),
        }
    }

    fn failed_attempt(
        &self,
        binding: &TierBinding,
        kind: ErrorKind,
        latency_ms: u64,
        cost_usd: f64,
        input_tokens: u32,
        output_tokens: u32,
    ) -> TierAttempt {
        TierAttempt {
            tier: binding.tier,
            provider: binding.provider.name().to_string(),
            model: binding.model.clone(),
            confidence: 0,
            latency_ms,
            cost_usd,
            input_tokens,
            output_tokens,
            succeeded: false,
            error_kind: Some(kind),
        }
    }

    /// Pick the canonical attempt, build the outcome, and populate the
    /// cache. The canonical result is the highest-confidence attempt on the
    /// whole trail, not necessarily the last one.
    fn finish(
        &self,
        request: &IdentificationRequest,
        trail: Vec<(TierAttempt, Option<IdentificationResult>)>,
        action: FinalAction,
    ) -> EscalationOutcome {
        let canonical = trail
            .iter()
            .filter(|(attempt, result)| attempt.succeeded && result.is_some())
            .max_by_key(|(attempt, _)| attempt.confidence);

        let (final_tier, final_confidence, result) = match canonical {
            Some((attempt, result)) => {
                (FinalTier::from(attempt.tier), attempt.confidence, result.clone())
            }
            None => {
                let last_tier = trail
                    .last()
                    .map(|(a, _)| FinalTier::from(a.tier))
                    .unwrap_or(FinalTier::Tier1);
                (last_tier, 0, None)
            }
        };

        if let Some(result) = &result {
            if final_confidence >= self.thresholds.suggest_threshold {
                self.populate_cache(request, result);
            }
        }

        let attempts = trail.into_iter().map(|(attempt, _)| attempt).collect();
        EscalationOutcome::from_attempts(
            request.id,
            final_tier,
            final_confidence,
            action,
            result,
            attempts,
        )
    }

    /// Store under the fields key always, and additionally under the query
    /// key for text input so the same search short-circuits next time.
    fn populate_cache(&self, request: &IdentificationRequest, result: &IdentificationResult) {
        if result.producer.is_none() && result.wine_name.is_none() {
            return;
        }
        let fields_key = CacheKey::from_fields(
            result.producer.as_deref().unwrap_or(""),
            result.wine_name.as_deref().unwrap_or(""),
            result.vintage,
        );
        if let Err(e) = self.cache.store(&fields_key, result) {
            tracing::warn!("cache store failed: {:#}", e);
        }
        if let InputPayload::Text(text) = &request.input {
            if let Err(e) = self.cache.store(&CacheKey::from_query(text), result) {
                tracing::warn!("cache store failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ErrorKind>>>,
        vision: bool,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ErrorKind>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                vision: true,
            })
        }

        fn next(&self) -> Result<CompletionResponse, ProviderError> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted provider ran out of replies");
            match reply {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    model: "scripted-model".to_string(),
                    input_tokens: 100,
                    output_tokens: 40,
                    cost_usd: 0.001,
                    latency_ms: 5,
                }),
                Err(kind) => Err(ProviderError::new(kind, "scripted failure")),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _prompt: &str,
            _opts: &CompletionOptions,
        ) -> Result<CompletionResponse, ProviderError> {
            self.next()
        }

        async fn complete_with_image(
            &self,
            _prompt: &str,
            _image: &[u8],
            _mime_type: &str,
            _opts: &CompletionOptions,
        ) -> Result<CompletionResponse, ProviderError> {
            self.next()
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn supports(&self, capability: Capability) -> bool {
            match capability {
                Capability::Vision => self.vision,
                Capability::ExtendedThinking => true,
            }
        }
    }

    fn payload(confidence: u8) -> String {
        format!(
            r#"{{"producer": "Penfolds", "wineName": "Grange", "vintage": 2016, "region": "South Australia", "confidence": {}}}"#,
            confidence
        )
    }

    fn controller(provider: Arc<ScriptedProvider>) -> (EscalationController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            Arc::new(IdentificationCache::new(dir.path().to_path_buf(), 30).unwrap());
        let ladder = [Tier::Tier1, Tier::Tier1_5, Tier::Tier2, Tier::Tier3]
            .into_iter()
            .map(|tier| TierBinding {
                tier,
                provider: provider.clone(),
                model: "scripted-model".to_string(),
                timeout: Duration::from_secs(30),
                thinking: false,
            })
            .collect();
        let controller = EscalationController::new(
            ladder,
            EscalationConfig::default(),
            cache,
            UsageHandle::disabled(),
        );
        (controller, dir)
    }

    #[tokio::test]
    async fn test_first_tier_clears_auto_populate() {
        let provider = ScriptedProvider::new(vec![Ok(payload(92))]);
        let (controller, _dir) = controller(provider);

        let request = IdentificationRequest::from_text("Penfolds Grange 2016");
        let outcome = controller
            .identify(&request, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::AutoPopulate);
        assert_eq!(outcome.final_tier, FinalTier::Tier1);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.final_confidence, 92);
    }

    #[tokio::test]
    async fn test_mid_band_confidence_suggests() {
        let provider = ScriptedProvider::new(vec![Ok(payload(78))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::Suggest);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_walks_full_ladder() {
        let provider =
            ScriptedProvider::new(vec![Ok(payload(40)), Ok(payload(55)), Ok(payload(60))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::UserChoice);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(
            outcome.attempts.iter().map(|a| a.tier).collect::<Vec<_>>(),
            vec![Tier::Tier1, Tier::Tier1_5, Tier::Tier2]
        );
        // tier3 never entered automatically
        assert!(outcome.attempts.iter().all(|a| a.tier != Tier::Tier3));
    }

    #[tokio::test]
    async fn test_failed_attempt_escalates_with_zero_confidence() {
        let provider =
            ScriptedProvider::new(vec![Err(ErrorKind::ServerError), Ok(payload(90))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].succeeded);
        assert_eq!(outcome.attempts[0].confidence, 0);
        assert_eq!(
            outcome.attempts[0].error_kind,
            Some(ErrorKind::ServerError)
        );
        assert_eq!(outcome.final_action, FinalAction::AutoPopulate);
        assert_eq!(outcome.final_tier, FinalTier::Tier1_5);
    }

    #[tokio::test]
    async fn test_canonical_is_highest_confidence_attempt() {
        // tier1 scores 72 (suggest band would stop the ladder)... so use
        // scores below suggest: tier1 65 fails the band, tier1_5 comes back
        // lower at 40, tier2 at 50. Canonical must be the tier1 answer.
        let provider =
            ScriptedProvider::new(vec![Ok(payload(65)), Ok(payload(40)), Ok(payload(50))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::UserChoice);
        assert_eq!(outcome.final_tier, FinalTier::Tier1);
        assert_eq!(outcome.final_confidence, 65);
        assert_eq!(outcome.result.as_ref().unwrap().confidence, 65);
    }

    #[tokio::test]
    async fn test_total_cost_includes_failed_parse_attempt() {
        // First reply costs money but carries no payload; its cost must stay
        // on the trail.
        let provider = ScriptedProvider::new(vec![
            Ok("I can't tell from that.".to_string()),
            Ok(payload(90)),
        ]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(
            outcome.attempts[0].error_kind,
            Some(ErrorKind::InvalidResponse)
        );
        assert!((outcome.attempts[0].cost_usd - 0.001).abs() < 1e-12);
        assert!((outcome.total_cost_usd - 0.002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_ladder() {
        let provider = ScriptedProvider::new(vec![Ok(payload(92))]);
        let (controller, _dir) = controller(provider);

        let request = IdentificationRequest::from_text("Penfolds Grange 2016");
        let first = controller
            .identify(&request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.final_tier, FinalTier::Tier1);

        // Same query again: no scripted replies remain, so any provider call
        // would panic the mock.
        let repeat = IdentificationRequest::from_text("Penfolds Grange 2016");
        let second = controller
            .identify(&repeat, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.final_tier, FinalTier::Cache);
        assert_eq!(second.final_action, FinalAction::AutoPopulate);
        assert!(second.attempts.is_empty());
        assert_eq!(second.total_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_image_result_found_by_later_text_query() {
        // One reply only: the follow-up text request must come from the
        // cache or the mock panics.
        let provider = ScriptedProvider::new(vec![Ok(payload(95))]);
        let (controller, _dir) = controller(provider);

        let image = controller
            .identify(
                &IdentificationRequest::from_image(vec![0xFF, 0xD8], "image/jpeg"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(image.final_tier, FinalTier::Tier1);

        let text = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(text.final_tier, FinalTier::Cache);
        assert!(text.attempts.is_empty());
        assert_eq!(text.total_cost_usd, 0.0);
        assert_eq!(text.result.unwrap().producer.as_deref(), Some("Penfolds"));
    }

    #[tokio::test]
    async fn test_deeper_runs_tier3_only() {
        let provider = ScriptedProvider::new(vec![Ok(payload(88))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify_deeper(
                &IdentificationRequest::from_text("obscure garage wine"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].tier, Tier::Tier3);
        assert_eq!(outcome.final_tier, FinalTier::Tier3);
        assert_eq!(outcome.final_action, FinalAction::AutoPopulate);
    }

    #[tokio::test]
    async fn test_image_request_runs_ladder() {
        let provider = ScriptedProvider::new(vec![Ok(payload(90))]);
        let (controller, _dir) = controller(provider);

        let outcome = controller
            .identify(
                &IdentificationRequest::from_image(vec![0xFF, 0xD8], "image/jpeg"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::AutoPopulate);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_non_search_text_disambiguates_without_attempts() {
        let provider = ScriptedProvider::new(vec![]);
        let (base, _dir) = controller(provider);
        let controller =
            base.with_classifier(Arc::new(IntentClassifier::new(None, Duration::from_secs(5))));

        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("delete this"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.final_action, FinalAction::Disambiguate);
        assert_eq!(outcome.final_tier, FinalTier::Prefilter);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.total_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_request_ends_ladder_early() {
        let provider = ScriptedProvider::new(vec![Ok(payload(40))]);
        let (controller, _dir) = controller(provider);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = controller
            .identify(
                &IdentificationRequest::from_text("Penfolds Grange 2016"),
                cancel,
            )
            .await
            .unwrap();

        // One rung ran, then the ladder stopped instead of escalating.
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.final_action, FinalAction::UserChoice);
    }
}
