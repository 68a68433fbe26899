// Pipeline data model: tiers, attempts, results, outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::ErrorKind;

/// One escalation step in the identification ladder. Strictly ordered;
/// tier3 is never entered automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "tier1")]
    Tier1,
    #[serde(rename = "tier1_5")]
    Tier1_5,
    #[serde(rename = "tier2")]
    Tier2,
    #[serde(rename = "tier3")]
    Tier3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier1",
            Tier::Tier1_5 => "tier1_5",
            Tier::Tier2 => "tier2",
            Tier::Tier3 => "tier3",
        }
    }

    /// The next rung of the automatic ladder, if any.
    pub fn next_automatic(&self) -> Option<Tier> {
        match self {
            Tier::Tier1 => Some(Tier::Tier1_5),
            Tier::Tier1_5 => Some(Tier::Tier2),
            Tier::Tier2 | Tier::Tier3 => None,
        }
    }

    /// Tiers entered by the escalation ladder without a user trigger.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Tier::Tier3)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the terminal answer came from. `Cache` and `Prefilter` mark requests
/// that never reached a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalTier {
    Cache,
    Prefilter,
    #[serde(rename = "tier1")]
    Tier1,
    #[serde(rename = "tier1_5")]
    Tier1_5,
    #[serde(rename = "tier2")]
    Tier2,
    #[serde(rename = "tier3")]
    Tier3,
}

impl From<Tier> for FinalTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Tier1 => FinalTier::Tier1,
            Tier::Tier1_5 => FinalTier::Tier1_5,
            Tier::Tier2 => FinalTier::Tier2,
            Tier::Tier3 => FinalTier::Tier3,
        }
    }
}

/// Terminal decision for one identification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    /// Confidence high enough to prefill the wine record.
    AutoPopulate,
    /// Present the guess for user confirmation.
    Suggest,
    /// No tier reached sufficient confidence; user resolves manually.
    UserChoice,
    /// Input was not a wine search; ask the user what they meant.
    Disambiguate,
}

impl FinalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalAction::AutoPopulate => "auto_populate",
            FinalAction::Suggest => "suggest",
            FinalAction::UserChoice => "user_choice",
            FinalAction::Disambiguate => "disambiguate",
        }
    }
}

/// Raw input to the pipeline.
#[derive(Debug, Clone)]
pub enum InputPayload {
    Text(String),
    Image { bytes: Vec<u8>, mime_type: String },
}

impl InputPayload {
    pub fn is_image(&self) -> bool {
        matches!(self, InputPayload::Image { .. })
    }
}

/// Session context carried alongside a request (conversation phase, the
/// candidate a prior pass produced).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<IdentificationResult>,
}

/// Immutable input to the pipeline; only its outcome is persisted.
#[derive(Debug, Clone)]
pub struct IdentificationRequest {
    pub id: Uuid,
    pub input: InputPayload,
    pub context: Option<RequestContext>,
}

impl IdentificationRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: InputPayload::Text(text.into()),
            context: None,
        }
    }

    pub fn from_image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: InputPayload::Image {
                bytes,
                mime_type: mime_type.into(),
            },
            context: None,
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Candidate wine fields extracted by the parser at one tier. Fields may be
/// missing; the pipeline still shows partial matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationResult {
    pub producer: Option<String>,
    pub wine_name: Option<String>,
    pub vintage: Option<i32>,
    pub region: Option<String>,
    /// 0-100, after field penalties.
    pub confidence: u8,
}

/// One provider call within a request, kept for audit/analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAttempt {
    pub tier: Tier,
    pub provider: String,
    pub model: String,
    /// 0-100; a failed call counts as 0 for escalation purposes.
    pub confidence: u8,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Terminal decision plus the audit trail. Created once per request at
/// pipeline completion and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationOutcome {
    pub request_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub final_tier: FinalTier,
    /// Confidence of the canonical attempt, never a blended value.
    pub final_confidence: u8,
    pub final_action: FinalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<IdentificationResult>,
    /// Sum over every attempt, including superseded and failed ones.
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
    pub attempts: Vec<TierAttempt>,
}

impl EscalationOutcome {
    /// Build an outcome from the attempt trail; totals are always derived
    /// from the attempts so the cost-sum invariant holds by construction.
    pub fn from_attempts(
        request_id: Uuid,
        final_tier: FinalTier,
        final_confidence: u8,
        final_action: FinalAction,
        result: Option<IdentificationResult>,
        attempts: Vec<TierAttempt>,
    ) -> Self {
        let total_cost_usd = attempts.iter().map(|a| a.cost_usd).sum();
        let total_latency_ms = attempts.iter().map(|a| a.latency_ms).sum();
        Self {
            request_id,
            completed_at: Utc::now(),
            final_tier,
            final_confidence,
            final_action,
            result,
            total_cost_usd,
            total_latency_ms,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Tier1 < Tier::Tier1_5);
        assert!(Tier::Tier1_5 < Tier::Tier2);
        assert!(Tier::Tier2 < Tier::Tier3);
    }

    #[test]
    fn test_tier_ladder_walk() {
        assert_eq!(Tier::Tier1.next_automatic(), Some(Tier::Tier1_5));
        assert_eq!(Tier::Tier1_5.next_automatic(), Some(Tier::Tier2));
        assert_eq!(Tier::Tier2.next_automatic(), None);
        assert_eq!(Tier::Tier3.next_automatic(), None);
    }

    #[test]
    fn test_tier3_not_automatic() {
        assert!(Tier::Tier1.is_automatic());
        assert!(!Tier::Tier3.is_automatic());
    }

    #[test]
    fn test_tier_serde_names() {
        assert_eq!(serde_json::to_string(&Tier::Tier1_5).unwrap(), "\"tier1_5\"");
        assert_eq!(
            serde_json::to_string(&FinalTier::Cache).unwrap(),
            "\"cache\""
        );
        assert_eq!(
            serde_json::to_string(&FinalAction::AutoPopulate).unwrap(),
            "\"auto_populate\""
        );
    }

    #[test]
    fn test_outcome_totals_derived_from_attempts() {
        let attempt = |tier, cost, latency| TierAttempt {
            tier,
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            confidence: 50,
            latency_ms: latency,
            cost_usd: cost,
            input_tokens: 100,
            output_tokens: 20,
            succeeded: true,
            error_kind: None,
        };
        let outcome = EscalationOutcome::from_attempts(
            Uuid::new_v4(),
            FinalTier::Tier2,
            50,
            FinalAction::UserChoice,
            None,
            vec![
                attempt(Tier::Tier1, 0.001, 400),
                attempt(Tier::Tier1_5, 0.002, 700),
                attempt(Tier::Tier2, 0.010, 1200),
            ],
        );
        assert!((outcome.total_cost_usd - 0.013).abs() < 1e-12);
        assert_eq!(outcome.total_latency_ms, 2300);
    }
}
