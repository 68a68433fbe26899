// Usage record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identify::{EscalationOutcome, TierAttempt};

/// One line in the daily usage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum UsageEvent {
    Attempt {
        timestamp: DateTime<Utc>,
        request_id: Uuid,
        #[serde(flatten)]
        attempt: TierAttempt,
    },
    Outcome {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        outcome: EscalationOutcome,
    },
}

impl UsageEvent {
    pub fn attempt(request_id: Uuid, attempt: TierAttempt) -> Self {
        UsageEvent::Attempt {
            timestamp: Utc::now(),
            request_id,
            attempt,
        }
    }

    pub fn outcome(outcome: EscalationOutcome) -> Self {
        UsageEvent::Outcome {
            timestamp: Utc::now(),
            outcome,
        }
    }
}

/// Daily aggregate for the analytics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub date: String,
    pub total_requests: usize,
    pub auto_populate_count: usize,
    pub suggest_count: usize,
    pub user_choice_count: usize,
    pub disambiguate_count: usize,
    pub cache_hits: usize,
    pub total_cost_usd: f64,
    pub avg_latency_ms: u64,
    /// Outcomes with more than one attempt where the final confidence beat
    /// the first tier's. Monitored, not guaranteed.
    pub escalation_improved: usize,
    pub escalation_total: usize,
}
