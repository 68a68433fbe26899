// Usage/outcome recorder
//
// Writes per-call and per-request records to daily JSONL files. The
// controller talks to a channel-backed handle so recording never sits on the
// response path; the background writer swallows its own errors.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{UsageEvent, UsageSummary};
use crate::identify::{EscalationOutcome, FinalAction, FinalTier, TierAttempt};

#[derive(Clone)]
pub struct UsageRecorder {
    usage_dir: PathBuf,
}

impl UsageRecorder {
    pub fn new(usage_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&usage_dir).with_context(|| {
            format!("Failed to create usage directory: {}", usage_dir.display())
        })?;
        Ok(Self { usage_dir })
    }

    /// Append one event to today's JSONL file.
    pub fn append(&self, event: &UsageEvent) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let log_file = self.usage_dir.join(format!("{}.jsonl", today));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open usage log: {}", log_file.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize usage event")?;
        writeln!(file, "{}", json).context("Failed to write usage event")?;
        Ok(())
    }

    /// Read all events for a specific date (YYYY-MM-DD).
    pub fn read_day(&self, date: &str) -> Result<Vec<UsageEvent>> {
        let log_file = self.usage_dir.join(format!("{}.jsonl", date));
        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&log_file)
            .with_context(|| format!("Failed to read usage log: {}", log_file.display()))?;

        let events: Vec<UsageEvent> = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse usage log")?;
        Ok(events)
    }

    /// Aggregate statistics for one day.
    pub fn summary(&self, date: &str) -> Result<UsageSummary> {
        let events = self.read_day(date)?;

        let outcomes: Vec<&EscalationOutcome> = events
            .iter()
            .filter_map(|e| match e {
                UsageEvent::Outcome { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();

        let count_action = |action: FinalAction| {
            outcomes
                .iter()
                .filter(|o| o.final_action == action)
                .count()
        };

        let total_requests = outcomes.len();
        let total_cost_usd: f64 = outcomes.iter().map(|o| o.total_cost_usd).sum();
        let avg_latency_ms = if total_requests > 0 {
            outcomes.iter().map(|o| o.total_latency_ms).sum::<u64>() / total_requests as u64
        } else {
            0
        };

        let escalated: Vec<_> = outcomes.iter().filter(|o| o.attempts.len() > 1).collect();
        let escalation_improved = escalated
            .iter()
            .filter(|o| o.final_confidence > o.attempts[0].confidence)
            .count();

        Ok(UsageSummary {
            date: date.to_string(),
            total_requests,
            auto_populate_count: count_action(FinalAction::AutoPopulate),
            suggest_count: count_action(FinalAction::Suggest),
            user_choice_count: count_action(FinalAction::UserChoice),
            disambiguate_count: count_action(FinalAction::Disambiguate),
            cache_hits: outcomes
                .iter()
                .filter(|o| o.final_tier == FinalTier::Cache)
                .count(),
            total_cost_usd,
            avg_latency_ms,
            escalation_improved,
            escalation_total: escalated.len(),
        })
    }
}

/// Non-blocking handle the controller records through. Failures are logged
/// and swallowed; recording must never abort or alter an identification
/// response.
#[derive(Clone)]
pub struct UsageHandle {
    tx: Option<mpsc::UnboundedSender<UsageEvent>>,
}

impl UsageHandle {
    /// Spawn the background writer task and return a handle to it.
    pub fn spawn(recorder: UsageRecorder) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = recorder.append(&event) {
                    tracing::warn!("failed to record usage event: {:#}", e);
                }
            }
            tracing::debug!("usage writer task exiting");
        });
        Self { tx: Some(tx) }
    }

    /// A handle that drops everything; used by tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record_attempt(&self, request_id: Uuid, attempt: &TierAttempt) {
        self.send(UsageEvent::attempt(request_id, attempt.clone()));
    }

    pub fn record_outcome(&self, outcome: &EscalationOutcome) {
        self.send(UsageEvent::outcome(outcome.clone()));
    }

    fn send(&self, event: UsageEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::warn!("usage writer task is gone, dropping record");
            }
        }
    }
}
