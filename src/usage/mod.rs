// Usage recording: per-call and per-request JSONL records plus daily
// aggregates.

pub mod recorder;
pub mod types;

pub use recorder::{UsageHandle, UsageRecorder};
pub use types::{UsageEvent, UsageSummary};
