// Identification pipeline: data model, prompts, response parsing, and the
// tier escalation controller.

pub mod controller;
pub mod parser;
pub mod prompts;
pub mod types;

pub use controller::{EscalationController, TierBinding};
pub use parser::{parse_identification, ParsedIdentification};
pub use types::{
    EscalationOutcome, FinalAction, FinalTier, IdentificationRequest, IdentificationResult,
    InputPayload, RequestContext, Tier, TierAttempt,
};
