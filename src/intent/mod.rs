// Intent classification: a deterministic prefilter backed by a single cheap
// model call, gating the identification ladder.

pub mod classifier;
pub mod prefilter;

pub use classifier::IntentClassifier;
pub use prefilter::{Classification, ClassificationSource, IntentCategory, PatternPrefilter};
