// Shared defaults for thresholds, timeouts, and paths.

/// Confidence floor at which a tier's guess is auto-populated without
/// confirmation. Uniform across automatic tiers.
pub const DEFAULT_AUTO_POPULATE_THRESHOLD: u8 = 85;

/// Confidence floor at which a tier's guess is presented for confirmation.
pub const DEFAULT_SUGGEST_THRESHOLD: u8 = 70;

/// Per-tier vendor-call deadlines, in seconds.
pub const DEFAULT_TEXT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_THINKING_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TIER3_TIMEOUT_SECS: u64 = 120;

/// Deadline for the intent classifier's single cheap LLM call.
pub const DEFAULT_INTENT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8310";

/// Upper bound on request bodies; image payloads arrive base64-encoded.
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub const DEFAULT_CACHE_TTL_DAYS: i64 = 30;

/// Config directory under the user's home.
pub const CONFIG_DIR: &str = ".sommelier";
