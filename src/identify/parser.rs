// Response parser/validator
//
// Model output is untrusted: the JSON payload may be wrapped in prose,
// fenced in markdown, or spread across a multi-part reply where only one
// part carries the object. The parser extracts the first candidate object
// that declares a confidence and validates it.

use chrono::{Datelike, Utc};
use serde::Deserialize;

use super::types::IdentificationResult;
use crate::providers::{ErrorKind, ProviderError};

/// Penalty points for fields the model failed to supply. Missing fields do
/// not fail parsing; they reduce confidence so a partial match can still be
/// shown.
const MISSING_PRODUCER_PENALTY: u8 = 10;
const MISSING_WINE_NAME_PENALTY: u8 = 10;
const MISSING_VINTAGE_PENALTY: u8 = 5;

/// Earliest vintage treated as plausible.
const MIN_VINTAGE: i32 = 1800;

/// A structurally valid identification before field penalties are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIdentification {
    pub producer: Option<String>,
    pub wine_name: Option<String>,
    pub vintage: Option<i32>,
    pub region: Option<String>,
    /// The confidence the model declared, 0-100.
    pub declared_confidence: u8,
}

impl ParsedIdentification {
    /// Points subtracted for missing/implausible fields.
    pub fn field_penalty(&self) -> u8 {
        let mut penalty = 0;
        if self.producer.is_none() {
            penalty += MISSING_PRODUCER_PENALTY;
        }
        if self.wine_name.is_none() {
            penalty += MISSING_WINE_NAME_PENALTY;
        }
        if self.vintage.is_none() {
            penalty += MISSING_VINTAGE_PENALTY;
        }
        penalty
    }

    /// Declared confidence less field penalties; this is the confidence the
    /// escalation policy sees.
    pub fn adjusted_confidence(&self) -> u8 {
        self.declared_confidence
            .saturating_sub(self.field_penalty())
    }

    pub fn into_result(self) -> IdentificationResult {
        let confidence = self.adjusted_confidence();
        IdentificationResult {
            producer: self.producer,
            wine_name: self.wine_name,
            vintage: self.vintage,
            region: self.region,
            confidence,
        }
    }
}

/// Field shapes actually observed across vendors/models.
#[derive(Debug, Deserialize)]
struct RawIdentification {
    #[serde(default, alias = "winery", alias = "identifiedProducer")]
    producer: Option<String>,
    #[serde(
        default,
        rename = "wineName",
        alias = "wine_name",
        alias = "wine",
        alias = "name",
        alias = "identifiedWineName"
    )]
    wine_name: Option<String>,
    #[serde(default, alias = "year", alias = "identifiedVintage")]
    vintage: Option<serde_json::Value>,
    #[serde(default, alias = "appellation", alias = "identifiedRegion")]
    region: Option<String>,
    #[serde(default, alias = "confidenceScore", alias = "confidence_score")]
    confidence: Option<serde_json::Value>,
}

/// Extract and validate a structured identification from raw model output.
pub fn parse_identification(raw: &str) -> Result<ParsedIdentification, ProviderError> {
    let stripped = strip_code_fences(raw);

    let mut saw_candidate = false;
    for candidate in candidate_objects(&stripped) {
        let parsed: RawIdentification = match serde_json::from_str(candidate) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        saw_candidate = true;

        // The confidence field is the marker distinguishing the payload
        // object from other JSON the model may have emitted.
        let declared = match parsed.confidence.as_ref().and_then(numeric_value) {
            Some(value) => value,
            None => continue,
        };
        if !(0.0..=100.0).contains(&declared) {
            return Err(ProviderError::new(
                ErrorKind::InvalidResponse,
                format!("declared confidence {} outside 0-100", declared),
            ));
        }

        return Ok(ParsedIdentification {
            producer: non_empty(parsed.producer),
            wine_name: non_empty(parsed.wine_name),
            vintage: parsed.vintage.as_ref().and_then(plausible_vintage),
            region: non_empty(parsed.region),
            declared_confidence: declared.round() as u8,
        });
    }

    let message = if saw_candidate {
        "structured payload found but confidence field is missing"
    } else {
        "no structured identification payload in model output"
    };
    Err(ProviderError::new(ErrorKind::InvalidResponse, message))
}

/// Remove markdown code-fence lines, keeping fence contents.
fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level balanced `{...}` spans, string-aware so braces inside JSON
/// strings don't end a span early.
fn candidate_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        candidates.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Accept number or numeric-string confidence values.
fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Vintage as i32, dropped (not failed) when implausible.
fn plausible_vintage(value: &serde_json::Value) -> Option<i32> {
    let year = numeric_value(value)? as i32;
    let max = Utc::now().year() + 1;
    if (MIN_VINTAGE..=max).contains(&year) {
        Some(year)
    } else {
        None
    }
}
