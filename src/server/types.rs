// HTTP wire types

use serde::{Deserialize, Serialize};

use crate::identify::{EscalationOutcome, RequestContext};

/// Body of POST /identify and POST /identify/deeper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    /// "text" or "image".
    pub input_type: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Base64-encoded image bytes when inputType is "image".
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub context: Option<RequestContext>,
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub success: bool,
    pub data: EscalationOutcome,
}

impl IdentifyResponse {
    pub fn new(data: EscalationOutcome) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    /// YYYY-MM-DD; defaults to today.
    pub date: Option<String>,
}
