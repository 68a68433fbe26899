// HTTP handlers
//
// The identification work runs in a spawned task holding a cancellation
// token whose drop guard lives in the handler future. Axum drops the handler
// when the client disconnects, which cancels the token and aborts the
// in-flight vendor call within about a second.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::{
    ErrorResponse, HealthResponse, IdentifyRequest, IdentifyResponse, SummaryParams,
};
use crate::identify::{EscalationOutcome, IdentificationRequest, InputPayload};
use crate::usage::UsageRecorder;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<crate::identify::EscalationController>,
    pub recorder: Arc<UsageRecorder>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

pub async fn identify(
    State(state): State<AppState>,
    Json(body): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let request = build_request(body)?;
    let outcome = run_pipeline(state, request, false).await?;
    Ok(Json(IdentifyResponse::new(outcome)))
}

pub async fn identify_deeper(
    State(state): State<AppState>,
    Json(body): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let request = build_request(body)?;
    let outcome = run_pipeline(state, request, true).await?;
    Ok(Json(IdentifyResponse::new(outcome)))
}

async fn run_pipeline(
    state: AppState,
    request: IdentificationRequest,
    deeper: bool,
) -> Result<EscalationOutcome, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let controller = state.controller.clone();
    let task = tokio::spawn(async move {
        if deeper {
            controller.identify_deeper(&request, cancel).await
        } else {
            controller.identify(&request, cancel).await
        }
    });

    match task.await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => {
            tracing::error!("identification pipeline failed: {:#}", e);
            Err(ApiError::internal("identification failed"))
        }
        Err(e) => {
            tracing::error!("identification task panicked or was aborted: {}", e);
            Err(ApiError::internal("identification failed"))
        }
    }
}

fn build_request(body: IdentifyRequest) -> Result<IdentificationRequest, ApiError> {
    let input = match body.input_type.as_str() {
        "text" => {
            let text = body
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::bad_request("text input requires a non-empty 'text'"))?;
            InputPayload::Text(text.to_string())
        }
        "image" => {
            let encoded = body
                .image_base64
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    ApiError::bad_request("image input requires 'imageBase64'")
                })?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| ApiError::bad_request("'imageBase64' is not valid base64"))?;
            let mime_type = body
                .mime_type
                .clone()
                .unwrap_or_else(|| "image/jpeg".to_string());
            InputPayload::Image { bytes, mime_type }
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown inputType '{}' (expected \"text\" or \"image\")",
                other
            )));
        }
    };

    let mut request = IdentificationRequest {
        id: uuid::Uuid::new_v4(),
        input,
        context: None,
    };
    if let Some(context) = body.context {
        request = request.with_context(context);
    }
    Ok(request)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn usage_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<crate::usage::UsageSummary>, ApiError> {
    let date = params
        .date
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let summary = state.recorder.summary(&date).map_err(|e| {
        tracing::error!("usage summary failed: {:#}", e);
        ApiError::internal("failed to read usage records")
    })?;
    Ok(Json(summary))
}
