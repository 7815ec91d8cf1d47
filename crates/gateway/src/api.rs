//! HTTP API v1 — documentation runs and the helpers around them.
//!
//! Endpoints:
//!
//! - `POST /v1/documents`        — Upload an archive, get a generated document
//! - `POST /v1/headings`         — Extract section headings from a template file
//! - `POST /v1/chat`             — One chat reply from the configured chat model
//! - `POST /v1/estimate-tokens`  — Pre-flight token estimate for a description
//! - `GET  /v1/usage`            — Aggregate usage over completed runs

use axum::{
    Router,
    extract::{Multipart, State},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docsmith_core::document::DocumentPayload;
use docsmith_core::extract::TextExtractor;
use docsmith_core::tokens::{TokenEstimate, estimate_description};
use docsmith_pipeline::{
    ChatMessage, ChatReply, PlainTextExtractor, ProjectBrief, RunRequest,
    extract_template_headings, resolve_headings,
};
use docsmith_telemetry::UsageSnapshot;

use crate::SharedState;
use crate::error::ApiError;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/documents", post(create_document_handler))
        .route("/headings", post(extract_headings_handler))
        .route("/chat", post(chat_handler))
        .route("/estimate-tokens", post(estimate_tokens_handler))
        .route("/usage", get(usage_handler))
        .with_state(state)
}

// ── Documents ─────────────────────────────────────────────────────────────

/// The multipart form of `POST /v1/documents`.
#[derive(Debug, Default)]
struct DocumentUpload {
    archive: Option<Vec<u8>>,
    project_name: String,
    description: String,
    domain: String,
    template: Option<String>,
    headings: Vec<String>,
}

impl DocumentUpload {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "archive" => {
                    let is_zip = field
                        .file_name()
                        .is_none_or(|f| f.to_ascii_lowercase().ends_with(".zip"));
                    if !is_zip {
                        return Err(ApiError::bad_request("Only ZIP archives are supported"));
                    }
                    upload.archive = Some(field.bytes().await?.to_vec());
                }
                "project_name" => upload.project_name = field.text().await?.trim().to_string(),
                "description" => upload.description = field.text().await?,
                "domain" => upload.domain = field.text().await?,
                "template" => upload.template = Some(field.text().await?),
                "headings" => upload.headings.push(field.text().await?),
                other => warn!(field = %other, "Ignoring unknown form field"),
            }
        }
        Ok(upload)
    }
}

async fn create_document_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<DocumentPayload>, ApiError> {
    let upload = DocumentUpload::read(multipart).await?;
    let archive = upload
        .archive
        .ok_or_else(|| ApiError::bad_request("An 'archive' file field is required"))?;
    if upload.project_name.is_empty() {
        return Err(ApiError::bad_request("'project_name' is required"));
    }

    let permit = state.device.clone().try_lock_owned().map_err(|_| {
        warn!(project = %upload.project_name, "Rejecting run, device busy");
        ApiError::busy()
    })?;

    let headings = resolve_headings(
        &upload.headings,
        upload.template.as_deref(),
        state.service.pipeline_config(),
    );
    let request = RunRequest {
        brief: ProjectBrief::new(upload.project_name)
            .with_description(upload.description)
            .with_domain(upload.domain),
        headings,
    };
    info!(
        project = %request.brief.name,
        archive_bytes = archive.len(),
        headings = request.headings.len(),
        "Documentation request accepted"
    );

    // The run owns the device until it has released its model, even if the
    // client goes away first.
    let cancel = CancellationToken::new();
    let _cancel_on_disconnect = cancel.clone().drop_guard();
    let service = state.service.clone();
    let run = tokio::spawn(async move {
        let _permit = permit;
        service.generate(archive, request, &cancel).await
    });

    let payload = run
        .await
        .map_err(|e| ApiError::internal(format!("Documentation run aborted: {e}")))??;
    Ok(Json(payload))
}

// ── Template headings ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct HeadingsResponse {
    headings: Vec<String>,
    count: usize,
}

async fn extract_headings_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<HeadingsResponse>, ApiError> {
    let mut text = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("template") {
            continue;
        }
        let kind = field
            .file_name()
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();
        let bytes = field.bytes().await?;
        text = Some(PlainTextExtractor.extract_text(&bytes, &kind));
    }
    let text = text.ok_or_else(|| ApiError::bad_request("A 'template' file field is required"))?;

    let headings = extract_template_headings(&text, state.service.pipeline_config().max_headings);
    Ok(Json(HeadingsResponse {
        count: headings.len(),
        headings: headings.as_slice().to_vec(),
    }))
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// Loads the chat model for one reply. Shares the device with documentation
/// runs, so it is refused while one is in flight.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("'message' is required"));
    }

    let permit = state.device.clone().try_lock_owned().map_err(|_| {
        warn!("Rejecting chat, device busy");
        ApiError::busy()
    })?;
    info!(history = req.history.len(), "Chat request accepted");

    let service = state.service.clone();
    let chat = tokio::spawn(async move {
        let _permit = permit;
        service.chat(&req.history, &req.message).await
    });

    let reply = chat
        .await
        .map_err(|e| ApiError::internal(format!("Chat aborted: {e}")))??;
    Ok(Json(reply))
}

// ── Estimates / usage ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EstimateRequest {
    #[serde(default)]
    description: String,
}

async fn estimate_tokens_handler(Json(req): Json<EstimateRequest>) -> Json<TokenEstimate> {
    Json(estimate_description(&req.description))
}

async fn usage_handler(State(state): State<SharedState>) -> Json<UsageSnapshot> {
    Json(state.service.telemetry().usage_snapshot())
}
