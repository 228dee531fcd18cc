//! REST API server for the stock research agent
//!
//! Exposes the turn endpoint to a presentation layer over HTTP.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::agent::ResearchOrchestrator;
use crate::error::AgentError;
use crate::models::TurnOutcome;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<ResearchOrchestrator>,
}

/// =============================
/// Session Identity Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// Callers may send any string as a session id; map it onto a stable UUID
/// so the same string always lands on the same session row.
fn parse_or_stable_uuid(value: Option<&str>) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => uuid::Uuid::new_v4(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Turn Endpoint
/// =============================

async fn run_turn(
    State(state): State<ApiState>,
    Json(req): Json<TurnRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let session_id = parse_or_stable_uuid(req.session_id.as_deref());
    info!(session_id = %session_id, "Received turn request: {}", req.query);

    match state.orchestrator.handle_turn(session_id, &req.query).await {
        Ok(TurnOutcome::Narrative(answer)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "type": "narrative",
                "answer": answer,
                "session_id": session_id.to_string(),
            }))),
        ),
        Ok(TurnOutcome::Clarification(answer)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "type": "clarification",
                "answer": answer,
                "session_id": session_id.to_string(),
            }))),
        ),
        Err(AgentError::Generation(e)) => {
            warn!(session_id = %session_id, error = %e, "Narrative generation failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::error(
                    "Analysis unavailable, please try again.".to_string(),
                )),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Turn handling failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<ResearchOrchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/turn", post(run_turn))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<ResearchOrchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
