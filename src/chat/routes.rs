//! REST endpoints for chatbot sessions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use super::manager::{SessionManager, StartSession};
use super::model::LeadAttributes;
use crate::error::ApiError;
use crate::server::{ApiJson, parse_id};

#[derive(Deserialize)]
struct StartRequest {
    user_id: Option<String>,
    user_info: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct MessageRequest {
    message: Option<String>,
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct UpdateLeadRequest {
    session_id: Option<String>,
    #[serde(default)]
    lead_info: LeadAttributes,
}

/// Build the chatbot REST routes (mounted under `/api/chatbot`).
pub fn chat_routes(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/start", post(start_session))
        .route("/session/{id}", get(get_session))
        .route("/message", post(send_message))
        .route("/update-lead", post(update_lead))
        .route("/recommendations/{id}", get(recommendations))
        .route("/end/{id}", post(end_session))
        .route("/stats", get(stats))
        .with_state(manager)
}

async fn start_session(
    State(manager): State<Arc<SessionManager>>,
    ApiJson(body): ApiJson<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = manager
        .start(StartSession {
            user_id: body.user_id,
            user_info: body.user_info,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "session_id": session.session_id,
            "user_id": session.user_id,
            "message": "Chat session started successfully",
            "session": session.summary(),
        })),
    ))
}

async fn get_session(
    State(manager): State<Arc<SessionManager>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_id(&id, "session")?;
    let session = manager.get(session_id).await?;
    Ok(Json(serde_json::json!({"success": true, "session": session})))
}

async fn send_message(
    State(manager): State<Arc<SessionManager>>,
    ApiJson(body): ApiJson<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(message), Some(session_id)) = (body.message, body.session_id) else {
        return Err(ApiError::bad_request("Message and session ID are required"));
    };
    let session_id = parse_id(&session_id, "session")?;

    let reply = manager.post_message(session_id, &message).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": reply.message,
        "timestamp": reply.timestamp,
        "session_id": reply.session_id,
        "lead_score": reply.lead_score,
        "stage": reply.stage,
        "stage_changed": reply.stage_changed,
    })))
}

async fn update_lead(
    State(manager): State<Arc<SessionManager>>,
    ApiJson(body): ApiJson<UpdateLeadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(session_id) = body.session_id else {
        return Err(ApiError::bad_request("Session ID is required"));
    };
    let session_id = parse_id(&session_id, "session")?;

    let session = manager.update_lead(session_id, body.lead_info).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "session": session,
        "message": "Lead information updated successfully",
    })))
}

async fn recommendations(
    State(manager): State<Arc<SessionManager>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_id(&id, "session")?;
    let recommendations = manager.recommendations(session_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "recommendations": recommendations,
    })))
}

async fn end_session(
    State(manager): State<Arc<SessionManager>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_id(&id, "session")?;
    let session = manager.end(session_id).await?;
    info!(session_id = %session_id, "Session ended via REST");
    Ok(Json(serde_json::json!({
        "success": true,
        "session": session.summary(),
        "status": session.status,
    })))
}

async fn stats(State(manager): State<Arc<SessionManager>>) -> impl IntoResponse {
    let stats = manager.stats().await;
    Json(serde_json::json!({"success": true, "stats": stats}))
}
