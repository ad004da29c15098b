//! REST endpoints for templates, campaigns, and the outbox.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::outbox::{EmailPriority, NewCampaign, Outbox, SendRequest};
use super::templates::NewTemplate;
use crate::error::ApiError;
use crate::server::{ApiJson, parse_id};

#[derive(Deserialize)]
struct SendBody {
    lead_id: Option<String>,
    template_id: Option<String>,
    #[serde(default)]
    custom_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    priority: EmailPriority,
    campaign_id: Option<String>,
}

#[derive(Deserialize)]
struct EmailQuery {
    #[serde(default)]
    raw: bool,
}

/// Build the email routes (mounted under `/api/email`).
pub fn email_routes(outbox: Arc<Outbox>) -> Router {
    Router::new()
        .route("/campaigns", post(create_campaign).get(list_campaigns))
        .route("/send", post(send_email))
        .route("/templates", get(list_templates).post(create_template))
        .route("/analytics", get(analytics))
        .route("/emails/{id}", get(get_email))
        .route("/emails/{id}/open", post(record_open))
        .route("/emails/{id}/click", post(record_click))
        .with_state(outbox)
}

async fn create_campaign(
    State(outbox): State<Arc<Outbox>>,
    ApiJson(body): ApiJson<NewCampaign>,
) -> impl IntoResponse {
    let campaign = outbox.create_campaign(body).await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "campaign": campaign,
            "message": "Email campaign created successfully",
        })),
    )
}

async fn list_campaigns(State(outbox): State<Arc<Outbox>>) -> impl IntoResponse {
    let campaigns = outbox.campaigns().await;
    Json(serde_json::json!({"success": true, "campaigns": campaigns}))
}

async fn send_email(
    State(outbox): State<Arc<Outbox>>,
    ApiJson(body): ApiJson<SendBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(lead_id), Some(template_id)) = (body.lead_id, body.template_id) else {
        return Err(ApiError::bad_request("Lead ID and template ID are required"));
    };
    let campaign_id = body
        .campaign_id
        .as_deref()
        .map(|id| parse_id(id, "campaign"))
        .transpose()?;

    let email = outbox
        .send(SendRequest {
            lead_id: parse_id(&lead_id, "lead")?,
            template_id,
            custom_data: body.custom_data,
            priority: body.priority,
            campaign_id,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "email": email,
        "message": "Email queued for sending",
    })))
}

async fn list_templates(State(outbox): State<Arc<Outbox>>) -> impl IntoResponse {
    let templates = outbox.templates().await;
    Json(serde_json::json!({"success": true, "templates": templates}))
}

async fn create_template(
    State(outbox): State<Arc<Outbox>>,
    ApiJson(body): ApiJson<NewTemplate>,
) -> Result<impl IntoResponse, ApiError> {
    let template = outbox.add_template(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "template": template,
            "message": "Email template created successfully",
        })),
    ))
}

async fn analytics(State(outbox): State<Arc<Outbox>>) -> impl IntoResponse {
    let analytics = outbox.analytics().await;
    Json(serde_json::json!({"success": true, "analytics": analytics}))
}

/// `?raw=true` adds the composed RFC 5322 message alongside the record.
async fn get_email(
    State(outbox): State<Arc<Outbox>>,
    Path(id): Path<String>,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let email = outbox.get(parse_id(&id, "email")?).await?;
    let mut body = serde_json::json!({"success": true, "email": email});
    if query.raw {
        body["raw"] = serde_json::Value::String(email.raw);
    }
    Ok(Json(body))
}

async fn record_open(
    State(outbox): State<Arc<Outbox>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let email = outbox.record_open(parse_id(&id, "email")?).await?;
    Ok(Json(serde_json::json!({"success": true, "email": email})))
}

async fn record_click(
    State(outbox): State<Arc<Outbox>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let email = outbox.record_click(parse_id(&id, "email")?).await?;
    Ok(Json(serde_json::json!({"success": true, "email": email})))
}
