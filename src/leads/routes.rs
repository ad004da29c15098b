//! REST endpoints for the lead registry.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::model::{LeadFilter, LeadMetadata, LeadPatch, LeadStatus, NewLead};
use super::registry::{DEFAULT_PAGE_SIZE, LeadRegistry};
use crate::error::ApiError;
use crate::scoring::{LeadSource, LeadStage};
use crate::server::{ApiJson, ClientMeta, parse_id};

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
    limit: Option<usize>,
    stage: Option<LeadStage>,
    status: Option<LeadStatus>,
    source: Option<LeadSource>,
    search: Option<String>,
}

#[derive(Deserialize)]
struct NoteRequest {
    note: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Build the lead routes (mounted under `/api/leads`).
pub fn lead_routes(registry: Arc<LeadRegistry>) -> Router {
    Router::new()
        .route("/", post(create_lead).get(list_leads))
        .route("/paginated", get(paginated_leads))
        .route("/analytics/summary", get(summary))
        .route("/{id}", get(get_lead).put(update_lead))
        .route("/{id}/notes", post(add_note))
        .with_state(registry)
}

async fn create_lead(
    State(registry): State<Arc<LeadRegistry>>,
    meta: ClientMeta,
    ApiJson(body): ApiJson<NewLead>,
) -> Result<impl IntoResponse, ApiError> {
    let metadata = LeadMetadata {
        user_agent: meta.user_agent,
        ip_address: meta.ip.map(|ip| ip.to_string()),
        referrer: meta.referrer,
    };
    let lead = registry.create(body, metadata).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "lead": lead.brief(),
            "message": "Lead created successfully",
        })),
    ))
}

async fn list_leads(
    State(registry): State<Arc<LeadRegistry>>,
    Query(filter): Query<LeadFilter>,
) -> impl IntoResponse {
    let leads = registry.list(&filter).await;
    Json(serde_json::json!({
        "success": true,
        "total": leads.len(),
        "leads": leads,
    }))
}

async fn paginated_leads(
    State(registry): State<Arc<LeadRegistry>>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let filter = LeadFilter {
        stage: query.stage,
        status: query.status,
        source: query.source,
    };
    let page = registry
        .page(
            &filter,
            query.search.as_deref(),
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;

    Json(serde_json::json!({
        "success": true,
        "leads": page.leads,
        "pagination": page.pagination,
    }))
}

async fn get_lead(
    State(registry): State<Arc<LeadRegistry>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "lead")?;
    let lead = registry.get(id).await?;
    Ok(Json(serde_json::json!({"success": true, "lead": lead})))
}

async fn update_lead(
    State(registry): State<Arc<LeadRegistry>>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<LeadPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "lead")?;
    let lead = registry.update(id, patch).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "lead": lead,
        "message": "Lead updated successfully",
    })))
}

async fn add_note(
    State(registry): State<Arc<LeadRegistry>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "lead")?;
    let note = registry
        .add_note(id, body.note.as_deref().unwrap_or_default(), body.kind.as_deref())
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "note": note,
        "message": "Note added successfully",
    })))
}

async fn summary(State(registry): State<Arc<LeadRegistry>>) -> impl IntoResponse {
    let analytics = registry.summary().await;
    Json(serde_json::json!({"success": true, "analytics": analytics}))
}
