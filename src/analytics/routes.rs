//! REST endpoints for funnel tracking and reports.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::tracker::{
    ConversionEvent, DateRange, FunnelTracker, LeadEvent, VisitorEvent, ab_tests,
};
use crate::error::ApiError;
use crate::server::{ApiJson, ClientMeta};

#[derive(Deserialize)]
struct FunnelQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Build the analytics routes (mounted under `/api/analytics`).
pub fn analytics_routes(tracker: Arc<FunnelTracker>) -> Router {
    Router::new()
        .route("/track-visitor", post(track_visitor))
        .route("/track-lead", post(track_lead))
        .route("/track-conversion", post(track_conversion))
        .route("/funnel", get(funnel))
        .route("/realtime", get(realtime))
        .route("/insights", get(insights))
        .route("/ab-testing", get(ab_testing))
        .with_state(tracker)
}

async fn track_visitor(
    State(tracker): State<Arc<FunnelTracker>>,
    meta: ClientMeta,
    ApiJson(mut event): ApiJson<VisitorEvent>,
) -> impl IntoResponse {
    if event.user_agent.is_none() {
        event.user_agent = meta.user_agent;
    }
    let visitor = tracker.track_visitor(event).await;
    Json(serde_json::json!({
        "success": true,
        "visitor_id": visitor.id,
        "message": "Visitor tracked successfully",
    }))
}

async fn track_lead(
    State(tracker): State<Arc<FunnelTracker>>,
    ApiJson(event): ApiJson<LeadEvent>,
) -> impl IntoResponse {
    let lead = tracker.track_lead(event).await;
    Json(serde_json::json!({
        "success": true,
        "lead": lead,
        "message": "Lead conversion tracked successfully",
    }))
}

async fn track_conversion(
    State(tracker): State<Arc<FunnelTracker>>,
    ApiJson(event): ApiJson<ConversionEvent>,
) -> impl IntoResponse {
    let conversion = tracker.track_conversion(event).await;
    Json(serde_json::json!({
        "success": true,
        "conversion_id": conversion.id,
        "message": "Conversion tracked successfully",
    }))
}

async fn funnel(
    State(tracker): State<Arc<FunnelTracker>>,
    Query(query): Query<FunnelQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::resolve(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        Utc::now().date_naive(),
    )?;
    let report = tracker.funnel(range).await;
    Ok(Json(serde_json::json!({
        "success": true,
        "funnel": report.funnel,
        "source_breakdown": report.source_breakdown,
        "daily_trends": report.daily_trends,
        "date_range": report.date_range,
    })))
}

async fn realtime(State(tracker): State<Arc<FunnelTracker>>) -> impl IntoResponse {
    let realtime = tracker.realtime(Utc::now()).await;
    Json(serde_json::json!({
        "success": true,
        "timestamp": realtime.timestamp,
        "realtime": realtime,
    }))
}

async fn insights(State(tracker): State<Arc<FunnelTracker>>) -> impl IntoResponse {
    let report = tracker.insights().await;
    Json(serde_json::json!({
        "success": true,
        "insights": report.insights,
        "source_performance": report.source_performance,
        "hourly_performance": report.hourly_performance,
    }))
}

async fn ab_testing() -> impl IntoResponse {
    Json(serde_json::json!({"success": true, "ab_tests": ab_tests()}))
}
