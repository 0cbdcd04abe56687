//! REST API handlers for the admin server

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::error::{Error, ErrorCategory};
use crate::metrics;
use crate::models::Contest;
use crate::ranklist::{Ranklist, RanklistStatus};

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub category: &'static str,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            success: false,
            error: message.into(),
            category: category.as_str(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub contests: usize,
    pub problems: usize,
    pub monitored_ranklists: usize,
}

/// Result of a manual fetch
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub target: String,
    pub saved: usize,
}

/// Ranklist summary, without the standings rows
#[derive(Debug, Serialize)]
pub struct RanklistResponse {
    pub contest_id: i32,
    pub contest_name: String,
    pub status: RanklistStatus,
    pub is_rated: bool,
    pub fetch_time: DateTime<Utc>,
    pub participants: usize,
    pub deltas: HashMap<String, i32>,
}

impl From<&Ranklist> for RanklistResponse {
    fn from(ranklist: &Ranklist) -> Self {
        Self {
            contest_id: ranklist.contest.id,
            contest_name: ranklist.contest.name.clone(),
            status: ranklist.status(),
            is_rated: ranklist.is_rated(),
            fetch_time: ranklist.fetch_time,
            participants: ranklist.standings.len(),
            deltas: ranklist.deltas().clone(),
        }
    }
}

/// Which contests a manual fetch covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    All,
    Missing,
    Contest(i32),
}

impl FromStr for FetchTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "missing" => Ok(Self::Missing),
            other => other
                .parse()
                .map(Self::Contest)
                .map_err(|_| format!("Invalid target: {other}. Expected all, missing or a contest id")),
        }
    }
}

/// HTTP status for an error category
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Data => StatusCode::NOT_FOUND,
        ErrorCategory::Network | ErrorCategory::Api => StatusCode::BAD_GATEWAY,
        ErrorCategory::Config => StatusCode::BAD_REQUEST,
        ErrorCategory::Storage | ErrorCategory::Scheduler | ErrorCategory::Other => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: impl Into<Error>) -> Response {
    let err = err.into();
    let category = err.category();
    tracing::warn!(category = category.as_str(), error = %err, "Admin request failed");
    (
        status_for(category),
        Json(ErrorResponse::new(err.to_string(), category)),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, ErrorCategory::Config)),
    )
        .into_response()
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        // Manual triggers
        .route("/cache/contests/reload", post(reload_contests))
        .route("/cache/problems/reload", post(reload_problems))
        .route("/cache/ratingchanges/{target}", post(fetch_rating_changes))
        .route("/cache/problemsets/{target}", post(fetch_problemsets))
        // Read accessors
        .route("/contests/{id}", get(get_contest))
        .route("/ranklist/{id}", get(get_ranklist))
        .with_state(state)
}

// ============================================================================
// Health Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let caches = &state.caches;

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        contests: caches.contest.snapshot().contests.len(),
        problems: caches.problem.snapshot().len(),
        monitored_ranklists: caches.ranklist.monitored_contests().len(),
    }))
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string(), ErrorCategory::Other)),
        )
            .into_response(),
    }
}

// ============================================================================
// Trigger Handlers
// ============================================================================

async fn reload_contests(State(state): State<AppState>) -> Response {
    match state.caches.contest.reload_now().await {
        Ok(()) => {
            let count = state.caches.contest.snapshot().contests.len();
            Json(ApiResponse::success(format!("Contest cache reloaded, {count} contests"))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn reload_problems(State(state): State<AppState>) -> Response {
    match state.caches.problem.reload_now().await {
        Ok(()) => {
            let count = state.caches.problem.snapshot().len();
            Json(ApiResponse::success(format!("Problem cache reloaded, {count} problems"))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn fetch_rating_changes(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Response {
    let parsed = match target.parse::<FetchTarget>() {
        Ok(t) => t,
        Err(msg) => return bad_request(msg),
    };

    let cache = &state.caches.rating_changes;
    let result = match parsed {
        FetchTarget::All => cache.fetch_all_contests().await,
        FetchTarget::Missing => cache.fetch_missing_contests().await,
        FetchTarget::Contest(id) => cache.fetch_contest(id).await,
    };

    match result {
        Ok(saved) => Json(ApiResponse::success(FetchResponse { target, saved })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn fetch_problemsets(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Response {
    let cache = &state.caches.problemset;
    let result = match target.parse::<FetchTarget>() {
        Ok(FetchTarget::All) => cache.update_for_all().await,
        Ok(FetchTarget::Contest(id)) => cache.update_for_contest(id).await,
        Ok(FetchTarget::Missing) => {
            return bad_request("Problemsets can only be fetched for all or one contest")
        }
        Err(msg) => return bad_request(msg),
    };

    match result {
        Ok(saved) => Json(ApiResponse::success(FetchResponse { target, saved })).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Read Handlers
// ============================================================================

async fn get_contest(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.caches.contest.get_contest(id) {
        Ok(contest) => Json(ApiResponse::<Contest>::success(contest)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_ranklist(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    let caches = &state.caches;
    let ranklist = caches
        .contest
        .get_contest(id)
        .and_then(|contest| caches.ranklist.get_ranklist(&contest, false));

    match ranklist {
        Ok(ranklist) => {
            Json(ApiResponse::success(RanklistResponse::from(ranklist.as_ref()))).into_response()
        }
        Err(e) => error_response(e),
    }
}
