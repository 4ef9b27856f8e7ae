//! HTTP surface for the planning relay.
//!
//! | Route           | Method  | Body                                   |
//! |-----------------|---------|----------------------------------------|
//! | `/api/optimize` | POST    | menu request, replies with plan+summary |
//! | `/api/drinks`   | POST    | drinks request, replies with item list  |
//! | both of above   | OPTIONS | empty `200` from the CORS layer         |
//! | `/health`       | GET     | liveness and provider status            |
//!
//! Any other method on the planning routes gets `405`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use partyplan_core::PlanningKind;
use partyplan_runtime::{Relay, RelayError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const CONFIGURATION_ERROR: &str =
    "Server configuration error: GEMINI_API_KEY is missing. Check your .env file.";

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    relay: Option<Arc<Relay>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay: Some(relay),
            started_at: Utc::now(),
        }
    }

    /// State for a server started without credentials; planning requests fail with 500.
    pub fn unconfigured() -> Self {
        Self {
            relay: None,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/optimize", post(optimize).fallback(method_not_allowed))
        .route("/api/drinks", post(drinks).fallback(method_not_allowed))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// An error reply: a status and a JSON `{error, details?}` body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                details: None,
            },
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    fn unreadable_body(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, "Request body must be a JSON object.").with_details(rejection.body_text())
    }

    fn from_relay(kind: PlanningKind, error: RelayError) -> Self {
        match error {
            RelayError::Client(e) => Self::new(StatusCode::BAD_REQUEST, e.message()),
            RelayError::Configuration(message) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Server configuration error: {}", message),
            ),
            upstream @ (RelayError::Upstream { .. } | RelayError::Transient { .. }) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                failure_message(kind),
            )
            .with_details(upstream.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn failure_message(kind: PlanningKind) -> &'static str {
    match kind {
        PlanningKind::Menu => "Failed to generate optimized menu plan.",
        PlanningKind::Drinks => "Failed to process request with Gemini API.",
    }
}

async fn optimize(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    handle_plan(&state, PlanningKind::Menu, body).await
}

async fn drinks(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    handle_plan(&state, PlanningKind::Drinks, body).await
}

async fn handle_plan(
    state: &AppState,
    kind: PlanningKind,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(relay) = state.relay.as_ref() else {
        tracing::error!(kind = %kind, "Planning request received but no API key is configured");
        return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, CONFIGURATION_ERROR).into_response();
    };

    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::info!(kind = %kind, error = %rejection, "Unreadable request body");
            return ApiError::unreadable_body(rejection).into_response();
        }
    };

    match relay.plan(kind, &body).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => ApiError::from_relay(kind, error).into_response(),
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed. Use POST.")
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: Option<String>,
    started_at: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, provider) = match &state.relay {
        Some(relay) => {
            let status = if relay.health_check().await {
                "ok"
            } else {
                "degraded"
            };
            (status, Some(relay.provider_name().to_string()))
        }
        None => ("unconfigured", None),
    };

    Json(HealthResponse {
        status,
        provider,
        started_at: state.started_at,
    })
}
