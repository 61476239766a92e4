//! HTTP routes
//!
//! `POST /mutate` unwraps an `AdmissionReview`, runs the mutator and wraps
//! the response. Transport-level problems (unreadable body, invalid JSON,
//! missing request) are answered with a plain-text 400; everything else is a
//! 200 carrying a review.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, error};
use vmfm_core::{AdmissionReview, Mutator};

/// Shared request state
#[derive(Debug, Clone)]
pub struct AppState {
    mutator: Arc<Mutator>,
}

impl AppState {
    /// Wrap a mutator
    #[must_use]
    pub fn new(mutator: Arc<Mutator>) -> Self {
        Self { mutator }
    }
}

/// Build the webhook router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mutate", post(mutate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn mutate(State(state): State<AppState>, body: Result<Bytes, BytesRejection>) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to read request body");
            return bad_request("Failed to read request body");
        }
    };

    let review = match AdmissionReview::from_slice(&body) {
        Ok(review) => review,
        Err(err) => {
            error!(error = %err, "failed to decode admission review");
            return bad_request("Failed to decode admission review");
        }
    };

    let Some(request) = review.request else {
        error!("admission review has no request");
        return bad_request("Admission review has no request");
    };

    debug!(uid = %request.uid, operation = %request.operation, "admission request received");
    let response = state.mutator.review(&request).await;
    Json(AdmissionReview::from_response(response)).into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ready"
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}
