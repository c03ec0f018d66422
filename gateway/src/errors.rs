//! Error-to-HTTP mapping for the gateway surface.
//!
//! Every JSON error body carries at least an `error` field; bridge-originated
//! failures additionally carry the upstream `status` and a diagnostic
//! `source` or `bodyPreview`. Clients never see a stack trace.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bridge::client::BridgeError;
use bridge::registry::RegistryError;
use bridge::resolver::ResolveError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingParameter(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Catch-all for faults with no more specific mapping. Clients get the
    /// message only, never a backtrace.
    #[allow(dead_code)]
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingParameter(name) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("{name} is required") })),
            )
                .into_response(),

            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden" })),
            )
                .into_response(),

            ApiError::Bridge(err) => bridge_response(err),

            ApiError::Resolve(ResolveError::MissingAlias) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "alias is required" })),
            )
                .into_response(),

            ApiError::Resolve(ResolveError::EmptyRegistry) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "registry has no audiences" })),
            )
                .into_response(),

            ApiError::Resolve(ResolveError::Registry(err)) | ApiError::Registry(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "registry_load_error", "details": err.to_string() })),
            )
                .into_response(),

            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}

fn bridge_response(err: BridgeError) -> Response {
    let body = match err {
        BridgeError::Failed { status, source } => {
            json!({ "error": "bridge failed", "status": status, "source": source })
        }
        BridgeError::Html {
            status,
            content_type,
            body_preview,
        } => json!({
            "error": "bridge_html",
            "status": status,
            "contentType": content_type,
            "bodyPreview": body_preview,
        }),
        BridgeError::Transport(inner) => {
            json!({ "error": format!("bridge unreachable: {inner}"), "status": serde_json::Value::Null })
        }
    };

    (StatusCode::BAD_GATEWAY, Json(body)).into_response()
}
