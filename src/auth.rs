//! Shared-secret authentication for every API route.
//!
//! Requests must carry the configured header (`x-api-key` by default) with
//! exactly the key the server was started with. Anything else is turned away
//! with 403 before it reaches a handler.

use crate::{Error, Result};
use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_HEADER: &str = "x-api-key";

/// The header to look at and the value it has to hold.
#[derive(Clone)]
pub struct ApiKeyAuth {
    header: HeaderName,
    expected: Arc<str>,
}

impl std::fmt::Debug for ApiKeyAuth {
    // Keeps the key out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl ApiKeyAuth {
    pub fn new(header: &str, expected: &str) -> Result<Self> {
        if expected.is_empty() {
            return Err(Error::MissingApiKey);
        }
        let header = HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes())
            .map_err(|e| Error::Config(format!("bad API key header name {header:?}: {e}")))?;

        Ok(Self {
            header,
            expected: Arc::from(expected),
        })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// True when the request carries the expected key.
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.is_empty() && v == &*self.expected)
    }
}

/// axum middleware: pass the request on, or answer 403.
pub async fn require_api_key(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_authorized(request.headers()) {
        tracing::warn!(
            "Rejected {} {}: invalid or missing API key",
            request.method(),
            request.uri().path()
        );
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": "Invalid or missing API Key" })),
        )
            .into_response();
    }

    next.run(request).await
}
