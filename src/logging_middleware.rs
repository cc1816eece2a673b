// src/logging_middleware.rs
//! Middleware for logging JSON request and response bodies in debug mode

use axum::body::to_bytes;
use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, enabled, Level};

/// Body fields that never reach the log
const SECRET_FIELDS: &[&str] = &[
    "password",
    "old_password",
    "new_password",
    "code",
    "access_token",
    "refresh_token",
];

const REDACTED: &str = "***";

/// Largest body the middleware buffers for logging
const MAX_LOGGED_BODY: usize = 64 * 1024;

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("application/json"))
}

/// Replace every secret field, at any depth, with a placeholder
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn loggable(bytes: &[u8]) -> Option<String> {
    let mut json = serde_json::from_slice::<Value>(bytes).ok()?;
    redact(&mut json);
    serde_json::to_string_pretty(&json).ok()
}

/// Log JSON bodies with secrets masked. Anything that is not JSON, or any
/// request when debug logging is off, passes through untouched.
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    if !enabled!(Level::DEBUG) {
        return Ok(next.run(request).await);
    }

    let request = if is_json(request.headers()) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_LOGGED_BODY)
            .await
            .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

        if let Some(body) = loggable(&bytes) {
            debug!(method = %parts.method, uri = %parts.uri, request_body = %body, "📥 Request");
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    let response = next.run(request).await;
    if !is_json(response.headers()) {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(body) = loggable(&bytes) {
        debug!(status = %parts.status, response_body = %body, "📤 Response");
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
