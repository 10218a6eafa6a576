// OpenAI Handler
use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::debug;

use crate::proxy::dispatcher::AttemptError;
use crate::proxy::server::AppState;
use crate::proxy::session_pool::Session;
use crate::proxy::sticky::select_proxy;

static MODELS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "claude-3-7-sonnet-20250219",
        "claude-3-7-sonnet-20250219-think",
        "claude-sonnet-4-20250514",
        "claude-sonnet-4-20250514-think",
        "claude-opus-4-20250514",
        "claude-opus-4-20250514-think",
    ]
});

fn validate_body(body: &Value) -> Result<bool, (StatusCode, String)> {
    if body.get("model").and_then(Value::as_str).is_none() {
        return Err((StatusCode::BAD_REQUEST, "Invalid request: missing model".to_string()));
    }
    if body.get("messages").and_then(Value::as_array).is_none() {
        return Err((StatusCode::BAD_REQUEST, "Invalid request: missing messages".to_string()));
    }
    Ok(body.get("stream").and_then(Value::as_bool).unwrap_or(false))
}

/// One upstream attempt with the given session and proxy
async fn relay_once(
    state: &AppState,
    session: Session,
    proxy: Option<String>,
    body: &Value,
    stream: bool,
) -> Result<Response, AttemptError> {
    let response = state
        .upstream
        .chat_completions(&session, proxy.as_deref(), body)
        .await
        .map_err(|e| AttemptError::Retry(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        if let Some(org) = state.upstream.organization_id(&response) {
            if session.organization_id.as_deref() != Some(org.as_str()) {
                state.dispatcher.record_organization_id(&session.key, &org);
            }
        }

        if stream {
            return Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .body(Body::from_stream(response.bytes_stream()))
                .map_err(|e| AttemptError::Fatal(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Retry(format!("Parse error: {}", e)))?;
        return Ok(Json(payload).into_response());
    }

    let status_code = status.as_u16();
    let error_text = response.text().await.unwrap_or_default();

    // Auth, rate limit and server errors rotate to the next session
    if matches!(status_code, 401 | 403 | 429) || status.is_server_error() {
        return Err(AttemptError::Retry(format!("HTTP {}: {}", status_code, error_text)));
    }

    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    Err(AttemptError::Fatal(status, error_text))
}

pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, (StatusCode, String)> {
    let stream = validate_body(&body)?;
    debug!(
        "Received OpenAI request for model: {}",
        body["model"].as_str().unwrap_or_default()
    );

    let state_ref = &state;
    let body_ref = &body;
    state
        .dispatcher
        .dispatch(move |session, proxy| relay_once(state_ref, session, proxy, body_ref, stream))
        .await
        .map_err(|e| e.into_response_parts())
}

/// Mirror route: the caller's bearer token is used as the upstream session
pub async fn handle_mirror_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, (StatusCode, String)> {
    let stream = validate_body(&body)?;

    let key = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header".to_string(),
        ))?;

    let session = Session::new(key, None);
    let proxy = select_proxy(&session.key, state.dispatcher.pool().proxies()).map(str::to_string);

    relay_once(&state, session, proxy, &body, stream)
        .await
        .map_err(|e| match e {
            AttemptError::Retry(message) => (StatusCode::BAD_GATEWAY, message),
            AttemptError::Fatal(status, message) => (status, message),
        })
}

pub async fn handle_list_models() -> impl IntoResponse {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = MODELS
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": "anthropic",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}
