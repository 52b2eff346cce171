// SPDX-License-Identifier: Apache-2.0
//! The generic per-request handler: one route per wire protocol, both
//! routed through the same pipeline via `AdapterRegistry`.
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use grov_adapters::AgentAdapter;
use grov_analyzers::HistoryItem as AnalyzerHistoryItem;
use grov_core::ProxyError;
use grov_store::{DriftLogRepository, SessionRepository, StepRepository};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Headers forwarded upstream verbatim, aside from `authorization` which
/// is always overwritten with the configured upstream credential.
const FORWARD_REQUEST_HEADERS: &[&str] = &["content-type", "anthropic-version", "anthropic-beta", "openai-beta"];

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

pub async fn not_found() -> impl IntoResponse {
    ApiError(ProxyError::NoAdapter("unmatched route".into()))
}

/// `POST /v1/messages` and `POST /v1/responses`, both routed here with the
/// matched path handed through so the adapter registry can resolve the
/// right `AgentAdapter`.
pub async fn proxy<R>(
    State(state): State<AppState<R>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let full_path = uri.path().to_string();
    let adapter = state.adapters.for_path(&full_path).map_err(|_| ApiError(ProxyError::NoAdapter(full_path.clone())))?;

    let request_body: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError(ProxyError::MalformedBody(e.to_string())))?;

    if adapter.is_subagent_model(&request_body) {
        return forward_bytes(&state, &adapter, &body, &headers).await;
    }

    let project_path = adapter.extract_project_path(&request_body).unwrap_or_else(|| "default".to_string());
    let lookup = state
        .core
        .sessions
        .get_or_create(&project_path)
        .await
        .map_err(|e| ApiError(ProxyError::MalformedBody(e.to_string())))?;

    let messages = adapter.get_messages(&request_body);
    let message_count = messages.len();
    let last_is_tool_result = messages
        .last()
        .map(|m| m.get("role").and_then(Value::as_str) == Some("user") && is_tool_result_message(m))
        .unwrap_or(false);
    let last_count = state.core.injection.last_message_count(&project_path).await;
    let kind = grov_core::injection_engine::detect_request_kind(last_count, message_count, last_is_tool_result);
    state.core.injection.observe_message_count(&project_path, message_count).await;

    let mut outbound = body.to_vec();
    match kind {
        grov_types::RequestKind::First => {
            let user_prompt = adapter.get_last_user_content(&request_body).unwrap_or_default();
            if let Ok(preview) = state
                .core
                .injection
                .build_first_request_preview(&project_path, &user_prompt, &[], message_count.saturating_sub(1))
                .await
            {
                let injected = adapter.inject_into_raw_system_prompt(&outbound, &preview.text);
                if injected.applied {
                    outbound = injected.bytes;
                }
                let settings = adapter.settings();
                let tool_injected = adapter.inject_tool_into_raw_body(&outbound, &settings.expand_tool_definition.to_string());
                if tool_injected.applied {
                    outbound = tool_injected.bytes;
                }
            }
        }
        grov_types::RequestKind::Continuation | grov_types::RequestKind::Retry | grov_types::RequestKind::NewConversation => {}
    }

    run_turn(&state, &adapter, &project_path, &lookup, outbound, &headers).await
}

fn is_tool_result_message(message: &Value) -> bool {
    match message.get("content") {
        Some(Value::Array(blocks)) => blocks.iter().any(|b| {
            matches!(b.get("type").and_then(Value::as_str), Some("tool_result") | Some("function_call_output"))
        }),
        _ => false,
    }
}

/// Forward to the upstream, running the tool-expansion loop (capped at 5
/// round-trips) until the model stops asking for `grov_expand` or the cap
/// is hit.
async fn run_turn<R>(
    state: &AppState<R>,
    adapter: &Arc<dyn AgentAdapter>,
    project_path: &str,
    lookup: &grov_core::SessionLookup,
    mut outbound: Vec<u8>,
    headers: &HeaderMap,
) -> Result<Response, ApiError>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let mut iterations = 0u32;
    loop {
        let response = send_upstream(state, adapter.as_ref(), &outbound, headers).await?;
        let response_headers = response.headers;
        let response_body = response.body;
        let raw_bytes = response.raw_bytes;
        let is_sse = response.is_sse;

        let settings = adapter.settings();
        let expand_call = adapter.find_internal_tool_use(&response_body, settings.expand_tool_name);

        if let Some(call) = expand_call {
            iterations += 1;
            if iterations > state.core.injection.max_expansion_iterations() {
                warn!(project_path, "expand tool-call loop exceeded the iteration cap, forwarding as-is");
                return Ok(build_response(response_headers, response_body, raw_bytes, is_sse, adapter));
            }
            let ids: Vec<String> = call
                .input
                .get("ids")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let expanded = state.core.injection.expand_ids(project_path, &ids).await;
            state
                .core
                .injection
                .record_tool_cycle(project_path, iterations as usize, settings.expand_tool_definition.to_string(), expanded.clone())
                .await;

            outbound = adapter
                .build_continue_body(&outbound, &call.id, &expanded)
                .map_err(|e| ApiError(ProxyError::MalformedBody(e.to_string())))?;
            continue;
        }

        if adapter.is_end_turn(&response_body) {
            state
                .core
                .extended_cache
                .record(&lookup.session.id, project_path, &upstream_url(state, adapter.as_ref()), outbound.clone(), response_headers.clone())
                .await;
            spawn_post_process(state, adapter.clone(), project_path.to_string(), lookup, &outbound, &response_body);
        }

        return Ok(build_response(response_headers, response_body, raw_bytes, is_sse, adapter));
    }
}

struct UpstreamResponse {
    headers: Vec<(String, String)>,
    body: Value,
    raw_bytes: Vec<u8>,
    is_sse: bool,
}

async fn send_upstream<R>(
    state: &AppState<R>,
    adapter: &dyn AgentAdapter,
    body: &[u8],
    inbound_headers: &HeaderMap,
) -> Result<UpstreamResponse, ApiError>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let url = upstream_url(state, adapter);
    let mut req = state.upstream.post(&url).body(body.to_vec());
    for name in FORWARD_REQUEST_HEADERS {
        if let Some(v) = inbound_headers.get(*name) {
            req = req.header(*name, v.clone());
        }
    }
    if let Some(key) = state.config.upstream.resolve_api_key() {
        req = req.header("x-api-key", key.clone()).header("authorization", format!("Bearer {key}"));
    }

    let timeout = Duration::from_secs(state.config.upstream.timeout_secs);
    let resp = tokio::time::timeout(timeout, req.send())
        .await
        .map_err(|_| ApiError(ProxyError::UpstreamTimeout))?
        .map_err(|e| {
            error!(error = %e, "upstream request failed");
            ApiError(ProxyError::UpstreamError)
        })?;

    let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let filtered = adapter.filter_response_headers(&headers);
    let is_sse = resp
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    let raw_bytes = resp.bytes().await.map_err(|_| ApiError(ProxyError::UpstreamError))?.to_vec();
    let value: Value = if is_sse {
        adapter.decode_sse_response(&raw_bytes).map_err(|e| {
            error!(error = %e, "failed to decode upstream SSE body");
            ApiError(ProxyError::UpstreamError)
        })?
    } else {
        serde_json::from_slice(&raw_bytes).map_err(|e| ApiError(ProxyError::MalformedBody(e.to_string())))?
    };

    if !adapter.is_valid_response(&value) {
        return Err(ApiError(ProxyError::UpstreamError));
    }

    Ok(UpstreamResponse { headers: filtered, body: value, raw_bytes, is_sse })
}

fn upstream_url<R>(state: &AppState<R>, adapter: &dyn AgentAdapter) -> String {
    format!("{}{}", state.config.upstream.base_url.trim_end_matches('/'), adapter.upstream_path())
}

fn build_response(
    headers: Vec<(String, String)>,
    body: Value,
    raw_bytes: Vec<u8>,
    is_sse: bool,
    adapter: &Arc<dyn AgentAdapter>,
) -> Response {
    let mut resp = if is_sse {
        Response::new(Body::from(raw_bytes))
    } else {
        let mut r = Json(body).into_response();
        *r.status_mut() = StatusCode::OK;
        r
    };
    for (k, v) in headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(k.as_bytes()),
            axum::http::HeaderValue::from_str(&v),
        ) {
            resp.headers_mut().insert(name, value);
        }
    }
    resp.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static(adapter.response_content_type(is_sse)),
    );
    resp
}

fn spawn_post_process<R>(
    state: &AppState<R>,
    adapter: Arc<dyn AgentAdapter>,
    project_path: String,
    lookup: &grov_core::SessionLookup,
    request_body: &[u8],
    response_body: &Value,
) where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let core = state.core.clone();
    let session = lookup.session.clone();
    let most_recent_completed = lookup.most_recent_completed.clone();

    let request_value: Value = match serde_json::from_slice(request_body) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "could not parse outbound body for post-processing");
            return;
        }
    };
    let user_message = adapter.get_last_user_content(&request_value).unwrap_or_default();
    let assistant_text = adapter.extract_text_content(response_body).unwrap_or_default();
    let history: Vec<AnalyzerHistoryItem> = adapter
        .extract_history(&request_value)
        .into_iter()
        .map(|h| AnalyzerHistoryItem { role: h.role, text: h.text })
        .collect();
    let response = response_body.clone();

    tokio::spawn(async move {
        core.post_process_end_turn(adapter, project_path, session, most_recent_completed, user_message, assistant_text, history, response)
            .await;
    });
    info!("spawned end-turn post-processing");
}

/// Subagent-model bypass: haiku/mini-class requests skip the entire
/// pipeline and are forwarded byte-for-byte.
async fn forward_bytes<R>(
    state: &AppState<R>,
    adapter: &Arc<dyn AgentAdapter>,
    body: &[u8],
    headers: &HeaderMap,
) -> Result<Response, ApiError>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let response = send_upstream(state, adapter.as_ref(), body, headers).await?;
    Ok(build_response(response.headers, response.body, response.raw_bytes, response.is_sse, adapter))
}
