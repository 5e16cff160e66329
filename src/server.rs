use crate::config::ShimConfig;
use crate::intercept::{ChainOutcome, InterceptorChain, ShortCircuit};
use crate::logging::SharedLogger;
use crate::proxy;
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ShimConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    pub interceptors: Arc<InterceptorChain>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/logs", get(handle_logs))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let mut req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {}", e));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={} tools={}",
            req.model,
            req.is_streaming(),
            req.messages.len(),
            req.tool_count()
        ),
    );

    match state.interceptors.run(&req).await {
        ChainOutcome::Responded {
            interceptor,
            response,
        } => {
            state
                .logger
                .info("intercept", format!("{} answered model={}", interceptor, req.model));
            return short_circuit_response(response);
        }
        ChainOutcome::Rewritten {
            interceptor,
            request,
        } => {
            state
                .logger
                .info("intercept", format!("{} rewrote request", interceptor));
            req = request;
        }
        ChainOutcome::Unhandled => {}
    }

    if req.is_streaming() {
        handle_streaming(state, &req).await
    } else {
        handle_non_streaming(state, &req).await
    }
}

fn short_circuit_response(response: ShortCircuit) -> Response {
    match response {
        ShortCircuit::EventStream(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        ShortCircuit::Message(message) => Json(message).into_response(),
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    match proxy::proxy_non_streaming(req, &state.config, &state.client, &state.logger).await {
        Ok(proxy::ProxyResult::Success(resp)) => Json(resp).into_response(),
        Ok(proxy::ProxyResult::Error(err, status_code)) => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(err)).into_response()
        }
        Err(e) => {
            state.logger.error("server", format!("Proxy error: {}", e));
            let err = ErrorResponse::api_error(format!("Proxy error: {}", e));
            (StatusCode::BAD_GATEWAY, Json(err)).into_response()
        }
    }
}

async fn handle_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    let sse_stream =
        match proxy::proxy_streaming(req, &state.config, &state.client, &state.logger).await {
            Ok(s) => s,
            Err(e) => {
                state
                    .logger
                    .error("server", format!("Streaming setup error: {}", e));
                let err = ErrorResponse::api_error(format!("Streaming error: {}", e));
                return (StatusCode::BAD_GATEWAY, Json(err)).into_response();
            }
        };

    let event_stream = sse_stream.map(|result| -> std::result::Result<Event, Infallible> {
        match result {
            Ok(sse_event) => Ok(Event::default().event(sse_event.event).data(sse_event.data)),
            Err(_) => Ok(Event::default().event("error").data("{}")),
        }
    });

    Sse::new(event_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.config.provider.name,
        "api": state.config.wire_api(),
        "interceptors": state.interceptors.names(),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = state
        .config
        .models
        .keys()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": state.config.provider.name,
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<serde_json::Value> {
    let entries = state.logger.recent(query.limit.unwrap_or(100));
    Json(serde_json::json!({ "entries": entries }))
}
