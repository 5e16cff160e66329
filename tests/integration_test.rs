use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use claude_shim::config::{InterceptConfig, LogConfig, ProviderConfig, ShimConfig};
use claude_shim::intercept::{ChainOutcome, InterceptorChain};
use claude_shim::logging::SharedLogger;
use claude_shim::providers::WireApi;
use claude_shim::proxy;
use claude_shim::translate::anthropic_types::*;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

const TEST_KEY_ENV: &str = "CLAUDE_SHIM_TEST_KEY";
const BASH_PROMPT: &str = "Your task is to process Bash commands that an AI coding agent wants to run.";

fn config(base_url: &str, api: WireApi, preflight: bool) -> ShimConfig {
    std::env::set_var(TEST_KEY_ENV, "test-key");

    let mut models = HashMap::new();
    models.insert("claude-sonnet-4-20250514".to_string(), "gpt-test".to_string());

    ShimConfig {
        port: 0,
        provider: ProviderConfig {
            name: "mock".to_string(),
            base_url: Some(base_url.to_string()),
            api_key_env: TEST_KEY_ENV.to_string(),
            api: Some(api),
        },
        models,
        intercept: InterceptConfig { preflight },
        log: LogConfig::default(),
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_shim(config: ShimConfig) -> SocketAddr {
    let interceptors = InterceptorChain::from_config(&config.intercept);
    let state = Arc::new(claude_shim::AppState {
        config,
        client: reqwest::Client::new(),
        logger: SharedLogger::in_memory(100),
        interceptors: Arc::new(interceptors),
    });
    serve(claude_shim::build_router(state)).await
}

// ────────────────────────────────────────────────────────────────
// Mock OpenAI-compatible provider
// ────────────────────────────────────────────────────────────────

type Captured = Arc<Mutex<Vec<Value>>>;

const CHAT_STREAM: &str = concat!(
    "data: {\"id\":\"c1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"po\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"model\":\"gpt-test\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ng\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"id\":\"c1\",\"model\":\"gpt-test\",\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2,\"total_tokens\":9}}\n\n",
    "data: [DONE]\n\n",
);

const RESPONSES_STREAM: &str = concat!(
    "event: response.created\n",
    "data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"model\":\"gpt-test\",\"status\":\"in_progress\",\"output\":[]}}\n\n",
    "event: response.output_item.added\n",
    "data: {\"type\":\"response.output_item.added\",\"output_index\":0,\"item\":{\"type\":\"function_call\",\"id\":\"fc_1\",\"call_id\":\"call_1\",\"name\":\"get_weather\",\"arguments\":\"\"}}\n\n",
    "event: response.function_call_arguments.delta\n",
    "data: {\"type\":\"response.function_call_arguments.delta\",\"output_index\":0,\"delta\":\"{\\\"city\\\":\\\"London\\\"}\"}\n\n",
    "event: response.output_item.done\n",
    "data: {\"type\":\"response.output_item.done\",\"output_index\":0}\n\n",
    "event: response.completed\n",
    "data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"model\":\"gpt-test\",\"status\":\"completed\",\"output\":[],\"usage\":{\"input_tokens\":11,\"output_tokens\":4}}}\n\n",
);

fn event_stream(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn mock_chat(State(captured): State<Captured>, Json(body): Json<Value>) -> Response {
    let streaming = body["stream"] == json!(true);
    let model = body["model"].clone();
    captured.lock().unwrap().push(body);

    if model == json!("rate-limited") {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "slow down", "type": "rate_limit_exceeded"}})),
        )
            .into_response();
    }
    if streaming {
        return event_stream(CHAT_STREAM);
    }
    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-test",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "pong"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 7, "completion_tokens": 1, "total_tokens": 8}
    }))
    .into_response()
}

async fn mock_responses(State(captured): State<Captured>, Json(body): Json<Value>) -> Response {
    let streaming = body["stream"] == json!(true);
    captured.lock().unwrap().push(body);

    if streaming {
        return event_stream(RESPONSES_STREAM);
    }
    Json(json!({
        "id": "resp_abc",
        "model": "gpt-test",
        "status": "completed",
        "output": [
            {"type": "reasoning", "id": "rs_1", "summary": [{"type": "summary_text", "text": "Thinking it over"}]},
            {"type": "message", "id": "m_1", "role": "assistant", "content": [{"type": "output_text", "text": "pong"}]}
        ],
        "usage": {"input_tokens": 9, "output_tokens": 3}
    }))
    .into_response()
}

async fn start_provider() -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/chat/completions", post(mock_chat))
        .route("/v1/responses", post(mock_responses))
        .with_state(captured.clone());
    let addr = serve(app).await;
    (format!("http://{addr}/v1"), captured)
}

/// Split an SSE body into (event name, data JSON) pairs.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

fn preflight_body(stream: bool) -> Value {
    json!({
        "model": "claude-haiku-4-5-20251001",
        "max_tokens": 512,
        "stream": stream,
        "system": [{"type": "text", "text": BASH_PROMPT}],
        "messages": [{"role": "user", "content": "Command: git status"}]
    })
}

// ────────────────────────────────────────────────────────────────
// Interception (no provider contact)
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_preflight_stream_is_answered_locally() {
    // Nothing listens on port 9; any upstream call would fail with 502.
    let shim = start_shim(config("http://127.0.0.1:9/v1", WireApi::Chat, true)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&preflight_body(true))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");

    let body = resp.text().await.unwrap();
    let frames = parse_sse(&body);
    let names: Vec<&str> = frames.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert_eq!(frames[0].1["message"]["model"], "claude-haiku-4-5-20251001");
    assert_eq!(frames[2].1["delta"]["text"], "none");
    assert_eq!(frames[4].1["delta"]["stop_reason"], "end_turn");
}

#[tokio::test]
async fn test_preflight_non_streaming_is_answered_locally() {
    let shim = start_shim(config("http://127.0.0.1:9/v1", WireApi::Responses, true)).await;

    let mut body = preflight_body(false);
    body["system"] = json!("Extract any file paths that this command reads or modifies.");

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["type"], "message");
    assert_eq!(message["content"][0]["text"], "<filepaths>\n</filepaths>");
}

#[tokio::test]
async fn test_tool_bearing_request_is_not_intercepted() {
    let tools: Vec<Value> = (0..20)
        .map(|i| json!({"name": format!("tool_{i}"), "input_schema": {"type": "object"}}))
        .collect();
    let mut body = preflight_body(true);
    body["tools"] = Value::Array(tools);
    let req: MessagesRequest = serde_json::from_value(body).unwrap();

    let chain = InterceptorChain::from_config(&InterceptConfig::default());
    assert!(matches!(chain.run(&req).await, ChainOutcome::Unhandled));
}

#[tokio::test]
async fn test_preflight_disabled_reaches_provider() {
    let (base_url, captured) = start_provider().await;
    let shim = start_shim(config(&base_url, WireApi::Chat, false)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&preflight_body(false))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["content"][0]["text"], "pong");
    assert_eq!(captured.lock().unwrap().len(), 1);
}

// ────────────────────────────────────────────────────────────────
// Translation through a mock provider
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_non_streaming_roundtrip() {
    let (base_url, captured) = start_provider().await;
    let shim = start_shim(config(&base_url, WireApi::Chat, true)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&json!({
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 1024,
            "system": "You are terse.",
            "thinking": {"type": "enabled", "budget_tokens": 10000},
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["model"], "claude-sonnet-4-20250514");
    assert_eq!(message["content"][0], json!({"type": "text", "text": "pong"}));
    assert_eq!(message["stop_reason"], "end_turn");
    assert_eq!(message["usage"]["input_tokens"], 7);

    let sent = captured.lock().unwrap()[0].clone();
    assert_eq!(sent["model"], "gpt-test");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["role"], "user");
    assert_eq!(sent["reasoning_effort"], "medium");
    assert!(sent.get("max_tokens").is_none());
}

#[tokio::test]
async fn test_chat_streaming_roundtrip() {
    let (base_url, _captured) = start_provider().await;
    let shim = start_shim(config(&base_url, WireApi::Chat, true)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&json!({
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 1024,
            "stream": true,
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    let frames = parse_sse(&body);

    assert_eq!(frames.first().map(|(n, _)| n.as_str()), Some("message_start"));
    assert_eq!(frames.last().map(|(n, _)| n.as_str()), Some("message_stop"));
    let text: String = frames
        .iter()
        .filter(|(n, _)| n == "content_block_delta")
        .filter_map(|(_, d)| d["delta"]["text"].as_str())
        .collect();
    assert_eq!(text, "pong");

    // Usage arrives in a chunk after finish_reason
    let delta = frames.iter().find(|(n, _)| n == "message_delta").map(|(_, d)| d).unwrap();
    assert_eq!(delta["delta"]["stop_reason"], "end_turn");
    assert_eq!(delta["usage"]["output_tokens"], 2);
}

#[tokio::test]
async fn test_responses_non_streaming_roundtrip() {
    let (base_url, captured) = start_provider().await;
    let config = config(&base_url, WireApi::Responses, true);
    let req: MessagesRequest = serde_json::from_value(json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 1024,
        "thinking": {"type": "enabled", "budget_tokens": 2000},
        "messages": [{"role": "user", "content": "ping"}]
    }))
    .unwrap();

    let result = proxy::proxy_non_streaming(
        &req,
        &config,
        &reqwest::Client::new(),
        &SharedLogger::in_memory(10),
    )
    .await
    .unwrap();

    let resp = match result {
        proxy::ProxyResult::Success(resp) => resp,
        proxy::ProxyResult::Error(err, status) => panic!("Provider error ({status}): {err:?}"),
    };
    assert_eq!(resp.id, "msg_abc");
    assert_eq!(resp.content.len(), 2);
    assert!(matches!(resp.content[0], ResponseContentBlock::Thinking { .. }));
    assert_eq!(
        resp.content[1],
        ResponseContentBlock::Text {
            text: "pong".to_string()
        }
    );

    let sent = captured.lock().unwrap()[0].clone();
    assert_eq!(sent["reasoning"], json!({"effort": "low", "summary": "auto"}));
    assert_eq!(sent["input"][0]["role"], "user");
}

#[tokio::test]
async fn test_responses_streaming_tool_call() {
    let (base_url, _captured) = start_provider().await;
    let config = config(&base_url, WireApi::Responses, true);
    let req: MessagesRequest = serde_json::from_value(json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 1024,
        "stream": true,
        "tools": [{"name": "get_weather", "input_schema": {"type": "object"}}],
        "messages": [{"role": "user", "content": "Weather in London?"}]
    }))
    .unwrap();

    let stream = proxy::proxy_streaming(
        &req,
        &config,
        &reqwest::Client::new(),
        &SharedLogger::in_memory(10),
    )
    .await
    .unwrap();
    let events: Vec<proxy::SseEvent> = stream.filter_map(|e| async move { e.ok() }).collect().await;

    let start = events
        .iter()
        .find(|e| e.event == "content_block_start")
        .unwrap();
    let start: Value = serde_json::from_str(&start.data).unwrap();
    assert_eq!(start["content_block"]["type"], "tool_use");
    assert_eq!(start["content_block"]["id"], "call_1");

    let delta = events
        .iter()
        .find(|e| e.event == "message_delta")
        .unwrap();
    let delta: Value = serde_json::from_str(&delta.data).unwrap();
    assert_eq!(delta["delta"]["stop_reason"], "tool_use");
    assert_eq!(events.last().map(|e| e.event.as_str()), Some("message_stop"));
}

#[tokio::test]
async fn test_provider_error_is_translated() {
    let (base_url, _captured) = start_provider().await;
    let mut config = config(&base_url, WireApi::Chat, true);
    config
        .models
        .insert("claude-opus".to_string(), "rate-limited".to_string());
    let shim = start_shim(config).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{shim}/v1/messages"))
        .json(&json!({
            "model": "claude-opus",
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 429);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"]["type"], "rate_limit_error");
    assert_eq!(err["error"]["message"], "slow down");
}

// ────────────────────────────────────────────────────────────────
// Server surface
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_body_and_auxiliary_routes() {
    let shim = start_shim(config("http://127.0.0.1:9/v1", WireApi::Chat, true)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{shim}/v1/messages"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["type"], "invalid_request_error");

    let health: Value = client
        .get(format!("http://{shim}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["api"], "chat");
    assert_eq!(health["interceptors"], json!(["preflight"]));

    let models: Value = client
        .get(format!("http://{shim}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["data"][0]["id"], "claude-sonnet-4-20250514");

    let logs: Value = client
        .get(format!("http://{shim}/logs?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = logs["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["component"], "server");
}

// ────────────────────────────────────────────────────────────────
// Live provider tests (need OPENAI_API_KEY)
// ────────────────────────────────────────────────────────────────

fn openai_config(api: WireApi) -> ShimConfig {
    let mut models = HashMap::new();
    models.insert("claude-sonnet-4-20250514".to_string(), "gpt-4o-mini".to_string());
    ShimConfig {
        port: 0,
        provider: ProviderConfig {
            name: "openai".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api: Some(api),
        },
        models,
        intercept: InterceptConfig::default(),
        log: LogConfig::default(),
    }
}

fn live_request(stream: bool) -> MessagesRequest {
    serde_json::from_value(json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 50,
        "stream": stream,
        "system": "You are a helpful assistant. Respond very briefly.",
        "messages": [{"role": "user", "content": "Say 'hello' and nothing else."}]
    }))
    .unwrap()
}

#[tokio::test]
#[ignore = "requires OPENAI_API_KEY"]
async fn test_live_chat_non_streaming() {
    let result = proxy::proxy_non_streaming(
        &live_request(false),
        &openai_config(WireApi::Chat),
        &reqwest::Client::new(),
        &SharedLogger::in_memory(10),
    )
    .await;

    match result {
        Ok(proxy::ProxyResult::Success(resp)) => {
            assert_eq!(resp.response_type, "message");
            assert!(!resp.content.is_empty());
        }
        Ok(proxy::ProxyResult::Error(err, status)) => panic!("Provider error ({status}): {err:?}"),
        Err(e) => panic!("Proxy error: {e}"),
    }
}

#[tokio::test]
#[ignore = "requires OPENAI_API_KEY"]
async fn test_live_responses_streaming() {
    let stream = proxy::proxy_streaming(
        &live_request(true),
        &openai_config(WireApi::Responses),
        &reqwest::Client::new(),
        &SharedLogger::in_memory(10),
    )
    .await
    .unwrap();

    let names: Vec<String> = stream
        .filter_map(|e| async move { e.ok().map(|e| e.event) })
        .collect()
        .await;
    assert!(names.contains(&"message_start".to_string()));
    assert!(names.contains(&"content_block_delta".to_string()));
    assert_eq!(names.last().map(String::as_str), Some("message_stop"));
}
