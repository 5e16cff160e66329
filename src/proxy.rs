use crate::config::ShimConfig;
use crate::error::{Result, ShimError};
use crate::logging::SharedLogger;
use crate::providers::WireApi;
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::openai_types::{ChatCompletionChunk, ChatCompletionResponse, ChatErrorResponse};
use crate::translate::request::{anthropic_to_openai, anthropic_to_responses, Converted};
use crate::translate::response::{openai_error_to_anthropic, openai_to_anthropic, responses_to_anthropic};
use crate::translate::responses_types::{ResponsesResponse, ResponsesStreamEvent};
use crate::translate::streaming::{ResponsesStreamTranslator, StreamTranslator};

use eventsource_stream::Eventsource;
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;

/// Outcome of proxying a non-streaming request
pub enum ProxyResult {
    Success(MessagesResponse),
    Error(ErrorResponse, u16),
}

/// Outcome of proxying a streaming request: a stream of Anthropic SSE events
pub type SseStream = Pin<Box<dyn Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send>>;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    fn from_stream_event(event: &StreamEvent) -> Option<Self> {
        serde_json::to_string(event).ok().map(|data| Self {
            event: event.event_name().to_string(),
            data,
        })
    }
}

struct Endpoint {
    url: String,
    api_key: String,
}

fn endpoint(config: &ShimConfig, api: WireApi) -> Result<Endpoint> {
    let api_key = config.resolve_api_key()?;
    let base_url = config.effective_base_url()?;
    Ok(Endpoint {
        url: format!("{}/{}", base_url.trim_end_matches('/'), api.path()),
        api_key,
    })
}

async fn post<T: Serialize>(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    body: &T,
) -> Result<reqwest::Response> {
    client
        .post(&endpoint.url)
        .header("Authorization", format!("Bearer {}", endpoint.api_key))
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ShimError::provider(format!("Request failed: {}", e)))
}

fn log_outbound<T>(logger: &SharedLogger, url: &str, model: &str, converted: &Converted<T>, streaming: bool) {
    logger.info(
        "proxy",
        format!(
            "POST {} model={} images={} tools={}{}",
            url,
            model,
            converted.has_images,
            converted.has_tools,
            if streaming { " (streaming)" } else { "" }
        ),
    );
}

/// Forward a non-streaming Anthropic request through the configured provider.
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    config: &ShimConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ProxyResult> {
    let api = config.wire_api();
    let endpoint = endpoint(config, api)?;

    let response = match api {
        WireApi::Chat => {
            let converted = anthropic_to_openai(req, &config.models);
            log_outbound(logger, &endpoint.url, &converted.request.model, &converted, false);
            post(client, &endpoint, &converted.request).await?
        }
        WireApi::Responses => {
            let converted = anthropic_to_responses(req, &config.models);
            log_outbound(logger, &endpoint.url, &converted.request.model, &converted, false);
            post(client, &endpoint, &converted.request).await?
        }
    };

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| ShimError::provider(format!("Failed to read response body: {}", e)))?;

    logger.debug(
        "proxy",
        format!("Response status={} body_len={}", status, body.len()),
    );

    if status >= 400 {
        return Ok(ProxyResult::Error(provider_error(&body, status, logger), status));
    }

    let anthropic_resp = match api {
        WireApi::Chat => {
            let resp: ChatCompletionResponse = parse_body(&body)?;
            openai_to_anthropic(&resp, &req.model)
        }
        WireApi::Responses => {
            let resp: ResponsesResponse = parse_body(&body)?;
            responses_to_anthropic(&resp, &req.model)
        }
    };

    logger.info(
        "proxy",
        format!(
            "Completed: in={} out={} tokens stop={}",
            anthropic_resp.usage.input_tokens,
            anthropic_resp.usage.output_tokens,
            anthropic_resp.stop_reason.as_deref().unwrap_or("-")
        ),
    );

    Ok(ProxyResult::Success(anthropic_resp))
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        ShimError::provider(format!(
            "Failed to parse provider response: {}. Body: {}",
            e,
            truncate(body, 300)
        ))
    })
}

fn provider_error(body: &str, status: u16, logger: &SharedLogger) -> ErrorResponse {
    if let Ok(err) = serde_json::from_str::<ChatErrorResponse>(body) {
        logger.warn(
            "proxy",
            format!("Provider error status={}: {}", status, err.error.message),
        );
        return openai_error_to_anthropic(&err);
    }

    logger.warn(
        "proxy",
        format!("Provider error status={}: {}", status, truncate(body, 300)),
    );
    ErrorResponse::api_error(format!(
        "Provider returned status {}: {}",
        status,
        truncate(body, 500)
    ))
}

/// Forward a streaming Anthropic request, returning a stream of Anthropic SSE events.
pub async fn proxy_streaming(
    req: &MessagesRequest,
    config: &ShimConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<SseStream> {
    let api = config.wire_api();
    let endpoint = endpoint(config, api)?;

    let response = match api {
        WireApi::Chat => {
            let converted = anthropic_to_openai(req, &config.models);
            log_outbound(logger, &endpoint.url, &converted.request.model, &converted, true);
            post(client, &endpoint, &converted.request).await?
        }
        WireApi::Responses => {
            let converted = anthropic_to_responses(req, &config.models);
            log_outbound(logger, &endpoint.url, &converted.request.model, &converted, true);
            post(client, &endpoint, &converted.request).await?
        }
    };

    let status = response.status().as_u16();

    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let error = provider_error(&body, status, logger);
        let event = SseEvent {
            event: "error".to_string(),
            data: serde_json::to_string(&error)?,
        };
        return Ok(Box::pin(stream::once(async move { Ok(event) })));
    }

    let model = req.model.clone();
    let byte_stream = response.bytes_stream();

    let events: SseStream = match api {
        WireApi::Chat => Box::pin(chat_event_stream(byte_stream, model, logger.clone())),
        WireApi::Responses => Box::pin(responses_event_stream(byte_stream, model, logger.clone())),
    };
    Ok(events)
}

/// Parse a Chat Completions SSE byte stream into Anthropic SSE events.
fn chat_event_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<bytes::Bytes, E>> + Send + 'static,
    model: String,
    logger: SharedLogger,
) -> impl Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send + 'static
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let events = byte_stream.eventsource();
        tokio::pin!(events);

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    let message = format!("Upstream stream error: {}", e);
                    logger.error("stream", message.as_str());
                    for out in translator.fail(&message).iter().filter_map(SseEvent::from_stream_event) {
                        yield Ok(out);
                    }
                    break;
                }
            };

            if event.data.trim() == "[DONE]" {
                break;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                Ok(c) => c,
                Err(e) => {
                    logger.debug("stream", format!("Skipping unparseable chunk: {}", e));
                    continue;
                }
            };

            for out in translator.process_chunk(&chunk).iter().filter_map(SseEvent::from_stream_event) {
                yield Ok(out);
            }
        }

        // Close the message even if [DONE] never arrived; no-op after an error event
        for out in translator.finish().iter().filter_map(SseEvent::from_stream_event) {
            yield Ok(out);
        }

        logger.info("stream", "Stream completed");
    }
}

/// Parse a Responses API SSE byte stream into Anthropic SSE events.
fn responses_event_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<bytes::Bytes, E>> + Send + 'static,
    model: String,
    logger: SharedLogger,
) -> impl Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send + 'static
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut translator = ResponsesStreamTranslator::new(&model);
        let events = byte_stream.eventsource();
        tokio::pin!(events);

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    let message = format!("Upstream stream error: {}", e);
                    logger.error("stream", message.as_str());
                    for out in translator.fail(&message).iter().filter_map(SseEvent::from_stream_event) {
                        yield Ok(out);
                    }
                    break;
                }
            };

            let parsed: ResponsesStreamEvent = match serde_json::from_str(&event.data) {
                Ok(ev) => ev,
                Err(e) => {
                    logger.debug("stream", format!("Skipping unparseable event '{}': {}", event.event, e));
                    continue;
                }
            };

            for out in translator.process_event(&parsed).iter().filter_map(SseEvent::from_stream_event) {
                yield Ok(out);
            }
        }

        for out in translator.finish().iter().filter_map(SseEvent::from_stream_event) {
            yield Ok(out);
        }

        logger.info("stream", "Stream completed");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
