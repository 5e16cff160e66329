use super::anthropic_types::{ErrorResponse, MessagesResponse, ResponseContentBlock, Usage};
use super::blocks;
use super::openai_types::{ChatCompletionResponse, ChatErrorResponse};
use super::responses_types::{OutputItem, ResponsesResponse};

/// Translate an OpenAI Chat Completion response into an Anthropic Messages response.
/// Pure function: original_model is what the agent runtime originally requested.
pub fn openai_to_anthropic(resp: &ChatCompletionResponse, original_model: &str) -> MessagesResponse {
    let choice = resp.choices.first();

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(c) = choice {
        if let Some(block) = c
            .message
            .reasoning_content
            .as_deref()
            .and_then(blocks::from_reasoning_text)
        {
            content.push(block);
        }

        if let Some(ref text) = c.message.content {
            if !text.is_empty() {
                content.push(ResponseContentBlock::Text { text: text.clone() });
            }
        }

        if let Some(ref tool_calls) = c.message.tool_calls {
            content.extend(tool_calls.iter().map(blocks::from_chat_tool_call));
        }
    }

    let stop_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map(map_finish_reason)
        .unwrap_or_else(|| "end_turn".to_string());

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    });

    // Use the OpenAI response ID, prefixed to look like an Anthropic ID
    let id = format!("msg_{}", resp.id.trim_start_matches("chatcmpl-"));

    build_message(id, original_model, content, stop_reason, usage)
}

/// Translate an OpenAI Responses API response into an Anthropic Messages response.
pub fn responses_to_anthropic(resp: &ResponsesResponse, original_model: &str) -> MessagesResponse {
    let mut content: Vec<ResponseContentBlock> = Vec::new();
    let mut saw_function_call = false;

    for item in &resp.output {
        match item {
            OutputItem::Message { content: parts, .. } => {
                content.extend(parts.iter().filter_map(blocks::from_output_content));
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                saw_function_call = true;
                content.push(blocks::from_function_call(call_id, name, arguments));
            }
            OutputItem::Reasoning { summary, .. } => {
                let text = summary
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                content.extend(blocks::from_reasoning_text(&text));
            }
            OutputItem::Other => {}
        }
    }

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    });

    let id = format!("msg_{}", resp.id.trim_start_matches("resp_"));

    build_message(
        id,
        original_model,
        content,
        responses_stop_reason(resp, saw_function_call),
        usage,
    )
}

fn build_message(
    id: String,
    model: &str,
    mut content: Vec<ResponseContentBlock>,
    stop_reason: String,
    usage: Usage,
) -> MessagesResponse {
    // Ensure at least one content block (the SDK expects non-empty content)
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    MessagesResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: model.to_string(),
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    }
}

/// Map OpenAI finish_reason to Anthropic stop_reason
pub fn map_finish_reason(reason: &str) -> String {
    match reason {
        "stop" => "end_turn".to_string(),
        "length" => "max_tokens".to_string(),
        "tool_calls" | "function_call" => "tool_use".to_string(),
        "content_filter" => "end_turn".to_string(),
        other => other.to_string(),
    }
}

/// Responses has no finish reason; derive one from status and output.
pub fn responses_stop_reason(resp: &ResponsesResponse, saw_function_call: bool) -> String {
    if saw_function_call {
        return "tool_use".to_string();
    }
    let truncated = resp.status.as_deref() == Some("incomplete")
        && resp
            .incomplete_details
            .as_ref()
            .and_then(|d| d.reason.as_deref())
            == Some("max_output_tokens");
    if truncated {
        "max_tokens".to_string()
    } else {
        "end_turn".to_string()
    }
}

/// Translate an OpenAI error into an Anthropic error response
pub fn openai_error_to_anthropic(err: &ChatErrorResponse) -> ErrorResponse {
    let error_type = match err.error.error_type.as_str() {
        "invalid_request_error" => "invalid_request_error",
        "rate_limit_error" | "rate_limit_exceeded" | "tokens" => "rate_limit_error",
        "authentication_error" => "authentication_error",
        _ => "api_error",
    };

    ErrorResponse::new(error_type, &err.error.message)
}
