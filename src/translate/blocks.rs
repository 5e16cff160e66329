//! Per-block conversions between the Anthropic content model and the two
//! `OpenAI` content models.
//!
//! Every converter maps exactly one block and returns `None` when the
//! (variant, target, role) combination has no single-part equivalent. Tool
//! invocations and tool results are not content parts in either `OpenAI`
//! protocol; they go through the dedicated tool-call helpers below.

use serde_json::Value;

use super::anthropic_types::{ContentBlock, ImageSource, ResponseContentBlock, Role, ToolResultContent};
use super::openai_types::{ChatToolCall, ChatToolCallFunction, ContentPart, ImageUrlDetail};
use super::responses_types::{InputContent, InputItem, OutputContent};

const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// The single URL form used for images across all three protocols.
pub fn image_url(source: &ImageSource) -> String {
    match source {
        ImageSource::Base64 { media_type, data } => {
            let media_type = media_type
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE);
            format!("data:{media_type};base64,{data}")
        }
        ImageSource::Url { url } => url.clone(),
    }
}

/// Structured tool input as an `OpenAI` function-call argument string.
pub fn tool_arguments(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_string(),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
    }
}

/// Inverse of [`tool_arguments`]. Unparseable arguments are kept verbatim
/// under a `text` key.
pub fn parse_tool_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({ "text": arguments }))
}

/// Tool result content flattened to the string both `OpenAI` protocols expect.
pub fn tool_result_output(content: Option<&ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Structured(value)) => {
            serde_json::to_string(value).unwrap_or_default()
        }
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Anthropic -> Chat Completions
// ---------------------------------------------------------------------------

pub fn to_chat_part(block: &ContentBlock) -> Option<ContentPart> {
    match block {
        ContentBlock::Text { text } => Some(ContentPart::Text { text: text.clone() }),
        ContentBlock::Image { source } => Some(ContentPart::ImageUrl {
            image_url: ImageUrlDetail {
                url: image_url(source),
                detail: None,
            },
        }),
        ContentBlock::ToolUse { .. }
        | ContentBlock::ToolResult { .. }
        | ContentBlock::Thinking { .. }
        | ContentBlock::Unknown => None,
    }
}

pub fn to_chat_tool_call(block: &ContentBlock) -> Option<ChatToolCall> {
    match block {
        ContentBlock::ToolUse { id, name, input } => Some(ChatToolCall {
            id: id.clone(),
            call_type: "function".to_string(),
            function: ChatToolCallFunction {
                name: name.clone(),
                arguments: tool_arguments(input),
            },
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Anthropic -> Responses
// ---------------------------------------------------------------------------

/// The Responses protocol tags identical text differently by direction:
/// what the user said is `input_text`, what the model said is `output_text`.
pub fn to_responses_part(block: &ContentBlock, role: Role) -> Option<InputContent> {
    match (block, role) {
        (ContentBlock::Text { text }, Role::Assistant) => {
            Some(InputContent::OutputText { text: text.clone() })
        }
        (ContentBlock::Text { text }, _) => Some(InputContent::InputText { text: text.clone() }),
        (ContentBlock::Image { .. }, Role::Assistant) => None,
        (ContentBlock::Image { source }, _) => Some(InputContent::InputImage {
            image_url: image_url(source),
            detail: None,
        }),
        (ContentBlock::Thinking { thinking, .. }, Role::Assistant) if !thinking.is_empty() => {
            Some(InputContent::OutputText {
                text: thinking.clone(),
            })
        }
        (ContentBlock::Thinking { .. }, _)
        | (ContentBlock::ToolUse { .. }, _)
        | (ContentBlock::ToolResult { .. }, _)
        | (ContentBlock::Unknown, _) => None,
    }
}

/// Tool invocations and results become standalone input items.
pub fn to_responses_item(block: &ContentBlock) -> Option<InputItem> {
    match block {
        ContentBlock::ToolUse { id, name, input } => Some(InputItem::FunctionCall {
            call_id: id.clone(),
            name: name.clone(),
            arguments: tool_arguments(input),
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => Some(InputItem::FunctionCallOutput {
            call_id: tool_use_id.clone(),
            output: tool_result_output(content.as_ref()),
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// OpenAI -> Anthropic
// ---------------------------------------------------------------------------

pub fn from_chat_tool_call(call: &ChatToolCall) -> ResponseContentBlock {
    ResponseContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input: parse_tool_arguments(&call.function.arguments),
    }
}

pub fn from_function_call(call_id: &str, name: &str, arguments: &str) -> ResponseContentBlock {
    ResponseContentBlock::ToolUse {
        id: call_id.to_string(),
        name: name.to_string(),
        input: parse_tool_arguments(arguments),
    }
}

pub fn from_output_content(part: &OutputContent) -> Option<ResponseContentBlock> {
    match part {
        OutputContent::OutputText { text } if !text.is_empty() => {
            Some(ResponseContentBlock::Text { text: text.clone() })
        }
        OutputContent::Refusal { refusal } if !refusal.is_empty() => {
            Some(ResponseContentBlock::Text {
                text: refusal.clone(),
            })
        }
        _ => None,
    }
}

pub fn from_reasoning_text(text: &str) -> Option<ResponseContentBlock> {
    if text.is_empty() {
        return None;
    }
    Some(ResponseContentBlock::Thinking {
        thinking: text.to_string(),
        signature: None,
    })
}
