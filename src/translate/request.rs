//! Translate Anthropic Messages API requests into `OpenAI` Chat Completions or
//! Responses requests.
//!
//! A single Anthropic message can expand into several outbound entries (a user
//! message with `tool_result` blocks becomes separate `tool` messages or
//! `function_call_output` items). Conversion never fails: anything without a
//! mapping is dropped.

use std::collections::HashMap;
use std::hash::BuildHasher;

use super::anthropic_types::{
    ContentBlock, Message, MessagesRequest, Role, ThinkingConfig, Tool, ToolChoice,
};
use super::blocks;
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatMessage, ChatTool, ChatToolCall,
    ChatToolChoice, ChatToolChoiceFunction, ChatToolChoiceSpecific, ContentPart, StreamOptions,
};
use super::responses_types::{
    InputContent, InputItem, Reasoning, ResponsesRequest, ResponsesTool, ResponsesToolChoice,
};

/// An outbound request plus the facts callers route on.
#[derive(Debug, Clone)]
pub struct Converted<T> {
    pub request: T,
    pub has_images: bool,
    pub has_tools: bool,
}

/// Translate an Anthropic Messages API request into an `OpenAI` Chat Completions request.
pub fn anthropic_to_openai<S: BuildHasher>(
    req: &MessagesRequest,
    model_map: &HashMap<String, String, S>,
) -> Converted<ChatCompletionRequest> {
    let mut messages = Vec::new();

    if let Some(ref system) = req.system {
        messages.push(ChatMessage::text("system", system.as_text()));
    }

    for msg in &req.messages {
        let mut translated = translate_message(msg);
        messages.append(&mut translated);
    }

    let has_images = messages.iter().any(|m| match &m.content {
        Some(ChatContent::Parts(parts)) => parts
            .iter()
            .any(|p| matches!(p, ContentPart::ImageUrl { .. })),
        _ => false,
    });

    let tools = active_tools(req).map(|tools| {
        tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: tool_parameters(t),
                },
            })
            .collect::<Vec<_>>()
    });
    let has_tools = tools.is_some();

    let tool_choice = if has_tools {
        req.tool_choice.as_ref().map(chat_tool_choice)
    } else {
        None
    };

    let stream_options = req.stream.filter(|s| *s).map(|_| StreamOptions {
        include_usage: true,
    });

    let request = ChatCompletionRequest {
        model: target_model(req, model_map),
        messages,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options,
        tools,
        tool_choice,
        reasoning_effort: req.thinking.as_ref().and_then(reasoning_effort).map(String::from),
        stop: req.stop_sequences.clone(),
        user: req.metadata.as_ref().and_then(|m| m.user_id.clone()),
    };

    Converted {
        request,
        has_images,
        has_tools,
    }
}

/// Translate an Anthropic Messages API request into an `OpenAI` Responses request.
pub fn anthropic_to_responses<S: BuildHasher>(
    req: &MessagesRequest,
    model_map: &HashMap<String, String, S>,
) -> Converted<ResponsesRequest> {
    let mut input = Vec::new();

    if let Some(ref system) = req.system {
        input.push(InputItem::Message {
            role: "system".to_string(),
            content: vec![InputContent::InputText {
                text: system.as_text(),
            }],
        });
    }

    for msg in &req.messages {
        translate_input_items(msg, &mut input);
    }

    let has_images = input.iter().any(|item| match item {
        InputItem::Message { content, .. } => content
            .iter()
            .any(|c| matches!(c, InputContent::InputImage { .. })),
        _ => false,
    });

    let tools = active_tools(req).map(|tools| {
        tools
            .iter()
            .map(|t| ResponsesTool {
                tool_type: "function".to_string(),
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: tool_parameters(t),
            })
            .collect::<Vec<_>>()
    });
    let has_tools = tools.is_some();

    let tool_choice = if has_tools {
        req.tool_choice.as_ref().map(responses_tool_choice)
    } else {
        None
    };

    let reasoning = req
        .thinking
        .as_ref()
        .and_then(reasoning_effort)
        .map(|effort| Reasoning {
            effort: Some(effort.to_string()),
            summary: Some("auto".to_string()),
        });

    let request = ResponsesRequest {
        model: target_model(req, model_map),
        input,
        tools,
        tool_choice,
        reasoning,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
    };

    Converted {
        request,
        has_images,
        has_tools,
    }
}

fn target_model<S: BuildHasher>(req: &MessagesRequest, model_map: &HashMap<String, String, S>) -> String {
    model_map
        .get(&req.model)
        .cloned()
        .unwrap_or_else(|| req.model.clone())
}

/// Empty tool arrays are treated as absent; some backends reject them.
fn active_tools(req: &MessagesRequest) -> Option<&[Tool]> {
    req.tools.as_deref().filter(|t| !t.is_empty())
}

fn tool_parameters(tool: &Tool) -> serde_json::Value {
    if tool.input_schema.is_null() {
        serde_json::json!({ "type": "object", "properties": {} })
    } else {
        tool.input_schema.clone()
    }
}

/// Map a thinking budget onto the coarse effort scale `OpenAI` models accept.
fn reasoning_effort(thinking: &ThinkingConfig) -> Option<&'static str> {
    if thinking.kind != "enabled" {
        return None;
    }
    let effort = match thinking.budget_tokens {
        Some(budget) if budget < 4096 => "low",
        Some(budget) if budget < 16384 => "medium",
        Some(_) => "high",
        None => "medium",
    };
    Some(effort)
}

// ---------------------------------------------------------------------------
// Chat Completions
// ---------------------------------------------------------------------------

/// A single Anthropic message can expand to multiple `OpenAI` messages
/// (e.g. a user message with `tool_results` becomes separate tool-role messages).
fn translate_message(msg: &Message) -> Vec<ChatMessage> {
    let msg_blocks = msg.content.blocks();

    match msg.role {
        Role::User => translate_user_message(&msg_blocks),
        Role::Assistant => translate_assistant_message(&msg_blocks),
        Role::System => vec![ChatMessage::text("system", msg.content.text())],
    }
}

fn translate_user_message(msg_blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut content_parts: Vec<ContentPart> = Vec::new();

    for block in msg_blocks {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } = block
        {
            // Flush any accumulated content parts as a user message first
            if !content_parts.is_empty() {
                messages.push(user_message(&content_parts));
                content_parts.clear();
            }

            messages.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(ChatContent::Text(blocks::tool_result_output(
                    content.as_ref(),
                ))),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            });
        } else if let Some(part) = blocks::to_chat_part(block) {
            content_parts.push(part);
        }
    }

    if !content_parts.is_empty() {
        messages.push(user_message(&content_parts));
    }

    // If nothing was produced (empty message), emit an empty user message
    if messages.is_empty() {
        messages.push(ChatMessage::text("user", String::new()));
    }

    messages
}

fn translate_assistant_message(msg_blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in msg_blocks {
        if let Some(call) = blocks::to_chat_tool_call(block) {
            tool_calls.push(call);
        } else if let Some(ContentPart::Text { text }) = blocks::to_chat_part(block) {
            text_parts.push(text);
        }
    }

    let content = if text_parts.is_empty() {
        None
    } else {
        Some(ChatContent::Text(text_parts.join("")))
    };

    let tool_calls_opt = if tool_calls.is_empty() {
        None
    } else {
        Some(tool_calls)
    };

    vec![ChatMessage {
        role: "assistant".to_string(),
        content,
        tool_calls: tool_calls_opt,
        tool_call_id: None,
    }]
}

fn user_message(parts: &[ContentPart]) -> ChatMessage {
    ChatMessage {
        role: "user".to_string(),
        content: Some(collapse_content_parts(parts)),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn collapse_content_parts(parts: &[ContentPart]) -> ChatContent {
    if let [ContentPart::Text { text }] = parts {
        return ChatContent::Text(text.clone());
    }
    ChatContent::Parts(parts.to_vec())
}

fn chat_tool_choice(tc: &ToolChoice) -> ChatToolChoice {
    match tc {
        ToolChoice::Auto => ChatToolChoice::String("auto".to_string()),
        ToolChoice::Any => ChatToolChoice::String("required".to_string()),
        ToolChoice::None => ChatToolChoice::String("none".to_string()),
        ToolChoice::Tool { name } => ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn translate_input_items(msg: &Message, items: &mut Vec<InputItem>) {
    let role = msg.role;
    let mut parts: Vec<InputContent> = Vec::new();

    for block in msg.content.blocks() {
        if let Some(item) = blocks::to_responses_item(&block) {
            flush_input_message(role, &mut parts, items);
            items.push(item);
        } else if let Some(part) = blocks::to_responses_part(&block, role) {
            parts.push(part);
        }
    }

    flush_input_message(role, &mut parts, items);
}

fn flush_input_message(role: Role, parts: &mut Vec<InputContent>, items: &mut Vec<InputItem>) {
    if parts.is_empty() {
        return;
    }
    items.push(InputItem::Message {
        role: role.as_str().to_string(),
        content: std::mem::take(parts),
    });
}

fn responses_tool_choice(tc: &ToolChoice) -> ResponsesToolChoice {
    match tc {
        ToolChoice::Auto => ResponsesToolChoice::Mode("auto".to_string()),
        ToolChoice::Any => ResponsesToolChoice::Mode("required".to_string()),
        ToolChoice::None => ResponsesToolChoice::Mode("none".to_string()),
        ToolChoice::Tool { name } => ResponsesToolChoice::Function {
            choice_type: "function".to_string(),
            name: name.clone(),
        },
    }
}
