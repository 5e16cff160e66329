//! State machines for translating `OpenAI` streaming output into Anthropic SSE events.
//!
//! [`StreamTranslator`] consumes Chat Completions chunks, [`ResponsesStreamTranslator`]
//! consumes Responses API events. Both emit `message_start` and `ping` first, then
//! strictly sequential content blocks (at most one open at a time), then
//! `message_delta` and `message_stop`.

use std::collections::HashMap;

use super::anthropic_types::{
    Delta, DeltaUsage, ErrorResponse, MessageDeltaBody, MessagesResponse, ResponseContentBlock,
    StreamEvent, Usage,
};
use super::openai_types::ChatCompletionChunk;
use super::response::{map_finish_reason, responses_stop_reason};
use super::responses_types::{OutputItem, ResponsesResponse, ResponsesStreamEvent};

/// Render one event as a `text/event-stream` frame.
pub fn sse_frame(event: &StreamEvent) -> serde_json::Result<String> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {}\n\n", event.event_name(), data))
}

/// `message_start` with empty content and no stop reason yet.
pub fn message_start(id: &str, model: &str, input_tokens: u64) -> StreamEvent {
    StreamEvent::MessageStart {
        message: MessagesResponse {
            id: id.to_string(),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content: Vec::new(),
            model: model.to_string(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage {
                input_tokens,
                output_tokens: 0,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        },
    }
}

/// The closing `message_delta` + `message_stop` pair.
pub fn message_end(stop_reason: &str, output_tokens: u64) -> [StreamEvent; 2] {
    [
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage { output_tokens },
        },
        StreamEvent::MessageStop,
    ]
}

/// Anthropic `error` event carrying an `api_error`.
pub fn stream_error(message: &str) -> StreamEvent {
    StreamEvent::Error {
        error: ErrorResponse::api_error(message).error,
    }
}

pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Message-level state shared by both translators.
#[derive(Debug)]
struct Envelope {
    model: String,
    msg_id: String,
    started: bool,
    finished: bool,
    next_index: usize,
    open: Option<(BlockKind, usize)>,
    input_tokens: u64,
    output_tokens: u64,
}

impl Envelope {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: new_message_id(),
            started: false,
            finished: false,
            next_index: 0,
            open: None,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    fn start(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.started {
            events.push(message_start(&self.msg_id, &self.model, self.input_tokens));
            events.push(StreamEvent::Ping);
            self.started = true;
        }
    }

    fn close_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some((_, index)) = self.open.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
    }

    fn open_block(
        &mut self,
        kind: BlockKind,
        content_block: ResponseContentBlock,
        events: &mut Vec<StreamEvent>,
    ) -> usize {
        self.close_block(events);
        let index = self.next_index;
        self.next_index += 1;
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block,
        });
        self.open = Some((kind, index));
        index
    }

    /// Index of the open text or thinking block, opening one if needed.
    fn ensure_block(&mut self, kind: BlockKind, events: &mut Vec<StreamEvent>) -> usize {
        match self.open {
            Some((open_kind, index)) if open_kind == kind => index,
            _ => {
                let content_block = match kind {
                    BlockKind::Thinking => ResponseContentBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                    _ => ResponseContentBlock::Text {
                        text: String::new(),
                    },
                };
                self.open_block(kind, content_block, events)
            }
        }
    }

    fn open_index(&self) -> Option<usize> {
        self.open.map(|(_, index)| index)
    }

    fn finish(&mut self, stop_reason: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.start(&mut events);
        self.close_block(&mut events);
        events.extend(message_end(stop_reason, self.output_tokens));
        self.finished = true;
        events
    }

    /// Ends the stream with an `error` event instead of `message_delta`/`message_stop`.
    fn fail(&mut self, message: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.start(&mut events);
        self.open = None;
        events.push(stream_error(message));
        self.finished = true;
        events
    }
}

// ---------------------------------------------------------------------------
// Chat Completions
// ---------------------------------------------------------------------------

/// State machine that translates OpenAI streaming chunks into Anthropic SSE events.
///
/// Usage:
///   let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
///   for chunk in openai_chunks {
///       let events = translator.process_chunk(&chunk);
///       // send each event as SSE
///   }
///   let final_events = translator.finish();
#[derive(Debug)]
pub struct StreamTranslator {
    envelope: Envelope,
    // chunk tool-call index -> Anthropic block index
    tool_blocks: HashMap<u64, usize>,
    // Set by `finish_reason`; the closing events wait for a trailing usage chunk.
    stop_reason: Option<String>,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            envelope: Envelope::new(model),
            tool_blocks: HashMap::new(),
            stop_reason: None,
        }
    }

    /// Process a single OpenAI streaming chunk, returning zero or more Anthropic SSE events.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.envelope.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if let Some(ref usage) = chunk.usage {
            self.envelope.input_tokens = usage.prompt_tokens;
            self.envelope.output_tokens = usage.completion_tokens;
        }

        self.envelope.start(&mut events);

        if let Some(ref reason) = self.stop_reason {
            if chunk.usage.is_some() {
                events.extend(self.envelope.finish(reason));
            }
            return events;
        }

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        // Reasoning models (Kimi K2.5, DeepSeek R1) stream chain-of-thought in
        // `reasoning_content`; it becomes a thinking block ahead of the answer.
        if let Some(reasoning) = choice.delta.reasoning_content.as_deref().filter(|s| !s.is_empty()) {
            let index = self.envelope.ensure_block(BlockKind::Thinking, &mut events);
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::ThinkingDelta {
                    thinking: reasoning.to_string(),
                },
            });
        }

        if let Some(content) = choice.delta.content.as_deref().filter(|s| !s.is_empty()) {
            let index = self.envelope.ensure_block(BlockKind::Text, &mut events);
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta {
                    text: content.to_string(),
                },
            });
        }

        if let Some(ref tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                // The first chunk carrying an id for an unseen index starts a new tool call
                if let Some(id) = tc.id.as_ref().filter(|_| !self.tool_blocks.contains_key(&tc.index)) {
                    let name = tc
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default();
                    let index = self.envelope.open_block(
                        BlockKind::ToolUse,
                        ResponseContentBlock::ToolUse {
                            id: id.clone(),
                            name,
                            input: serde_json::Value::Object(serde_json::Map::new()),
                        },
                        &mut events,
                    );
                    self.tool_blocks.insert(tc.index, index);
                }

                let args = tc
                    .function
                    .as_ref()
                    .and_then(|f| f.arguments.as_deref())
                    .filter(|a| !a.is_empty());

                if let Some(args) = args {
                    let index = self
                        .tool_blocks
                        .get(&tc.index)
                        .copied()
                        .or_else(|| self.envelope.open_index());
                    if let Some(index) = index {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::InputJsonDelta {
                                partial_json: args.to_string(),
                            },
                        });
                    }
                }
            }
        }

        if let Some(ref reason) = choice.finish_reason {
            let reason = map_finish_reason(reason);
            self.envelope.close_block(&mut events);
            if chunk.usage.is_some() {
                events.extend(self.envelope.finish(&reason));
            }
            self.stop_reason = Some(reason);
        }

        events
    }

    /// Call when the stream ends (on `[DONE]`) to flush any remaining events.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let reason = self.stop_reason.as_deref().unwrap_or("end_turn");
        self.envelope.finish(reason)
    }

    /// Abort with an `error` event; later calls emit nothing.
    pub fn fail(&mut self, message: &str) -> Vec<StreamEvent> {
        self.envelope.fail(message)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Translates Responses API stream events into Anthropic SSE events.
#[derive(Debug)]
pub struct ResponsesStreamTranslator {
    envelope: Envelope,
    // output_index of a function_call item -> Anthropic block index
    call_blocks: HashMap<usize, usize>,
    // output_index the open block belongs to
    open_output: Option<usize>,
    saw_function_call: bool,
}

impl ResponsesStreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            envelope: Envelope::new(model),
            call_blocks: HashMap::new(),
            open_output: None,
            saw_function_call: false,
        }
    }

    pub fn process_event(&mut self, event: &ResponsesStreamEvent) -> Vec<StreamEvent> {
        if self.envelope.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.envelope.start(&mut events);

        match event {
            ResponsesStreamEvent::OutputItemAdded {
                output_index,
                item: OutputItem::FunctionCall { call_id, name, .. },
            } => {
                self.saw_function_call = true;
                let index = self.envelope.open_block(
                    BlockKind::ToolUse,
                    ResponseContentBlock::ToolUse {
                        id: call_id.clone(),
                        name: name.clone(),
                        input: serde_json::Value::Object(serde_json::Map::new()),
                    },
                    &mut events,
                );
                self.call_blocks.insert(*output_index, index);
                self.open_output = Some(*output_index);
            }
            ResponsesStreamEvent::OutputTextDelta {
                output_index,
                delta,
            }
            | ResponsesStreamEvent::RefusalDelta {
                output_index,
                delta,
            } => {
                if !delta.is_empty() {
                    let index = self.envelope.ensure_block(BlockKind::Text, &mut events);
                    self.open_output = Some(*output_index);
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::TextDelta {
                            text: delta.clone(),
                        },
                    });
                }
            }
            ResponsesStreamEvent::ReasoningSummaryDelta {
                output_index,
                delta,
            } => {
                if !delta.is_empty() {
                    let index = self.envelope.ensure_block(BlockKind::Thinking, &mut events);
                    self.open_output = Some(*output_index);
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::ThinkingDelta {
                            thinking: delta.clone(),
                        },
                    });
                }
            }
            ResponsesStreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
            } => {
                if let Some(&index) = self.call_blocks.get(output_index) {
                    if !delta.is_empty() {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::InputJsonDelta {
                                partial_json: delta.clone(),
                            },
                        });
                    }
                }
            }
            ResponsesStreamEvent::OutputItemDone { output_index } => {
                if self.open_output == Some(*output_index) {
                    self.envelope.close_block(&mut events);
                    self.open_output = None;
                }
            }
            ResponsesStreamEvent::Completed { response }
            | ResponsesStreamEvent::Incomplete { response } => {
                self.capture_usage(response);
                let stop_reason = responses_stop_reason(response, self.saw_function_call);
                events.extend(self.envelope.finish(&stop_reason));
            }
            ResponsesStreamEvent::Failed { response } => {
                let message = response
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .filter(|m| !m.is_empty())
                    .unwrap_or("upstream response failed");
                events.extend(self.envelope.fail(message));
            }
            ResponsesStreamEvent::Created { .. }
            | ResponsesStreamEvent::OutputItemAdded { .. }
            | ResponsesStreamEvent::Other => {}
        }

        events
    }

    /// Call when the upstream stream ends to flush any remaining events.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let stop_reason = if self.saw_function_call {
            "tool_use"
        } else {
            "end_turn"
        };
        self.envelope.finish(stop_reason)
    }

    /// Abort with an `error` event; later calls emit nothing.
    pub fn fail(&mut self, message: &str) -> Vec<StreamEvent> {
        self.envelope.fail(message)
    }

    fn capture_usage(&mut self, response: &ResponsesResponse) {
        if let Some(ref usage) = response.usage {
            self.envelope.input_tokens = usage.input_tokens;
            self.envelope.output_tokens = usage.output_tokens;
        }
    }
}
