//! Synthetic Messages API replies for short-circuited requests.
//!
//! The consumer is a strict SDK parser, so the stream is the exact six-event
//! sequence a real single-text-block reply produces.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::translate::anthropic_types::{
    Delta, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};
use crate::translate::streaming::{message_end, message_start, new_message_id, sse_frame};

/// The events written by [`emit_mock_stream`], in order.
pub fn mock_events(model: &str, text: &str) -> Vec<StreamEvent> {
    let mut events = vec![
        message_start(&new_message_id(), model, 0),
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ResponseContentBlock::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: Delta::TextDelta {
                text: text.to_string(),
            },
        },
        StreamEvent::ContentBlockStop { index: 0 },
    ];
    events.extend(message_end("end_turn", 1));
    events
}

/// Write the full mock event stream to `out`, then shut it down.
pub async fn emit_mock_stream<W>(out: &mut W, model: &str, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    for event in mock_events(model, text) {
        let frame = sse_frame(&event)?;
        out.write_all(frame.as_bytes()).await?;
    }
    out.flush().await?;
    out.shutdown().await
}

/// Non-streaming counterpart of the mock stream.
pub fn mock_message(model: &str, text: &str) -> MessagesResponse {
    MessagesResponse {
        id: new_message_id(),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content: vec![ResponseContentBlock::Text {
            text: text.to_string(),
        }],
        model: model.to_string(),
        stop_reason: Some("end_turn".to_string()),
        stop_sequence: None,
        usage: Usage {
            input_tokens: 0,
            output_tokens: 1,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        },
    }
}
