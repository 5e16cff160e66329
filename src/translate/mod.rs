//! API translation between Anthropic and `OpenAI` formats.
//!
//! Converts requests, responses, and streaming events between the Anthropic
//! Messages API and the two `OpenAI` protocols (Chat Completions, Responses).
//! All translation functions are pure (no I/O) and total.

pub mod anthropic_types;
pub mod blocks;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod responses_types;
pub mod streaming;
