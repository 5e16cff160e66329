//! Short-circuits the agent runtime's preflight analysis calls.
//!
//! These calls carry no tools and a fixed system prompt; their answers are
//! not used when the runtime is pointed at this shim, so a canned reply
//! replaces a round trip to the provider.

use async_trait::async_trait;
use bytes::Bytes;

use super::fingerprints::{self, Fingerprint, FINGERPRINTS};
use super::mock_stream::{emit_mock_stream, mock_message};
use super::{InterceptContext, InterceptOutcome, Interceptor, ShortCircuit};
use crate::error::Result;
use crate::translate::anthropic_types::{MessagesRequest, Role};

pub struct PreflightInterceptor {
    registry: &'static [Fingerprint],
}

impl PreflightInterceptor {
    pub fn new() -> Self {
        Self::with_registry(FINGERPRINTS)
    }

    pub fn with_registry(registry: &'static [Fingerprint]) -> Self {
        Self { registry }
    }

    /// The fingerprint this request carries, if any.
    pub fn detect(&self, request: &MessagesRequest) -> Option<&'static Fingerprint> {
        // The main loop always sends tools; this rejects it without touching text.
        if request.tool_count() > 0 {
            return None;
        }
        let system = system_text(request)?;
        fingerprints::find(self.registry, &system)
    }
}

impl Default for PreflightInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level system prompt followed by every system-role message.
fn system_text(request: &MessagesRequest) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(ref system) = request.system {
        parts.push(system.as_text());
    }
    parts.extend(
        request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.text()),
    );

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[async_trait]
impl Interceptor for PreflightInterceptor {
    fn name(&self) -> &'static str {
        "preflight"
    }

    fn should_intercept(&self, ctx: &InterceptContext<'_>) -> bool {
        self.detect(ctx.request).is_some()
    }

    async fn intercept(&self, ctx: &InterceptContext<'_>) -> Result<InterceptOutcome> {
        let Some(fingerprint) = self.detect(ctx.request) else {
            return Ok(InterceptOutcome::NotHandled);
        };

        tracing::info!(
            fingerprint = fingerprint.name,
            model = %ctx.request.model,
            streaming = ctx.request.is_streaming(),
            "Answering preflight call locally"
        );

        let response = if ctx.request.is_streaming() {
            let mut body = Vec::new();
            emit_mock_stream(&mut body, &ctx.request.model, fingerprint.reply).await?;
            ShortCircuit::EventStream(Bytes::from(body))
        } else {
            ShortCircuit::Message(mock_message(&ctx.request.model, fingerprint.reply))
        };

        Ok(InterceptOutcome::Responded(response))
    }
}
