//! Request interception ahead of translation.
//!
//! An [`InterceptorChain`] runs its interceptors in a fixed order against every
//! inbound request. The first interceptor that acts ends the chain: it either
//! rewrites the request (which then proceeds to translation) or answers it
//! directly, in which case the upstream provider is never contacted.

pub mod fingerprints;
pub mod mock_stream;
pub mod preflight;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::InterceptConfig;
use crate::error::Result;
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse};

pub use preflight::PreflightInterceptor;

/// A terminal answer produced without calling the provider.
#[derive(Debug, Clone)]
pub enum ShortCircuit {
    /// A complete `text/event-stream` body.
    EventStream(Bytes),
    /// A non-streaming Messages API body.
    Message(MessagesResponse),
}

#[derive(Debug, Clone)]
pub enum InterceptOutcome {
    NotHandled,
    Rewritten(MessagesRequest),
    Responded(ShortCircuit),
}

/// Per-request view handed to interceptors.
#[derive(Debug, Clone, Copy)]
pub struct InterceptContext<'a> {
    pub request: &'a MessagesRequest,
}

impl<'a> InterceptContext<'a> {
    pub fn new(request: &'a MessagesRequest) -> Self {
        Self { request }
    }
}

/// Interceptors are constructed once and shared across requests; they must not
/// keep per-request state.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap synchronous check. Runs for every request.
    fn should_intercept(&self, ctx: &InterceptContext<'_>) -> bool;

    /// Only called after `should_intercept` returned true. Implementations
    /// re-check their predicate and answer `NotHandled` if it no longer holds.
    async fn intercept(&self, ctx: &InterceptContext<'_>) -> Result<InterceptOutcome>;
}

#[derive(Debug)]
pub enum ChainOutcome {
    Unhandled,
    Rewritten {
        interceptor: &'static str,
        request: MessagesRequest,
    },
    Responded {
        interceptor: &'static str,
        response: ShortCircuit,
    },
}

#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &InterceptConfig) -> Self {
        let mut chain = Self::new();
        if config.preflight {
            chain = chain.with(PreflightInterceptor::new());
        }
        chain
    }

    /// Append an interceptor. Order of calls is evaluation order.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Evaluate interceptors in order; the first that rewrites or responds wins.
    pub async fn run(&self, request: &MessagesRequest) -> ChainOutcome {
        let ctx = InterceptContext::new(request);

        for interceptor in &self.interceptors {
            if !interceptor.should_intercept(&ctx) {
                continue;
            }

            match interceptor.intercept(&ctx).await {
                Ok(InterceptOutcome::NotHandled) => {
                    tracing::debug!(interceptor = interceptor.name(), "predicate matched but not handled");
                }
                Ok(InterceptOutcome::Rewritten(request)) => {
                    return ChainOutcome::Rewritten {
                        interceptor: interceptor.name(),
                        request,
                    };
                }
                Ok(InterceptOutcome::Responded(response)) => {
                    return ChainOutcome::Responded {
                        interceptor: interceptor.name(),
                        response,
                    };
                }
                Err(e) => {
                    tracing::warn!(interceptor = interceptor.name(), error = %e, "interceptor failed, skipping");
                }
            }
        }

        ChainOutcome::Unhandled
    }
}
