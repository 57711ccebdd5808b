//! Handler port
//!
//! A handler is the pipeline stage's own recovery logic ("return a cached
//! completion", "call the secondary provider"). The router selects one, the
//! executor invokes it, and whatever it returns is the base response the
//! policy engine decorates.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use faultline_domain::constants::CODE_DEFAULT_HANDLED;
use faultline_domain::{ErrorContext, ErrorResponse};

/// Shared, type-erased handler
pub type SharedHandler = Arc<dyn ResponseHandler>;

/// Trait for the caller-supplied recovery logic of one module
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Produce the base response for `ctx`
    ///
    /// An `Err` (or a panic) is converted into a `HANDLER_FAILURE` response
    /// by the executor.
    async fn execute(&self, ctx: &ErrorContext) -> anyhow::Result<ErrorResponse>;

    /// Name used in logs
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> ResponseHandler for FnHandler<F>
where
    F: Fn(ErrorContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ErrorResponse>> + Send,
{
    async fn execute(&self, ctx: &ErrorContext) -> anyhow::Result<ErrorResponse> {
        (self.f)(ctx.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure into a [`SharedHandler`]
///
/// ```rust
/// use faultline_core::handler_fn;
/// use faultline_domain::ErrorResponse;
///
/// let handler = handler_fn("cached-completion", |ctx| async move {
///     Ok(ErrorResponse::success(&ctx.error_id, "served from cache"))
/// });
/// assert_eq!(handler.name(), "cached-completion");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> SharedHandler
where
    F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ErrorResponse>> + Send + 'static,
{
    Arc::new(FnHandler::new(name, f))
}

/// Handler used when no rule or module handler applies
///
/// Reports the failure as unhandled. The response code is taken from
/// `ctx.data.code` when the caller put a string there (so policies keyed on
/// codes such as `TIMEOUT` still see it) and is `DEFAULT_HANDLED` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

#[async_trait]
impl ResponseHandler for DefaultHandler {
    async fn execute(&self, ctx: &ErrorContext) -> anyhow::Result<ErrorResponse> {
        let code = ctx
            .data
            .get("code")
            .and_then(|code| code.as_str())
            .unwrap_or(CODE_DEFAULT_HANDLED);
        Ok(ErrorResponse::failure(&ctx.error_id, code, ctx.message.clone()))
    }

    fn name(&self) -> &str {
        "default"
    }
}
