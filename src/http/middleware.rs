// Composable wrapper pipeline around the router. A middleware receives the
// request, the scope context and a continuation; it decides whether and how
// to invoke the rest of the chain. The chain is a list folded around a
// terminal dispatcher: the first middleware in the list is outermost.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::http::{Request, Response};
use crate::scope::Context;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: &Request,
        ctx: Context,
        next: Next<'_>,
    ) -> Result<Response, ApiError>;
}

/// Terminal of the chain; the router implements this.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &Request, ctx: Context) -> Result<Response, ApiError>;
}

/// Continuation for the remainder of the chain.
pub struct Next<'a> {
    links: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Dispatcher,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: &Request, ctx: Context) -> Result<Response, ApiError> {
        match self.links.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    links: rest,
                    terminal: self.terminal,
                };
                middleware.handle(request, ctx, next).await
            }
            None => self.terminal.dispatch(request, ctx).await,
        }
    }
}

pub struct MiddlewareChain {
    links: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Dispatcher>,
}

impl MiddlewareChain {
    pub fn wrap(links: Vec<Arc<dyn Middleware>>, terminal: Arc<dyn Dispatcher>) -> Self {
        Self { links, terminal }
    }

    /// Run one request through the whole chain. An `ApiError` escaping the
    /// outermost link is still rendered, so a chain without
    /// `ErrorMiddleware` stays well-formed.
    pub async fn handle(&self, request: &Request) -> Response {
        let next = Next {
            links: &self.links,
            terminal: self.terminal.as_ref(),
        };
        match next.run(request, Context::detached()).await {
            Ok(response) => response,
            Err(error) => error.into_response(),
        }
    }
}

/// Translates `ApiError`s escaping the inner chain into JSON error
/// responses. Internal faults are logged here and surface as a bare 500;
/// everything else maps to its own status/description pair.
pub struct ErrorMiddleware;

#[async_trait]
impl Middleware for ErrorMiddleware {
    async fn handle(
        &self,
        request: &Request,
        ctx: Context,
        next: Next<'_>,
    ) -> Result<Response, ApiError> {
        match next.run(request, ctx).await {
            Ok(response) => Ok(response),
            Err(error) => {
                match &error {
                    ApiError::Internal(fault) => {
                        tracing::error!(method = %request.method(), path = %request.path(), %fault, "request failed");
                    }
                    _ => {
                        tracing::debug!(method = %request.method(), path = %request.path(), status = error.status_code(), "request rejected");
                    }
                }
                Ok(error.into_response())
            }
        }
    }
}
