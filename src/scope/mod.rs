// Per-request dependency resolution. A fresh `ScopeStore` is created by
// `ScopeMiddleware` for every request and dropped when the request ends;
// everything resolved through it (the database session, the current user)
// behaves like a request-local singleton without any global state.
//
// The store travels down the call chain inside an explicit `Context`
// handle rather than a thread-local, so a resolution site always says
// where its scope came from.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::http::middleware::{Middleware, Next};
use crate::http::{Request, Response};

/// Identity of a requestable dependency, e.g. `session::SESSION_KEY`.
pub type ScopeKey = &'static str;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("no active request scope")]
    NoActiveScope,

    #[error("scope entry {0:?} was resolved with a different type")]
    WrongType(ScopeKey),
}

impl From<ScopeError> for ApiError {
    fn from(error: ScopeError) -> Self {
        ApiError::Internal(error.into())
    }
}

/// Request-local instance store. At most one value per key; the factory
/// for a key runs at most once per request.
#[derive(Default)]
pub struct ScopeStore {
    values: Mutex<HashMap<ScopeKey, Arc<dyn Any + Send + Sync>>>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-request resolution handle, passed explicitly through the middleware
/// chain to handlers. Outside an active request scope (before
/// `ScopeMiddleware` has run) every resolution fails with `NoActiveScope`.
#[derive(Clone, Default)]
pub struct Context {
    store: Option<Arc<ScopeStore>>,
}

impl Context {
    /// A context with no scope attached; what the chain starts with.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_scope(store: Arc<ScopeStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Resolve `key` within the active request scope. The first call runs
    /// `factory` and memoizes the result; later calls return the same
    /// `Arc` without re-running it. A failed factory leaves nothing
    /// memoized.
    pub async fn resolve<T, E, F, Fut>(&self, key: ScopeKey, factory: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: From<ScopeError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| E::from(ScopeError::NoActiveScope))?;

        // The lock is held across the factory await so a key can never be
        // resolved twice within one request.
        let mut values = store.values.lock().await;
        if let Some(existing) = values.get(key) {
            return Arc::clone(existing)
                .downcast::<T>()
                .map_err(|_| E::from(ScopeError::WrongType(key)));
        }

        let value = Arc::new(factory().await?);
        values.insert(key, value.clone() as Arc<dyn Any + Send + Sync>);
        Ok(value)
    }
}

/// Creates the request scope around the rest of the chain. This is the
/// only place a `ScopeStore` is created or destroyed: the store and
/// everything memoized in it are dropped when `next` returns, on the
/// error path included.
pub struct ScopeMiddleware;

#[async_trait]
impl Middleware for ScopeMiddleware {
    async fn handle(
        &self,
        request: &Request,
        _ctx: Context,
        next: Next<'_>,
    ) -> Result<Response, ApiError> {
        let store = Arc::new(ScopeStore::new());
        let result = next.run(request, Context::with_scope(Arc::clone(&store))).await;
        drop(store);
        result
    }
}
