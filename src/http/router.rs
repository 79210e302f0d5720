// Route table and dispatch. Routes are registered once at startup, either
// explicitly or through the conventional CRUD mapping, and the table is
// never mutated afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::ApiError;
use crate::http::middleware::Dispatcher;
use crate::http::{Method, Request, Response};
use crate::scope::Context;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("endpoint {0} already present")]
    DuplicateEndpoint(String),
}

/// The five conventional operations a resource may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudOp {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl CrudOp {
    pub const ALL: [CrudOp; 5] = [
        CrudOp::List,
        CrudOp::Get,
        CrudOp::Create,
        CrudOp::Update,
        CrudOp::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CrudOp::List => "list",
            CrudOp::Get => "get",
            CrudOp::Create => "create",
            CrudOp::Update => "update",
            CrudOp::Delete => "delete",
        }
    }

    fn method(&self) -> Method {
        match self {
            CrudOp::List | CrudOp::Get => Method::Get,
            CrudOp::Create => Method::Post,
            CrudOp::Update => Method::Put,
            CrudOp::Delete => Method::Delete,
        }
    }

    fn pattern(&self, path: &str) -> String {
        match self {
            CrudOp::List | CrudOp::Create => path.to_string(),
            CrudOp::Get | CrudOp::Update | CrudOp::Delete => format!("{path}/{{id}}"),
        }
    }
}

/// Integer arguments bound from `{name}` path placeholders.
#[derive(Debug, Clone, Default)]
pub struct RouteArgs {
    values: Vec<(String, i64)>,
}

impl RouteArgs {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub fn id(&self) -> Option<i64> {
        self.get("id")
    }
}

/// What a handler produces on success.
pub enum Reply {
    /// Passed through untouched.
    Raw(Response),
    /// Wrapped into a 200 JSON response.
    Json(Value),
    /// Bare 200 with empty body (delete / bare update acknowledgement).
    Empty,
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn call(
        &self,
        args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError>;
}

/// A resource exposes a subset of the conventional operations, declared
/// through `operations()`. Undeclared operations are never registered and
/// their default bodies are unreachable through the router.
#[async_trait]
pub trait ResourceService: Send + Sync {
    fn operations(&self) -> &'static [CrudOp];

    async fn list(&self, args: &RouteArgs, request: &Request, ctx: &Context) -> Result<Reply, ApiError> {
        let _ = (args, request, ctx);
        Err(ApiError::Internal(anyhow::anyhow!("list is not implemented")))
    }

    async fn get(&self, args: &RouteArgs, request: &Request, ctx: &Context) -> Result<Reply, ApiError> {
        let _ = (args, request, ctx);
        Err(ApiError::Internal(anyhow::anyhow!("get is not implemented")))
    }

    async fn create(&self, args: &RouteArgs, request: &Request, ctx: &Context) -> Result<Reply, ApiError> {
        let _ = (args, request, ctx);
        Err(ApiError::Internal(anyhow::anyhow!("create is not implemented")))
    }

    async fn update(&self, args: &RouteArgs, request: &Request, ctx: &Context) -> Result<Reply, ApiError> {
        let _ = (args, request, ctx);
        Err(ApiError::Internal(anyhow::anyhow!("update is not implemented")))
    }

    async fn delete(&self, args: &RouteArgs, request: &Request, ctx: &Context) -> Result<Reply, ApiError> {
        let _ = (args, request, ctx);
        Err(ApiError::Internal(anyhow::anyhow!("delete is not implemented")))
    }
}

/// Adapter registering one conventional operation of a resource as a route
/// handler.
struct ServiceOp {
    service: Arc<dyn ResourceService>,
    op: CrudOp,
}

#[async_trait]
impl RouteHandler for ServiceOp {
    async fn call(
        &self,
        args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        match self.op {
            CrudOp::List => self.service.list(args, request, ctx).await,
            CrudOp::Get => self.service.get(args, request, ctx).await,
            CrudOp::Create => self.service.create(args, request, ctx).await,
            CrudOp::Update => self.service.update(args, request, ctx).await,
            CrudOp::Delete => self.service.delete(args, request, ctx).await,
        }
    }
}

enum Segment {
    Literal(String),
    Int(String),
}

struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => Segment::Int(name.to_string()),
                    None => Segment::Literal(segment.to_string()),
                }
            })
            .collect();
        Self { segments }
    }

    /// Match a concrete path. An `{id}` placeholder only matches a segment
    /// that parses as an integer; anything else means "no such route", not
    /// a client error.
    fn matches(&self, path: &str) -> Option<RouteArgs> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut args = RouteArgs::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(expected) if expected == part => {}
                Segment::Literal(_) => return None,
                Segment::Int(name) => {
                    let value: i64 = part.parse().ok()?;
                    args.values.push((name.clone(), value));
                }
            }
        }
        Some(args)
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    endpoint: String,
    handler: Arc<dyn RouteHandler>,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    endpoints: HashSet<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit route. Endpoint names are unique across the
    /// table; a duplicate is a startup error.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        endpoint: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), RouterError> {
        if !self.endpoints.insert(endpoint.to_string()) {
            return Err(RouterError::DuplicateEndpoint(endpoint.to_string()));
        }
        tracing::debug!(%method, pattern, endpoint, "route registered");
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(pattern),
            endpoint: endpoint.to_string(),
            handler,
        });
        Ok(())
    }

    /// Register the conventional routes for a resource: list (GET p),
    /// get (GET p/{id}), create (POST p), update (PUT p/{id}) and
    /// delete (DELETE p/{id}), each only when the service declares it.
    pub fn add_resource(
        &mut self,
        path: &str,
        service: Arc<dyn ResourceService>,
    ) -> Result<(), RouterError> {
        for op in CrudOp::ALL {
            if !service.operations().contains(&op) {
                continue;
            }
            self.add_route(
                op.method(),
                &op.pattern(path),
                &format!("{path}/{}", op.name()),
                Arc::new(ServiceOp {
                    service: Arc::clone(&service),
                    op,
                }),
            )?;
        }
        Ok(())
    }

    fn match_route(&self, request: &Request) -> Option<(&Route, RouteArgs)> {
        self.routes.iter().find_map(|route| {
            if route.method != request.method() {
                return None;
            }
            route.pattern.matches(request.path()).map(|args| (route, args))
        })
    }
}

#[async_trait]
impl Dispatcher for Router {
    async fn dispatch(&self, request: &Request, ctx: Context) -> Result<Response, ApiError> {
        let Some((route, args)) = self.match_route(request) else {
            return Err(ApiError::RouteNotFound);
        };
        tracing::debug!(endpoint = %route.endpoint, "dispatching");

        match route.handler.call(&args, request, &ctx).await? {
            Reply::Raw(response) => Ok(response),
            Reply::Json(value) => Ok(Response::json(200, &value)),
            Reply::Empty => Ok(Response::empty()),
        }
    }
}
