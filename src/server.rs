// Process wiring and the hosting adapter. Everything is constructed
// explicitly here at startup: config -> pool -> session scope -> token
// auth -> services -> route table -> middleware chain. The axum layer
// only converts between hyper requests and the core request model.

use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{PasswordManager, TokenAuth};
use crate::config::AppConfig;
use crate::database::{self, SessionScope};
use crate::dto::{TimezoneDto, UserDto};
use crate::error::ApiError;
use crate::http::middleware::{ErrorMiddleware, MiddlewareChain};
use crate::http::router::Router;
use crate::http::{Method, Request, Response};
use crate::scope::ScopeMiddleware;
use crate::services::{AuthService, TimezoneService, UserService};

/// Accept up to 4MB of transmitted data.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub struct App {
    chain: MiddlewareChain,
    pool: SqlitePool,
}

impl App {
    pub async fn handle(&self, request: &Request) -> Response {
        self.chain.handle(request).await
    }
}

/// Wire the request pipeline against an open pool.
pub fn build_app(config: &AppConfig, pool: SqlitePool) -> anyhow::Result<App> {
    let auth = Arc::new(TokenAuth::new(
        &config.security.jwt_secret,
        config.security.token_ttl_hours,
    ));
    let sessions = Arc::new(SessionScope::new(pool.clone()));
    let passwords = Arc::new(PasswordManager::new());
    let user_dto = Arc::new(UserDto::new(Arc::clone(&passwords)));
    let timezone_dto = Arc::new(TimezoneDto::new());

    let mut router = Router::new();
    router.add_route(
        Method::Post,
        "/auth",
        "auth/login",
        Arc::new(AuthService::new(
            Arc::clone(&user_dto),
            passwords,
            Arc::clone(&auth),
            Arc::clone(&sessions),
        )),
    )?;
    router.add_resource(
        "/users",
        Arc::new(UserService::new(
            user_dto,
            Arc::clone(&auth),
            Arc::clone(&sessions),
        )),
    )?;
    router.add_resource(
        "/timezones",
        Arc::new(TimezoneService::new(timezone_dto, auth, sessions)),
    )?;

    // Error translation outermost, then the request scope around dispatch.
    let chain = MiddlewareChain::wrap(
        vec![Arc::new(ErrorMiddleware), Arc::new(ScopeMiddleware)],
        Arc::new(router),
    );

    Ok(App { chain, pool })
}

/// Open the database, create the schema and serve until shutdown.
pub async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let pool = database::connect(&config.database).await?;
    database::create_schema(&pool).await?;
    let app = Arc::new(build_app(config, pool)?);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "listening");

    axum::serve(listener, axum_app(app, config)).await?;
    Ok(())
}

/// The hyper-facing application: /health, optional static client assets,
/// and everything else handed to the core pipeline.
pub fn axum_app(app: Arc<App>, config: &AppConfig) -> axum::Router {
    let mut router = axum::Router::new()
        .route("/health", get(health))
        .fallback(dispatch)
        .with_state(app);

    if let Some(dir) = &config.server.client_dir {
        router = router.nest_service("/client", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn dispatch(
    State(app): State<Arc<App>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    match into_core_request(request).await {
        Ok(core_request) => from_core_response(app.handle(&core_request).await),
        Err(response) => response,
    }
}

async fn health(State(app): State<Arc<App>>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&app.pool).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database_error": e.to_string() })),
        ),
    }
}

async fn into_core_request(
    request: axum::extract::Request,
) -> Result<Request, axum::response::Response> {
    let (parts, body) = request.into_parts();

    // Verbs outside the routing model can never match a route.
    let Some(method) = Method::from_name(parts.method.as_str()) else {
        return Err(from_core_response(ApiError::RouteNotFound.into_response()));
    };

    let mut core = Request::new(method, parts.uri.path());
    for (name, value) in &parts.headers {
        if let Ok(text) = value.to_str() {
            core = core.with_header(name.as_str(), text);
        }
    }
    if let Some(query) = parts.uri.query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            core = core.with_query(name.into_owned(), value.into_owned());
        }
    }

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "description": "Request body too large" })),
            )
                .into_response())
        }
    };

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or("").trim() == "application/json")
        .unwrap_or(false);
    if is_json && !bytes.is_empty() {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => core = core.with_body(value),
            // Handlers see no body; validation reports the shape problem.
            Err(error) => debug!(%error, "ignoring malformed JSON body"),
        }
    }

    Ok(core)
}

fn from_core_response(response: Response) -> axum::response::Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}
