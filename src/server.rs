//! HTTP surface.
//!
//! | Method | Path | Auth | Response |
//! |---|---|---|---|
//! | `GET` | `/ping` | no | `.` |
//! | `GET` | `/{key}[.{ext}[:{modifier}]]?op=arg&order=…` | no | object or derived image |
//! | `GET` | `/manage/{key}` | `x-auth` | metadata JSON |
//! | `PUT` | `/manage/{key}?attr=value` | `x-auth` | `201` + metadata JSON |
//! | `DELETE` | `/manage/{key}` | `x-auth` | `204` |
//!
//! Errors are returned as `{"Content": message, "Code": kind}`. Server-side
//! failures keep their detail in the log and send a generic message.
//!
//! Store and pipeline work is synchronous and runs on tokio's blocking pool.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::MediaCache;
use crate::config::{Config, effective_threads};
use crate::error::{ErrorKind, MediaError, Result};
use crate::imaging::Registry;
use crate::media::MediaService;
use crate::store::LocalStore;
use crate::types::{NewObject, ObjectMeta};

/// Header carrying the write secret.
pub const AUTH_HEADER: &str = "x-auth";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    service: Arc<MediaService>,
    write_pass: Arc<str>,
}

impl AppState {
    pub fn new(service: Arc<MediaService>, write_pass: impl Into<String>) -> Self {
        Self {
            service,
            write_pass: Arc::from(write_pass.into()),
        }
    }

    pub fn service(&self) -> &MediaService {
        &self.service
    }

    fn authorised(&self, supplied: Option<&str>) -> bool {
        !self.write_pass.is_empty() && supplied == Some(&*self.write_pass)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let manage = Router::new()
        .route(
            "/:key",
            get(manage_get).put(manage_put).delete(manage_delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        // Uploads are whole media files; no size cap.
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/ping", get(ping))
        .route("/:resource", get(get_resource))
        .nest("/manage", manage)
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Build the service described by `config` and serve until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| MediaError::InvalidInput(e.to_string()))?;
    let store = LocalStore::open(&config.storage.data_dir)?;
    let cache = MediaCache::new(config.cache.capacity)?;
    let service = MediaService::new(store, cache, Registry::with_defaults());

    if config.auth.write_pass.is_empty() {
        tracing::warn!("no write password configured; every /manage request will be rejected");
    }

    let state = AppState::new(Arc::new(service), config.auth.write_pass.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        data_dir = %config.storage.data_dir.display(),
        cache_capacity = config.cache.capacity,
        threads = effective_threads(&config.processing),
        "media store listening"
    );

    let service = state.service.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!(stats = %service.stats(), "media store stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

// =========================================================================
// Errors
// =========================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    content: String,
    code: u32,
}

/// A [`MediaError`] tagged with the operation that produced it.
#[derive(Debug)]
pub struct ApiError {
    op: &'static str,
    error: MediaError,
}

impl ApiError {
    pub fn new(op: &'static str, error: MediaError) -> Self {
        Self { op, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status =
            StatusCode::from_u16(kind.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content = if status.is_server_error() && kind != ErrorKind::Unsupported {
            tracing::error!(op = self.op, code = kind.code(), error = %self.error, "request failed");
            "something went wrong".to_string()
        } else {
            tracing::warn!(op = self.op, code = kind.code(), error = %self.error, "request rejected");
            self.error.to_string()
        };
        (
            status,
            Json(ErrorBody {
                content,
                code: kind.code(),
            }),
        )
            .into_response()
    }
}

/// Run synchronous service work on the blocking pool.
async fn blocking<T, F>(op: &'static str, work: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::new(op, MediaError::Internal(format!("worker failed: {e}"))))?
        .map_err(|e| ApiError::new(op, e))
}

// =========================================================================
// Middleware
// =========================================================================

async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());
    if state.authorised(supplied) {
        next.run(request).await
    } else {
        ApiError::new("auth", MediaError::AuthFailed).into_response()
    }
}

// =========================================================================
// Handlers
// =========================================================================

async fn ping() -> &'static str {
    "."
}

async fn get_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Response, ApiError> {
    let service = state.service.clone();
    let served = blocking("get", move || service.fetch(&resource, &params)).await?;
    Ok(([(header::CONTENT_TYPE, served.mime)], served.data).into_response())
}

async fn manage_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> std::result::Result<Json<ObjectMeta>, ApiError> {
    let service = state.service.clone();
    let meta = blocking("get_meta", move || service.get_meta(&key)).await?;
    Ok(Json(meta))
}

async fn manage_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<(StatusCode, Json<ObjectMeta>), ApiError> {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let object = NewObject::new(mime).with_attributes(collect_attributes(params));
    let service = state.service.clone();
    let meta = blocking("put", move || service.put(&key, object, &body)).await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

async fn manage_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let service = state.service.clone();
    blocking("rem", move || service.rem(&key)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fold query pairs into attributes. Repeated names are comma-joined in
/// the order given.
fn collect_attributes(params: Vec<(String, String)>) -> HashMap<String, String> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in params {
        grouped.entry(name).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(name, values)| (name, values.join(",")))
        .collect()
}
