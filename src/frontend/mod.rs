use crate::client::{AddItemsRequest, Degradable, PodcastApi, PodcastItem};
use crate::error::{Result, ServiceError};
use crate::metrics::{self, metrics_handler, MetricsService};
use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Upper bound on items returned by the listing
pub const MAX_LISTED_ITEMS: usize = 128;

/// Shared state for UI handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn PodcastApi>,
    /// Public API address for RSS links; falls back to the request's Host header
    pub external_api_host: Option<String>,
    pub feeds_path: String,
}

impl AppState {
    pub fn new(api: Arc<dyn PodcastApi>, external_api_host: Option<String>, feeds_path: String) -> Self {
        Self {
            api,
            external_api_host,
            feeds_path,
        }
    }

    fn link_host(&self, headers: &HeaderMap) -> String {
        self.external_api_host
            .clone()
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[derive(Serialize)]
struct ItemView {
    #[serde(flatten)]
    item: PodcastItem,
    feed_url: String,
}

/// Build the UI router
pub fn router(state: AppState, metrics: Option<MetricsService>) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/items", get(list_items_handler).post(add_items_handler))
        .route("/api/feeds", get(list_feeds_handler))
        .route("/api/feeds/:feed/:item", delete(delete_item_handler))
        .with_state(state);

    if let Some(metrics) = metrics {
        app = app.route("/metrics", get(metrics_handler).with_state(metrics));
    }

    app.layer(axum_middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
}

async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    metrics::record_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

async fn root_handler() -> Redirect {
    Redirect::temporary("/api/items")
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let result = state.api.health_check().await;
    let circuit = state.api.circuit_state().to_string();

    match result {
        Ok(()) => Json(json!({
            "status": "ok",
            "api": "ok",
            "circuit": circuit,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, circuit = %circuit, "API service health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "api": "unavailable",
                    "circuit": circuit,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

fn listing<T: Serialize>(key: &str, result: Degradable<Vec<T>>) -> Json<Value> {
    let message = result.degradation.as_ref().map(|e| e.to_string());
    let degraded = result.is_degraded();

    let mut body = json!({
        "degraded": degraded,
        "message": message,
    });
    body[key] = json!(result.data);
    Json(body)
}

async fn list_items_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let result = state.api.list_items().await?;
    let host = state.link_host(&headers);

    let Degradable {
        mut data,
        degradation,
    } = result;
    newest_first(&mut data);
    let views: Vec<ItemView> = data
        .into_iter()
        .map(|item| ItemView {
            feed_url: state
                .api
                .feed_link(&host, &state.feeds_path, &item.audio_file_path),
            item,
        })
        .collect();

    Ok(listing("items", Degradable { data: views, degradation }))
}

/// Most recently updated first, undated items last, capped at [`MAX_LISTED_ITEMS`]
fn newest_first(items: &mut Vec<PodcastItem>) {
    items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    items.truncate(MAX_LISTED_ITEMS);
}

async fn list_feeds_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let result = state.api.list_feeds().await?;
    Ok(listing("feeds", result))
}

async fn add_items_handler(
    State(state): State<AppState>,
    Json(request): Json<AddItemsRequest>,
) -> Result<impl IntoResponse> {
    let urls = validate_urls(request.urls)?;

    state.api.add_items(&urls).await?;
    info!(count = urls.len(), "Submitted items to API service");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": urls.len() })),
    ))
}

async fn delete_item_handler(
    State(state): State<AppState>,
    Path((feed, item)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.api.delete_item(&feed, &item).await?;
    info!(feed = %feed, item = %item, "Deleted podcast item");
    Ok(Json(json!({ "deleted": true })))
}

/// Trim entries and reject empty lists or anything that is not an http(s) URL
fn validate_urls(urls: Vec<String>) -> Result<Vec<String>> {
    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    if urls.is_empty() {
        return Err(ServiceError::InvalidInput(
            "at least one URL is required".to_string(),
        ));
    }

    for raw in &urls {
        let parsed = url::Url::parse(raw)
            .map_err(|_| ServiceError::InvalidInput(format!("invalid URL: {}", raw)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ServiceError::InvalidInput(format!(
                "unsupported URL scheme: {}",
                raw
            )));
        }
    }

    Ok(urls)
}
