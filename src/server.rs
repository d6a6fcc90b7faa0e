//! HTTP façade: the front API and the inter-peer API on one router.
//!
//! Front routes dispatch `GET /<method>?<query>` through the method
//! registry; `/_groupcache/` serves peers; `/stats`, `/config` and `/ping`
//! are operational. Unknown methods are 404, generator and peer failures
//! surface as 500 with the error text.

use std::sync::Arc;

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prost::Message;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::bucket;
use crate::cluster::{ClusterContext, GetResponse, RPC_BASE_PATH};
use crate::config::Config;
use crate::fetch::dimension::DimensionFetcher;
use crate::fetch::html::HtmlFetcher;
use crate::fetch::image::{ImageFetcher, DEFAULT_JPEG_QUALITY};
use crate::fetch::{MethodRegistry, QueryMap};
use crate::peers::PeersManager;

/// Everything a request handler needs; built once at startup.
pub struct AppState {
    pub registry: MethodRegistry,
    pub cluster: Arc<ClusterContext>,
    pub peers: Arc<PeersManager>,
    pub config: Config,
}

/// Assemble the standard method registry (html, image, dimension) and the
/// surrounding state from a config.
#[must_use]
pub fn build_state(
    config: Config,
    cluster: Arc<ClusterContext>,
    http: reqwest::Client,
) -> Arc<AppState> {
    let mut registry = MethodRegistry::new();
    registry.register(
        "html",
        Arc::new(HtmlFetcher::new(http.clone(), config.html.max_item_bytes())),
        config.html.cache_bytes(),
        Arc::clone(&cluster),
    );
    registry.register(
        "image",
        Arc::new(ImageFetcher::new(
            http.clone(),
            config.image.max_item_bytes(),
            DEFAULT_JPEG_QUALITY,
        )),
        config.image.cache_bytes(),
        Arc::clone(&cluster),
    );
    registry.register(
        "dimension",
        Arc::new(DimensionFetcher::new(http)),
        config.dimension.cache_bytes(),
        Arc::clone(&cluster),
    );
    Arc::new(AppState {
        registry,
        cluster,
        peers: Arc::new(PeersManager::new()),
        config,
    })
}

/// The complete application router: front API plus inter-peer API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(RPC_BASE_PATH, get(peer_rpc))
        .route("/stats", get(stats))
        .route("/config", get(config_echo))
        .route("/ping", get(ping))
        .route("/:method", get(dispatch))
        .with_state(state)
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    // /fetch predates the HTML record format; kept as an alias for old
    // clients.
    let method = if method == "fetch" { "html" } else { method.as_str() }.to_string();
    let Some(entry) = state.registry.get(&method) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let raw = raw.unwrap_or_default();
    let query = QueryMap::parse(&raw);
    let url = query.get("url").unwrap_or("");
    let ttl = query
        .get("ttl")
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or(0);
    let key = format!("{}{}", bucket::prefix(url, ttl), raw);
    debug!(%method, %key, "dispatch");

    match entry.group.get(&key).await {
        Ok(content) => entry.fetcher.write_response(content),
        Err(err) => {
            error!(%method, %key, %err, "fetch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

#[derive(Deserialize)]
struct RpcQuery {
    #[serde(default)]
    group: String,
    #[serde(default)]
    key: String,
}

async fn peer_rpc(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RpcQuery>,
) -> Response {
    let Some(group) = state.registry.group(&query.group) else {
        return (
            StatusCode::NOT_FOUND,
            format!("no such group: {}", query.group),
        )
            .into_response();
    };
    match group.get(&query.key).await {
        Ok(value) => {
            let body = GetResponse {
                value: Some(value.to_vec()),
                minute_qps: None,
            }
            .encode_to_vec();
            (
                [(header::CONTENT_TYPE, "application/x-protobuf")],
                body,
            )
                .into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use crate::group::CacheKind;

    let mut groups = serde_json::Map::new();
    for (name, entry) in state.registry.iter() {
        groups.insert(
            name.to_string(),
            json!({
                "Main": entry.group.cache_stats(CacheKind::Main),
                "Hot": entry.group.cache_stats(CacheKind::Hot),
                "Loads": entry.group.stats(),
                "InFlight": entry.group.in_flight(),
            }),
        );
    }
    let tasks = tokio::runtime::Handle::current().metrics().num_alive_tasks();
    Json(json!({ "Tasks": tasks, "Groups": groups }))
}

async fn config_echo(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config.clone())
}

#[derive(Deserialize)]
struct PingQuery {
    #[serde(default)]
    peer: Option<String>,
}

async fn ping(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PingQuery>,
) -> Json<Vec<String>> {
    if let Some(peer) = query.peer.as_deref().filter(|p| !p.is_empty()) {
        state.peers.ping(peer);
    }
    Json(state.peers.live())
}
