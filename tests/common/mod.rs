//! Shared test infrastructure: deterministic origin fixtures and full
//! service nodes bound to ephemeral ports.
#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use fetchgrid::cluster::{ClusterContext, DEFAULT_REPLICAS};
use fetchgrid::config::{Config, MethodConfig};
use fetchgrid::server::{build_state, router, AppState};

/// Serve `app` on an ephemeral loopback port; returns its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Request log of the origin fixture: one `path?query` entry per request.
#[derive(Clone, Default)]
pub struct OriginLog {
    requests: Arc<Mutex<Vec<String>>>,
}

impl OriginLog {
    pub fn record(&self, path: &str, query: &str) {
        self.requests.lock().push(format!("{path}?{query}"));
    }

    /// Requests that hit `path`, regardless of query.
    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.split('?').next() == Some(path))
            .count()
    }

    pub fn all(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut out = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut out),
        image::ImageOutputFormat::Png,
    )
    .unwrap();
    out
}

async fn origin_handler(State(log): State<OriginLog>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or("").to_string();
    log.record(&path, &query);

    let html = |body: String| {
        ([(header::CONTENT_TYPE, "text/html")], body).into_response()
    };
    match path.as_str() {
        "/page" => html("<html>ok</html>".to_string()),
        "/spa" => {
            if query.contains("_escaped_fragment_") {
                html("<html>rendered</html>".to_string())
            } else {
                html(
                    "<html><head><meta name=\"fragment\" content=\"!\"/></head>\
                     <body>shell</body></html>"
                        .to_string(),
                )
            }
        }
        "/cat.png" => (
            [(header::CONTENT_TYPE, "image/png")],
            png_bytes(400, 200),
        )
            .into_response(),
        // Content-Length above the test config's image limit.
        "/huge.png" => (
            [(header::CONTENT_TYPE, "image/png")],
            vec![0u8; 2 << 20],
        )
            .into_response(),
        "/bin" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            vec![0u8, 1, 2, 3, 0, 255],
        )
            .into_response(),
        p if p.starts_with("/doc") => html(format!("<html>{p}</html>")),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start the origin fixture; returns its base URL and request log.
pub async fn spawn_origin() -> (String, OriginLog) {
    let log = OriginLog::default();
    let app = Router::new()
        .fallback(origin_handler)
        .with_state(log.clone());
    (spawn_server(app).await, log)
}

/// A config with small caches, suitable for tests.
pub fn test_config() -> Config {
    Config {
        html: MethodConfig {
            cache_size: 1,
            max_item_size: 256,
        },
        image: MethodConfig {
            cache_size: 1,
            max_item_size: 1024,
        },
        dimension: MethodConfig {
            cache_size: 1,
            max_item_size: 0,
        },
    }
}

pub struct TestNode {
    pub base: String,
    pub state: Arc<AppState>,
    pub cluster: Arc<ClusterContext>,
}

/// Start a full service node on an ephemeral port. The ring starts empty,
/// so every key resolves locally until `cluster.set_peers` is called.
pub async fn spawn_node(config: Config) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let http = reqwest::Client::new();
    let cluster = Arc::new(ClusterContext::new(
        base.clone(),
        DEFAULT_REPLICAS,
        http.clone(),
    ));
    let state = build_state(config, Arc::clone(&cluster), http);
    let app = router(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestNode {
        base,
        state,
        cluster,
    }
}

/// Encode a single `url=` query parameter the way clients do.
pub fn url_query(url: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url)
        .finish()
}
