//! End-to-end scenarios against a single node: the HTML method with the
//! fragment protocol, image resizing, dimensions, TTL bucketing, and the
//! operational endpoints.

mod common;

use common::{spawn_node, spawn_origin, test_config, url_query};

#[tokio::test]
async fn html_returns_body_and_real_url() {
    let (origin, _log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/page");
    let response = reqwest::get(format!("{}/html?{}", node.base, url_query(&page)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-real-url").unwrap().to_str().unwrap(),
        page
    );
    assert_eq!(response.text().await.unwrap(), "<html>ok</html>");
}

#[tokio::test]
async fn fetch_is_an_alias_for_html() {
    let (origin, _log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/page");
    let response = reqwest::get(format!("{}/fetch?{}", node.base, url_query(&page)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<html>ok</html>");
}

#[tokio::test]
async fn hashbang_urls_fetch_the_escaped_form() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/page#!foo");
    let response = reqwest::get(format!("{}/html?{}", node.base, url_query(&page)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    // The origin saw the escaped query, the client sees the hashbang back.
    assert!(log
        .all()
        .iter()
        .any(|r| r.starts_with("/page?") && r.contains("_escaped_fragment_=foo")));
    assert_eq!(
        response.headers().get("x-real-url").unwrap().to_str().unwrap(),
        page
    );
}

#[tokio::test]
async fn fragment_meta_triggers_exactly_one_refetch() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/spa");
    let response = reqwest::get(format!("{}/html?{}", node.base, url_query(&page)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<html>rendered</html>");
    // Shell fetch plus one escaped refetch, then the entry is cached.
    assert_eq!(log.hits("/spa"), 2);

    let again = reqwest::get(format!("{}/html?{}", node.base, url_query(&page)))
        .await
        .unwrap();
    assert_eq!(again.text().await.unwrap(), "<html>rendered</html>");
    assert_eq!(log.hits("/spa"), 2, "second request must come from cache");
}

#[tokio::test]
async fn non_text_bodies_cache_as_empty() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let url = format!("{origin}/bin");
    for _ in 0..2 {
        let response = reqwest::get(format!("{}/html?{}", node.base, url_query(&url)))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.bytes().await.unwrap().is_empty());
    }
    assert_eq!(log.hits("/bin"), 1, "the empty entry is a cache entry too");
}

#[tokio::test]
async fn origin_errors_become_500_and_are_not_cached() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let url = format!("{origin}/missing");
    let response = reqwest::get(format!("{}/html?{}", node.base, url_query(&url)))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body = response.text().await.unwrap();
    assert!(body.contains("Response code 404 for URL:"), "got: {body}");

    let _ = reqwest::get(format!("{}/html?{}", node.base, url_query(&url))).await;
    assert_eq!(log.hits("/missing"), 2, "failures must not be cached");
}

#[tokio::test]
async fn image_resizes_proportionally_and_stays_png() {
    let (origin, _log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let url = format!("{origin}/cat.png");
    let query = format!("{}&width=100", url_query(&url));
    let response = reqwest::get(format!("{}/image?{}", node.base, query))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.bytes().await.unwrap();
    assert_eq!(image::guess_format(&body).unwrap(), image::ImageFormat::Png);
    let img = image::load_from_memory(&body).unwrap();
    use image::GenericImageView;
    assert_eq!(img.dimensions(), (100, 50), "400x200 bounded to width 100");
}

#[tokio::test]
async fn oversized_images_cache_as_empty() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let url = format!("{origin}/huge.png");
    for _ in 0..2 {
        let response = reqwest::get(format!("{}/image?{}", node.base, url_query(&url)))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.bytes().await.unwrap().is_empty());
    }
    assert_eq!(log.hits("/huge.png"), 1, "the empty entry absorbs repeats");
}

#[tokio::test]
async fn dimension_reports_width_and_height() {
    let (origin, _log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let url = format!("{origin}/cat.png");
    let response = reqwest::get(format!("{}/dimension?{}", node.base, url_query(&url)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"Width": 400, "Height": 200}));
}

#[tokio::test]
async fn same_ttl_bucket_hits_the_origin_once() {
    let (origin, log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/page");
    let query = format!("{}&ttl=3600", url_query(&page));
    for _ in 0..3 {
        let response = reqwest::get(format!("{}/html?{}", node.base, query))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    assert_eq!(log.hits("/page"), 1);
}

#[tokio::test]
async fn unknown_methods_are_404() {
    let node = spawn_node(test_config()).await;
    let response = reqwest::get(format!("{}/nope?url=x", node.base))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn stats_exposes_tiers_per_group() {
    let (origin, _log) = spawn_origin().await;
    let node = spawn_node(test_config()).await;

    let page = format!("{origin}/page");
    reqwest::get(format!("{}/html?{}", node.base, url_query(&page)))
        .await
        .unwrap();

    let stats: serde_json::Value = reqwest::get(format!("{}/stats", node.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["Tasks"].as_u64().is_some());
    let main = &stats["Groups"]["html"]["Main"];
    assert_eq!(main["Items"].as_u64(), Some(1));
    assert!(main["Bytes"].as_u64().unwrap() > 0);
    assert_eq!(stats["Groups"]["html"]["Hot"]["Items"].as_u64(), Some(0));
}

#[tokio::test]
async fn config_endpoint_echoes_the_config() {
    let node = spawn_node(test_config()).await;
    let config: fetchgrid::Config = reqwest::get(format!("{}/config", node.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(config, test_config());
}

#[tokio::test]
async fn ping_registers_and_returns_the_live_set() {
    let node = spawn_node(test_config()).await;

    let live: Vec<String> = reqwest::get(format!("{}/ping?peer=10.0.0.1:9001", node.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live, vec!["10.0.0.1:9001".to_string()]);

    // A bare ping reads without registering.
    let live: Vec<String> = reqwest::get(format!("{}/ping", node.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live, vec!["10.0.0.1:9001".to_string()]);
}
