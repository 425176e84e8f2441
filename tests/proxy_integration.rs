//! End-to-end REST proxying through a running `ProxyServer`.

use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use vhost_proxy::config::{CorsOrigin, CorsPolicy, RouteConfig, ServerConfig};
use vhost_proxy::security::BoxError;
use vhost_proxy::{
    ConnectionInfo, ForwardValidationResult, ListenerError, ProxyConfig, ProxyError, ProxyServer,
};

mod common;

#[tokio::test]
async fn forwards_json_by_host() {
    let backend = common::start_json_backend("api").await;
    let config = ServerConfig::default()
        .route("api.test", RouteConfig::new(backend.to_string()))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/users?page=2"))
        .header("host", "api.test")
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "api");
    assert_eq!(body["path"], "/users?page=2");
    assert_eq!(body["host"], "api.test");

    proxy.stop().await;
}

#[tokio::test]
async fn remaps_path_before_forwarding() {
    let backend = common::start_json_backend("api").await;
    let route = RouteConfig::new(backend.to_string())
        .with_remap(|path: &str| path.replacen("/old", "/api", 1));
    let config = ServerConfig::default().route("api.test", route).ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let body: Value = common::client()
        .get(common::proxy_url(&proxy, 0, "/old/items"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["path"], "/api/items");
    proxy.stop().await;
}

#[tokio::test]
async fn unknown_host_is_404() {
    let config = ServerConfig::default().ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "nobody.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    proxy.stop().await;
}

#[tokio::test]
async fn health_path_answers_without_routes() {
    let config = ServerConfig::default().ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/vhost-proxy/health"))
        .header("host", "nobody.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "OK");
    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_502() {
    let dead = common::closed_addr().await;
    let config = ServerConfig::default()
        .route("api.test", RouteConfig::new(dead.to_string()))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    proxy.stop().await;
}

#[tokio::test]
async fn backend_failure_after_headers_aborts_the_body() {
    let backend = common::start_truncating_backend(100, "partial").await;
    let config = ServerConfig::default()
        .route("api.test", RouteConfig::new(backend.to_string()))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/download"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();

    // Headers were already relayed, so the status is the backend's, not a 502.
    assert_eq!(res.status(), 200);
    assert!(res.bytes().await.is_err());

    proxy.stop().await;
}

#[tokio::test]
async fn media_responses_get_cache_header() {
    let backend = common::start_mock_backend("200 OK", &[("Content-Type", "image/png")], "png").await;
    let config = ServerConfig::default()
        .route("cdn.test", RouteConfig::new(backend.to_string()))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;
    let client = common::client();

    let media = client
        .get(common::proxy_url(&proxy, 0, "/img/logo.PNG?v=3"))
        .header("host", "cdn.test")
        .send()
        .await
        .unwrap();
    assert_eq!(media.headers()["cache-control"], "public, max-age=86400");

    let page = client
        .get(common::proxy_url(&proxy, 0, "/index.html"))
        .header("host", "cdn.test")
        .send()
        .await
        .unwrap();
    assert!(page.headers().get("cache-control").is_none());

    proxy.stop().await;
}

#[tokio::test]
async fn cors_headers_added_for_origin() {
    let backend = common::start_json_backend("api").await;
    let cors = CorsPolicy {
        origin: Some(CorsOrigin::List(vec!["https://app.test".to_string()])),
        methods: Some(vec!["GET".to_string(), "POST".to_string()]),
        ..CorsPolicy::default()
    };
    let config = ServerConfig::default()
        .route("api.test", RouteConfig::new(backend.to_string()).with_cors(cors))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;
    let client = common::client();

    let allowed = client
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "api.test")
        .header("origin", "https://app.test")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.headers()["access-control-allow-origin"], "https://app.test");
    assert_eq!(allowed.headers()["access-control-allow-methods"], "GET, POST");

    let other = client
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "api.test")
        .header("origin", "https://evil.test")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get("access-control-allow-origin").is_none());

    let no_origin = client
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();
    assert!(no_origin.headers().get("access-control-allow-methods").is_none());

    proxy.stop().await;
}

#[tokio::test]
async fn validator_rejects_rest_requests() {
    let backend = common::start_json_backend("api").await;
    let validator = |info: ConnectionInfo| async move {
        if info.query("key") == Some("secret") {
            Ok::<_, BoxError>(ForwardValidationResult::allow())
        } else {
            Ok(ForwardValidationResult::deny(403, "Forbidden"))
        }
    };
    let config = ServerConfig::default()
        .route("api.test", RouteConfig::new(backend.to_string()).with_validator(validator))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;
    let client = common::client();

    let denied = client
        .get(common::proxy_url(&proxy, 0, "/data"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    assert_eq!(denied.text().await.unwrap(), "Forbidden");

    let allowed = client
        .get(common::proxy_url(&proxy, 0, "/data?key=secret"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    proxy.stop().await;
}

#[tokio::test]
async fn failing_validator_is_500() {
    let backend = common::start_json_backend("api").await;
    let mut config = ServerConfig::default()
        .route("api.test", RouteConfig::new(backend.to_string()))
        .ports(vec![0]);
    config.validate = Some(Arc::new(|_info: ConnectionInfo| async move {
        Err::<ForwardValidationResult, BoxError>("validator down".into())
    }));
    let mut proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "api.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    proxy.stop().await;
}

#[tokio::test]
async fn two_listeners_route_by_host() {
    let a = common::start_json_backend("a").await;
    let b = common::start_json_backend("b").await;
    let config = ServerConfig::default()
        .route("a.test", RouteConfig::new(a.to_string()))
        .route("b.test", RouteConfig::new(b.to_string()))
        .ports(vec![0, 0]);
    let mut proxy = common::start_proxy(config).await;
    assert_eq!(proxy.local_addrs().len(), 2);

    let client = common::client();
    for listener in 0..2 {
        for (host, expected) in [("a.test", "a"), ("b.test", "b")] {
            let body: Value = client
                .get(common::proxy_url(&proxy, listener, "/"))
                .header("host", host)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(body["backend"], expected, "listener {listener}, host {host}");
        }
    }

    proxy.stop().await;
}

#[tokio::test]
async fn wildcard_route_matches_subdomains() {
    let backend = common::start_json_backend("tenant").await;
    let config = ServerConfig::default()
        .route("*.tenant.test", RouteConfig::new(backend.to_string()))
        .ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;

    let body: Value = common::client()
        .get(common::proxy_url(&proxy, 0, "/"))
        .header("host", "acme.tenant.test:8080")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["backend"], "tenant");

    proxy.stop().await;
}

#[tokio::test]
async fn port_in_use_fails_start_without_reclaim() {
    let holder = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    let config = ServerConfig::default().ports(vec![0, port]);
    let mut proxy = ProxyServer::new(ProxyConfig::new(config, None), Default::default()).unwrap();

    let result = proxy.start().await;
    assert!(matches!(
        result,
        Err(ProxyError::Listener(ListenerError::PortInUse { port: p })) if p == port
    ));
    assert!(proxy.local_addrs().is_empty());
}

#[tokio::test]
async fn stop_closes_listeners() {
    let config = ServerConfig::default().ports(vec![0]);
    let mut proxy = common::start_proxy(config).await;
    let addr = proxy.local_addrs()[0];

    proxy.stop().await;
    assert!(proxy.local_addrs().is_empty());

    let connect = tokio::net::TcpStream::connect(("127.0.0.1", addr.port())).await;
    assert!(connect.is_err());
}
