//! REST bridge.
//!
//! # Responsibilities
//! - Forward one request/response pair to the route target
//! - Apply the route remap to the path, keep the original `Host`
//! - Translate headers when the client spoke HTTP/2
//! - Add media caching and CORS headers to the response
//!
//! # Data Flow
//! ```text
//! Client ── request body (streamed) ──▶ Proxy ──▶ Backend (HTTP/1.1, TLS if route.ssl)
//! Client ◀── response body (streamed) ── Proxy ◀── Backend
//! ```
//!
//! # Design Decisions
//! - One pooled client shared by every request
//! - Outbound is always HTTP/1.1
//! - No retries; a failure before response headers is a 502
//! - HTTP/2 requests for `ssl` routes are refused; they belong to the stream bridge

use std::sync::Arc;

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::body::{Bytes, Incoming};
use hyper::header;
use hyper::{Request, Response, Uri, Version};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::ProxyConfig;
use crate::error::{BridgeError, CertificateError};
use crate::http::handlers::{HandlerResult, RestHandler};
use crate::http::{request, response};
use crate::net::tls;

/// Pooled outbound client, plain or TLS per request URI.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared outbound client. Presents the global bundle as client identity.
pub fn upstream_client(config: &ProxyConfig) -> Result<UpstreamClient, CertificateError> {
    let tls = tls::client_config(config.get_ssl().map(|b| b.as_ref()), &[])?;
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new())
        .retry_canceled_requests(false)
        .build(connector))
}

/// Built-in [`RestHandler`].
#[derive(Clone)]
pub struct RestBridge {
    config: Arc<ProxyConfig>,
    client: UpstreamClient,
}

impl RestBridge {
    pub fn new(config: Arc<ProxyConfig>, client: UpstreamClient) -> Self {
        Self { config, client }
    }

    pub async fn forward<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let host = request::authority(&req);
        let Some(target) = self.config.get_target(&host) else {
            tracing::debug!(host = %host, "No route for host");
            return Ok(response::not_found());
        };

        let inbound_http2 = req.version() == Version::HTTP_2;
        if inbound_http2 && target.secure {
            tracing::warn!(host = %host, "Refusing HTTP/2 request for TLS route");
            return Err(BridgeError::StreamOnly(host));
        }
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let path = target.remap_path(&request::path_and_query(req.uri()));
        let scheme = if target.secure { "https" } else { "http" };
        let uri: Uri = format!("{scheme}://{}{}", target.address, path).parse()?;

        tracing::debug!(
            host = %host,
            target = %target.address,
            method = %req.method(),
            path = %path,
            "Forwarding request"
        );

        let headers = request::http1_headers(&req);
        let (parts, body) = req.into_parts();

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(uri)
            .version(Version::HTTP_11)
            .body(Body::new(body))?;
        *outbound.headers_mut() = headers;

        let upstream = match self.client.request(outbound).await {
            Ok(upstream) => upstream,
            Err(error) => {
                tracing::warn!(host = %host, target = %target.address, error = %error, "Upstream request failed");
                return Ok(response::bad_gateway());
            }
        };

        let (mut parts, body) = upstream.into_parts();
        if inbound_http2 {
            parts.headers = response::for_http2(&parts.headers);
        }
        response::apply_media_cache(&path, &mut parts.headers);
        if let Some(origin) = origin {
            response::apply_cors(&mut parts.headers, self.config.get_cors_headers(&origin, Some(&host)));
        }

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl RestHandler for RestBridge {
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult> {
        let bridge = self.clone();
        Box::pin(async move { bridge.forward(req).await })
    }
}
