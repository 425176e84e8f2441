//! HTTP/2 stream bridge.
//!
//! # Responsibilities
//! - Forward an inbound HTTP/2 stream to the route target over HTTP/2 + TLS
//! - Apply the route remap to `:path`, keep the original `:authority`
//! - Add media caching and CORS headers to the response
//!
//! # Design Decisions
//! - One outbound HTTP/2 connection per stream
//! - Outbound certificates are not verified
//! - Any failure resets the inbound stream

use std::sync::Arc;

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper::header;
use hyper::{Request, Response, Uri, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::ProxyConfig;
use crate::error::{BridgeError, CertificateError};
use crate::http::handlers::{HandlerResult, StreamHandler};
use crate::http::{request, response};
use crate::net::tls;
use crate::routing::router::strip_port;

/// Outbound TLS config that negotiates `h2`.
pub fn stream_tls(config: &ProxyConfig) -> Result<Arc<ClientConfig>, CertificateError> {
    tls::client_config(config.get_ssl().map(|b| b.as_ref()), &[tls::ALPN_H2]).map(Arc::new)
}

/// Built-in [`StreamHandler`].
#[derive(Clone)]
pub struct StreamBridge {
    config: Arc<ProxyConfig>,
    tls: Arc<ClientConfig>,
}

impl StreamBridge {
    pub fn new(config: Arc<ProxyConfig>, tls: Arc<ClientConfig>) -> Self {
        Self { config, tls }
    }

    pub async fn forward(&self, req: Request<Incoming>) -> HandlerResult {
        let host = request::authority(&req);
        let target = self
            .config
            .get_target(&host)
            .ok_or_else(|| BridgeError::NoRoute(host.clone()))?;

        let path = target.remap_path(&request::path_and_query(req.uri()));
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::debug!(host = %host, target = %target.address, path = %path, "Forwarding stream");

        let tcp = TcpStream::connect(&target.address)
            .await
            .map_err(|source| BridgeError::Connect {
                target: target.address.clone(),
                source,
            })?;

        let server_name = strip_port(&target.address)
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let server_name = ServerName::try_from(server_name)
            .map_err(|_| BridgeError::ServerName(target.address.clone()))?;

        let tls = TlsConnector::from(Arc::clone(&self.tls))
            .connect(server_name, tcp)
            .await
            .map_err(|source| BridgeError::Connect {
                target: target.address.clone(),
                source,
            })?;

        let (mut sender, connection) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tls)).await?;

        let address = target.address.clone();
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::debug!(target = %address, error = %error, "Upstream HTTP/2 connection closed");
            }
        });

        let uri: Uri = format!("https://{host}{path}").parse()?;
        let (parts, body) = req.into_parts();

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(uri)
            .version(Version::HTTP_2)
            .body(Body::new(body))?;
        *outbound.headers_mut() = parts.headers;
        outbound.headers_mut().remove(header::HOST);

        let upstream = sender.send_request(outbound).await?;

        let (mut parts, body) = upstream.into_parts();
        response::apply_media_cache(&path, &mut parts.headers);
        if let Some(origin) = origin {
            response::apply_cors(&mut parts.headers, self.config.get_cors_headers(&origin, Some(&host)));
        }

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl StreamHandler for StreamBridge {
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult> {
        let bridge = self.clone();
        Box::pin(async move { bridge.forward(req).await })
    }
}
