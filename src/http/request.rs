//! Inbound request inspection.
//!
//! # Responsibilities
//! - Resolve the authority a request is addressed to (`Host` or `:authority`)
//! - Detect WebSocket upgrade requests
//! - Describe a request as a [`ConnectionInfo`] for the validation gate
//! - Rebuild the HTTP/2-shaped header list, pseudo-headers included
//!
//! # Design Decisions
//! - HTTP/2 carries the authority in the URI; HTTP/1.1 in the `Host` header
//! - Peer facts come from the [`ConnectionContext`] the listener attaches

use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Request, Uri, Version};

use crate::http::headers::{self, HeaderList};
use crate::net::connection::ConnectionContext;
use crate::security::gate::{ConnectionInfo, RequestType};

/// Host the request is addressed to, port included when given.
pub fn authority<B>(req: &Request<B>) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Path plus query string, `/` when absent.
pub fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// True for an HTTP/1.1 WebSocket handshake.
pub fn is_websocket_upgrade(headers: &HeaderMap<HeaderValue>) -> bool {
    let has_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    let has_connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|part| part.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);

    has_upgrade
        && has_connection
        && headers.contains_key(header::SEC_WEBSOCKET_KEY)
        && headers.contains_key(header::SEC_WEBSOCKET_VERSION)
}

/// Describe `req` for validators.
pub fn connection_info<B>(req: &Request<B>, kind: RequestType) -> ConnectionInfo {
    let context = req.extensions().get::<ConnectionContext>();
    let secure = context.map(|c| c.secure).unwrap_or(false);

    let mut info = ConnectionInfo::new(kind);
    info.method = req.method().to_string();
    info.path = path_and_query(req.uri());
    info.remote_address = context
        .map(|c| c.remote_addr.ip().to_string())
        .unwrap_or_default();
    info.scheme = if secure { "https" } else { "http" }.to_string();
    info.authority = authority(req);
    info.origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    info.headers = req.headers().clone();
    info.query = req
        .uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    info
}

/// Header list as an HTTP/2 peer sees it: pseudo-headers first, then regular headers.
pub fn http2_header_list<B>(req: &Request<B>) -> HeaderList {
    let scheme = req.uri().scheme_str().unwrap_or("https");

    let mut pseudo = vec![
        (":method", req.method().to_string()),
        (":path", path_and_query(req.uri())),
        (":scheme", scheme.to_string()),
    ];
    if let Some(authority) = req.uri().authority() {
        pseudo.push((":authority", authority.to_string()));
    }

    let mut list: HeaderList = pseudo
        .into_iter()
        .filter_map(|(name, value)| {
            HeaderValue::try_from(value)
                .ok()
                .map(|value| (name.to_string(), value))
        })
        .collect();
    list.extend(headers::from_header_map(req.headers()));
    list
}

/// HTTP/1.1 header map for a request, translating from HTTP/2 when needed.
pub fn http1_headers<B>(req: &Request<B>) -> HeaderMap {
    if req.version() == Version::HTTP_2 {
        headers::to_header_map(&headers::http2_to_http1(&http2_header_list(req)))
    } else {
        req.headers().clone()
    }
}
