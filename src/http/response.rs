//! Response shaping.
//!
//! # Responsibilities
//! - Canned responses (health, not found, bad gateway)
//! - Long-lived caching for media files
//! - CORS header injection on proxied responses
//! - Strip connection-specific headers before answering over HTTP/2
//!
//! # Design Decisions
//! - Streaming responses are never buffered
//! - Backend connect failures before any header map to 502 Bad Gateway

use axum::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};

use crate::http::headers;

/// `cache-control` applied to media files: one day.
pub const MEDIA_CACHE_CONTROL: &str = "public, max-age=86400";

const MEDIA_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".mp4", ".webm", ".ogg", ".mov", ".avi",
    ".mp3", ".wav", ".flac", ".aac", ".m4a", ".woff2", ".woff", ".ttf", ".eot", ".otf", ".ico",
];

/// Plain-text response.
pub fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub fn health() -> Response<Body> {
    text(StatusCode::OK, "OK")
}

pub fn not_found() -> Response<Body> {
    text(StatusCode::NOT_FOUND, "Not Found")
}

pub fn bad_gateway() -> Response<Body> {
    text(StatusCode::BAD_GATEWAY, "Bad Gateway")
}

/// True when the path (query and fragment ignored) ends in a media extension.
pub fn is_media_file(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path).to_ascii_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Mark media responses as cacheable for a day.
pub fn apply_media_cache(path: &str, headers: &mut HeaderMap) {
    if is_media_file(path) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(MEDIA_CACHE_CONTROL));
    }
}

/// Merge CORS headers unless the backend already answered with its own.
pub fn apply_cors(headers: &mut HeaderMap, cors: HeaderMap) {
    if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
        return;
    }
    headers.extend(cors);
}

/// Drop headers an HTTP/2 response must not carry.
pub fn for_http2(headers: &HeaderMap) -> HeaderMap {
    headers::to_header_map(&headers::http1_to_http2(&headers::from_header_map(headers)))
}
