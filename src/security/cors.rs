//! CORS header derivation.
//!
//! # Responsibilities
//! - Compute `access-control-*` headers from a policy and the request origin
//!
//! # Design Decisions
//! - Recomputed per request, never cached
//! - No policy at all means permissive with the request origin echoed
//! - A list origin that does not contain the request origin omits the header

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::schema::{CorsOrigin, CorsPolicy};

/// Build CORS response headers for `origin` under `policy`.
pub fn cors_headers(policy: Option<&CorsPolicy>, origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let Some(policy) = policy else {
        insert(&mut headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        insert(&mut headers, header::ACCESS_CONTROL_ALLOW_METHODS, "*");
        insert(&mut headers, header::ACCESS_CONTROL_ALLOW_HEADERS, "*");
        insert(&mut headers, header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        return headers;
    };

    let allow_origin = match &policy.origin {
        Some(CorsOrigin::List(allowed)) => allowed.iter().any(|o| o == origin).then_some(origin),
        Some(CorsOrigin::One(value)) if !value.is_empty() => Some(value.as_str()),
        _ => Some(origin),
    };
    if let Some(value) = allow_origin {
        insert(&mut headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }

    let methods = policy.methods.as_ref().map(|m| m.join(", "));
    insert(
        &mut headers,
        header::ACCESS_CONTROL_ALLOW_METHODS,
        methods.as_deref().unwrap_or("*"),
    );

    let allowed = policy.allowed_headers.as_ref().map(|h| h.join(", "));
    insert(
        &mut headers,
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        allowed.as_deref().unwrap_or("*"),
    );

    if let Some(exposed) = &policy.exposed_headers {
        insert(&mut headers, header::ACCESS_CONTROL_EXPOSE_HEADERS, &exposed.join(", "));
    }

    let credentials = if policy.credentials.unwrap_or(true) { "true" } else { "false" };
    insert(&mut headers, header::ACCESS_CONTROL_ALLOW_CREDENTIALS, credentials);

    if let Some(max_age) = policy.max_age_seconds.filter(|&age| age > 0) {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age));
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = %name, value, "Skipping invalid CORS header value"),
    }
}
