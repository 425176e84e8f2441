//! Header translation between the HTTP/1.1 and HTTP/2 namespaces.
//!
//! # Responsibilities
//! - Rename `host` and `:authority` across protocol boundaries
//! - Drop connection-specific headers that are invalid under HTTP/2
//! - Drop request pseudo-headers going back to HTTP/1.1
//! - Fold repeated HTTP/2 `cookie` fields into one HTTP/1.1 `Cookie` line
//!
//! # Design Decisions
//! - Operates on ordered name/value lists so pseudo-headers can be represented
//! - Names are expected lowercase, as both hyper and h2 deliver them
//! - Values are carried as raw `HeaderValue`s; translation only looks at names
//! - The round trip is not identity: pseudo-headers do not survive it

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// Ordered header list that may contain `:`-prefixed pseudo-headers.
pub type HeaderList = Vec<(String, HeaderValue)>;

/// HTTP/1.1 → HTTP/2: `host` becomes `:authority`, hop-by-hop headers are dropped.
pub fn http1_to_http2(headers: &[(String, HeaderValue)]) -> HeaderList {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "host" => Some((":authority".to_string(), value.clone())),
                "connection" | "upgrade" | "http2-settings" | "keep-alive" | "transfer-encoding"
                | "te" => None,
                n if n.starts_with("sec-websocket-") => None,
                _ => Some((name.clone(), value.clone())),
            }
        })
        .collect()
}

/// HTTP/2 → HTTP/1.1: `:authority` becomes `host`, request pseudo-headers are dropped
/// and `cookie` fields are joined with `"; "` at the position of the first one.
pub fn http2_to_http1(headers: &[(String, HeaderValue)]) -> HeaderList {
    let mut converted = HeaderList::with_capacity(headers.len());
    let mut cookie: Option<(usize, Vec<u8>)> = None;

    for (name, value) in headers {
        match name.as_str() {
            ":authority" => converted.push(("host".to_string(), value.clone())),
            ":method" | ":path" | ":scheme" | ":status" => {}
            "cookie" => match &mut cookie {
                Some((_, joined)) => {
                    joined.extend_from_slice(b"; ");
                    joined.extend_from_slice(value.as_bytes());
                }
                None => {
                    cookie = Some((converted.len(), value.as_bytes().to_vec()));
                    converted.push((name.clone(), value.clone()));
                }
            },
            other => converted.push((
                other.strip_prefix(':').unwrap_or(other).to_string(),
                value.clone(),
            )),
        }
    }

    if let Some((index, joined)) = cookie {
        match HeaderValue::from_bytes(&joined) {
            Ok(value) => converted[index].1 = value,
            Err(_) => tracing::debug!("Keeping first cookie field, joined value is invalid"),
        }
    }
    converted
}

/// Flatten a `HeaderMap` into a list, keeping repeated values.
pub fn from_header_map(headers: &HeaderMap) -> HeaderList {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.clone()))
        .collect()
}

/// Build a `HeaderMap` from a list. Pseudo-headers and invalid names are skipped.
pub fn to_header_map(headers: &[(String, HeaderValue)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name.starts_with(':') {
            continue;
        }
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => {
                map.append(name, value.clone());
            }
            Err(_) => tracing::debug!(header = %name, "Dropping invalid header"),
        }
    }
    map
}
