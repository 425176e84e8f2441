//! Configuration schema definitions.
//!
//! This module defines the resolved configuration structure for the proxy.
//! Plain-data parts derive Serde traits so they can be decoded from a merged
//! configuration tree; callable parts (`remap`, `validate`) are capabilities
//! that can only be supplied programmatically.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::security::gate::Validator;

/// Ports bound when none are configured: HTTPS, alternate HTTP, debug.
pub const DEFAULT_PORTS: [u16; 3] = [443, 8080, 9229];

/// Path answered with `200 OK` on every REST listener, before routing.
pub const DEFAULT_HEALTH_PATH: &str = "/vhost-proxy/health";

/// Grace delay before evicting the holder of a busy port.
pub const DEFAULT_RECLAIM_GRACE_MS: u64 = 3_000;

/// Rewrites a request path before it is forwarded.
pub trait Transform: Send + Sync {
    fn apply(&self, path: &str) -> String;
}

impl<F> Transform for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply(&self, path: &str) -> String {
        self(path)
    }
}

/// Root configuration, the result of the layered merge.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Global certificate bundle; its presence switches listeners to TLS + HTTP/2.
    pub ssl: Option<CertificateConfig>,

    /// Routes keyed by host pattern, in declaration order.
    pub routes: Vec<(String, RouteConfig)>,

    /// Global CORS policy, used when a route has none.
    pub cors: Option<CorsPolicy>,

    /// Global validator, used when a route has none.
    pub validate: Option<Arc<dyn Validator>>,

    /// Ports to listen on (defaults to [`DEFAULT_PORTS`]).
    pub ports: Option<Vec<u16>>,

    /// Health-check path (defaults to [`DEFAULT_HEALTH_PATH`]).
    pub health_path: Option<String>,

    /// Evict whatever process holds a configured port, then retry the bind once.
    pub reclaim_ports: bool,

    /// Delay before reclaiming a port, in milliseconds.
    pub reclaim_grace_ms: Option<u64>,
}

impl ServerConfig {
    /// Add a route, keeping declaration order.
    pub fn route(mut self, pattern: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.push((pattern.into(), route));
        self
    }

    pub fn ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.ports = Some(ports.into());
        self
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("ssl", &self.ssl.is_some())
            .field("routes", &self.routes)
            .field("cors", &self.cors)
            .field("validate", &self.validate.is_some())
            .field("ports", &self.ports)
            .field("health_path", &self.health_path)
            .field("reclaim_ports", &self.reclaim_ports)
            .finish()
    }
}

/// Route to a single backend target.
#[derive(Clone, Default)]
pub struct RouteConfig {
    /// Backend address, `host:port`.
    pub target: String,

    /// Use TLS towards the target. Inbound TLS is controlled globally.
    pub ssl: bool,

    pub remap: Option<Arc<dyn Transform>>,

    /// Replaces the global policy wholesale when set.
    pub cors: Option<CorsPolicy>,

    /// Takes precedence over the global validator.
    pub validate: Option<Arc<dyn Validator>>,
}

impl RouteConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn with_remap<T>(mut self, remap: T) -> Self
    where
        T: Transform + 'static,
    {
        self.remap = Some(Arc::new(remap));
        self
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.validate = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("target", &self.target)
            .field("ssl", &self.ssl)
            .field("remap", &self.remap.is_some())
            .field("cors", &self.cors)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// Allowed origins: `"*"`, a single origin, or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    List(Vec<String>),
    One(String),
}

impl CorsOrigin {
    pub fn any() -> Self {
        CorsOrigin::One("*".to_string())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, CorsOrigin::One(origin) if origin == "*")
    }
}

/// CORS policy. Missing fields fall back to permissive defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    /// When absent the request's own origin is echoed back.
    pub origin: Option<CorsOrigin>,
    pub methods: Option<Vec<String>>,
    pub allowed_headers: Option<Vec<String>>,
    pub exposed_headers: Option<Vec<String>>,
    pub credentials: Option<bool>,
    #[serde(rename = "maxAge")]
    pub max_age_seconds: Option<u64>,
}

/// Certificate sources: inline PEM or file paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertificateConfig {
    pub key: String,
    pub cert: String,
    #[serde(default)]
    pub ca: Option<String>,
    #[serde(rename = "allowHTTP1", default)]
    pub allow_http1: Option<bool>,
}

/// Certificate bundle loaded once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedCertificates {
    pub key: Vec<u8>,
    pub cert: Vec<u8>,
    pub ca: Option<Vec<u8>>,
    /// Offer HTTP/1.1 next to HTTP/2 during ALPN.
    pub allow_http1: bool,
}

impl fmt::Debug for LoadedCertificates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCertificates")
            .field("key_len", &self.key.len())
            .field("cert_len", &self.cert.len())
            .field("ca_len", &self.ca.as_ref().map(Vec::len))
            .field("allow_http1", &self.allow_http1)
            .finish()
    }
}
