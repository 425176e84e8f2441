//! Resolved proxy configuration.
//!
//! # Responsibilities
//! - Own the merged [`ServerConfig`] and the loaded certificate bundle
//! - Answer route, target, CORS and validation queries by host
//!
//! # Design Decisions
//! - Immutable after construction, shared as `Arc<ProxyConfig>`
//! - The core never parses files or environment itself; see `loader`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use hyper::header::HeaderMap;

use crate::config::schema::{
    LoadedCertificates, RouteConfig, ServerConfig, Transform, DEFAULT_HEALTH_PATH, DEFAULT_PORTS,
    DEFAULT_RECLAIM_GRACE_MS,
};
use crate::routing::RouteTable;
use crate::security::cors::cors_headers;
use crate::security::gate::{ConnectionInfo, ForwardValidationResult};

/// Where a host's traffic goes.
#[derive(Clone)]
pub struct Target {
    /// Backend `host:port`.
    pub address: String,
    /// The route asked for TLS towards the backend.
    pub secure: bool,
    /// Global bundle, present only when `secure` is set and a bundle is loaded.
    pub ssl: Option<Arc<LoadedCertificates>>,
    pub remap: Option<Arc<dyn Transform>>,
}

impl Target {
    /// Apply the route's remap, if any.
    pub fn remap_path(&self, path: &str) -> String {
        match &self.remap {
            Some(remap) => remap.apply(path),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("address", &self.address)
            .field("secure", &self.secure)
            .field("ssl", &self.ssl.is_some())
            .field("remap", &self.remap.is_some())
            .finish()
    }
}

/// Immutable configuration queried by listeners and bridges.
#[derive(Debug)]
pub struct ProxyConfig {
    config: ServerConfig,
    routes: RouteTable,
    ssl: Option<Arc<LoadedCertificates>>,
}

impl ProxyConfig {
    pub fn new(config: ServerConfig, ssl: Option<LoadedCertificates>) -> Self {
        let routes = RouteTable::new(config.routes.clone());
        Self {
            config,
            routes,
            ssl: ssl.map(Arc::new),
        }
    }

    /// Global certificate bundle; its presence turns on TLS and HTTP/2.
    pub fn get_ssl(&self) -> Option<&Arc<LoadedCertificates>> {
        self.ssl.as_ref()
    }

    pub fn get_route(&self, host: &str) -> Option<&RouteConfig> {
        self.routes.lookup(host)
    }

    pub fn get_target(&self, host: &str) -> Option<Target> {
        let route = self.get_route(host)?;
        Some(Target {
            address: route.target.clone(),
            secure: route.ssl,
            ssl: if route.ssl { self.ssl.clone() } else { None },
            remap: route.remap.clone(),
        })
    }

    /// CORS headers for `origin`, using the route policy for `host` when it has one.
    pub fn get_cors_headers(&self, origin: &str, host: Option<&str>) -> HeaderMap {
        let route_policy = host
            .and_then(|h| self.get_route(h))
            .and_then(|r| r.cors.as_ref());
        cors_headers(route_policy.or(self.config.cors.as_ref()), origin)
    }

    /// Run the route validator, else the global one. No validator forwards.
    pub async fn validate(&self, info: &ConnectionInfo) -> ForwardValidationResult {
        let validator = self
            .get_route(&info.authority)
            .and_then(|r| r.validate.clone())
            .or_else(|| self.config.validate.clone());

        let Some(validator) = validator else {
            return ForwardValidationResult::allow();
        };

        let outcome = AssertUnwindSafe(async move { validator.validate(info.clone()).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                tracing::warn!(connection_id = %info.id, error = %error, "Validator failed");
                ForwardValidationResult::internal_error()
            }
            Err(_) => {
                tracing::error!(connection_id = %info.id, "Validator panicked");
                ForwardValidationResult::internal_error()
            }
        }
    }

    pub fn get_ports(&self) -> Vec<u16> {
        self.config
            .ports
            .clone()
            .unwrap_or_else(|| DEFAULT_PORTS.to_vec())
    }

    pub fn health_path(&self) -> &str {
        self.config.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH)
    }

    pub fn reclaim_ports(&self) -> bool {
        self.config.reclaim_ports
    }

    pub fn reclaim_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(
            self.config.reclaim_grace_ms.unwrap_or(DEFAULT_RECLAIM_GRACE_MS),
        )
    }

    /// Declared host patterns, in order.
    pub fn route_patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.patterns()
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.config
    }
}
