//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every route target is a `host:port` address
//! - Reject empty host patterns and empty port lists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function over a decoded `ServerConfig`
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted location, e.g. `routes.api.example.com.target`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a decoded configuration. Returns every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (pattern, route) in &config.routes {
        if pattern.trim().is_empty() {
            errors.push(ValidationError::new("routes", "host pattern must not be empty"));
        }
        if let Err(message) = check_target(&route.target) {
            errors.push(ValidationError::new(format!("routes.{pattern}.target"), message));
        }
    }

    if let Some(ports) = &config.ports {
        if ports.is_empty() {
            errors.push(ValidationError::new("ports", "at least one port is required"));
        }
    }

    if let Some(path) = &config.health_path {
        if !path.starts_with('/') {
            errors.push(ValidationError::new("healthPath", "must start with `/`"));
        }
    }

    if let Some(ssl) = &config.ssl {
        if ssl.key.trim().is_empty() {
            errors.push(ValidationError::new("ssl.key", "must not be empty"));
        }
        if ssl.cert.trim().is_empty() {
            errors.push(ValidationError::new("ssl.cert", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(target: &str) -> Result<(), String> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| format!("`{target}` must be host:port"))?;
    if host.is_empty() {
        return Err(format!("`{target}` has no host"));
    }
    port.parse::<u16>()
        .map(|_| ())
        .map_err(|_| format!("`{target}` has an invalid port"))
}
