//! Configuration loading.
//!
//! # Responsibilities
//! - Build the defaults, file, environment and programmatic layers
//! - Merge them, decode a `ServerConfig` and validate it
//! - Load the certificate bundle once
//!
//! # Design Decisions
//! - Environment access goes through a lookup function so loading is testable
//! - A missing config file is an empty layer; an unparsable one is an error
//! - Certificate load failures are fatal

use std::path::{Path, PathBuf};

use serde_json::{json, Value as Json};

use crate::config::proxy::ProxyConfig;
use crate::config::schema::{CertificateConfig, LoadedCertificates, ServerConfig};
use crate::config::validation::validate_config;
use crate::config::value::ConfigValue;
use crate::error::{CertificateError, ConfigError, ProxyError};

/// Config file used when `PROXY_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "./proxy.config.json";

/// Load configuration from the process environment plus `programmatic`.
pub async fn load_config(programmatic: impl Into<ConfigValue>) -> Result<ProxyConfig, ProxyError> {
    load_config_from(|name| std::env::var(name).ok(), programmatic).await
}

/// Load configuration with an explicit environment lookup.
pub async fn load_config_from<E>(
    env: E,
    programmatic: impl Into<ConfigValue>,
) -> Result<ProxyConfig, ProxyError>
where
    E: Fn(&str) -> Option<String>,
{
    let path = env("PROXY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let merged = ConfigValue::merge_all([
        defaults(),
        file_layer(&path).await?,
        env_layer(&env),
        programmatic.into(),
    ]);

    let config = ServerConfig::try_from(&merged)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    let ssl = match &config.ssl {
        Some(ssl) => Some(load_certificates(ssl).await?),
        None => None,
    };

    tracing::debug!(
        routes = config.routes.len(),
        tls = ssl.is_some(),
        validator = config.validate.is_some(),
        "Configuration loaded"
    );

    Ok(ProxyConfig::new(config, ssl))
}

/// Built-in lowest layer.
pub fn defaults() -> ConfigValue {
    json!({
        "routes": {},
        "cors": { "origin": "*", "credentials": true }
    })
    .into()
}

/// Parse a config file into a layer. `.toml` is parsed as TOML, anything else as JSON.
pub async fn file_layer(path: &Path) -> Result<ConfigValue, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Config file not found");
            return Ok(ConfigValue::object());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let json: Json = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let table: toml::Value = toml::from_str(&content)?;
            serde_json::to_value(table)?
        }
        _ => serde_json::from_str(&content)?,
    };

    if !json.is_object() {
        return Err(ConfigError::decode(path.display().to_string(), "expected a top-level object"));
    }

    tracing::debug!(path = %path.display(), "Config file loaded");
    Ok(json.into())
}

/// Layer built from `SSL_*` and `CORS_*` variables.
pub fn env_layer<E>(env: E) -> ConfigValue
where
    E: Fn(&str) -> Option<String>,
{
    let mut layer = ConfigValue::object();

    if let (Some(key), Some(cert)) = (env("SSL_KEY"), env("SSL_CERT")) {
        let mut ssl = json!({
            "key": key,
            "cert": cert,
            "allowHTTP1": env("SSL_ALLOW_HTTP1").as_deref() == Some("true"),
        });
        if let Some(ca) = env("SSL_CA") {
            ssl["ca"] = Json::from(ca);
        }
        layer.insert("ssl", ssl.into());
    }

    if let Some(origin) = env("CORS_ORIGIN") {
        let origin = if origin == "*" {
            Json::from(origin)
        } else {
            Json::from(split_list(&origin))
        };
        let mut cors = json!({
            "origin": origin,
            "credentials": env("CORS_CREDENTIALS").as_deref() == Some("true"),
        });
        if let Some(methods) = env("CORS_METHODS") {
            cors["methods"] = Json::from(split_list(&methods));
        }
        if let Some(headers) = env("CORS_HEADERS") {
            cors["allowedHeaders"] = Json::from(split_list(&headers));
        }
        layer.insert("cors", cors.into());
    }

    layer
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

/// Resolve key, cert and CA: inline PEM when the value contains a PEM marker, else a file path.
pub async fn load_certificates(ssl: &CertificateConfig) -> Result<LoadedCertificates, CertificateError> {
    let key = load_pem_source("key", &ssl.key).await?;
    let cert = load_pem_source("cert", &ssl.cert).await?;
    let ca = match &ssl.ca {
        Some(ca) if !ca.is_empty() => Some(load_pem_source("ca", ca).await?),
        _ => None,
    };

    let loaded = LoadedCertificates {
        key,
        cert,
        ca,
        allow_http1: ssl.allow_http1.unwrap_or(true),
    };
    tracing::debug!(certificates = ?loaded, "Certificates loaded");
    Ok(loaded)
}

async fn load_pem_source(what: &'static str, value: &str) -> Result<Vec<u8>, CertificateError> {
    if value.contains("-----BEGIN") {
        return Ok(value.as_bytes().to_vec());
    }
    tokio::fs::read(value)
        .await
        .map_err(|source| CertificateError::Read {
            what,
            path: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CorsOrigin, RouteConfig};
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vhost-proxy-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let env = env_from(&[("PROXY_CONFIG", "/nonexistent/proxy.config.json")]);
        let config = load_config_from(env, ServerConfig::default()).await.unwrap();
        let server = config.server_config();
        assert!(server.routes.is_empty());
        assert_eq!(server.cors.as_ref().unwrap().origin, Some(CorsOrigin::any()));
        assert_eq!(server.cors.as_ref().unwrap().credentials, Some(true));
    }

    #[tokio::test]
    async fn layers_merge_in_order() {
        let path = temp_file(
            "layers.json",
            r#"{"routes":{"a.test":{"target":"127.0.0.1:1"},"b.test":{"target":"127.0.0.1:2"}},"ports":[8080]}"#,
        );
        let env = env_from(&[
            ("PROXY_CONFIG", path.to_str().unwrap()),
            ("CORS_ORIGIN", "https://x.test,https://y.test"),
        ]);

        let config = load_config_from(
            env,
            ServerConfig::default()
                .route("a.test", RouteConfig::new("127.0.0.1:9"))
                .ports([9000]),
        )
        .await
        .unwrap();

        assert_eq!(config.get_target("a.test").unwrap().address, "127.0.0.1:9");
        assert_eq!(config.get_target("b.test").unwrap().address, "127.0.0.1:2");
        assert_eq!(config.get_ports(), vec![9000]);
        assert_eq!(
            config.route_patterns().collect::<Vec<_>>(),
            vec!["a.test", "b.test"]
        );

        let cors = config.server_config().cors.as_ref().unwrap();
        assert_eq!(
            cors.origin,
            Some(CorsOrigin::List(vec!["https://x.test".into(), "https://y.test".into()]))
        );
        assert_eq!(cors.credentials, Some(false));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn toml_file_is_supported() {
        let path = temp_file(
            "config.toml",
            r#"
ports = [8443]

[routes."api.test"]
target = "127.0.0.1:7000"
ssl = true
"#,
        );
        let env = env_from(&[("PROXY_CONFIG", path.to_str().unwrap())]);
        let config = load_config_from(env, ServerConfig::default()).await.unwrap();
        assert_eq!(config.get_ports(), vec![8443]);
        assert!(config.get_target("api.test").unwrap().secure);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn invalid_target_fails_validation() {
        let env = env_from(&[("PROXY_CONFIG", "/nonexistent/x.json")]);
        let err = load_config_from(env, ServerConfig::default().route("a.test", RouteConfig::new("nowhere")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let path = temp_file("broken.json", "{ not json");
        let env = env_from(&[("PROXY_CONFIG", path.to_str().unwrap())]);
        let err = load_config_from(env, ServerConfig::default()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Config(ConfigError::Json(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn env_ssl_needs_key_and_cert() {
        assert!(env_layer(env_from(&[("SSL_KEY", "k.pem")])).get("ssl").is_none());

        let layer = env_layer(env_from(&[
            ("SSL_KEY", "k.pem"),
            ("SSL_CERT", "c.pem"),
            ("SSL_ALLOW_HTTP1", "true"),
        ]));
        let config = ServerConfig::try_from(&layer).unwrap();
        let ssl = config.ssl.unwrap();
        assert_eq!(ssl.key, "k.pem");
        assert_eq!(ssl.allow_http1, Some(true));
        assert_eq!(ssl.ca, None);
    }

    #[tokio::test]
    async fn inline_pem_is_used_verbatim() {
        let pem = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let loaded = load_certificates(&CertificateConfig {
            key: pem.into(),
            cert: pem.into(),
            ca: None,
            allow_http1: None,
        })
        .await
        .unwrap();
        assert_eq!(loaded.cert, pem.as_bytes());
        assert!(loaded.allow_http1);
    }

    #[tokio::test]
    async fn missing_certificate_file_is_fatal() {
        let err = load_certificates(&CertificateConfig {
            key: "/nonexistent/key.pem".into(),
            cert: "/nonexistent/cert.pem".into(),
            ca: None,
            allow_http1: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CertificateError::Read { what: "key", .. }));
    }
}
