//! Tagged configuration tree and the layered merge.
//!
//! Every configuration layer (defaults, file, environment, programmatic) is
//! lowered into a [`ConfigValue`] tree before merging. Merging is explicit and
//! recursive: objects merge key by key with the later layer winning, while
//! arrays, scalars and callables replace wholesale. Object keys keep their
//! insertion order so route declaration order survives every layer.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::schema::{
    CertificateConfig, CorsPolicy, RouteConfig, ServerConfig, Transform,
};
use crate::error::ConfigError;
use crate::security::gate::Validator;

/// One node of a configuration layer.
#[derive(Clone)]
pub enum ConfigValue {
    /// Ordered key/value pairs.
    Object(Vec<(String, ConfigValue)>),
    Array(Vec<ConfigValue>),
    /// Any JSON leaf: string, number, bool or null.
    Scalar(Json),
    Transform(Arc<dyn Transform>),
    Validator(Arc<dyn Validator>),
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Object(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            ConfigValue::Array(items) => f.debug_list().entries(items).finish(),
            ConfigValue::Scalar(value) => write!(f, "{value}"),
            ConfigValue::Transform(_) => f.write_str("<transform>"),
            ConfigValue::Validator(_) => f.write_str("<validator>"),
        }
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Object(Vec::new())
    }
}

impl From<Json> for ConfigValue {
    fn from(value: Json) -> Self {
        match value {
            Json::Object(map) => ConfigValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
            Json::Array(items) => {
                ConfigValue::Array(items.into_iter().map(ConfigValue::from).collect())
            }
            leaf => ConfigValue::Scalar(leaf),
        }
    }
}

impl ConfigValue {
    pub fn object() -> Self {
        ConfigValue::Object(Vec::new())
    }

    pub fn transform<T: Transform + 'static>(transform: T) -> Self {
        ConfigValue::Transform(Arc::new(transform))
    }

    pub fn validator<V: Validator + 'static>(validator: V) -> Self {
        ConfigValue::Validator(Arc::new(validator))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ConfigValue::Object(entries) if entries.is_empty())
    }

    /// Look up a direct child of an object.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Set a direct child of an object, keeping the position of an existing key.
    /// Non-object values are turned into an empty object first.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        if !matches!(self, ConfigValue::Object(_)) {
            *self = ConfigValue::object();
        }
        if let ConfigValue::Object(entries) = self {
            let key = key.into();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
    }

    /// Set a value at a nested key path, creating intermediate objects.
    pub fn set_path(&mut self, path: &[&str], value: ConfigValue) {
        match path {
            [] => *self = value,
            [key] => self.insert(*key, value),
            [key, rest @ ..] => {
                let mut child = self.get(key).cloned().unwrap_or_default();
                child.set_path(rest, value);
                self.insert(*key, child);
            }
        }
    }

    /// Builder form of [`ConfigValue::set_path`].
    pub fn with(mut self, path: &[&str], value: impl Into<ConfigValue>) -> Self {
        self.set_path(path, value.into());
        self
    }

    /// Merge `other` on top of `self`; `other` wins.
    pub fn merge(self, other: ConfigValue) -> ConfigValue {
        match (self, other) {
            (ConfigValue::Object(mut base), ConfigValue::Object(overlay)) => {
                for (key, value) in overlay {
                    match base.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => {
                            let current = std::mem::take(&mut slot.1);
                            slot.1 = current.merge(value);
                        }
                        None => {
                            let value = ConfigValue::object().merge(value);
                            base.push((key, value));
                        }
                    }
                }
                ConfigValue::Object(base)
            }
            (_, ConfigValue::Object(overlay)) => ConfigValue::object().merge(ConfigValue::Object(overlay)),
            (_, other) => other,
        }
    }

    /// Fold layers left to right, later layers winning.
    pub fn merge_all<I>(layers: I) -> ConfigValue
    where
        I: IntoIterator<Item = ConfigValue>,
    {
        layers
            .into_iter()
            .fold(ConfigValue::object(), ConfigValue::merge)
    }

    /// Lower a callable-free subtree back to JSON.
    fn to_json(&self, path: &str) -> Result<Json, ConfigError> {
        match self {
            ConfigValue::Object(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json(&format!("{path}.{key}"))?);
                }
                Ok(Json::Object(map))
            }
            ConfigValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| v.to_json(&format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            ConfigValue::Scalar(value) => Ok(value.clone()),
            ConfigValue::Transform(_) | ConfigValue::Validator(_) => {
                Err(ConfigError::decode(path, "unexpected callable"))
            }
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let json = self.to_json(path)?;
        serde_json::from_value(json).map_err(|e| ConfigError::decode(path, e.to_string()))
    }
}

impl From<ServerConfig> for ConfigValue {
    /// Lower a programmatic config into a layer. Only fields that are set are
    /// emitted, so unset fields do not override lower layers.
    fn from(config: ServerConfig) -> Self {
        let mut value = ConfigValue::object();
        if let Some(ssl) = config.ssl {
            if let Ok(json) = serde_json::to_value(ssl) {
                value.insert("ssl", strip_nulls(json).into());
            }
        }
        if !config.routes.is_empty() {
            let mut routes = ConfigValue::object();
            for (pattern, route) in config.routes {
                routes.insert(pattern, route.into());
            }
            value.insert("routes", routes);
        }
        if let Some(cors) = config.cors {
            if let Ok(json) = serde_json::to_value(cors) {
                value.insert("cors", strip_nulls(json).into());
            }
        }
        if let Some(validate) = config.validate {
            value.insert("validate", ConfigValue::Validator(validate));
        }
        if let Some(ports) = config.ports {
            value.insert("ports", Json::from(ports).into());
        }
        if let Some(path) = config.health_path {
            value.insert("healthPath", Json::from(path).into());
        }
        if config.reclaim_ports {
            value.insert("reclaimPorts", Json::Bool(true).into());
        }
        if let Some(ms) = config.reclaim_grace_ms {
            value.insert("reclaimGraceMs", Json::from(ms).into());
        }
        value
    }
}

impl From<RouteConfig> for ConfigValue {
    fn from(route: RouteConfig) -> Self {
        let mut value = ConfigValue::object();
        value.insert("target", Json::from(route.target).into());
        value.insert("ssl", Json::Bool(route.ssl).into());
        if let Some(remap) = route.remap {
            value.insert("remap", ConfigValue::Transform(remap));
        }
        if let Some(cors) = route.cors {
            if let Ok(json) = serde_json::to_value(cors) {
                value.insert("cors", strip_nulls(json).into());
            }
        }
        if let Some(validate) = route.validate {
            value.insert("validate", ConfigValue::Validator(validate));
        }
        value
    }
}

fn strip_nulls(json: Json) -> Json {
    match json {
        Json::Object(map) => Json::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect(),
        ),
        other => other,
    }
}

impl TryFrom<&ConfigValue> for ServerConfig {
    type Error = ConfigError;

    fn try_from(value: &ConfigValue) -> Result<Self, Self::Error> {
        let entries = match value {
            ConfigValue::Object(entries) => entries,
            _ => return Err(ConfigError::decode("", "expected an object")),
        };

        let mut config = ServerConfig::default();
        for (key, child) in entries {
            match key.as_str() {
                "ssl" => config.ssl = child.decode::<Option<CertificateConfig>>("ssl")?,
                "routes" => config.routes = decode_routes(child)?,
                "cors" => config.cors = child.decode::<Option<CorsPolicy>>("cors")?,
                "validate" => config.validate = decode_validator(child, "validate")?,
                "ports" => config.ports = child.decode("ports")?,
                "healthPath" => config.health_path = child.decode("healthPath")?,
                "reclaimPorts" => {
                    config.reclaim_ports = child.decode::<Option<bool>>("reclaimPorts")?.unwrap_or(false)
                }
                "reclaimGraceMs" => config.reclaim_grace_ms = child.decode("reclaimGraceMs")?,
                other => tracing::debug!(key = other, "Ignoring unknown config key"),
            }
        }
        Ok(config)
    }
}

fn decode_routes(value: &ConfigValue) -> Result<Vec<(String, RouteConfig)>, ConfigError> {
    let entries = match value {
        ConfigValue::Object(entries) => entries,
        ConfigValue::Scalar(Json::Null) => return Ok(Vec::new()),
        _ => return Err(ConfigError::decode("routes", "expected an object keyed by host")),
    };

    entries
        .iter()
        .map(|(pattern, route)| {
            let path = format!("routes.{pattern}");
            decode_route(route, &path).map(|route| (pattern.clone(), route))
        })
        .collect()
}

fn decode_route(value: &ConfigValue, path: &str) -> Result<RouteConfig, ConfigError> {
    if !matches!(value, ConfigValue::Object(_)) {
        return Err(ConfigError::decode(path, "expected a route object"));
    }

    let target = value
        .get("target")
        .ok_or_else(|| ConfigError::decode(path, "missing `target`"))?
        .decode::<String>(&format!("{path}.target"))?;

    let ssl = match value.get("ssl") {
        Some(v) => v.decode::<Option<bool>>(&format!("{path}.ssl"))?.unwrap_or(false),
        None => false,
    };

    let remap = match value.get("remap") {
        Some(ConfigValue::Transform(t)) => Some(Arc::clone(t)),
        Some(ConfigValue::Scalar(Json::Null)) | None => None,
        Some(_) => return Err(ConfigError::decode(format!("{path}.remap"), "expected a transform")),
    };

    let cors = match value.get("cors") {
        Some(v) => v.decode::<Option<CorsPolicy>>(&format!("{path}.cors"))?,
        None => None,
    };

    let validate = match value.get("validate") {
        Some(v) => decode_validator(v, &format!("{path}.validate"))?,
        None => None,
    };

    Ok(RouteConfig {
        target,
        ssl,
        remap,
        cors,
        validate,
    })
}

fn decode_validator(value: &ConfigValue, path: &str) -> Result<Option<Arc<dyn Validator>>, ConfigError> {
    match value {
        ConfigValue::Validator(v) => Ok(Some(Arc::clone(v))),
        ConfigValue::Scalar(Json::Null) => Ok(None),
        _ => Err(ConfigError::decode(path, "expected a validator")),
    }
}
