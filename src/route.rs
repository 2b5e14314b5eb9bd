//! Routes tell the adapter where to send records.
//!
//! A route can come from the `[route]` config section or from a URI of the
//! form `adapter[+transport]://host:port?option=value`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use url::Url;

use crate::adapter::ADAPTER_NAME;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid route URI: {0}")]
    Url(#[from] url::ParseError),
    #[error("Route URI '{0}' has no host")]
    MissingHost(String),
    #[error("Route URI '{0}' has no port")]
    MissingPort(String),
    #[error("Route URI '{0}' names no adapter")]
    MissingAdapter(String),
}

fn default_adapter() -> String {
    ADAPTER_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    #[serde(default = "default_adapter")]
    pub adapter: String,
    pub address: String,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Route {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            adapter: default_adapter(),
            address: address.into(),
            transport: None,
            options: HashMap::new(),
        }
    }

    /// The configured transport, or `default` when none was given.
    pub fn adapter_transport<'a>(&'a self, default: &'a str) -> &'a str {
        self.transport.as_deref().unwrap_or(default)
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(uri)?;

        let (adapter, transport) = match url.scheme().split_once('+') {
            Some((adapter, transport)) => (adapter, Some(transport.to_string())),
            None => (url.scheme(), None),
        };
        if adapter.is_empty() {
            return Err(RouteError::MissingAdapter(uri.to_string()));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| RouteError::MissingHost(uri.to_string()))?;
        let port = url
            .port()
            .ok_or_else(|| RouteError::MissingPort(uri.to_string()))?;

        let mut route = Self::new(format!("{host}:{port}"));
        route.adapter = adapter.to_string();
        route.transport = transport.filter(|t| !t.is_empty());
        route.options = url.query_pairs().into_owned().collect();
        Ok(route)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transport {
            Some(transport) => write!(f, "{}+{}://{}", self.adapter, transport, self.address),
            None => write!(f, "{}://{}", self.adapter, self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uri() {
        let route: Route = "fluentd-rancher+udp://fluentd.local:24224?tcp_nodelay=true"
            .parse()
            .unwrap();
        assert_eq!(route.adapter, "fluentd-rancher");
        assert_eq!(route.address, "fluentd.local:24224");
        assert_eq!(route.transport.as_deref(), Some("udp"));
        assert_eq!(
            route.options.get("tcp_nodelay").map(String::as_str),
            Some("true")
        );
        assert_eq!(route.adapter_transport("tcp"), "udp");
    }

    #[test]
    fn test_parse_without_transport_uses_default() {
        let route: Route = "fluentd-rancher://10.42.0.7:24224".parse().unwrap();
        assert_eq!(route.transport, None);
        assert_eq!(route.adapter_transport("tcp"), "tcp");
        assert_eq!(route.address, "10.42.0.7:24224");
        assert!(route.options.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "fluentd-rancher://fluentd".parse::<Route>(),
            Err(RouteError::MissingPort(_))
        ));
        assert!(matches!(
            "not a uri".parse::<Route>(),
            Err(RouteError::Url(_))
        ));
    }

    #[test]
    fn test_display() {
        let mut route = Route::new("fluentd:24224");
        assert_eq!(route.to_string(), "fluentd-rancher://fluentd:24224");
        route.transport = Some("tcp".to_string());
        assert_eq!(route.to_string(), "fluentd-rancher+tcp://fluentd:24224");
    }

    #[test]
    fn test_deserialize_defaults() {
        let route: Route = toml::from_str(r#"address = "fluentd:24224""#).unwrap();
        assert_eq!(route, Route::new("fluentd:24224"));
    }
}
