//! Configuration file.
//!
//! The file is a TOML document rendered as a template first, so any
//! environment variable can be referenced:
//!
//! ```toml
//! [route]
//! address = "{{ FLUENTD_HOST }}:24224"
//! transport = "tcp"
//!
//! [route.options]
//! tcp_nodelay = "true"
//!
//! [source]
//! channel_capacity = 1024
//! exclude = ["fluentd-rancher"]
//!
//! [tags]
//! network = ["rancher/network-services"]
//! ```

use minijinja::Environment;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::route::{Route, RouteError};
use crate::source::SourceConfig;
use crate::tags::{TagTable, TagTableError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Templating error: {0:?}")]
    Template(#[from] minijinja::Error),
    #[error("Route error: {0}")]
    Route(#[from] RouteError),
    #[error("Tag table error: {0}")]
    Tags(#[from] TagTableError),
    #[error("No route configured. Pass a route URI or add a [route] section to the config file")]
    MissingRoute,
}

#[derive(Debug, Default, Deserialize)]
pub struct FluentdRancherConfigFile {
    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub source: SourceConfig,
    /// Images appended to the built-in tag table.
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl FluentdRancherConfigFile {
    fn try_init_from_string(
        config: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        let template = env.template_from_str(config)?;
        let rendered = template.render(vars)?;

        Ok(toml::from_str(&rendered)?)
    }

    /// Reads the file named on the command line.
    ///
    /// A missing file yields the defaults; the route may still come from
    /// the command line.
    pub fn try_init() -> Result<Self, ConfigError> {
        use std::io::Read;
        let path = &crate::cli::get_cli_args().config;
        let mut config = String::new();
        match std::fs::File::open(path) {
            Ok(mut file) => {
                file.read_to_string(&mut config)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        }

        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::try_init_from_string(&config, &vars)
    }

    /// The route to use. A route URI given on the command line wins over
    /// the `[route]` section.
    pub fn route(&self, uri: Option<&str>) -> Result<Route, ConfigError> {
        match uri {
            Some(uri) => Ok(uri.parse()?),
            None => self.route.clone().ok_or(ConfigError::MissingRoute),
        }
    }

    pub fn tag_table(&self) -> Result<TagTable, ConfigError> {
        let extra = self.tags.iter().flat_map(|(tag, images)| {
            images.iter().map(move |image| (tag.as_str(), image.as_str()))
        });
        Ok(TagTable::rancher_infrastructure().extend(extra)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::NETWORK;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_full_config_with_templates() {
        let config = r#"
            [route]
            address = "{{ FLUENTD_HOST }}:24224"
            transport = "udp"

            [route.options]
            tcp_nodelay = "false"

            [source]
            channel_capacity = 16
            exclude = ["fluentd-rancher"]

            [tags]
            network = ["rancher/network-services"]
            storage = ["rancher/nfs", "rancher/storage-nfs"]
        "#;
        let cfg = FluentdRancherConfigFile::try_init_from_string(
            config,
            &vars(&[("FLUENTD_HOST", "fluentd.rancher.internal")]),
        )
        .expect("Failed to parse config");

        let route = cfg.route(None).unwrap();
        assert_eq!(route.adapter, "fluentd-rancher");
        assert_eq!(route.address, "fluentd.rancher.internal:24224");
        assert_eq!(route.adapter_transport("tcp"), "udp");
        assert_eq!(
            route.options.get("tcp_nodelay").map(String::as_str),
            Some("false")
        );

        assert_eq!(cfg.source.channel_capacity, 16);
        assert_eq!(cfg.source.exclude, ["fluentd-rancher"]);

        let table = cfg.tag_table().unwrap();
        assert_eq!(table.classify("rancher/network-services"), Some(NETWORK));
        assert_eq!(table.classify("rancher/dns"), Some(NETWORK));
        assert_eq!(table.classify("rancher/storage-nfs"), Some("storage"));
    }

    #[test]
    fn test_uri_overrides_route_section() {
        let config = r#"
            [route]
            address = "fluentd:24224"
        "#;
        let cfg = FluentdRancherConfigFile::try_init_from_string(config, &vars(&[])).unwrap();
        let route = cfg.route(Some("fluentd-rancher+udp://collector:5170")).unwrap();
        assert_eq!(route.address, "collector:5170");
        assert_eq!(route.transport.as_deref(), Some("udp"));
    }

    #[test]
    fn test_missing_route() {
        let cfg = FluentdRancherConfigFile::default();
        assert!(matches!(cfg.route(None), Err(ConfigError::MissingRoute)));
        assert!(matches!(
            cfg.route(Some("fluentd-rancher://nohost")),
            Err(ConfigError::Route(RouteError::MissingPort(_)))
        ));
    }

    #[test]
    fn test_duplicate_tag_image_is_rejected() {
        let config = r#"
            [tags]
            scheduler = ["rancher/dns"]
        "#;
        let cfg = FluentdRancherConfigFile::try_init_from_string(config, &vars(&[])).unwrap();
        let res = cfg.tag_table();
        assert!(
            matches!(res, Err(ConfigError::Tags(TagTableError::DuplicateImage { .. }))),
            "{:?}",
            res
        );
    }

    #[test]
    fn test_template_failure() {
        let config = r#"
            [route]
            address = "{{ NOT_SET }}:24224"
        "#;
        let res = FluentdRancherConfigFile::try_init_from_string(config, &vars(&[]));
        assert!(
            matches!(res, Err(ConfigError::Template(_))),
            "{:?}",
            res
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = FluentdRancherConfigFile::try_init_from_string("", &vars(&[])).unwrap();
        assert!(cfg.route.is_none());
        assert_eq!(cfg.source, SourceConfig::default());
        assert_eq!(cfg.tag_table().unwrap(), TagTable::default());
    }
}
