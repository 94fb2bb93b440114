//! azmond.toml configuration file.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! subscriptions = ["00000000-0000-0000-0000-000000000000"]
//! management_endpoint = "https://management.azure.com"
//! metrics_endpoint_template = "https://{region}.metrics.monitor.azure.com"
//! access_token = "..."
//! log_format = "json"
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use azmon_client::{DEFAULT_MANAGEMENT_ENDPOINT, DEFAULT_METRICS_ENDPOINT_TEMPLATE};
use clap::ValueEnum;
use serde::Deserialize;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub subscriptions: Option<Vec<String>>,
    pub management_endpoint: Option<String>,
    pub metrics_endpoint_template: Option<String>,
    pub access_token: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Settings after merging flags over the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub listen: SocketAddr,
    /// Empty means discover at startup.
    pub subscriptions: Vec<String>,
    pub management_endpoint: String,
    pub metrics_endpoint_template: String,
    pub access_token: Option<String>,
    pub log_format: LogFormat,
}

/// Values given on the command line. `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub subscriptions: Vec<String>,
    pub management_endpoint: Option<String>,
    pub metrics_endpoint_template: Option<String>,
    pub access_token: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl Settings {
    pub fn resolve(file: FileConfig, flags: Overrides) -> anyhow::Result<Self> {
        let listen = match flags.listen.or(file.listen) {
            Some(addr) => addr,
            None => DEFAULT_LISTEN.parse()?,
        };
        let subscriptions = if flags.subscriptions.is_empty() {
            file.subscriptions.unwrap_or_default()
        } else {
            flags.subscriptions
        };

        Ok(Self {
            listen,
            subscriptions,
            management_endpoint: flags
                .management_endpoint
                .or(file.management_endpoint)
                .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
            metrics_endpoint_template: flags
                .metrics_endpoint_template
                .or(file.metrics_endpoint_template)
                .unwrap_or_else(|| DEFAULT_METRICS_ENDPOINT_TEMPLATE.to_string()),
            access_token: flags
                .access_token
                .or(file.access_token)
                .filter(|t| !t.is_empty()),
            log_format: flags.log_format.or(file.log_format).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file_or_flags() {
        let s = Settings::resolve(FileConfig::default(), Overrides::default()).unwrap();
        assert_eq!(s.listen, "0.0.0.0:8080".parse().unwrap());
        assert!(s.subscriptions.is_empty());
        assert_eq!(s.management_endpoint, "https://management.azure.com");
        assert_eq!(s.metrics_endpoint_template, "https://{region}.metrics.monitor.azure.com");
        assert_eq!(s.access_token, None);
        assert_eq!(s.log_format, LogFormat::Text);
    }

    #[test]
    fn parse_file() {
        let file = FileConfig::parse(
            r#"
listen = "127.0.0.1:9000"
subscriptions = ["a", "b"]
log_format = "json"
"#,
        )
        .unwrap();
        let s = Settings::resolve(file, Overrides::default()).unwrap();
        assert_eq!(s.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(s.subscriptions, vec!["a", "b"]);
        assert_eq!(s.log_format, LogFormat::Json);
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::parse(
            r#"
subscriptions = ["file"]
management_endpoint = "https://file.example"
access_token = "from-file"
"#,
        )
        .unwrap();
        let flags = Overrides {
            subscriptions: vec!["flag".into()],
            access_token: Some("from-flag".into()),
            ..Default::default()
        };
        let s = Settings::resolve(file, flags).unwrap();
        assert_eq!(s.subscriptions, vec!["flag"]);
        assert_eq!(s.management_endpoint, "https://file.example");
        assert_eq!(s.access_token.as_deref(), Some("from-flag"));
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(FileConfig::parse("lisen = \"x\"").is_err());
    }
}
