use crate::collector::DEFAULT_INTERVAL;
use crate::gateway::{GatewayCredentials, DEFAULT_GATEWAY_TIMEOUT};
use crate::sink::SinkConfig;
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

const CONFIG_PATH_KEY: &str = "COLLECTOR_CONFIG_PATH";

/// Optional JSON file filling in settings the environment leaves unset.
/// Keys are the lower-case environment names, e.g. `{"plugwise_ip": "10.0.0.2"}`.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileOverrides {
    #[serde(default)]
    plugwise_ip: Option<String>,
    #[serde(default)]
    plugwise_username: Option<String>,
    #[serde(default)]
    plugwise_password: Option<String>,
    #[serde(default)]
    plugwise_timeout_secs: Option<u64>,
    #[serde(default)]
    influx_url: Option<String>,
    #[serde(default)]
    influx_username: Option<String>,
    #[serde(default)]
    influx_password: Option<String>,
    #[serde(default)]
    influx_database: Option<String>,
    #[serde(default)]
    influx_retention_policy: Option<String>,
    #[serde(default)]
    influx_measurement: Option<String>,
    #[serde(default)]
    influx_timeout_secs: Option<u64>,
    #[serde(default)]
    collector_interval_secs: Option<u64>,
}

impl FileOverrides {
    fn get(&self, key: &str) -> Option<String> {
        let text = |value: &Option<String>| value.clone();
        let number = |value: &Option<u64>| value.map(|v| v.to_string());
        let value = match key {
            "PLUGWISE_IP" => text(&self.plugwise_ip),
            "PLUGWISE_USERNAME" => text(&self.plugwise_username),
            "PLUGWISE_PASSWORD" => text(&self.plugwise_password),
            "PLUGWISE_TIMEOUT_SECS" => number(&self.plugwise_timeout_secs),
            "INFLUX_URL" => text(&self.influx_url),
            "INFLUX_USERNAME" => text(&self.influx_username),
            "INFLUX_PASSWORD" => text(&self.influx_password),
            "INFLUX_DATABASE" => text(&self.influx_database),
            "INFLUX_RETENTION_POLICY" => text(&self.influx_retention_policy),
            "INFLUX_MEASUREMENT" => text(&self.influx_measurement),
            "INFLUX_TIMEOUT_SECS" => number(&self.influx_timeout_secs),
            "COLLECTOR_INTERVAL_SECS" => number(&self.collector_interval_secs),
            _ => None,
        };
        value.filter(|value| !value.trim().is_empty())
    }
}

fn load_file_overrides(path: &Path) -> Result<FileOverrides> {
    let mut bytes = std::fs::read(path)
        .with_context(|| format!("failed to read collector config file {}", path.display()))?;
    simd_json::serde::from_slice(&mut bytes)
        .with_context(|| format!("failed to parse collector config file {}", path.display()))
}

/// A configured file that cannot be read or parsed is a startup error.
fn overrides_from(path: Option<String>) -> Result<Option<FileOverrides>> {
    path.map(|path| load_file_overrides(Path::new(&path)))
        .transpose()
        .with_context(|| format!("{CONFIG_PATH_KEY} is set but unusable"))
}

#[derive(Clone, Debug)]
pub struct Config {
    pub gateway: GatewayCredentials,
    pub gateway_timeout: Duration,
    pub sink: SinkConfig,
    pub interval: Duration,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = overrides_from(env_lookup(CONFIG_PATH_KEY))?;
        Self::from_sources(env_lookup, overrides.as_ref())
    }

    fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        overrides: Option<&FileOverrides>,
    ) -> Result<Self> {
        let lookup = |key: &str| env(key).or_else(|| overrides.and_then(|ov| ov.get(key)));
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} is required"));
        // Credentials are taken verbatim; addresses, URLs and numbers are trimmed.
        let required_trimmed = |key: &str| required(key).map(|value| value.trim().to_string());
        let seconds = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => {
                    let secs = raw
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("invalid {key}: {raw:?}"))?;
                    if secs == 0 {
                        bail!("{key} must be greater than zero");
                    }
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(default),
            }
        };

        let gateway = GatewayCredentials {
            address: required_trimmed("PLUGWISE_IP")?,
            username: required("PLUGWISE_USERNAME")?,
            password: required("PLUGWISE_PASSWORD")?,
        };
        let gateway_timeout = seconds("PLUGWISE_TIMEOUT_SECS", DEFAULT_GATEWAY_TIMEOUT)?;

        let mut sink = SinkConfig::new(required_trimmed("INFLUX_URL")?);
        sink.username = lookup("INFLUX_USERNAME");
        sink.password = lookup("INFLUX_PASSWORD");
        if let Some(database) = lookup("INFLUX_DATABASE") {
            sink.database = database;
        }
        if let Some(retention_policy) = lookup("INFLUX_RETENTION_POLICY") {
            sink.retention_policy = retention_policy;
        }
        if let Some(measurement) = lookup("INFLUX_MEASUREMENT") {
            sink.measurement = measurement;
        }
        sink.timeout = seconds("INFLUX_TIMEOUT_SECS", sink.timeout)?;

        let interval = seconds("COLLECTOR_INTERVAL_SECS", DEFAULT_INTERVAL)?;
        let otlp_endpoint = env("OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            gateway,
            gateway_timeout,
            sink,
            interval,
            otlp_endpoint,
        })
    }
}

/// Upper-case name first, then the lower-case spelling older deployments use
/// (`plugwise_ip`, `influx_url`, ...).
fn env_lookup(key: &str) -> Option<String> {
    env_optional(key).or_else(|| env_optional(&key.to_ascii_lowercase()))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("PLUGWISE_IP", "192.168.1.20"),
        ("PLUGWISE_USERNAME", "smile"),
        ("PLUGWISE_PASSWORD", "abcdefgh"),
        ("INFLUX_URL", "http://influx:8086"),
    ];

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = Config::from_sources(env_from(MINIMAL), None).expect("config");
        assert_eq!(config.gateway.address, "192.168.1.20");
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.sink.database, "energy");
        assert_eq!(config.sink.retention_policy, "autogen");
        assert_eq!(config.sink.measurement, "smartmeter");
        assert_eq!(config.sink.credentials(), None);
        assert_eq!(config.interval, Duration::from_secs(20));
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend_from_slice(&[
            ("INFLUX_USERNAME", "writer"),
            ("INFLUX_PASSWORD", "secret"),
            ("INFLUX_DATABASE", "home"),
            ("INFLUX_RETENTION_POLICY", "one_year"),
            ("INFLUX_MEASUREMENT", "p1"),
            ("COLLECTOR_INTERVAL_SECS", "60"),
        ]);
        let config = Config::from_sources(env_from(&pairs), None).expect("config");
        assert_eq!(config.sink.credentials(), Some(("writer", "secret")));
        assert_eq!(config.sink.database, "home");
        assert_eq!(config.sink.retention_policy, "one_year");
        assert_eq!(config.sink.measurement, "p1");
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn missing_gateway_address_is_an_error() {
        let pairs: Vec<_> = MINIMAL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "PLUGWISE_IP")
            .collect();
        let err = Config::from_sources(env_from(&pairs), None).unwrap_err();
        assert!(err.to_string().contains("PLUGWISE_IP"));
    }

    #[test]
    fn zero_or_garbage_interval_is_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("COLLECTOR_INTERVAL_SECS", "0"));
        assert!(Config::from_sources(env_from(&pairs), None).is_err());

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("COLLECTOR_INTERVAL_SECS", "soon"));
        assert!(Config::from_sources(env_from(&pairs), None).is_err());
    }

    #[test]
    fn file_fills_gaps_but_environment_wins() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"plugwise_ip":"10.0.0.9","plugwise_username":"smile","plugwise_password":"fromfile",
               "influx_url":"http://file-influx:8086","influx_database":"filedb","collector_interval_secs":30}}"#
        )
        .expect("write config");
        let overrides = load_file_overrides(file.path()).expect("parsed overrides");

        let env = env_from(&[("PLUGWISE_IP", "192.168.1.20")]);
        let config = Config::from_sources(env, Some(&overrides)).expect("config");
        assert_eq!(config.gateway.address, "192.168.1.20");
        assert_eq!(config.gateway.password, "fromfile");
        assert_eq!(config.sink.url, "http://file-influx:8086");
        assert_eq!(config.sink.database, "filedb");
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn configured_but_missing_file_fails_startup() {
        let err = overrides_from(Some("/nonexistent/collector.json".to_string())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains(CONFIG_PATH_KEY));
        assert!(message.contains("/nonexistent/collector.json"));
    }

    #[test]
    fn malformed_file_fails_startup() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"influx_database": "#).expect("write config");
        let path = file.path().display().to_string();

        let err = overrides_from(Some(path.clone())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("failed to parse"));
        assert!(message.contains(&path));
    }

    #[test]
    fn no_configured_file_means_no_overrides() {
        assert!(overrides_from(None).expect("no file").is_none());
    }

    #[test]
    fn credentials_keep_surrounding_whitespace() {
        let env = env_from(&[
            ("PLUGWISE_IP", " 192.168.1.20 "),
            ("PLUGWISE_USERNAME", "smile"),
            ("PLUGWISE_PASSWORD", " pass word "),
            ("INFLUX_URL", "http://influx:8086\n"),
            ("INFLUX_USERNAME", "writer"),
            ("INFLUX_PASSWORD", "secret "),
            ("COLLECTOR_INTERVAL_SECS", " 30 "),
        ]);
        let config = Config::from_sources(env, None).expect("config");
        assert_eq!(config.gateway.address, "192.168.1.20");
        assert_eq!(config.gateway.password, " pass word ");
        assert_eq!(config.sink.url, "http://influx:8086");
        assert_eq!(config.sink.credentials(), Some(("writer", "secret ")));
        assert_eq!(config.interval, Duration::from_secs(30));
    }
}
