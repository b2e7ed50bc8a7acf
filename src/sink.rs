use crate::error::WriteError;
use crate::line_protocol::Point;
use crate::reading::Reading;
use reqwest::Client;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "energy";
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";
pub const DEFAULT_MEASUREMENT: &str = "smartmeter";
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SinkConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub retention_policy: String,
    pub measurement: String,
    pub timeout: Duration,
}

impl SinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Basic auth is only used when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim().trim_end_matches('/'), path)
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("retention_policy", &self.retention_policy)
            .field("measurement", &self.measurement)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Destination for one collected reading per cycle.
pub trait PointSink {
    fn write(&self, reading: &Reading) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// Writes readings through the InfluxDB 1.x `/write` endpoint.
#[derive(Clone)]
pub struct InfluxSink {
    client: Client,
    config: SinkConfig,
    auth: Option<(String, String)>,
}

impl InfluxSink {
    pub fn new(config: SinkConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let auth = config
            .credentials()
            .map(|(username, password)| (username.to_string(), password.to_string()));
        Ok(Self {
            client,
            config,
            auth,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    /// Checks that the store answers and logs its version.
    pub async fn ping(&self) -> Result<Option<String>, WriteError> {
        let response = self
            .authorize(self.client.get(self.config.endpoint("/ping")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteError::Rejected { status, body });
        }
        let version = response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        tracing::info!(
            url = %self.config.url,
            version = version.as_deref().unwrap_or("unknown"),
            "influx reachable"
        );
        Ok(version)
    }
}

impl PointSink for InfluxSink {
    async fn write(&self, reading: &Reading) -> Result<(), WriteError> {
        let line = Point::from_reading(&self.config.measurement, reading).to_line();
        let request = self
            .client
            .post(self.config.endpoint("/write"))
            .query(&[
                ("db", self.config.database.as_str()),
                ("rp", self.config.retention_policy.as_str()),
                ("precision", "ms"),
            ])
            .body(line);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteError::Rejected { status, body });
        }

        tracing::debug!(
            measurement = %self.config.measurement,
            ts = reading.timestamp_millis(),
            "wrote point"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides() {
        let config = SinkConfig::new("http://influx:8086");
        assert_eq!(config.database, "energy");
        assert_eq!(config.retention_policy, "autogen");
        assert_eq!(config.measurement, "smartmeter");
        assert_eq!(config.timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn basic_auth_needs_both_username_and_password() {
        let mut config = SinkConfig::new("http://influx:8086");
        assert_eq!(config.credentials(), None);

        config.username = Some("writer".to_string());
        assert_eq!(config.credentials(), None);

        config.password = Some("secret".to_string());
        assert_eq!(config.credentials(), Some(("writer", "secret")));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let config = SinkConfig::new("http://influx:8086/");
        assert_eq!(config.endpoint("/write"), "http://influx:8086/write");
    }

    #[test]
    fn debug_output_hides_password() {
        let mut config = SinkConfig::new("http://influx:8086");
        config.password = Some("hunter2".to_string());
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
