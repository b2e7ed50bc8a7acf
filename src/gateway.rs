use crate::error::FetchError;
use reqwest::Client;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub const MODULES_PATH: &str = "/core/modules";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct GatewayCredentials {
    /// Host or `host:port` of the gateway on the local network.
    pub address: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of the raw `/core/modules` document.
pub trait ModuleSource {
    fn fetch_modules(&self) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

#[derive(Clone, Debug)]
pub struct GatewayClient {
    client: Client,
    credentials: GatewayCredentials,
    url: String,
}

impl GatewayClient {
    pub fn new(credentials: GatewayCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let url = modules_url(&credentials.address);
        Ok(Self {
            client,
            credentials,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        let url = self.url.clone();
        if err.is_timeout() {
            FetchError::Timeout { url, source: err }
        } else {
            FetchError::Transport { url, source: err }
        }
    }
}

impl ModuleSource for GatewayClient {
    async fn fetch_modules(&self) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, url = %self.url, "gateway returned non-success");
        }

        let body = response.bytes().await.map_err(|err| self.map_error(err))?;
        tracing::debug!(%status, len = body.len(), "fetched gateway modules");
        Ok(body.to_vec())
    }
}

fn modules_url(address: &str) -> String {
    format!("http://{}{}", address.trim().trim_end_matches('/'), MODULES_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_url_uses_plain_http() {
        assert_eq!(modules_url("192.168.1.20"), "http://192.168.1.20/core/modules");
        assert_eq!(
            modules_url(" smile.local:8080/ "),
            "http://smile.local:8080/core/modules"
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let creds = GatewayCredentials {
            address: "10.0.0.2".to_string(),
            username: "smile".to_string(),
            password: "abcdefgh".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("smile"));
        assert!(!rendered.contains("abcdefgh"));
    }
}
