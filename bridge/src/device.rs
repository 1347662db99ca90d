use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Url};
use serde_json::{json, Value};
use thiserror::Error;

use incubator_common::{DeviceConfig, RawTelemetry, WireCommand};

pub const PATH_TELEMETRY: &str = "telemetry";
pub const PATH_COMMAND: &str = "cmd";
pub const PATH_STATUS: &str = "status";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device did not respond within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("device /{endpoint} failed: {status} {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed device response: {message}")]
    MalformedResponse { message: String, body: String },

    #[error("invalid device url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Reply to `GET /status`; only ever built from a 2xx response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub status: u16,
    pub body: String,
}

/// Stateless HTTP client for the incubator firmware. Every call is bounded by
/// the configured timeout and nothing is retried here.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("incubator-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                DeviceError::Unreachable(format!("failed to build HTTP client: {err}"))
            })?;

        let mut base_url = Url::parse(&config.base_url).map_err(|err| DeviceError::InvalidUrl {
            url: config.base_url.clone(),
            message: err.to_string(),
        })?;
        // Url::join drops the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn fetch_telemetry(&self) -> Result<RawTelemetry, DeviceError> {
        let request = self.http.get(self.endpoint(PATH_TELEMETRY)?);
        let (_, body) = self.exchange(PATH_TELEMETRY, request).await?;
        RawTelemetry::from_json(&body).map_err(|err| DeviceError::MalformedResponse {
            message: err.to_string(),
            body,
        })
    }

    /// JSON replies are returned as-is; anything else is wrapped as
    /// `{"ok": true, "raw": <text>}`.
    pub async fn send_command(&self, command: &WireCommand) -> Result<Value, DeviceError> {
        let request = self
            .http
            .post(self.endpoint(PATH_COMMAND)?)
            .header(CONTENT_TYPE, "text/plain")
            .body(command.as_str().to_string());
        let (_, body) = self.exchange(PATH_COMMAND, request).await?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) => Ok(json!({ "ok": true, "raw": body })),
        }
    }

    pub async fn fetch_status(&self) -> Result<DeviceStatus, DeviceError> {
        let request = self.http.get(self.endpoint(PATH_STATUS)?);
        let (status, body) = self.exchange(PATH_STATUS, request).await?;
        Ok(DeviceStatus { status, body })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeviceError> {
        self.base_url
            .join(path)
            .map_err(|err| DeviceError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                message: err.to_string(),
            })
    }

    async fn exchange(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<(u16, String), DeviceError> {
        let response = request.send().await.map_err(|err| self.classify(err))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| self.classify(err))?;

        if !status.is_success() {
            return Err(DeviceError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok((status.as_u16(), body))
    }

    fn classify(&self, err: reqwest::Error) -> DeviceError {
        if err.is_timeout() {
            DeviceError::Timeout {
                timeout_ms: self.timeout.as_millis().try_into().unwrap_or(u64::MAX),
            }
        } else {
            DeviceError::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(base_url: &str) -> DeviceConfig {
        DeviceConfig {
            base_url: base_url.to_string(),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn keeps_base_path_when_joining() {
        let client = DeviceClient::new(&config("http://10.0.0.7/esp")).unwrap();
        assert_eq!(
            client.endpoint(PATH_TELEMETRY).unwrap().as_str(),
            "http://10.0.0.7/esp/telemetry"
        );

        let client = DeviceClient::new(&config("http://10.0.0.7")).unwrap();
        assert_eq!(
            client.endpoint(PATH_COMMAND).unwrap().as_str(),
            "http://10.0.0.7/cmd"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            DeviceClient::new(&config("not a url")),
            Err(DeviceError::InvalidUrl { .. })
        ));
    }
}
